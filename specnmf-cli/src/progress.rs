use indicatif::{ProgressBar, ProgressStyle};
use specnmf_core::listener::{PipelineEvent, PipelineListener};

/// CLI progress bar that counts NMF update passes.
///
/// When a tolerance stops the factorization early the bar jumps to the end.
pub struct CliListener {
    pb: ProgressBar,
}

impl CliListener {
    pub fn new(iterations: usize) -> Self {
        let pb = ProgressBar::new(iterations as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.green} Factorizing [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
        pb.set_style(style);
        Self { pb }
    }
}

impl PipelineListener for CliListener {
    fn on_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Iteration { index, .. } => {
                self.pb.set_position(index as u64 + 1);
            }
            PipelineEvent::Factorized {
                iterations,
                converged,
            } => {
                self.pb.set_length(iterations as u64);
                self.pb.finish_with_message(if converged { "converged" } else { "done" });
            }
            _ => {}
        }
    }
}
