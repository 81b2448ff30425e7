//! Listener for observing a pipeline run.
//!
//! Emits lightweight events at each stage, enough for progress indicators
//! and debugging, without copying any matrix.

/// Events emitted while decomposing or resynthesizing.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Forward STFT finished.
    Analyzed { frames: usize, bins: usize },

    /// One multiplicative update pass finished. `cost` is the generalized
    /// KL divergence, present only when the listener asked for it or a
    /// tolerance is configured.
    Iteration {
        index: usize,
        total: usize,
        cost: Option<f64>,
    },

    /// Factorization finished.
    Factorized { iterations: usize, converged: bool },

    /// Ratio mask applied for one component.
    Masked { component: usize, components: usize },

    /// A component has been resynthesized to the time domain.
    Resynthesized { component: usize, samples: usize },
}

/// Trait for observing the pipeline. Implement this for UI, debugging, etc.
pub trait PipelineListener {
    /// Called at each checkpoint. The event describes what just happened.
    fn on_event(&mut self, event: PipelineEvent);

    /// Return `true` to receive the divergence in `Iteration` events.
    /// Computing it costs an extra pass over the spectrogram per iteration.
    fn wants_cost(&self) -> bool {
        false
    }
}

/// No-op listener.
pub struct NoOpListener;

impl PipelineListener for NoOpListener {
    #[inline(always)]
    fn on_event(&mut self, _event: PipelineEvent) {}
}

/// Debug listener: forwards every event to the `log` facade at debug level.
pub struct DebugListener;

impl PipelineListener for DebugListener {
    fn on_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Analyzed { frames, bins } => {
                log::debug!("stft: {frames} frames x {bins} bins");
            }
            PipelineEvent::Iteration { index, total, cost } => match cost {
                Some(cost) => log::debug!("iteration {}/{total}  divergence={cost:.6e}", index + 1),
                None => log::debug!("iteration {}/{total}", index + 1),
            },
            PipelineEvent::Factorized {
                iterations,
                converged,
            } => {
                log::debug!("factorized after {iterations} iterations (converged: {converged})");
            }
            PipelineEvent::Masked {
                component,
                components,
            } => {
                log::debug!("mask applied for component {}/{components}", component + 1);
            }
            PipelineEvent::Resynthesized { component, samples } => {
                log::debug!("component {component} resynthesized ({samples} samples)");
            }
        }
    }

    fn wants_cost(&self) -> bool {
        true
    }
}

/// Collects every event; useful in tests.
#[derive(Default)]
pub struct RecordingListener {
    pub events: Vec<PipelineEvent>,
    pub with_cost: bool,
}

impl PipelineListener for RecordingListener {
    fn on_event(&mut self, event: PipelineEvent) {
        self.events.push(event);
    }

    fn wants_cost(&self) -> bool {
        self.with_cost
    }
}
