use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::{cast, Sample};

/// Analysis/synthesis window shape.
///
/// All shapes are periodic (DFT-even), which gives a constant overlap-add
/// gain at 50% overlap for Hann and Hamming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    #[default]
    Hann,
    Hamming,
    Rectangular,
}

impl WindowKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "hann" => Some(WindowKind::Hann),
            "hamming" => Some(WindowKind::Hamming),
            "rectangular" | "rect" => Some(WindowKind::Rectangular),
            _ => None,
        }
    }

    /// Generates the window of length `size`.
    pub fn generate<T: Sample>(&self, size: usize) -> Vec<T> {
        let n = size as f64;
        (0..size)
            .map(|i| {
                let phase = 2.0 * PI * i as f64 / n;
                let w = match self {
                    WindowKind::Hann => 0.5 * (1.0 - phase.cos()),
                    WindowKind::Hamming => 0.54 - 0.46 * phase.cos(),
                    WindowKind::Rectangular => 1.0,
                };
                cast(w)
            })
            .collect()
    }
}
