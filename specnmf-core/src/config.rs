use serde::{Deserialize, Serialize};

use crate::dsp::framer::Framer;
use crate::{NmfError, Result, WindowKind, DEFAULT_COMPONENTS, DEFAULT_FFT_SIZE, DEFAULT_ITERATIONS};

/// User-facing options. Unset sizes are resolved by [`NmfOptions::build`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NmfOptions {
    /// Factorization rank `K`.
    pub components: usize,
    /// Multiplicative update passes.
    pub iterations: usize,
    /// FFT size, a power of two.
    pub fft_size: usize,
    /// Analysis window length; defaults to `fft_size`.
    pub window_size: Option<usize>,
    /// Frame advance; defaults to `fft_size / 2`.
    pub hop_size: Option<usize>,
    /// Initialization seed; `None` draws from system entropy.
    pub seed: Option<u64>,
    pub window: WindowKind,
    /// Stop once the relative divergence decrease drops below this value.
    pub tolerance: Option<f64>,
}

impl Default for NmfOptions {
    fn default() -> Self {
        Self {
            components: DEFAULT_COMPONENTS,
            iterations: DEFAULT_ITERATIONS,
            fft_size: DEFAULT_FFT_SIZE,
            window_size: None,
            hop_size: None,
            seed: None,
            window: WindowKind::default(),
            tolerance: None,
        }
    }
}

impl NmfOptions {
    /// Resolves defaults and validates, producing an immutable config.
    pub fn build(&self) -> Result<NmfConfig> {
        let window_size = self.window_size.unwrap_or(self.fft_size);
        let hop_size = self.hop_size.unwrap_or(self.fft_size / 2);

        if self.components < 1 {
            return Err(config_error("component count must be at least 1"));
        }
        if self.iterations < 1 {
            return Err(config_error("iteration count must be at least 1"));
        }
        if self.fft_size == 0 || !self.fft_size.is_power_of_two() {
            return Err(config_error(format!(
                "fft size must be a positive power of two, got {}",
                self.fft_size
            )));
        }
        if window_size == 0 || window_size > self.fft_size {
            return Err(config_error(format!(
                "window size must be in 1..={}, got {}",
                self.fft_size, window_size
            )));
        }
        if hop_size == 0 {
            return Err(config_error("hop size must be positive"));
        }
        if let Some(tol) = self.tolerance {
            if !tol.is_finite() || tol <= 0.0 {
                return Err(config_error(format!(
                    "tolerance must be finite and positive, got {}",
                    tol
                )));
            }
        }

        let config = NmfConfig {
            components: self.components,
            iterations: self.iterations,
            fft_size: self.fft_size,
            framer: Framer::new(window_size, hop_size)?,
            seed: self.seed,
            window: self.window,
            tolerance: self.tolerance,
        };
        log::debug!("built config: {:?}", config);
        Ok(config)
    }
}

fn config_error(msg: impl Into<String>) -> NmfError {
    NmfError::Configuration(msg.into())
}

/// Validated, immutable pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct NmfConfig {
    components: usize,
    iterations: usize,
    fft_size: usize,
    framer: Framer,
    seed: Option<u64>,
    window: WindowKind,
    tolerance: Option<f64>,
}

impl NmfConfig {
    pub fn components(&self) -> usize {
        self.components
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn window_size(&self) -> usize {
        self.framer.window_size()
    }

    pub fn hop_size(&self) -> usize {
        self.framer.hop_size()
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn window(&self) -> WindowKind {
        self.window
    }

    pub fn tolerance(&self) -> Option<f64> {
        self.tolerance
    }

    /// `B = fft_size / 2 + 1`.
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// `F` for a signal of `signal_len` samples.
    pub fn num_frames(&self, signal_len: usize) -> usize {
        self.framer.frame_count(signal_len)
    }

    /// Fully resolved options; `options().build()` reproduces this config.
    pub fn options(&self) -> NmfOptions {
        NmfOptions {
            components: self.components,
            iterations: self.iterations,
            fft_size: self.fft_size,
            window_size: Some(self.window_size()),
            hop_size: Some(self.hop_size()),
            seed: self.seed,
            window: self.window,
            tolerance: self.tolerance,
        }
    }
}

impl TryFrom<NmfOptions> for NmfConfig {
    type Error = NmfError;

    fn try_from(options: NmfOptions) -> Result<Self> {
        options.build()
    }
}
