use std::fmt;

/// Top-level error type for the specnmf-core public API.
///
/// Every variant describes a caller contract violation detected before any
/// numeric work, except `Dsp` which wraps a failure of the FFT primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum NmfError {
    /// Invalid configuration (component count, iteration count, sizes).
    Configuration(String),
    /// Supplied matrix does not match the grid implied by signal + config.
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    /// Component index outside `[0, count)`.
    IndexOutOfRange { index: usize, count: usize },
    /// Signal shorter than one analysis window.
    InputTooShort { len: usize, window_size: usize },
    /// FFT / STFT failure.
    Dsp(String),
}

impl fmt::Display for NmfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NmfError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            NmfError::ShapeMismatch {
                what,
                expected,
                actual,
            } => write!(
                f,
                "shape mismatch for {}: expected {}x{}, got {}x{}",
                what, expected.0, expected.1, actual.0, actual.1
            ),
            NmfError::IndexOutOfRange { index, count } => write!(
                f,
                "component index {} out of range (component count is {})",
                index, count
            ),
            NmfError::InputTooShort { len, window_size } => write!(
                f,
                "input too short: {} samples, need at least one window of {}",
                len, window_size
            ),
            NmfError::Dsp(msg) => write!(f, "DSP error: {}", msg),
        }
    }
}

impl std::error::Error for NmfError {}

/// Convenience alias so callers can write `Result<T>` instead of `Result<T, NmfError>`.
pub type Result<T> = std::result::Result<T, NmfError>;
