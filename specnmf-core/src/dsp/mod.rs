pub mod framer;
pub mod magnitude;
pub mod stft;
pub mod window;
