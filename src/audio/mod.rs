//! Audio helpers: WAV I/O, resampling and output post-processing

pub mod gain;
pub mod resampler;
pub mod wav;

pub use gain::{apply_gain_and_clip, peak};
pub use resampler::resample_mono;
pub use wav::{ensure_silent_placeholder, read_wav, to_mono, write_wav};
