use crate::{Result, VoxError};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

const CHUNK_FRAMES: usize = 1024;

/// Resample mono audio from `input_rate` to `output_rate`
///
/// Returns the input unchanged when the rates already match. The tail chunk
/// is zero-padded for the resampler and the padding is cut from the output.
pub fn resample_mono(input: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
    if input_rate == 0 || output_rate == 0 {
        return Err(VoxError::ConfigError(
            "Sample rates must be greater than 0".into(),
        ));
    }
    if input_rate == output_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let ratio = output_rate as f64 / input_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_FRAMES, 1)
        .map_err(|e| VoxError::AudioProcessingError(format!("Failed to create resampler: {}", e)))?;

    let expected = (input.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(expected + CHUNK_FRAMES);

    for chunk in input.chunks(CHUNK_FRAMES) {
        let mut planar = vec![vec![0.0f32; CHUNK_FRAMES]];
        planar[0][..chunk.len()].copy_from_slice(chunk);

        let processed = resampler
            .process(&planar, None)
            .map_err(|e| VoxError::AudioProcessingError(format!("Resampling failed: {}", e)))?;

        let produced = &processed[0];
        let keep = if chunk.len() < CHUNK_FRAMES {
            ((chunk.len() as f64) * ratio).ceil() as usize
        } else {
            produced.len()
        };
        output.extend_from_slice(&produced[..keep.min(produced.len())]);
    }

    debug!(
        "Resampled {} samples at {} Hz -> {} samples at {} Hz",
        input.len(),
        input_rate,
        output.len(),
        output_rate
    );

    Ok(output)
}
