use crate::{Result, VoxError};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;
use tracing::{debug, info};

/// Write mono or interleaved audio samples to a 16-bit WAV file
///
/// # Arguments
/// * `path` - Path to the output WAV file
/// * `samples` - Audio samples (f32, range -1.0 to 1.0)
/// * `sample_rate` - Sample rate in Hz
/// * `channels` - Number of channels
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = WavWriter::create(path.as_ref(), spec)
        .map_err(|e| VoxError::IOError(format!("Failed to create WAV writer: {}", e)))?;

    for &sample in samples {
        let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(sample_i16)
            .map_err(|e| VoxError::IOError(format!("Failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| VoxError::IOError(format!("Failed to finalize WAV file: {}", e)))?;

    debug!("Wrote {} samples to WAV file: {:?}", samples.len(), path.as_ref());
    Ok(())
}

/// Read audio samples from a WAV file
///
/// # Returns
/// * Tuple of (samples, sample_rate, channels)
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, u32, u16)> {
    let mut reader = WavReader::open(path.as_ref())
        .map_err(|e| VoxError::IOError(format!("Failed to open WAV file: {}", e)))?;

    let spec = reader.spec();

    debug!(
        "Reading WAV file: {} Hz, {} channels, {} bits",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    );

    let read_err = |e: hound::Error| VoxError::IOError(format!("Failed to read sample: {}", e));

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .map(|s| s.map_err(read_err))
            .collect::<Result<_>>()?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32).map_err(read_err))
            .collect::<Result<_>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8388608.0).map_err(read_err))
            .collect::<Result<_>>()?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / i32::MAX as f32).map_err(read_err))
            .collect::<Result<_>>()?,
        (_, bits) => {
            return Err(VoxError::AudioProcessingError(format!(
                "Unsupported bit depth: {}",
                bits
            )));
        }
    };

    Ok((samples, spec.sample_rate, spec.channels))
}

/// Down-mix interleaved audio to mono by averaging each frame
pub fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Write a silent mono placeholder unless a file already exists at `path`
///
/// Returns `true` when a new file was written.
pub fn ensure_silent_placeholder<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    duration_secs: f32,
) -> Result<bool> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(false);
    }

    let len = (sample_rate as f32 * duration_secs) as usize;
    write_wav(path, &vec![0.0f32; len], sample_rate, 1)?;

    info!(
        "Created silent reference placeholder ({:.1}s) at {:?}",
        duration_secs, path
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_write_read_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");

        let sample_rate = 24000;
        let samples: Vec<f32> = (0..sample_rate as usize)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect();

        write_wav(&path, &samples, sample_rate, 1).unwrap();
        let (read_samples, read_rate, read_channels) = read_wav(&path).unwrap();

        assert_eq!(read_rate, sample_rate);
        assert_eq!(read_channels, 1);
        assert_eq!(read_samples.len(), samples.len());

        // i16 quantization loses a little precision
        for (original, read) in samples.iter().zip(read_samples.iter()) {
            assert!((original - read).abs() < 0.001);
        }
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.wav");
        write_wav(&path, &[0.1, -0.1], 16000, 1).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_to_mono() {
        let stereo = vec![0.5, 0.3, 0.7, 0.1];
        let mono = to_mono(&stereo, 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.4).abs() < 0.001);
        assert!((mono[1] - 0.4).abs() < 0.001);

        assert_eq!(to_mono(&[0.2, 0.4], 1), vec![0.2, 0.4]);
    }

    #[test]
    fn test_placeholder_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref/reference_audio.wav");

        assert!(ensure_silent_placeholder(&path, 24000, 1.0).unwrap());
        assert!(!ensure_silent_placeholder(&path, 24000, 1.0).unwrap());

        let (samples, rate, _) = read_wav(&path).unwrap();
        assert_eq!(rate, 24000);
        assert_eq!(samples.len(), 24000);
        assert!(samples.iter().all(|s| *s == 0.0));
    }
}
