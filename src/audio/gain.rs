/// Amplify samples by `gain` and hard-clip them to the valid [-1.0, 1.0] range
pub fn apply_gain_and_clip(samples: &mut [f32], gain: f32) {
    for sample in samples.iter_mut() {
        *sample = (*sample * gain).clamp(-1.0, 1.0);
    }
}

/// Peak absolute amplitude of a buffer
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_scales_quiet_audio() {
        let mut samples = vec![0.1, -0.2, 0.0];
        apply_gain_and_clip(&mut samples, 2.0);
        assert!((samples[0] - 0.2).abs() < 1e-6);
        assert!((samples[1] + 0.4).abs() < 1e-6);
        assert_eq!(samples[2], 0.0);
    }

    #[test]
    fn test_gain_clips_to_unit_range() {
        let mut samples = vec![0.8, -0.9, 0.3];
        apply_gain_and_clip(&mut samples, 2.0);
        assert_eq!(samples[0], 1.0);
        assert_eq!(samples[1], -1.0);
        assert!(peak(&samples) <= 1.0);
    }
}
