use anyhow::Context;
use rubato::Resampler;

/// Resample mono f32 audio to a target sample rate.
///
/// Input is expected to be PCM samples in [-1, 1] with a known sample rate.
pub fn resample_mono_f32(
    input_samples: &[f32],
    input_sample_rate_hz: u32,
    target_sample_rate_hz: u32,
) -> anyhow::Result<Vec<f32>> {
    if input_sample_rate_hz == target_sample_rate_hz || input_samples.is_empty() {
        return Ok(input_samples.to_vec());
    }
    anyhow::ensure!(
        input_sample_rate_hz > 0 && target_sample_rate_hz > 0,
        "sample rates must be positive"
    );

    let input_sample_rate_hz: usize = input_sample_rate_hz
        .try_into()
        .context("invalid input sample rate")?;
    let target_sample_rate_hz: usize = target_sample_rate_hz
        .try_into()
        .context("invalid target sample rate")?;

    let params = rubato::SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: rubato::SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window: rubato::WindowFunction::BlackmanHarris2,
    };

    let ratio = target_sample_rate_hz as f64 / input_sample_rate_hz as f64;
    let mut resampler = rubato::SincFixedIn::<f32>::new(ratio, 2.0, params, input_samples.len(), 1)
        .context("create resampler")?;

    let delay = resampler.output_delay();
    let expected = (input_samples.len() as f64 * ratio).round() as usize;

    let input = vec![input_samples.to_vec()];
    let mut out = resampler
        .process(&input, None)
        .context("resample")?
        .into_iter()
        .next()
        .unwrap_or_default();

    // The sinc filter lags by `delay` frames; feed silence until the tail is out.
    while out.len() < delay + expected {
        let flushed = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .context("flush resampler")?
            .into_iter()
            .next()
            .unwrap_or_default();
        if flushed.is_empty() {
            break;
        }
        out.extend(flushed);
    }

    out.drain(..delay.min(out.len()));
    out.truncate(expected);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_identity_returns_same() {
        let x = vec![0.0, 0.5, -0.5, 0.25];
        let y = resample_mono_f32(&x, 16_000, 16_000).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(resample_mono_f32(&[], 48_000, 16_000).unwrap().is_empty());
    }

    #[test]
    fn downsampling_shrinks_by_ratio() {
        let x = vec![0.0f32; 4_800];
        let y = resample_mono_f32(&x, 48_000, 16_000).unwrap();
        assert_eq!(y.len(), 1_600);
    }

    #[test]
    fn tail_of_the_signal_survives() {
        // One second of silence followed by a short burst right at the end.
        let mut x = vec![0.0f32; 48_000];
        for s in &mut x[47_520..] {
            *s = 0.5;
        }
        let y = resample_mono_f32(&x, 48_000, 16_000).unwrap();

        assert_eq!(y.len(), 16_000);
        let tail_peak = y[15_900..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(tail_peak > 0.25, "tail peak {tail_peak}");
        assert!(y[..15_000].iter().all(|s| s.abs() < 0.05));
    }

    #[test]
    fn short_inputs_are_flushed_too() {
        let x = vec![0.1f32; 30];
        let y = resample_mono_f32(&x, 48_000, 16_000).unwrap();
        assert_eq!(y.len(), 10);
    }
}
