//! Sample-rate conversion for devices that cannot capture at 16 kHz

use rubato::{FftFixedIn, Resampler};

use crate::{Error, Result};

/// Input chunk size fed to the resampler
const CHUNK_FRAMES: usize = 1024;

/// Resample a mono buffer from one rate to another
///
/// The tail is zero-padded to a full chunk; for speech buffers the extra
/// few milliseconds of silence are harmless.
///
/// # Errors
///
/// Returns `Error::Device` if the resampler rejects the rate pair
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_FRAMES, 2, 1)
            .map_err(|e| Error::Device(format!("resampler init failed: {e}")))?;

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut output = Vec::with_capacity((samples.len() as f64 * ratio) as usize + CHUNK_FRAMES);

    for chunk in samples.chunks(CHUNK_FRAMES) {
        let frame = if chunk.len() == CHUNK_FRAMES {
            chunk.to_vec()
        } else {
            let mut padded = chunk.to_vec();
            padded.resize(CHUNK_FRAMES, 0.0);
            padded
        };

        let mut processed = resampler
            .process(&[frame], None)
            .map_err(|e| Error::Device(format!("resample failed: {e}")))?;

        if let Some(channel) = processed.pop() {
            output.extend_from_slice(&channel);
        }
    }

    Ok(output)
}
