//! A cpal-backed [`AudioSource`] that records a fixed-duration buffer from
//! the default input device. Backs the `listen` CLI surface; per spec §9,
//! `listen` always captures a complete buffer up front and then runs the
//! same path as `identify`; streaming/partial matches are out of scope.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::Error;
use crate::framer::AudioSource;

/// Records `duration` seconds from the default input device, then hands
/// the buffer to the framer as any other [`AudioSource`] would.
pub struct CpalSource {
    sample_rate: u32,
    channels: u16,
    duration: Duration,
    samples: Option<Vec<f32>>,
}

impl CpalSource {
    pub fn record(duration: Duration) -> Result<CpalSource, Error> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::InvalidAudio("no default input device".into()))?;
        let config = device
            .default_input_config()
            .map_err(|e| Error::InvalidAudio(format!("no usable input config: {e}")))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        let recorded = Arc::new(Mutex::new(Vec::new()));
        let recorded_in_callback = recorded.clone();
        let err_fn = |err| tracing::warn!(%err, "input stream error");

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device
                .build_input_stream(
                    &config.clone().into(),
                    move |data: &[f32], _| {
                        recorded_in_callback.lock().unwrap().extend_from_slice(data);
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| Error::InvalidAudio(format!("failed to open input stream: {e}")))?,
            cpal::SampleFormat::I16 => device
                .build_input_stream(
                    &config.clone().into(),
                    move |data: &[i16], _| {
                        let mut samples = recorded_in_callback.lock().unwrap();
                        samples.extend(data.iter().map(|&s| s as f32 / i16::MAX as f32));
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| Error::InvalidAudio(format!("failed to open input stream: {e}")))?,
            other => {
                return Err(Error::InvalidAudio(format!(
                    "unsupported input sample format: {other:?}"
                )));
            }
        };

        stream.play().map_err(|e| Error::InvalidAudio(e.to_string()))?;
        std::thread::sleep(duration);
        drop(stream);

        let samples = Arc::try_unwrap(recorded)
            .map(|m| m.into_inner().unwrap())
            .unwrap_or_else(|arc| arc.lock().unwrap().clone());

        Ok(CpalSource {
            sample_rate,
            channels,
            duration,
            samples: Some(samples),
        })
    }
}

impl AudioSource for CpalSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read_all(&mut self) -> Result<Vec<f32>, Error> {
        self.samples.take().ok_or_else(|| {
            Error::Internal(format!(
                "CpalSource already drained ({:?} capture)",
                self.duration
            ))
        })
    }
}
