//! A Symphonia-backed [`AudioSource`], the concrete "audio source"
//! collaborator (spec §6) for ingesting files from disk. Container and
//! codec decoding is explicitly out of the core's scope; this module is
//! the swappable adapter that plugs a decoded file into the framer.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::Error;
use crate::framer::AudioSource;

/// Decodes an entire audio file into memory up front. Adequate for the
/// ingest and `identify` CLI paths, which already need the whole clip
/// before framing; not suitable for unbounded streaming.
pub struct SymphoniaSource {
    sample_rate: u32,
    channels: u16,
    samples: Option<Vec<f32>>,
}

impl SymphoniaSource {
    pub fn open(path: &Path) -> Result<SymphoniaSource, Error> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|s| s.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::InvalidAudio(format!("unsupported format: {e}")))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
            .ok_or_else(|| Error::InvalidAudio("no compatible audio track found".into()))?;

        let dec_opts = DecoderOptions::default();
        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &dec_opts)
            .map_err(|e| Error::InvalidAudio(format!("failed to build decoder: {e}")))?;

        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(0);
        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    let params = format
                        .tracks()
                        .iter()
                        .find(|t| t.id == track_id)
                        .map(|t| t.codec_params.clone())
                        .ok_or_else(|| {
                            Error::InvalidAudio("track disappeared after reset".into())
                        })?;
                    decoder = symphonia::default::get_codecs()
                        .make(&params, &dec_opts)
                        .map_err(|e| {
                            Error::InvalidAudio(format!("failed to rebuild decoder: {e}"))
                        })?;
                    continue;
                }
                Err(err) => return Err(Error::InvalidAudio(format!("packet read error: {err}"))),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate = spec.rate;
                    channels = spec.channels.count() as u16;

                    let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buffer.samples());
                }
                Err(SymphoniaError::DecodeError(err)) => {
                    tracing::warn!(%err, "skipping undecodable packet");
                }
                Err(err) => {
                    return Err(Error::InvalidAudio(format!("fatal decode error: {err}")));
                }
            }
        }

        if channels == 0 {
            return Err(Error::InvalidAudio("audio source declared zero channels".into()));
        }

        Ok(SymphoniaSource {
            sample_rate,
            channels,
            samples: Some(samples),
        })
    }
}

impl SymphoniaSource {
    /// Duration of the decoded clip in milliseconds, derived from the
    /// interleaved sample count rather than container metadata (which may
    /// be absent or approximate). Must be called before [`Self::read_all`]
    /// drains the buffer.
    pub fn duration_ms(&self) -> u64 {
        let Some(samples) = self.samples.as_ref() else {
            return 0;
        };
        if self.channels == 0 || self.sample_rate == 0 {
            return 0;
        }
        let frames = samples.len() as u64 / self.channels as u64;
        1000 * frames / self.sample_rate as u64
    }
}

impl AudioSource for SymphoniaSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read_all(&mut self) -> Result<Vec<f32>, Error> {
        self.samples
            .take()
            .ok_or_else(|| Error::Internal("SymphoniaSource already drained".into()))
    }
}
