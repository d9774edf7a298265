//! Audio sink abstraction over the platform output layer.
//!
//! The real-time callbacks live here as free functions closed over the ring
//! buffer and shared state; the [`AudioSink`] trait only covers lifecycle and
//! stream (re)configuration, so no virtual dispatch happens per sample.
//!
//! # Real-time safety
//!
//! The callbacks take no locks other than the ring buffer's own mutex (its
//! pop is the one sanctioned suspension point), never allocate, and never do
//! I/O. Gain is read from atomics each invocation.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, SampleRate, Stream, StreamConfig};

use super::ring::RingBuffer;
use super::state::MixerState;
use crate::config::SCRATCH_SAMPLES;
use crate::error::Error;

/// Which platform backend the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Platform default host.
    #[default]
    Default,
    Alsa,
    Pipewire,
    CoreAudio,
    Sndio,
}

impl BackendKind {
    fn host_name(self) -> Option<&'static str> {
        match self {
            BackendKind::Default => None,
            BackendKind::Alsa => Some("alsa"),
            BackendKind::Pipewire => Some("pipewire"),
            BackendKind::CoreAudio => Some("coreaudio"),
            BackendKind::Sndio => Some("sndio"),
        }
    }
}

/// Lifecycle interface of an audio sink.
///
/// `configure` owns the active→inactive→active dance some platforms need for
/// a format change: it tears the stream down and rebuilds it at the new rate,
/// leaving it stopped; `set_active` starts/stops delivery.
pub trait AudioSink {
    /// (Re)build the output stream at `rate`/`channels`. Returns the rate the
    /// device actually accepted. The stream is left inactive.
    fn configure(&mut self, rate: u32, channels: u16) -> Result<u32, Error>;

    /// Start or stop the callback. Idempotent.
    fn set_active(&mut self, active: bool);

    /// Stop and release the device.
    fn shutdown(&mut self);
}

/// cpal-backed sink. ALSA, CoreAudio and WASAPI arrive through cpal's host
/// layer; a requested backend with no matching host in this build is
/// reported as not compiled in.
pub struct CpalSink {
    device: Device,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    ring: Arc<RingBuffer>,
    state: Arc<MixerState>,
}

impl CpalSink {
    pub fn new(
        kind: BackendKind,
        ring: Arc<RingBuffer>,
        state: Arc<MixerState>,
    ) -> Result<Self, Error> {
        let host = match kind.host_name() {
            None => cpal::default_host(),
            Some(wanted) => {
                let id = cpal::available_hosts()
                    .into_iter()
                    .find(|id| id.name().eq_ignore_ascii_case(wanted))
                    .ok_or(Error::BackendUnavailable(wanted))?;
                cpal::host_from_id(id).map_err(|e| Error::audio_init(e.to_string()))?
            }
        };

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::audio_init("no output device found"))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".into());

        let supported = device
            .default_output_config()
            .map_err(|e| Error::audio_init(e.to_string()))?;
        let sample_format = match supported.sample_format() {
            f @ (SampleFormat::F32 | SampleFormat::I16) => f,
            other => {
                return Err(Error::audio_init(format!(
                    "unsupported sample format: {other:?}"
                )));
            }
        };

        tracing::info!(
            host = host.id().name(),
            device = %device_name,
            format = ?sample_format,
            "audio sink ready"
        );

        Ok(Self {
            device,
            sample_format,
            stream: None,
            ring,
            state,
        })
    }

    fn build(&self, config: &StreamConfig) -> Result<Stream, cpal::BuildStreamError> {
        match self.sample_format {
            SampleFormat::I16 => build_stream_i16(
                &self.device,
                config,
                Arc::clone(&self.ring),
                Arc::clone(&self.state),
            ),
            _ => build_stream_f32(
                &self.device,
                config,
                Arc::clone(&self.ring),
                Arc::clone(&self.state),
            ),
        }
    }
}

impl AudioSink for CpalSink {
    fn configure(&mut self, rate: u32, channels: u16) -> Result<u32, Error> {
        // The caller disarms the ring first, so no callback can be parked in
        // pop while the old stream is torn down.
        self.stream = None;

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(rate),
            buffer_size: BufferSize::Default,
        };

        let (stream, achieved) = match self.build(&config) {
            Ok(stream) => (stream, rate),
            Err(e) => {
                tracing::warn!(rate, "device rejected rate ({e}), using default config");
                let supported = self
                    .device
                    .default_output_config()
                    .map_err(|e| Error::audio_init(e.to_string()))?;
                let fallback = StreamConfig {
                    channels,
                    sample_rate: supported.sample_rate(),
                    buffer_size: BufferSize::Default,
                };
                let stream = self
                    .build(&fallback)
                    .map_err(|e| Error::audio_init(e.to_string()))?;
                (stream, fallback.sample_rate.0)
            }
        };

        // Some platforms autostart freshly-built streams.
        if let Err(e) = stream.pause() {
            tracing::debug!("pause after build: {e}");
        }
        self.stream = Some(stream);
        Ok(achieved)
    }

    fn set_active(&mut self, active: bool) {
        let Some(stream) = self.stream.as_ref() else {
            return;
        };
        let result = if active {
            stream.play().map_err(|e| e.to_string())
        } else {
            stream.pause().map_err(|e| e.to_string())
        };
        if let Err(e) = result {
            tracing::warn!(active, "stream state change failed: {e}");
        }
    }

    fn shutdown(&mut self) {
        self.set_active(false);
        self.stream = None;
    }
}

/// Callback for devices that take f32 natively.
fn build_stream_f32(
    device: &Device,
    config: &StreamConfig,
    ring: Arc<RingBuffer>,
    state: Arc<MixerState>,
) -> Result<Stream, cpal::BuildStreamError> {
    let mut scratch = vec![0.0f32; SCRATCH_SAMPLES];
    device.build_output_stream(
        config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if !state.decoder_active() || state.is_paused() {
                data.fill(0.0);
                return;
            }
            let gain = state.gain();
            let n = data.len().min(scratch.len());
            ring.pop(&mut scratch[..n]);
            for (out, s) in data[..n].iter_mut().zip(&scratch[..n]) {
                *out = s * gain;
            }
            data[n..].fill(0.0);
        },
        |err| tracing::error!("audio stream error: {err}"),
        None,
    )
}

/// Callback for devices that want i16: scale by i16::MAX, no dither.
fn build_stream_i16(
    device: &Device,
    config: &StreamConfig,
    ring: Arc<RingBuffer>,
    state: Arc<MixerState>,
) -> Result<Stream, cpal::BuildStreamError> {
    let mut scratch = vec![0.0f32; SCRATCH_SAMPLES];
    device.build_output_stream(
        config,
        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
            if !state.decoder_active() || state.is_paused() {
                data.fill(0);
                return;
            }
            let gain = state.gain();
            let n = data.len().min(scratch.len());
            ring.pop(&mut scratch[..n]);
            for (out, s) in data[..n].iter_mut().zip(&scratch[..n]) {
                *out = (s * gain * f32::from(i16::MAX)) as i16;
            }
            data[n..].fill(0);
        },
        |err| tracing::error!("audio stream error: {err}"),
        None,
    )
}

/// Sink that accepts every command and produces nothing. Used by tests and
/// as the fallback when no device is wanted.
#[derive(Debug, Default)]
pub struct NullSink {
    pub active: bool,
    pub rate: u32,
    pub channels: u16,
    /// Rate the fake "device" insists on; `None` accepts any.
    pub forced_rate: Option<u32>,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for NullSink {
    fn configure(&mut self, rate: u32, channels: u16) -> Result<u32, Error> {
        self.rate = self.forced_rate.unwrap_or(rate);
        self.channels = channels;
        self.active = false;
        Ok(self.rate)
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn shutdown(&mut self) {
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_reports_requested_rate() {
        let mut sink = NullSink::new();
        assert_eq!(sink.configure(44_100, 2).unwrap(), 44_100);
        assert_eq!(sink.channels, 2);
        assert!(!sink.active);
        sink.set_active(true);
        assert!(sink.active);
    }

    #[test]
    fn null_sink_can_pin_a_device_rate() {
        let mut sink = NullSink {
            forced_rate: Some(48_000),
            ..NullSink::default()
        };
        assert_eq!(sink.configure(44_100, 2).unwrap(), 48_000);
    }

    #[test]
    fn backend_host_names() {
        assert_eq!(BackendKind::Default.host_name(), None);
        assert_eq!(BackendKind::Alsa.host_name(), Some("alsa"));
        assert_eq!(BackendKind::Pipewire.host_name(), Some("pipewire"));
    }
}
