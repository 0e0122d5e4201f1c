//! Oboe-based audio backend for Android.
//!
//! Both directions are opened as blocking (sync) streams so the passthrough
//! loop can drive them from its own thread:
//! - input: mono 16-bit PCM with the voice-communication input preset
//! - output: mono 16-bit PCM with voice-communication usage and speech
//!   content type
//!
//! Minimum buffer sizes come from the platform's
//! `AudioRecord.getMinBufferSize` / `AudioTrack.getMinBufferSize` via JNI.

use std::time::Duration;

use jni::objects::JValue;
use oboe::{
    AudioInputStreamSync, AudioOutputStreamSync, AudioStream, AudioStreamBase,
    AudioStreamBuilder, AudioStreamSync, ContentType, Input, InputPreset, Mono, Output,
    PerformanceMode, SharingMode, Usage,
};

use crate::error::AudioError;

use super::{InputStream, OutputStream, StreamBackend, StreamRequest};

// android.media.AudioFormat constants
const CHANNEL_IN_MONO: i32 = 16;
const CHANNEL_OUT_MONO: i32 = 4;
const ENCODING_PCM_16BIT: i32 = 2;
const BYTES_PER_FRAME: i32 = 2;

/// Android backend opening Oboe sync streams.
#[derive(Debug, Default)]
pub struct OboeBackend;

impl OboeBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Query a platform `getMinBufferSize(rate, channelMask, encoding)` and
/// convert the byte count to mono 16-bit frames.
fn platform_min_frames(
    class: &'static str,
    sample_rate_hz: u32,
    channel_mask: i32,
) -> Result<usize, AudioError> {
    let bytes = crate::android::with_env(|env, _context| {
        env.call_static_method(
            class,
            "getMinBufferSize",
            "(III)I",
            &[
                JValue::Int(sample_rate_hz as i32),
                JValue::Int(channel_mask),
                JValue::Int(ENCODING_PCM_16BIT),
            ],
        )?
        .i()
    })?;

    // ERROR (-1) and ERROR_BAD_VALUE (-2) mean the rate is unsupported.
    if bytes <= 0 {
        return Err(AudioError::StreamOpenFailed {
            reason: format!(
                "{}.getMinBufferSize({}) returned {}",
                class, sample_rate_hz, bytes
            ),
        });
    }

    Ok((bytes / BYTES_PER_FRAME) as usize)
}

impl StreamBackend for OboeBackend {
    fn name(&self) -> &'static str {
        "oboe"
    }

    fn min_input_buffer_frames(&self, sample_rate_hz: u32) -> Result<usize, AudioError> {
        platform_min_frames("android/media/AudioRecord", sample_rate_hz, CHANNEL_IN_MONO)
    }

    fn min_output_buffer_frames(&self, sample_rate_hz: u32) -> Result<usize, AudioError> {
        platform_min_frames("android/media/AudioTrack", sample_rate_hz, CHANNEL_OUT_MONO)
    }

    fn open_input(&self, request: &StreamRequest) -> Result<Box<dyn InputStream>, AudioError> {
        let stream = AudioStreamBuilder::default()
            .set_performance_mode(PerformanceMode::LowLatency)
            .set_sharing_mode(SharingMode::Shared)
            .set_input_preset(InputPreset::VoiceCommunication)
            .set_direction::<Input>()
            .set_sample_rate(request.sample_rate_hz as i32)
            .set_buffer_capacity_in_frames(request.buffer_frames as i32)
            .set_channel_count::<Mono>()
            .set_format::<i16>()
            .open_stream()
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("Input stream: {:?}", e),
            })?;

        Ok(Box::new(OboeInput {
            stream: Some(stream),
            requested_frames: request.buffer_frames,
        }))
    }

    fn open_output(&self, request: &StreamRequest) -> Result<Box<dyn OutputStream>, AudioError> {
        let mut stream = AudioStreamBuilder::default()
            .set_performance_mode(PerformanceMode::LowLatency)
            .set_sharing_mode(SharingMode::Shared)
            .set_usage(Usage::VoiceCommunication)
            .set_content_type(ContentType::Speech)
            .set_direction::<Output>()
            .set_sample_rate(request.sample_rate_hz as i32)
            .set_buffer_capacity_in_frames(request.buffer_frames as i32)
            .set_channel_count::<Mono>()
            .set_format::<i16>()
            .open_stream()
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("Output stream: {:?}", e),
            })?;

        if let Err(e) = stream.set_buffer_size_in_frames(request.buffer_frames as i32) {
            log::warn!("[OboeBackend] Could not set output buffer size: {:?}", e);
        }

        Ok(Box::new(OboeOutput {
            stream: Some(stream),
            requested_frames: request.buffer_frames,
            scratch: vec![0; request.buffer_frames.max(1)],
            volume: 1.0,
        }))
    }
}

struct OboeInput {
    stream: Option<AudioStreamSync<Input, (i16, Mono)>>,
    requested_frames: usize,
}

impl InputStream for OboeInput {
    fn start(&mut self) -> Result<(), AudioError> {
        let stream = self.stream.as_mut().ok_or_else(closed_stream)?;
        stream.start().map_err(|e| AudioError::HardwareError {
            details: format!("Failed to start input stream: {:?}", e),
        })
    }

    fn read(&mut self, buffer: &mut [i16], timeout: Duration) -> Result<usize, AudioError> {
        let stream = self.stream.as_mut().ok_or_else(closed_stream)?;
        let frames = stream
            .read(buffer, timeout.as_nanos() as i64)
            .map_err(|e| AudioError::StreamFailure {
                reason: format!("Input read: {:?}", e),
            })?;
        Ok(frames.max(0) as usize)
    }

    fn buffer_frames(&self) -> usize {
        self.stream
            .as_ref()
            .map(|s| s.get_buffer_size_in_frames())
            .filter(|frames| *frames > 0)
            .map_or(self.requested_frames, |frames| frames as usize)
    }

    fn close(&mut self) -> Result<(), AudioError> {
        if let Some(mut stream) = self.stream.take() {
            stream.stop().map_err(|e| AudioError::HardwareError {
                details: format!("Failed to stop input stream: {:?}", e),
            })?;
        }
        Ok(())
    }
}

struct OboeOutput {
    stream: Option<AudioStreamSync<Output, (i16, Mono)>>,
    requested_frames: usize,
    scratch: Vec<i16>,
    volume: f32,
}

impl OutputStream for OboeOutput {
    fn start(&mut self) -> Result<(), AudioError> {
        let stream = self.stream.as_mut().ok_or_else(closed_stream)?;
        stream.start().map_err(|e| AudioError::HardwareError {
            details: format!("Failed to start output stream: {:?}", e),
        })
    }

    fn write_non_blocking(&mut self, frames: &[i16]) -> Result<usize, AudioError> {
        let stream = self.stream.as_mut().ok_or_else(closed_stream)?;

        let samples: &[i16] = if (self.volume - 1.0).abs() < f32::EPSILON {
            frames
        } else {
            if self.scratch.len() < frames.len() {
                self.scratch.resize(frames.len(), 0);
            }
            for (out, &sample) in self.scratch.iter_mut().zip(frames) {
                *out = (sample as f32 * self.volume) as i16;
            }
            &self.scratch[..frames.len()]
        };

        let written = stream
            .write(samples, 0)
            .map_err(|e| AudioError::StreamFailure {
                reason: format!("Output write: {:?}", e),
            })?;
        Ok(written.max(0) as usize)
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), AudioError> {
        self.volume = volume.clamp(0.0, 1.0);
        Ok(())
    }

    fn buffer_frames(&self) -> usize {
        self.stream
            .as_ref()
            .map(|s| s.get_buffer_size_in_frames())
            .filter(|frames| *frames > 0)
            .map_or(self.requested_frames, |frames| frames as usize)
    }

    fn close(&mut self) -> Result<(), AudioError> {
        if let Some(mut stream) = self.stream.take() {
            stream.stop().map_err(|e| AudioError::HardwareError {
                details: format!("Failed to stop output stream: {:?}", e),
            })?;
        }
        Ok(())
    }
}

fn closed_stream() -> AudioError {
    AudioError::StreamFailure {
        reason: "stream already closed".to_string(),
    }
}
