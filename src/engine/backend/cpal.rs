//! CPAL-based audio backend for desktop platforms (Linux, macOS, Windows)
//! and the stream layer underneath the iOS adapter.
//!
//! CPAL drives audio through callbacks and its `Stream` handle is not `Send`,
//! while the passthrough loop expects blocking reads and non-blocking writes
//! from a thread it owns. Each stream therefore lives on a small host thread
//! and exchanges samples with the loop through lock-free rtrb ring buffers.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::AudioError;

use super::{InputStream, OutputStream, StreamBackend, StreamRequest};

/// Used when the device does not report a supported buffer range.
const FALLBACK_MIN_FRAMES: usize = 2048;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Who decides the hardware buffer size.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// Ask CPAL for exactly the requested number of frames.
    #[default]
    Fixed,
    /// Leave it to the platform audio session (iOS IO buffer duration).
    SessionManaged,
}

/// Backend on the default CPAL host.
#[derive(Debug, Default)]
pub struct CpalBackend {
    buffer_mode: BufferMode,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::with_buffer_mode(BufferMode::Fixed)
    }

    pub fn with_buffer_mode(buffer_mode: BufferMode) -> Self {
        Self { buffer_mode }
    }
}

fn default_input_device() -> Result<cpal::Device, AudioError> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| AudioError::StreamOpenFailed {
            reason: "No default input device found".to_string(),
        })
}

fn default_output_device() -> Result<cpal::Device, AudioError> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::StreamOpenFailed {
            reason: "No default output device found".to_string(),
        })
}

fn min_frames(buffer_size: &cpal::SupportedBufferSize) -> usize {
    match buffer_size {
        cpal::SupportedBufferSize::Range { min, .. } if *min > 0 => *min as usize,
        _ => FALLBACK_MIN_FRAMES,
    }
}

fn stream_config(channels: u16, request: &StreamRequest, mode: BufferMode) -> cpal::StreamConfig {
    let buffer_size = match mode {
        BufferMode::Fixed => cpal::BufferSize::Fixed(request.buffer_frames as u32),
        BufferMode::SessionManaged => cpal::BufferSize::Default,
    };
    cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(request.sample_rate_hz),
        buffer_size,
    }
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

impl StreamBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn min_input_buffer_frames(&self, _sample_rate_hz: u32) -> Result<usize, AudioError> {
        let config = default_input_device()?
            .default_input_config()
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("Failed to get default input config: {:?}", e),
            })?;
        Ok(min_frames(config.buffer_size()))
    }

    fn min_output_buffer_frames(&self, _sample_rate_hz: u32) -> Result<usize, AudioError> {
        let config = default_output_device()?
            .default_output_config()
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("Failed to get default output config: {:?}", e),
            })?;
        Ok(min_frames(config.buffer_size()))
    }

    fn open_input(&self, request: &StreamRequest) -> Result<Box<dyn InputStream>, AudioError> {
        let capacity = (request.buffer_frames * 8).max(4096);
        let (producer, consumer) = RingBuffer::<i16>::new(capacity);
        let faulted = Arc::new(AtomicBool::new(false));

        let request_copy = *request;
        let mode = self.buffer_mode;
        let callback_fault = Arc::clone(&faulted);
        let host = StreamHost::spawn("cpal-input", move || {
            build_input_stream(&request_copy, mode, producer, callback_fault)
        })?;

        Ok(Box::new(CpalInput {
            host,
            consumer,
            faulted,
            buffer_frames: request.buffer_frames,
        }))
    }

    fn open_output(&self, request: &StreamRequest) -> Result<Box<dyn OutputStream>, AudioError> {
        let capacity = (request.buffer_frames * 2).max(1);
        let (producer, consumer) = RingBuffer::<i16>::new(capacity);
        let faulted = Arc::new(AtomicBool::new(false));
        let gain = Arc::new(AtomicU32::new(1.0f32.to_bits()));

        let request_copy = *request;
        let mode = self.buffer_mode;
        let callback_fault = Arc::clone(&faulted);
        let callback_gain = Arc::clone(&gain);
        let host = StreamHost::spawn("cpal-output", move || {
            build_output_stream(&request_copy, mode, consumer, callback_gain, callback_fault)
        })?;

        Ok(Box::new(CpalOutput {
            host,
            producer,
            faulted,
            gain,
            buffer_frames: request.buffer_frames,
        }))
    }
}

fn build_input_stream(
    request: &StreamRequest,
    mode: BufferMode,
    mut producer: Producer<i16>,
    faulted: Arc<AtomicBool>,
) -> Result<cpal::Stream, AudioError> {
    let device = default_input_device()?;
    let supported = device
        .default_input_config()
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to get default input config: {:?}", e),
        })?;

    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(AudioError::StreamOpenFailed {
            reason: "Only F32 sample format is currently supported for input".to_string(),
        });
    }

    let config = stream_config(supported.channels(), request, mode);
    let channels_count = config.channels.max(1) as usize;

    let err_fn = move |err: cpal::StreamError| {
        log::error!("[CpalBackend] Input stream error: {}", err);
        faulted.store(true, Ordering::Release);
    };

    device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Keep the first channel; overflow drops the newest samples.
                for frame in data.chunks(channels_count) {
                    if let Some(&sample) = frame.first() {
                        let _ = producer.push(f32_to_i16(sample));
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("{:?}", e),
        })
}

fn build_output_stream(
    request: &StreamRequest,
    mode: BufferMode,
    mut consumer: Consumer<i16>,
    gain: Arc<AtomicU32>,
    faulted: Arc<AtomicBool>,
) -> Result<cpal::Stream, AudioError> {
    let device = default_output_device()?;
    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to get default output config: {:?}", e),
        })?;

    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(AudioError::StreamOpenFailed {
            reason: "Only F32 sample format is currently supported for output".to_string(),
        });
    }

    let config = stream_config(supported.channels(), request, mode);
    let channels_count = config.channels.max(1) as usize;

    let err_fn = move |err: cpal::StreamError| {
        log::error!("[CpalBackend] Output stream error: {}", err);
        faulted.store(true, Ordering::Release);
    };

    device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let volume = f32::from_bits(gain.load(Ordering::Relaxed));
                for frame in data.chunks_mut(channels_count) {
                    // Underrun plays silence.
                    let value = consumer
                        .pop()
                        .map(|s| s as f32 / 32768.0 * volume)
                        .unwrap_or(0.0);
                    frame.fill(value);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("{:?}", e),
        })
}

enum HostCommand {
    Play(mpsc::Sender<Result<(), AudioError>>),
    Shutdown,
}

/// Thread owning one `cpal::Stream` for its whole life.
struct StreamHost {
    commands: mpsc::Sender<HostCommand>,
    thread: Option<JoinHandle<()>>,
}

impl StreamHost {
    fn spawn<F>(name: &str, build: F) -> Result<Self, AudioError>
    where
        F: FnOnce() -> Result<cpal::Stream, AudioError> + Send + 'static,
    {
        let (commands, command_rx) = mpsc::channel::<HostCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                while let Ok(command) = command_rx.recv() {
                    match command {
                        HostCommand::Play(reply) => {
                            let result = stream.play().map_err(|e| AudioError::HardwareError {
                                details: format!("Stream start failed: {}", e),
                            });
                            let _ = reply.send(result);
                        }
                        HostCommand::Shutdown => break,
                    }
                }
                drop(stream);
            })
            .map_err(|e| AudioError::HardwareError {
                details: format!("Failed to spawn stream host thread: {}", e),
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                commands,
                thread: Some(thread),
            }),
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioError::StreamOpenFailed {
                    reason: "stream host exited before reporting".to_string(),
                })
            }
        }
    }

    fn play(&self) -> Result<(), AudioError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.commands
            .send(HostCommand::Play(reply_tx))
            .map_err(|_| AudioError::StreamFailure {
                reason: "stream host is gone".to_string(),
            })?;
        reply_rx.recv().map_err(|_| AudioError::StreamFailure {
            reason: "stream host is gone".to_string(),
        })?
    }

    fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.commands.send(HostCommand::Shutdown);
            if thread.join().is_err() {
                log::warn!("[CpalBackend] Stream host thread panicked");
            }
        }
    }
}

impl Drop for StreamHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct CpalInput {
    host: StreamHost,
    consumer: Consumer<i16>,
    faulted: Arc<AtomicBool>,
    buffer_frames: usize,
}

impl InputStream for CpalInput {
    fn start(&mut self) -> Result<(), AudioError> {
        self.host.play()
    }

    fn read(&mut self, buffer: &mut [i16], timeout: Duration) -> Result<usize, AudioError> {
        let deadline = Instant::now() + timeout;

        loop {
            if self.faulted.load(Ordering::Acquire) {
                return Err(AudioError::StreamFailure {
                    reason: "input stream reported an error".to_string(),
                });
            }

            let available = self.consumer.slots();
            if available >= buffer.len() || (available > 0 && Instant::now() >= deadline) {
                let n = available.min(buffer.len());
                let chunk = self
                    .consumer
                    .read_chunk(n)
                    .map_err(|e| AudioError::StreamFailure {
                        reason: format!("{:?}", e),
                    })?;
                let (first, second) = chunk.as_slices();
                buffer[..first.len()].copy_from_slice(first);
                buffer[first.len()..n].copy_from_slice(second);
                chunk.commit_all();
                return Ok(n);
            }

            if Instant::now() >= deadline {
                return Ok(0);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn buffer_frames(&self) -> usize {
        self.buffer_frames
    }

    fn close(&mut self) -> Result<(), AudioError> {
        self.host.shutdown();
        Ok(())
    }
}

struct CpalOutput {
    host: StreamHost,
    producer: Producer<i16>,
    faulted: Arc<AtomicBool>,
    gain: Arc<AtomicU32>,
    buffer_frames: usize,
}

impl OutputStream for CpalOutput {
    fn start(&mut self) -> Result<(), AudioError> {
        self.host.play()
    }

    fn write_non_blocking(&mut self, frames: &[i16]) -> Result<usize, AudioError> {
        if self.faulted.load(Ordering::Acquire) {
            return Err(AudioError::StreamFailure {
                reason: "output stream reported an error".to_string(),
            });
        }

        let n = frames.len().min(self.producer.slots());
        if n == 0 {
            return Ok(0);
        }
        let chunk = self
            .producer
            .write_chunk_uninit(n)
            .map_err(|e| AudioError::StreamFailure {
                reason: format!("{:?}", e),
            })?;
        Ok(chunk.fill_from_iter(frames.iter().copied()))
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), AudioError> {
        self.gain
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        Ok(())
    }

    fn buffer_frames(&self) -> usize {
        self.buffer_frames
    }

    fn close(&mut self) -> Result<(), AudioError> {
        self.host.shutdown();
        Ok(())
    }
}
