//! Hardware audio through `cpal`.
//!
//! Each tap and sink owns its cpal stream on a dedicated thread, because
//! `cpal::Stream` is not `Send` on every platform. The owning handle talks to
//! that thread over a command channel and joins it on drop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use parking_lot::Mutex;

use super::backend::{
    AudioBackend, AudioDevice, CompletionCallback, InputCallback, InputTap, OutputSink,
};
use super::base::{AUDIO_LEVEL_REPORTS_PER_SECOND, AudioChunk, AudioError, AudioFormat, AudioResult};

enum StreamCommand {
    Play(std_mpsc::Sender<AudioResult<()>>),
    Pause(std_mpsc::Sender<AudioResult<()>>),
}

/// Backend over the platform's default cpal host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

fn find_input_device(host: &cpal::Host, device: Option<&AudioDevice>) -> AudioResult<cpal::Device> {
    if let Some(wanted) = device {
        let mut devices = host
            .input_devices()
            .map_err(|e| AudioError::Backend(e.to_string()))?;
        if let Some(found) = devices.find(|d| d.name().map(|n| n == wanted.id).unwrap_or(false)) {
            return Ok(found);
        }
        tracing::warn!("Input device '{}' not found, using default", wanted.name);
    }
    host.default_input_device()
        .ok_or_else(|| AudioError::DeviceUnavailable("no default input device".to_string()))
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn input_devices(&self) -> AudioResult<Vec<AudioDevice>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| AudioError::Backend(e.to_string()))?;
        Ok(devices
            .filter_map(|d| d.name().ok())
            .map(|name| AudioDevice::new(name.clone(), name))
            .collect())
    }

    fn default_input_device(&self) -> Option<AudioDevice> {
        cpal::default_host()
            .default_input_device()
            .and_then(|d| d.name().ok())
            .map(|name| AudioDevice::new(name.clone(), name))
    }

    fn open_input(
        &self,
        device: Option<&AudioDevice>,
        on_block: InputCallback,
    ) -> AudioResult<Box<dyn InputTap>> {
        let device = device.cloned();
        let (ready_tx, ready_rx) = std_mpsc::channel::<AudioResult<AudioFormat>>();
        let (command_tx, command_rx) = std_mpsc::channel::<StreamCommand>();

        let thread = std::thread::Builder::new()
            .name("gemini-live-input".to_string())
            .spawn(move || {
                let host = cpal::default_host();
                let built = find_input_device(&host, device.as_ref())
                    .and_then(|device| build_input_stream(&device, on_block));
                let (stream, format) = match built {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(format));
                run_commands(&stream, command_rx);
            })
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        let format = ready_rx
            .recv()
            .map_err(|_| AudioError::Backend("input thread exited".to_string()))??;

        Ok(Box::new(CpalInputTap {
            commands: Some(command_tx),
            thread: Some(thread),
            format,
        }))
    }

    fn open_output(&self) -> AudioResult<Box<dyn OutputSink>> {
        let queue = Arc::new(Mutex::new(VecDeque::<QueuedBuffer>::new()));
        let (ready_tx, ready_rx) = std_mpsc::channel::<AudioResult<AudioFormat>>();
        let (command_tx, command_rx) = std_mpsc::channel::<StreamCommand>();

        let stream_queue = queue.clone();
        let thread = std::thread::Builder::new()
            .name("gemini-live-output".to_string())
            .spawn(move || {
                let host = cpal::default_host();
                let built = host
                    .default_output_device()
                    .ok_or_else(|| {
                        AudioError::DeviceUnavailable("no default output device".to_string())
                    })
                    .and_then(|device| build_output_stream(&device, stream_queue));
                let (stream, format) = match built {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(format));
                run_commands(&stream, command_rx);
            })
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        let format = ready_rx
            .recv()
            .map_err(|_| AudioError::Backend("output thread exited".to_string()))??;

        Ok(Box::new(CpalOutputSink {
            commands: Some(command_tx),
            thread: Some(thread),
            format,
            queue,
        }))
    }
}

/// Serve play/pause requests until the handle is dropped.
fn run_commands(stream: &cpal::Stream, commands: std_mpsc::Receiver<StreamCommand>) {
    while let Ok(command) = commands.recv() {
        match command {
            StreamCommand::Play(reply) => {
                let _ = reply.send(stream.play().map_err(|e| AudioError::Stream(e.to_string())));
            }
            StreamCommand::Pause(reply) => {
                let _ = reply.send(stream.pause().map_err(|e| AudioError::Stream(e.to_string())));
            }
        }
    }
}

fn send_command(
    commands: &Option<std_mpsc::Sender<StreamCommand>>,
    make: fn(std_mpsc::Sender<AudioResult<()>>) -> StreamCommand,
) -> AudioResult<()> {
    let commands = commands
        .as_ref()
        .ok_or_else(|| AudioError::Stream("stream closed".to_string()))?;
    let (reply_tx, reply_rx) = std_mpsc::channel();
    commands
        .send(make(reply_tx))
        .map_err(|_| AudioError::Stream("stream thread exited".to_string()))?;
    reply_rx
        .recv()
        .map_err(|_| AudioError::Stream("stream thread exited".to_string()))?
}

// =============================================================================
// Input
// =============================================================================

struct CpalInputTap {
    commands: Option<std_mpsc::Sender<StreamCommand>>,
    thread: Option<JoinHandle<()>>,
    format: AudioFormat,
}

impl InputTap for CpalInputTap {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn play(&mut self) -> AudioResult<()> {
        send_command(&self.commands, StreamCommand::Play)
    }

    fn pause(&mut self) -> AudioResult<()> {
        send_command(&self.commands, StreamCommand::Pause)
    }
}

impl Drop for CpalInputTap {
    fn drop(&mut self) {
        self.commands.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn build_input_stream(
    device: &cpal::Device,
    on_block: InputCallback,
) -> AudioResult<(cpal::Stream, AudioFormat)> {
    let supported = device
        .default_input_config()
        .map_err(|e| AudioError::Backend(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let format = AudioFormat::float(config.sample_rate.0, config.channels);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => input_stream::<f32>(device, &config, format, on_block),
        cpal::SampleFormat::I16 => input_stream::<i16>(device, &config, format, on_block),
        cpal::SampleFormat::U16 => input_stream::<u16>(device, &config, format, on_block),
        other => Err(AudioError::Backend(format!(
            "unsupported input sample format {:?}",
            other
        ))),
    }?;
    stream
        .pause()
        .map_err(|e| AudioError::Stream(e.to_string()))?;
    Ok((stream, format))
}

/// Blocks are accumulated to a tenth of a second so level reports arrive at
/// a steady rate regardless of the hardware buffer size.
fn input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    format: AudioFormat,
    mut on_block: InputCallback,
) -> AudioResult<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let block_samples = (format.sample_rate / AUDIO_LEVEL_REPORTS_PER_SECOND) as usize
        * format.channels as usize;
    let mut pending: Vec<f32> = Vec::with_capacity(block_samples);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                for sample in data {
                    pending.push(f32::from_sample(*sample));
                    if pending.len() >= block_samples {
                        on_block(AudioChunk::from_f32(
                            format.sample_rate,
                            format.channels,
                            &pending,
                        ));
                        pending.clear();
                    }
                }
            },
            |err| tracing::error!("Input stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::Stream(e.to_string()))
}

// =============================================================================
// Output
// =============================================================================

struct QueuedBuffer {
    samples: Vec<f32>,
    position: usize,
    on_complete: Option<CompletionCallback>,
}

struct CpalOutputSink {
    commands: Option<std_mpsc::Sender<StreamCommand>>,
    thread: Option<JoinHandle<()>>,
    format: AudioFormat,
    queue: Arc<Mutex<VecDeque<QueuedBuffer>>>,
}

impl OutputSink for CpalOutputSink {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn play(&mut self) -> AudioResult<()> {
        send_command(&self.commands, StreamCommand::Play)
    }

    fn schedule(&mut self, chunk: AudioChunk, on_complete: CompletionCallback) -> AudioResult<()> {
        if chunk.format() != self.format {
            return Err(AudioError::Conversion(format!(
                "expected {}, got {}",
                self.format,
                chunk.format()
            )));
        }
        self.queue.lock().push_back(QueuedBuffer {
            samples: chunk.samples_f32(),
            position: 0,
            on_complete: Some(on_complete),
        });
        Ok(())
    }

    fn flush(&mut self) {
        self.queue.lock().clear();
    }
}

impl Drop for CpalOutputSink {
    fn drop(&mut self) {
        self.commands.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.queue.lock().clear();
    }
}

fn build_output_stream(
    device: &cpal::Device,
    queue: Arc<Mutex<VecDeque<QueuedBuffer>>>,
) -> AudioResult<(cpal::Stream, AudioFormat)> {
    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::Backend(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let format = AudioFormat::float(config.sample_rate.0, config.channels);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => output_stream::<f32>(device, &config, queue),
        cpal::SampleFormat::I16 => output_stream::<i16>(device, &config, queue),
        cpal::SampleFormat::U16 => output_stream::<u16>(device, &config, queue),
        other => Err(AudioError::Backend(format!(
            "unsupported output sample format {:?}",
            other
        ))),
    }?;
    stream
        .pause()
        .map_err(|e| AudioError::Stream(e.to_string()))?;
    Ok((stream, format))
}

fn output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: Arc<Mutex<VecDeque<QueuedBuffer>>>,
) -> AudioResult<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut finished = Vec::new();
                {
                    let mut queue = queue.lock();
                    for out in data.iter_mut() {
                        let sample = loop {
                            let Some(front) = queue.front_mut() else {
                                // Underrun
                                break 0.0;
                            };
                            if front.position < front.samples.len() {
                                let sample = front.samples[front.position];
                                front.position += 1;
                                break sample;
                            }
                            if let Some(done) = queue.pop_front().and_then(|b| b.on_complete) {
                                finished.push(done);
                            }
                        };
                        *out = T::from_sample(sample);
                    }
                    // A buffer that ran out exactly at the end of this
                    // callback is complete now, not on the next callback.
                    while queue
                        .front()
                        .map(|b| b.position >= b.samples.len())
                        .unwrap_or(false)
                    {
                        if let Some(done) = queue.pop_front().and_then(|b| b.on_complete) {
                            finished.push(done);
                        }
                    }
                }
                for done in finished {
                    done();
                }
            },
            |err| tracing::error!("Output stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::Stream(e.to_string()))
}
