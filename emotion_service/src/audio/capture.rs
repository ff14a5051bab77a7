use super::{AudioCaptureError, AudioClip, AudioSource};
use crate::config::RecordingConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};

/// Records a fixed-length clip from a server-side input device.
pub struct MicrophoneSource {
    device_name: Option<String>,
    sample_rate: u32,
    duration_secs: u64,
    // One recording at a time per device.
    device_lock: Mutex<()>,
}

impl MicrophoneSource {
    pub fn new(recording_config: &RecordingConfig) -> Self {
        Self {
            device_name: recording_config.device.clone(),
            sample_rate: recording_config.sample_rate,
            duration_secs: recording_config.duration_secs,
            device_lock: Mutex::new(()),
        }
    }

    fn open_device(&self) -> Result<Device, AudioCaptureError> {
        let host = cpal::default_host();
        match self.device_name.as_deref() {
            Some(name) => host
                .input_devices()
                .map_err(|e| AudioCaptureError::Device(e.to_string()))?
                .find(|device| device.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| {
                    AudioCaptureError::NoDevice(format!("input device `{}` not found", name))
                }),
            None => host
                .default_input_device()
                .ok_or_else(|| AudioCaptureError::NoDevice("no default input device".to_string())),
        }
    }

    /// Prefers the requested rate with the fewest channels, falling back to
    /// the device default when no configuration supports that rate.
    fn select_config(&self, device: &Device) -> Result<(StreamConfig, SampleFormat), AudioCaptureError> {
        let target = SampleRate(self.sample_rate);
        let best = device
            .supported_input_configs()
            .map_err(|e| AudioCaptureError::Device(e.to_string()))?
            .filter(|range| range.min_sample_rate() <= target && target <= range.max_sample_rate())
            .min_by_key(|range| range.channels());

        if let Some(range) = best {
            let supported = range.with_sample_rate(target);
            return Ok((supported.config(), supported.sample_format()));
        }

        let supported = device
            .default_input_config()
            .map_err(|e| AudioCaptureError::Device(e.to_string()))?;
        tracing::warn!(
            "Device does not support {} Hz, recording at its default {} Hz",
            self.sample_rate,
            supported.sample_rate().0
        );
        Ok((supported.config(), supported.sample_format()))
    }

    fn record(
        &self,
        device: &Device,
        config: &StreamConfig,
        sample_format: SampleFormat,
    ) -> Result<AudioClip, AudioCaptureError> {
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0;
        let expected = (self.duration_secs * sample_rate as u64) as usize;
        let buffer = Arc::new(Mutex::new(Vec::with_capacity(expected)));

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(device, config, buffer.clone(), f32_sample),
            SampleFormat::I16 => build_stream::<i16>(device, config, buffer.clone(), i16_sample),
            SampleFormat::U16 => build_stream::<u16>(device, config, buffer.clone(), u16_sample),
            other => return Err(AudioCaptureError::UnsupportedFormat(format!("{:?}", other))),
        }?;

        tracing::info!(
            "Recording {}s at {} Hz ({} channels, {:?})",
            self.duration_secs,
            sample_rate,
            channels,
            sample_format
        );
        stream
            .play()
            .map_err(|e| AudioCaptureError::Stream(e.to_string()))?;
        std::thread::sleep(Duration::from_secs(self.duration_secs));
        drop(stream);

        let mut samples = std::mem::take(&mut *buffer.lock());
        if samples.len() < expected {
            tracing::warn!(
                "Device delivered {} of {} samples, padding with silence",
                samples.len(),
                expected
            );
        }
        samples.resize(expected, 0.0);

        Ok(AudioClip::new(samples, sample_rate))
    }
}

impl AudioSource for MicrophoneSource {
    fn capture(&self) -> Result<AudioClip, AudioCaptureError> {
        let _guard = self.device_lock.lock();
        let device = self.open_device()?;
        let (config, sample_format) = self.select_config(&device)?;
        self.record(&device, &config, sample_format)
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    convert: fn(T) -> f32,
) -> Result<Stream, AudioCaptureError>
where
    T: SizedSample + Send + 'static,
{
    let channels = config.channels as usize;
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                push_first_channel(&mut buffer.lock(), data, channels, convert);
            },
            |err| tracing::error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| AudioCaptureError::Stream(e.to_string()))
}

/// Appends the first channel of each interleaved frame.
fn push_first_channel<T: Copy>(out: &mut Vec<f32>, data: &[T], channels: usize, convert: fn(T) -> f32) {
    out.extend(
        data.chunks(channels.max(1))
            .map(|frame| convert(frame[0])),
    );
}

fn f32_sample(s: f32) -> f32 {
    s
}

fn i16_sample(s: i16) -> f32 {
    s as f32 / 32768.0
}

fn u16_sample(s: u16) -> f32 {
    (s as f32 - 32768.0) / 32768.0
}
