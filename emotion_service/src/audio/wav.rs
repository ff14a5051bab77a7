use super::{AudioCaptureError, AudioClip, AudioSource};
use crate::config::ArtifactsConfig;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use parking_lot::Mutex;
use std::{
    io,
    path::{Path, PathBuf},
};

/// Keeps the most recent recording on disk, overwriting it on every call.
pub struct WavSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl WavSink {
    pub fn new(artifacts_config: &ArtifactsConfig) -> Self {
        Self::at(artifacts_config.get_audio_path())
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the clip as mono 32-bit float WAV.
    pub fn save(&self, clip: &AudioClip) -> io::Result<()> {
        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let spec = WavSpec {
            channels: 1,
            sample_rate: clip.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&self.path, spec).map_err(to_io)?;
        for &sample in &clip.samples {
            writer.write_sample(sample).map_err(to_io)?;
        }
        writer.finalize().map_err(to_io)?;

        tracing::debug!(
            "Saved {:.1}s recording to {:?}",
            clip.duration_secs(),
            self.path
        );
        Ok(())
    }
}

/// Reads a WAV file into a mono clip, keeping the first channel.
pub fn read_wav(path: &Path) -> io::Result<AudioClip> {
    let mut reader = WavReader::open(path).map_err(to_io)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(to_io)?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(to_io)?
        }
    };

    let samples = interleaved.iter().step_by(channels).copied().collect();
    Ok(AudioClip::new(samples, spec.sample_rate))
}

/// Serves a prerecorded WAV file in place of a live microphone.
pub struct WavFileSource {
    path: PathBuf,
}

impl WavFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AudioSource for WavFileSource {
    fn capture(&self) -> Result<AudioClip, AudioCaptureError> {
        read_wav(&self.path)
            .map_err(|e| AudioCaptureError::Device(format!("failed to read {:?}: {}", self.path, e)))
    }
}

fn to_io(err: hound::Error) -> io::Error {
    match err {
        hound::Error::IoError(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saved_recording_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let sink = WavSink::new(&ArtifactsConfig {
            audio_dir: dir.path().join("saved_audio"),
            audio_file: "recorded_audio.wav".to_string(),
            crop_dir: None,
        });
        let clip = AudioClip::new(vec![0.0, 0.25, -0.5, 1.0], 48_000);

        sink.save(&clip).unwrap();

        assert_eq!(sink.path(), dir.path().join("saved_audio").join("recorded_audio.wav"));
        assert_eq!(read_wav(sink.path()).unwrap(), clip);
    }

    #[test]
    fn test_second_save_overwrites_first() {
        let dir = tempfile::tempdir().unwrap();
        let sink = WavSink::at(dir.path().join("clip.wav"));

        sink.save(&AudioClip::new(vec![0.1; 100], 16_000)).unwrap();
        sink.save(&AudioClip::new(vec![0.2; 10], 16_000)).unwrap();

        let clip = read_wav(sink.path()).unwrap();
        assert_eq!(clip.samples, vec![0.2; 10]);
    }

    #[test]
    fn test_stereo_int_wav_keeps_first_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for (left, right) in [(16_384i16, -1i16), (-16_384, 7)] {
            writer.write_sample(left).unwrap();
            writer.write_sample(right).unwrap();
        }
        writer.finalize().unwrap();

        let clip = read_wav(&path).unwrap();
        assert_eq!(clip.sample_rate, 8_000);
        assert_eq!(clip.samples, vec![0.5, -0.5]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_wav(&dir.path().join("absent.wav")).is_err());
        assert!(matches!(
            WavFileSource::new(dir.path().join("absent.wav")).capture(),
            Err(AudioCaptureError::Device(_))
        ));
    }

    #[test]
    fn test_file_source_replays_clip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.wav");
        let clip = AudioClip::new(vec![0.5; 480], 48_000);
        WavSink::at(&path).save(&clip).unwrap();

        assert_eq!(WavFileSource::new(&path).capture().unwrap(), clip);
    }
}
