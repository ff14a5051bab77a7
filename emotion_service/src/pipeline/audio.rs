use super::PipelineError;
use crate::{
    audio::{AudioSource, FeatureExtractor, WavSink},
    emotion::EmotionResult,
    model_service::EmotionClassifier,
};
use std::sync::Arc;
use tracing::instrument;

/// Records a clip, keeps a copy on disk and classifies it.
pub struct AudioEmotionPipeline {
    source: Arc<dyn AudioSource>,
    wav_sink: Option<WavSink>,
    extractor: FeatureExtractor,
    classifier: Arc<dyn EmotionClassifier>,
}

impl AudioEmotionPipeline {
    pub fn new(
        source: Arc<dyn AudioSource>,
        extractor: FeatureExtractor,
        classifier: Arc<dyn EmotionClassifier>,
    ) -> Self {
        Self {
            source,
            wav_sink: None,
            extractor,
            classifier,
        }
    }

    pub fn with_wav_sink(mut self, wav_sink: WavSink) -> Self {
        self.wav_sink = Some(wav_sink);
        self
    }

    /// Blocks for the whole recording window plus inference.
    #[instrument(skip_all)]
    pub fn analyze(&self) -> Result<EmotionResult, PipelineError> {
        let clip = self.source.capture()?;
        tracing::info!(
            "Captured {:.2}s of audio at {} Hz",
            clip.duration_secs(),
            clip.sample_rate
        );

        if let Some(sink) = &self.wav_sink {
            sink.save(&clip)?;
        }

        let input = self.extractor.extract(&clip)?;
        let emotion = self.classifier.classify(input.view())?;
        tracing::debug!("Audio is {} ({:.3})", emotion.label, emotion.confidence);

        Ok(emotion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{read_wav, AudioClip},
        config::AudioFeaturesConfig,
        emotion::Emotion,
        pipeline::fakes::{FailingClassifier, FailingSource, FixedClassifier, FixedSource},
    };

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(&AudioFeaturesConfig::default()).unwrap()
    }

    fn noise(len: usize) -> Vec<f32> {
        // Deterministic pseudo-noise in [-0.5, 0.5).
        let mut state = 0x2545_f491u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) - 0.5
            })
            .collect()
    }

    #[test]
    fn test_recording_is_classified_with_fixed_shape() {
        let classifier = Arc::new(FixedClassifier::new(vec![
            0.1, 2.0, 0.3, 0.1, 0.2, 0.1, 0.4, 0.0,
        ]));
        let source = FixedSource(AudioClip::new(noise(48_000 * 4), 48_000));
        let pipeline = AudioEmotionPipeline::new(Arc::new(source), extractor(), classifier.clone());

        let emotion = pipeline.analyze().unwrap();

        assert_eq!(emotion.label, Emotion::Calm);
        assert!((0.0..=1.0).contains(&emotion.confidence));
        assert_eq!(*classifier.shapes.lock(), vec![vec![1, 254, 59, 1]]);
    }

    #[test]
    fn test_long_clip_still_has_fixed_frames() {
        let classifier = Arc::new(FixedClassifier::new(vec![1.0]));
        let source = FixedSource(AudioClip::new(noise(22_050 * 8), 22_050));
        let pipeline = AudioEmotionPipeline::new(Arc::new(source), extractor(), classifier.clone());

        pipeline.analyze().unwrap();

        assert_eq!(*classifier.shapes.lock(), vec![vec![1, 254, 59, 1]]);
    }

    #[test]
    fn test_recording_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved_audio").join("recorded_audio.wav");
        let clip = AudioClip::new(noise(4_800), 48_000);
        let pipeline = AudioEmotionPipeline::new(
            Arc::new(FixedSource(clip.clone())),
            extractor(),
            Arc::new(FixedClassifier::new(vec![1.0])),
        )
        .with_wav_sink(WavSink::at(&path));

        pipeline.analyze().unwrap();

        assert_eq!(read_wav(&path).unwrap(), clip);
    }

    #[test]
    fn test_failures_carry_their_kind() {
        let pipeline = AudioEmotionPipeline::new(
            Arc::new(FailingSource),
            extractor(),
            Arc::new(FixedClassifier::new(vec![1.0])),
        );
        assert_eq!(pipeline.analyze().unwrap_err().kind(), "audio_capture_error");

        let pipeline = AudioEmotionPipeline::new(
            Arc::new(FixedSource(AudioClip::new(Vec::new(), 48_000))),
            extractor(),
            Arc::new(FixedClassifier::new(vec![1.0])),
        );
        assert_eq!(pipeline.analyze().unwrap_err().kind(), "feature_extraction_error");

        let pipeline = AudioEmotionPipeline::new(
            Arc::new(FixedSource(AudioClip::new(noise(4_800), 48_000))),
            extractor(),
            Arc::new(FailingClassifier),
        );
        assert_eq!(pipeline.analyze().unwrap_err().kind(), "model_inference_error");
    }
}
