use crate::{
    config::ClassifierConfig,
    emotion::EmotionResult,
    model_service::{EmotionClassifier, InferenceError},
};
use ndarray::{ArrayD, ArrayView4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

/// Pool of ONNX Runtime sessions for one classifier model.
///
/// Running a session needs exclusive access, so each session sits behind a
/// mutex and requests are spread over the pool round-robin.
#[derive(Clone)]
pub struct OrtEmotionClassifier {
    name: &'static str,
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
}

impl OrtEmotionClassifier {
    pub fn new(
        name: &'static str,
        model_path: &Path,
        classifier_config: &ClassifierConfig,
    ) -> Result<Self, ort::Error> {
        let num_instances = classifier_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .with_intra_threads(classifier_config.intra_threads.max(1))?
                    .commit_from_file(model_path)?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!(
            "Created {} ONNX sessions for {} from {}",
            num_instances,
            name,
            model_path.display()
        );

        Ok(Self {
            name,
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn run_inference(&self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>, InferenceError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| InferenceError::Poisoned(e.to_string()))?;

        tracing::debug!("Running {} with session {}", self.name, index);
        let owned_buffer;
        let input_view = if input.is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().into_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| InferenceError::Tensor(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| InferenceError::Run(e.to_string()))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Output(e.to_string()))?;

        ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())
            .map_err(|e| InferenceError::Output(format!("invalid tensor shape: {}", e)))
    }
}

impl EmotionClassifier for OrtEmotionClassifier {
    fn classify(&self, input: ArrayView4<'_, f32>) -> Result<EmotionResult, InferenceError> {
        let output = self.run_inference(input)?;
        let scores = first_row(&output)?;
        Ok(EmotionResult::from_scores(&scores)?)
    }
}

/// Scores of the first (and only) batch entry.
fn first_row(output: &ArrayD<f32>) -> Result<Vec<f32>, InferenceError> {
    let classes = match output.shape() {
        [] => return Err(InferenceError::Output("scalar output".to_string())),
        shape => shape[shape.len() - 1],
    };
    Ok(output.iter().take(classes).copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    #[test]
    fn test_first_row_of_batch_output() {
        let output = Array::from_shape_vec(
            IxDyn(&[2, 3]),
            vec![0.1, 0.7, 0.2, 0.5, 0.4, 0.1],
        )
        .unwrap();
        assert_eq!(first_row(&output).unwrap(), vec![0.1, 0.7, 0.2]);
    }

    #[test]
    fn test_first_row_rejects_scalar() {
        let output = Array::from_shape_vec(IxDyn(&[]), vec![1.0]).unwrap();
        assert!(first_row(&output).is_err());
    }

    #[test]
    fn test_missing_model_fails_to_load() {
        let config = ClassifierConfig {
            file: "missing.onnx".to_string(),
            url: None,
            num_instances: 1,
            intra_threads: 1,
        };
        let result = OrtEmotionClassifier::new(
            "image_classifier",
            Path::new("/nonexistent/missing.onnx"),
            &config,
        );
        assert!(result.is_err());
    }
}
