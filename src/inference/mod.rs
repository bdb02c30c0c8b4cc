pub mod backend;
pub mod device;
pub mod encoding;

use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    error::{ScoreError, ScoreResult},
    labels::LabelMap,
};
use backend::SequenceClassifier;
use device::{device_label, select_device, DevicePreference};
use encoding::FixedLengthEncoder;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LabelScore {
    pub label: String,
    pub probability: f32,
}

/// Probability per label, in label-id order. Values sum to one.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClassificationResult {
    scores: Vec<LabelScore>,
}

impl ClassificationResult {
    pub fn from_logits(logits: &[f32], labels: &LabelMap) -> ScoreResult<Self> {
        if logits.len() != labels.len() {
            return Err(ScoreError::Inference(format!(
                "model produced {} logits for {} labels",
                logits.len(),
                labels.len()
            )));
        }
        let scores = softmax(logits)
            .into_iter()
            .zip(labels.all_labels())
            .map(|(probability, label)| LabelScore {
                label: label.clone(),
                probability,
            })
            .collect();
        Ok(Self { scores })
    }

    pub fn get(&self, label: &str) -> Option<f32> {
        self.scores
            .iter()
            .find(|s| s.label == label)
            .map(|s| s.probability)
    }

    pub fn scores(&self) -> &[LabelScore] {
        &self.scores
    }
}

/// Softmax with the max logit subtracted first so large logits cannot overflow.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Text in, label distribution out.
pub trait Predictor: Send + Sync {
    fn predict(&self, text: &str) -> ScoreResult<ClassificationResult>;
}

#[derive(Debug, Clone, Copy)]
pub struct ClassifierOptions {
    pub device: DevicePreference,
    pub max_tokens: usize,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            device: DevicePreference::Auto,
            max_tokens: encoding::DEFAULT_MAX_TOKENS,
        }
    }
}

/// Tokenizer plus sequence-classification model, loaded once at startup.
pub struct Classifier {
    encoder: FixedLengthEncoder,
    model: Mutex<Box<dyn SequenceClassifier>>,
    labels: Arc<LabelMap>,
    device: &'static str,
}

impl Classifier {
    pub fn load(model_dir: &Path, labels: Arc<LabelMap>, opts: ClassifierOptions) -> ScoreResult<Self> {
        if !model_dir.is_dir() {
            return Err(ScoreError::ModelUnavailable(format!(
                "model directory {} not found",
                model_dir.display()
            )));
        }

        let device = select_device(opts.device)?;
        let encoder = FixedLengthEncoder::load(&model_dir.join("tokenizer.json"), opts.max_tokens)?;
        let model = backend::load_backend(model_dir, &labels, &device)?;

        let classifier = Self::from_parts(encoder, model, labels)?;
        let classifier = Self {
            device: device_label(&device),
            ..classifier
        };
        info!(
            model_dir = %model_dir.display(),
            device = classifier.device,
            max_tokens = classifier.encoder.max_len(),
            "classifier ready"
        );
        Ok(classifier)
    }

    pub fn from_parts(
        encoder: FixedLengthEncoder,
        model: Box<dyn SequenceClassifier>,
        labels: Arc<LabelMap>,
    ) -> ScoreResult<Self> {
        if model.num_labels() != labels.len() {
            return Err(ScoreError::ModelUnavailable(format!(
                "model has {} output classes but label map has {}",
                model.num_labels(),
                labels.len()
            )));
        }
        Ok(Self {
            encoder,
            model: Mutex::new(model),
            labels,
            device: "cpu",
        })
    }

    pub fn device(&self) -> &'static str {
        self.device
    }
}

impl Predictor for Classifier {
    fn predict(&self, text: &str) -> ScoreResult<ClassificationResult> {
        let input = self.encoder.encode(text)?;
        debug!(tokens = input.real_tokens(), "encoded line");
        let logits = {
            // Weights are read-only; a poisoned lock is still usable.
            let model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
            model.logits(&input)?
        };
        ClassificationResult::from_logits(&logits, &self.labels)
    }
}


#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::encoding::fixtures::{word_tokenizer, words};
    use super::fixtures::HashingModel;
    use super::*;

    fn labels() -> Arc<LabelMap> {
        Arc::new(
            LabelMap::from_pairs([("sarcasm", 0), ("irony", 1), ("regular", 2), ("figurative", 3)])
                .unwrap(),
        )
    }

    fn classifier() -> Classifier {
        let encoder = FixedLengthEncoder::new(word_tokenizer(), 128).unwrap();
        Classifier::from_parts(encoder, Box::new(HashingModel { labels: 4 }), labels()).unwrap()
    }

    fn assert_distribution(result: &ClassificationResult) {
        let total: f32 = result.scores().iter().map(|s| s.probability).sum();
        assert!((total - 1.0).abs() < 1e-4, "sum was {total}");
        for score in result.scores() {
            assert!((0.0..=1.0).contains(&score.probability));
        }
    }

    #[test]
    fn softmax_is_stable_for_huge_logits() {
        let probs = softmax(&[1000.0, 1000.0, -1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
        assert!((probs[1] - 0.5).abs() < 1e-6);
        assert!(probs[2] < 1e-6);
        assert!(probs.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn softmax_of_equal_logits_is_uniform() {
        for p in softmax(&[0.0; 4]) {
            assert!((p - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn result_maps_indices_to_labels() {
        let result = ClassificationResult::from_logits(&[0.0, 5.0, 0.0, 0.0], &labels()).unwrap();
        assert_eq!(result.scores()[1].label, "irony");
        assert!(result.get("irony").unwrap() > 0.9);
        assert_eq!(result.get("sincere"), None);
        assert_distribution(&result);
    }

    #[test]
    fn logit_count_mismatch_is_inference_error() {
        let err = ClassificationResult::from_logits(&[0.0, 1.0], &labels()).unwrap_err();
        assert!(matches!(err, ScoreError::Inference(_)));
    }

    #[test]
    fn predictions_form_a_distribution() {
        let clf = classifier();
        for text in ["Oh great another Monday", "the sun is great", "zebra", ""] {
            assert_distribution(&clf.predict(text).unwrap());
        }
    }

    #[test]
    fn predictions_are_deterministic() {
        let clf = classifier();
        let first = clf.predict("love it the rain").unwrap();
        let second = clf.predict("love it the rain").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_text_still_predicts() {
        let result = classifier().predict("").unwrap();
        assert_eq!(result.scores().len(), 4);
        assert_distribution(&result);
    }

    #[test]
    fn long_text_uses_only_the_first_tokens() {
        let clf = classifier();
        let long = clf.predict(&words(600)).unwrap();
        let prefix = clf.predict(&words(128)).unwrap();
        assert_distribution(&long);
        assert_eq!(long, prefix);
    }

    struct PanicsOnceModel {
        panicked: std::sync::atomic::AtomicBool,
    }

    impl SequenceClassifier for PanicsOnceModel {
        fn num_labels(&self) -> usize {
            4
        }

        fn logits(&self, _input: &encoding::EncodedInput) -> ScoreResult<Vec<f32>> {
            if !self.panicked.swap(true, std::sync::atomic::Ordering::SeqCst) {
                panic!("forward pass blew up");
            }
            Ok(vec![0.0; 4])
        }
    }

    #[test]
    fn panic_in_one_pass_does_not_break_later_requests() {
        let encoder = FixedLengthEncoder::new(word_tokenizer(), 128).unwrap();
        let model = PanicsOnceModel {
            panicked: std::sync::atomic::AtomicBool::new(false),
        };
        let clf = Classifier::from_parts(encoder, Box::new(model), labels()).unwrap();

        let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| clf.predict("the sun")));
        assert!(first.is_err());

        let result = clf.predict("the sun").unwrap();
        assert_distribution(&result);
    }

    #[test]
    fn label_count_mismatch_fails_construction() {
        let encoder = FixedLengthEncoder::new(word_tokenizer(), 128).unwrap();
        let err = Classifier::from_parts(encoder, Box::new(HashingModel { labels: 3 }), labels())
            .err()
            .unwrap();
        assert!(matches!(err, ScoreError::ModelUnavailable(_)));
    }

    #[test]
    fn missing_model_dir_fails_startup() {
        let err = Classifier::load(
            Path::new("/nonexistent/deberta_model"),
            labels(),
            ClassifierOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ScoreError::ModelUnavailable(_)));
    }

    #[test]
    fn scores_reference_checkpoint() {
        let model_dir = PathBuf::from("deberta_model");
        if !model_dir.join("label2id.json").exists() || backend::find_model_weights(&model_dir).is_none() {
            eprintln!("checkpoint missing under {}, skipping test", model_dir.display());
            return;
        }
        let labels = Arc::new(LabelMap::load(&model_dir.join("label2id.json")).unwrap());
        let clf = Classifier::load(&model_dir, labels, ClassifierOptions::default())
            .expect("failed to load classifier");

        let result = clf.predict("Oh great, another Monday. Just what I needed.").unwrap();
        assert_distribution(&result);
        assert_eq!(result, clf.predict("Oh great, another Monday. Just what I needed.").unwrap());
        assert_distribution(&clf.predict(&"word ".repeat(400)).unwrap());
    }
}
