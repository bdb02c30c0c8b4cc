use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use candle::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::{
    debertav2::{Config as DebertaConfig, DebertaV2SeqClassificationModel},
    xlm_roberta::{Config as RobertaConfig, XLMRobertaForSequenceClassification},
};
use serde::Deserialize;
use tracing::{info, warn};

use super::encoding::EncodedInput;
use crate::{
    error::{ScoreError, ScoreResult},
    labels::LabelMap,
};

/// A forward pass from one encoded line to one row of raw class logits.
pub trait SequenceClassifier: Send {
    fn num_labels(&self) -> usize;

    fn logits(&self, input: &EncodedInput) -> ScoreResult<Vec<f32>>;
}

#[derive(Deserialize)]
struct ModelTypeHeader {
    #[serde(default)]
    model_type: Option<String>,
}

/// Loads whichever encoder `config.json` declares, with its classification head.
pub fn load_backend(
    model_dir: &Path,
    labels: &LabelMap,
    device: &Device,
) -> ScoreResult<Box<dyn SequenceClassifier>> {
    let config_path = model_dir.join("config.json");
    let raw = read_artifact(&config_path)?;
    let header: ModelTypeHeader = serde_json::from_slice(&raw).map_err(|e| {
        ScoreError::ModelUnavailable(format!("failed to parse {}: {e}", config_path.display()))
    })?;

    let weights = find_model_weights(model_dir).ok_or_else(|| {
        ScoreError::ModelUnavailable(format!("no model weights found under {}", model_dir.display()))
    })?;
    let vb = build_var_builder(&weights, DType::F32, device)?;

    let model_type = header.model_type.unwrap_or_else(|| "deberta-v2".to_string());
    info!(
        model_type = %model_type,
        weights = %weights.display(),
        labels = labels.len(),
        "loading sequence classifier"
    );

    match model_type.as_str() {
        "deberta-v2" | "deberta" => {
            let config: DebertaConfig = parse_config(&raw, &config_path)?;
            Ok(Box::new(DebertaClassifier::load(&config, vb, labels, device)?))
        }
        "roberta" | "xlm-roberta" => {
            let config: RobertaConfig = parse_config(&raw, &config_path)?;
            Ok(Box::new(RobertaClassifier::load(&config, vb, labels.len(), device)?))
        }
        other => Err(ScoreError::ModelUnavailable(format!(
            "unsupported model_type '{other}' in {}",
            config_path.display()
        ))),
    }
}

pub struct DebertaClassifier {
    model: DebertaV2SeqClassificationModel,
    device: Device,
    num_labels: usize,
}

impl DebertaClassifier {
    fn load(
        config: &DebertaConfig,
        vb: VarBuilder<'static>,
        labels: &LabelMap,
        device: &Device,
    ) -> ScoreResult<Self> {
        // label2id.json is authoritative for names; config.json only has to agree on the count.
        let id2label = match &config.id2label {
            Some(declared) => {
                if declared.len() != labels.len() {
                    return Err(ScoreError::ModelUnavailable(format!(
                        "config.json declares {} labels but label2id.json has {}",
                        declared.len(),
                        labels.len()
                    )));
                }
                for (id, name) in declared {
                    if labels.label_for(*id as usize) != Some(name.as_str()) {
                        warn!(id, config_label = %name, "config.json label differs from label2id.json");
                    }
                }
                None
            }
            None => Some(
                labels
                    .all_labels()
                    .iter()
                    .enumerate()
                    .map(|(id, name)| (id as u32, name.clone()))
                    .collect::<HashMap<u32, String>>(),
            ),
        };

        let model = DebertaV2SeqClassificationModel::load(vb.set_prefix("deberta"), config, id2label)
            .map_err(|e| ScoreError::ModelUnavailable(format!("DeBERTa load failed: {e}")))?;

        Ok(Self {
            model,
            device: device.clone(),
            num_labels: labels.len(),
        })
    }
}

impl SequenceClassifier for DebertaClassifier {
    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn logits(&self, input: &EncodedInput) -> ScoreResult<Vec<f32>> {
        let ids = row_tensor(&input.ids, &self.device)?;
        let mask = row_tensor(&input.attention_mask, &self.device)?;
        let type_ids = row_tensor(&input.type_ids, &self.device)?;
        let logits = self.model.forward(&ids, Some(type_ids), Some(mask))?;
        first_row(logits)
    }
}

/// RoBERTa-family encoder with the stock `classifier.dense -> tanh -> classifier.out_proj`
/// head on the first token.
pub struct RobertaClassifier {
    model: XLMRobertaForSequenceClassification,
    device: Device,
    num_labels: usize,
}

impl RobertaClassifier {
    fn load(
        config: &RobertaConfig,
        vb: VarBuilder<'static>,
        num_labels: usize,
        device: &Device,
    ) -> ScoreResult<Self> {
        let model = XLMRobertaForSequenceClassification::new(num_labels, config, vb)
            .map_err(|e| ScoreError::ModelUnavailable(format!("RoBERTa load failed: {e}")))?;

        Ok(Self {
            model,
            device: device.clone(),
            num_labels,
        })
    }
}

impl SequenceClassifier for RobertaClassifier {
    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn logits(&self, input: &EncodedInput) -> ScoreResult<Vec<f32>> {
        let ids = row_tensor(&input.ids, &self.device)?;
        let mask = row_tensor(&input.attention_mask, &self.device)?;
        let type_ids = row_tensor(&input.type_ids, &self.device)?;
        let logits = self.model.forward(&ids, &mask, &type_ids)?;
        first_row(logits)
    }
}

fn read_artifact(path: &Path) -> ScoreResult<Vec<u8>> {
    if !path.exists() {
        return Err(ScoreError::ModelUnavailable(format!("{} not found", path.display())));
    }
    fs::read(path)
        .map_err(|e| ScoreError::ModelUnavailable(format!("failed to read {}: {e}", path.display())))
}

fn parse_config<T: serde::de::DeserializeOwned>(raw: &[u8], path: &Path) -> ScoreResult<T> {
    serde_json::from_slice(raw).map_err(|e| {
        ScoreError::ModelUnavailable(format!("failed to parse {}: {e}", path.display()))
    })
}

pub fn find_model_weights(model_dir: &Path) -> Option<PathBuf> {
    ["model.safetensors", "pytorch_model.bin"]
        .into_iter()
        .map(|candidate| model_dir.join(candidate))
        .find(|path| path.exists())
}

fn build_var_builder(path: &Path, dtype: DType, device: &Device) -> ScoreResult<VarBuilder<'static>> {
    let is_safetensors = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("safetensors"))
        .unwrap_or(false);

    let vb = if is_safetensors {
        let files = vec![path.to_path_buf()];
        // Weights are memory mapped and never written while the process runs.
        unsafe { VarBuilder::from_mmaped_safetensors(&files, dtype, device) }
    } else {
        VarBuilder::from_pth(path, dtype, device)
    };
    vb.map_err(|e| ScoreError::ModelUnavailable(format!("failed to load {}: {e}", path.display())))
}

fn row_tensor(data: &[u32], device: &Device) -> candle::Result<Tensor> {
    Tensor::new(data, device)?.reshape((1, data.len()))
}

fn first_row(logits: Tensor) -> ScoreResult<Vec<f32>> {
    logits
        .to_dtype(DType::F32)?
        .to_vec2::<f32>()?
        .into_iter()
        .next()
        .ok_or_else(|| ScoreError::Inference("logits tensor missing batch dimension".into()))
}
