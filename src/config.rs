use std::{fmt::Display, path::PathBuf, str::FromStr};

use tracing::warn;

use crate::inference::{device::DevicePreference, encoding::DEFAULT_MAX_TOKENS, ClassifierOptions};

const DEFAULT_MODEL_DIR: &str = "deberta_model";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8501";
const DEFAULT_MAX_UPLOAD_MB: usize = 20;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model_dir: PathBuf,
    pub bind_addr: String,
    pub device: DevicePreference,
    pub max_tokens: usize,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let model_dir = get("MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR));
        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let device = parse_or("CLASSIFIER_DEVICE", get("CLASSIFIER_DEVICE"), DevicePreference::Auto);
        let max_tokens = parse_or("CLASSIFIER_MAX_TOKENS", get("CLASSIFIER_MAX_TOKENS"), DEFAULT_MAX_TOKENS)
            .max(1);
        let max_upload_mb = parse_or("MAX_UPLOAD_MB", get("MAX_UPLOAD_MB"), DEFAULT_MAX_UPLOAD_MB);

        Self {
            model_dir,
            bind_addr,
            device,
            max_tokens,
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
        }
    }

    pub fn label_map_path(&self) -> PathBuf {
        self.model_dir.join("label2id.json")
    }

    pub fn classifier_options(&self) -> ClassifierOptions {
        ClassifierOptions {
            device: self.device,
            max_tokens: self.max_tokens,
        }
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        None => default,
        Some(value) => value.trim().parse().unwrap_or_else(|err| {
            warn!("invalid {key} value '{value}' ({err}), using default");
            default
        }),
    }
}
