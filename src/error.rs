use thiserror::Error;

/// Everything that can go wrong between an upload and a rendered score.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("label configuration error: {0}")]
    Config(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("uploaded text is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("could not read document: {0}")]
    Extraction(String),

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("please paste text or upload a file")]
    InputEmpty,

    #[error("unknown label '{0}'")]
    UnknownLabel(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

impl ScoreError {
    /// Stable machine-readable code for JSON responses.
    pub fn code(&self) -> &'static str {
        match self {
            ScoreError::Config(_) => "config_error",
            ScoreError::ModelUnavailable(_) => "model_unavailable",
            ScoreError::Decode(_) => "decode_error",
            ScoreError::UnsupportedFormat(_) => "unsupported_format",
            ScoreError::Extraction(_) => "extraction_error",
            ScoreError::InvalidUpload(_) => "invalid_upload",
            ScoreError::InputEmpty => "input_empty",
            ScoreError::UnknownLabel(_) => "unknown_label",
            ScoreError::Inference(_) => "inference_error",
        }
    }
}

impl From<candle::Error> for ScoreError {
    fn from(err: candle::Error) -> Self {
        ScoreError::Inference(err.to_string())
    }
}

pub type ScoreResult<T> = Result<T, ScoreError>;
