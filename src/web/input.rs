use axum::extract::Multipart;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;

use crate::{
    error::{ScoreError, ScoreResult},
    extract::{extract, DeclaredType},
};

/// File bytes as they arrived, before any extraction.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Everything one scoring action needs: the input text or file, and a label.
#[derive(Debug, Clone, Default)]
pub struct ScoreInput {
    pub text: Option<String>,
    pub file: Option<UploadedFile>,
    pub label: Option<String>,
}

impl ScoreInput {
    /// An uploaded file wins over pasted text.
    pub fn into_raw_text(self) -> ScoreResult<String> {
        match self.file {
            Some(file) => {
                let declared =
                    DeclaredType::resolve(file.mime_type.as_deref(), file.filename.as_deref())?;
                extract(&file.bytes, declared)
            }
            None => Ok(self.text.unwrap_or_default()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FilePayload {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct ScoreApiRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file: Option<FilePayload>,
    pub label: String,
}

impl ScoreApiRequest {
    pub fn into_input(self) -> ScoreResult<ScoreInput> {
        let file = self
            .file
            .map(|f| {
                Ok::<_, ScoreError>(UploadedFile {
                    bytes: decode_base64_payload(&f.data_base64)?,
                    filename: f.filename,
                    mime_type: f.mime_type,
                })
            })
            .transpose()?;

        Ok(ScoreInput {
            text: self.text,
            file,
            label: Some(self.label),
        })
    }
}

/// Reads the `file`, `text` and `label` fields of the upload form.
pub async fn parse_multipart(mut multipart: Multipart) -> ScoreResult<ScoreInput> {
    let mut input = ScoreInput::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ScoreError::InvalidUpload(format!("failed to read form field: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let filename = field.file_name().map(str::to_string);
                let mime_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ScoreError::InvalidUpload(format!("failed to read file data: {e}")))?;

                // Browsers send an unnamed, empty part when no file was chosen.
                if bytes.is_empty() && filename.as_deref().map_or(true, str::is_empty) {
                    continue;
                }
                input.file = Some(UploadedFile {
                    filename,
                    mime_type,
                    bytes: bytes.to_vec(),
                });
            }
            "text" | "label" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ScoreError::InvalidUpload(format!("failed to read {name}: {e}")))?;
                if name == "text" {
                    input.text = Some(value);
                } else if !value.trim().is_empty() {
                    input.label = Some(value.trim().to_string());
                }
            }
            _ => {}
        }
    }

    Ok(input)
}

/// Accepts bare base64 or a `data:<mime>;base64,` URL.
pub fn decode_base64_payload(raw: &str) -> ScoreResult<Vec<u8>> {
    if raw.trim().is_empty() {
        return Err(ScoreError::InvalidUpload("empty base64 payload".into()));
    }

    let cleaned = match raw.find(',') {
        Some(idx) if raw[..idx].contains("base64") => &raw[idx + 1..],
        _ => raw,
    };

    STANDARD
        .decode(cleaned.trim())
        .map_err(|e| ScoreError::InvalidUpload(format!("invalid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_takes_precedence_over_text() {
        let input = ScoreInput {
            text: Some("pasted".into()),
            file: Some(UploadedFile {
                filename: Some("lines.txt".into()),
                mime_type: Some("text/plain".into()),
                bytes: b"from file".to_vec(),
            }),
            label: None,
        };
        assert_eq!(input.into_raw_text().unwrap(), "from file");
    }

    #[test]
    fn falls_back_to_pasted_text() {
        let input = ScoreInput {
            text: Some("pasted".into()),
            ..Default::default()
        };
        assert_eq!(input.into_raw_text().unwrap(), "pasted");
        assert_eq!(ScoreInput::default().into_raw_text().unwrap(), "");
    }

    #[test]
    fn empty_uploaded_file_is_empty_input() {
        let input = ScoreInput {
            text: Some("pasted".into()),
            file: Some(UploadedFile {
                filename: Some("empty.txt".into()),
                mime_type: Some("text/plain".into()),
                bytes: Vec::new(),
            }),
            label: None,
        };
        assert_eq!(input.into_raw_text().unwrap(), "");
    }

    #[test]
    fn unsupported_upload_is_rejected() {
        let input = ScoreInput {
            file: Some(UploadedFile {
                filename: Some("photo.png".into()),
                mime_type: Some("image/png".into()),
                bytes: vec![0x89, 0x50],
            }),
            ..Default::default()
        };
        assert!(matches!(
            input.into_raw_text(),
            Err(ScoreError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn decodes_plain_and_data_url_base64() {
        assert_eq!(decode_base64_payload("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(
            decode_base64_payload("data:text/plain;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert!(matches!(
            decode_base64_payload("  "),
            Err(ScoreError::InvalidUpload(_))
        ));
        assert!(matches!(
            decode_base64_payload("!!not base64!!"),
            Err(ScoreError::InvalidUpload(_))
        ));
    }

    #[test]
    fn api_request_decodes_file_payload() {
        let req: ScoreApiRequest = serde_json::from_str(
            r#"{"label":"irony","file":{"filename":"a.txt","data_base64":"bGluZQ=="}}"#,
        )
        .unwrap();
        let input = req.into_input().unwrap();
        assert_eq!(input.label.as_deref(), Some("irony"));
        assert_eq!(input.into_raw_text().unwrap(), "line");
    }
}
