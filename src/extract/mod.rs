use std::{panic, path::Path};

use docx_rs::{DocumentChild, Paragraph, ParagraphChild, RunChild};
use tracing::debug;

use crate::error::{ScoreError, ScoreResult};

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// The closed set of upload formats we know how to turn into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredType {
    PlainText,
    Pdf,
    Docx,
}

impl DeclaredType {
    /// Resolves the declared MIME type, falling back to the filename extension
    /// when the browser sent nothing useful.
    pub fn resolve(mime: Option<&str>, filename: Option<&str>) -> ScoreResult<Self> {
        let mime = mime
            .map(|m| m.split(';').next().unwrap_or(m).trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty() && m != "application/octet-stream");

        if let Some(mime) = mime {
            return Self::from_mime(&mime).ok_or(ScoreError::UnsupportedFormat(mime));
        }

        let ext = filename
            .and_then(|name| Path::new(name).extension())
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("txt") => Ok(Self::PlainText),
            Some("pdf") => Ok(Self::Pdf),
            Some("docx") => Ok(Self::Docx),
            Some(other) => Err(ScoreError::UnsupportedFormat(format!(".{other}"))),
            None => Err(ScoreError::UnsupportedFormat(
                filename.unwrap_or("unnamed upload").to_string(),
            )),
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            MIME_TEXT => Some(Self::PlainText),
            MIME_PDF => Some(Self::Pdf),
            MIME_DOCX => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::PlainText => MIME_TEXT,
            Self::Pdf => MIME_PDF,
            Self::Docx => MIME_DOCX,
        }
    }
}

/// Turns an uploaded file into plain text.
pub fn extract(bytes: &[u8], declared: DeclaredType) -> ScoreResult<String> {
    let text = match declared {
        DeclaredType::PlainText => extract_plain(bytes)?,
        DeclaredType::Pdf => extract_pdf(bytes)?,
        DeclaredType::Docx => extract_docx(bytes)?,
    };
    debug!(
        format = declared.mime(),
        bytes = bytes.len(),
        chars = text.chars().count(),
        "extracted upload"
    );
    Ok(text)
}

fn extract_plain(bytes: &[u8]) -> ScoreResult<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    Ok(String::from_utf8(bytes.to_vec())?)
}

fn extract_pdf(bytes: &[u8]) -> ScoreResult<String> {
    // pdf-extract panics on some malformed font tables instead of erroring.
    let pages = panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ScoreError::Extraction("pdf: parser aborted on malformed content".into()))?
        .map_err(|e| ScoreError::Extraction(format!("pdf: {e}")))?;
    Ok(join_pages(pages))
}

/// Concatenates page texts, each followed by a newline. Pages without a text
/// layer come back blank and contribute nothing.
pub fn join_pages<I, S>(pages: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut text = String::new();
    for page in pages {
        let page = page.as_ref();
        if page.trim().is_empty() {
            continue;
        }
        text.push_str(page);
        text.push('\n');
    }
    text
}

fn extract_docx(bytes: &[u8]) -> ScoreResult<String> {
    let docx = docx_rs::read_docx(bytes)
        .map_err(|e| ScoreError::Extraction(format!("docx: {e:?}")))?;

    let paragraphs: Vec<String> = docx
        .document
        .children
        .iter()
        .filter_map(|child| match child {
            DocumentChild::Paragraph(para) => Some(paragraph_text(para)),
            _ => None,
        })
        .collect();

    Ok(paragraphs.join("\n"))
}

fn paragraph_text(para: &Paragraph) -> String {
    let mut out = String::new();
    push_children(&para.children, &mut out);
    out
}

fn push_children(children: &[ParagraphChild], out: &mut String) {
    for child in children {
        match child {
            ParagraphChild::Run(run) => {
                for rc in &run.children {
                    match rc {
                        RunChild::Text(t) => out.push_str(&t.text),
                        RunChild::Tab(_) => out.push('\t'),
                        RunChild::Break(_) => out.push('\n'),
                        _ => {}
                    }
                }
            }
            // Link text is part of the visible paragraph.
            ParagraphChild::Hyperlink(link) => push_children(&link.children, out),
            _ => {}
        }
    }
}
