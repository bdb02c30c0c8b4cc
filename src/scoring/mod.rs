use serde::Serialize;
use tracing::debug;

use crate::{
    error::{ScoreError, ScoreResult},
    inference::Predictor,
    labels::LabelMap,
};

/// One surviving input line and the chosen label's probability, in percent.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LineScore {
    pub line: usize,
    pub text: String,
    pub probability: f32,
}

impl LineScore {
    pub fn percent_display(&self) -> String {
        format!("{:.2}%", self.probability)
    }
}

/// Trimmed, non-empty lines in input order.
pub fn split_lines(raw: &str) -> Vec<&str> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Scores every non-blank line of `raw` for `target`. Both the label and the
/// presence of input are checked before any inference runs.
pub fn score_lines<P: Predictor + ?Sized>(
    predictor: &P,
    labels: &LabelMap,
    raw: &str,
    target: &str,
) -> ScoreResult<Vec<LineScore>> {
    if !labels.contains(target) {
        return Err(ScoreError::UnknownLabel(target.to_string()));
    }

    let lines = split_lines(raw);
    if lines.is_empty() {
        return Err(ScoreError::InputEmpty);
    }

    lines
        .into_iter()
        .enumerate()
        .map(|(idx, text)| {
            let result = predictor.predict(text)?;
            let probability = result
                .get(target)
                .ok_or_else(|| ScoreError::UnknownLabel(target.to_string()))?;
            debug!(line = idx + 1, label = target, probability, "scored line");
            Ok(LineScore {
                line: idx + 1,
                text: text.to_string(),
                probability: probability * 100.0,
            })
        })
        .collect()
}
