use minijinja::{context, Environment};
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::{error::ScoreError, scoring::LineScore};

const INDEX_HTML: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/index.html"));

static TEMPLATES: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = Environment::new();
    env.add_template("index.html", INDEX_HTML)
        .expect("invalid index template");
    env
});

#[derive(Serialize)]
struct ResultRow<'a> {
    line: usize,
    text: &'a str,
    percent: String,
}

/// What the page shows after (or before) a scoring action.
#[derive(Default)]
pub struct PageView<'a> {
    pub labels: &'a [String],
    pub selected: Option<&'a str>,
    pub text: &'a str,
    pub results: Option<&'a [LineScore]>,
    pub error: Option<&'a ScoreError>,
}

pub fn render(view: PageView<'_>) -> Result<String, minijinja::Error> {
    let selected = view
        .selected
        .or_else(|| view.labels.first().map(String::as_str))
        .unwrap_or_default();
    let results: Option<Vec<ResultRow>> = view.results.map(|rows| {
        rows.iter()
            .map(|row| ResultRow {
                line: row.line,
                text: &row.text,
                percent: row.percent_display(),
            })
            .collect()
    });

    TEMPLATES.get_template("index.html")?.render(context! {
        labels => view.labels,
        selected => selected,
        text => view.text,
        results => results,
        error => view.error.map(|e| e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        ["sarcasm", "irony", "regular", "figurative"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn form_lists_every_label_and_checks_the_first() {
        let labels = labels();
        let html = render(PageView {
            labels: &labels,
            ..Default::default()
        })
        .unwrap();
        for label in &labels {
            assert!(html.contains(&format!("value=\"{label}\"")));
        }
        assert!(html.contains("value=\"sarcasm\" checked"));
        assert!(!html.contains("Results"));
    }

    #[test]
    fn renders_rows_with_two_decimal_percentages() {
        let labels = labels();
        let rows = vec![LineScore {
            line: 1,
            text: "Oh great, another Monday.".into(),
            probability: 87.654,
        }];
        let html = render(PageView {
            labels: &labels,
            selected: Some("irony"),
            results: Some(&rows),
            ..Default::default()
        })
        .unwrap();
        assert!(html.contains("Line 1:"));
        assert!(html.contains("87.65%"));
        assert!(html.contains("IRONY"));
        assert!(html.contains("value=\"irony\" checked"));
    }

    #[test]
    fn escapes_user_text_and_shows_errors() {
        let labels = labels();
        let err = ScoreError::InputEmpty;
        let html = render(PageView {
            labels: &labels,
            text: "<script>alert(1)</script>",
            error: Some(&err),
            ..Default::default()
        })
        .unwrap();
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("please paste text or upload a file"));
    }
}
