use std::{collections::HashMap, fs, path::Path};

use crate::error::{ScoreError, ScoreResult};

/// Bidirectional label <-> class index mapping, read once from `label2id.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    by_id: Vec<String>,
    by_label: HashMap<String, usize>,
}

impl LabelMap {
    pub fn load(path: &Path) -> ScoreResult<Self> {
        let raw = fs::read(path)
            .map_err(|e| ScoreError::Config(format!("cannot read {}: {e}", path.display())))?;
        let parsed: HashMap<String, i64> = serde_json::from_slice(&raw)
            .map_err(|e| ScoreError::Config(format!("cannot parse {}: {e}", path.display())))?;
        Self::from_pairs(parsed)
    }

    /// Builds the map, rejecting anything that is not a bijection onto `0..n`.
    pub fn from_pairs<I, S>(pairs: I) -> ScoreResult<Self>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let pairs: Vec<(String, i64)> = pairs.into_iter().map(|(l, id)| (l.into(), id)).collect();
        if pairs.is_empty() {
            return Err(ScoreError::Config("label map is empty".into()));
        }

        let n = pairs.len();
        let mut slots: Vec<Option<String>> = vec![None; n];
        for (label, id) in pairs {
            let idx = usize::try_from(id)
                .ok()
                .filter(|&i| i < n)
                .ok_or_else(|| {
                    ScoreError::Config(format!("id {id} for '{label}' is outside 0..{n}"))
                })?;
            if let Some(existing) = &slots[idx] {
                return Err(ScoreError::Config(format!(
                    "duplicate id {id} for '{existing}' and '{label}'"
                )));
            }
            slots[idx] = Some(label);
        }

        // n distinct ids in 0..n means every slot is filled.
        let by_id: Vec<String> = slots.into_iter().flatten().collect();
        let by_label = by_id
            .iter()
            .enumerate()
            .map(|(id, label)| (label.clone(), id))
            .collect();

        Ok(Self { by_id, by_label })
    }

    pub fn id_for(&self, label: &str) -> Option<usize> {
        self.by_label.get(label).copied()
    }

    pub fn label_for(&self, id: usize) -> Option<&str> {
        self.by_id.get(id).map(String::as_str)
    }

    pub fn all_labels(&self) -> &[String] {
        &self.by_id
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.id_for(label).is_some()
    }
}
