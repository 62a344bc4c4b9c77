//! Metrics snapshots and judge evaluations
//!
//! A snapshot is an open-ended, insertion-ordered bag of scoring fields. It is
//! set once per submission and afterwards only augmented.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Open-ended metrics bag
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsSnapshot(IndexMap<String, Value>);

impl MetricsSnapshot {
    /// Create empty snapshot
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value; only objects qualify
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map.into_iter().collect())),
            _ => None,
        }
    }

    /// Convert back to a JSON object
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// With field (builder form of [`insert`](Self::insert))
    #[inline]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a field, replacing any previous value
    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a field
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a string field
    #[inline]
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Get a numeric field
    #[inline]
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Number of fields
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the snapshot has no fields
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Merge newer fields in, overwriting keys they share
    pub fn merge(&mut self, newer: &MetricsSnapshot) {
        for (key, value) in newer.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Merge older fields in, keeping keys already present
    pub fn fill_from(&mut self, older: &MetricsSnapshot) {
        for (key, value) in older.iter() {
            self.0.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    /// Flatten judge results into the snapshot
    pub fn apply_evaluation(&mut self, evaluation: &Evaluation) {
        self.merge(&evaluation.to_snapshot());
    }
}

/// One judged dimension
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JudgeScore {
    /// Score in `[0, 1]`
    #[serde(default)]
    pub score: Option<f64>,
    /// Judge reasoning
    #[serde(default)]
    pub reason: Option<String>,
    /// Issues found
    #[serde(default)]
    pub issues: Vec<String>,
}

/// Judge evaluation delivered by the evaluation endpoint
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Evaluation {
    /// Factual accuracy
    #[serde(default)]
    pub accuracy: Option<JudgeScore>,
    /// Coherence
    #[serde(default)]
    pub coherence: Option<JudgeScore>,
    /// Judge model
    #[serde(default)]
    pub judge_model_name: Option<String>,
    /// Judge prompt tokens
    #[serde(default)]
    pub judge_input_tokens: Option<u64>,
    /// Judge completion tokens
    #[serde(default)]
    pub judge_output_tokens: Option<u64>,
}

impl Evaluation {
    /// Flatten into snapshot fields (`accuracy_score`, `coherence_issues`, ...)
    #[must_use]
    pub fn to_snapshot(&self) -> MetricsSnapshot {
        let mut out = MetricsSnapshot::new();
        for (prefix, judged) in [("accuracy", &self.accuracy), ("coherence", &self.coherence)] {
            let Some(judged) = judged else { continue };
            if let Some(score) = judged.score {
                out.insert(format!("{prefix}_score"), score);
            }
            if let Some(reason) = &judged.reason {
                out.insert(format!("{prefix}_reasoning"), reason.clone());
            }
            out.insert(format!("{prefix}_issues"), judged.issues.clone());
        }
        if let Some(name) = &self.judge_model_name {
            out.insert("judge_model_name", name.clone());
        }
        if let Some(tokens) = self.judge_input_tokens {
            out.insert("judge_input_tokens", tokens);
        }
        if let Some(tokens) = self.judge_output_tokens {
            out.insert("judge_output_tokens", tokens);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn from_value_requires_object() {
        assert!(MetricsSnapshot::from_value(json!([1, 2])).is_none());
        let snap = MetricsSnapshot::from_value(json!({"query_type": "coverage"})).unwrap();
        assert_eq!(snap.get_str("query_type"), Some("coverage"));
    }

    #[test]
    fn merge_is_additive() {
        let mut base = MetricsSnapshot::new()
            .with("query_type", "coverage")
            .with("accuracy_score", 0.2);
        let newer = MetricsSnapshot::new().with("accuracy_score", 0.9).with("toxicity_score", 0.0);
        base.merge(&newer);

        assert_eq!(base.len(), 3);
        assert_eq!(base.get_str("query_type"), Some("coverage"));
        assert_eq!(base.get_f64("accuracy_score"), Some(0.9));
    }

    #[test]
    fn fill_keeps_existing_keys() {
        let mut evaluated = MetricsSnapshot::new().with("accuracy_score", 0.9);
        let base = MetricsSnapshot::new().with("accuracy_score", 0.1).with("query_type", "x");
        evaluated.fill_from(&base);

        assert_eq!(evaluated.get_f64("accuracy_score"), Some(0.9));
        assert_eq!(evaluated.get_str("query_type"), Some("x"));
    }

    #[test]
    fn evaluation_flattens() {
        let evaluation: Evaluation = serde_json::from_value(json!({
            "accuracy": {"score": 0.8, "reason": "grounded", "issues": []},
            "coherence": {"score": 0.7, "issues": ["wordy"]},
            "judge_model_name": "judge-1",
            "judge_input_tokens": 120,
            "judge_output_tokens": 30
        }))
        .unwrap();

        let snap = evaluation.to_snapshot();
        assert_eq!(snap.get_f64("accuracy_score"), Some(0.8));
        assert_eq!(snap.get_str("accuracy_reasoning"), Some("grounded"));
        assert_eq!(snap.get("coherence_issues"), Some(&json!(["wordy"])));
        assert!(snap.get("coherence_reasoning").is_none());
        assert_eq!(snap.get_str("judge_model_name"), Some("judge-1"));
        assert_eq!(snap.get("judge_input_tokens"), Some(&json!(120)));
    }
}
