//! Assessment responses -> scorer feature map.
//!
//! Response items come from the questionnaire UI as loosely shaped JSON
//! objects; historical exports use `id` or `qid` instead of `questionId` and
//! `answer` instead of `score`, so all spellings are accepted.

use crate::domain::assessment::Assessment;
use crate::domain::model::FeatureMap;
use serde_json::Value as JsonValue;

const QUESTION_ID_KEYS: [&str; 3] = ["questionId", "id", "qid"];
const SCORE_KEYS: [&str; 2] = ["score", "answer"];

/// Flatten an assessment's responses into `Q{questionId}_score` features.
///
/// Items without a resolvable question id are skipped; a missing or
/// non-numeric score reads as 0. Duplicate question ids are last-write-wins.
pub fn features_from_assessment(assessment: &Assessment) -> FeatureMap {
    let mut features = FeatureMap::new();
    let Some(items) = assessment.responses.as_ref().and_then(JsonValue::as_array) else {
        return features;
    };

    for item in items {
        let Some(obj) = item.as_object() else {
            continue;
        };

        let question_id = QUESTION_ID_KEYS
            .iter()
            .find_map(|key| obj.get(*key).filter(|v| !v.is_null()))
            .and_then(key_text);
        let Some(question_id) = question_id else {
            continue;
        };

        let score = SCORE_KEYS
            .iter()
            .find_map(|key| obj.get(*key).filter(|v| !v.is_null()))
            .map(numeric_score)
            .unwrap_or(0.0);

        features.insert(format!("Q{}_score", question_id), score);
    }

    features
}

fn key_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Numeric coercion of a score value; anything that does not read as a
/// finite number becomes 0.
fn numeric_score(value: &JsonValue) -> f64 {
    let parsed = match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        JsonValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() => n,
        _ => 0.0,
    }
}
