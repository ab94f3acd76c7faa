use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A submitted questionnaire assessment. Read-only input to prediction:
/// rows are created by the assessment flow and never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: i64,
    pub patient_id: i64,
    pub questionnaire_id: i64,
    /// Free-form response array as stored; items are validated lazily during
    /// feature extraction.
    pub responses: Option<JsonValue>,
    pub risk_score: Option<f64>,
}

impl Assessment {
    /// Routing key for A/B assignment, resolved from a named field with the
    /// patient id (then the assessment id) as fallback. Zero values are
    /// treated as unset, matching how absent foreign keys read.
    pub fn ab_key(&self, field: &str) -> String {
        let chosen = match field {
            "patientId" => Some(self.patient_id),
            "questionnaireId" => Some(self.questionnaire_id),
            "id" => Some(self.id),
            _ => None,
        };
        match chosen {
            Some(n) if n != 0 => n.to_string(),
            _ if self.patient_id != 0 => self.patient_id.to_string(),
            _ => self.id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(patient_id: i64) -> Assessment {
        Assessment {
            id: 42,
            patient_id,
            questionnaire_id: 3,
            responses: None,
            risk_score: None,
        }
    }

    #[test]
    fn test_ab_key_defaults_to_patient_id() {
        assert_eq!(assessment(7).ab_key("patientId"), "7");
    }

    #[test]
    fn test_ab_key_falls_back_to_assessment_id() {
        assert_eq!(assessment(0).ab_key("patientId"), "42");
    }

    #[test]
    fn test_ab_key_unknown_field_uses_patient_id() {
        assert_eq!(assessment(7).ab_key("somethingElse"), "7");
    }

    #[test]
    fn test_ab_key_by_named_field() {
        assert_eq!(assessment(7).ab_key("questionnaireId"), "3");
        assert_eq!(assessment(7).ab_key("id"), "42");
    }
}
