use serde::{Deserialize, Serialize};

/// Answer payload for a single question. The wire shape depends on the
/// question type: free text and ratings arrive as strings or numbers,
/// checkbox questions as an ordered list of selected options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Number(f64),
    Multi(Vec<String>),
}

impl AnswerValue {
    pub fn is_answered(&self) -> bool {
        match self {
            AnswerValue::Text(text) => !text.trim().is_empty(),
            AnswerValue::Number(_) => true,
            AnswerValue::Multi(values) => !values.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    pub value: AnswerValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub response_id: String,
    pub survey_id: String,
    pub respondent_id: String,
    pub answers: Vec<Answer>,
}

/// Stored answer row as the backend keeps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRow {
    pub answer_id: String,
    pub response_id: String,
    pub question_id: String,
    pub value: AnswerValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewResponse {
    pub response_id: String,
    pub survey_id: String,
    pub respondent_id: String,
    pub submitted_at_ms: i64,
}

/// Nested fetch result for one response: the response row with its raw
/// answer rows still attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub response_id: String,
    pub survey_id: String,
    pub respondent_id: String,
    pub answers: Vec<AnswerRow>,
}

pub fn flatten_response(record: ResponseRecord) -> SurveyResponse {
    SurveyResponse {
        response_id: record.response_id,
        survey_id: record.survey_id,
        respondent_id: record.respondent_id,
        answers: record
            .answers
            .into_iter()
            .map(|row| Answer {
                question_id: row.question_id,
                value: row.value,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_counts_as_unanswered() {
        assert!(!AnswerValue::Text("   ".to_string()).is_answered());
        assert!(AnswerValue::Text("5".to_string()).is_answered());
    }

    #[test]
    fn empty_selection_counts_as_unanswered() {
        assert!(!AnswerValue::Multi(vec![]).is_answered());
        assert!(AnswerValue::Multi(vec!["a".to_string()]).is_answered());
    }

    #[test]
    fn value_deserializes_untagged() {
        let text: AnswerValue = serde_json::from_str("\"ok\"").expect("text");
        assert_eq!(text, AnswerValue::Text("ok".to_string()));
        let multi: AnswerValue = serde_json::from_str("[\"a\",\"b\"]").expect("multi");
        assert_eq!(
            multi,
            AnswerValue::Multi(vec!["a".to_string(), "b".to_string()])
        );
    }
}
