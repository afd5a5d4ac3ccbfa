use crate::models::question::QuestionType;
use serde::{Deserialize, Deserializer, Serialize};

fn deserialize_bool_flexible<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrInt {
        Bool(bool),
        Int(i64),
        String(String),
        Null(()),
    }

    match BoolOrInt::deserialize(deserializer)? {
        BoolOrInt::Bool(b) => Ok(b),
        BoolOrInt::Int(i) => Ok(i != 0),
        BoolOrInt::Null(()) => Ok(false),
        BoolOrInt::String(s) => match s.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            _ => Err(serde::de::Error::custom(format!("Invalid boolean string: {}", s))),
        },
    }
}

fn deserialize_minutes_flexible<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Int(u64),
        Float(f64),
        String(String),
    }

    match Option::<NumOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumOrString::Int(n)) => u32::try_from(n)
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("Duration out of range: {}", n))),
        Some(NumOrString::Float(f)) if f >= 0.0 && f <= u32::MAX as f64 => Ok(Some(f.round() as u32)),
        Some(NumOrString::Float(f)) => {
            Err(serde::de::Error::custom(format!("Duration out of range: {}", f)))
        }
        Some(NumOrString::String(s)) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("Invalid duration {}: {}", s, e))),
    }
}

/// Every payload shape the assignment service is known to answer with.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FetchAssignmentResponse {
    Wrapped { assignment: AssignmentPayload },
    Assignment(AssignmentPayload),
    DirectTest { test: DirectTestPayload },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentPayload {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: Option<String>,
    pub template: TemplatePayload,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub test_completed: bool,
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub is_expired: bool,
    #[serde(default)]
    pub total_score: Option<f64>,
    #[serde(default)]
    pub candidate_answers: Vec<CandidateAnswerPayload>,
    #[serde(default)]
    pub candidate: Option<CandidatePayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default, deserialize_with = "deserialize_minutes_flexible")]
    pub test_duration: Option<u32>,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub questions: Vec<QuestionPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectTestPayload {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(
        default,
        alias = "testDuration",
        deserialize_with = "deserialize_minutes_flexible"
    )]
    pub duration: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub is_expired: bool,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub questions: Vec<QuestionPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionPayload {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub question: String,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default, alias = "marks")]
    pub mark: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateAnswerPayload {
    pub question: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub score_awarded: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTestRequest {
    pub assignment_id: String,
    pub candidate_response: Vec<CandidateResponseItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateResponseItem {
    pub question: String,
    pub answer: String,
}
