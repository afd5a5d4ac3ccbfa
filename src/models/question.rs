use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Question {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub marks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Mcq,
    Theory,
    Coding,
}

impl Question {
    /// Builds a question, enforcing that `options` is present, non-empty, and
    /// only present for multiple-choice questions.
    pub fn new(
        id: impl Into<String>,
        question_type: QuestionType,
        prompt: impl Into<String>,
        options: Option<Vec<String>>,
        marks: u32,
    ) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidPayload("question without an id".to_string()));
        }

        let options = match (question_type, options) {
            (QuestionType::Mcq, Some(opts)) if !opts.is_empty() => Some(opts),
            (QuestionType::Mcq, _) => {
                return Err(Error::InvalidPayload(format!(
                    "multiple-choice question {} has no options",
                    id
                )))
            }
            // Theory/coding payloads sometimes carry an empty options array.
            (_, Some(opts)) if opts.is_empty() => None,
            (_, Some(_)) => {
                return Err(Error::InvalidPayload(format!(
                    "{} question {} must not carry options",
                    question_type.as_str(),
                    id
                )))
            }
            (_, None) => None,
        };

        Ok(Self {
            id,
            question_type,
            prompt: prompt.into(),
            options,
            marks,
        })
    }
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Mcq => "mcq",
            QuestionType::Theory => "theory",
            QuestionType::Coding => "coding",
        }
    }
}
