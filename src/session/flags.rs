use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Question ids marked for review. Advisory only.
#[derive(Debug, Clone, Default)]
pub struct FlagSet {
    ids: HashSet<String>,
}

impl FlagSet {
    /// Returns whether the question is flagged after the toggle.
    pub fn toggle(&mut self, question_id: &str) -> bool {
        if self.ids.remove(question_id) {
            false
        } else {
            self.ids.insert(question_id.to_string());
            true
        }
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.ids.contains(question_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Flagged,
    Answered,
    Unanswered,
}

/// Navigation-panel status. Flagged wins over answered.
pub fn classify(question_id: &str, answer: &str, flags: &FlagSet) -> QuestionStatus {
    if flags.contains(question_id) {
        QuestionStatus::Flagged
    } else if !answer.trim().is_empty() {
        QuestionStatus::Answered
    } else {
        QuestionStatus::Unanswered
    }
}
