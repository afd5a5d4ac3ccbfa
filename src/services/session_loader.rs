//! Normalises the assignment service's payload shapes into one internal form.

use std::collections::HashSet;

use crate::dto::assignment_dto::{
    AssignmentPayload, CandidatePayload, DirectTestPayload, FetchAssignmentResponse,
    QuestionPayload,
};
use crate::error::{Error, Result};
use crate::models::question::Question;
use crate::models::session::{
    CandidateInfo, LoadFailure, LoadFailureKind, RemoteResult, ReplayAnswer, TestInfo,
};

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTest {
    pub test: TestInfo,
    pub candidate: CandidateInfo,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Takeable. May hold zero questions.
    Ready(LoadedTest),
    Expired,
    /// Already submitted; replay only.
    Completed(LoadedTest, RemoteResult),
}

pub fn normalize(response: FetchAssignmentResponse) -> Result<LoadOutcome> {
    match response {
        FetchAssignmentResponse::Wrapped { assignment }
        | FetchAssignmentResponse::Assignment(assignment) => from_assignment(assignment),
        FetchAssignmentResponse::DirectTest { test } => from_direct_test(test),
    }
}

fn from_assignment(assignment: AssignmentPayload) -> Result<LoadOutcome> {
    let status = assignment
        .status
        .as_deref()
        .map(|s| s.trim().to_ascii_lowercase());

    if assignment.is_expired || status.as_deref() == Some("expired") {
        return Ok(LoadOutcome::Expired);
    }

    let template = assignment.template;
    let questions = map_questions(template.questions)?;
    let candidate = assignment
        .candidate
        .map(candidate_info)
        .unwrap_or_default();
    let candidate = CandidateInfo {
        position: template.position.clone(),
        ..candidate
    };

    if assignment.test_completed {
        let loaded = LoadedTest {
            test: TestInfo {
                name: template.name,
                position: template.position,
                duration_seconds: minutes_to_seconds(template.test_duration.unwrap_or(0)),
                max_score: template.max_score,
                instructions: template.instructions,
            },
            candidate,
            questions,
        };
        let result = RemoteResult {
            total_score: assignment.total_score,
            answers: assignment
                .candidate_answers
                .into_iter()
                .map(|a| ReplayAnswer {
                    question_id: a.question,
                    answer: a.answer.unwrap_or_default(),
                    score_awarded: a.score_awarded,
                })
                .collect(),
        };
        return Ok(LoadOutcome::Completed(loaded, result));
    }

    let duration_seconds = takeable_duration(template.test_duration)?;
    Ok(LoadOutcome::Ready(LoadedTest {
        test: TestInfo {
            name: template.name,
            position: template.position,
            duration_seconds,
            max_score: template.max_score,
            instructions: template.instructions,
        },
        candidate,
        questions,
    }))
}

fn from_direct_test(test: DirectTestPayload) -> Result<LoadOutcome> {
    if test.is_expired {
        return Ok(LoadOutcome::Expired);
    }

    let questions = map_questions(test.questions)?;
    let duration_seconds = takeable_duration(test.duration)?;
    let max_score = questions.iter().map(|q| q.marks as f64).sum::<f64>();

    Ok(LoadOutcome::Ready(LoadedTest {
        candidate: CandidateInfo {
            name: test.name.clone(),
            email: test.email.unwrap_or_default(),
            phone: test.phone.unwrap_or_default(),
            position: test.position.clone(),
        },
        test: TestInfo {
            name: test.name,
            position: test.position,
            duration_seconds,
            max_score: Some(max_score).filter(|m| *m > 0.0),
            instructions: test.instructions,
        },
        questions,
    }))
}

fn map_questions(payloads: Vec<QuestionPayload>) -> Result<Vec<Question>> {
    let mut seen = HashSet::with_capacity(payloads.len());
    payloads
        .into_iter()
        .map(|p| {
            if !seen.insert(p.id.clone()) {
                return Err(Error::InvalidPayload(format!(
                    "duplicate question id {}",
                    p.id
                )));
            }
            Question::new(
                p.id,
                p.question_type,
                p.question,
                p.options,
                p.mark.unwrap_or(0),
            )
        })
        .collect()
}

fn candidate_info(c: CandidatePayload) -> CandidateInfo {
    let name = match c.name.filter(|n| !n.trim().is_empty()) {
        Some(name) => name,
        None => [c.first_name, c.last_name]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
    };
    CandidateInfo {
        name,
        email: c.email.unwrap_or_default(),
        phone: c.phone.unwrap_or_default(),
        position: String::new(),
    }
}

fn takeable_duration(minutes: Option<u32>) -> Result<u32> {
    match minutes {
        Some(m) if m > 0 => Ok(minutes_to_seconds(m)),
        _ => Err(Error::InvalidPayload(
            "test duration must be a positive number of minutes".to_string(),
        )),
    }
}

fn minutes_to_seconds(minutes: u32) -> u32 {
    minutes.saturating_mul(60)
}

/// Maps a fetch error onto the load-failure taxonomy. `Expired` never gets
/// here; callers turn it into [`LoadOutcome::Expired`] first.
pub fn classify_error(err: &Error) -> LoadFailure {
    let kind = match err {
        Error::NotFound(_) => LoadFailureKind::NotFound,
        Error::Json(_) | Error::InvalidPayload(_) => LoadFailureKind::Parse,
        Error::Reqwest(e) if e.is_decode() => LoadFailureKind::Parse,
        _ => LoadFailureKind::Network,
    };
    let message = match kind {
        LoadFailureKind::NotFound => "This test could not be found.".to_string(),
        LoadFailureKind::Parse => {
            "Failed to load test. Please try again later.".to_string()
        }
        LoadFailureKind::Network => {
            "Something went wrong. Please try again later.".to_string()
        }
    };
    LoadFailure { kind, message }
}
