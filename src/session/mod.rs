//! Timed test-taking session.
//!
//! A [`TestSession`] owns everything a candidate's attempt needs: the loaded
//! questions, the answer slots, the review flags, the countdown task and the
//! submission gate. State lives behind a mutex that is never held across an
//! `.await`. The fetch and the submit call run on tasks the session spawns,
//! so they finish even when the caller that started them goes away.

pub mod answers;
pub mod flags;
pub mod gate;
pub mod registry;
pub mod timer;

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dto::assignment_dto::{CandidateResponseItem, SubmitTestRequest};
use crate::dto::session_dto::{
    LoadFailureView, QuestionView, SessionView, SubmissionView, SubmitSummary,
};
use crate::error::{Error, Result};
use crate::models::question::Question;
use crate::models::session::{
    CandidateInfo, Credentials, LoadFailure, RemoteResult, SessionStatus, TestInfo,
};
use crate::services::assignment_service::AssignmentApi;
use crate::services::session_loader::{self, LoadOutcome, LoadedTest};
use crate::utils::time::{self, format_clock};

use answers::{AnswerStore, Navigator};
use flags::{FlagSet, QuestionStatus};
use gate::{GateState, GateTransition, SubmissionGate, SubmitTrigger};
use timer::{Countdown, Tick, TimerHandle};

const EVENT_CAPACITY: usize = 64;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub tick: Duration,
    pub redirect_delay: Duration,
    /// How long a session may sit without requests before the registry
    /// unmounts it. Sessions with a running clock or an in-flight submit
    /// are kept.
    pub idle_ttl: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            redirect_delay: Duration::from_secs(3),
            idle_ttl: Duration::from_secs(30 * 60),
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            redirect_delay: config.redirect_delay(),
            idle_ttl: config.session_idle_ttl(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    Loaded { status: SessionStatus },
    Started { remaining_seconds: u32 },
    TimerTick { remaining_seconds: u32 },
    TimeExpired,
    Submitting { trigger: SubmitTrigger },
    Submitted,
    SubmitFailed { message: String },
    NavigateAway,
    TornDown,
}

impl SessionEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            SessionEvent::Loaded { .. } => "loaded",
            SessionEvent::Started { .. } => "started",
            SessionEvent::TimerTick { .. } => "timer-tick",
            SessionEvent::TimeExpired => "time-expired",
            SessionEvent::Submitting { .. } => "submitting",
            SessionEvent::Submitted => "submitted",
            SessionEvent::SubmitFailed { .. } => "submit-failed",
            SessionEvent::NavigateAway => "navigate-away",
            SessionEvent::TornDown => "torn-down",
        }
    }

    /// Events after which nothing else will be emitted.
    pub fn is_final(&self) -> bool {
        matches!(self, SessionEvent::NavigateAway | SessionEvent::TornDown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRequest {
    AwaitingConfirmation(SubmitSummary),
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Submitted,
    Failed(String),
    /// Suppressed: not running, or a submission already began.
    Ignored,
}

#[derive(Clone)]
pub struct TestSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    instance: u64,
    session_id: String,
    credentials: Credentials,
    api: Arc<dyn AssignmentApi>,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

struct SessionState {
    status: SessionStatus,
    load_generation: u64,
    load_failure: Option<LoadFailure>,
    torn_down: bool,
    test: Option<TestInfo>,
    candidate: Option<CandidateInfo>,
    questions: Vec<Question>,
    answers: AnswerStore,
    answers_initialized: bool,
    navigator: Navigator,
    flags: FlagSet,
    countdown: Countdown,
    timer: Option<TimerHandle>,
    gate: SubmissionGate,
    started_at: Option<DateTime<Utc>>,
    submitted_at: Option<DateTime<Utc>>,
    redirect: Option<TimerHandle>,
    redirected: bool,
    remote_result: Option<RemoteResult>,
    last_active: Instant,
}

impl SessionState {
    fn new() -> Self {
        Self {
            status: SessionStatus::NotLoaded,
            load_generation: 0,
            load_failure: None,
            torn_down: false,
            test: None,
            candidate: None,
            questions: Vec::new(),
            answers: AnswerStore::default(),
            answers_initialized: false,
            navigator: Navigator::default(),
            flags: FlagSet::default(),
            countdown: Countdown::new(0),
            timer: None,
            gate: SubmissionGate::default(),
            started_at: None,
            submitted_at: None,
            redirect: None,
            redirected: false,
            remote_result: None,
            last_active: Instant::now(),
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.torn_down {
            return Err(Error::Conflict("Session has been closed".to_string()));
        }
        Ok(())
    }

    fn ensure_started(&self) -> Result<()> {
        self.ensure_alive()?;
        if self.status != SessionStatus::Ready {
            return Err(Error::Conflict(format!(
                "Session is {}",
                self.status.as_str()
            )));
        }
        if self.questions.is_empty() {
            return Err(Error::Conflict("This test has no questions".to_string()));
        }
        if self.started_at.is_none() {
            return Err(Error::Conflict("The test has not been started".to_string()));
        }
        Ok(())
    }

    fn ensure_editable(&self) -> Result<()> {
        self.ensure_started()?;
        if !self.gate.is_open() {
            return Err(Error::Conflict("Answers are being submitted".to_string()));
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.ensure_started().is_ok()
    }

    fn init_answers(&mut self, len: usize) {
        if !self.answers_initialized {
            self.answers = AnswerStore::with_len(len);
            self.answers_initialized = true;
        }
    }

    fn apply_ready(&mut self, loaded: LoadedTest) {
        self.init_answers(loaded.questions.len());
        self.navigator = Navigator::new(loaded.questions.len());
        self.countdown = Countdown::new(loaded.test.duration_seconds);
        self.questions = loaded.questions;
        self.test = Some(loaded.test);
        self.candidate = Some(loaded.candidate);
        self.status = SessionStatus::Ready;
    }

    fn apply_completed(&mut self, loaded: LoadedTest, result: RemoteResult) {
        self.init_answers(loaded.questions.len());
        for (index, question) in loaded.questions.iter().enumerate() {
            if let Some(stored) = result.answers.iter().find(|a| a.question_id == question.id) {
                // Index comes from the same question list, so it is in range.
                let _ = self.answers.set(index, stored.answer.clone());
            }
        }
        self.navigator = Navigator::new(loaded.questions.len());
        self.countdown = Countdown::new(0);
        self.questions = loaded.questions;
        self.test = Some(loaded.test);
        self.candidate = Some(loaded.candidate);
        self.remote_result = Some(result);
        self.gate.mark_submitted();
        self.status = SessionStatus::Submitted;
    }

    fn summary(&self) -> SubmitSummary {
        SubmitSummary {
            answered: self.answers.answered_count(),
            flagged: self
                .questions
                .iter()
                .filter(|q| self.flags.contains(&q.id))
                .count(),
            total: self.questions.len(),
        }
    }

    /// Freezes the clock and builds the wire payload, one entry per question.
    fn begin_submission(&mut self, session_id: &str) -> SubmitTestRequest {
        self.countdown.disarm();
        self.timer = None;
        SubmitTestRequest {
            assignment_id: session_id.to_string(),
            candidate_response: self
                .questions
                .iter()
                .zip(self.answers.iter())
                .map(|(q, answer)| CandidateResponseItem {
                    question: q.id.clone(),
                    answer: answer.to_string(),
                })
                .collect(),
        }
    }

    fn statuses(&self) -> Vec<QuestionStatus> {
        self.questions
            .iter()
            .zip(self.answers.iter())
            .map(|(q, answer)| flags::classify(&q.id, answer, &self.flags))
            .collect()
    }
}

impl TestSession {
    pub fn new(
        session_id: impl Into<String>,
        credentials: Credentials,
        api: Arc<dyn AssignmentApi>,
        settings: SessionSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(SessionInner {
                instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
                session_id: session_id.into(),
                credentials,
                api,
                settings,
                state: Mutex::new(SessionState::new()),
                events,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.session_id
    }

    pub(crate) fn instance(&self) -> u64 {
        self.inner.instance
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    pub fn status(&self) -> SessionStatus {
        self.state().status
    }

    /// Rejects callers whose credentials differ from the ones the session was
    /// mounted with.
    pub fn authorize(&self, credentials: &Credentials) -> Result<()> {
        if *credentials != self.inner.credentials {
            warn!("Rejected foreign credentials for session {}", self.id());
            return Err(Error::Forbidden(
                "This session belongs to another candidate".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn touch(&self) {
        self.state().last_active = Instant::now();
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.state().last_active.elapsed()
    }

    /// The clock is running or a submission is in flight.
    pub(crate) fn is_busy(&self) -> bool {
        let st = self.state();
        !st.torn_down && (st.countdown.is_armed() || st.gate.state() == GateState::Submitting)
    }

    /// Loaded into a state nothing can move out of: expired, or a load
    /// failure that cannot be retried.
    pub fn is_dead_end(&self) -> bool {
        let st = self.state();
        match st.status {
            SessionStatus::Expired => true,
            SessionStatus::Error => !st.load_failure.as_ref().is_some_and(LoadFailure::is_retryable),
            _ => false,
        }
    }

    /// Fetches the assignment and populates the session. Valid from
    /// `not_loaded`, or from `error` when the failure is retryable; any other
    /// status is returned unchanged without a fetch.
    pub async fn load(&self) -> Result<SessionStatus> {
        let generation = {
            let mut st = self.state();
            st.ensure_alive()?;
            match st.status {
                SessionStatus::NotLoaded => {}
                SessionStatus::Error => {
                    if !st.load_failure.as_ref().is_some_and(LoadFailure::is_retryable) {
                        return Err(Error::Conflict(
                            "This test cannot be loaded".to_string(),
                        ));
                    }
                }
                other => return Ok(other),
            }
            st.load_generation += 1;
            st.load_failure = None;
            st.status = SessionStatus::Loading;
            st.load_generation
        };

        info!("Loading assignment {}", self.id());
        // Leaves `loading` even if the caller is dropped.
        let session = self.clone();
        let fetch = tokio::spawn(async move {
            let outcome = session
                .inner
                .api
                .fetch_assignment(session.id(), &session.inner.credentials)
                .await
                .and_then(session_loader::normalize);
            session.finish_load(generation, outcome)
        });

        match fetch.await {
            Ok(status) => Ok(status),
            Err(err) => {
                warn!("Load task for {} did not finish: {}", self.id(), err);
                Ok(self.finish_load(
                    generation,
                    Err(Error::Internal("The load did not complete".to_string())),
                ))
            }
        }
    }

    fn finish_load(&self, generation: u64, outcome: Result<LoadOutcome>) -> SessionStatus {
        let mut st = self.state();
        if st.torn_down || st.load_generation != generation {
            warn!("Ignoring stale load response for {}", self.id());
            return st.status;
        }

        match outcome {
            Ok(LoadOutcome::Ready(loaded)) => {
                info!(
                    "Assignment {} ready: {} questions, {}s",
                    self.id(),
                    loaded.questions.len(),
                    loaded.test.duration_seconds
                );
                st.apply_ready(loaded);
            }
            Ok(LoadOutcome::Completed(loaded, result)) => {
                info!("Assignment {} already completed, replay only", self.id());
                st.apply_completed(loaded, result);
            }
            Ok(LoadOutcome::Expired) | Err(Error::Expired(_)) => {
                info!("Assignment {} has expired", self.id());
                st.status = SessionStatus::Expired;
            }
            Err(err) => {
                let failure = session_loader::classify_error(&err);
                warn!(
                    "Failed to load assignment {} ({:?}): {}",
                    self.id(),
                    failure.kind,
                    err
                );
                st.load_failure = Some(failure);
                st.status = SessionStatus::Error;
            }
        }

        let status = st.status;
        drop(st);
        self.emit(SessionEvent::Loaded { status });
        status
    }

    pub async fn retry_load(&self) -> Result<SessionStatus> {
        {
            let st = self.state();
            st.ensure_alive()?;
            if st.status != SessionStatus::Error {
                return Err(Error::Conflict(
                    "Only a failed load can be retried".to_string(),
                ));
            }
        }
        self.load().await
    }

    /// Edits the candidate's name and phone before the test starts. Email and
    /// position come from the assignment and stay as loaded.
    pub fn update_candidate(
        &self,
        name: Option<String>,
        phone: Option<String>,
    ) -> Result<CandidateInfo> {
        let mut st = self.state();
        st.ensure_alive()?;
        if st.status != SessionStatus::Ready || st.started_at.is_some() {
            return Err(Error::Conflict(
                "Candidate details can only change before the test starts".to_string(),
            ));
        }
        let candidate = st.candidate.get_or_insert_with(CandidateInfo::default);
        if let Some(name) = name {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::BadRequest("Name cannot be empty".to_string()));
            }
            candidate.name = name.to_string();
        }
        if let Some(phone) = phone {
            candidate.phone = phone.trim().to_string();
        }
        debug!("Candidate details updated for session {}", self.id());
        Ok(candidate.clone())
    }

    /// Arms the countdown. Returns the remaining seconds.
    pub fn start(&self) -> Result<u32> {
        let mut st = self.state();
        st.ensure_alive()?;
        if st.status != SessionStatus::Ready {
            return Err(Error::Conflict(format!(
                "Cannot start a session that is {}",
                st.status.as_str()
            )));
        }
        if st.questions.is_empty() {
            return Err(Error::Conflict("This test has no questions".to_string()));
        }
        if st.started_at.is_some() {
            return Err(Error::Conflict("The test has already been started".to_string()));
        }

        st.countdown.arm();
        st.started_at = Some(time::now());
        st.timer = Some(self.spawn_countdown());
        let remaining = st.countdown.remaining();
        drop(st);

        info!("Session {} started with {}s on the clock", self.id(), remaining);
        self.emit(SessionEvent::Started {
            remaining_seconds: remaining,
        });
        Ok(remaining)
    }

    fn spawn_countdown(&self) -> TimerHandle {
        let weak = Arc::downgrade(&self.inner);
        TimerHandle::every(self.inner.settings.tick, move || match weak.upgrade() {
            Some(inner) => TestSession { inner }.on_tick(),
            None => ControlFlow::Break(()),
        })
    }

    fn on_tick(&self) -> ControlFlow<()> {
        let mut st = self.state();
        if st.torn_down || !st.gate.is_open() {
            return ControlFlow::Break(());
        }
        match st.countdown.tick() {
            Tick::Idle => ControlFlow::Break(()),
            Tick::Running(remaining_seconds) => {
                drop(st);
                debug!("Session {}: {}s left", self.id(), remaining_seconds);
                self.emit(SessionEvent::TimerTick { remaining_seconds });
                ControlFlow::Continue(())
            }
            Tick::Expired => {
                drop(st);
                info!("Time is up for session {}", self.id());
                self.emit(SessionEvent::TimerTick {
                    remaining_seconds: 0,
                });
                self.emit(SessionEvent::TimeExpired);
                let session = self.clone();
                tokio::spawn(async move {
                    session.auto_submit().await;
                });
                ControlFlow::Break(())
            }
        }
    }

    pub fn set_answer(&self, index: usize, value: impl Into<String>) -> Result<()> {
        let mut st = self.state();
        st.ensure_editable()?;
        st.answers.set(index, value.into())
    }

    pub fn next(&self) -> Result<usize> {
        let mut st = self.state();
        st.ensure_started()?;
        Ok(st.navigator.next())
    }

    pub fn prev(&self) -> Result<usize> {
        let mut st = self.state();
        st.ensure_started()?;
        Ok(st.navigator.prev())
    }

    pub fn jump_to(&self, index: usize) -> Result<usize> {
        let mut st = self.state();
        st.ensure_started()?;
        st.navigator.jump_to(index)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.state().navigator.current()
    }

    pub fn can_go_previous(&self) -> bool {
        let st = self.state();
        st.is_running() && st.navigator.can_go_previous()
    }

    pub fn can_go_next(&self) -> bool {
        let st = self.state();
        st.is_running() && st.navigator.can_go_next()
    }

    /// Returns whether the question is flagged afterwards.
    pub fn toggle_flag(&self, question_id: &str) -> Result<bool> {
        let mut st = self.state();
        st.ensure_started()?;
        if !st.questions.iter().any(|q| q.id == question_id) {
            return Err(Error::BadRequest(format!(
                "Unknown question {}",
                question_id
            )));
        }
        Ok(st.flags.toggle(question_id))
    }

    pub fn is_flagged(&self, question_id: &str) -> bool {
        self.state().flags.contains(question_id)
    }

    pub fn answers(&self) -> Vec<String> {
        self.state().answers.iter().map(str::to_string).collect()
    }

    pub fn question_count(&self) -> usize {
        self.state().questions.len()
    }

    pub fn question_statuses(&self) -> Vec<QuestionStatus> {
        self.state().statuses()
    }

    pub fn progress(&self) -> f64 {
        self.state().answers.progress()
    }

    pub fn remaining_seconds(&self) -> Option<u32> {
        let st = self.state();
        st.test.as_ref().map(|_| st.countdown.remaining())
    }

    pub fn gate_state(&self) -> GateState {
        self.state().gate.state()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().gate.last_error().map(str::to_string)
    }

    /// User asked to submit. Opens the confirmation step.
    pub fn request_submit(&self) -> SubmitRequest {
        let mut st = self.state();
        if !st.is_running() {
            debug!("Ignoring submit request for session {} ({})", self.id(), st.status.as_str());
            return SubmitRequest::Ignored;
        }
        match st.gate.request(SubmitTrigger::User) {
            GateTransition::AwaitConfirmation => SubmitRequest::AwaitingConfirmation(st.summary()),
            _ => {
                debug!("Duplicate submit request for session {} suppressed", self.id());
                SubmitRequest::Ignored
            }
        }
    }

    pub fn cancel_submit(&self) -> bool {
        self.state().gate.cancel()
    }

    /// Second, explicit confirmation. Performs the submission call.
    pub async fn confirm_submit(&self) -> SubmissionOutcome {
        self.submit_with(SubmitTrigger::User, SubmissionGate::confirm)
            .await
    }

    async fn auto_submit(&self) -> SubmissionOutcome {
        self.submit_with(SubmitTrigger::Timeout, |gate| {
            gate.request(SubmitTrigger::Timeout)
        })
        .await
    }

    async fn submit_with<F>(&self, trigger: SubmitTrigger, open: F) -> SubmissionOutcome
    where
        F: FnOnce(&mut SubmissionGate) -> GateTransition,
    {
        let request = {
            let mut st = self.state();
            if !st.is_running() {
                debug!("Session {} not running, {:?} submit ignored", self.id(), trigger);
                return SubmissionOutcome::Ignored;
            }
            match open(&mut st.gate) {
                GateTransition::Submit => st.begin_submission(&self.inner.session_id),
                _ => {
                    debug!("Duplicate {:?} submit for session {} suppressed", trigger, self.id());
                    return SubmissionOutcome::Ignored;
                }
            }
        };

        self.emit(SessionEvent::Submitting { trigger });
        info!(
            "Submitting {} answers for session {} ({:?})",
            request.candidate_response.len(),
            self.id(),
            trigger
        );

        // Only the outcome of this call moves the gate out of `submitting`.
        let session = self.clone();
        let call = tokio::spawn(async move {
            let result = session
                .inner
                .api
                .submit_answers(&request, &session.inner.credentials)
                .await;
            session.finish_submission(result)
        });

        match call.await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("Submit task for {} did not finish: {}", self.id(), err);
                self.finish_submission(Err(Error::Internal(
                    "The submission did not complete".to_string(),
                )))
            }
        }
    }

    fn finish_submission(&self, result: Result<()>) -> SubmissionOutcome {
        let mut st = self.state();
        if st.gate.state() != GateState::Submitting {
            return SubmissionOutcome::Ignored;
        }
        match result {
            Ok(()) => {
                st.gate.succeed();
                st.status = SessionStatus::Submitted;
                st.submitted_at = Some(time::now());
                st.timer = None;
                if !st.torn_down {
                    st.redirect = Some(self.schedule_navigate_away());
                }
                drop(st);
                info!("Session {} submitted", self.id());
                self.emit(SessionEvent::Submitted);
                SubmissionOutcome::Submitted
            }
            Err(err) => {
                let message = err.user_message();
                warn!("Submission for session {} failed: {}", self.id(), err);
                st.gate.fail(message.clone());
                if !st.torn_down && st.countdown.arm() {
                    st.timer = Some(self.spawn_countdown());
                }
                drop(st);
                self.emit(SessionEvent::SubmitFailed {
                    message: message.clone(),
                });
                SubmissionOutcome::Failed(message)
            }
        }
    }

    fn schedule_navigate_away(&self) -> TimerHandle {
        let weak = Arc::downgrade(&self.inner);
        TimerHandle::after(self.inner.settings.redirect_delay, move || {
            if let Some(inner) = weak.upgrade() {
                TestSession { inner }.navigate_away();
            }
        })
    }

    fn navigate_away(&self) {
        {
            let mut st = self.state();
            if st.torn_down || st.redirected {
                return;
            }
            st.redirected = true;
        }
        info!("Leaving session {}", self.id());
        self.emit(SessionEvent::NavigateAway);
    }

    /// Releases the timer and any pending redirect. Late responses are ignored
    /// afterwards.
    pub fn teardown(&self) {
        let mut st = self.state();
        if st.torn_down {
            return;
        }
        st.torn_down = true;
        st.countdown.disarm();
        st.timer = None;
        st.redirect = None;
        drop(st);
        info!("Session {} torn down", self.id());
        self.emit(SessionEvent::TornDown);
    }

    pub fn is_torn_down(&self) -> bool {
        self.state().torn_down
    }

    pub fn view(&self) -> SessionView {
        let st = self.state();
        let statuses = st.statuses();
        let questions = st
            .questions
            .iter()
            .zip(st.answers.iter())
            .zip(statuses)
            .enumerate()
            .map(|(index, ((q, answer), status))| QuestionView {
                index,
                id: q.id.clone(),
                question_type: q.question_type,
                prompt: q.prompt.clone(),
                options: q.options.clone(),
                marks: q.marks,
                answer: answer.to_string(),
                flagged: st.flags.contains(&q.id),
                status,
            })
            .collect();

        let running = st.is_running();
        let remaining = st.test.as_ref().map(|_| st.countdown.remaining());
        let submitted = st.gate.state() == GateState::Submitted;

        SessionView {
            session_id: self.inner.session_id.clone(),
            status: st.status,
            test: st.test.clone(),
            candidate: st.candidate.clone(),
            has_questions: !st.questions.is_empty(),
            questions,
            current_index: st.navigator.current(),
            can_go_previous: running && st.navigator.can_go_previous(),
            can_go_next: running && st.navigator.can_go_next(),
            started: st.started_at.is_some(),
            started_at: st.started_at,
            remaining_seconds: remaining,
            remaining_clock: remaining.map(format_clock),
            answered_count: st.answers.answered_count(),
            progress: st.answers.progress(),
            submission: SubmissionView {
                state: st.gate.state(),
                summary: (st.gate.state() == GateState::Confirming).then(|| st.summary()),
                last_error: st.gate.last_error().map(str::to_string),
                submitted_at: st.submitted_at,
                redirect_pending: st.redirect.is_some() && !st.redirected,
                notify_email: st
                    .candidate
                    .as_ref()
                    .filter(|_| submitted)
                    .map(|c| c.email.clone())
                    .filter(|e| !e.is_empty()),
            },
            load_failure: st.load_failure.as_ref().map(|f| LoadFailureView {
                kind: f.kind,
                message: f.message.clone(),
                retryable: f.is_retryable(),
            }),
            remote_result: st.remote_result.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::assignment_dto::FetchAssignmentResponse;
    use crate::services::assignment_service::MockAssignmentApi;
    use serde_json::json;

    fn payload(duration_minutes: u32, question_count: usize) -> FetchAssignmentResponse {
        let questions: Vec<_> = (0..question_count)
            .map(|i| json!({ "_id": format!("q{}", i), "type": "theory", "question": format!("Q{}", i), "mark": 1 }))
            .collect();
        serde_json::from_value(json!({
            "_id": "a1",
            "template": {
                "name": "T",
                "position": "P",
                "testDuration": duration_minutes,
                "questions": questions
            }
        }))
        .unwrap()
    }

    fn session_with(api: MockAssignmentApi) -> TestSession {
        TestSession::new(
            "a1",
            Credentials::bearer("tok"),
            Arc::new(api),
            SessionSettings::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_submit_calls_backend_once_with_every_slot() {
        let mut api = MockAssignmentApi::new();
        api.expect_fetch_assignment()
            .times(1)
            .returning(|_, _| Ok(payload(10, 3)));
        api.expect_submit_answers()
            .withf(|req, creds| {
                req.assignment_id == "a1"
                    && req.candidate_response.len() == 3
                    && req.candidate_response[1].answer == "B"
                    && req.candidate_response[0].answer.is_empty()
                    && creds.bearer_token() == Some("tok")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let session = session_with(api);
        assert_eq!(session.load().await.unwrap(), SessionStatus::Ready);
        session.start().unwrap();
        session.set_answer(1, "B").unwrap();

        let SubmitRequest::AwaitingConfirmation(summary) = session.request_submit() else {
            panic!("expected confirmation step");
        };
        assert_eq!(summary.answered, 1);
        assert_eq!(summary.total, 3);

        assert_eq!(session.confirm_submit().await, SubmissionOutcome::Submitted);
        assert_eq!(session.confirm_submit().await, SubmissionOutcome::Ignored);
        assert_eq!(session.request_submit(), SubmitRequest::Ignored);
        assert_eq!(session.status(), SessionStatus::Submitted);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_session_never_submits() {
        let mut api = MockAssignmentApi::new();
        api.expect_fetch_assignment()
            .returning(|_, _| Err(Error::Expired("gone".into())));
        api.expect_submit_answers().times(0);

        let session = session_with(api);
        assert_eq!(session.load().await.unwrap(), SessionStatus::Expired);
        assert!(session.start().is_err());
        assert_eq!(session.request_submit(), SubmitRequest::Ignored);
        assert_eq!(session.confirm_submit().await, SubmissionOutcome::Ignored);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_cannot_be_retried() {
        let mut api = MockAssignmentApi::new();
        api.expect_fetch_assignment()
            .times(1)
            .returning(|_, _| Err(Error::NotFound("missing".into())));

        let session = session_with(api);
        assert_eq!(session.load().await.unwrap(), SessionStatus::Error);
        assert!(matches!(session.retry_load().await, Err(Error::Conflict(_))));
        let view = session.view();
        assert_eq!(view.load_failure.map(|f| f.retryable), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn operations_before_start_are_conflicts() {
        let mut api = MockAssignmentApi::new();
        api.expect_fetch_assignment()
            .returning(|_, _| Ok(payload(1, 2)));

        let session = session_with(api);
        session.load().await.unwrap();
        assert!(matches!(session.set_answer(0, "x"), Err(Error::Conflict(_))));
        assert!(matches!(session.next(), Err(Error::Conflict(_))));
        assert!(matches!(session.toggle_flag("q0"), Err(Error::Conflict(_))));
        assert_eq!(session.request_submit(), SubmitRequest::Ignored);
        assert_eq!(session.remaining_seconds(), Some(60));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_flag_target_is_rejected() {
        let mut api = MockAssignmentApi::new();
        api.expect_fetch_assignment()
            .returning(|_, _| Ok(payload(1, 2)));

        let session = session_with(api);
        session.load().await.unwrap();
        session.start().unwrap();
        assert!(matches!(session.toggle_flag("nope"), Err(Error::BadRequest(_))));
        assert!(session.toggle_flag("q1").unwrap());
        assert_eq!(
            session.question_statuses(),
            vec![QuestionStatus::Unanswered, QuestionStatus::Flagged]
        );
        session.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn candidate_edit_only_before_start() {
        let mut api = MockAssignmentApi::new();
        api.expect_fetch_assignment()
            .returning(|_, _| Ok(payload(1, 1)));

        let session = session_with(api);
        assert!(matches!(
            session.update_candidate(Some("Grace".into()), None),
            Err(Error::Conflict(_))
        ));
        session.load().await.unwrap();

        let position = session.view().candidate.unwrap().position;
        let updated = session.update_candidate(Some(" Grace ".into()), None).unwrap();
        assert_eq!(updated.name, "Grace");
        assert_eq!(updated.position, position);
        assert!(matches!(
            session.update_candidate(Some("   ".into()), Some("123".into())),
            Err(Error::BadRequest(_))
        ));
        assert_eq!(session.view().candidate.unwrap().phone, "");

        session.start().unwrap();
        assert!(matches!(
            session.update_candidate(None, Some("123".into())),
            Err(Error::Conflict(_))
        ));
        session.teardown();
    }

    #[test]
    fn only_mounting_credentials_are_authorized() {
        let session = session_with(MockAssignmentApi::new());
        assert!(session.authorize(&Credentials::bearer("tok")).is_ok());
        assert!(matches!(
            session.authorize(&Credentials::bearer("other")),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            session.authorize(&Credentials::anonymous()),
            Err(Error::Forbidden(_))
        ));
    }
}
