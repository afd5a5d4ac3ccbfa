use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::session::Credentials;
use crate::services::assignment_service::AssignmentApi;

use super::timer::TimerHandle;
use super::{SessionSettings, TestSession};

const SWEEP_PERIOD: Duration = Duration::from_secs(60);

type SessionMap = Arc<RwLock<HashMap<String, TestSession>>>;

/// Mounted sessions by assignment id. A session leaves the registry when it
/// navigates away after submitting, when it is torn down, when its load ends
/// in a state it cannot leave, or when it sits idle past the configured TTL.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: SessionMap,
    api: Arc<dyn AssignmentApi>,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(api: Arc<dyn AssignmentApi>, settings: SessionSettings) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            api,
            settings,
        }
    }

    /// Mounts the session on first call and loads it. Later calls with the
    /// same credentials return the mounted session untouched.
    ///
    /// An expired or not-found assignment is unmounted straight after the
    /// load; the returned session still describes why.
    pub async fn open(&self, session_id: &str, credentials: Credentials) -> Result<TestSession> {
        if session_id.trim().is_empty() {
            return Err(Error::BadRequest("Session id is required".to_string()));
        }

        let (session, created) = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            match sessions.get(session_id) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let session = TestSession::new(
                        session_id,
                        credentials.clone(),
                        self.api.clone(),
                        self.settings,
                    );
                    sessions.insert(session_id.to_string(), session.clone());
                    (session, true)
                }
            }
        };

        if !created {
            session.authorize(&credentials)?;
            session.touch();
            return Ok(session);
        }

        info!("Mounted session {}", session_id);
        self.watch(&session);
        session.load().await?;
        if session.is_dead_end() {
            info!("Session {} cannot proceed ({}), unmounting", session_id, session.status().as_str());
            self.evict(&session);
        }
        Ok(session)
    }

    /// Looks up a mounted session on behalf of `credentials`.
    pub fn get(&self, session_id: &str, credentials: &Credentials) -> Result<TestSession> {
        let session = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Session {} is not open", session_id)))?;
        session.authorize(credentials)?;
        session.touch();
        Ok(session)
    }

    /// Unmounts and tears down the session.
    pub fn close(&self, session_id: &str, credentials: &Credentials) -> Result<()> {
        let session = self.get(session_id, credentials)?;
        self.evict(&session);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unmounts every session that has been idle for the TTL and has neither
    /// a running clock nor a submission in flight. Returns how many went.
    pub fn sweep(&self) -> usize {
        let ttl = self.settings.idle_ttl;
        let stale: Vec<TestSession> = {
            let mut map = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            let ids: Vec<String> = map
                .iter()
                .filter(|(_, s)| !s.is_busy() && s.idle_for() >= ttl)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| map.remove(id)).collect()
        };
        for session in &stale {
            info!("Unmounted idle session {}", session.id());
            session.teardown();
        }
        stale.len()
    }

    /// Runs [`sweep`](Self::sweep) once a minute until the handle is dropped.
    pub fn spawn_sweeper(&self) -> TimerHandle {
        let registry = self.clone();
        TimerHandle::every(SWEEP_PERIOD, move || {
            let evicted = registry.sweep();
            if evicted > 0 {
                debug!("Sweep removed {} idle sessions", evicted);
            }
            ControlFlow::Continue(())
        })
    }

    fn evict(&self, session: &TestSession) {
        {
            let mut map = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            if map.get(session.id()).is_some_and(|s| s.instance() == session.instance()) {
                map.remove(session.id());
            }
        }
        session.teardown();
    }

    fn watch(&self, session: &TestSession) {
        let mut events = session.subscribe();
        let sessions = self.sessions.clone();
        let session_id = session.id().to_string();
        let instance = session.instance();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.is_final() => {
                        let mut map = sessions.write().unwrap_or_else(PoisonError::into_inner);
                        if map.get(&session_id).is_some_and(|s| s.instance() == instance) {
                            map.remove(&session_id);
                            debug!("Unmounted session {} after {}", session_id, event.event_name());
                        }
                        break;
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::assignment_dto::FetchAssignmentResponse;
    use crate::models::session::SessionStatus;
    use crate::services::assignment_service::MockAssignmentApi;
    use serde_json::json;

    fn payload(duration_minutes: u32) -> FetchAssignmentResponse {
        serde_json::from_value(json!({
            "_id": "a1",
            "template": {
                "name": "T",
                "position": "P",
                "testDuration": duration_minutes,
                "questions": [{ "_id": "q0", "type": "theory", "question": "Q0", "mark": 1 }]
            }
        }))
        .unwrap()
    }

    fn ready_api() -> MockAssignmentApi {
        let mut api = MockAssignmentApi::new();
        api.expect_fetch_assignment()
            .returning(|_, _| Ok(payload(120)));
        api
    }

    fn settings(idle_ttl: Duration) -> SessionSettings {
        SessionSettings {
            idle_ttl,
            ..SessionSettings::default()
        }
    }

    #[tokio::test]
    async fn closing_unknown_session_is_not_found() {
        let registry = SessionRegistry::new(Arc::new(MockAssignmentApi::new()), SessionSettings::default());
        let creds = Credentials::anonymous();
        assert!(matches!(registry.close("nope", &creds), Err(Error::NotFound(_))));
        assert!(matches!(registry.get("nope", &creds), Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn open_loads_once() {
        let mut api = MockAssignmentApi::new();
        api.expect_fetch_assignment()
            .times(1)
            .returning(|_, _| Ok(payload(30)));
        let registry = SessionRegistry::new(Arc::new(api), SessionSettings::default());

        let first = registry.open("a1", Credentials::anonymous()).await.unwrap();
        let second = registry.open("a1", Credentials::anonymous()).await.unwrap();
        assert_eq!(first.instance(), second.instance());
        assert_eq!(registry.len(), 1);

        registry.close("a1", &Credentials::anonymous()).unwrap();
        assert!(registry.is_empty());
        assert!(first.is_torn_down());
    }

    #[tokio::test]
    async fn missing_and_expired_assignments_are_not_kept() {
        let mut api = MockAssignmentApi::new();
        api.expect_fetch_assignment().returning(|id, _| {
            if id.starts_with("old") {
                Err(Error::Expired("gone".into()))
            } else {
                Err(Error::NotFound("missing".into()))
            }
        });
        let registry = SessionRegistry::new(Arc::new(api), SessionSettings::default());

        for i in 0..50 {
            let session = registry.open(&format!("missing-{}", i), Credentials::anonymous()).await.unwrap();
            assert_eq!(session.status(), SessionStatus::Error);
        }
        let expired = registry.open("old-1", Credentials::anonymous()).await.unwrap();
        assert_eq!(expired.status(), SessionStatus::Expired);

        assert!(registry.is_empty());
        assert!(expired.is_torn_down());
    }

    #[tokio::test]
    async fn retryable_failure_stays_mounted() {
        let mut api = MockAssignmentApi::new();
        api.expect_fetch_assignment().returning(|_, _| {
            Err(Error::Upstream {
                status: 503,
                message: "down".into(),
            })
        });
        let registry = SessionRegistry::new(Arc::new(api), SessionSettings::default());

        let session = registry.open("a1", Credentials::anonymous()).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Error);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_idle_sessions_but_keeps_running_ones() {
        let registry = SessionRegistry::new(Arc::new(ready_api()), settings(Duration::from_secs(300)));
        let creds = Credentials::anonymous();

        let abandoned = registry.open("abandoned", creds.clone()).await.unwrap();
        let running = registry.open("running", creds.clone()).await.unwrap();
        running.start().unwrap();
        let revisited = registry.open("revisited", creds.clone()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(200)).await;
        registry.get("revisited", &creds).unwrap();
        tokio::time::sleep(Duration::from_secs(150)).await;

        assert_eq!(registry.sweep(), 1);
        assert!(abandoned.is_torn_down());
        assert!(!running.is_torn_down());
        assert!(!revisited.is_torn_down());
        assert!(matches!(registry.get("abandoned", &creds), Err(Error::NotFound(_))));
        assert_eq!(registry.len(), 2);

        running.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_task_unmounts_after_ttl() {
        let registry = SessionRegistry::new(Arc::new(ready_api()), settings(Duration::from_secs(120)));
        let _sweeper = registry.spawn_sweeper();

        for i in 0..10 {
            registry.open(&format!("a{}", i), Credentials::anonymous()).await.unwrap();
        }
        assert_eq!(registry.len(), 10);

        tokio::time::sleep(Duration::from_secs(60 * 60)).await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn other_credentials_are_forbidden() {
        let registry = SessionRegistry::new(Arc::new(ready_api()), SessionSettings::default());
        let owner = Credentials::bearer("owner");
        let intruder = Credentials::bearer("intruder");

        registry.open("a1", owner.clone()).await.unwrap();

        assert!(matches!(registry.get("a1", &intruder), Err(Error::Forbidden(_))));
        assert!(matches!(registry.get("a1", &Credentials::anonymous()), Err(Error::Forbidden(_))));
        assert!(matches!(registry.open("a1", intruder.clone()).await, Err(Error::Forbidden(_))));
        assert!(matches!(registry.close("a1", &intruder), Err(Error::Forbidden(_))));
        assert_eq!(registry.len(), 1);

        assert!(registry.get("a1", &owner).is_ok());
        registry.close("a1", &owner).unwrap();
    }
}
