use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use uuid::Uuid;
use crate::{config::AppConfig, session::SurveySession, store::SubmissionStore};

pub type Sessions = HashMap<Uuid, SurveySession>;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn SubmissionStore>,
    /// Sesiones abiertas. Cada una la maneja un único encuestado.
    pub sessions: Arc<Mutex<Sessions>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn SubmissionStore>,
        shutdown_sender: Option<oneshot::Sender<()>>,
    ) -> Self {
        Self {
            config,
            store,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Arc::new(Mutex::new(shutdown_sender)),
        }
    }

    /// No mantener el guard a través de un `.await`.
    pub fn sessions(&self) -> MutexGuard<'_, Sessions> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub backend: String,
    pub open_sessions: usize,
    pub message: String,
}
