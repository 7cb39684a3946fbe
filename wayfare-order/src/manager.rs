use crate::flows::FlowCatalog;
use crate::session::WizardSession;
use crate::submission::SubmissionHandler;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;
use wayfare_core::{BookingDraft, CoreError};

/// Keeps the live wizard sessions, one per draft
pub struct SessionManager {
    sessions: RwLock<HashMap<Uuid, Arc<WizardSession>>>,
    catalog: Arc<FlowCatalog>,
    handler: Arc<SubmissionHandler>,
}

impl SessionManager {
    pub fn new(catalog: Arc<FlowCatalog>, handler: Arc<SubmissionHandler>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            catalog,
            handler,
        }
    }

    pub fn catalog(&self) -> &FlowCatalog {
        &self.catalog
    }

    /// Open a fresh draft for `flow_id`
    pub async fn start(&self, flow_id: &str) -> Result<Arc<WizardSession>, SessionError> {
        let flow = self
            .catalog
            .get(flow_id)
            .ok_or_else(|| SessionError::UnknownFlow(flow_id.to_string()))?;

        let session = Arc::new(WizardSession::new(flow, self.handler.clone()));
        info!(draft_id = %session.id(), flow = flow_id, "Wizard session started");

        self.sessions.write().await.insert(session.id(), session.clone());
        Ok(session)
    }

    /// Reopen a draft captured earlier, e.g. after a page reload
    pub async fn resume(&self, draft: BookingDraft) -> Result<Arc<WizardSession>, SessionError> {
        let flow = self
            .catalog
            .get(&draft.flow)
            .ok_or_else(|| SessionError::UnknownFlow(draft.flow.clone()))?;

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&draft.id) {
            return Err(SessionError::AlreadyOpen(draft.id));
        }
        let session = Arc::new(WizardSession::resume(flow, self.handler.clone(), draft)?);
        sessions.insert(session.id(), session.clone());
        Ok(session)
    }

    pub async fn get(&self, draft_id: Uuid) -> Result<Arc<WizardSession>, SessionError> {
        self.sessions
            .read()
            .await
            .get(&draft_id)
            .cloned()
            .ok_or(SessionError::NotFound(draft_id))
    }

    /// Close and forget a session the guest abandoned
    pub async fn cancel(&self, draft_id: Uuid) -> Result<(), SessionError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&draft_id)
            .ok_or(SessionError::NotFound(draft_id))?;
        session.close().await;
        Ok(())
    }

    /// Drop a session whose booking was confirmed. Listeners are left
    /// attached so they receive the final events already queued.
    pub async fn finish(&self, draft_id: Uuid) -> bool {
        self.sessions.write().await.remove(&draft_id).is_some()
    }

    /// Close and forget every session left untouched for `max_idle`.
    /// A session with a submission outstanding is kept until it resolves.
    pub async fn expire_idle(&self, max_idle: Duration) -> Vec<Uuid> {
        let expired: Vec<Arc<WizardSession>> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .values()
                .filter(|s| !s.is_submitting() && s.idle_for() >= max_idle)
                .map(|s| s.id())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &expired {
            session.close().await;
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired idle wizard sessions");
        }
        expired.iter().map(|s| s.id()).collect()
    }

    /// Run [`expire_idle`](Self::expire_idle) every `period` until the
    /// returned task is aborted
    pub fn spawn_sweeper(self: Arc<Self>, max_idle: Duration, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let expired = self.expire_idle(max_idle).await;
                let open = self.len().await;
                debug!(expired = expired.len(), open = open, "Session sweep");
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Unknown flow: {0}")]
    UnknownFlow(String),

    #[error("Wizard session not found: {0}")]
    NotFound(Uuid),

    #[error("Draft {0} already has an open session")]
    AlreadyOpen(Uuid),

    #[error(transparent)]
    InvalidDraft(#[from] CoreError),
}
