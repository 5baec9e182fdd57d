//! Session lifecycle: one isolated browser context per task.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use action_primitives::{ArtifactStore, Session};
use cdp_adapter::BrowserDriver;
use taskpilot_core_types::{ContextId, SessionId, TaskId};
use tracing::{debug, info, warn};

use crate::errors::EngineError;

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

/// Opens and closes browser contexts and keeps count of both.
pub struct SessionManager {
    driver: Arc<dyn BrowserDriver>,
    artifacts_root: PathBuf,
    counters: Arc<Counters>,
}

impl SessionManager {
    pub fn new(driver: Arc<dyn BrowserDriver>, artifacts_root: impl Into<PathBuf>) -> Self {
        Self {
            driver,
            artifacts_root: artifacts_root.into(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn driver(&self) -> Arc<dyn BrowserDriver> {
        Arc::clone(&self.driver)
    }

    pub fn artifacts_root(&self) -> &Path {
        &self.artifacts_root
    }

    /// Open a fresh context for `task_id`; artifacts go to `<root>/<task_id>`.
    pub async fn acquire(&self, task_id: &TaskId) -> Result<SessionLease, EngineError> {
        let context = self
            .driver
            .open_context()
            .await
            .map_err(|err| EngineError::session(format!("cannot open browser context: {err}")))?;
        let store = ArtifactStore::new(self.artifacts_root.join(task_id.as_str()));
        let session = Session::new(task_id.clone(), context, Arc::clone(&self.driver), store);
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        info!(session = %session.id(), context = %session.context(), "Session acquired");
        Ok(SessionLease {
            session: Some(session),
            driver: Arc::clone(&self.driver),
            counters: Arc::clone(&self.counters),
        })
    }

    /// Close the lease's context. Counted as released even if closing fails.
    pub async fn release(&self, lease: SessionLease) -> Result<(), EngineError> {
        lease.release().await
    }

    pub fn acquired(&self) -> usize {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }

    /// Leases handed out and not yet released.
    pub fn active(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }
}

/// Exclusive use of one session. Dropping it without [`release`] still
/// closes the context, from a task spawned on the current runtime.
///
/// [`release`]: SessionLease::release
pub struct SessionLease {
    session: Option<Session>,
    driver: Arc<dyn BrowserDriver>,
    counters: Arc<Counters>,
}

impl SessionLease {
    pub fn id(&self) -> Option<&SessionId> {
        self.session.as_ref().map(Session::id)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    pub async fn release(mut self) -> Result<(), EngineError> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        let context = session.context().clone();
        drop(session);
        match self.driver.close_context(&context).await {
            Ok(()) => {
                info!(%context, "Session released");
                Ok(())
            }
            Err(err) => {
                warn!(%context, %err, "Closing browser context failed");
                Err(EngineError::session(format!(
                    "cannot close browser context {context}: {err}"
                )))
            }
        }
    }
}

fn close_in_background(driver: Arc<dyn BrowserDriver>, context: ContextId) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(err) = driver.close_context(&context).await {
                    warn!(%context, %err, "Closing abandoned browser context failed");
                } else {
                    debug!(%context, "Abandoned browser context closed");
                }
            });
        }
        Err(_) => warn!(%context, "No runtime to close abandoned browser context"),
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.counters.released.fetch_add(1, Ordering::SeqCst);
            warn!(session = %session.id(), "Session lease dropped without release");
            close_in_background(Arc::clone(&self.driver), session.context().clone());
        }
    }
}
