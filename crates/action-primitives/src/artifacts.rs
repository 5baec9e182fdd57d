//! Failure artifacts (screenshot + DOM snapshot) written per session.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use cdp_adapter::BrowserDriver;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use taskpilot_core_types::ContextId;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    pub screenshot: Option<PathBuf>,
    pub dom_snapshot: Option<PathBuf>,
}

impl Artifacts {
    pub fn is_empty(&self) -> bool {
        self.screenshot.is_none() && self.dom_snapshot.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.screenshot.is_some() && self.dom_snapshot.is_some()
    }
}

/// Writes artifacts under one directory, numbering captures in order.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    seq: AtomicU32,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seq: AtomicU32::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Best-effort capture: a part that fails is left as `None`.
    pub async fn capture(
        &self,
        driver: &dyn BrowserDriver,
        context: &ContextId,
        label: &str,
    ) -> Artifacts {
        if let Err(err) = tokio::fs::create_dir_all(&self.root).await {
            warn!(dir = %self.root.display(), %err, "cannot create artifact directory");
            return Artifacts::default();
        }
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let stem = format!(
            "{seq:02}-{}-{}",
            sanitize(label),
            Utc::now().format("%Y%m%dT%H%M%S%3f")
        );

        let screenshot = match driver.capture_screenshot(context).await {
            Ok(bytes) => self.write(&format!("{stem}.png"), &bytes).await,
            Err(err) => {
                warn!(%err, "screenshot capture failed");
                None
            }
        };
        let dom_snapshot = match driver.capture_dom_snapshot(context).await {
            Ok(html) => self.write(&format!("{stem}.html"), html.as_bytes()).await,
            Err(err) => {
                warn!(%err, "dom snapshot capture failed");
                None
            }
        };

        debug!(?screenshot, ?dom_snapshot, "artifacts captured");
        Artifacts {
            screenshot,
            dom_snapshot,
        }
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> Option<PathBuf> {
        let path = self.root.join(name);
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => Some(path),
            Err(err) => {
                warn!(path = %path.display(), %err, "artifact write failed");
                None
            }
        }
    }
}

fn sanitize(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "capture".to_string()
    } else {
        trimmed.to_string()
    }
}
