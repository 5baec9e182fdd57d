use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{CreateBrowserContextParams, CreateTargetParams};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use dashmap::DashMap;
use futures::StreamExt;
use taskpilot_core_types::ContextId;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CdpConfig;
use crate::driver::{BrowserDriver, ElementHandle, Interaction};
use crate::error::{AdapterError, AdapterErrorKind};

struct ContextState {
    browser_context: BrowserContextId,
    page: Page,
    /// handle id -> (selector, element) from the most recent lookups.
    elements: DashMap<String, (String, Arc<Element>)>,
}

/// Drives a locally launched Chromium over the DevTools protocol.
///
/// Each engine context maps to one CDP browser context with a single page.
pub struct ChromiumDriver {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
    contexts: DashMap<ContextId, Arc<ContextState>>,
    command_timeout: Duration,
}

impl ChromiumDriver {
    pub async fn launch(config: &CdpConfig) -> Result<Self, AdapterError> {
        let (width, height) = config.window_size;
        let mut builder = BrowserConfig::builder().window_size(width, height);
        if !config.headless {
            builder = builder.with_head();
        }
        if config.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = config.resolve_executable() {
            builder = builder.chrome_executable(path);
        }
        if let Some(dir) = &config.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        let browser_config = builder
            .build()
            .map_err(|err| AdapterError::new(AdapterErrorKind::Launch).with_hint(err))?;

        info!(headless = config.headless, "launching chromium");
        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|err| {
            AdapterError::new(AdapterErrorKind::Launch).with_hint(err.to_string())
        })?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(?err, "cdp handler stopped");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler_task,
            contexts: DashMap::new(),
            command_timeout: Duration::from_millis(config.command_timeout_ms),
        })
    }

    pub async fn shutdown(&self) {
        let ids: Vec<ContextId> = self.contexts.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Err(err) = self.close_context(&id).await {
                warn!(context = %id, ?err, "closing context during shutdown failed");
            }
        }
        let mut browser = self.browser.lock().await;
        if let Err(err) = browser.close().await {
            warn!(?err, "closing chromium failed");
        }
        self.handler_task.abort();
    }

    fn context(&self, id: &ContextId) -> Result<Arc<ContextState>, AdapterError> {
        self.contexts
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| AdapterError::context_closed(id.to_string()))
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T, AdapterError>
    where
        F: Future<Output = Result<T, CdpError>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => result.map_err(|err| map_cdp_error(op, err)),
            Err(_) => Err(AdapterError::timeout(op.to_string())),
        }
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

fn map_cdp_error(op: &str, err: CdpError) -> AdapterError {
    if matches!(err, CdpError::Timeout) {
        return AdapterError::timeout(op.to_string());
    }
    let message = err.to_string();
    let lower = message.to_ascii_lowercase();
    let kind = if lower.contains("no node") || lower.contains("could not find node") {
        AdapterErrorKind::StaleElement
    } else if lower.contains("not visible")
        || lower.contains("not clickable")
        || lower.contains("has no box model")
        || lower.contains("could not compute box model")
    {
        AdapterErrorKind::NotInteractable
    } else if lower.contains("target closed") || lower.contains("no target") {
        AdapterErrorKind::ContextClosed
    } else {
        AdapterErrorKind::CdpIo
    };
    AdapterError::new(kind).with_hint(format!("{op}: {message}"))
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    fn name(&self) -> &'static str {
        "chromium"
    }

    async fn open_context(&self) -> Result<ContextId, AdapterError> {
        let mut browser = self.browser.lock().await;
        let browser_context = browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .map_err(|err| map_cdp_error("create_browser_context", err))?;
        let mut params = CreateTargetParams::new("about:blank");
        params.browser_context_id = Some(browser_context.clone());
        let page = browser
            .new_page(params)
            .await
            .map_err(|err| map_cdp_error("new_page", err))?;
        drop(browser);

        let id = ContextId::new();
        self.contexts.insert(
            id.clone(),
            Arc::new(ContextState {
                browser_context,
                page,
                elements: DashMap::new(),
            }),
        );
        debug!(context = %id, "browser context opened");
        Ok(id)
    }

    async fn close_context(&self, context: &ContextId) -> Result<(), AdapterError> {
        let (_, state) = self
            .contexts
            .remove(context)
            .ok_or_else(|| AdapterError::context_closed(context.to_string()))?;
        state.elements.clear();
        if let Err(err) = state.page.clone().close().await {
            debug!(context = %context, ?err, "page already gone");
        }
        let browser = self.browser.lock().await;
        browser
            .dispose_browser_context(state.browser_context.clone())
            .await
            .map_err(|err| map_cdp_error("dispose_browser_context", err))?;
        debug!(context = %context, "browser context disposed");
        Ok(())
    }

    async fn navigate(
        &self,
        context: &ContextId,
        url: &str,
        timeout: Duration,
    ) -> Result<(), AdapterError> {
        let state = self.context(context)?;
        match tokio::time::timeout(timeout, state.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(map_cdp_error("navigate", err)),
            Err(_) => Err(AdapterError::new(AdapterErrorKind::NavTimeout).with_hint(url)),
        }
    }

    async fn find_candidates(
        &self,
        context: &ContextId,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, AdapterError> {
        let state = self.context(context)?;
        let found = self
            .bounded("find_elements", state.page.find_elements(selector))
            .await?;
        state.elements.retain(|_, entry| entry.0 != selector);
        let handles = found
            .into_iter()
            .enumerate()
            .map(|(index, element)| {
                let id = Uuid::new_v4().to_string();
                state
                    .elements
                    .insert(id.clone(), (selector.to_string(), Arc::new(element)));
                ElementHandle {
                    id,
                    selector: selector.to_string(),
                    index,
                }
            })
            .collect();
        Ok(handles)
    }

    async fn interact(
        &self,
        context: &ContextId,
        element: &ElementHandle,
        interaction: &Interaction,
    ) -> Result<(), AdapterError> {
        let state = self.context(context)?;
        let target = state
            .elements
            .get(&element.id)
            .map(|entry| Arc::clone(&entry.value().1))
            .ok_or_else(|| AdapterError::stale(element.selector.clone()))?;

        self.bounded("scroll_into_view", target.scroll_into_view())
            .await?;
        match interaction {
            Interaction::Click | Interaction::Submit => {
                self.bounded(interaction.name(), target.click()).await?;
            }
            Interaction::Type { text } => {
                self.bounded("focus", target.click()).await?;
                self.bounded("type_str", target.type_str(text)).await?;
            }
        }
        Ok(())
    }

    async fn current_url(&self, context: &ContextId) -> Result<Option<String>, AdapterError> {
        let state = self.context(context)?;
        self.bounded("url", state.page.url()).await
    }

    async fn capture_screenshot(&self, context: &ContextId) -> Result<Vec<u8>, AdapterError> {
        let state = self.context(context)?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.bounded("screenshot", state.page.screenshot(params))
            .await
    }

    async fn capture_dom_snapshot(&self, context: &ContextId) -> Result<String, AdapterError> {
        let state = self.context(context)?;
        self.bounded("content", state.page.content()).await
    }
}
