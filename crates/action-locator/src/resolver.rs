//! Element resolver with ordered selector fallback

use crate::{errors::LocatorError, types::Resolution};
use action_primitives::{ElementQuery, ExecCtx, OrderedCandidate, PollSchedule, Session};
use async_trait::async_trait;
use cdp_adapter::ElementHandle;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Proposes selectors for a role after every known candidate failed.
#[async_trait]
pub trait SelectorAdvisor: Send + Sync {
    fn name(&self) -> &str;

    /// `dom` is the page HTML; `tried` lists the selectors that matched nothing.
    async fn suggest(
        &self,
        role: &str,
        tried: &[String],
        dom: &str,
    ) -> Result<Vec<String>, LocatorError>;
}

/// Element resolver trait
#[async_trait]
pub trait ElementResolver: Send + Sync {
    /// Resolve a semantic role to a live element, waiting per candidate.
    ///
    /// A match promotes the selector in the session's bias. `capture`
    /// controls whether exhaustion writes failure artifacts.
    async fn resolve_with(
        &self,
        session: &mut Session,
        query: &ElementQuery,
        ctx: &ExecCtx,
        capture: bool,
    ) -> Result<Resolution, LocatorError>;

    async fn resolve(
        &self,
        session: &mut Session,
        query: &ElementQuery,
        ctx: &ExecCtx,
    ) -> Result<Resolution, LocatorError> {
        self.resolve_with(session, query, ctx, true).await
    }

    /// One non-waiting pass over the candidates.
    async fn probe(
        &self,
        session: &Session,
        query: &ElementQuery,
    ) -> Result<Option<Resolution>, LocatorError>;
}

/// Default element resolver implementation
#[derive(Clone)]
pub struct DefaultElementResolver {
    schedule: PollSchedule,
    capture_on_exhaustion: bool,
    advisor: Option<Arc<dyn SelectorAdvisor>>,
}

impl Default for DefaultElementResolver {
    fn default() -> Self {
        Self {
            schedule: PollSchedule::default(),
            capture_on_exhaustion: true,
            advisor: None,
        }
    }
}

impl fmt::Debug for DefaultElementResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultElementResolver")
            .field("schedule", &self.schedule)
            .field("capture_on_exhaustion", &self.capture_on_exhaustion)
            .field("advisor", &self.advisor.as_ref().map(|a| a.name()))
            .finish()
    }
}

impl DefaultElementResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture_on_exhaustion(mut self, enabled: bool) -> Self {
        self.capture_on_exhaustion = enabled;
        self
    }

    /// Ask `advisor` for more selectors once a role's own candidates are exhausted.
    pub fn with_advisor(mut self, advisor: Arc<dyn SelectorAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn has_advisor(&self) -> bool {
        self.advisor.is_some()
    }

    /// Single lookup; transient driver errors read as "not present yet".
    async fn lookup(
        session: &Session,
        selector: &str,
    ) -> Result<Option<ElementHandle>, LocatorError> {
        match session
            .driver()
            .find_candidates(session.context(), selector)
            .await
        {
            Ok(found) => Ok(found.into_iter().next()),
            Err(err) if err.is_transient() => {
                debug!(selector, %err, "transient lookup failure");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Poll one candidate until it appears or `timeout` elapses.
    async fn poll_candidate(
        &self,
        session: &Session,
        selector: &str,
        timeout: Duration,
        ctx: &ExecCtx,
    ) -> Result<Option<ElementHandle>, LocatorError> {
        let deadline = Instant::now() + timeout;
        let mut delays = self.schedule.delays();
        loop {
            ctx.check()?;
            if let Some(element) = Self::lookup(session, selector).await? {
                return Ok(Some(element));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let delay = delays
                .next()
                .unwrap_or(self.schedule.max)
                .min(deadline - now);
            tokio::select! {
                _ = sleep(delay) => {}
                _ = ctx.cancel_token.cancelled() => {
                    return Err(LocatorError::Interrupted(format!("waiting for '{selector}'")));
                }
            }
        }
    }

    fn resolution(
        query: &ElementQuery,
        candidate: OrderedCandidate,
        element: ElementHandle,
        started: Instant,
    ) -> Resolution {
        Resolution {
            role: query.role().to_string(),
            element,
            selector: candidate.selector,
            candidate_index: candidate.original_index,
            from_bias: candidate.from_bias,
            suggested: candidate.learned,
            waited_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// One extra pass over selectors proposed from the current page.
    ///
    /// Suggestions are appended to `tried`. Advisor failures and an
    /// unreadable page end the pass without an error.
    async fn consult_advisor(
        &self,
        session: &mut Session,
        query: &ElementQuery,
        ctx: &ExecCtx,
        tried: &mut Vec<String>,
        started: Instant,
    ) -> Result<Option<Resolution>, LocatorError> {
        let Some(advisor) = &self.advisor else {
            return Ok(None);
        };
        ctx.check()?;

        let dom = match session
            .driver()
            .capture_dom_snapshot(session.context())
            .await
        {
            Ok(dom) => dom,
            Err(err) if err.is_transient() => {
                debug!(role = query.role(), %err, "page unreadable, skipping advisor");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let suggested = tokio::select! {
            result = tokio::time::timeout(
                ctx.remaining_time(),
                advisor.suggest(query.role(), tried.as_slice(), &dom),
            ) => match result {
                Ok(Ok(selectors)) => selectors,
                Ok(Err(err)) => {
                    warn!(role = query.role(), advisor = advisor.name(), %err, "Selector advisor failed");
                    return Ok(None);
                }
                Err(_) => {
                    return Err(LocatorError::DeadlineExceeded(format!(
                        "asking {} about '{}'",
                        advisor.name(),
                        query.role()
                    )));
                }
            },
            _ = ctx.cancel_token.cancelled() => {
                return Err(LocatorError::Interrupted(format!(
                    "asking {} about '{}'",
                    advisor.name(),
                    query.role()
                )));
            }
        };

        let first_index = query.candidates().len() + session.bias().learned(query.role()).len();
        let fresh: Vec<String> = suggested
            .into_iter()
            .filter(|selector| !tried.contains(selector))
            .collect();
        debug!(role = query.role(), suggestions = ?fresh, "Polling suggested selectors");

        for (offset, selector) in fresh.into_iter().enumerate() {
            let budget = query.timeout().min(ctx.remaining_time());
            let found = self.poll_candidate(session, &selector, budget, ctx).await?;
            tried.push(selector.clone());

            if let Some(element) = found {
                session.bias_mut().learn(query.role(), &selector);
                let candidate = OrderedCandidate {
                    selector,
                    original_index: first_index + offset,
                    from_bias: false,
                    learned: true,
                };
                return Ok(Some(Self::resolution(query, candidate, element, started)));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ElementResolver for DefaultElementResolver {
    async fn resolve_with(
        &self,
        session: &mut Session,
        query: &ElementQuery,
        ctx: &ExecCtx,
        capture: bool,
    ) -> Result<Resolution, LocatorError> {
        let started = Instant::now();
        let ordered = session.bias().order(query);
        let mut tried = Vec::with_capacity(ordered.len());
        debug!(role = query.role(), candidates = ordered.len(), "Resolving element");

        for candidate in ordered {
            let budget = query.timeout().min(ctx.remaining_time());
            let found = self
                .poll_candidate(session, &candidate.selector, budget, ctx)
                .await?;
            tried.push(candidate.selector.clone());

            if let Some(element) = found {
                session.bias_mut().promote(query.role(), &candidate.selector);
                let resolution = Self::resolution(query, candidate, element, started);
                info!(
                    role = %resolution.role,
                    selector = %resolution.selector,
                    candidate_index = resolution.candidate_index,
                    from_bias = resolution.from_bias,
                    fallback = resolution.used_fallback(),
                    "Resolved element"
                );
                return Ok(resolution);
            }
            debug!(
                role = query.role(),
                selector = %candidate.selector,
                "candidate timed out, trying next"
            );
        }

        if let Some(resolution) = self
            .consult_advisor(session, query, ctx, &mut tried, started)
            .await?
        {
            info!(
                role = %resolution.role,
                selector = %resolution.selector,
                "Resolved element from suggested selector"
            );
            return Ok(resolution);
        }

        let artifacts = if capture && self.capture_on_exhaustion {
            session
                .capture_artifacts(&format!("{}-not-found", query.role()))
                .await
        } else {
            Default::default()
        };
        warn!(
            role = query.role(),
            tried = ?tried,
            screenshot = ?artifacts.screenshot,
            dom_snapshot = ?artifacts.dom_snapshot,
            "All candidates exhausted"
        );
        Err(LocatorError::ElementNotFound {
            role: query.role().to_string(),
            tried,
            artifacts,
        })
    }

    async fn probe(
        &self,
        session: &Session,
        query: &ElementQuery,
    ) -> Result<Option<Resolution>, LocatorError> {
        let started = Instant::now();
        for candidate in session.bias().order(query) {
            if let Some(element) = Self::lookup(session, &candidate.selector).await? {
                return Ok(Some(Self::resolution(query, candidate, element, started)));
            }
        }
        Ok(None)
    }
}
