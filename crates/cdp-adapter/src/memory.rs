//! In-memory browser used by tests and dry runs.
//!
//! A [`DomFixture`] describes which selectors are present on the page, when
//! they appear, and how interactions reveal or hide other selectors. Every
//! opened context gets its own copy of the fixture, so state never leaks
//! between contexts.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use taskpilot_core_types::ContextId;

use crate::driver::{BrowserDriver, ElementHandle, Interaction};
use crate::error::{AdapterError, AdapterErrorKind};

#[derive(Clone, Debug)]
struct ElementFixture {
    present: bool,
    /// Lookups that must happen before the element shows up.
    appears_after: u32,
    count: usize,
}

#[derive(Clone, Debug, Default)]
pub struct DomFixture {
    title: String,
    elements: BTreeMap<String, ElementFixture>,
    reveals: HashMap<String, Vec<String>>,
    hides: HashMap<String, Vec<String>>,
}

impl DomFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_element(mut self, selector: impl Into<String>) -> Self {
        self.elements.insert(
            selector.into(),
            ElementFixture {
                present: true,
                appears_after: 0,
                count: 1,
            },
        );
        self
    }

    /// Element that matches several nodes at once.
    pub fn with_elements(mut self, selector: impl Into<String>, count: usize) -> Self {
        self.elements.insert(
            selector.into(),
            ElementFixture {
                present: count > 0,
                appears_after: 0,
                count,
            },
        );
        self
    }

    /// Element that is only found from the `lookups`-th lookup on (zero-based).
    pub fn with_delayed_element(mut self, selector: impl Into<String>, lookups: u32) -> Self {
        self.elements.insert(
            selector.into(),
            ElementFixture {
                present: true,
                appears_after: lookups,
                count: 1,
            },
        );
        self
    }

    /// Interacting with `trigger` makes `revealed` present.
    pub fn reveal_on<I, S>(mut self, trigger: impl Into<String>, revealed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reveals
            .entry(trigger.into())
            .or_default()
            .extend(revealed.into_iter().map(Into::into));
        self
    }

    /// Interacting with `trigger` removes `hidden` from the page.
    pub fn hide_on<I, S>(mut self, trigger: impl Into<String>, hidden: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hides
            .entry(trigger.into())
            .or_default()
            .extend(hidden.into_iter().map(Into::into));
        self
    }

    fn reveal(&mut self, selector: &str) {
        let entry = self
            .elements
            .entry(selector.to_string())
            .or_insert(ElementFixture {
                present: true,
                appears_after: 0,
                count: 1,
            });
        entry.present = true;
        entry.appears_after = 0;
        entry.count = entry.count.max(1);
    }

    fn hide(&mut self, selector: &str) {
        if let Some(entry) = self.elements.get_mut(selector) {
            entry.present = false;
        }
    }

    fn render(&self, url: Option<&str>) -> String {
        let mut html = String::from("<html><head>");
        html.push_str(&format!("<title>{}</title>", self.title));
        html.push_str("</head><body>");
        if let Some(url) = url {
            html.push_str(&format!("<!-- url: {url} -->"));
        }
        for (selector, element) in &self.elements {
            if element.present && element.appears_after == 0 {
                html.push_str(&format!("<div data-selector=\"{selector}\"></div>"));
            }
        }
        html.push_str("</body></html>");
        html
    }
}

/// Interaction observed by the memory driver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecordedInteraction {
    pub context: ContextId,
    pub selector: String,
    pub interaction: Interaction,
}

#[derive(Debug)]
struct ContextState {
    dom: DomFixture,
    url: Option<String>,
    lookups: HashMap<String, u32>,
}

#[derive(Default)]
struct Faults {
    open: VecDeque<AdapterError>,
    navigate: VecDeque<AdapterError>,
    interact: HashMap<String, VecDeque<AdapterError>>,
    lookup: HashMap<String, VecDeque<AdapterError>>,
}

#[derive(Default)]
struct State {
    contexts: HashMap<ContextId, ContextState>,
    faults: Faults,
    interactions: Vec<RecordedInteraction>,
    navigations: Vec<(ContextId, String)>,
    lookups: HashMap<String, u32>,
}

/// Deterministic [`BrowserDriver`] backed by a [`DomFixture`].
pub struct MemoryDriver {
    fixture: DomFixture,
    state: Mutex<State>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MemoryDriver {
    pub fn new(fixture: DomFixture) -> Self {
        Self {
            fixture,
            state: Mutex::new(State::default()),
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        }
    }

    /// Fail the next `times` interactions with `selector`.
    pub fn fail_interaction(&self, selector: &str, kind: AdapterErrorKind, times: usize) {
        let mut state = self.state.lock();
        let queue = state
            .faults
            .interact
            .entry(selector.to_string())
            .or_default();
        for _ in 0..times {
            queue.push_back(AdapterError::new(kind).with_hint(selector.to_string()));
        }
    }

    /// Fail the next `times` lookups of `selector`.
    pub fn fail_lookup(&self, selector: &str, kind: AdapterErrorKind, times: usize) {
        let mut state = self.state.lock();
        let queue = state.faults.lookup.entry(selector.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(AdapterError::new(kind).with_hint(selector.to_string()));
        }
    }

    pub fn fail_navigation(&self, kind: AdapterErrorKind, times: usize) {
        let mut state = self.state.lock();
        for _ in 0..times {
            state
                .faults
                .navigate
                .push_back(AdapterError::new(kind).with_hint("navigate"));
        }
    }

    pub fn fail_open(&self, kind: AdapterErrorKind) {
        self.state
            .lock()
            .faults
            .open
            .push_back(AdapterError::new(kind).with_hint("open_context"));
    }

    pub fn opened_contexts(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed_contexts(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn open_contexts(&self) -> usize {
        self.state.lock().contexts.len()
    }

    pub fn interactions(&self) -> Vec<RecordedInteraction> {
        self.state.lock().interactions.clone()
    }

    /// Interactions that hit `selector`, across all contexts.
    pub fn interactions_with(&self, selector: &str) -> Vec<RecordedInteraction> {
        self.state
            .lock()
            .interactions
            .iter()
            .filter(|record| record.selector == selector)
            .cloned()
            .collect()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state
            .lock()
            .navigations
            .iter()
            .map(|(_, url)| url.clone())
            .collect()
    }

    /// Total lookups of `selector`, across all contexts.
    pub fn lookups(&self, selector: &str) -> u32 {
        self.state.lock().lookups.get(selector).copied().unwrap_or(0)
    }

    /// Make `selector` present in an already opened context.
    pub fn reveal(&self, context: &ContextId, selector: &str) {
        if let Some(ctx) = self.state.lock().contexts.get_mut(context) {
            ctx.dom.reveal(selector);
        }
    }
}

fn closed(context: &ContextId) -> AdapterError {
    AdapterError::context_closed(context.to_string())
}

#[async_trait]
impl BrowserDriver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open_context(&self) -> Result<ContextId, AdapterError> {
        let mut state = self.state.lock();
        if let Some(err) = state.faults.open.pop_front() {
            return Err(err);
        }
        let id = ContextId::new();
        state.contexts.insert(
            id.clone(),
            ContextState {
                dom: self.fixture.clone(),
                url: None,
                lookups: HashMap::new(),
            },
        );
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn close_context(&self, context: &ContextId) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.contexts.remove(context).ok_or_else(|| closed(context))?;
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn navigate(
        &self,
        context: &ContextId,
        url: &str,
        _timeout: Duration,
    ) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if !state.contexts.contains_key(context) {
            return Err(closed(context));
        }
        if let Some(err) = state.faults.navigate.pop_front() {
            return Err(err);
        }
        state.navigations.push((context.clone(), url.to_string()));
        if let Some(ctx) = state.contexts.get_mut(context) {
            ctx.url = Some(url.to_string());
        }
        Ok(())
    }

    async fn find_candidates(
        &self,
        context: &ContextId,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, AdapterError> {
        let mut state = self.state.lock();
        let state = &mut *state;
        let ctx = state.contexts.get_mut(context).ok_or_else(|| closed(context))?;
        *state.lookups.entry(selector.to_string()).or_default() += 1;
        if let Some(err) = state
            .faults
            .lookup
            .get_mut(selector)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        let seen = ctx.lookups.entry(selector.to_string()).or_default();
        let attempt = *seen;
        *seen += 1;

        let Some(element) = ctx.dom.elements.get_mut(selector) else {
            return Ok(Vec::new());
        };
        if !element.present || attempt < element.appears_after {
            return Ok(Vec::new());
        }
        element.appears_after = 0;
        Ok((0..element.count)
            .map(|index| ElementHandle {
                id: format!("{context}:{selector}#{index}"),
                selector: selector.to_string(),
                index,
            })
            .collect())
    }

    async fn interact(
        &self,
        context: &ContextId,
        element: &ElementHandle,
        interaction: &Interaction,
    ) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        let state = &mut *state;
        let ctx = state.contexts.get_mut(context).ok_or_else(|| closed(context))?;
        let still_present = ctx
            .dom
            .elements
            .get(&element.selector)
            .map(|fixture| fixture.present && element.index < fixture.count)
            .unwrap_or(false);
        if !still_present {
            return Err(AdapterError::stale(element.selector.clone()));
        }
        if let Some(err) = state
            .faults
            .interact
            .get_mut(&element.selector)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        if let Some(revealed) = ctx.dom.reveals.get(&element.selector).cloned() {
            for selector in revealed {
                ctx.dom.reveal(&selector);
            }
        }
        if let Some(hidden) = ctx.dom.hides.get(&element.selector).cloned() {
            for selector in hidden {
                ctx.dom.hide(&selector);
            }
        }
        state.interactions.push(RecordedInteraction {
            context: context.clone(),
            selector: element.selector.clone(),
            interaction: interaction.clone(),
        });
        Ok(())
    }

    async fn current_url(&self, context: &ContextId) -> Result<Option<String>, AdapterError> {
        let state = self.state.lock();
        let ctx = state.contexts.get(context).ok_or_else(|| closed(context))?;
        Ok(ctx.url.clone())
    }

    async fn capture_screenshot(&self, context: &ContextId) -> Result<Vec<u8>, AdapterError> {
        let state = self.state.lock();
        let ctx = state.contexts.get(context).ok_or_else(|| closed(context))?;
        // PNG signature followed by the page url; enough for artifact plumbing.
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(ctx.url.as_deref().unwrap_or("about:blank").as_bytes());
        Ok(bytes)
    }

    async fn capture_dom_snapshot(&self, context: &ContextId) -> Result<String, AdapterError> {
        let state = self.state.lock();
        let ctx = state.contexts.get(context).ok_or_else(|| closed(context))?;
        Ok(ctx.dom.render(ctx.url.as_deref()))
    }
}
