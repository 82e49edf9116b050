//! Poll cycle state machine.
//!
//! `Idle -> Polling -> Applying -> Idle`, repeated on a timer, plus a terminal
//! `Stopped`. The engine owns the registry, the store and the view; nothing
//! else mutates them.

pub mod failure;
pub mod transport;

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use crate::config::Config;
use crate::logging::{
    log_cycle, log_decode_warning, log_late_variable, log_new_best, log_poll, log_schema_change,
    log_unknown_series, ProfileScope,
};
use crate::registry::VariableRegistry;
use crate::store::{bind_best, PointStore};
use crate::view::chart::selection_at;
use crate::view::{format_server_time, HeaderField, RenderSurface, ViewReconciler};
use crate::wire::{decode, DecodeWarning, Token};

pub use failure::{FailureHandler, FailureTracker};
pub use transport::{HttpTransport, PollError, Transport};

pub const DATA_PATH: &str = "session-data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Polling,
    Applying,
    Stopped,
}

/// Selectable refresh periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshInterval {
    Ms1000,
    Ms2000,
    #[default]
    Ms5000,
    Ms10000,
    Ms30000,
    Ms60000,
}

impl RefreshInterval {
    pub const ALL: [RefreshInterval; 6] = [
        RefreshInterval::Ms1000,
        RefreshInterval::Ms2000,
        RefreshInterval::Ms5000,
        RefreshInterval::Ms10000,
        RefreshInterval::Ms30000,
        RefreshInterval::Ms60000,
    ];

    pub fn millis(self) -> u64 {
        match self {
            RefreshInterval::Ms1000 => 1_000,
            RefreshInterval::Ms2000 => 2_000,
            RefreshInterval::Ms5000 => 5_000,
            RefreshInterval::Ms10000 => 10_000,
            RefreshInterval::Ms30000 => 30_000,
            RefreshInterval::Ms60000 => 60_000,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::from_millis(self.millis())
    }

    /// Closest selectable period; ties go to the faster one.
    pub fn nearest(ms: u64) -> Self {
        Self::ALL
            .into_iter()
            .min_by_key(|i| i.millis().abs_diff(ms))
            .unwrap_or_default()
    }
}

/// Changes the refresh period of a running engine from elsewhere.
#[derive(Debug, Clone)]
pub struct IntervalHandle {
    tx: Arc<watch::Sender<RefreshInterval>>,
}

impl IntervalHandle {
    /// Replace the pending wait with one of the new length.
    pub fn set(&self, interval: RefreshInterval) {
        let _ = self.tx.send(interval);
    }

    pub fn get(&self) -> RefreshInterval {
        *self.tx.borrow()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub appended: usize,
    pub skipped_duplicates: usize,
    pub schema_changed: bool,
    pub best_changed: bool,
    pub rendered: bool,
    pub warnings: Vec<DecodeWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Applied(CycleReport),
    Failed(PollError),
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionHeader {
    pub server_time: Option<i64>,
    pub app_name: Option<String>,
}

pub struct SyncEngine {
    session: String,
    state: EngineState,
    registry: VariableRegistry,
    store: PointStore,
    view: ViewReconciler,
    // Selector position requested at startup, resolved once variables are known.
    pending_series: Option<usize>,
    header: SessionHeader,
    seen: HashSet<String>,
    dedup: bool,
    handler: Box<dyn FailureHandler>,
    interval_tx: Arc<watch::Sender<RefreshInterval>>,
    interval_rx: watch::Receiver<RefreshInterval>,
    cycles: u64,
}

impl SyncEngine {
    pub fn new(session: &str, config: &Config) -> Self {
        let (tx, rx) = watch::channel(config.refresh);
        Self {
            session: session.to_string(),
            state: EngineState::Idle,
            registry: VariableRegistry::new(),
            store: PointStore::new(),
            view: ViewReconciler::new(config.table_rows),
            pending_series: (config.series != 0).then_some(config.series),
            header: SessionHeader::default(),
            seen: HashSet::new(),
            dedup: true,
            handler: Box::new(FailureTracker::new(config.failure_warn_after)),
            interval_tx: Arc::new(tx),
            interval_rx: rx,
            cycles: 0,
        }
    }

    pub fn with_failure_handler(mut self, handler: Box<dyn FailureHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Drop records identical to ones already stored (on by default).
    pub fn with_dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    pub fn store(&self) -> &PointStore {
        &self.store
    }

    pub fn view(&self) -> &ViewReconciler {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ViewReconciler {
        &mut self.view
    }

    pub fn header(&self) -> &SessionHeader {
        &self.header
    }

    pub fn failure_status(&self) -> Option<String> {
        self.handler.status()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn interval(&self) -> RefreshInterval {
        *self.interval_rx.borrow()
    }

    pub fn interval_handle(&self) -> IntervalHandle {
        IntervalHandle {
            tx: self.interval_tx.clone(),
        }
    }

    pub fn set_interval(&self, interval: RefreshInterval) {
        let _ = self.interval_tx.send(interval);
    }

    /// Enter the terminal state. Later cycles do nothing.
    pub fn stop(&mut self) {
        self.state = EngineState::Stopped;
    }

    /// Query for the data endpoint: session name and the number of records held,
    /// so the server can send only what is new.
    pub fn poll_query(&self) -> String {
        format!("{}&{}", self.session, self.store.count())
    }

    /// One full poll cycle.
    pub async fn poll_once<T, S>(&mut self, transport: &T, surface: &mut S) -> CycleOutcome
    where
        T: Transport + ?Sized,
        S: RenderSurface + ?Sized,
    {
        if self.state == EngineState::Stopped {
            return CycleOutcome::Stopped;
        }

        self.state = EngineState::Polling;
        self.cycles += 1;
        let query = self.poll_query();
        log_poll(&self.session, self.store.count(), &format!("{}?{}", DATA_PATH, query));

        match transport.get(DATA_PATH, Some(&query)).await {
            Ok(body) => {
                self.state = EngineState::Applying;
                let report = self.apply_response(&body, surface);
                self.handler.on_success();
                self.view.set_header(HeaderField::Status, "", surface);
                self.state = EngineState::Idle;
                CycleOutcome::Applied(report)
            }
            Err(err) => {
                self.handler.on_failure(&self.session, &err);
                let status = self.handler.status().unwrap_or_else(|| err.to_string());
                self.view.set_header(HeaderField::Status, &status, surface);
                self.state = EngineState::Idle;
                CycleOutcome::Failed(err)
            }
        }
    }

    /// Decode a response body and merge it into registry, store and view.
    pub fn apply_response<S: RenderSurface + ?Sized>(&mut self, text: &str, surface: &mut S) -> CycleReport {
        let _scope = ProfileScope::with_context("apply_response", &[("bytes", json!(text.len()))]);
        let decoded = decode(text);
        let generation = self.registry.generation();
        let mut report = CycleReport::default();
        let mut best_seen = false;

        for warning in &decoded.warnings {
            log_decode_warning(&self.session, &warning.to_string());
            self.handler.on_warning(warning);
        }

        for token in decoded.tokens {
            match token {
                Token::ServerTime(ms) => {
                    self.header.server_time = Some(ms);
                    self.view
                        .set_header(HeaderField::ServerTime, &format_server_time(ms), surface);
                }
                Token::AppName(name) => {
                    self.view.set_header(HeaderField::AppName, &name, surface);
                    self.header.app_name = Some(name);
                }
                Token::VarList(csv) => {
                    if self.registry.observe(&csv).is_changed() {
                        log_schema_change(self.registry.generation(), &self.registry.names());
                    }
                }
                Token::Record(raw) => {
                    if self.dedup && !self.seen.insert(raw.dedup_key()) {
                        report.skipped_duplicates += 1;
                        continue;
                    }
                    let outcome = self.store.append(raw, &mut self.registry);
                    for (name, index) in &outcome.late_variables {
                        log_late_variable(name, *index);
                    }
                    report.appended += 1;
                }
                Token::Best(raw) => {
                    best_seen = true;
                    let stamp = self.header.server_time.unwrap_or(0);
                    let best = raw.map(|b| bind_best(b, &mut self.registry, stamp));
                    if self.store.set_best(best) {
                        report.best_changed = true;
                        if let Some(best) = self.store.best() {
                            log_new_best(&self.session, &best.id, best.performance);
                        }
                    }
                }
            }
        }

        report.schema_changed = self.registry.generation() != generation;
        if report.schema_changed {
            self.resolve_pending_series();
        }
        if report.schema_changed || report.appended > 0 || report.best_changed {
            self.view.reconcile(&self.registry, &self.store, surface);
            report.rendered = true;
        } else if best_seen {
            self.view.refresh_best(&self.registry, &self.store, surface);
        }

        log_cycle(
            &self.session,
            report.appended,
            report.skipped_duplicates,
            self.store.count(),
            report.rendered,
        );
        report.warnings = decoded.warnings;
        report
    }

    fn resolve_pending_series(&mut self) {
        let Some(position) = self.pending_series.take() else {
            return;
        };
        match selection_at(&self.registry, position) {
            Some(selection) => self.view.select(selection),
            None => log_unknown_series(position, self.registry.len() + 2),
        }
    }

    /// Render everything now, e.g. after the user changed rows or series.
    pub fn render<S: RenderSurface + ?Sized>(&mut self, surface: &mut S) {
        self.view.reconcile(&self.registry, &self.store, surface);
    }

    /// Poll until stopped. After every cycle `after_cycle` sees the outcome and
    /// the surface; then the engine waits for the selected interval. An interval
    /// change restarts the wait with the new length. `shutdown` flipping to
    /// `true` (or its sender going away) stops the engine.
    pub async fn run<T, S, F>(
        &mut self,
        transport: &T,
        surface: &mut S,
        mut shutdown: watch::Receiver<bool>,
        mut after_cycle: F,
    ) where
        T: Transport + ?Sized,
        S: RenderSurface + ?Sized,
        F: FnMut(&CycleOutcome, &mut S),
    {
        while self.state != EngineState::Stopped {
            if *shutdown.borrow() {
                self.stop();
                break;
            }

            let outcome = self.poll_once(transport, surface).await;
            after_cycle(&outcome, surface);

            let mut wait = self.interval().duration();
            loop {
                let mut retimed = false;
                let mut stop = false;
                tokio::select! {
                    _ = sleep(wait) => {}
                    changed = self.interval_rx.changed() => match changed {
                        Ok(()) => retimed = true,
                        Err(_) => {}
                    },
                    changed = shutdown.changed() => {
                        stop = changed.is_err() || *shutdown.borrow();
                        retimed = !stop;
                    }
                }

                if stop {
                    self.stop();
                    break;
                }
                if !retimed {
                    break;
                }
                wait = self.interval().duration();
            }
        }
    }
}
