//! Infinite-scroll driver for a [`FeedStore`].
//!
//! Trigger signals are level-based: a scroll handler may report "near the
//! bottom" many times in a row. Only an idle pager reacts, so at most one
//! page request is outstanding per pager. Fetches run on a worker thread
//! and come back over a channel; [`Pager::poll`] applies them on the
//! owner's thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::error::ClientError;
use crate::feed::{FeedPage, FeedScope, FeedService, FeedStore, MergeOutcome};
use crate::notice::{Notice, Notices};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching { request_id: u64 },
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Scroll position report, in the same unit for both values.
    Scroll {
        viewport_bottom: u64,
        content_height: u64,
    },
    LastItemVisible,
    Explicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    BelowThreshold,
    InFlight,
    Exhausted,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started { request_id: u64, page: u64 },
    Ignored(Ignored),
}

/// What applying one worker response did to the pager.
#[derive(Debug, PartialEq)]
pub enum Applied {
    Merged(MergeOutcome),
    Failed(String),
    Stale,
}

struct PageEvent {
    generation: u64,
    request_id: u64,
    page: u64,
    result: Result<FeedPage, ClientError>,
}

struct InFlight {
    request_id: u64,
    cancel_flag: Arc<AtomicBool>,
}

pub struct Pager {
    service: Arc<dyn FeedService>,
    store: FeedStore,
    threshold: u64,
    phase: Phase,
    active: bool,
    generation: u64,
    next_request_id: u64,
    in_flight: Option<InFlight>,
    notices: Notices,
    tx: Sender<PageEvent>,
    rx: Receiver<PageEvent>,
}

impl Pager {
    pub fn new(service: Arc<dyn FeedService>, store: FeedStore, threshold: u32) -> Self {
        let (tx, rx) = unbounded();
        let phase = if store.has_more() {
            Phase::Idle
        } else {
            Phase::Exhausted
        };
        Self {
            service,
            store,
            threshold: u64::from(threshold),
            phase,
            active: true,
            generation: 0,
            next_request_id: 1,
            in_flight: None,
            notices: Notices::default(),
            tx,
            rx,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut FeedStore {
        &mut self.store
    }

    pub fn scope(&self) -> &FeedScope {
        self.store.scope()
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self.phase, Phase::Fetching { .. })
    }

    pub fn notices_mut(&mut self) -> &mut Notices {
        &mut self.notices
    }

    pub fn trigger(&mut self, signal: Trigger) -> TriggerOutcome {
        if !self.active {
            return TriggerOutcome::Ignored(Ignored::Inactive);
        }
        if let Trigger::Scroll {
            viewport_bottom,
            content_height,
        } = signal
        {
            if viewport_bottom < content_height.saturating_sub(self.threshold) {
                return TriggerOutcome::Ignored(Ignored::BelowThreshold);
            }
        }
        match self.phase {
            Phase::Fetching { .. } => TriggerOutcome::Ignored(Ignored::InFlight),
            Phase::Exhausted => TriggerOutcome::Ignored(Ignored::Exhausted),
            Phase::Idle => self.start_fetch(),
        }
    }

    fn start_fetch(&mut self) -> TriggerOutcome {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let page = self.store.page();
        let limit = self.store.limit();
        let scope = self.store.scope().clone();
        let generation = self.generation;

        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.in_flight = Some(InFlight {
            request_id,
            cancel_flag: cancel_flag.clone(),
        });
        self.phase = Phase::Fetching { request_id };
        tracing::debug!(%scope, page, request_id, "page fetch started");

        let tx = self.tx.clone();
        let service = self.service.clone();
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service
                .fetch_page(&scope, page, limit)
                .map(|items| FeedPage {
                    scope,
                    page,
                    limit,
                    items,
                });
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(PageEvent {
                generation,
                request_id,
                page,
                result,
            });
        });

        TriggerOutcome::Started { request_id, page }
    }

    /// Applies every response that has already arrived.
    pub fn poll(&mut self) -> Vec<Applied> {
        let mut applied = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            applied.push(self.apply(event));
        }
        applied
    }

    /// Blocks until one response arrives or the timeout passes.
    pub fn wait(&mut self, timeout: Duration) -> Option<Applied> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(self.apply(event)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    fn apply(&mut self, event: PageEvent) -> Applied {
        let current = match &self.in_flight {
            Some(in_flight) => in_flight.request_id == event.request_id,
            None => false,
        };
        if !self.active || event.generation != self.generation || !current {
            tracing::debug!(request_id = event.request_id, "discarding stale page response");
            return Applied::Stale;
        }
        self.in_flight = None;

        match event.result {
            Ok(page) => {
                let outcome = self.store.merge(page);
                self.phase = if self.store.has_more() {
                    Phase::Idle
                } else {
                    Phase::Exhausted
                };
                Applied::Merged(outcome)
            }
            Err(err) => {
                tracing::warn!(page = event.page, error = %err, "page fetch failed");
                let message = format!("Failed to load {}: {err}", self.store.scope().kind.collection());
                self.notices.push(Notice::error(message.clone()));
                self.phase = Phase::Idle;
                Applied::Failed(message)
            }
        }
    }

    /// Switches to a new scope; responses for the previous scope are dropped.
    pub fn reset(&mut self, scope: FeedScope, limit: u32) {
        self.cancel_in_flight();
        self.generation = self.generation.wrapping_add(1);
        self.store = FeedStore::new(scope, limit);
        self.phase = Phase::Idle;
        self.active = true;
    }

    /// Reloads the current scope from the first page.
    pub fn refresh(&mut self) {
        let scope = self.store.scope().clone();
        let limit = self.store.limit();
        self.reset(scope, limit);
    }

    /// Marks the pager as no longer displayed; pending responses are ignored.
    pub fn deactivate(&mut self) {
        self.cancel_in_flight();
        self.generation = self.generation.wrapping_add(1);
        self.active = false;
        if self.is_fetching() {
            self.phase = Phase::Idle;
        }
    }

    fn cancel_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel_flag.store(true, Ordering::SeqCst);
        }
    }
}
