//! Pagination state machine shared by feeds and media galleries
//!
//! ```text
//! Empty ──▶ LoadingInitial ──▶ Ready ⇄ LoadingMore
//!                ▲               │
//!                └───────────────┘  (explicit reload)
//! ```
//!
//! The pager never performs I/O. Callers take a [`PageTicket`] inside a
//! critical section, fetch without holding the lock, then hand the page back
//! with [`Pager::finish`] or [`Pager::abort`].

use std::collections::HashSet;
use std::hash::Hash;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Empty,
    LoadingInitial,
    Ready,
    LoadingMore,
}

impl LoadPhase {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadPhase::LoadingInitial | LoadPhase::LoadingMore)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was applied
    Loaded { added: usize, has_more: bool },
    /// Nothing was requested: a load was in flight or the source is exhausted
    Skipped,
}

/// Items that can be deduplicated across pages
pub trait PageItem {
    type Key: Eq + Hash;

    fn page_key(&self) -> Self::Key;
}

impl PageItem for Uuid {
    type Key = Uuid;

    fn page_key(&self) -> Uuid {
        *self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TicketKind {
    Initial,
    Next,
}

/// Permission to fetch one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTicket {
    pub page_no: u32,
    pub size: u32,
    kind: TicketKind,
    previous: LoadPhase,
    generation: u64,
    first_initialization: bool,
}

#[derive(Debug)]
pub struct Pager<T> {
    page_size: u32,
    phase: LoadPhase,
    cursor: u32,
    has_more: bool,
    initialized: bool,
    generation: u64,
    items: Vec<T>,
}

impl<T: PageItem + Clone> Pager<T> {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            phase: LoadPhase::Empty,
            cursor: 0,
            has_more: true,
            initialized: false,
            generation: 0,
            items: Vec::new(),
        }
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Start a reload from page 0, unless a load is already in flight
    pub fn begin_initial(&mut self) -> Option<PageTicket> {
        if self.phase.is_loading() {
            return None;
        }
        let first_initialization = !self.initialized;
        self.initialized = true;
        Some(self.issue(TicketKind::Initial, 0, first_initialization))
    }

    /// Like [`Self::begin_initial`], but only the first time
    pub fn begin_initialization(&mut self) -> Option<PageTicket> {
        if self.initialized {
            return None;
        }
        self.begin_initial()
    }

    /// Start fetching the page at the cursor. An empty pager starts at page 0.
    pub fn begin_next(&mut self) -> Option<PageTicket> {
        if self.phase.is_loading() || !self.has_more {
            return None;
        }
        if self.phase == LoadPhase::Empty {
            return self.begin_initial();
        }
        Some(self.issue(TicketKind::Next, self.cursor, false))
    }

    fn issue(&mut self, kind: TicketKind, page_no: u32, first_initialization: bool) -> PageTicket {
        let previous = self.phase;
        self.phase = match kind {
            TicketKind::Initial => LoadPhase::LoadingInitial,
            TicketKind::Next => LoadPhase::LoadingMore,
        };
        PageTicket {
            page_no,
            size: self.page_size,
            kind,
            previous,
            generation: self.generation,
            first_initialization,
        }
    }

    /// Whether `ticket` was issued since the last reset
    pub fn is_current(&self, ticket: &PageTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Apply a fetched page. Stale tickets (issued before a reset) are ignored.
    pub fn finish(&mut self, ticket: PageTicket, page: Vec<T>) -> LoadOutcome {
        if !self.is_current(&ticket) {
            return LoadOutcome::Skipped;
        }

        let full_page = page.len() as u32 == self.page_size;
        let added = match ticket.kind {
            TicketKind::Initial => {
                self.items = page;
                self.cursor = 1;
                self.items.len()
            }
            TicketKind::Next => {
                let mut seen: HashSet<T::Key> = self.items.iter().map(PageItem::page_key).collect();
                let before = self.items.len();
                for item in page {
                    if seen.insert(item.page_key()) {
                        self.items.push(item);
                    }
                }
                self.cursor += 1;
                self.items.len() - before
            }
        };

        self.has_more = full_page;
        self.phase = LoadPhase::Ready;
        LoadOutcome::Loaded {
            added,
            has_more: self.has_more,
        }
    }

    /// Return to the phase before the ticket was issued
    pub fn abort(&mut self, ticket: PageTicket) {
        if !self.is_current(&ticket) {
            return;
        }
        self.phase = ticket.previous;
        if ticket.first_initialization {
            self.initialized = false;
        }
    }

    /// Drop everything and invalidate in-flight tickets
    pub fn reset(&mut self) {
        self.generation += 1;
        self.phase = LoadPhase::Empty;
        self.cursor = 0;
        self.has_more = true;
        self.initialized = false;
        self.items.clear();
    }
}
