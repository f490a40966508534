use std::time::Duration;

/// Position of the page loop within one unit's results
///
/// Owned by the page iterator and only moved once a page is confirmed
/// processed or confirmed absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    current_page: u32,
    visited_count: u32,
}

impl PageCursor {
    /// Creates a cursor at the given page (clamped to 1) with nothing visited
    pub fn new(start_page: u32) -> Self {
        Self {
            current_page: start_page.max(1),
            visited_count: 0,
        }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn visited_count(&self) -> u32 {
        self.visited_count
    }

    /// Returns true once `visited_count` has reached `max_visits`
    pub fn at_cap(&self, max_visits: u32) -> bool {
        self.visited_count >= max_visits
    }

    pub(crate) fn record_visit(&mut self) {
        self.visited_count += 1;
    }

    /// Moves to a later page; pages never go backwards
    pub(crate) fn advance_to(&mut self, page: u32) {
        debug_assert!(page > self.current_page);
        self.current_page = self.current_page.max(page);
    }
}

/// Seat-limit bookkeeping for a single page-processing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentionState {
    pub attempt: u32,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl ContentionState {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            backoff,
        }
    }

    /// Starts the next check; returns false once every attempt is used
    pub fn begin_attempt(&mut self) -> bool {
        if self.exhausted() {
            return false;
        }
        self.attempt += 1;
        true
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
