//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `SessionState`: How far a unit's session setup has progressed
//! - `PageCursor`: Current page and visit count of the page loop
//! - `ContentionState`: Seat-limit attempts within one page attempt
//! - `CrawlUnit`: One partition of work and its destination

mod cursor;
mod session_state;
mod unit;

// Re-export main types
pub use cursor::{ContentionState, PageCursor};
pub use session_state::SessionState;
pub use unit::CrawlUnit;
