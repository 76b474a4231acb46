//! Event-window statistics around announcement dates.

pub mod study;

pub use study::{load_events, Event, EventImpact, EventStudy, EventStudyResult, EventSummary};
