//! Question sequencing and backlog analysis for Daybook.
//!
//! Both halves talk to the outside world through narrow traits: a
//! [`question::QuestionSource`] and an [`analysis::AnalysisGenerator`] for the
//! remote services, and the [`store`] traits for persistence.

pub mod analysis;
pub mod error;
pub mod locks;
pub mod question;
pub mod store;

#[cfg(test)]
mod testing;

pub use error::{Error, GenerationError, Result, SourceError};
