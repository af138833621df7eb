//! examkit-core: Timed assessment session engine.
//!
//! This crate defines the assessment data model, the Exam Gateway and Clock
//! Source seams, and the logic that runs one timed attempt: answer tracking,
//! the session state machine, and exactly-once submission.

pub mod answers;
pub mod clock;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod model;
pub mod session;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use engine::{EngineConfig, ExamEngine, SessionHandle};
pub use error::{AnswerError, AssessmentError, EngineError, GatewayError, GatewayErrorKind, SubmitError};
pub use session::{Session, SessionSnapshot, SessionState};
