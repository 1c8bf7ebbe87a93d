//! Domain model (ids, job record, status state machine).

pub mod ids;
pub mod job;
pub mod state;

pub use ids::JobId;
pub use job::{IllegalTransition, Job};
pub use state::JobStatus;
