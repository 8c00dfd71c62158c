//! Jobs discovered by the most recent search.

pub mod job;
pub mod store;

pub use job::{Job, JobBoard, UnknownBoard};
pub use store::{JobNotFound, JobSnapshot, JobStore};
