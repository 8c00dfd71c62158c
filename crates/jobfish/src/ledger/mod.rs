//! The application ledger: every apply attempt and its lifecycle.

pub mod application;
pub mod error;
pub mod store;

pub use application::{
    Application, ApplicationStatus, ApplicationUpdate, FailureKind, FailureReason,
};
pub use error::LedgerError;
pub use store::ApplicationLedger;
