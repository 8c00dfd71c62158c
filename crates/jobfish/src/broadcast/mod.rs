//! Broadcasting for real-time event streaming.

pub mod application_events;

pub use application_events::{
    ApplicationEvent, ApplicationEventBroadcaster, ApplicationEventKind,
};
