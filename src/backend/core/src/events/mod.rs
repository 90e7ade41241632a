//! Lifecycle Events and Listeners
//!
//! This module provides the event side of Taskhive:
//!
//! - **`event`**: Event kinds, fired events and their payloads.
//! - **`registry`**: The `ListenerRegistry`, mapping event names to named
//!   listeners with fire statistics.
//! - **`system`**: The locked `workers.logging` and `workers.metrics` listeners.

pub mod event;
pub mod registry;
pub mod system;

pub use event::{Event, EventId, EventKind};
pub use registry::{Listener, ListenerHandler, ListenerId, ListenerRegistry};
pub use system::{register_system_listeners, LOGGING_LISTENER, METRICS_LISTENER};
