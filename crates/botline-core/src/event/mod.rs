//! Event bus for operational session events.
//!
//! Provides an `EventBus` that distributes `SessionEvent` messages to all
//! subscribers, plus filtered `EventStream` views per tenant or for alerts.

pub mod bus;

pub use bus::{EventBus, EventFilter, EventStream};
