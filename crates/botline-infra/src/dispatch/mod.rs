//! Downstream dispatch adapters.

pub mod webhook;

pub use webhook::{BatchPayload, WebhookDispatcher, WebhookSetupError};
