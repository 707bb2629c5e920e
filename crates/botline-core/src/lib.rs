//! Session lifecycle core for botline.
//!
//! One stateful chat-network connection per tenant. This crate owns the
//! per-tenant state machine, the inbound aggregation buffer, the reconnection
//! policy, and the idle-session janitor. It also defines the "ports"
//! (`Transport`, `Dispatcher`, `AuthStore`) that `botline-infra` implements.
//! It depends only on `botline-types` -- never on `botline-infra` or any
//! network/filesystem crate.

pub mod buffer;
pub mod cleanup;
pub mod dispatch;
pub mod event;
pub mod reconnect;
pub mod repository;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
