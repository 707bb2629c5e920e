//! Shared domain types for botline.
//!
//! This crate contains the domain types used across the gateway:
//! tenants, sessions, inbound messages, policies, events, and the error
//! taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod session;
pub mod tenant;
