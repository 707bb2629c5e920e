//! Infrastructure layer for botline.
//!
//! Contains implementations of the port traits defined in `botline-core`:
//! the file-backed credential store, the HTTP webhook dispatcher and the
//! in-process loopback transport, plus configuration loading and data
//! directory resolution.

pub mod config;
pub mod dispatch;
pub mod filesystem;
pub mod transport;
