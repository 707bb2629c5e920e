//! Transport adapters.

pub mod loopback;

pub use loopback::{LoopbackHub, LoopbackTransport, LoopbackTransportFactory};
