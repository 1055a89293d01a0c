//! Service layer: the dispatch loop.
//!
//! [`Dispatcher`] polls a [`crate::transport::NativeTransport`] and routes
//! each event through a [`crate::domain::Registry`].

pub mod dispatcher;

pub use dispatcher::{Dispatcher, PumpOutcome};
