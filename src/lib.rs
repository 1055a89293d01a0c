//! # callback-mux
//!
//! Callback and async-result dispatch for a native event source.
//!
//! A native library reports work through a polled event queue: broadcast
//! events tagged with a numeric kind, plus completion records for
//! asynchronous calls whose result buffers must be fetched separately.
//! This crate turns that queue into typed callbacks. A [`channel::Callback`]
//! fires for every event of its payload's kind, and a
//! [`channel::CallResult`] fires once with the result of the call it is
//! bound to.
//!
//! ## Architecture
//!
//! ```text
//! Host tick loop (bin)
//!     │
//!     ├── Dispatcher (service/)        client + optional game server
//!     │       │
//!     │       ├── NativeTransport (transport/)
//!     │       └── Registry (domain/)   broadcast table, one-shot table
//!     │
//!     └── Callback / CallResult (channel/)
//! ```
//!
//! Everything is single-threaded: registries and channels are `!Send`
//! and are driven from the thread that owns the dispatcher.

pub mod channel;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod transport;
