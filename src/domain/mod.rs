//! Domain layer: identities, payload shapes, and the subscription registry.
//!
//! This module contains the kind-tag resolver, operation handles, the
//! generation-checked arena backing the registry, the registry itself,
//! the completion record, and per-dispatcher counters.

pub mod arena;
pub mod call_completed;
pub mod handle;
pub mod kind;
pub mod registry;
pub mod session_id;
pub mod stats;

pub use arena::SlotKey;
pub use call_completed::{CALL_COMPLETED_KIND, CallCompleted};
pub use handle::OperationHandle;
pub use kind::{KindTag, Payload, Shape, decode_payload, kind_tag_of};
pub use registry::{BroadcastSubscriber, OneShotSubscriber, Registry};
pub use session_id::SessionId;
pub use stats::DispatchStats;
