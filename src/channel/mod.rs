//! User-facing channels.
//!
//! [`Callback`] receives every event of a kind. [`CallResult`] receives
//! the result of one asynchronous operation. Both unregister themselves
//! on drop.

pub mod call_result;
pub mod callback;

pub use call_result::CallResult;
pub use callback::Callback;
