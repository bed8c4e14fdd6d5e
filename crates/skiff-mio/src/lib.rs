//! Mio event loop runner and TCP transport actors for skiff.
//!
//! Transport actors register their sockets with a shared [`Registry`];
//! [`run_event_loop`] polls for readiness and routes wake events back to
//! them. All reads, writes and closes are asynchronous: data arrives as
//! events, writes are queued actions flushed on writability, and closure
//! is deferred until previously queued writes have flushed.

mod event_loop;
pub mod net;
mod registry;

pub use self::{
    event_loop::run_event_loop,
    registry::{ReadyEvent, Registry},
};
