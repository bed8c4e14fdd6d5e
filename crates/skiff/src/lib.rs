#![deny(missing_docs)]

//! A minimalist single-threaded actor runtime for evented services.
//!
//! Actors are inserted into a [`Runtime`], which processes them
//! cooperatively on one thread. Actors communicate through [`Mailbox`]es;
//! a mailbox wakes its actor through a [`Signal`] when a message arrives.
//! Senders are weak handles: they never keep the receiving actor alive,
//! and sending to a removed actor fails cleanly rather than resurrecting
//! it.

mod actor;
mod mailbox;
mod runtime;
mod schedule;

pub use self::{
    actor::{Actor, Meta},
    mailbox::{Mailbox, SendError, Sender},
    runtime::{Id, Runtime},
    schedule::{Signal, SignalError},
};
