use anyhow::Error;

use crate::{Id, Runtime, Signal};

/// Actor identity and implementation trait.
pub trait Actor: 'static {
    /// Called when the actor is inserted into a [`Runtime`].
    ///
    /// This is where mailboxes get their wake signal.
    #[allow(unused_variables)]
    fn register(&mut self, rt: &mut Runtime, meta: &mut Meta) -> Result<(), Error> {
        Ok(())
    }

    /// Perform a processing step.
    ///
    /// Returning `Err` is fatal for this actor only: the error is logged
    /// and the actor is removed from the runtime, the runtime itself keeps
    /// going. Prefer this over panicking.
    fn process(&mut self, rt: &mut Runtime, meta: &mut Meta) -> Result<(), Error>;
}

/// Metadata of an [`Actor`] inserted in a [`Runtime`].
pub struct Meta {
    id: Id,
    signal: Signal,
    stop: bool,
}

impl Meta {
    pub(crate) fn new(id: Id, signal: Signal) -> Self {
        Self {
            id,
            signal,
            stop: false,
        }
    }

    /// Identifier of this actor.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get a [`Signal`] that wakes this actor.
    pub fn signal(&self) -> Signal {
        self.signal.clone()
    }

    /// At the end of this processing step, remove the actor.
    pub fn set_stop(&mut self) {
        self.stop = true;
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop
    }
}
