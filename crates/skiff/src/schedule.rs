use std::{
    cell::RefCell,
    collections::VecDeque,
    rc::{Rc, Weak},
};

use anyhow::{anyhow, Context as _};
use thiserror::Error;
use thunderdome::{Arena, Index};
use tracing::{event, Level};

#[derive(Default)]
pub(crate) struct Schedule {
    shared: Rc<RefCell<ScheduleShared>>,
}

#[derive(Default)]
struct ScheduleShared {
    pending: Arena<bool>,
    queue: VecDeque<Index>,
}

impl Schedule {
    pub(crate) fn register(&self, index: Index) {
        let mut shared = self.shared.borrow_mut();
        shared.pending.insert_at(index, false);
    }

    pub(crate) fn unregister(&self, index: Index) -> Result<(), anyhow::Error> {
        let mut shared = self.shared.borrow_mut();

        let pending = shared
            .pending
            .remove(index)
            .context("actor not registered")?;
        if pending {
            shared.queue.retain(|value| *value != index);
        }

        Ok(())
    }

    pub(crate) fn signal(&self, index: Index) -> Signal {
        Signal {
            shared: Rc::downgrade(&self.shared),
            index,
        }
    }

    /// Get the next scheduled actor, clearing its pending state.
    pub(crate) fn next(&self) -> Option<Index> {
        let mut shared = self.shared.borrow_mut();

        let index = shared.queue.pop_front()?;
        if let Some(pending) = shared.pending.get_mut(index) {
            *pending = false;
        }

        Some(index)
    }
}

/// Wake handle that schedules an actor for processing.
///
/// Signals are weak: they do not keep the runtime or the actor alive, and
/// sending to a removed actor fails without side effects.
#[derive(Clone)]
pub struct Signal {
    shared: Weak<RefCell<ScheduleShared>>,
    index: Index,
}

impl Signal {
    /// Schedule the actor this signal points at.
    pub fn send(&self) -> Result<(), SignalError> {
        let shared = self.shared.upgrade().context("runtime no longer exists")?;
        let mut shared = shared.borrow_mut();

        let Some(pending) = shared.pending.get_mut(self.index) else {
            return Err(anyhow!("actor no longer exists").into());
        };

        // Don't double-schedule
        if *pending {
            event!(Level::TRACE, "actor already scheduled");
            return Ok(());
        }

        *pending = true;
        shared.queue.push_back(self.index);

        Ok(())
    }
}

/// Error while sending a signal.
#[derive(Error, Debug)]
#[error("sending signal failed")]
pub struct SignalError {
    #[from]
    source: anyhow::Error,
}
