use std::{
    cell::RefCell,
    collections::VecDeque,
    rc::{Rc, Weak},
};

use anyhow::anyhow;
use thiserror::Error;
use tracing::{event, Level};

use crate::Signal;

/// Shared single-threaded multi-sender message queue.
///
/// An instance of `Mailbox` is the receiving end. Use it to create
/// senders, and attach the signal of the actor that should wake when a
/// message arrives.
pub struct Mailbox<M> {
    inner: Rc<RefCell<MailboxInner<M>>>,
}

struct MailboxInner<M> {
    queue: VecDeque<M>,
    signal: Option<Signal>,
}

impl<M> Default for Mailbox<M> {
    fn default() -> Self {
        let inner = MailboxInner {
            queue: VecDeque::new(),
            signal: None,
        };
        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }
}

impl<M> Clone for Mailbox<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M> Mailbox<M> {
    /// Attach the signal woken when a message arrives.
    ///
    /// Only one signal can be attached at a time, setting it replaces the
    /// previous one. If messages are already queued the signal fires
    /// immediately.
    pub fn set_signal(&self, signal: Signal) {
        let mut inner = self.inner.borrow_mut();

        if !inner.queue.is_empty() {
            if let Err(error) = signal.send() {
                event!(Level::WARN, "failed to wake actor for queued messages: {}", error);
            }
        }

        inner.signal = Some(signal);
    }

    /// Get the next message, if any is available.
    pub fn recv(&self) -> Option<M> {
        self.inner.borrow_mut().queue.pop_front()
    }

    /// Create a sender for sending messages to this mailbox.
    pub fn sender(&self) -> Sender<M> {
        Sender {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

/// Sending handle of a mailbox.
///
/// Senders are weak: they never keep the receiving actor alive, and
/// sending to a dropped mailbox fails cleanly.
pub struct Sender<M> {
    inner: Weak<RefCell<MailboxInner<M>>>,
}

impl<M> Clone for Sender<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M> Sender<M> {
    /// Send a message to the mailbox of this sender.
    pub fn send(&self, message: M) -> Result<(), SendError> {
        let Some(inner) = self.inner.upgrade() else {
            return Err(anyhow!("mailbox closed").into());
        };
        let mut inner = inner.borrow_mut();

        inner.queue.push_back(message);

        match inner.signal.as_ref() {
            Some(signal) => signal.send().map_err(anyhow::Error::from)?,
            None => event!(Level::TRACE, "message queued without signal"),
        }

        Ok(())
    }

    /// Whether the receiving mailbox no longer exists.
    pub fn is_closed(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

/// Error while sending a message.
///
/// The receiving mailbox no longer exists, or its actor is gone.
#[derive(Error, Debug)]
#[error("sending message failed")]
pub struct SendError {
    #[from]
    source: anyhow::Error,
}
