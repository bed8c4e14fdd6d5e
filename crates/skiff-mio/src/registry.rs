use std::{cell::RefCell, collections::HashMap, rc::Rc};

use anyhow::Error;
use mio::{event::Source, Events, Interest, Poll, Token};
use skiff::Sender;
use tracing::{event, Level};

/// Shared mio poll registry.
///
/// Transport actors register their sources here together with a sender for
/// readiness events; the event loop routes each wake to the registered
/// sender.
#[derive(Clone)]
pub struct Registry {
    inner: Rc<RefCell<RegistryInner>>,
}

struct RegistryInner {
    poll: Poll,
    next_token: usize,
    ready_senders: HashMap<Token, Sender<ReadyEvent>>,
}

/// Readiness of a registered source.
pub struct ReadyEvent {
    pub readable: bool,
    pub writable: bool,
}

impl Registry {
    pub fn new() -> Result<Self, Error> {
        let inner = RegistryInner {
            poll: Poll::new()?,
            next_token: 0,
            ready_senders: HashMap::new(),
        };
        Ok(Self {
            inner: Rc::new(RefCell::new(inner)),
        })
    }

    /// Register a source, routing its readiness to the given sender.
    pub fn register<S>(
        &self,
        source: &mut S,
        interest: Interest,
        ready: Sender<ReadyEvent>,
    ) -> Result<Token, Error>
    where
        S: Source,
    {
        let mut inner = self.inner.borrow_mut();

        let token = Token(inner.next_token);
        inner.next_token += 1;

        inner.ready_senders.insert(token, ready);
        inner.poll.registry().register(source, token, interest)?;

        Ok(token)
    }

    /// Change the interest of a registered source.
    pub fn reregister<S>(&self, source: &mut S, token: Token, interest: Interest) -> Result<(), Error>
    where
        S: Source,
    {
        let inner = self.inner.borrow();
        inner.poll.registry().reregister(source, token, interest)?;
        Ok(())
    }

    /// Remove a source and its readiness routing.
    pub fn deregister<S>(&self, source: &mut S, token: Token)
    where
        S: Source,
    {
        let mut inner = self.inner.borrow_mut();

        inner.ready_senders.remove(&token);
        if let Err(error) = inner.poll.registry().deregister(source) {
            event!(Level::ERROR, "failed to deregister source: {}", error);
        }
    }

    pub(crate) fn poll(&self, events: &mut Events) -> Result<(), Error> {
        self.inner.borrow_mut().poll.poll(events, None)?;
        Ok(())
    }

    pub(crate) fn wake(&self, token: Token, readable: bool, writable: bool) {
        let inner = self.inner.borrow();

        let Some(sender) = inner.ready_senders.get(&token) else {
            event!(Level::TRACE, "readiness for stale token");
            return;
        };

        if let Err(error) = sender.send(ReadyEvent { readable, writable }) {
            event!(Level::WARN, "failed to deliver readiness: {}", error);
        }
    }
}
