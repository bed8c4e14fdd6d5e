use anyhow::{Context as _, Error};
use thunderdome::{Arena, Index};
use tracing::{event, span, Level};

use crate::{schedule::Schedule, Actor, Meta, Signal};

/// Identifier of an actor in a [`Runtime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Id(Index);

/// Single-threaded cooperative actor collection.
#[derive(Default)]
pub struct Runtime {
    nodes: Arena<Node>,
    schedule: Schedule,
}

struct Node {
    name: &'static str,
    actor: Option<Box<dyn Actor>>,
}

impl Runtime {
    /// Insert an actor into the runtime.
    ///
    /// The actor's `register` hook runs immediately, then the actor is
    /// scheduled once so messages queued before its mailboxes had a signal
    /// are not lost.
    pub fn insert<A>(&mut self, name: &'static str, actor: A) -> Result<Id, Error>
    where
        A: Actor,
    {
        event!(Level::DEBUG, name, "inserting actor");

        let index = self.nodes.insert(Node { name, actor: None });
        self.schedule.register(index);

        let mut meta = Meta::new(Id(index), self.schedule.signal(index));
        let mut actor: Box<dyn Actor> = Box::new(actor);
        if let Err(error) = actor.register(self, &mut meta) {
            self.remove(index);
            return Err(error.context("failed to register actor"));
        }

        let node = self
            .nodes
            .get_mut(index)
            .context("node removed during registration")?;
        node.actor = Some(actor);

        meta.signal()
            .send()
            .context("failed to schedule new actor")?;

        Ok(Id(index))
    }

    /// Get a [`Signal`] that wakes the given actor.
    pub fn signal(&self, id: Id) -> Signal {
        self.schedule.signal(id.0)
    }

    /// Whether no actors remain in the runtime.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Process scheduled actors until none are pending.
    ///
    /// An actor that fails its processing step is removed and the error
    /// logged; the failure does not propagate to the caller.
    pub fn run_until_idle(&mut self) -> Result<(), Error> {
        while let Some(index) = self.schedule.next() {
            self.process(index)?;
        }

        Ok(())
    }

    fn process(&mut self, index: Index) -> Result<(), Error> {
        // Borrow the actor out of the node while it runs
        let (name, mut actor) = {
            let Some(node) = self.nodes.get_mut(index) else {
                event!(Level::TRACE, "scheduled actor no longer exists");
                return Ok(());
            };
            let actor = node.actor.take().context("actor unavailable")?;
            (node.name, actor)
        };

        let span = span!(Level::INFO, "actor", name);
        let _entered = span.enter();
        event!(Level::TRACE, "processing actor");

        let mut meta = Meta::new(Id(index), self.schedule.signal(index));
        let result = actor.process(self, &mut meta);

        // Return the actor
        if let Some(node) = self.nodes.get_mut(index) {
            node.actor = Some(actor);
        }

        match result {
            Ok(()) => {
                if meta.stop_requested() {
                    self.remove(index);
                }
            }
            Err(error) => {
                event!(Level::ERROR, "actor failed: {:?}", error);
                self.remove(index);
            }
        }

        Ok(())
    }

    fn remove(&mut self, index: Index) {
        event!(Level::DEBUG, "removing actor");

        if let Err(error) = self.schedule.unregister(index) {
            event!(Level::ERROR, "failed to unregister actor: {:?}", error);
        }
        self.nodes.remove(index);
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let names: Vec<_> = self.nodes.iter().map(|(_, node)| node.name).collect();

        if !names.is_empty() {
            event!(
                Level::WARN,
                ?names,
                "actors not cleaned up before runtime drop",
            );
        }
    }
}
