use std::net::SocketAddr;

use anyhow::{Context as _, Error};
use mio::{Interest, Token};
use skiff::{Actor, Mailbox, Meta, Runtime, Sender};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{event, instrument, Level};

use crate::{
    net::{check_io, tcp},
    ReadyEvent, Registry,
};

pub enum ListenerEvent {
    Connected(ConnectedEvent),
    Closed,
}

/// A stream accepted by a listener.
pub struct ConnectedEvent {
    pub peer_addr: SocketAddr,
    pub events: Mailbox<tcp::StreamEvent>,
    pub actions: Sender<tcp::StreamAction>,
}

pub enum ListenerAction {
    /// Close the listener.
    Close,
}

pub struct ListenerInfo {
    pub local_addr: SocketAddr,
}

/// Open a TCP stream listener on the given address.
///
/// The listener accepts incoming streams and announces each one through
/// the event sender, already wired to its own stream actor.
#[instrument("tcp::bind", skip_all)]
pub fn bind(
    rt: &mut Runtime,
    registry: Registry,
    addr: SocketAddr,
    backlog: u32,
    events: Sender<ListenerEvent>,
) -> Result<(Sender<ListenerAction>, ListenerInfo), Error> {
    let (actor, info) = Service::new(registry, addr, backlog, events)?;
    let actions = actor.actions.sender();
    rt.insert("tcp-listener", actor)?;

    Ok((actions, info))
}

struct Service {
    registry: Registry,
    actions: Mailbox<ListenerAction>,
    ready: Mailbox<ReadyEvent>,
    events: Sender<ListenerEvent>,

    listener: mio::net::TcpListener,
    token: Token,
}

impl Service {
    fn new(
        registry: Registry,
        addr: SocketAddr,
        backlog: u32,
        events: Sender<ListenerEvent>,
    ) -> Result<(Self, ListenerInfo), Error> {
        event!(Level::DEBUG, ?addr, "binding");

        // Bind through socket2, mio itself exposes no backlog control
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .context("failed to create listen socket")?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(backlog as i32)?;
        socket.set_nonblocking(true)?;
        let mut listener = mio::net::TcpListener::from_std(socket.into());

        let local_addr = listener.local_addr()?;

        let ready = Mailbox::default();
        let token = registry.register(&mut listener, Interest::READABLE, ready.sender())?;

        let this = Self {
            registry,
            actions: Mailbox::default(),
            ready,
            events,

            listener,
            token,
        };
        let info = ListenerInfo { local_addr };
        Ok((this, info))
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        event!(Level::DEBUG, "closing listener");

        let _ = self.events.send(ListenerEvent::Closed);
        self.registry.deregister(&mut self.listener, self.token);
    }
}

impl Actor for Service {
    fn register(&mut self, _rt: &mut Runtime, meta: &mut Meta) -> Result<(), Error> {
        self.ready.set_signal(meta.signal());
        self.actions.set_signal(meta.signal());
        Ok(())
    }

    fn process(&mut self, rt: &mut Runtime, meta: &mut Meta) -> Result<(), Error> {
        let mut readable = false;
        while let Some(ready) = self.ready.recv() {
            readable |= ready.readable;
        }

        if readable {
            self.on_ready_readable(rt)?;
        }

        while let Some(ListenerAction::Close) = self.actions.recv() {
            event!(Level::DEBUG, "stopping listener");
            meta.set_stop();
        }

        Ok(())
    }
}

impl Service {
    fn on_ready_readable(&mut self, rt: &mut Runtime) -> Result<(), Error> {
        // Accept all pending streams
        loop {
            let accepted = match check_io(self.listener.accept()) {
                Ok(Some(accepted)) => accepted,
                Ok(None) => break,
                Err(error) => {
                    event!(Level::WARN, "accept failed: {}", error);
                    break;
                }
            };
            let (stream, peer_addr) = accepted;

            event!(Level::DEBUG, ?peer_addr, "stream accepted");

            let events = Mailbox::default();
            let actions = tcp::stream::open(rt, self.registry.clone(), stream, events.sender())?;

            let event = ConnectedEvent {
                peer_addr,
                events,
                actions,
            };
            self.events
                .send(ListenerEvent::Connected(event))
                .context("failed to announce accepted stream")?;
        }

        Ok(())
    }
}
