use std::{net::SocketAddr, rc::Rc};

use anyhow::Error;
use skiff::{Actor, Mailbox, Meta, Runtime, Sender};
use skiff_mio::{net::tcp, Registry};
use tracing::{event, Level};

use crate::{connection, router::Router};

/// Details of a bound HTTP server.
pub struct ServerInfo {
    pub local_addr: SocketAddr,
}

/// Bind an HTTP server and start accepting connections.
///
/// The router must be fully configured up front; it is shared read-only
/// by every connection from here on.
pub fn listen(
    rt: &mut Runtime,
    registry: Registry,
    addr: SocketAddr,
    backlog: u32,
    router: Router,
) -> Result<ServerInfo, Error> {
    let actor = Service::new(rt, registry, addr, backlog, router)?;
    let local_addr = actor.local_addr;
    rt.insert("http-server", actor)?;

    Ok(ServerInfo { local_addr })
}

struct Service {
    tcp_events: Mailbox<tcp::ListenerEvent>,
    tcp_actions: Sender<tcp::ListenerAction>,
    router: Rc<Router>,
    local_addr: SocketAddr,

    connections: Vec<ConnectionEntry>,
}

struct ConnectionEntry {
    events: Mailbox<connection::ConnectionEvent>,
    actions: Sender<connection::ConnectionAction>,
    closed: bool,
}

impl Service {
    fn new(
        rt: &mut Runtime,
        registry: Registry,
        addr: SocketAddr,
        backlog: u32,
        router: Router,
    ) -> Result<Self, Error> {
        let tcp_events = Mailbox::default();
        let (tcp_actions, info) = tcp::bind(rt, registry, addr, backlog, tcp_events.sender())?;

        event!(Level::INFO, addr = ?info.local_addr, "listening");

        let actor = Service {
            tcp_events,
            tcp_actions,
            router: Rc::new(router),
            local_addr: info.local_addr,

            connections: Vec::new(),
        };
        Ok(actor)
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        event!(Level::DEBUG, "closing server");

        let _ = self.tcp_actions.send(tcp::ListenerAction::Close);

        // Close all not yet closed connections
        for entry in &self.connections {
            if entry.closed {
                continue;
            }

            let _ = entry.actions.send(connection::ConnectionAction::Close);
        }
    }
}

impl Actor for Service {
    fn register(&mut self, _rt: &mut Runtime, meta: &mut Meta) -> Result<(), Error> {
        self.tcp_events.set_signal(meta.signal());
        Ok(())
    }

    fn process(&mut self, rt: &mut Runtime, meta: &mut Meta) -> Result<(), Error> {
        // Handle incoming transport connections
        while let Some(event) = self.tcp_events.recv() {
            match event {
                tcp::ListenerEvent::Connected(event) => self.on_connected(rt, meta, event)?,
                tcp::ListenerEvent::Closed => meta.set_stop(),
            }
        }

        // Reap connections that have reported closure
        for entry in &mut self.connections {
            while let Some(event) = entry.events.recv() {
                match event {
                    connection::ConnectionEvent::Closed => entry.closed = true,
                }
            }
        }
        self.connections.retain(|entry| !entry.closed);

        Ok(())
    }
}

impl Service {
    fn on_connected(
        &mut self,
        rt: &mut Runtime,
        meta: &mut Meta,
        event: tcp::ConnectedEvent,
    ) -> Result<(), Error> {
        event!(Level::DEBUG, peer_addr = ?event.peer_addr, "connection accepted");

        let events = Mailbox::default();
        events.set_signal(meta.signal());

        let actions = connection::open(
            rt,
            event.events,
            event.actions,
            events.sender(),
            self.router.clone(),
        )?;

        let entry = ConnectionEntry {
            events,
            actions,
            closed: false,
        };
        self.connections.push(entry);

        Ok(())
    }
}
