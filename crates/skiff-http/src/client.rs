use std::net::{SocketAddr, ToSocketAddrs};

use anyhow::{anyhow, Context as _, Error};
use bytes::Bytes;
use skiff::{Actor, Mailbox, Meta, Runtime, Sender};
use skiff_mio::{net::tcp, Registry};
use tracing::{event, Level};

use crate::parser::{ResponseHead, ResponseParser};

/// A complete response to a one-shot client fetch.
pub struct ClientResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Outcome of a [`get`] fetch.
pub enum FetchEvent {
    Response(ClientResponse),
    Failed,
}

/// Issue a one-shot `GET /` to a host and port.
///
/// Resolves the host, connects, writes the request, and delivers the
/// parsed response (or `Failed`) through `events` before closing the
/// stream. One request, one response, no pipelining.
pub fn get(
    rt: &mut Runtime,
    registry: Registry,
    host: &str,
    port: u16,
    events: Sender<FetchEvent>,
) -> Result<(), Error> {
    let addr = resolve(host, port)?;

    let actor = Service::new(rt, registry, addr, host, events)?;
    rt.insert("http-fetch", actor)?;

    Ok(())
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, Error> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve \"{}\"", host))?
        .next()
        .ok_or_else(|| anyhow!("no addresses for \"{}\"", host))
}

struct Service {
    tcp_events: Mailbox<tcp::StreamEvent>,
    tcp_actions: Sender<tcp::StreamAction>,
    events: Sender<FetchEvent>,

    parser: ResponseParser,
    delivered: bool,
}

impl Service {
    fn new(
        rt: &mut Runtime,
        registry: Registry,
        addr: SocketAddr,
        host: &str,
        events: Sender<FetchEvent>,
    ) -> Result<Self, Error> {
        event!(Level::DEBUG, ?addr, host, "fetching");

        let tcp_events = Mailbox::default();
        let tcp_actions = tcp::connect(rt, registry, addr, tcp_events.sender())?;

        // The request goes out as soon as the stream connects
        let request = format!("GET / HTTP/1.0\r\nHost: {}\r\n\r\n", host);
        let action = tcp::SendAction {
            data: request.into(),
        };
        tcp_actions.send(tcp::StreamAction::Send(action))?;

        let this = Self {
            tcp_events,
            tcp_actions,
            events,

            parser: ResponseParser::default(),
            delivered: false,
        };
        Ok(this)
    }
}

impl Actor for Service {
    fn register(&mut self, _rt: &mut Runtime, meta: &mut Meta) -> Result<(), Error> {
        self.tcp_events.set_signal(meta.signal());
        Ok(())
    }

    fn process(&mut self, _rt: &mut Runtime, meta: &mut Meta) -> Result<(), Error> {
        while let Some(event) = self.tcp_events.recv() {
            match event {
                tcp::StreamEvent::Recv(event) => self.on_recv(&event.data, meta),
                tcp::StreamEvent::Closed => {
                    // Servers that omit a content length end the body at
                    // end of input
                    match self.parser.finish() {
                        Some((head, body)) => {
                            self.deliver(FetchEvent::Response(into_response(head, body)));
                        }
                        None => self.deliver(FetchEvent::Failed),
                    }
                    meta.set_stop();
                }
            }
        }

        Ok(())
    }
}

impl Service {
    fn on_recv(&mut self, data: &[u8], meta: &mut Meta) {
        self.parser.consume(data);

        match self.parser.poll_response() {
            Ok(Some((head, body))) => {
                self.deliver(FetchEvent::Response(into_response(head, body)));
                let _ = self.tcp_actions.send(tcp::StreamAction::Close);
                meta.set_stop();
            }
            Ok(None) => {}
            Err(error) => {
                event!(Level::ERROR, "failed to parse response: {}", error);
                self.deliver(FetchEvent::Failed);
                let _ = self.tcp_actions.send(tcp::StreamAction::Close);
                meta.set_stop();
            }
        }
    }

    fn deliver(&mut self, event: FetchEvent) {
        if self.delivered {
            return;
        }
        self.delivered = true;

        if self.events.send(event).is_err() {
            event!(Level::WARN, "fetch caller went away before the response");
        }
    }
}

fn into_response(head: ResponseHead, body: Bytes) -> ClientResponse {
    ClientResponse {
        status: head.status,
        reason: head.reason,
        headers: head.headers,
        body,
    }
}
