//! Server-side HTTP connection actor.
//!
//! One actor per accepted transport stream. The actor owns the wire
//! parser, the FIFO queue of parsed-but-undispatched requests, and the
//! single in-service slot. Responses feed writes and completion back
//! through a command mailbox, so completion always advances the pipeline
//! as a scheduled work item; a burst of instantly completing pipelined
//! requests drains iteratively, never by recursing.

use std::{collections::VecDeque, rc::Rc};

use anyhow::Error;
use bytes::Bytes;
use skiff::{Actor, Mailbox, Meta, Runtime, Sender};
use skiff_mio::net::tcp;
use tracing::{event, Level};

use crate::{parser::RequestParser, request::Request, response::Response, router::Router};

/// Event a connection reports to its owner.
pub enum ConnectionEvent {
    Closed,
}

/// Action the owner can apply to a connection.
pub enum ConnectionAction {
    Close,
}

/// Command a response feeds back into its connection.
pub enum ResponseCommand {
    /// Serialize bytes onto the transport, optionally closing afterwards.
    Write {
        data: Bytes,
        close_after_write: bool,
    },
    /// The in-service request's response is fully composed.
    Completed,
}

/// Attach an HTTP connection to an accepted transport stream.
pub fn open(
    rt: &mut Runtime,
    tcp_events: Mailbox<tcp::StreamEvent>,
    tcp_actions: Sender<tcp::StreamAction>,
    events: Sender<ConnectionEvent>,
    router: Rc<Router>,
) -> Result<Sender<ConnectionAction>, Error> {
    let actor = Service::new(tcp_events, tcp_actions, events, router);
    let actions = actor.actions.sender();
    rt.insert("http-connection", actor)?;

    Ok(actions)
}

struct Service {
    actions: Mailbox<ConnectionAction>,
    events: Sender<ConnectionEvent>,
    tcp_events: Mailbox<tcp::StreamEvent>,
    /// Write path of the transport; `None` the instant closure starts,
    /// after which nothing may touch the wire.
    tcp_actions: Option<Sender<tcp::StreamAction>>,
    commands: Mailbox<ResponseCommand>,
    router: Rc<Router>,

    parser: RequestParser,
    in_service: Option<Request>,
    pending: VecDeque<Request>,
}

impl Service {
    fn new(
        tcp_events: Mailbox<tcp::StreamEvent>,
        tcp_actions: Sender<tcp::StreamAction>,
        events: Sender<ConnectionEvent>,
        router: Rc<Router>,
    ) -> Self {
        event!(Level::DEBUG, "connection opened");

        Self {
            actions: Mailbox::default(),
            events,
            tcp_events,
            tcp_actions: Some(tcp_actions),
            commands: Mailbox::default(),
            router,

            parser: RequestParser::default(),
            in_service: None,
            pending: VecDeque::new(),
        }
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        event!(Level::DEBUG, "closing connection");

        let _ = self.events.send(ConnectionEvent::Closed);
        if let Some(tcp_actions) = self.tcp_actions.take() {
            let _ = tcp_actions.send(tcp::StreamAction::Close);
        }
    }
}

impl Actor for Service {
    fn register(&mut self, _rt: &mut Runtime, meta: &mut Meta) -> Result<(), Error> {
        self.tcp_events.set_signal(meta.signal());
        self.actions.set_signal(meta.signal());
        self.commands.set_signal(meta.signal());
        Ok(())
    }

    fn process(&mut self, _rt: &mut Runtime, meta: &mut Meta) -> Result<(), Error> {
        self.process_tcp(meta);
        self.process_commands();
        self.process_actions();
        Ok(())
    }
}

impl Service {
    fn process_tcp(&mut self, meta: &mut Meta) {
        while let Some(event) = self.tcp_events.recv() {
            match event {
                tcp::StreamEvent::Recv(event) => self.on_bytes_received(&event.data),
                tcp::StreamEvent::Closed => {
                    event!(Level::DEBUG, "transport closed");
                    self.tcp_actions = None;
                    meta.set_stop();
                }
            }
        }
    }

    /// Feed arrived bytes to the parser and admit every request completed
    /// by them, regardless of dispatch progress.
    fn on_bytes_received(&mut self, data: &[u8]) {
        event!(Level::TRACE, count = data.len(), "received data");

        self.parser.consume(data);

        loop {
            match self.parser.poll_request() {
                Ok(Some(request)) => self.enqueue_request(request),
                Ok(None) => break,
                Err(error) => {
                    // The stream is desynchronized, nothing sensible can
                    // follow on this transport
                    event!(Level::ERROR, "parse error, dropping connection: {}", error);
                    self.close_transport();
                    break;
                }
            }
        }
    }

    /// Admission rule for pipelining: dispatch immediately if nothing is
    /// in service, otherwise queue behind it. Ingestion never blocks on
    /// handler latency.
    fn enqueue_request(&mut self, request: Request) {
        if self.pending.is_empty() && self.in_service.is_none() {
            self.dispatch(request);
        } else {
            self.pending.push_back(request);
        }
    }

    fn dispatch(&mut self, request: Request) {
        if self.tcp_actions.is_none() {
            event!(Level::DEBUG, "connection closing, dropping request");
            return;
        }

        let router = self.router.clone();
        let Some(handler) = router.lookup(request.method(), request.path()) else {
            event!(
                Level::DEBUG,
                method = request.method().as_str(),
                path = request.path(),
                "no route matched, dropping connection",
            );
            self.close_transport();
            return;
        };

        let response = Response::new(self.commands.sender(), request.keep_alive());
        let request = self.in_service.insert(request);
        handler(request, response);
    }

    fn process_commands(&mut self) {
        while let Some(command) = self.commands.recv() {
            match command {
                ResponseCommand::Write {
                    data,
                    close_after_write,
                } => self.queue_write(data, close_after_write),
                ResponseCommand::Completed => self.request_completed(),
            }
        }
    }

    /// Clear the in-service slot and service the next pending request.
    fn request_completed(&mut self) {
        self.in_service = None;

        if let Some(request) = self.pending.pop_front() {
            event!(Level::DEBUG, "servicing next pipelined request");
            self.dispatch(request);
        }
    }

    fn queue_write(&mut self, data: Bytes, close_after_write: bool) {
        let Some(tcp_actions) = &self.tcp_actions else {
            event!(Level::WARN, "attempt to write to closed transport");
            return;
        };

        event!(
            Level::TRACE,
            count = data.len(),
            payload = %ellipsis(&data, 16),
            "queueing write",
        );

        let action = tcp::SendAction { data };
        if let Err(error) = tcp_actions.send(tcp::StreamAction::Send(action)) {
            event!(Level::WARN, "write dropped, transport is gone: {}", error);
            self.tcp_actions = None;
            return;
        }

        if close_after_write {
            self.close_transport();
        }
    }

    /// Begin transport closure. The handle is nulled immediately; the
    /// transport flushes queued writes, closes, and reports back with a
    /// `Closed` event.
    fn close_transport(&mut self) {
        if let Some(tcp_actions) = self.tcp_actions.take() {
            let _ = tcp_actions.send(tcp::StreamAction::Close);
        }
    }

    fn process_actions(&mut self) {
        while let Some(action) = self.actions.recv() {
            match action {
                ConnectionAction::Close => {
                    event!(Level::DEBUG, "close requested");
                    self.close_transport();
                }
            }
        }
    }
}

fn ellipsis(data: &[u8], limit: usize) -> String {
    let mut preview: String = data
        .iter()
        .take(limit)
        .map(|&byte| {
            if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '.'
            }
        })
        .collect();
    if data.len() > limit {
        preview.push_str("...");
    }
    preview
}
