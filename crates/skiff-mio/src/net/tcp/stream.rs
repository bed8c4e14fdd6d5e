use std::{
    collections::VecDeque,
    io::{ErrorKind, Read, Write},
    net::SocketAddr,
};

use anyhow::Error;
use bytes::Bytes;
use mio::{Interest, Token};
use skiff::{Actor, Mailbox, Meta, Runtime, Sender};
use tracing::{event, instrument, Level};

use crate::{ReadyEvent, Registry};

pub enum StreamEvent {
    /// Data received on the stream.
    Recv(RecvEvent),
    /// The stream has closed, no further events will be delivered.
    Closed,
}

pub struct RecvEvent {
    pub data: Bytes,
}

pub enum StreamAction {
    /// Queue data to be written to the stream.
    Send(SendAction),
    /// Close the stream once previously queued sends have flushed.
    Close,
}

pub struct SendAction {
    pub data: Bytes,
}

/// Open an outgoing TCP stream to a remote address.
///
/// Sends queued before the connection is established are held back and
/// flushed once it is.
#[instrument("tcp::connect", skip_all)]
pub fn connect(
    rt: &mut Runtime,
    registry: Registry,
    addr: SocketAddr,
    events: Sender<StreamEvent>,
) -> Result<Sender<StreamAction>, Error> {
    let stream = mio::net::TcpStream::connect(addr)?;

    let (actor, actions) = Service::new(registry, stream, events, false)?;
    rt.insert("tcp-stream", actor)?;

    Ok(actions)
}

pub(crate) fn open(
    rt: &mut Runtime,
    registry: Registry,
    stream: mio::net::TcpStream,
    events: Sender<StreamEvent>,
) -> Result<Sender<StreamAction>, Error> {
    let (actor, actions) = Service::new(registry, stream, events, true)?;
    rt.insert("tcp-stream", actor)?;

    Ok(actions)
}

struct Service {
    registry: Registry,
    ready: Mailbox<ReadyEvent>,
    actions: Mailbox<StreamAction>,
    events: Sender<StreamEvent>,

    stream: mio::net::TcpStream,
    token: Token,
    connected: bool,

    send_queue: VecDeque<Bytes>,
    send_offset: usize,
    interest: Interest,

    eof: bool,
    close_requested: bool,
    fatal: bool,
}

impl Service {
    fn new(
        registry: Registry,
        mut stream: mio::net::TcpStream,
        events: Sender<StreamEvent>,
        connected: bool,
    ) -> Result<(Self, Sender<StreamAction>), Error> {
        event!(Level::DEBUG, "opening stream");

        let ready = Mailbox::default();
        let actions = Mailbox::default();
        let actions_sender = actions.sender();

        // An in-progress connect signals completion through writability
        let interest = if connected {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        };
        let token = registry.register(&mut stream, interest, ready.sender())?;

        let this = Self {
            registry,
            ready,
            actions,
            events,

            stream,
            token,
            connected,

            send_queue: VecDeque::new(),
            send_offset: 0,
            interest,

            eof: false,
            close_requested: false,
            fatal: false,
        };
        Ok((this, actions_sender))
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        event!(Level::DEBUG, "closing stream");

        let _ = self.events.send(StreamEvent::Closed);
        self.registry.deregister(&mut self.stream, self.token);
    }
}

impl Actor for Service {
    fn register(&mut self, _rt: &mut Runtime, meta: &mut Meta) -> Result<(), Error> {
        self.ready.set_signal(meta.signal());
        self.actions.set_signal(meta.signal());
        Ok(())
    }

    fn process(&mut self, _rt: &mut Runtime, meta: &mut Meta) -> Result<(), Error> {
        let mut readable = false;
        let mut writable = false;
        while let Some(ready) = self.ready.recv() {
            readable |= ready.readable;
            writable |= ready.writable;
        }

        if writable && !self.connected {
            self.on_connect_ready();
        }

        while let Some(action) = self.actions.recv() {
            match action {
                StreamAction::Send(action) => self.on_action_send(action),
                StreamAction::Close => self.close_requested = true,
            }
        }

        if readable && !self.eof && !self.fatal {
            self.on_ready_readable();
        }

        if self.connected {
            self.flush_send_queue();
        }

        self.update_interest();

        if self.finished() {
            meta.set_stop();
        }

        Ok(())
    }
}

impl Service {
    fn on_connect_ready(&mut self) {
        match self.stream.take_error() {
            Ok(None) => {
                event!(Level::DEBUG, "stream connected");
                self.connected = true;
            }
            Ok(Some(error)) => {
                event!(Level::WARN, "failed to connect: {}", error);
                self.mark_fatal();
            }
            Err(error) => {
                event!(Level::WARN, "failed to check connect result: {}", error);
                self.mark_fatal();
            }
        }
    }

    fn on_action_send(&mut self, action: SendAction) {
        if self.close_requested || self.eof || self.fatal {
            event!(Level::WARN, "dropping send on closing stream");
            return;
        }

        self.send_queue.push_back(action.data);
    }

    fn on_ready_readable(&mut self) {
        let mut buffer = vec![0; 1024];
        let mut bytes_read = 0;

        loop {
            // Attempt to receive data
            let result = self.stream.read(&mut buffer[bytes_read..]);

            match result {
                Ok(len) => {
                    // Read of zero means the stream has reached its end
                    if len == 0 {
                        event!(Level::DEBUG, "stream reached end of input");
                        self.eof = true;
                        break;
                    }

                    // Add additional read data to the buffer
                    bytes_read += len;
                    if bytes_read == buffer.len() {
                        buffer.resize(buffer.len() + 1024, 0);
                    }
                }
                Err(error) => match error.kind() {
                    ErrorKind::WouldBlock | ErrorKind::Interrupted => break,
                    _ => {
                        event!(Level::WARN, "read failed: {}", error);
                        self.mark_fatal();
                        break;
                    }
                },
            }
        }

        // Hand off received data
        if bytes_read != 0 {
            event!(Level::TRACE, count = bytes_read, "received data");

            buffer.truncate(bytes_read);
            let data = Bytes::from(buffer);
            let event = RecvEvent { data };

            if self.events.send(StreamEvent::Recv(event)).is_err() {
                // Nobody is listening anymore, the stream has no purpose
                self.mark_fatal();
            }
        }
    }

    fn flush_send_queue(&mut self) {
        while let Some(front) = self.send_queue.front() {
            let result = self.stream.write(&front[self.send_offset..]);

            match result {
                Ok(count) => {
                    self.send_offset += count;

                    if self.send_offset == front.len() {
                        event!(Level::TRACE, count = front.len(), "sent data");
                        self.send_queue.pop_front();
                        self.send_offset = 0;
                    }
                }
                Err(error) => match error.kind() {
                    ErrorKind::WouldBlock | ErrorKind::Interrupted => return,
                    _ => {
                        // The write and anything queued behind it is lost
                        event!(Level::WARN, "write failed: {}", error);
                        self.mark_fatal();
                        return;
                    }
                },
            }
        }
    }

    fn update_interest(&mut self) {
        let mut interest = Interest::READABLE;
        if !self.connected || !self.send_queue.is_empty() {
            interest = interest | Interest::WRITABLE;
        }

        if interest != self.interest {
            if let Err(error) = self.registry.reregister(&mut self.stream, self.token, interest) {
                event!(Level::ERROR, "failed to update stream interest: {}", error);
                self.mark_fatal();
                return;
            }
            self.interest = interest;
        }
    }

    fn mark_fatal(&mut self) {
        self.fatal = true;
        self.send_queue.clear();
        self.send_offset = 0;
    }

    fn finished(&self) -> bool {
        self.fatal || ((self.eof || self.close_requested) && self.send_queue.is_empty())
    }
}
