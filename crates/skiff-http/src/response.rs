use bytes::{BufMut, BytesMut};
use skiff::Sender;
use tracing::{event, Level};

use crate::connection::ResponseCommand;

/// Per-request response handle.
///
/// A response is bound to its connection by a weak sender: it can check
/// that the connection is alive but never keeps its transport open. Every
/// operation on a response whose connection is gone is a logged no-op.
///
/// The first body-carrying call that also completes the content is framed
/// with `Content-Length`; a response streamed over multiple calls falls
/// back to connection-close framing, and the transport closes once the
/// content completes.
pub struct Response {
    commands: Sender<ResponseCommand>,

    code: u16,
    reason: String,
    content_type: String,
    fields: Vec<(String, String)>,
    keep_alive: bool,

    sent_headers: bool,
    length_framed: bool,
    ended: bool,
}

impl Response {
    /// Bind a response to a connection's command queue.
    pub fn new(commands: Sender<ResponseCommand>, keep_alive: bool) -> Self {
        Self {
            commands,

            code: 200,
            reason: "OK".to_string(),
            content_type: String::new(),
            fields: Vec::new(),
            keep_alive,

            sent_headers: false,
            length_framed: false,
            ended: false,
        }
    }

    /// Set the status line and content type.
    ///
    /// Frozen once headers have been sent.
    pub fn set_response(&mut self, code: u16, reason: &str, content_type: &str) {
        if self.commands.is_closed() {
            event!(Level::WARN, "response bailed out on set_response, connection is gone");
            return;
        }
        if self.sent_headers {
            event!(Level::WARN, "ignoring status change after headers were sent");
            return;
        }

        self.code = code;
        self.reason = reason.to_string();
        self.content_type = content_type.to_string();
    }

    /// Insert a header field.
    ///
    /// Overwriting an existing field logs a warning but is not an error;
    /// the last write wins.
    pub fn set_header(&mut self, key: &str, value: &str) {
        if self.commands.is_closed() {
            event!(Level::WARN, "response bailed out on set_header, connection is gone");
            return;
        }
        if self.sent_headers {
            event!(Level::WARN, key, "ignoring header change after headers were sent");
            return;
        }

        if let Some(field) = self
            .fields
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(key))
        {
            event!(
                Level::WARN,
                key,
                previous = field.1.as_str(),
                "overwriting existing header field",
            );
            field.1 = value.to_string();
            return;
        }

        self.fields.push((key.to_string(), value.to_string()));
    }

    /// Send response bytes, optionally completing the message.
    ///
    /// The first call composes the status line and header block.
    /// Completing the content notifies the connection, which advances its
    /// pipeline; a completed response on a non-keep-alive exchange closes
    /// the transport after the final write.
    pub fn send(&mut self, payload: &[u8], content_complete: bool, close_after_write: bool) {
        if self.commands.is_closed() {
            event!(Level::WARN, "response bailed out on send, connection is gone");
            return;
        }
        if self.ended {
            event!(Level::WARN, "response already ended, dropping send");
            return;
        }

        let mut data = BytesMut::new();

        if !self.sent_headers {
            let version = if self.keep_alive { "HTTP/1.1" } else { "HTTP/1.0" };
            data.put(format!("{} {} {}\r\n", version, self.code, self.reason).as_bytes());

            for (key, value) in &self.fields {
                data.put(format!("{}: {}\r\n", key, value).as_bytes());
            }

            if !payload.is_empty() {
                data.put(format!("Content-Type: {}\r\n", self.content_type).as_bytes());
            }
            if self.keep_alive {
                data.put(&b"Connection: keep-alive\r\n"[..]);
            }
            if content_complete {
                data.put(format!("Content-Length: {}\r\n", payload.len()).as_bytes());
                self.length_framed = true;
            }
            data.put(&b"\r\n"[..]);

            self.sent_headers = true;
        }

        data.put(payload);

        let mut close_after_write = close_after_write;
        if content_complete && (!self.keep_alive || !self.length_framed) {
            close_after_write = true;
        }

        if !data.is_empty() || close_after_write {
            let write = ResponseCommand::Write {
                data: data.freeze(),
                close_after_write,
            };
            if self.commands.send(write).is_err() {
                event!(Level::WARN, "response bailed out on send, connection is gone");
                return;
            }
        }

        if content_complete {
            self.ended = true;
            if self.commands.send(ResponseCommand::Completed).is_err() {
                event!(Level::WARN, "connection went away before completion");
            }
        }
    }

    /// Complete the response without further payload.
    ///
    /// Repeated calls are tolerated; only the first has any effect.
    pub fn end(&mut self, close_connection: bool) {
        self.send(b"", true, close_connection);
    }
}
