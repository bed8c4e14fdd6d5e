use std::rc::Rc;

use anyhow::{Context as _, Error};
use bytes::Bytes;
use skiff::{Mailbox, Runtime, Sender};
use skiff_http::{connection, Router};
use skiff_mio::net::tcp;

/// A connection wired to hand-held transport mailboxes instead of a
/// socket: tests push stream events in and inspect the actions the
/// connection emits.
pub struct TestConnection {
    pub rt: Runtime,
    pub tcp_events: Sender<tcp::StreamEvent>,
    pub tcp_actions: Mailbox<tcp::StreamAction>,
    pub conn_events: Mailbox<connection::ConnectionEvent>,
    pub actions: Sender<connection::ConnectionAction>,
}

pub fn given_connection(router: Router) -> Result<TestConnection, Error> {
    let mut rt = Runtime::default();

    let tcp_events = Mailbox::default();
    let tcp_events_sender = tcp_events.sender();
    let tcp_actions = Mailbox::default();
    let conn_events = Mailbox::default();

    let actions = connection::open(
        &mut rt,
        tcp_events,
        tcp_actions.sender(),
        conn_events.sender(),
        Rc::new(router),
    )?;
    rt.run_until_idle()?;

    Ok(TestConnection {
        rt,
        tcp_events: tcp_events_sender,
        tcp_actions,
        conn_events,
        actions,
    })
}

pub fn when_bytes_arrive(conn: &mut TestConnection, bytes: &[u8]) -> Result<(), Error> {
    let event = tcp::RecvEvent {
        data: Bytes::copy_from_slice(bytes),
    };
    conn.tcp_events
        .send(tcp::StreamEvent::Recv(event))
        .context("test: failed to deliver bytes")?;

    conn.rt.run_until_idle()
}

/// Drain the transport actions emitted so far, returning the concatenated
/// written bytes and whether a close was requested.
pub fn then_transport_saw(conn: &TestConnection) -> (Vec<u8>, bool) {
    let mut written = Vec::new();
    let mut closed = false;

    while let Some(action) = conn.tcp_actions.recv() {
        match action {
            tcp::StreamAction::Send(send) => {
                assert!(!closed, "write queued after close");
                written.extend_from_slice(&send.data);
            }
            tcp::StreamAction::Close => closed = true,
        }
    }

    (written, closed)
}

pub fn offset_of(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
