mod utils;

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use anyhow::Error;
use skiff_http::{connection::ConnectionAction, Method, Response, Router};
use skiff_mio::net::tcp;
use tracing_test::traced_test;

use crate::utils::{given_connection, offset_of, then_transport_saw, when_bytes_arrive};

#[test]
#[traced_test]
fn routed_request_invokes_handler_once() -> Result<(), Error> {
    let count = Rc::new(Cell::new(0));

    let mut router = Router::new();
    let handler_count = count.clone();
    router.register(Method::Get, "/x", move |request, mut response| {
        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.path(), "/x");

        handler_count.set(handler_count.get() + 1);
        response.set_response(200, "OK", "text/plain");
        response.end(false);
    });

    let mut conn = given_connection(router)?;
    when_bytes_arrive(&mut conn, b"GET /x HTTP/1.1\r\n\r\n")?;

    assert_eq!(count.get(), 1);

    let (written, closed) = then_transport_saw(&conn);
    assert!(written.starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert!(!closed);

    Ok(())
}

#[test]
#[traced_test]
fn pipelined_responses_keep_request_order() -> Result<(), Error> {
    let mut router = Router::new();
    for (path, body) in [("/a", "alpha"), ("/b", "bravo"), ("/c", "charlie")] {
        router.register(Method::Get, path, move |_request, mut response| {
            response.set_response(200, "OK", "text/plain");
            response.send(body.as_bytes(), true, false);
        });
    }

    let mut conn = given_connection(router)?;

    // All three requests arrive in one read burst
    when_bytes_arrive(
        &mut conn,
        b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\nGET /c HTTP/1.1\r\n\r\n",
    )?;

    let (written, closed) = then_transport_saw(&conn);
    let alpha = offset_of(&written, b"alpha").expect("missing first response");
    let bravo = offset_of(&written, b"bravo").expect("missing second response");
    let charlie = offset_of(&written, b"charlie").expect("missing third response");
    assert!(alpha < bravo && bravo < charlie, "responses out of order");
    assert!(!closed);

    // The queue drained to empty: the connection serves follow-ups
    when_bytes_arrive(&mut conn, b"GET /a HTTP/1.1\r\n\r\n")?;
    let (written, _) = then_transport_saw(&conn);
    assert!(offset_of(&written, b"alpha").is_some());

    Ok(())
}

#[test]
#[traced_test]
fn deferred_completion_holds_back_later_responses() -> Result<(), Error> {
    let parked: Rc<RefCell<Option<Response>>> = Rc::new(RefCell::new(None));

    let mut router = Router::new();
    let parked_handler = parked.clone();
    router.register(Method::Get, "/slow", move |_request, mut response| {
        response.set_response(200, "OK", "text/plain");
        *parked_handler.borrow_mut() = Some(response);
    });
    router.register(Method::Get, "/fast", |_request, mut response| {
        response.set_response(200, "OK", "text/plain");
        response.send(b"fast", true, false);
    });

    let mut conn = given_connection(router)?;
    when_bytes_arrive(&mut conn, b"GET /slow HTTP/1.1\r\n\r\nGET /fast HTTP/1.1\r\n\r\n")?;

    // At most one request is in service: nothing went out while the first
    // response is still unfinished
    let (written, _) = then_transport_saw(&conn);
    assert!(written.is_empty());

    // Completing the parked response releases the next one, in order
    let mut response = parked.borrow_mut().take().expect("handler not invoked");
    response.send(b"slow", true, false);
    conn.rt.run_until_idle()?;

    let (written, closed) = then_transport_saw(&conn);
    let slow = offset_of(&written, b"slow").expect("missing first response");
    let fast = offset_of(&written, b"fast").expect("missing second response");
    assert!(slow < fast, "responses out of order");
    assert!(!closed);

    Ok(())
}

#[test]
#[traced_test]
fn route_miss_closes_without_bytes() -> Result<(), Error> {
    let mut conn = given_connection(Router::new())?;
    when_bytes_arrive(&mut conn, b"GET /missing HTTP/1.1\r\n\r\n")?;

    let (written, closed) = then_transport_saw(&conn);
    assert!(written.is_empty());
    assert!(closed);

    Ok(())
}

#[test]
#[traced_test]
fn http10_response_closes_after_write() -> Result<(), Error> {
    let mut router = Router::new();
    router.register(Method::Get, "/", |request, mut response| {
        assert!(!request.keep_alive());
        response.set_response(200, "OK", "text/plain");
        response.send(b"bye", true, false);
    });

    let mut conn = given_connection(router)?;
    when_bytes_arrive(&mut conn, b"GET / HTTP/1.0\r\n\r\n")?;

    let (written, closed) = then_transport_saw(&conn);
    assert!(written.starts_with(b"HTTP/1.0 200 OK\r\n"));
    assert!(offset_of(&written, b"Connection: keep-alive").is_none());
    assert!(closed);

    Ok(())
}

#[test]
#[traced_test]
fn connection_close_header_overrides_keep_alive() -> Result<(), Error> {
    let mut router = Router::new();
    router.register(Method::Get, "/", |request, mut response| {
        assert!(!request.keep_alive());
        response.set_response(200, "OK", "text/plain");
        response.send(b"bye", true, false);
    });

    let mut conn = given_connection(router)?;
    when_bytes_arrive(&mut conn, b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n")?;

    let (_, closed) = then_transport_saw(&conn);
    assert!(closed);

    Ok(())
}

#[test]
#[traced_test]
fn malformed_input_drops_connection() -> Result<(), Error> {
    let mut conn = given_connection(Router::new())?;
    when_bytes_arrive(&mut conn, b"\x01\x02\x03 nonsense\r\n\r\n")?;

    let (written, closed) = then_transport_saw(&conn);
    assert!(written.is_empty());
    assert!(closed);

    Ok(())
}

#[test]
#[traced_test]
fn request_body_reaches_handler() -> Result<(), Error> {
    let mut router = Router::new();
    router.register(Method::Post, "/echo", |request, mut response| {
        let body = request.body().clone();
        response.set_response(200, "OK", "text/plain");
        response.send(&body, true, false);
    });

    let mut conn = given_connection(router)?;

    // The body arrives split mid-payload
    when_bytes_arrive(&mut conn, b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel")?;
    let (written, _) = then_transport_saw(&conn);
    assert!(written.is_empty());

    when_bytes_arrive(&mut conn, b"lo")?;
    let (written, closed) = then_transport_saw(&conn);
    assert!(offset_of(&written, b"Content-Length: 5").is_some());
    assert!(offset_of(&written, b"\r\n\r\nhello").is_some());
    assert!(!closed);

    Ok(())
}

#[test]
#[traced_test]
fn response_after_transport_close_is_noop() -> Result<(), Error> {
    let parked: Rc<RefCell<Option<Response>>> = Rc::new(RefCell::new(None));

    let mut router = Router::new();
    let parked_handler = parked.clone();
    router.register(Method::Get, "/hold", move |_request, response| {
        *parked_handler.borrow_mut() = Some(response);
    });

    let mut conn = given_connection(router)?;
    when_bytes_arrive(&mut conn, b"GET /hold HTTP/1.1\r\n\r\n")?;

    // The peer goes away while the response is still held
    conn.tcp_events.send(tcp::StreamEvent::Closed)?;
    conn.rt.run_until_idle()?;

    let mut response = parked.borrow_mut().take().expect("handler not invoked");
    response.set_header("X-Late", "1");
    response.send(b"late", true, true);
    response.end(true);

    assert!(logs_contain("connection is gone"));

    let (written, _) = then_transport_saw(&conn);
    assert!(written.is_empty());

    Ok(())
}

#[test]
#[traced_test]
fn close_mid_pipeline_drops_queued_requests() -> Result<(), Error> {
    let mut router = Router::new();
    router.register(Method::Get, "/die", |_request, mut response| {
        response.set_response(200, "OK", "text/plain");
        response.send(b"last", true, true);
    });
    router.register(Method::Get, "/after", |_request, mut response| {
        response.set_response(200, "OK", "text/plain");
        response.send(b"never", true, false);
    });

    let mut conn = given_connection(router)?;
    when_bytes_arrive(&mut conn, b"GET /die HTTP/1.1\r\n\r\nGET /after HTTP/1.1\r\n\r\n")?;

    let (written, closed) = then_transport_saw(&conn);
    assert!(offset_of(&written, b"last").is_some());
    assert!(offset_of(&written, b"never").is_none());
    assert!(closed);

    Ok(())
}

#[test]
#[traced_test]
fn close_action_closes_transport() -> Result<(), Error> {
    let mut conn = given_connection(Router::new())?;

    conn.actions.send(ConnectionAction::Close)?;
    conn.rt.run_until_idle()?;

    let (written, closed) = then_transport_saw(&conn);
    assert!(written.is_empty());
    assert!(closed);

    Ok(())
}

#[test]
#[traced_test]
fn transport_closure_stops_the_connection() -> Result<(), Error> {
    let mut conn = given_connection(Router::new())?;

    conn.tcp_events.send(tcp::StreamEvent::Closed)?;
    conn.rt.run_until_idle()?;

    assert!(conn.rt.is_empty());

    let mut observed = false;
    while let Some(event) = conn.conn_events.recv() {
        match event {
            skiff_http::connection::ConnectionEvent::Closed => observed = true,
        }
    }
    assert!(observed, "connection never reported closure");

    // Follow-up events are refused cleanly, the connection is gone
    let result = conn.tcp_events.send(tcp::StreamEvent::Closed);
    assert!(result.is_err());

    Ok(())
}
