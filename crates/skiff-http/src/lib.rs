//! Event-driven HTTP engine.
//!
//! A server-side connection/request/response pipeline over the skiff-mio
//! transport, plus a path+method router and a one-shot client fetch.
//!
//! Each accepted stream gets a connection actor that turns the raw byte
//! stream into an ordered sequence of discrete requests. Ingestion and
//! dispatch are decoupled: pipelined requests keep parsing and queueing
//! while a handler is still busy, and responses are serialized onto the
//! wire in request order.

pub mod connection;

mod client;
mod listener;
mod parser;
mod request;
mod response;
mod router;

pub use self::{
    client::{get, ClientResponse, FetchEvent},
    listener::{listen, ServerInfo},
    parser::{ParseError, RequestParser},
    request::{Method, Request, Version},
    response::Response,
    router::{RouteHandler, Router},
};
