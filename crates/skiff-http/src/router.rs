use std::collections::HashMap;

use tracing::{event, Level};

use crate::{request::Method, Request, Response};

/// Handler invoked for a routed request.
///
/// A handler may drive its response to completion synchronously, or move
/// it out and complete it later; the connection does not assume
/// synchronous completion.
pub type RouteHandler = Box<dyn Fn(&Request, Response)>;

/// Table from (method, exact path) to handler.
///
/// Routes are registered before the listener starts accepting; the table
/// is shared read-only by every connection from then on. No patterns, no
/// path parameters: paths match byte-for-byte against the parsed target's
/// path component, query string excluded.
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, HashMap<String, RouteHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a method and exact path.
    ///
    /// The last registration for a given pair wins.
    pub fn register<H>(&mut self, method: Method, path: impl Into<String>, handler: H)
    where
        H: Fn(&Request, Response) + 'static,
    {
        let path = path.into();
        event!(
            Level::INFO,
            method = method.as_str(),
            path = path.as_str(),
            "installing route",
        );

        let previous = self
            .routes
            .entry(method)
            .or_default()
            .insert(path, Box::new(handler));
        if previous.is_some() {
            event!(Level::WARN, "replacing previously registered route");
        }
    }

    pub(crate) fn lookup(&self, method: Method, path: &str) -> Option<&RouteHandler> {
        self.routes.get(&method)?.get(path)
    }
}
