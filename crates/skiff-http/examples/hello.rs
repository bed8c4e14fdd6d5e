use anyhow::Error;
use skiff_http::{Method, Router};
use tracing::{event, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const PAGE: &str = "<!DOCTYPE html><html><body><h1>Hello, World!</h1></body></html>";

fn main() -> Result<(), Error> {
    init_logging();

    skiff_mio::run_event_loop(|rt, registry| {
        let mut router = Router::new();

        router.register(Method::Get, "/", |request, mut response| {
            event!(Level::INFO, target = request.target(), "received get");

            response.set_response(200, "OK", "text/html");
            response.send(PAGE.as_bytes(), true, false);
        });

        router.register(Method::Get, "/greet", |request, mut response| {
            let name = request.query_param("name").unwrap_or("world");
            let body = format!("<html><body>Hello, {}!</body></html>", name);

            response.set_response(200, "OK", "text/html");
            response.send(body.as_bytes(), true, false);
        });

        router.register(Method::Post, "/echo", |request, mut response| {
            response.set_response(200, "OK", "text/plain");
            response.send(request.body(), true, false);
        });

        let addr = "0.0.0.0:8080".parse()?;
        let info = skiff_http::listen(rt, registry.clone(), addr, 1000, router)?;
        event!(Level::INFO, addr = ?info.local_addr, "serving");

        Ok(())
    })
}

fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).unwrap();
}
