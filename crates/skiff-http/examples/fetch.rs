use anyhow::Error;
use skiff::{Actor, Mailbox, Meta, Runtime};
use skiff_http::FetchEvent;
use skiff_mio::Registry;
use tracing::{event, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> Result<(), Error> {
    init_logging();

    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "example.com".to_string());

    skiff_mio::run_event_loop(move |rt, registry| {
        let actor = Service::new(rt, registry.clone(), &host)?;
        rt.insert("fetch-example", actor)?;
        Ok(())
    })
}

struct Service {
    events: Mailbox<FetchEvent>,
}

impl Service {
    fn new(rt: &mut Runtime, registry: Registry, host: &str) -> Result<Self, Error> {
        let events = Mailbox::default();
        skiff_http::get(rt, registry, host, 80, events.sender())?;

        Ok(Self { events })
    }
}

impl Actor for Service {
    fn register(&mut self, _rt: &mut Runtime, meta: &mut Meta) -> Result<(), Error> {
        self.events.set_signal(meta.signal());
        Ok(())
    }

    fn process(&mut self, _rt: &mut Runtime, meta: &mut Meta) -> Result<(), Error> {
        while let Some(event) = self.events.recv() {
            match event {
                FetchEvent::Response(response) => {
                    event!(
                        Level::INFO,
                        status = response.status,
                        reason = response.reason.as_str(),
                        "response received",
                    );
                    for (key, value) in &response.headers {
                        event!(Level::INFO, "{}: {}", key, value);
                    }
                    println!("{}", String::from_utf8_lossy(&response.body));
                }
                FetchEvent::Failed => event!(Level::ERROR, "fetch failed"),
            }

            meta.set_stop();
        }

        Ok(())
    }
}

fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).unwrap();
}
