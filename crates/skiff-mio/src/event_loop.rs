use anyhow::Error;
use mio::Events;
use skiff::Runtime;
use tracing::{event, instrument, Level};

use crate::Registry;

/// Set up a runtime and registry, then run the event loop.
///
/// Polls for readiness, routes wake events through the registry, and
/// processes actors, until no actors remain in the runtime.
#[instrument("event-loop", skip_all)]
pub fn run_event_loop<I>(init: I) -> Result<(), Error>
where
    I: FnOnce(&mut Runtime, &Registry) -> Result<(), Error>,
{
    let mut rt = Runtime::default();
    let registry = Registry::new()?;

    init(&mut rt, &registry)?;

    // Process pending messages raised from initialization
    event!(Level::TRACE, "processing init messages");
    rt.run_until_idle()?;

    let mut events = Events::with_capacity(128);
    while !rt.is_empty() {
        registry.poll(&mut events)?;

        for event in events.iter() {
            registry.wake(event.token(), event.is_readable(), event.is_writable());
        }

        // Process all pending actor messages, including wake events
        event!(Level::TRACE, "processing poll step messages");
        rt.run_until_idle()?;
    }

    event!(Level::DEBUG, "no actors remaining, stopping");

    Ok(())
}
