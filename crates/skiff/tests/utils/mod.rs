mod mock;

use anyhow::{Context as _, Error};
use skiff::{Runtime, Sender};

pub use mock::{given_fail_actor, given_mock_actor, ActorInfo};

pub fn when_sent_message_to(rt: &mut Runtime, sender: Sender<()>) -> Result<(), Error> {
    sender.send(()).context("test: failed to send message")?;

    rt.run_until_idle()
        .context("test: failed to process after sending")?;

    Ok(())
}

pub fn then_actor_dropped(actor: &ActorInfo) {
    assert!(actor.dropped.get(), "actor not dropped");
}
