use std::{cell::Cell, rc::Rc};

use anyhow::{bail, Error};
use skiff::{Actor, Mailbox, Meta, Runtime, Sender};

pub fn given_mock_actor(rt: &mut Runtime) -> Result<ActorInfo, Error> {
    let instance = MockActor::default();
    let info = instance.info();

    rt.insert("mock-actor", instance)?;

    Ok(info)
}

pub fn given_fail_actor(rt: &mut Runtime) -> Result<ActorInfo, Error> {
    let mut instance = MockActor::default();
    instance.fail = true;
    let info = instance.info();

    rt.insert("fail-actor", instance)?;

    Ok(info)
}

pub struct ActorInfo {
    pub sender: Sender<()>,
    pub count: Rc<Cell<usize>>,
    pub dropped: Rc<Cell<bool>>,
}

#[derive(Default)]
struct MockActor {
    mailbox: Mailbox<()>,
    count: Rc<Cell<usize>>,
    dropped: Rc<Cell<bool>>,
    fail: bool,
}

impl MockActor {
    fn info(&self) -> ActorInfo {
        ActorInfo {
            sender: self.mailbox.sender(),
            count: self.count.clone(),
            dropped: self.dropped.clone(),
        }
    }
}

impl Actor for MockActor {
    fn register(&mut self, _rt: &mut Runtime, meta: &mut Meta) -> Result<(), Error> {
        self.mailbox.set_signal(meta.signal());
        Ok(())
    }

    fn process(&mut self, _rt: &mut Runtime, meta: &mut Meta) -> Result<(), Error> {
        if self.fail {
            bail!("mock intentional fail");
        }

        let mut handled = false;
        while self.mailbox.recv().is_some() {
            self.count.set(self.count.get() + 1);
            handled = true;
        }

        // Stop after handling just one set of messages
        if handled {
            meta.set_stop();
        }

        Ok(())
    }
}

impl Drop for MockActor {
    fn drop(&mut self) {
        self.dropped.set(true);
    }
}
