//! A lightweight actor runtime.
//!
//! An actor owns a piece of state and a mailbox. Everything that touches
//! the state goes through the mailbox as a [`Message`] (or a closure via
//! [`Actor::call`]), which gives single-threaded mutation semantics
//! without locks, even when the runtime itself is multi-threaded.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod error;
mod handle;
mod mailbox;
mod scheduler;

pub use error::ActorDeadError;
pub use handle::Actor;
pub use mailbox::Message;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;
    use tokio::time::timeout;

    use super::*;

    #[derive(Default)]
    struct Counter {
        value: u32,
        log: Vec<&'static str>,
    }

    #[derive(Debug)]
    struct Add(u32);

    impl Message<Counter> for Add {
        fn handle(self, state: &mut Counter, _handle: &Actor<Counter>) {
            state.value += self.0;
            state.log.push("add");
        }
    }

    #[derive(Debug)]
    struct AddLater(u32, oneshot::Sender<()>);

    impl Message<Counter> for AddLater {
        fn handle(self, state: &mut Counter, handle: &Actor<Counter>) {
            state.log.push("add later");
            let handle = handle.clone();
            let Self(value, done_tx) = self;
            tokio::spawn(async move {
                handle.send(Add(value)).unwrap();
                done_tx.send(()).unwrap();
            });
        }
    }

    #[tokio::test]
    async fn test_send_and_call() {
        let actor = Actor::spawn(Counter::default(), "counter");
        actor.send(Add(40)).unwrap();
        actor.send(Add(2)).unwrap();

        let value = actor.call("get", |state, _| state.value).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_message_from_spawned_task() {
        let actor = Actor::spawn(Counter::default(), "counter");
        let (done_tx, done_rx) = oneshot::channel();
        actor.send(AddLater(7, done_tx)).unwrap();
        timeout(Duration::from_millis(500), done_rx)
            .await
            .unwrap()
            .unwrap();

        let (value, log) = actor
            .call("get", |state, _| (state.value, state.log.clone()))
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(log, ["add later", "add"]);
    }

    #[tokio::test]
    async fn test_stop() {
        let actor = Actor::spawn(Counter::default(), "counter");
        actor.stop();
        let result = timeout(
            Duration::from_millis(500),
            actor.call("get", |state, _| state.value),
        )
        .await
        .unwrap();
        assert!(result.is_err());
    }
}
