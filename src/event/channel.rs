use crossbeam::channel::{unbounded, Receiver, RecvError, Sender};
use thiserror::Error;

pub struct EventPublisher<E>(Sender<E>);

pub struct EventConsumer<E>(Receiver<E>);

#[derive(Debug, Error, PartialEq)]
pub enum EventPublisherError {
    #[error("error while publishing event: {0}")]
    SendError(String),
}

pub fn pub_sub<E>() -> (EventPublisher<E>, EventConsumer<E>) {
    let (s, r) = unbounded();
    (EventPublisher(s), EventConsumer(r))
}

impl<E> EventPublisher<E> {
    pub fn publish(&self, event: E) -> Result<(), EventPublisherError> {
        self.0
            .send(event)
            .map_err(|err| EventPublisherError::SendError(err.to_string()))
    }
}

impl<E> Clone for EventPublisher<E> {
    fn clone(&self) -> Self {
        EventPublisher(self.0.clone())
    }
}

impl<E> EventConsumer<E> {
    /// Blocks until an event is published or every publisher is gone.
    pub fn recv(&self) -> Result<E, RecvError> {
        self.0.recv()
    }
}
