pub mod cancellation;
pub mod channel;

/// Application-level events consumed by the orchestrator run loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationEvent {
    StopRequested,
}
