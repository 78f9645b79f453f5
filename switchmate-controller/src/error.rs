use switchmate_proto::ProtocolError;
use uuid::Uuid;

use crate::adapter::AdapterError;
use crate::machine::State;
use crate::workflow::InputError;

/// Why an invocation failed. Every variant is terminal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("failed to get a service")]
    ServiceMissing,
    #[error("characteristic {0} not found")]
    CharacteristicMissing(Uuid),
    #[error("unexpected {event} while {state}")]
    UnexpectedEvent { state: State, event: &'static str },
    #[error("timed out while {0}")]
    Timeout(State),
    #[error(transparent)]
    Input(#[from] InputError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequencing_errors_name_the_state() {
        let err = Error::UnexpectedEvent {
            state: State::Connecting,
            event: "write ack",
        };
        assert_eq!(err.to_string(), "unexpected write ack while connecting");
        assert_eq!(
            Error::Timeout(State::AwaitingNotification).to_string(),
            "timed out while waiting for the switch to answer"
        );
    }
}
