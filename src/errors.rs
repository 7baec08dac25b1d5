/// All error types that can occur while emulating a LIFX bulb.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The 36-byte frame header was missing, self-inconsistent, or carried
    /// the wrong protocol number. Datagrams failing this way are dropped
    /// without a reply.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The 16-bit message type has no registered payload shape.
    ///
    /// Hubs and official apps send undocumented message types, so this is
    /// expected traffic, not a bug. The header remains usable.
    #[error("unknown message type {0}")]
    UnknownMessageType(u16),

    /// The payload was shorter than its message type requires.
    #[error("payload truncated for type {message_type}: need {need} bytes, got {got}")]
    PayloadTruncated {
        message_type: u16,
        need: usize,
        got: usize,
    },

    /// A payload field held a value outside its protocol domain
    /// (e.g. a power level that is neither 0 nor 65535).
    #[error("invalid value for field {field}: {value}")]
    InvalidFieldValue { field: &'static str, value: u64 },

    /// The light actuator is unreachable or not ready. Queries degrade to
    /// the last cached state instead of surfacing this on the wire.
    #[error("light actuator unavailable")]
    ActuatorUnavailable,

    /// A network socket operation failed.
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },
}

impl Error {
    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new truncated-payload error
    pub fn truncated(message_type: u16, need: usize, got: usize) -> Self {
        Error::PayloadTruncated {
            message_type,
            need,
            got,
        }
    }

    /// Create a new invalid-field error
    pub fn invalid_field(field: &'static str, value: u64) -> Self {
        Error::InvalidFieldValue { field, value }
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
