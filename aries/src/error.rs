use std::io;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AriesError {
    #[error("Failed to connect to {addr}: {source}")]
    Connection { addr: String, source: io::Error },

    #[error("No response to '{command}' within {timeout:?}")]
    ResponseTimeout { command: String, timeout: Duration },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Malformed response to '{command}': {response:?}")]
    MalformedResponse { command: String, response: String },

    #[error("Controller rejected '{command}' with code {code}")]
    Rejected { command: String, code: String },

    #[error("Stage still moving after {waited:?}")]
    WaitTimeout { waited: Duration },

    #[error("Connection is closed")]
    Closed,

    #[error("Transport error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl AriesError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        AriesError::InvalidInput {
            message: message.into(),
        }
    }

    pub(crate) fn from_transport(error: io::Error, command: &str, timeout: Duration) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => AriesError::ResponseTimeout {
                command: command.to_string(),
                timeout,
            },
            io::ErrorKind::NotConnected => AriesError::Closed,
            _ => AriesError::Io { source: error },
        }
    }
}

pub type Result<T> = std::result::Result<T, AriesError>;
