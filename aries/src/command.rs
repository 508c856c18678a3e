//! Command lines understood by the ARIES / LYNX controller and the
//! responses it sends back.
//!
//! Every command is one ASCII line; the controller answers with one line of
//! tab separated fields: a status token (`C` for completed, `E` for an
//! error), the echoed command name, and an optional value.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AriesError, Result};

/// When the controller acknowledges a motion command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMode {
    /// Reply as soon as the motion starts.
    #[default]
    Immediate,
    /// Reply once the motion has finished.
    OnCompletion,
}

impl ReplyMode {
    fn code(self) -> u8 {
        match self {
            ReplyMode::Immediate => 1,
            ReplyMode::OnCompletion => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ReadPosition {
        axis: usize,
    },
    ReadStatus {
        axis: usize,
    },
    MoveAbsolute {
        axis: usize,
        speed: u8,
        pulses: i64,
        reply: ReplyMode,
    },
    MoveRelative {
        axis: usize,
        speed: u8,
        delta: i64,
        reply: ReplyMode,
    },
    Origin {
        axis: usize,
        speed: u8,
        reply: ReplyMode,
    },
    Stop {
        axis: usize,
        immediate: bool,
    },
    ReleaseEmergencyStop,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Command::ReadPosition { axis } => write!(f, "RDP{}", axis),
            Command::ReadStatus { axis } => write!(f, "STR{}", axis),
            Command::MoveAbsolute {
                axis,
                speed,
                pulses,
                reply,
            } => write!(f, "APS{}/{}/{}/{}", axis, speed, pulses, reply.code()),
            Command::MoveRelative {
                axis,
                speed,
                delta,
                reply,
            } => write!(f, "RPS{}/{}/{}/{}", axis, speed, delta, reply.code()),
            Command::Origin { axis, speed, reply } => {
                write!(f, "ORG{}/{}/{}", axis, speed, reply.code())
            }
            Command::Stop { axis, immediate } => write!(f, "STP{}/{}", axis, immediate as u8),
            Command::ReleaseEmergencyStop => write!(f, "REM"),
        }
    }
}

/// One response line, split on whitespace, together with the command line
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    command: String,
    line: String,
}

impl Response {
    const ERROR_TOKEN: &'static str = "E";
    const STATIONARY: &'static str = "0";

    pub fn new(command: impl Into<String>, line: impl Into<String>) -> Self {
        Response {
            command: command.into(),
            line: line.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.line.split_whitespace().nth(index)
    }

    pub fn is_error(&self) -> bool {
        self.field(0) == Some(Self::ERROR_TOKEN)
    }

    /// Fails with [`AriesError::Rejected`] when the controller answered with
    /// an error status, and with [`AriesError::MalformedResponse`] when the
    /// echoed tag belongs to a different command.
    pub fn check(self) -> Result<Self> {
        if self.is_error() {
            return Err(AriesError::Rejected {
                code: self.field(2).unwrap_or("?").to_string(),
                command: self.command,
            });
        }
        if self.field(1) != Some(self.tag()) {
            return Err(self.malformed());
        }
        Ok(self)
    }

    /// Command name and axis, e.g. `APS1` for `APS1/5/0/1`.
    fn tag(&self) -> &str {
        self.command.split('/').next().unwrap_or_default()
    }

    pub fn value(&self) -> Result<&str> {
        self.field(2).ok_or_else(|| self.malformed())
    }

    pub fn pulses(&self) -> Result<i64> {
        self.value()?.parse().map_err(|_| self.malformed())
    }

    pub fn is_stationary(&self) -> Result<bool> {
        Ok(self.value()? == Self::STATIONARY)
    }

    fn malformed(&self) -> AriesError {
        AriesError::MalformedResponse {
            command: self.command.clone(),
            response: self.line.clone(),
        }
    }
}
