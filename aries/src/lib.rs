//! Client for the Kohzu ARIES / LYNX stage controller.
//!
//! The controller speaks a line based ASCII protocol over TCP: one command
//! per CRLF terminated line, one response line back. [`Aries`] wraps that
//! exchange with per-axis range limits, degree conversion and shortest-path
//! moves for rotating axes.

pub mod axis;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod sim;
pub mod transport;

pub use axis::{AxisConfig, AxisRange, LimitPolicy, Motion};
pub use client::Aries;
pub use command::{Command, ReplyMode, Response};
pub use config::{StageConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use error::{AriesError, Result};
pub use transport::Transport;

/// Parses `/` separated integers such as `5/5/7/4`.
///
/// Every field must be an integer; `5.0` or `fast` is rejected rather than
/// coerced.
pub fn parse_speeds(text: &str) -> Result<Vec<i64>> {
    text.split('/')
        .map(|field| {
            field.trim().parse::<i64>().map_err(|_| {
                AriesError::invalid_input(format!("'{}' is not an integer speed", field))
            })
        })
        .collect()
}

/// Parses `/` separated angles such as `-45/90/0/10`.
pub fn parse_angles(text: &str) -> Result<Vec<f64>> {
    text.split('/')
        .map(|field| {
            field
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| AriesError::invalid_input(format!("'{}' is not an angle", field)))
        })
        .collect()
}
