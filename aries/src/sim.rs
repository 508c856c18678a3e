//! In-memory stand-in for the controller.
//!
//! Moves land instantly, but each moved axis keeps reporting a non-zero
//! status for a configurable number of `STR` queries afterwards.

use std::io;
use std::time::Duration;

use crate::transport::Transport;

const MOVING: &str = "1";
const STATIONARY: &str = "0";
const BAD_COMMAND: &str = "1";
const EMERGENCY_LOCKED: &str = "2";

#[derive(Debug, Clone, Default)]
struct SimAxis {
    position: i64,
    busy_polls: u32,
    garbled_status: bool,
}

#[derive(Debug, Clone)]
pub struct SimulatedController {
    axes: Vec<SimAxis>,
    busy_polls: u32,
    locked: bool,
    open: bool,
    history: Vec<String>,
}

impl SimulatedController {
    pub fn new(axis_count: usize) -> Self {
        Self {
            axes: vec![SimAxis::default(); axis_count],
            busy_polls: 0,
            locked: false,
            open: true,
            history: Vec::new(),
        }
    }

    /// Number of status queries an axis answers as moving after a motion
    /// command.
    pub fn with_busy_polls(mut self, polls: u32) -> Self {
        self.busy_polls = polls;
        self
    }

    pub fn position(&self, axis: usize) -> i64 {
        self.axes[axis - 1].position
    }

    pub fn set_position(&mut self, axis: usize, pulses: i64) {
        self.axes[axis - 1].position = pulses;
    }

    pub fn set_moving(&mut self, axis: usize, polls: u32) {
        self.axes[axis - 1].busy_polls = polls;
    }

    /// Answers `STR` for `axis` without a status value.
    pub fn garble_status(&mut self, axis: usize) {
        self.axes[axis - 1].garbled_status = true;
    }

    /// Rejects motion commands until `REM` is received.
    pub fn trip_emergency_stop(&mut self) {
        self.locked = true;
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Handles one command line and returns the response line.
    pub fn handle(&mut self, line: &str) -> String {
        let line = line.trim();
        self.history.push(line.to_string());

        let Some(name) = line.get(..3) else {
            return error(line, BAD_COMMAND);
        };
        if name == "REM" {
            self.locked = false;
            return done(name, None);
        }

        let mut fields = line[3..].split('/');
        let Some(axis) = fields
            .next()
            .and_then(|field| field.parse::<usize>().ok())
            .filter(|axis| (1..=self.axes.len()).contains(axis))
        else {
            return error(name, BAD_COMMAND);
        };
        let tag = format!("{}{}", name, axis);
        let params = match fields.map(str::parse::<i64>).collect::<Result<Vec<_>, _>>() {
            Ok(params) => params,
            Err(_) => return error(&tag, BAD_COMMAND),
        };

        let is_motion = matches!(name, "APS" | "RPS" | "ORG");
        if is_motion && self.locked {
            return error(&tag, EMERGENCY_LOCKED);
        }

        let busy_polls = self.busy_polls;
        let state = &mut self.axes[axis - 1];

        match (name, params.as_slice()) {
            ("RDP", []) => done(&tag, Some(&state.position.to_string())),
            ("STR", []) if state.garbled_status => done(&tag, None),
            ("STR", []) => {
                let status = if state.busy_polls > 0 {
                    state.busy_polls -= 1;
                    MOVING
                } else {
                    STATIONARY
                };
                done(&tag, Some(status))
            }
            ("APS", [_speed, pulses, _reply]) => {
                state.position = *pulses;
                state.busy_polls = busy_polls;
                done(&tag, None)
            }
            ("RPS", [_speed, delta, _reply]) => match state.position.checked_add(*delta) {
                Some(position) => {
                    state.position = position;
                    state.busy_polls = busy_polls;
                    done(&tag, None)
                }
                None => error(&tag, BAD_COMMAND),
            },
            ("ORG", [_speed, _reply]) => {
                state.position = 0;
                state.busy_polls = busy_polls;
                done(&tag, None)
            }
            ("STP", [_mode]) => {
                state.busy_polls = 0;
                done(&tag, None)
            }
            _ => error(&tag, BAD_COMMAND),
        }
    }
}

impl Transport for SimulatedController {
    fn exchange(&mut self, line: &str, _timeout: Duration) -> io::Result<String> {
        if !self.open {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "simulator is closed",
            ));
        }
        Ok(self.handle(line))
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

fn done(tag: &str, value: Option<&str>) -> String {
    match value {
        Some(value) => format!("C\t{}\t{}", tag, value),
        None => format!("C\t{}", tag),
    }
}

fn error(tag: &str, code: &str) -> String {
    format!("E\t{}\t{}", tag, code)
}
