use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::axis::{AxisConfig, AxisRange, LimitPolicy, Motion};
use crate::command::ReplyMode;

pub const DEFAULT_HOST: &str = "192.168.1.20";
pub const DEFAULT_PORT: u16 = 12321;

const FULL_TURN: i64 = 180000;
const COUNTER_RANGE: AxisRange = AxisRange::new(-134217728, 134217727);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub connect_timeout_ms: u64,
    pub command_timeout_ms: u64,
    /// Pause after every move command.
    pub settle_interval_ms: u64,
    /// Pause between status queries while waiting for the stage to stop.
    pub poll_interval_ms: u64,
    pub move_reply: ReplyMode,
    /// Stop a moving stage when the client is dropped without `shutdown`.
    pub stop_on_drop: bool,
    pub axes: Vec<AxisConfig>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            command_timeout_ms: 300_000,
            settle_interval_ms: 100,
            poll_interval_ms: 500,
            move_reply: ReplyMode::Immediate,
            stop_on_drop: false,
            axes: vec![pan_axis(), tilt_axis(), roll_axis(), light_axis()],
        }
    }
}

impl StageConfig {
    /// Pan, tilt and a roll axis that wraps within one turn.
    pub fn three_axis() -> Self {
        Self {
            axes: vec![
                pan_axis(),
                tilt_axis(),
                AxisConfig {
                    name: String::from("Z"),
                    pulses_per_degree: 500,
                    range: AxisRange::new(0, FULL_TURN),
                    extended_range: None,
                    limit: LimitPolicy::Wrap { turn: FULL_TURN },
                    motion: Motion::ShortestPath {
                        full_turn: FULL_TURN,
                        rehome_beyond: None,
                    },
                    speed: 5,
                },
            ],
            ..Default::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.axes.is_empty() {
            return Err("at least one axis must be configured".to_string());
        }

        for (index, axis) in self.axes.iter().enumerate() {
            let label = format!("axis {} ({})", index + 1, axis.name);

            if axis.pulses_per_degree == 0 {
                return Err(format!("{label}: pulses_per_degree must be positive"));
            }
            for range in std::iter::once(axis.range).chain(axis.extended_range) {
                if range.min > range.max {
                    return Err(format!(
                        "{label}: range {}..{} is empty",
                        range.min, range.max
                    ));
                }
            }
            if let LimitPolicy::Wrap { turn } = axis.limit {
                if turn <= 0 {
                    return Err(format!("{label}: wrap turn must be positive"));
                }
            }
            if let Motion::ShortestPath { full_turn, .. } = axis.motion {
                if full_turn <= 0 {
                    return Err(format!("{label}: full_turn must be positive"));
                }
            }
        }

        Ok(())
    }
}

fn pan_axis() -> AxisConfig {
    AxisConfig {
        name: String::from("X"),
        pulses_per_degree: 500,
        range: AxisRange::new(-45000, 45000),
        extended_range: None,
        limit: LimitPolicy::Saturate,
        motion: Motion::Absolute,
        speed: 5,
    }
}

fn tilt_axis() -> AxisConfig {
    AxisConfig {
        name: String::from("Y"),
        pulses_per_degree: 1000,
        range: AxisRange::new(0, 90000),
        extended_range: None,
        limit: LimitPolicy::Saturate,
        motion: Motion::Absolute,
        speed: 5,
    }
}

fn roll_axis() -> AxisConfig {
    AxisConfig {
        name: String::from("Z"),
        pulses_per_degree: 500,
        range: COUNTER_RANGE,
        extended_range: None,
        limit: LimitPolicy::Saturate,
        motion: Motion::ShortestPath {
            full_turn: FULL_TURN,
            rehome_beyond: Some(134_000_000),
        },
        speed: 7,
    }
}

fn light_axis() -> AxisConfig {
    AxisConfig {
        name: String::from("U"),
        pulses_per_degree: 500,
        range: AxisRange::new(-90000, 90000),
        extended_range: Some(COUNTER_RANGE),
        limit: LimitPolicy::Saturate,
        motion: Motion::Absolute,
        speed: 4,
    }
}
