use serde::{Deserialize, Serialize};

pub const MIN_SPEED: i64 = 0;
pub const MAX_SPEED: i64 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: i64,
    pub max: i64,
}

impl AxisRange {
    pub const fn new(min: i64, max: i64) -> Self {
        AxisRange { min, max }
    }
}

/// What happens to a target outside the axis range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LimitPolicy {
    /// Clamp to the nearest bound.
    Saturate,
    /// Fold the target back into the range modulo one turn, then clamp.
    Wrap { turn: i64 },
}

/// How a move on this axis is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Motion {
    /// `APS` to the target pulse position.
    Absolute,
    /// `RPS` by the shortest signed distance modulo `full_turn`.
    ///
    /// When the current position lies beyond `rehome_beyond` (in either
    /// direction) the axis is homed before the move so the controller
    /// counter does not overflow.
    ShortestPath {
        full_turn: i64,
        #[serde(default)]
        rehome_beyond: Option<i64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    pub name: String,
    pub pulses_per_degree: u32,
    /// Initial speed level, `0..=9`.
    pub speed: u8,
    pub range: AxisRange,
    #[serde(default)]
    pub extended_range: Option<AxisRange>,
    pub limit: LimitPolicy,
    pub motion: Motion,
}

impl AxisConfig {
    pub fn active_range(&self, extended: bool) -> AxisRange {
        match self.extended_range {
            Some(range) if extended => range,
            _ => self.range,
        }
    }

    /// Applies the limit policy to `pulses` within the active range.
    pub fn limit(&self, pulses: i64, extended: bool) -> Clip {
        let range = self.active_range(extended);
        match self.limit {
            LimitPolicy::Saturate => clip(pulses, range.min, range.max),
            LimitPolicy::Wrap { turn } if turn > 0 => {
                let wrapped = range.min + (pulses - range.min).rem_euclid(turn);
                if wrapped != pulses {
                    tracing::debug!(axis = %self.name, pulses, wrapped, "Target wrapped");
                }
                clip(wrapped, range.min, range.max)
            }
            LimitPolicy::Wrap { .. } => clip(pulses, range.min, range.max),
        }
    }

    pub fn to_pulses(&self, degrees: f64) -> i64 {
        degrees_to_pulses(degrees, self.pulses_per_degree)
    }

    /// Converts to degrees; rotating axes report within `[0, 360)`.
    pub fn to_degrees(&self, pulses: i64) -> f64 {
        let degrees = pulses_to_degrees(pulses, self.pulses_per_degree);
        match self.motion {
            Motion::ShortestPath { full_turn, .. } if full_turn > 0 => {
                degrees.rem_euclid(pulses_to_degrees(full_turn, self.pulses_per_degree))
            }
            _ => degrees,
        }
    }
}

/// Result of fitting a value into bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clip {
    pub value: i64,
    pub limited: bool,
}

/// Clamps `value` into `[min, max]`, warning when it had to be limited.
pub fn clip(value: i64, min: i64, max: i64) -> Clip {
    if value > max {
        tracing::warn!("{} is limited to {}", value, max);
        Clip {
            value: max,
            limited: true,
        }
    } else if value < min {
        tracing::warn!("{} is limited to {}", value, min);
        Clip {
            value: min,
            limited: true,
        }
    } else {
        Clip {
            value,
            limited: false,
        }
    }
}

pub fn clip_speed(speed: i64) -> (u8, bool) {
    let Clip { value, limited } = clip(speed, MIN_SPEED, MAX_SPEED);
    (value as u8, limited)
}

pub fn degrees_to_pulses(degrees: f64, pulses_per_degree: u32) -> i64 {
    (degrees * pulses_per_degree as f64).round() as i64
}

pub fn pulses_to_degrees(pulses: i64, pulses_per_degree: u32) -> f64 {
    pulses as f64 / pulses_per_degree as f64
}

/// Signed pulse distance from `current` to `target` along the shorter arc.
///
/// `((target - current + half) mod full_turn) - half` with a Euclidean
/// modulo, so an exact half turn resolves to `-half`.
pub fn shortest_delta(current: i64, target: i64, full_turn: i64) -> i64 {
    let half = full_turn / 2;
    (target - current + half).rem_euclid(full_turn) - half
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roll_axis() -> AxisConfig {
        AxisConfig {
            name: "Z".to_string(),
            pulses_per_degree: 500,
            range: AxisRange::new(0, 180000),
            extended_range: None,
            limit: LimitPolicy::Wrap { turn: 180000 },
            motion: Motion::ShortestPath {
                full_turn: 180000,
                rehome_beyond: None,
            },
            speed: 5,
        }
    }

    fn light_axis() -> AxisConfig {
        AxisConfig {
            name: "U".to_string(),
            pulses_per_degree: 500,
            range: AxisRange::new(-90000, 90000),
            extended_range: Some(AxisRange::new(-134217728, 134217727)),
            limit: LimitPolicy::Saturate,
            motion: Motion::Absolute,
            speed: 4,
        }
    }

    #[test]
    fn shortest_delta_prefers_shorter_arc() {
        assert_eq!(shortest_delta(170000, 10000, 180000), 20000);
        assert_eq!(shortest_delta(10000, 170000, 180000), -20000);
        assert_eq!(shortest_delta(10000, 170000 + 180000 * 3, 180000), -20000);
        assert_eq!(shortest_delta(-5000, 5000, 180000), 10000);
        assert_eq!(shortest_delta(42, 42, 180000), 0);
    }

    #[test]
    fn half_turn_tie_goes_backwards() {
        assert_eq!(shortest_delta(0, 90000, 180000), -90000);
        assert_eq!(shortest_delta(90000, 0, 180000), -90000);
    }

    #[test]
    fn clip_limits_and_flags() {
        assert_eq!(
            clip(50000, -45000, 45000),
            Clip {
                value: 45000,
                limited: true
            }
        );
        assert_eq!(
            clip(-50000, -45000, 45000),
            Clip {
                value: -45000,
                limited: true
            }
        );
        assert_eq!(
            clip(100, -45000, 45000),
            Clip {
                value: 100,
                limited: false
            }
        );
    }

    #[test]
    fn speed_outside_range_is_clamped() {
        assert_eq!(clip_speed(-3), (0, true));
        assert_eq!(clip_speed(12), (9, true));
        assert_eq!(clip_speed(i64::MAX), (9, true));
        for speed in 0..=9 {
            assert_eq!(clip_speed(speed), (speed as u8, false));
        }
    }

    #[test]
    fn degree_conversion_does_not_drift() {
        for ppd in [500, 1000] {
            for pulses in (-45000..=45000).step_by(37) {
                let degrees = pulses_to_degrees(pulses, ppd);
                let back = degrees_to_pulses(degrees, ppd);
                assert!((back - pulses).abs() <= 1, "{pulses} -> {degrees} -> {back}");
            }
        }
        assert_eq!(degrees_to_pulses(12.3456, 1000), 12346);
        assert_eq!(degrees_to_pulses(-0.0034, 500), -2);
    }

    #[test]
    fn wrap_policy_folds_into_one_turn() {
        let axis = roll_axis();
        assert_eq!(axis.limit(190000, false).value, 10000);
        assert_eq!(axis.limit(-10000, false).value, 170000);
        assert!(!axis.limit(-10000, false).limited);
    }

    #[test]
    fn extended_range_widens_limits() {
        let axis = light_axis();
        assert_eq!(axis.limit(150000, false).value, 90000);
        assert_eq!(axis.limit(150000, true).value, 150000);
    }

    #[test]
    fn rotating_axis_degrees_within_one_turn() {
        let axis = roll_axis();
        assert_eq!(axis.to_degrees(190000), 20.0);
        assert_eq!(axis.to_degrees(-500), 359.0);
        assert_eq!(light_axis().to_degrees(-500), -1.0);
    }
}
