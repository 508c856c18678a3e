use clap::Parser;

use aries::{DEFAULT_HOST, DEFAULT_PORT};

// Aliases keep clap from treating the lists as repeated arguments.
pub type Angles = Vec<f64>;
pub type Speeds = Vec<i64>;

/// Drive an ARIES / LYNX stage controller.
///
/// Without a command or position, prints the present position.
#[derive(Debug, Parser)]
#[command(name = "aries", version)]
pub struct Args {
    /// Raw command sent to the controller, e.g. `RPS1/4/90000/1`.
    #[arg(conflicts_with = "set_position")]
    pub command: Option<String>,

    /// Controller IP address.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Controller port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Move every axis, in degrees, separated with `/`, e.g. `-45/90/0/10`.
    #[arg(short, long, value_parser = parse_angles, allow_hyphen_values = true)]
    pub set_position: Option<Angles>,

    /// Speed level per axis, separated with `/`, e.g. `5/5/7/4`.
    #[arg(long, value_parser = parse_speeds)]
    pub speed: Option<Speeds>,

    /// Block until every axis has stopped after the move.
    #[arg(long, requires = "set_position")]
    pub wait: bool,

    /// Give up waiting after this many seconds.
    #[arg(long, requires = "wait")]
    pub max_wait: Option<f64>,
}

fn parse_angles(value: &str) -> Result<Angles, String> {
    aries::parse_angles(value).map_err(|e| e.to_string())
}

fn parse_speeds(value: &str) -> Result<Speeds, String> {
    aries::parse_speeds(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_factory_address() {
        let args = Args::try_parse_from(["aries", "RDP1"]).unwrap();
        assert_eq!(args.command.as_deref(), Some("RDP1"));
        assert_eq!(args.host, "192.168.1.20");
        assert_eq!(args.port, 12321);
        assert!(args.set_position.is_none());
    }

    #[test]
    fn parses_position_and_speed_lists() {
        let args = Args::try_parse_from([
            "aries",
            "--host",
            "10.0.0.5",
            "--port",
            "2000",
            "--set-position",
            "-45/90/0/10",
            "--speed",
            "5/5/7/4",
            "--wait",
        ])
        .unwrap();

        assert_eq!(args.host, "10.0.0.5");
        assert_eq!(args.port, 2000);
        assert_eq!(args.set_position, Some(vec![-45.0, 90.0, 0.0, 10.0]));
        assert_eq!(args.speed, Some(vec![5, 5, 7, 4]));
        assert!(args.wait);
    }

    #[test]
    fn rejects_fractional_speed() {
        assert!(Args::try_parse_from(["aries", "--speed", "5/5.5/7/4"]).is_err());
    }

    #[test]
    fn command_conflicts_with_position() {
        assert!(Args::try_parse_from(["aries", "REM", "--set-position", "0/0/0/0"]).is_err());
        assert!(Args::try_parse_from(["aries", "--wait"]).is_err());
    }
}
