use std::thread;
use std::time::Duration;

use utilities::line_tcp::LineTcpStream;
use utilities::poll::{poll_until, PollOutcome};

use crate::axis::{clip_speed, shortest_delta, AxisConfig, Motion};
use crate::command::{Command, ReplyMode, Response};
use crate::config::StageConfig;
use crate::error::{AriesError, Result};
use crate::transport::Transport;

/// Synchronous client for one ARIES / LYNX controller.
///
/// Axes are addressed by their 1-based controller index. Move commands
/// return once the controller has acknowledged them and the settle interval
/// has passed; they do not wait for the motion to finish. Use
/// [`Aries::wait_until_stopped`] when completion matters, or configure
/// [`ReplyMode::OnCompletion`].
///
/// Dropping the client closes the connection. With
/// [`StageConfig::stop_on_drop`] set, a still moving stage is stopped first.
/// Prefer [`Aries::shutdown`], which reports errors.
pub struct Aries<T: Transport = LineTcpStream> {
    transport: T,
    config: StageConfig,
    speeds: Vec<u8>,
    extended: Vec<bool>,
    finished: bool,
}

impl Aries<LineTcpStream> {
    pub fn connect(host: &str, port: u16, config: StageConfig) -> Result<Self> {
        let mut stream = LineTcpStream::new(host, port, config.connect_timeout());

        tracing::info!(addr = %stream.peer(), "Connecting");
        stream.open().map_err(|source| AriesError::Connection {
            addr: stream.peer(),
            source,
        })?;
        tracing::info!(addr = %stream.peer(), "Connected");

        Self::with_transport(stream, config)
    }
}

impl<T: Transport> Aries<T> {
    pub fn with_transport(transport: T, config: StageConfig) -> Result<Self> {
        config.validate().map_err(AriesError::invalid_input)?;

        let speeds = config
            .axes
            .iter()
            .map(|axis| clip_speed(axis.speed as i64).0)
            .collect();
        let extended = vec![false; config.axes.len()];

        Ok(Self {
            transport,
            config,
            speeds,
            extended,
            finished: false,
        })
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn axis_count(&self) -> usize {
        self.config.axes.len()
    }

    pub fn is_open(&self) -> bool {
        !self.finished && self.transport.is_open()
    }

    fn axis(&self, axis: usize) -> Result<&AxisConfig> {
        axis.checked_sub(1)
            .and_then(|index| self.config.axes.get(index))
            .ok_or_else(|| {
                AriesError::invalid_input(format!(
                    "axis {} does not exist (1..={})",
                    axis,
                    self.axis_count()
                ))
            })
    }

    fn check_len(&self, what: &str, len: usize) -> Result<()> {
        if len != self.axis_count() {
            return Err(AriesError::invalid_input(format!(
                "{} needs {} values, got {}",
                what,
                self.axis_count(),
                len
            )));
        }
        Ok(())
    }

    /// Sends `command` verbatim and returns the response line.
    pub fn raw_command(&mut self, command: &str) -> Result<String> {
        let timeout = self.config.command_timeout();
        self.raw_command_with_timeout(command, timeout)
    }

    pub fn raw_command_with_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String> {
        if self.finished {
            return Err(AriesError::Closed);
        }

        let response = match self.transport.exchange(command, timeout) {
            Ok(response) => response,
            Err(e) => {
                // The reply may still arrive and would pair with the next command.
                self.transport.close();
                return Err(AriesError::from_transport(e, command, timeout));
            }
        };

        tracing::debug!(command, response = %response.trim_end(), "Exchange");
        Ok(response)
    }

    fn execute(&mut self, command: Command) -> Result<Response> {
        let line = command.to_string();
        let response = self.raw_command(&line)?;
        Response::new(line, response).check()
    }

    pub fn axis_position(&mut self, axis: usize) -> Result<i64> {
        self.axis(axis)?;
        self.execute(Command::ReadPosition { axis })?.pulses()
    }

    pub fn axis_degrees(&mut self, axis: usize) -> Result<f64> {
        let pulses = self.axis_position(axis)?;
        Ok(self.axis(axis)?.to_degrees(pulses))
    }

    pub fn position_by_pulse(&mut self) -> Result<Vec<i64>> {
        (1..=self.axis_count())
            .map(|axis| self.axis_position(axis))
            .collect()
    }

    /// Positions in degrees; rotating axes are reported within `[0, 360)`.
    pub fn position(&mut self) -> Result<Vec<f64>> {
        let pulses = self.position_by_pulse()?;
        Ok(self
            .config
            .axes
            .iter()
            .zip(pulses)
            .map(|(axis, pulses)| axis.to_degrees(pulses))
            .collect())
    }

    /// Moves one axis and returns the pulse target after limiting.
    pub fn move_axis(&mut self, axis: usize, pulses: i64) -> Result<i64> {
        let target = self.limit(axis, pulses)?;
        self.drive(axis, target)?;
        Ok(target)
    }

    pub fn move_axis_degrees(&mut self, axis: usize, degrees: f64) -> Result<i64> {
        let pulses = self.degrees_to_pulses(axis, degrees)?;
        self.move_axis(axis, pulses)
    }

    /// Moves every axis to `targets`, skipping axes already in place.
    ///
    /// Returns the pulse targets after limiting.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn set_position_by_pulse(&mut self, targets: &[i64]) -> Result<Vec<i64>> {
        self.check_len("position", targets.len())?;

        let targets = targets
            .iter()
            .enumerate()
            .map(|(index, &pulses)| self.limit(index + 1, pulses))
            .collect::<Result<Vec<_>>>()?;

        let last = self.position_by_pulse()?;

        for (index, (&target, &current)) in targets.iter().zip(&last).enumerate() {
            if target == current {
                continue;
            }
            self.drive(index + 1, target)?;
        }

        Ok(targets)
    }

    pub fn set_position(&mut self, degrees: &[f64]) -> Result<Vec<i64>> {
        self.check_len("position", degrees.len())?;

        let pulses = degrees
            .iter()
            .enumerate()
            .map(|(index, &degrees)| self.degrees_to_pulses(index + 1, degrees))
            .collect::<Result<Vec<_>>>()?;

        self.set_position_by_pulse(&pulses)
    }

    fn degrees_to_pulses(&self, axis: usize, degrees: f64) -> Result<i64> {
        if !degrees.is_finite() {
            return Err(AriesError::invalid_input(format!(
                "axis {}: {} is not a finite angle",
                axis, degrees
            )));
        }
        Ok(self.axis(axis)?.to_pulses(degrees))
    }

    fn limit(&self, axis: usize, pulses: i64) -> Result<i64> {
        let config = self.axis(axis)?;
        Ok(config.limit(pulses, self.extended[axis - 1]).value)
    }

    fn drive(&mut self, axis: usize, target: i64) -> Result<()> {
        let motion = self.axis(axis)?.motion;
        let speed = self.speeds[axis - 1];
        let reply = self.config.move_reply;

        let command = match motion {
            Motion::Absolute => Command::MoveAbsolute {
                axis,
                speed,
                pulses: target,
                reply,
            },
            Motion::ShortestPath {
                full_turn,
                rehome_beyond,
            } => {
                let current = self.rotary_position(axis, rehome_beyond)?;
                let delta = shortest_delta(current, target, full_turn);
                if delta == 0 {
                    tracing::debug!(axis, current, target, "Already in place");
                    return Ok(());
                }
                Command::MoveRelative {
                    axis,
                    speed,
                    delta,
                    reply,
                }
            }
        };

        self.execute(command)?;
        thread::sleep(self.config.settle_interval());

        Ok(())
    }

    /// Reads a rotating axis right before a relative move, homing it first
    /// when its counter is close to overflowing.
    fn rotary_position(&mut self, axis: usize, rehome_beyond: Option<i64>) -> Result<i64> {
        let current = self.axis_position(axis)?;

        match rehome_beyond {
            Some(limit) if !(-limit < current && current < limit) => {
                tracing::warn!(axis, current, "Counter near overflow, homing before move");
                self.execute(Command::Origin {
                    axis,
                    speed: self.speeds[axis - 1],
                    reply: ReplyMode::OnCompletion,
                })?;
                self.axis_position(axis)
            }
            _ => Ok(current),
        }
    }

    pub fn speeds(&self) -> &[u8] {
        &self.speeds
    }

    /// Sets the speed level of one axis, clamped into `0..=9`.
    pub fn set_speed(&mut self, axis: usize, speed: i64) -> Result<u8> {
        self.axis(axis)?;
        let (speed, _) = clip_speed(speed);
        self.speeds[axis - 1] = speed;
        Ok(speed)
    }

    pub fn set_speeds(&mut self, speeds: &[i64]) -> Result<()> {
        self.check_len("speed", speeds.len())?;

        for (slot, &speed) in self.speeds.iter_mut().zip(speeds) {
            *slot = clip_speed(speed).0;
        }
        Ok(())
    }

    pub fn extended_range(&self, axis: usize) -> Result<bool> {
        self.axis(axis)?;
        Ok(self.extended[axis - 1])
    }

    /// Switches an axis between its normal and extended range.
    pub fn set_extended_range(&mut self, axis: usize, enabled: bool) -> Result<()> {
        let has_extended = self.axis(axis)?.extended_range.is_some();
        if enabled && !has_extended {
            return Err(AriesError::invalid_input(format!(
                "axis {} has no extended range",
                axis
            )));
        }
        self.extended[axis - 1] = enabled;
        Ok(())
    }

    /// True when every axis reports the stationary status.
    pub fn is_stopped(&mut self) -> Result<bool> {
        let mut stopped = true;

        for axis in 1..=self.axis_count() {
            let stationary = self.execute(Command::ReadStatus { axis })?.is_stationary()?;
            if !stationary {
                tracing::trace!(axis, "Axis moving");
            }
            stopped &= stationary;
        }

        Ok(stopped)
    }

    /// Polls [`Aries::is_stopped`] every poll interval. Without `max_wait`
    /// this blocks until the hardware reports stationary.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn wait_until_stopped(&mut self, max_wait: Option<Duration>) -> Result<()> {
        let interval = self.config.poll_interval();

        match poll_until(interval, max_wait, || self.is_stopped())? {
            PollOutcome::Ready => Ok(()),
            PollOutcome::TimedOut(waited) => Err(AriesError::WaitTimeout { waited }),
        }
    }

    /// Decelerates every axis to a stop, or stops it at once.
    ///
    /// A failure on one axis does not keep the others from being stopped;
    /// the first error is returned.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn stop_all(&mut self, immediate: bool) -> Result<()> {
        let mut first_error = None;

        for axis in 1..=self.axis_count() {
            if let Err(e) = self.execute(Command::Stop { axis, immediate }) {
                tracing::warn!(axis, "Stop failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    pub fn unlock_emergency_stop(&mut self) -> Result<()> {
        self.execute(Command::ReleaseEmergencyStop)?;
        Ok(())
    }

    /// Homes every axis. Returns once the commands are accepted.
    pub fn reset_to_origin(&mut self) -> Result<()> {
        let axes: Vec<usize> = (1..=self.axis_count()).collect();
        self.reset_axes(&axes)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub fn reset_axes(&mut self, axes: &[usize]) -> Result<()> {
        for &axis in axes {
            self.axis(axis)?;
        }

        let reply = self.config.move_reply;
        for &axis in axes {
            let speed = self.speeds[axis - 1];
            self.execute(Command::Origin { axis, speed, reply })?;
        }
        Ok(())
    }

    /// Closes the connection, first stopping a moving stage when
    /// `stop_motion` is set. The connection is released even if stopping
    /// fails.
    pub fn shutdown(mut self, stop_motion: bool) -> Result<()> {
        self.finish(stop_motion)
    }

    fn finish(&mut self, stop_motion: bool) -> Result<()> {
        if self.finished {
            return Ok(());
        }

        let result = if stop_motion {
            self.stop_if_moving()
        } else {
            Ok(())
        };

        self.finished = true;
        self.transport.close();
        tracing::info!("Connection closed");

        result
    }

    /// Stops the stage unless every axis reports stationary. An unreadable
    /// status counts as moving.
    fn stop_if_moving(&mut self) -> Result<()> {
        match self.is_stopped() {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!("Stage still moving, stopping all axes");
                self.stop_all(true)
            }
            Err(e) => {
                tracing::warn!("Stage status unknown ({}), stopping all axes", e);
                if self.stop_all(true).is_err() {
                    tracing::error!("Stage may still be moving");
                }
                Err(e)
            }
        }
    }
}

impl<T: Transport> Drop for Aries<T> {
    fn drop(&mut self) {
        let stop_motion = self.config.stop_on_drop;
        if let Err(e) = self.finish(stop_motion) {
            tracing::warn!("Error while closing: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedController;

    fn fast(mut config: StageConfig) -> StageConfig {
        config.settle_interval_ms = 0;
        config.poll_interval_ms = 1;
        config
    }

    fn client(config: StageConfig) -> Aries<SimulatedController> {
        let sim = SimulatedController::new(config.axes.len());
        Aries::with_transport(sim, fast(config)).unwrap()
    }

    fn moves(client: &Aries<SimulatedController>) -> Vec<String> {
        client
            .transport()
            .history()
            .iter()
            .filter(|line| line.starts_with("APS") || line.starts_with("RPS"))
            .cloned()
            .collect()
    }

    #[test]
    fn written_position_reads_back() {
        let mut aries = client(StageConfig::default());

        aries.set_position_by_pulse(&[-12000, 45000, 30000, 500]).unwrap();
        assert_eq!(
            aries.position_by_pulse().unwrap(),
            vec![-12000, 45000, 30000, 500]
        );

        for axis in 1..=4 {
            aries.move_axis(axis, 1000).unwrap();
            assert_eq!(aries.axis_position(axis).unwrap(), 1000);
        }
    }

    #[test]
    fn out_of_range_targets_are_clamped() {
        let mut aries = client(StageConfig::default());

        let targets = aries
            .set_position_by_pulse(&[99999, -5, 0, 100000])
            .unwrap();
        assert_eq!(targets, vec![45000, 0, 0, 90000]);
        assert_eq!(moves(&aries), vec!["APS1/5/45000/1", "APS4/4/90000/1"]);
    }

    #[test]
    fn extended_range_lifts_light_axis_limit() {
        let mut aries = client(StageConfig::default());

        assert!(aries.set_extended_range(1, true).is_err());
        aries.set_extended_range(4, true).unwrap();
        assert!(aries.extended_range(4).unwrap());

        assert_eq!(aries.move_axis(4, 200000).unwrap(), 200000);
        aries.set_extended_range(4, false).unwrap();
        assert_eq!(aries.move_axis(4, 200000).unwrap(), 90000);
    }

    #[test]
    fn unchanged_axes_are_not_moved() {
        let mut aries = client(StageConfig::default());
        aries.set_position_by_pulse(&[100, 200, 0, 400]).unwrap();
        aries.transport_mut().clear_history();

        aries.set_position_by_pulse(&[100, 250, 0, 400]).unwrap();
        assert_eq!(moves(&aries), vec!["APS2/5/250/1"]);
    }

    #[test]
    fn rotating_axis_takes_shorter_arc() {
        let mut aries = client(StageConfig::default());
        aries.transport_mut().set_position(3, 170000);

        aries.move_axis(3, 10000).unwrap();
        assert_eq!(moves(&aries), vec!["RPS3/7/20000/1"]);
        assert_eq!(aries.axis_position(3).unwrap(), 190000);
        assert_eq!(aries.axis_degrees(3).unwrap(), 20.0);
    }

    #[test]
    fn rotating_axis_rereads_before_move() {
        let mut aries = client(StageConfig::default());
        aries.transport_mut().set_position(3, 170000);
        aries.transport_mut().clear_history();

        aries.set_position_by_pulse(&[0, 0, 10000, 0]).unwrap();

        let history = aries.transport().history();
        let rps = history.iter().position(|l| l.starts_with("RPS3")).unwrap();
        assert_eq!(history[rps - 1], "RDP3");
        assert_eq!(history[rps], "RPS3/7/20000/1");
    }

    #[test]
    fn full_turn_away_issues_no_move() {
        let mut aries = client(StageConfig::default());
        aries.transport_mut().set_position(3, 180000);
        aries.transport_mut().clear_history();

        aries.set_position_by_pulse(&[0, 0, 0, 0]).unwrap();
        assert!(moves(&aries).is_empty());
    }

    #[test]
    fn counter_near_overflow_homes_first() {
        let mut aries = client(StageConfig::default());
        aries.transport_mut().set_position(3, 134_100_000);
        aries.transport_mut().clear_history();

        aries.move_axis(3, 500).unwrap();

        let history = aries.transport().history();
        assert_eq!(history, ["RDP3", "ORG3/7/0", "RDP3", "RPS3/7/500/1"]);
    }

    #[test]
    fn degrees_round_to_nearest_pulse() {
        let mut aries = client(StageConfig::default());

        let targets = aries.set_position(&[-10.0011, 45.5, 20.0, -1.0]).unwrap();
        assert_eq!(targets, vec![-5001, 45500, 10000, -500]);

        let position = aries.position().unwrap();
        assert_eq!(position, vec![-10.002, 45.5, 20.0, -1.0]);

        assert!(aries.set_position(&[f64::NAN, 0.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn wrong_tuple_length_sends_nothing() {
        let mut aries = client(StageConfig::default());

        let err = aries.set_position_by_pulse(&[0, 0, 0]).unwrap_err();
        assert!(matches!(err, AriesError::InvalidInput { .. }));
        assert!(aries.set_speeds(&[1, 2]).is_err());
        assert!(aries.transport().history().is_empty());
    }

    #[test]
    fn speeds_are_clamped_per_axis() {
        let mut aries = client(StageConfig::default());
        assert_eq!(aries.speeds(), [5, 5, 7, 4]);

        aries.set_speeds(&[-1, 3, 12, 9]).unwrap();
        assert_eq!(aries.speeds(), [0, 3, 9, 9]);

        assert_eq!(aries.set_speed(2, 100).unwrap(), 9);
        assert!(aries.set_speed(5, 1).is_err());

        aries.move_axis(1, 10).unwrap();
        assert_eq!(moves(&aries), vec!["APS1/0/10/1"]);
    }

    #[test]
    fn stopped_only_when_every_axis_is_stationary() {
        let mut aries = client(StageConfig::default());
        assert!(aries.is_stopped().unwrap());

        aries.transport_mut().set_moving(4, 1);
        assert!(!aries.is_stopped().unwrap());
        assert!(aries.is_stopped().unwrap());
    }

    #[test]
    fn wait_until_stopped_polls_and_gives_up() {
        let mut aries = client(StageConfig::default());

        aries.transport_mut().set_moving(2, 3);
        aries.wait_until_stopped(None).unwrap();

        aries.transport_mut().set_moving(1, u32::MAX);
        let err = aries
            .wait_until_stopped(Some(Duration::from_millis(20)))
            .unwrap_err();
        assert!(matches!(err, AriesError::WaitTimeout { .. }));
    }

    #[test]
    fn stop_and_home_commands() {
        let mut aries = client(StageConfig::default());

        aries.stop_all(false).unwrap();
        aries.stop_all(true).unwrap();
        aries.reset_axes(&[2, 3]).unwrap();
        assert!(aries.reset_axes(&[9]).is_err());

        assert_eq!(
            aries.transport().history(),
            [
                "STP1/0", "STP2/0", "STP3/0", "STP4/0", "STP1/1", "STP2/1", "STP3/1", "STP4/1",
                "ORG2/5/1", "ORG3/7/1",
            ]
        );
    }

    #[test]
    fn emergency_stop_blocks_moves_until_unlocked() {
        let mut aries = client(StageConfig::default());
        aries.transport_mut().trip_emergency_stop();

        let err = aries.move_axis(1, 100).unwrap_err();
        assert!(matches!(err, AriesError::Rejected { .. }));

        aries.unlock_emergency_stop().unwrap();
        aries.move_axis(1, 100).unwrap();
        assert_eq!(aries.axis_position(1).unwrap(), 100);
    }

    #[test]
    fn completion_reply_mode_is_sent() {
        let mut config = StageConfig::default();
        config.move_reply = ReplyMode::OnCompletion;
        let mut aries = client(config);

        aries.move_axis(2, 100).unwrap();
        aries.reset_to_origin().unwrap();
        let history = aries.transport().history();
        assert_eq!(history[0], "APS2/5/100/0");
        assert_eq!(&history[1..], ["ORG1/5/0", "ORG2/5/0", "ORG3/7/0", "ORG4/4/0"]);
    }

    #[test]
    fn raw_commands_pass_through() {
        let mut aries = client(StageConfig::default());
        aries.transport_mut().set_position(2, 777);

        assert_eq!(aries.raw_command("RDP2").unwrap(), "C\tRDP2\t777");
        assert!(aries.raw_command("XYZ").unwrap().starts_with('E'));
    }

    #[test]
    fn shutdown_stops_moving_stage_once() {
        let mut aries = client(StageConfig::default());
        aries.transport_mut().set_moving(1, u32::MAX);
        aries.finish(true).unwrap();

        let stops = aries
            .transport()
            .history()
            .iter()
            .filter(|line| line.ends_with("/1") && line.starts_with("STP"))
            .count();
        assert_eq!(stops, 4);
        assert!(!aries.is_open());

        aries.finish(true).unwrap();
        assert!(matches!(aries.raw_command("REM"), Err(AriesError::Closed)));
    }

    #[test]
    fn unreadable_status_still_stops_stage() {
        let mut aries = client(StageConfig::default());
        aries.transport_mut().garble_status(3);

        let err = aries.finish(true).unwrap_err();
        assert!(matches!(err, AriesError::MalformedResponse { .. }));
        assert_eq!(
            aries.transport().history(),
            ["STR1", "STR2", "STR3", "STP1/1", "STP2/1", "STP3/1", "STP4/1"]
        );
        assert!(!aries.is_open());
    }

    #[test]
    fn shutdown_leaves_stationary_stage_alone() {
        let aries = client(StageConfig::default());
        aries.shutdown(true).unwrap();
    }
}
