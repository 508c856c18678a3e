use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    TimedOut(Duration),
}

/// Calls `ready` every `interval` until it returns `true`.
///
/// With `limit` set, gives up once that much time has passed since the first
/// check. Errors from `ready` end the loop immediately.
pub fn poll_until<E>(
    interval: Duration,
    limit: Option<Duration>,
    mut ready: impl FnMut() -> Result<bool, E>,
) -> Result<PollOutcome, E> {
    let start_time = Instant::now();

    loop {
        if ready()? {
            return Ok(PollOutcome::Ready);
        }

        let elapsed = start_time.elapsed();
        let pause = match limit {
            Some(limit) if elapsed >= limit => return Ok(PollOutcome::TimedOut(elapsed)),
            Some(limit) => interval.min(limit - elapsed),
            None => interval,
        };

        std::thread::sleep(pause);
    }
}
