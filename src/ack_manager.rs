/// Retransmission timer bookkeeping and retry policy
///
/// Exactly one retransmission timer exists per sending direction. The
/// external timer facility is dumb: it fires once per `start` unless
/// stopped first. `RetransmitTimer` wraps it with the protocol's rules:
/// starting while running cancels the previous instance, stopping an idle
/// timer is a no-op, and the deadline is always one fixed round-trip time.
use tracing::trace;

use crate::session::{Side, TimerDriver};

/// At-most-one retransmission timer for one sending direction
#[derive(Debug)]
pub struct RetransmitTimer {
    side: Side,
    rtt_ticks: u64,
    running: bool,
}

impl RetransmitTimer {
    pub fn new(side: Side, rtt_ticks: u64) -> Self {
        Self {
            side,
            rtt_ticks,
            running: false,
        }
    }

    /// Start (or restart) the timer, cancelling any running instance first
    pub fn start<T: TimerDriver>(&mut self, timer: &mut T) {
        if self.running {
            timer.stop(self.side);
        }
        trace!(side = ?self.side, ticks = self.rtt_ticks, "starting retransmission timer");
        timer.start(self.side, self.rtt_ticks);
        self.running = true;
    }

    /// Stop the timer; a no-op when none is running
    pub fn stop<T: TimerDriver>(&mut self, timer: &mut T) {
        if self.running {
            trace!(side = ?self.side, "stopping retransmission timer");
            timer.stop(self.side);
            self.running = false;
        }
    }

    /// Record that the started timer fired. The timer is not self-rearming;
    /// the state machine restarts it explicitly after a retransmission.
    pub fn on_fired(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// Retry ceiling for the oldest unacknowledged frame
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// True once `attempts` retransmissions have been spent - the next
    /// timeout is a fatal transport failure, not another resend
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_retries
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::TimerLog;
    use crate::simulator::TimerOp;

    #[test]
    fn test_restart_cancels_previous_instance() {
        let mut log = TimerLog::default();
        let mut timer = RetransmitTimer::new(Side::A, 16);

        timer.start(&mut log);
        timer.start(&mut log);

        assert_eq!(
            log.ops,
            vec![
                TimerOp::Start(Side::A, 16),
                TimerOp::Stop(Side::A),
                TimerOp::Start(Side::A, 16),
            ]
        );
        assert!(timer.is_running());
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let mut log = TimerLog::default();
        let mut timer = RetransmitTimer::new(Side::A, 16);

        timer.stop(&mut log);
        assert!(log.ops.is_empty());

        timer.start(&mut log);
        timer.stop(&mut log);
        timer.stop(&mut log);
        assert_eq!(
            log.ops,
            vec![TimerOp::Start(Side::A, 16), TimerOp::Stop(Side::A)]
        );
    }

    #[test]
    fn test_fired_clears_running_without_driver_call() {
        let mut log = TimerLog::default();
        let mut timer = RetransmitTimer::new(Side::A, 16);

        timer.start(&mut log);
        timer.on_fired();
        assert!(!timer.is_running());

        // restart after firing must not emit a stale stop
        timer.start(&mut log);
        assert_eq!(
            log.ops,
            vec![TimerOp::Start(Side::A, 16), TimerOp::Start(Side::A, 16)]
        );
    }

    #[test]
    fn test_retry_exhaustion_boundary() {
        let policy = RetryPolicy::new(3);
        assert!(!policy.exhausted(0));
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
        assert!(policy.exhausted(4));
    }
}
