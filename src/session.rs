/// Session configuration and collaborator boundaries
///
/// The core performs no I/O and keeps no process-wide state. Each direction
/// of a link is a session object built from an `ArqConfig`; the channel,
/// the timer facility, and the application are traits the driver implements
/// and passes into every entry point. Entry points are invoked one at a
/// time and run to completion - the core assumes no re-entrancy.
use tracing::warn;

use crate::contracts::{Frame, Message, Payload};
use crate::errors::{ArqError, Result};
use crate::gbn::{GbnReceiver, GbnTransmitter};
use crate::receiver::{Receiver, ReceiverCounters};
use crate::transmitter::{SenderCounters, Transmitter};

/// The two ends of a link: A originates data, B acknowledges and delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}

/// Outbound channel boundary: hands a frame to the unreliable medium
///
/// The medium may drop, corrupt, or delay the frame; it never duplicates
/// spontaneously and never reorders beyond bounded delay jitter.
pub trait Channel {
    fn send(&mut self, side: Side, frame: Frame);
}

/// External timer facility
///
/// `start` arms a one-shot timer for `side` that fires after `ticks` unless
/// stopped or restarted first. The protocol-level rules (cancel before
/// restart, at most one pending timer per side) are enforced by
/// `ack_manager::RetransmitTimer`, not by implementors.
pub trait TimerDriver {
    fn start(&mut self, side: Side, ticks: u64);
    fn stop(&mut self, side: Side);
}

/// Application boundary on the receiving side: invoked once per payload,
/// strictly in submission order
pub trait DeliverySink {
    fn deliver(&mut self, payload: Payload);
}

/// Retransmission strategy, selected at session configuration time
///
/// The two strategies expose the identical capability set and must never be
/// mixed within one session: a Selective-Repeat sender paired with a
/// Go-Back-N receiver (or vice versa) has undefined behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArqMode {
    /// Per-frame acknowledgment; timeout resends only the oldest
    /// unacknowledged frame
    SelectiveRepeat,
    /// Cumulative acknowledgment; timeout resends every outstanding frame
    GoBackN,
}

/// Receiver behavior for corrupted arrivals, whose sequence number cannot
/// be trusted (Selective Repeat only; the Go-Back-N receiver always re-acks
/// the last in-order frame)
///
/// Retransmissions of already-delivered frames are not governed by this
/// policy: they arrive intact behind the window and are always re-acked
/// with their own sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionPolicy {
    /// Discard with no acknowledgment; recovery waits for the sender's
    /// retransmission
    SilentDrop,
    /// Discard but re-ack the last in-order frame
    DuplicateAck,
}

/// Per-session ARQ configuration
#[derive(Debug, Clone)]
pub struct ArqConfig {
    pub mode: ArqMode,
    pub window_size: usize,
    pub seq_space: i32,
    pub rtt_ticks: u64,
    pub max_retries: u32,
    pub corruption_policy: CorruptionPolicy,
}

impl Default for ArqConfig {
    fn default() -> Self {
        Self {
            mode: ArqMode::SelectiveRepeat,
            window_size: crate::WINDOW_SIZE,
            seq_space: crate::SEQ_SPACE,
            rtt_ticks: crate::RTT_TICKS,
            max_retries: crate::MAX_RETRANSMIT_ATTEMPTS,
            corruption_policy: CorruptionPolicy::SilentDrop,
        }
    }
}

impl ArqConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: ArqMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_seq_space(mut self, seq_space: i32) -> Self {
        self.seq_space = seq_space;
        self
    }

    pub fn with_rtt_ticks(mut self, rtt_ticks: u64) -> Self {
        self.rtt_ticks = rtt_ticks;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_corruption_policy(mut self, policy: CorruptionPolicy) -> Self {
        self.corruption_policy = policy;
        self
    }

    /// Validate the configuration
    ///
    /// Rejects combinations no ARQ variant can run with. Two hazardous but
    /// historically valid combinations are accepted with a warning instead:
    /// a sequence space smaller than twice the window (a retransmitted old
    /// frame can be mistaken for new data under wraparound), and a sequence
    /// space that is not a multiple of the window (the `seqnum % window_size`
    /// slot mapping lets two in-flight frames share a sender buffer slot
    /// when the window crosses a wrap). The defaults (7, 6) trip both.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(ArqError::InvalidConfig(
                "window size must be at least 1".to_string(),
            ));
        }
        if self.seq_space <= self.window_size as i32 {
            return Err(ArqError::InvalidConfig(format!(
                "sequence space {} must exceed window size {}",
                self.seq_space, self.window_size
            )));
        }
        if self.rtt_ticks == 0 {
            return Err(ArqError::InvalidConfig(
                "round-trip time must be at least 1 tick".to_string(),
            ));
        }

        if self.mode == ArqMode::SelectiveRepeat && self.seq_space < 2 * self.window_size as i32 {
            warn!(
                seq_space = self.seq_space,
                window_size = self.window_size,
                "sequence space below 2x window size: old and new frames can alias under wraparound"
            );
        }
        if self.seq_space % self.window_size as i32 != 0 {
            warn!(
                seq_space = self.seq_space,
                window_size = self.window_size,
                "sequence space not a multiple of window size: a wrap-crossing window maps two in-flight frames to one sender slot"
            );
        }

        Ok(())
    }
}

enum SenderMachine {
    SelectiveRepeat(Transmitter),
    GoBackN(GbnTransmitter),
}

/// Sending side (A) of one link
///
/// Owns the sender window state machine for the configured strategy.
pub struct SenderSession {
    machine: SenderMachine,
}

impl SenderSession {
    /// Create the sending side of a session
    ///
    /// # Errors
    /// Returns `ArqError::InvalidConfig` if validation rejects the
    /// configuration.
    pub fn new(config: &ArqConfig) -> Result<Self> {
        config.validate()?;
        let machine = match config.mode {
            ArqMode::SelectiveRepeat => SenderMachine::SelectiveRepeat(Transmitter::new(config)),
            ArqMode::GoBackN => SenderMachine::GoBackN(GbnTransmitter::new(config)),
        };
        Ok(Self { machine })
    }

    /// Accept one application message, or reject it with `WindowFull`
    pub fn submit<C: Channel, T: TimerDriver>(
        &mut self,
        message: &Message,
        channel: &mut C,
        timer: &mut T,
    ) -> Result<()> {
        match &mut self.machine {
            SenderMachine::SelectiveRepeat(tx) => tx.submit(message, channel, timer),
            SenderMachine::GoBackN(tx) => tx.submit(message, channel, timer),
        }
    }

    /// Consume one arriving acknowledgment frame
    pub fn on_frame<T: TimerDriver>(&mut self, frame: &Frame, timer: &mut T) {
        match &mut self.machine {
            SenderMachine::SelectiveRepeat(tx) => tx.on_frame(frame, timer),
            SenderMachine::GoBackN(tx) => tx.on_frame(frame, timer),
        }
    }

    /// Handle the retransmission timer firing
    ///
    /// # Errors
    /// Returns `ArqError::RetryLimitExceeded` when the oldest
    /// unacknowledged frame has spent its retry budget - a fatal transport
    /// failure the session owner must act on.
    pub fn on_timeout<C: Channel, T: TimerDriver>(
        &mut self,
        channel: &mut C,
        timer: &mut T,
    ) -> Result<()> {
        match &mut self.machine {
            SenderMachine::SelectiveRepeat(tx) => tx.on_timeout(channel, timer),
            SenderMachine::GoBackN(tx) => tx.on_timeout(channel, timer),
        }
    }

    /// Number of frames currently in flight
    pub fn in_flight(&self) -> usize {
        match &self.machine {
            SenderMachine::SelectiveRepeat(tx) => tx.in_flight(),
            SenderMachine::GoBackN(tx) => tx.in_flight(),
        }
    }

    pub fn counters(&self) -> &SenderCounters {
        match &self.machine {
            SenderMachine::SelectiveRepeat(tx) => tx.counters(),
            SenderMachine::GoBackN(tx) => tx.counters(),
        }
    }
}

enum ReceiverMachine {
    SelectiveRepeat(Receiver),
    GoBackN(GbnReceiver),
}

/// Receiving side (B) of one link
pub struct ReceiverSession {
    machine: ReceiverMachine,
}

impl ReceiverSession {
    /// Create the receiving side of a session
    pub fn new(config: &ArqConfig) -> Result<Self> {
        config.validate()?;
        let machine = match config.mode {
            ArqMode::SelectiveRepeat => ReceiverMachine::SelectiveRepeat(Receiver::new(config)),
            ArqMode::GoBackN => ReceiverMachine::GoBackN(GbnReceiver::new(config)),
        };
        Ok(Self { machine })
    }

    /// Consume one arriving data frame, emitting acknowledgments and
    /// in-order deliveries through the collaborators
    pub fn on_frame<C: Channel, D: DeliverySink>(
        &mut self,
        frame: &Frame,
        channel: &mut C,
        app: &mut D,
    ) {
        match &mut self.machine {
            ReceiverMachine::SelectiveRepeat(rx) => rx.on_frame(frame, channel, app),
            ReceiverMachine::GoBackN(rx) => rx.on_frame(frame, channel, app),
        }
    }

    pub fn counters(&self) -> &ReceiverCounters {
        match &self.machine {
            ReceiverMachine::SelectiveRepeat(rx) => rx.counters(),
            ReceiverMachine::GoBackN(rx) => rx.counters(),
        }
    }
}
