/// Selective-Repeat sender state machine (side A)
///
/// Accepts application messages while the window has room, keeps every
/// outstanding frame buffered for retransmission, and consumes per-frame
/// acknowledgments. One retransmission timer covers the oldest
/// unacknowledged frame; on timeout only that frame is resent.
use tracing::{debug, trace, warn};

use crate::ack_manager::{RetransmitTimer, RetryPolicy};
use crate::contracts::{Frame, Message};
use crate::errors::{ArqError, Result};
use crate::session::{ArqConfig, Channel, Side, TimerDriver};
use crate::window;

/// Observability counters for one sending side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderCounters {
    /// Data frames handed to the channel for the first time
    pub frames_sent: u64,
    /// Data frames handed to the channel again after a timeout
    pub frames_resent: u64,
    /// Acknowledgments that marked a frame acked for the first time
    pub new_acks: u64,
    /// Acknowledgments for already-acked or out-of-window frames
    pub duplicate_acks: u64,
    /// Submissions rejected because the window was full
    pub window_full_rejections: u64,
}

/// Selective-Repeat sender window state
///
/// Invariant: the in-flight sequence numbers are exactly
/// `{base, base+1, ..., next_seqnum-1} mod seq_space`, never more than
/// `window_size` of them. Buffer slots are indexed `seqnum % window_size`
/// and overwritten in place as the window slides.
pub struct Transmitter {
    window_size: usize,
    seq_space: i32,

    /// Oldest unacknowledged sequence number
    base: i32,
    /// Next sequence number to assign
    next_seqnum: i32,

    outstanding: Vec<Option<Frame>>,
    acked: Vec<bool>,
    retries: Vec<u32>,

    timer: RetransmitTimer,
    retry_policy: RetryPolicy,
    counters: SenderCounters,
}

impl Transmitter {
    pub fn new(config: &ArqConfig) -> Self {
        Self {
            window_size: config.window_size,
            seq_space: config.seq_space,
            base: 0,
            next_seqnum: 0,
            outstanding: vec![None; config.window_size],
            acked: vec![false; config.window_size],
            retries: vec![0; config.window_size],
            timer: RetransmitTimer::new(Side::A, config.rtt_ticks),
            retry_policy: RetryPolicy::new(config.max_retries),
            counters: SenderCounters::default(),
        }
    }

    fn slot(&self, seqnum: i32) -> usize {
        seqnum as usize % self.window_size
    }

    /// Number of frames currently in flight
    pub fn in_flight(&self) -> usize {
        window::distance(self.next_seqnum, self.base, self.seq_space) as usize
    }

    pub fn base(&self) -> i32 {
        self.base
    }

    pub fn next_seqnum(&self) -> i32 {
        self.next_seqnum
    }

    pub fn counters(&self) -> &SenderCounters {
        &self.counters
    }

    pub fn timer_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Accept one application message
    ///
    /// Frames it, buffers it, transmits it, and starts the timer if the
    /// window was empty. A full window is a hard backpressure boundary:
    /// the message is neither queued nor dropped silently.
    ///
    /// # Errors
    /// Returns `ArqError::WindowFull` when `window_size` frames are already
    /// in flight.
    pub fn submit<C: Channel, T: TimerDriver>(
        &mut self,
        message: &Message,
        channel: &mut C,
        timer: &mut T,
    ) -> Result<()> {
        if self.in_flight() >= self.window_size {
            debug!(base = self.base, "send window full, rejecting submission");
            self.counters.window_full_rejections += 1;
            return Err(ArqError::WindowFull);
        }

        let seqnum = self.next_seqnum;
        let frame = Frame::data(seqnum, message.data);
        let slot = self.slot(seqnum);
        self.outstanding[slot] = Some(frame);
        self.acked[slot] = false;
        self.retries[slot] = 0;

        trace!(seqnum, "sending new data frame");
        channel.send(Side::A, frame);
        self.counters.frames_sent += 1;

        if self.base == seqnum {
            self.timer.start(timer);
        }

        self.next_seqnum = window::advance(self.next_seqnum, self.seq_space);
        Ok(())
    }

    /// Consume one arriving acknowledgment frame
    ///
    /// Corrupted acks, acks outside the window, and duplicate acks cause no
    /// state change; processing the same valid ack twice leaves the sender
    /// exactly as processing it once did.
    pub fn on_frame<T: TimerDriver>(&mut self, frame: &Frame, timer: &mut T) {
        if frame.is_corrupted() {
            warn!("corrupted ack frame discarded");
            return;
        }

        let acknum = frame.acknum;
        if !window::in_window(acknum, self.base, self.window_size, self.seq_space)
            || window::distance(acknum, self.base, self.seq_space) >= self.in_flight() as i32
        {
            trace!(acknum, base = self.base, "ack outside sender window, ignored");
            self.counters.duplicate_acks += 1;
            return;
        }

        let slot = self.slot(acknum);
        if self.acked[slot] {
            trace!(acknum, "duplicate ack, ignored");
            self.counters.duplicate_acks += 1;
            return;
        }

        trace!(acknum, "new ack accepted");
        self.acked[slot] = true;
        self.retries[slot] = 0;
        self.counters.new_acks += 1;

        // slide over the contiguous acked prefix
        while self.in_flight() > 0 && self.acked[self.slot(self.base)] {
            let slot = self.slot(self.base);
            self.acked[slot] = false;
            self.outstanding[slot] = None;
            self.base = window::advance(self.base, self.seq_space);
        }

        if self.in_flight() > 0 {
            // re-anchor the timer at the new base
            self.timer.start(timer);
        } else {
            self.timer.stop(timer);
        }
    }

    /// Handle the retransmission timer firing for the frame at `base`
    ///
    /// Resends only that frame and restarts the timer. Once the frame's
    /// retry budget is spent the timeout becomes a fatal transport failure
    /// surfaced to the session owner.
    pub fn on_timeout<C: Channel, T: TimerDriver>(
        &mut self,
        channel: &mut C,
        timer: &mut T,
    ) -> Result<()> {
        self.timer.on_fired();

        if self.in_flight() == 0 {
            // stale fire after the window drained
            return Ok(());
        }

        let slot = self.slot(self.base);
        let attempts = self.retries[slot];
        if self.retry_policy.exhausted(attempts) {
            warn!(
                seqnum = self.base,
                attempts, "retry limit exceeded, failing session"
            );
            return Err(ArqError::RetryLimitExceeded {
                seqnum: self.base,
                attempts,
            });
        }

        if let Some(frame) = self.outstanding[slot] {
            debug!(seqnum = frame.seqnum, attempt = attempts + 1, "timeout, resending frame");
            channel.send(Side::A, frame);
            self.retries[slot] += 1;
            self.counters.frames_resent += 1;
        }

        self.timer.start(timer);
        Ok(())
    }
}
