/// Go-Back-N strategy pair
///
/// The second historical retransmission strategy behind the shared
/// capability set. Acknowledgments are cumulative: acking sequence `a`
/// acknowledges every outstanding frame up to and including `a`. On timeout
/// the sender resends every outstanding frame; the receiver accepts only
/// the exact expected sequence number and re-acks the last in-order frame
/// for everything else, corrupted frames included.
use tracing::{debug, trace, warn};

use crate::ack_manager::{RetransmitTimer, RetryPolicy};
use crate::contracts::{Frame, Message};
use crate::errors::{ArqError, Result};
use crate::receiver::ReceiverCounters;
use crate::session::{ArqConfig, Channel, DeliverySink, Side, TimerDriver};
use crate::transmitter::SenderCounters;
use crate::window;

/// Go-Back-N sender window state
///
/// No per-frame acked bitset: the contiguous prefix up to the cumulative
/// acknowledgment is released in one step. The retry counter belongs to the
/// whole window cycle, reset whenever an acknowledgment makes progress.
pub struct GbnTransmitter {
    window_size: usize,
    seq_space: i32,

    base: i32,
    next_seqnum: i32,
    outstanding: Vec<Option<Frame>>,
    retries: u32,

    timer: RetransmitTimer,
    retry_policy: RetryPolicy,
    counters: SenderCounters,
}

impl GbnTransmitter {
    pub fn new(config: &ArqConfig) -> Self {
        Self {
            window_size: config.window_size,
            seq_space: config.seq_space,
            base: 0,
            next_seqnum: 0,
            outstanding: vec![None; config.window_size],
            retries: 0,
            timer: RetransmitTimer::new(Side::A, config.rtt_ticks),
            retry_policy: RetryPolicy::new(config.max_retries),
            counters: SenderCounters::default(),
        }
    }

    fn slot(&self, seqnum: i32) -> usize {
        seqnum as usize % self.window_size
    }

    pub fn in_flight(&self) -> usize {
        window::distance(self.next_seqnum, self.base, self.seq_space) as usize
    }

    pub fn base(&self) -> i32 {
        self.base
    }

    pub fn counters(&self) -> &SenderCounters {
        &self.counters
    }

    /// Accept one application message, or reject it with `WindowFull`
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

        trace!(seqnum, "sending new data frame");
        channel.send(Side::A, frame);
        self.counters.frames_sent += 1;

        if self.base == seqnum {
            self.timer.start(timer);
        }

        self.next_seqnum = window::advance(self.next_seqnum, self.seq_space);
        Ok(())
    }

    /// Consume one arriving cumulative acknowledgment
    pub fn on_frame<T: TimerDriver>(&mut self, frame: &Frame, timer: &mut T) {
        if frame.is_corrupted() {
            warn!("corrupted ack frame discarded");
            return;
        }

        let acknum = frame.acknum;
        let progress = window::distance(acknum, self.base, self.seq_space) + 1;
        if progress as usize > self.in_flight() {
            trace!(acknum, base = self.base, "duplicate cumulative ack, ignored");
            self.counters.duplicate_acks += 1;
            return;
        }

        trace!(acknum, base = self.base, progress, "cumulative ack accepted");
        self.counters.new_acks += 1;

        for _ in 0..progress {
            let slot = self.slot(self.base);
            self.outstanding[slot] = None;
            self.base = window::advance(self.base, self.seq_space);
        }
        self.retries = 0;

        if self.in_flight() > 0 {
            self.timer.start(timer);
        } else {
            self.timer.stop(timer);
        }
    }

    /// Handle the retransmission timer firing: resend the whole window
    pub fn on_timeout<C: Channel, T: TimerDriver>(
        &mut self,
        channel: &mut C,
        timer: &mut T,
    ) -> Result<()> {
        self.timer.on_fired();

        if self.in_flight() == 0 {
            return Ok(());
        }

        if self.retry_policy.exhausted(self.retries) {
            warn!(
                seqnum = self.base,
                attempts = self.retries,
                "retry limit exceeded, failing session"
            );
            return Err(ArqError::RetryLimitExceeded {
                seqnum: self.base,
                attempts: self.retries,
            });
        }

        let in_flight = self.in_flight() as i32;
        debug!(base = self.base, count = in_flight, "timeout, resending window");
        let mut seqnum = self.base;
        for _ in 0..in_flight {
            if let Some(frame) = self.outstanding[self.slot(seqnum)] {
                channel.send(Side::A, frame);
                self.counters.frames_resent += 1;
            }
            seqnum = window::advance(seqnum, self.seq_space);
        }

        self.retries += 1;
        self.timer.start(timer);
        Ok(())
    }
}

/// Go-Back-N receiver state
///
/// Buffers nothing: only the exact expected sequence number is accepted and
/// delivered. Everything else, corrupted frames included, re-acks the last
/// in-order sequence number so the sender learns where the stream stands.
pub struct GbnReceiver {
    seq_space: i32,

    expected: i32,
    ack_seq: i32,

    counters: ReceiverCounters,
}

impl GbnReceiver {
    pub fn new(config: &ArqConfig) -> Self {
        Self {
            seq_space: config.seq_space,
            expected: 0,
            ack_seq: 0,
            counters: ReceiverCounters::default(),
        }
    }

    pub fn expected(&self) -> i32 {
        self.expected
    }

    pub fn counters(&self) -> &ReceiverCounters {
        &self.counters
    }

    fn emit_ack<C: Channel>(&mut self, acknum: i32, channel: &mut C) {
        let ack = Frame::ack(self.ack_seq, acknum);
        self.ack_seq = window::advance(self.ack_seq, self.seq_space);
        channel.send(Side::B, ack);
    }

    /// Consume one arriving data frame
    pub fn on_frame<C: Channel, D: DeliverySink>(
        &mut self,
        frame: &Frame,
        channel: &mut C,
        app: &mut D,
    ) {
        if frame.is_corrupted() {
            warn!("corrupted data frame, re-acking last in-order frame");
            self.counters.corrupt_discards += 1;
            let last_in_order = window::previous(self.expected, self.seq_space);
            self.emit_ack(last_in_order, channel);
            return;
        }

        if frame.seqnum != self.expected {
            trace!(
                seqnum = frame.seqnum,
                expected = self.expected,
                "out-of-order frame, re-acking last in-order frame"
            );
            self.counters.duplicate_frames += 1;
            let last_in_order = window::previous(self.expected, self.seq_space);
            self.emit_ack(last_in_order, channel);
            return;
        }

        debug!(seqnum = frame.seqnum, "frame accepted, delivering");
        self.counters.frames_received += 1;
        app.deliver(frame.payload);
        self.counters.delivered += 1;

        self.emit_ack(self.expected, channel);
        self.expected = window::advance(self.expected, self.seq_space);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{Payload, PAYLOAD_SIZE};
    use crate::session::ArqMode;
    use crate::simulator::{DeliveryLog, FrameLog, TimerLog};

    fn gbn_config() -> ArqConfig {
        ArqConfig::default().with_mode(ArqMode::GoBackN)
    }

    fn message(tag: u8) -> Message {
        Message::new([tag; PAYLOAD_SIZE])
    }

    fn payload(tag: u8) -> Payload {
        [tag; PAYLOAD_SIZE]
    }

    #[test]
    fn test_cumulative_ack_releases_prefix() {
        let mut tx = GbnTransmitter::new(&gbn_config());
        let mut channel = FrameLog::default();
        let mut timer = TimerLog::default();

        for i in 0..5u8 {
            tx.submit(&message(i), &mut channel, &mut timer).unwrap();
        }

        // ack 2 releases 0, 1, 2 in one step
        tx.on_frame(&Frame::ack(0, 2), &mut timer);
        assert_eq!(tx.base(), 3);
        assert_eq!(tx.in_flight(), 2);
        assert_eq!(tx.counters().new_acks, 1);
    }

    #[test]
    fn test_duplicate_cumulative_ack_ignored() {
        let mut tx = GbnTransmitter::new(&gbn_config());
        let mut channel = FrameLog::default();
        let mut timer = TimerLog::default();

        for i in 0..3u8 {
            tx.submit(&message(i), &mut channel, &mut timer).unwrap();
        }

        tx.on_frame(&Frame::ack(0, 1), &mut timer);
        assert_eq!(tx.base(), 2);

        // re-ack of 1: no outstanding frame covered
        tx.on_frame(&Frame::ack(1, 1), &mut timer);
        assert_eq!(tx.base(), 2);
        assert_eq!(tx.counters().duplicate_acks, 1);
    }

    #[test]
    fn test_timeout_resends_entire_window() {
        let mut tx = GbnTransmitter::new(&gbn_config());
        let mut channel = FrameLog::default();
        let mut timer = TimerLog::default();

        for i in 0..4u8 {
            tx.submit(&message(i), &mut channel, &mut timer).unwrap();
        }
        channel.sent.clear();

        tx.on_timeout(&mut channel, &mut timer).unwrap();

        let seqnums: Vec<i32> = channel.sent.iter().map(|(_, f)| f.seqnum).collect();
        assert_eq!(seqnums, vec![0, 1, 2, 3]);
        assert_eq!(tx.counters().frames_resent, 4);
    }

    #[test]
    fn test_retry_exhaustion_is_fatal() {
        let config = gbn_config().with_max_retries(1);
        let mut tx = GbnTransmitter::new(&config);
        let mut channel = FrameLog::default();
        let mut timer = TimerLog::default();

        tx.submit(&message(0), &mut channel, &mut timer).unwrap();
        tx.on_timeout(&mut channel, &mut timer).unwrap();

        assert_eq!(
            tx.on_timeout(&mut channel, &mut timer),
            Err(ArqError::RetryLimitExceeded {
                seqnum: 0,
                attempts: 1
            })
        );
    }

    #[test]
    fn test_receiver_accepts_only_expected_seq() {
        let mut rx = GbnReceiver::new(&gbn_config());
        let mut channel = FrameLog::default();
        let mut app = DeliveryLog::default();

        // out-of-order frame: re-ack last in-order (seq space wraps to 6)
        rx.on_frame(&Frame::data(2, payload(2)), &mut channel, &mut app);
        assert!(app.payloads.is_empty());
        assert_eq!(channel.sent[0].1.acknum, 6);

        rx.on_frame(&Frame::data(0, payload(0)), &mut channel, &mut app);
        assert_eq!(app.payloads, vec![payload(0)]);
        assert_eq!(channel.sent[1].1.acknum, 0);
        assert_eq!(rx.expected(), 1);
    }

    #[test]
    fn test_receiver_reacks_on_corruption() {
        let mut rx = GbnReceiver::new(&gbn_config());
        let mut channel = FrameLog::default();
        let mut app = DeliveryLog::default();

        rx.on_frame(&Frame::data(0, payload(0)), &mut channel, &mut app);
        channel.sent.clear();

        let mut frame = Frame::data(1, payload(1));
        frame.payload[3] ^= 0x55;
        rx.on_frame(&frame, &mut channel, &mut app);

        assert_eq!(channel.sent.len(), 1);
        assert_eq!(channel.sent[0].1.acknum, 0);
        assert_eq!(rx.counters().corrupt_discards, 1);
    }
}
