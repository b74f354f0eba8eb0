/// Selective-Repeat receiver state machine (side B)
///
/// Validates arriving data frames, buffers in-window arrivals, emits one
/// acknowledgment per accepted frame (new or duplicate), and delivers the
/// contiguous run starting at `expected` to the application in order.
/// Retransmissions arriving behind the window are re-acked with their own
/// sequence number so a sender stuck behind a lost acknowledgment can
/// slide its base.
use tracing::{debug, trace, warn};

use crate::contracts::Frame;
use crate::session::{ArqConfig, Channel, CorruptionPolicy, DeliverySink, Side};
use crate::window;

/// Observability counters for one receiving side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverCounters {
    /// Unique in-window data frames received correctly
    pub frames_received: u64,
    /// Duplicate data frames that were re-acked but not re-stored
    pub duplicate_frames: u64,
    /// Corrupted frames discarded
    pub corrupt_discards: u64,
    /// Payloads delivered to the application
    pub delivered: u64,
}

/// Selective-Repeat receiver window state
///
/// Invariant: `received` only ever marks sequence numbers in
/// `[expected, expected + window_size) mod seq_space`.
pub struct Receiver {
    window_size: usize,
    seq_space: i32,
    corruption_policy: CorruptionPolicy,

    /// Oldest sequence number not yet delivered to the application
    expected: i32,
    buffered: Vec<Option<Frame>>,
    received: Vec<bool>,

    /// Independent counter numbering outgoing acknowledgment frames; not
    /// related to the data sequence space
    ack_seq: i32,

    counters: ReceiverCounters,
}

impl Receiver {
    pub fn new(config: &ArqConfig) -> Self {
        Self {
            window_size: config.window_size,
            seq_space: config.seq_space,
            corruption_policy: config.corruption_policy,
            expected: 0,
            buffered: vec![None; config.window_size],
            received: vec![false; config.window_size],
            ack_seq: 0,
            counters: ReceiverCounters::default(),
        }
    }

    fn slot(&self, seqnum: i32) -> usize {
        seqnum as usize % self.window_size
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
            warn!("corrupted data frame discarded");
            self.counters.corrupt_discards += 1;
            if self.corruption_policy == CorruptionPolicy::DuplicateAck {
                let last_in_order = window::previous(self.expected, self.seq_space);
                self.emit_ack(last_in_order, channel);
            }
            return;
        }

        let seqnum = frame.seqnum;
        if !window::in_window(seqnum, self.expected, self.window_size, self.seq_space) {
            // A frame no more than window_size behind `expected` is a
            // retransmission of something already delivered, which means its
            // acknowledgment was lost. It must be re-acked with its own
            // sequence number or the sender retries it to exhaustion.
            // Anything further out cannot come from a conforming sender.
            let behind = window::distance(self.expected, seqnum, self.seq_space);
            if behind <= self.window_size as i32 {
                trace!(seqnum, expected = self.expected, "retransmission of delivered frame, re-acked");
                self.counters.duplicate_frames += 1;
                self.emit_ack(seqnum, channel);
            } else {
                trace!(seqnum, expected = self.expected, "frame outside receive window, discarded");
            }
            return;
        }

        // Selective Repeat acks exactly the sequence number received,
        // whether new or duplicate
        self.emit_ack(seqnum, channel);

        let slot = self.slot(seqnum);
        if self.received[slot] {
            trace!(seqnum, "duplicate frame, re-acked only");
            self.counters.duplicate_frames += 1;
            return;
        }

        trace!(seqnum, expected = self.expected, "frame buffered");
        self.buffered[slot] = Some(*frame);
        self.received[slot] = true;
        self.counters.frames_received += 1;

        // deliver the contiguous run starting at expected
        while self.received[self.slot(self.expected)] {
            let slot = self.slot(self.expected);
            if let Some(buffered) = self.buffered[slot].take() {
                debug!(seqnum = buffered.seqnum, "delivering payload in order");
                app.deliver(buffered.payload);
                self.counters.delivered += 1;
            }
            self.received[slot] = false;
            self.expected = window::advance(self.expected, self.seq_space);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{Payload, PAYLOAD_SIZE};
    use crate::simulator::{DeliveryLog, FrameLog};

    fn payload(tag: u8) -> Payload {
        [tag; PAYLOAD_SIZE]
    }

    fn receiver() -> Receiver {
        Receiver::new(&ArqConfig::default())
    }

    #[test]
    fn test_in_order_arrival_delivers_immediately() {
        let mut rx = receiver();
        let mut channel = FrameLog::default();
        let mut app = DeliveryLog::default();

        for i in 0..3 {
            rx.on_frame(&Frame::data(i, payload(i as u8)), &mut channel, &mut app);
        }

        assert_eq!(app.payloads, vec![payload(0), payload(1), payload(2)]);
        assert_eq!(rx.expected(), 3);
        assert_eq!(rx.counters().frames_received, 3);
    }

    #[test]
    fn test_gap_holds_back_delivery_until_filled() {
        let mut rx = receiver();
        let mut channel = FrameLog::default();
        let mut app = DeliveryLog::default();

        rx.on_frame(&Frame::data(0, payload(0)), &mut channel, &mut app);
        rx.on_frame(&Frame::data(1, payload(1)), &mut channel, &mut app);
        rx.on_frame(&Frame::data(3, payload(3)), &mut channel, &mut app);
        rx.on_frame(&Frame::data(4, payload(4)), &mut channel, &mut app);
        rx.on_frame(&Frame::data(5, payload(5)), &mut channel, &mut app);

        // 3, 4, 5 buffered behind the gap at 2
        assert_eq!(app.payloads.len(), 2);
        assert_eq!(rx.expected(), 2);
        // every accepted frame was acked, including the buffered ones
        assert_eq!(channel.sent.len(), 5);

        rx.on_frame(&Frame::data(2, payload(2)), &mut channel, &mut app);
        let expected: Vec<Payload> = (0..6).map(|i| payload(i as u8)).collect();
        assert_eq!(app.payloads, expected);
        assert_eq!(rx.expected(), 6);
    }

    #[test]
    fn test_duplicate_frame_reacked_not_redelivered() {
        let mut rx = receiver();
        let mut channel = FrameLog::default();
        let mut app = DeliveryLog::default();

        // frame 1 buffered out of order, then duplicated
        rx.on_frame(&Frame::data(1, payload(1)), &mut channel, &mut app);
        rx.on_frame(&Frame::data(1, payload(1)), &mut channel, &mut app);

        assert_eq!(rx.counters().frames_received, 1);
        assert_eq!(rx.counters().duplicate_frames, 1);
        assert_eq!(channel.sent.len(), 2);
        assert_eq!(channel.sent[0].1.acknum, 1);
        assert_eq!(channel.sent[1].1.acknum, 1);
        assert!(app.payloads.is_empty());
    }

    #[test]
    fn test_ack_frames_use_independent_counter() {
        let mut rx = receiver();
        let mut channel = FrameLog::default();
        let mut app = DeliveryLog::default();

        rx.on_frame(&Frame::data(0, payload(0)), &mut channel, &mut app);
        rx.on_frame(&Frame::data(1, payload(1)), &mut channel, &mut app);

        assert_eq!(channel.sent[0].1.seqnum, 0);
        assert_eq!(channel.sent[1].1.seqnum, 1);
        assert!(channel.sent.iter().all(|(side, f)| {
            *side == Side::B && f.is_ack() && !f.is_corrupted()
        }));
    }

    #[test]
    fn test_behind_window_retransmission_reacked_with_own_seqnum() {
        let mut rx = receiver();
        let mut channel = FrameLog::default();
        let mut app = DeliveryLog::default();

        rx.on_frame(&Frame::data(0, payload(0)), &mut channel, &mut app);
        channel.sent.clear();

        // a late retransmission of the delivered frame falls behind the
        // window; it is re-acked with its own number, not redelivered
        rx.on_frame(&Frame::data(0, payload(0)), &mut channel, &mut app);

        assert_eq!(channel.sent.len(), 1);
        assert_eq!(channel.sent[0].1.acknum, 0);
        assert_eq!(rx.counters().duplicate_frames, 1);
        assert_eq!(rx.expected(), 1);
        assert_eq!(app.payloads.len(), 1);
    }

    #[test]
    fn test_stalled_retransmission_reacked_after_later_deliveries() {
        let config = ArqConfig::default().with_window_size(4).with_seq_space(8);
        let mut rx = Receiver::new(&config);
        let mut channel = FrameLog::default();
        let mut app = DeliveryLog::default();

        for i in 0..4 {
            rx.on_frame(&Frame::data(i, payload(i as u8)), &mut channel, &mut app);
        }
        channel.sent.clear();

        // frame 1's ack was lost; its resend arrives after 2 and 3 were
        // delivered. The ack must carry 1 itself - re-acking the newest
        // in-order frame (3) would be a duplicate the sender ignores.
        rx.on_frame(&Frame::data(1, payload(1)), &mut channel, &mut app);

        assert_eq!(channel.sent.len(), 1);
        assert_eq!(channel.sent[0].1.acknum, 1);
        assert_eq!(rx.expected(), 4);
        assert_eq!(app.payloads.len(), 4);
    }

    #[test]
    fn test_far_out_of_range_frame_discarded_without_ack() {
        let config = ArqConfig::default().with_window_size(3).with_seq_space(12);
        let mut rx = Receiver::new(&config);
        let mut channel = FrameLog::default();
        let mut app = DeliveryLog::default();

        // expected = 0: window covers 0..=2, delivered history covers
        // 9..=11; seq 7 is in neither half
        rx.on_frame(&Frame::data(7, payload(7)), &mut channel, &mut app);

        assert!(channel.sent.is_empty());
        assert!(app.payloads.is_empty());
        assert_eq!(rx.counters().frames_received, 0);
        assert_eq!(rx.counters().duplicate_frames, 0);
    }

    #[test]
    fn test_corrupted_frame_silent_drop_policy() {
        let mut rx = receiver();
        let mut channel = FrameLog::default();
        let mut app = DeliveryLog::default();

        let mut frame = Frame::data(0, payload(0));
        frame.payload[0] ^= 0xFF;
        rx.on_frame(&frame, &mut channel, &mut app);

        assert!(channel.sent.is_empty());
        assert_eq!(rx.counters().corrupt_discards, 1);
        assert_eq!(rx.expected(), 0);
    }

    #[test]
    fn test_corrupted_frame_duplicate_ack_policy() {
        let config = ArqConfig::default().with_corruption_policy(CorruptionPolicy::DuplicateAck);
        let mut rx = Receiver::new(&config);
        let mut channel = FrameLog::default();
        let mut app = DeliveryLog::default();

        rx.on_frame(&Frame::data(0, payload(0)), &mut channel, &mut app);
        channel.sent.clear();

        let mut frame = Frame::data(1, payload(1));
        frame.payload[0] ^= 0xFF;
        rx.on_frame(&frame, &mut channel, &mut app);

        // re-ack for the last in-order frame (0), window state untouched
        assert_eq!(channel.sent.len(), 1);
        assert_eq!(channel.sent[0].1.acknum, 0);
        assert_eq!(rx.expected(), 1);
    }

    #[test]
    fn test_delivery_order_matches_submission_for_shuffled_arrivals() {
        let orders: [[i32; 6]; 4] = [
            [0, 1, 2, 3, 4, 5],
            [5, 4, 3, 2, 1, 0],
            [2, 0, 4, 1, 5, 3],
            [1, 3, 5, 0, 2, 4],
        ];

        for order in orders {
            let mut rx = receiver();
            let mut channel = FrameLog::default();
            let mut app = DeliveryLog::default();

            for seq in order {
                rx.on_frame(&Frame::data(seq, payload(seq as u8)), &mut channel, &mut app);
            }

            let expected: Vec<Payload> = (0..6).map(|i| payload(i as u8)).collect();
            assert_eq!(app.payloads, expected, "arrival order {:?}", order);
            assert_eq!(rx.counters().delivered, 6);
        }
    }
}
