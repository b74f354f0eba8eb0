/// Deterministic channel and timer harness
///
/// Stands in for the unreliable medium and the timer facility when driving
/// a session pair in tests and benches. Time is a tick counter advanced by
/// an event queue; faults (loss, corruption) come from a seeded RNG plus
/// per-frame forced fault sets, so every run is reproducible. Frames are
/// delayed by a fixed one-way latency and never reordered: ties break on
/// insertion order.
///
/// Also home to the trait recorders (`FrameLog`, `TimerLog`, `DeliveryLog`)
/// the unit tests use to observe a single state machine in isolation.
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::contracts::{Frame, Message, Payload};
use crate::errors::Result;
use crate::receiver::ReceiverCounters;
use crate::session::{
    ArqConfig, Channel, DeliverySink, ReceiverSession, SenderSession, Side, TimerDriver,
};
use crate::transmitter::SenderCounters;

/// Default one-way channel delay, in ticks
pub const DEFAULT_ONE_WAY_DELAY: u64 = 5;

/// Records every frame handed to the channel
#[derive(Debug, Default)]
pub struct FrameLog {
    pub sent: Vec<(Side, Frame)>,
}

impl Channel for FrameLog {
    fn send(&mut self, side: Side, frame: Frame) {
        self.sent.push((side, frame));
    }
}

/// One recorded timer-facility operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOp {
    Start(Side, u64),
    Stop(Side),
}

/// Records every timer-facility operation
#[derive(Debug, Default)]
pub struct TimerLog {
    pub ops: Vec<TimerOp>,
}

impl TimerDriver for TimerLog {
    fn start(&mut self, side: Side, ticks: u64) {
        self.ops.push(TimerOp::Start(side, ticks));
    }

    fn stop(&mut self, side: Side) {
        self.ops.push(TimerOp::Stop(side));
    }
}

/// Records every payload delivered to the application
#[derive(Debug, Default)]
pub struct DeliveryLog {
    pub payloads: Vec<Payload>,
}

impl DeliverySink for DeliveryLog {
    fn deliver(&mut self, payload: Payload) {
        self.payloads.push(payload);
    }
}

/// Fault injection plan for one channel direction
///
/// Frames are numbered in send order per direction, starting at 0; the
/// forced sets hit exact frames, the probabilities hit the rest.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    pub loss_prob: f64,
    pub corrupt_prob: f64,
    pub drop_frames: HashSet<u64>,
    pub corrupt_frames: HashSet<u64>,
}

impl FaultPlan {
    pub fn lossless() -> Self {
        Self::default()
    }

    pub fn with_loss_prob(mut self, prob: f64) -> Self {
        self.loss_prob = prob;
        self
    }

    pub fn with_corrupt_prob(mut self, prob: f64) -> Self {
        self.corrupt_prob = prob;
        self
    }

    pub fn dropping(mut self, frames: &[u64]) -> Self {
        self.drop_frames.extend(frames.iter().copied());
        self
    }

    pub fn corrupting(mut self, frames: &[u64]) -> Self {
        self.corrupt_frames.extend(frames.iter().copied());
        self
    }

    fn should_drop(&self, index: u64, rng: &mut StdRng) -> bool {
        self.drop_frames.contains(&index)
            || (self.loss_prob > 0.0 && rng.gen::<f64>() < self.loss_prob)
    }

    fn should_corrupt(&self, index: u64, rng: &mut StdRng) -> bool {
        self.corrupt_frames.contains(&index)
            || (self.corrupt_prob > 0.0 && rng.gen::<f64>() < self.corrupt_prob)
    }
}

#[derive(Debug, Clone)]
enum EventKind {
    /// A frame reaches `side`
    Arrival(Side, Frame),
    /// The timer armed for `side` with this generation fires
    Timer(Side, u64),
}

#[derive(Debug, Clone)]
struct Event {
    at: u64,
    order: u64,
    kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.order == other.order
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.at.cmp(&other.at).then(self.order.cmp(&other.order))
    }
}

/// Event-driven harness for one unidirectional session pair
pub struct LinkSim {
    clock: u64,
    one_way_delay: u64,
    events: BinaryHeap<Reverse<Event>>,
    next_order: u64,

    sender: SenderSession,
    receiver: ReceiverSession,
    delivered: DeliveryLog,

    data_faults: FaultPlan,
    ack_faults: FaultPlan,
    rng: StdRng,
    send_index: [u64; 2],

    timer_armed: [bool; 2],
    timer_gens: [u64; 2],
    overlapping_timer_starts: u64,
}

fn side_index(side: Side) -> usize {
    match side {
        Side::A => 0,
        Side::B => 1,
    }
}

impl LinkSim {
    /// Build a session pair driven by this harness
    ///
    /// # Errors
    /// Returns `ArqError::InvalidConfig` if the configuration is rejected.
    pub fn new(config: &ArqConfig, seed: u64) -> Result<Self> {
        Ok(Self {
            clock: 0,
            one_way_delay: DEFAULT_ONE_WAY_DELAY,
            events: BinaryHeap::new(),
            next_order: 0,
            sender: SenderSession::new(config)?,
            receiver: ReceiverSession::new(config)?,
            delivered: DeliveryLog::default(),
            data_faults: FaultPlan::lossless(),
            ack_faults: FaultPlan::lossless(),
            rng: StdRng::seed_from_u64(seed),
            send_index: [0; 2],
            timer_armed: [false; 2],
            timer_gens: [0; 2],
            overlapping_timer_starts: 0,
        })
    }

    /// Fault plan applied to A→B data frames
    pub fn with_data_faults(mut self, plan: FaultPlan) -> Self {
        self.data_faults = plan;
        self
    }

    /// Fault plan applied to B→A acknowledgment frames
    pub fn with_ack_faults(mut self, plan: FaultPlan) -> Self {
        self.ack_faults = plan;
        self
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Tick at which the next pending event fires, if any
    pub fn next_event_at(&self) -> Option<u64> {
        self.events.peek().map(|Reverse(event)| event.at)
    }

    pub fn delivered(&self) -> &[Payload] {
        &self.delivered.payloads
    }

    pub fn sender_counters(&self) -> &SenderCounters {
        self.sender.counters()
    }

    pub fn receiver_counters(&self) -> &ReceiverCounters {
        self.receiver.counters()
    }

    pub fn in_flight(&self) -> usize {
        self.sender.in_flight()
    }

    /// Number of times a timer was started while one was already pending
    /// for the same side without an intervening stop. Always zero when the
    /// protocol honors the at-most-one-timer rule.
    pub fn overlapping_timer_starts(&self) -> u64 {
        self.overlapping_timer_starts
    }

    fn push_event(&mut self, at: u64, kind: EventKind) {
        let order = self.next_order;
        self.next_order += 1;
        self.events.push(Reverse(Event { at, order, kind }));
    }

    fn apply_timer_ops(&mut self, log: &TimerLog) {
        for op in &log.ops {
            match *op {
                TimerOp::Start(side, ticks) => {
                    let idx = side_index(side);
                    if self.timer_armed[idx] {
                        self.overlapping_timer_starts += 1;
                    }
                    self.timer_gens[idx] += 1;
                    self.timer_armed[idx] = true;
                    let gen = self.timer_gens[idx];
                    self.push_event(self.clock + ticks, EventKind::Timer(side, gen));
                }
                TimerOp::Stop(side) => {
                    let idx = side_index(side);
                    self.timer_armed[idx] = false;
                    self.timer_gens[idx] += 1;
                }
            }
        }
    }

    fn dispatch_outbox(&mut self, outbox: FrameLog) {
        for (side, mut frame) in outbox.sent {
            let idx = side_index(side);
            let index = self.send_index[idx];
            self.send_index[idx] += 1;

            let plan = match side {
                Side::A => &self.data_faults,
                Side::B => &self.ack_faults,
            };

            if plan.should_drop(index, &mut self.rng) {
                continue;
            }
            if plan.should_corrupt(index, &mut self.rng) {
                // flip a payload byte; the stored checksum goes stale
                frame.payload[0] ^= 0xFF;
            }

            let dest = match side {
                Side::A => Side::B,
                Side::B => Side::A,
            };
            self.push_event(self.clock + self.one_way_delay, EventKind::Arrival(dest, frame));
        }
    }

    /// Submit one application message to the sending side
    ///
    /// # Errors
    /// Propagates `ArqError::WindowFull` backpressure to the caller.
    pub fn submit(&mut self, message: &Message) -> Result<()> {
        let mut outbox = FrameLog::default();
        let mut timer_log = TimerLog::default();
        let result = self.sender.submit(message, &mut outbox, &mut timer_log);
        self.apply_timer_ops(&timer_log);
        self.dispatch_outbox(outbox);
        result
    }

    /// Process the next pending event
    ///
    /// Returns `Ok(false)` once the queue is empty.
    ///
    /// # Errors
    /// Returns the sender's fatal `ArqError::RetryLimitExceeded` when the
    /// retry budget runs out; earlier state changes stand.
    pub fn step(&mut self) -> Result<bool> {
        let Some(Reverse(event)) = self.events.pop() else {
            return Ok(false);
        };

        self.clock = event.at;
        let mut outbox = FrameLog::default();
        let mut timer_log = TimerLog::default();
        let mut fatal = None;

        match event.kind {
            EventKind::Arrival(Side::A, frame) => {
                self.sender.on_frame(&frame, &mut timer_log);
            }
            EventKind::Arrival(Side::B, frame) => {
                self.receiver.on_frame(&frame, &mut outbox, &mut self.delivered);
            }
            EventKind::Timer(side, gen) => {
                let idx = side_index(side);
                if !self.timer_armed[idx] || gen != self.timer_gens[idx] {
                    // cancelled or superseded timer instance
                    return Ok(true);
                }
                self.timer_armed[idx] = false;
                if side == Side::A {
                    fatal = self.sender.on_timeout(&mut outbox, &mut timer_log).err();
                }
            }
        }

        self.apply_timer_ops(&timer_log);
        self.dispatch_outbox(outbox);

        match fatal {
            Some(err) => Err(err),
            None => Ok(true),
        }
    }

    /// Run the event queue dry
    ///
    /// # Errors
    /// Propagates the first fatal error from `step`.
    pub fn run_until_idle(&mut self) -> Result<()> {
        while self.step()? {}
        Ok(())
    }
}
