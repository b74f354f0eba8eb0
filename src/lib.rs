/// ReLink Core - Reliable, ordered byte-stream transport over datagrams
///
/// This library implements the ARQ (Automatic Repeat reQuest) core of the
/// ReLink protocol: sender and receiver sliding-window state machines with
/// per-frame acknowledgment and retransmission on timeout.
///
/// # Design Principles
/// - Single-threaded, event-driven, run-to-completion state machines
/// - No internal I/O: the channel, timer, and application are collaborator
///   traits invoked by an external driver
/// - Session objects, never process-wide state
/// - Two interchangeable strategies (Selective Repeat, Go-Back-N) behind
///   one capability set, selected at configuration time

pub mod errors;
pub mod contracts;
pub mod window;
pub mod ack_manager;
pub mod transmitter;
pub mod receiver;
pub mod gbn;
pub mod session;
pub mod simulator;

pub use contracts::{Frame, Message, Payload, NOT_AN_ACK, PAYLOAD_SIZE};
pub use errors::{ArqError, Result};
pub use session::{
    ArqConfig, ArqMode, Channel, CorruptionPolicy, DeliverySink, ReceiverSession, SenderSession,
    Side, TimerDriver,
};

/// Protocol version
pub const RELINK_VERSION: u16 = 1;

/// Default sender/receiver window size, in frames
pub const WINDOW_SIZE: usize = 6;

/// Default sequence-number space. Sequence numbers are compared by modular
/// distance, never with `<`/`>`.
///
/// Note: full Selective-Repeat aliasing safety requires
/// `SEQ_SPACE >= 2 * WINDOW_SIZE`, and collision-free sender buffer slots
/// require `SEQ_SPACE % WINDOW_SIZE == 0`; the historical defaults (7, 6)
/// satisfy neither and are kept for wire compatibility. `ArqConfig::validate`
/// warns about both combinations.
pub const SEQ_SPACE: i32 = 7;

/// Retransmission timer deadline, in abstract timer ticks (one round trip)
pub const RTT_TICKS: u64 = 16;

/// Maximum retransmission attempts for the oldest unacknowledged frame
pub const MAX_RETRANSMIT_ATTEMPTS: u32 = 3;
