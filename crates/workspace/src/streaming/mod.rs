//! Turn lifecycle: opening backend streams and pumping their events into the store.

mod controller;

pub use controller::{
    DEFAULT_TURN_IDLE_TIMEOUT, StreamingController, TurnCanceller, TurnEvent, TurnOutcome,
    TurnStatus,
};
