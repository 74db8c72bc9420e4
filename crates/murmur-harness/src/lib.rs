//! Deterministic simulation harness for Murmur sync testing.
//!
//! Provides a virtual-clock [`SimEnv`], an in-memory [`SimServer`] standing in
//! for both the channel server and the REST API, and a [`SimDriver`] that
//! executes engine actions synchronously so whole sessions replay exactly from
//! a seed.
//!
//! With [`SimDriver::with_invariants`] the driver snapshots the engine after
//! every event and runs [`InvariantRegistry::standard()`] over it: no
//! duplicate confirmed ids, one pending entry per correlation ref, exclusive
//! channel timers, one room channel, and no self in the typing set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_server;

pub use invariants::{
    ChannelSnapshot, ClientSnapshot, ExclusiveTimers, Invariant, InvariantRegistry,
    InvariantResult, MessageSnapshot, NoDuplicateMessages, SingleRoomChannel,
    SingleOptimisticPerRef, SystemSnapshot, TypingExcludesSelf, Violation,
};
pub use sim_driver::{DriverOptions, SimDriver};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_server::SimServer;
