//! Transaction-level verification components for the tempo engine.
//!
//! Monitors watch a bus through the [`tempo_sim`] host boundary and turn
//! per-cycle signal values into transactions; drivers do the reverse. A
//! [`Scoreboard`] checks what the monitors see against what the test
//! expected, and the timing generators shape idle insertion and
//! backpressure.
//!
//! ```text
//! driver ──► signals ──► design ──► signals ──► monitor ──► callbacks ──► scoreboard
//! ```
//!
//! # Modules
//!
//! - `timing`: On/off cycle pattern generators
//! - `data`: Byte and packet-size generators
//! - `monitor`: The generic capture task and its dispatch policy
//! - `stream`: Avalon-ST style streams, single-word and packetized
//! - `driver`: Bus arbitration, idle insertion and the bit driver
//! - `opb`: On-chip Peripheral Bus master
//! - `scoreboard`: Expected-versus-observed checking
//! - `testbench`: Building all of the above from a `tempo.toml`
//! - `error`: Error types

#![warn(missing_docs)]

pub mod data;
pub mod driver;
pub mod error;
pub mod monitor;
pub mod opb;
pub mod scoreboard;
pub mod stream;
pub mod testbench;
pub mod timing;

pub use driver::{BitDriver, BusGuard, BusLock, Driver};
pub use error::{
    ConfigurationError, DriverError, MonitorError, PacketSnapshot, ProtocolError, TestbenchError,
};
pub use monitor::{Capture, Dispatch, Monitor, MonitorBuilder};
pub use opb::{OpbAccess, OpbMaster};
pub use scoreboard::{
    expected_queue, ExpectedQueue, InterfaceId, Mismatch, Scoreboard, ScoreboardFailure, Summary,
};
pub use stream::{
    InterfaceConfig, Packet, PacketAssembler, PacketCapture, StreamDriver, StreamPacketDriver,
    WordCapture,
};
pub use testbench::Testbench;
pub use timing::{TimingSequence, TimingShape};
