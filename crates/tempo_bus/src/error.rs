//! Error types for the bus engines.
//!
//! Construction problems surface as [`ConfigurationError`], stream protocol
//! violations as [`ProtocolError`] wrapped in a [`MonitorError`] that names
//! the interface, and failed sends as [`DriverError`]. Building a
//! testbench from a configuration file can fail with a [`TestbenchError`].

use std::fmt;

use tempo_common::SymbolError;
use tempo_config::{ConfigError, InterfaceKind};
use tempo_sim::SimError;

/// Errors raised while constructing a monitor or driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// Signal binding failed.
    #[error(transparent)]
    Sim(#[from] SimError),

    /// Channel reporting was requested on a bus without a channel signal.
    #[error("{bus}: channel reporting requested but the bus has no channel signal")]
    ChannelUnavailable {
        /// The bus prefix.
        bus: String,
    },

    /// The channel signal is wider than a channel id can be.
    #[error("{bus}: channel signal is {width} bits wide (at most {limit} supported)")]
    ChannelTooWide {
        /// The bus prefix.
        bus: String,
        /// Width of the channel signal.
        width: u32,
        /// Widest supported channel signal.
        limit: u32,
    },

    /// `maxChannel` cannot be represented on the channel signal.
    #[error("{bus}: maxChannel {max} does not fit a {width}-bit channel signal")]
    MaxChannelTooLarge {
        /// The bus prefix.
        bus: String,
        /// The configured maximum.
        max: u128,
        /// Width of the channel signal (0 when absent).
        width: u32,
    },

    /// The data signal cannot be split into symbols.
    #[error("{bus}: {source}")]
    Symbols {
        /// The bus prefix.
        bus: String,
        /// The underlying layout problem.
        source: SymbolError,
    },
}

/// A stream protocol violation observed on the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Start-of-packet while a packet was already open.
    #[error("duplicate start-of-packet")]
    DuplicateStartOfPacket,

    /// An accepted transfer with no open packet and no start-of-packet.
    #[error("data transfer outside a packet")]
    DataOutsidePacket,

    /// A control signal was X or Z on an accepted transfer.
    #[error("{signal} is unresolvable on an accepted transfer: {value}")]
    UnresolvableControl {
        /// Logical signal name.
        signal: &'static str,
        /// The raw bits.
        value: String,
    },

    /// A full data word contained X or Z bits.
    #[error("unresolvable data: {0}")]
    UnresolvableData(SymbolError),

    /// The symbols left after removing `empty` padding contained X or Z bits.
    #[error("unresolvable data after masking {empty} empty symbols: {source}")]
    UnresolvableAfterMask {
        /// The `empty` value of the terminal transfer.
        empty: u32,
        /// The offending symbol.
        source: SymbolError,
    },

    /// `empty` claims at least as many symbols as the word holds.
    #[error("empty value {empty} is out of range for a {symbols}-symbol word")]
    EmptyOutOfRange {
        /// The `empty` value of the terminal transfer.
        empty: u64,
        /// Symbols per data word.
        symbols: u32,
    },

    /// The latched channel id exceeds the configured maximum.
    #[error("channel {channel} exceeds maxChannel {max}")]
    ChannelOutOfRange {
        /// The channel id seen.
        channel: u128,
        /// The configured maximum.
        max: u128,
    },

    /// The channel id changed before end-of-packet.
    #[error("channel changed from {latched} to {seen} within a packet")]
    ChannelChanged {
        /// The id latched on the first transfer.
        latched: u128,
        /// The id seen on a later transfer.
        seen: u128,
    },

    /// Too many consecutive non-accepted cycles inside a packet.
    #[error("in-packet timeout after {cycles} cycles without a transfer")]
    InPacketTimeout {
        /// The configured threshold.
        cycles: u32,
    },
}

/// Decoded state of an interface at the moment it failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketSnapshot {
    /// Whether a packet was open.
    pub in_packet: bool,
    /// Bytes assembled so far.
    pub bytes: Vec<u8>,
    /// Channel latched for the open packet.
    pub channel: Option<u128>,
    /// Consecutive cycles without an accepted transfer.
    pub invalid_run: u32,
}

impl fmt::Display for PacketSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.in_packet {
            return write!(f, "idle");
        }
        write!(f, "in packet, {} bytes", self.bytes.len())?;
        if let Some(channel) = self.channel {
            write!(f, ", channel {channel}")?;
        }
        if self.invalid_run > 0 {
            write!(f, ", {} idle cycles", self.invalid_run)?;
        }
        Ok(())
    }
}

/// A fatal condition on a monitored interface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitorError {
    /// The bus violated the stream protocol.
    #[error("{interface}: {source} ({state})")]
    Protocol {
        /// The bus prefix.
        interface: String,
        /// State when the violation was detected.
        state: PacketSnapshot,
        /// The violation.
        source: ProtocolError,
    },

    /// The host failed underneath the monitor.
    #[error("{interface}: {source}")]
    Sim {
        /// The bus prefix.
        interface: String,
        /// The host error.
        source: SimError,
    },
}

impl MonitorError {
    /// The protocol violation, if that is what stopped the monitor.
    pub fn protocol(&self) -> Option<&ProtocolError> {
        match self {
            MonitorError::Protocol { source, .. } => Some(source),
            MonitorError::Sim { .. } => None,
        }
    }
}

/// Errors raised while sending a transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// No acknowledgement within the allowed number of cycles.
    #[error("{bus}: bus timeout after {cycles} cycles")]
    BusTimeout {
        /// The bus prefix.
        bus: String,
        /// Cycles waited.
        cycles: u32,
    },

    /// The transaction cannot be put on this bus.
    #[error("{bus}: {source}")]
    Encode {
        /// The bus prefix.
        bus: String,
        /// The layout problem.
        source: SymbolError,
    },

    /// A packet with no bytes cannot be framed.
    #[error("{bus}: cannot send an empty packet")]
    EmptyPacket {
        /// The bus prefix.
        bus: String,
    },

    /// The transaction names a channel but the bus has none.
    #[error("{bus}: transaction has a channel but the bus has no channel signal")]
    NoChannelSignal {
        /// The bus prefix.
        bus: String,
    },

    /// A read completed but the returned data had `X`/`Z` bits.
    #[error("{bus}: read of address {address:#x} returned unresolvable data {value}")]
    UnresolvableRead {
        /// The bus prefix.
        bus: String,
        /// The address that was read.
        address: u64,
        /// The sampled data bus.
        value: String,
    },

    /// The host failed underneath the driver.
    #[error(transparent)]
    Sim(#[from] SimError),
}

/// Errors raised while building components from a `tempo.toml`.
#[derive(Debug, thiserror::Error)]
pub enum TestbenchError {
    /// The configuration file is missing an entry.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A component could not be bound to the host.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The clock could not be started.
    #[error(transparent)]
    Sim(#[from] SimError),

    /// The interface is configured for a different engine.
    #[error("interface '{interface}' is configured as {actual:?}, not {wanted:?}")]
    WrongKind {
        /// The interface name.
        interface: String,
        /// The configured engine.
        actual: InterfaceKind,
        /// The engine that was asked for.
        wanted: InterfaceKind,
    },
}
