//! Avalon-ST style streaming interfaces.
//!
//! A stream moves one data word per accepted transfer. A transfer is
//! accepted on a rising edge where `valid` is high and, if the bus has a
//! `ready` signal, `ready` was high `readyLatency` edges earlier. The
//! packetized variant frames words with `startofpacket`/`endofpacket`,
//! marks unused trailing symbols of the last word with `empty`, and may tag
//! packets with a `channel` id.
//!
//! Interface parameters come from [`StreamConfig`] and are checked against
//! the bound signals once, in [`InterfaceConfig::resolve`].

mod assembler;
mod driver;
mod monitor;

pub use assembler::{BeatSample, PacketAssembler};
pub use driver::{StreamDriver, StreamPacketDriver};
pub use monitor::{PacketCapture, WordCapture};

use std::collections::VecDeque;
use std::fmt::Write;

use tempo_common::SymbolLayout;
use tempo_config::StreamConfig;
use tempo_sim::{Bus, SignalExt};

use crate::error::ConfigurationError;

/// Signals every packetized stream must have.
pub const PACKET_SIGNALS: &[&str] = &["valid", "data", "startofpacket", "endofpacket"];

/// Signals a packetized stream may have.
pub const PACKET_OPTIONAL_SIGNALS: &[&str] = &["ready", "empty", "channel", "error"];

/// Signals every single-word stream must have.
pub const WORD_SIGNALS: &[&str] = &["valid", "data"];

/// Signals a single-word stream may have.
pub const WORD_OPTIONAL_SIGNALS: &[&str] = &["ready"];

/// Widest channel signal an interface may have.
pub const MAX_CHANNEL_WIDTH: u32 = 128;

/// One packet seen on (or destined for) a packetized stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Packet {
    /// Packet contents, first symbol first.
    pub data: Vec<u8>,
    /// Channel id, present when the interface reports channels.
    pub channel: Option<u128>,
}

impl Packet {
    /// A packet without a channel id.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            channel: None,
        }
    }

    /// A packet tagged with `channel`.
    pub fn with_channel(data: impl Into<Vec<u8>>, channel: u128) -> Self {
        Self {
            data: data.into(),
            channel: Some(channel),
        }
    }
}

impl From<Vec<u8>> for Packet {
    fn from(data: Vec<u8>) -> Self {
        Packet::new(data)
    }
}

impl From<&[u8]> for Packet {
    fn from(data: &[u8]) -> Self {
        Packet::new(data)
    }
}

/// Protocol parameters of one interface, checked against its signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceConfig {
    /// Symbol width and ordering.
    pub layout: SymbolLayout,
    /// Symbols carried by one data word.
    pub symbols_per_word: u32,
    /// Highest legal channel id.
    pub max_channel: u128,
    /// Edges between `ready` and the transfer it permits.
    pub ready_latency: u32,
    /// In-packet idle edges tolerated; 0 disables the check.
    pub invalid_timeout: u32,
    /// Whether the bus has an `empty` signal to mask padding with.
    pub use_empty: bool,
    /// Width of the `channel` signal, if there is one.
    pub channel_width: Option<u32>,
    /// Attach the channel id to dispatched packets.
    pub report_channel: bool,
}

impl InterfaceConfig {
    /// Resolves `config` against the signals bound on `bus`.
    pub fn resolve(
        bus: &Bus,
        config: &StreamConfig,
        report_channel: bool,
    ) -> Result<Self, ConfigurationError> {
        let symbols_error = |source| ConfigurationError::Symbols {
            bus: bus.name().to_string(),
            source,
        };
        let layout = SymbolLayout::new(
            config.data_bits_per_symbol,
            config.first_symbol_in_high_order_bits,
        )
        .map_err(symbols_error)?;
        let data = bus.signal("data")?;
        let symbols_per_word = layout.symbols_in(data.width()).map_err(symbols_error)?;

        let channel_width = bus.optional("channel").map(|channel| channel.width());
        let max_channel = match channel_width {
            Some(width) => {
                if width > MAX_CHANNEL_WIDTH {
                    return Err(ConfigurationError::ChannelTooWide {
                        bus: bus.name().to_string(),
                        width,
                        limit: MAX_CHANNEL_WIDTH,
                    });
                }
                let limit = channel_limit(width);
                let max = config.max_channel.map(u128::from).unwrap_or(limit);
                if max > limit {
                    return Err(ConfigurationError::MaxChannelTooLarge {
                        bus: bus.name().to_string(),
                        max,
                        width,
                    });
                }
                max
            }
            None => {
                if report_channel {
                    return Err(ConfigurationError::ChannelUnavailable {
                        bus: bus.name().to_string(),
                    });
                }
                config.max_channel.map(u128::from).unwrap_or(0)
            }
        };

        let resolved = Self {
            layout,
            symbols_per_word,
            max_channel,
            ready_latency: config.ready_latency,
            invalid_timeout: config.invalid_timeout,
            use_empty: bus.has("empty"),
            channel_width,
            report_channel,
        };
        log::debug!("{}: {:?}", bus.name(), resolved);
        Ok(resolved)
    }

    /// Bytes carried by one full data word.
    pub fn bytes_per_word(&self) -> usize {
        self.symbols_per_word as usize * self.layout.bytes_per_symbol()
    }
}

/// All-ones value of a `width`-bit channel signal.
fn channel_limit(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// Tracks `ready` so acceptance can honour a ready latency.
#[derive(Debug, Clone)]
pub(crate) struct ReadyHistory {
    latency: usize,
    samples: VecDeque<bool>,
}

impl ReadyHistory {
    pub(crate) fn new(latency: u32) -> Self {
        Self {
            latency: latency as usize,
            samples: VecDeque::with_capacity(latency as usize + 1),
        }
    }

    /// Records this edge's `ready` and returns the one that governs this
    /// edge's transfer.
    pub(crate) fn push(&mut self, ready: bool) -> bool {
        self.samples.push_front(ready);
        self.samples.truncate(self.latency + 1);
        self.samples.get(self.latency).copied().unwrap_or(false)
    }
}

/// True if the optional `ready` signal on `bus` is high, or absent.
pub(crate) fn ready_level(bus: &Bus) -> bool {
    bus.optional("ready").map_or(true, |ready| ready.is_high())
}

/// Formats `bytes` as a classic 16-bytes-per-line hexdump.
pub(crate) fn hexdump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (line, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:04x}  ", line * 16);
        for byte in chunk {
            let _ = write!(out, "{byte:02x} ");
        }
        for _ in chunk.len()..16 {
            out.push_str("   ");
        }
        out.push(' ');
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                char::from(b)
            } else {
                '.'
            }
        }));
        out.push('\n');
    }
    out
}
