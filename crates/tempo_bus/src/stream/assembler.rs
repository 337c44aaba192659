//! The packet reassembly state machine.
//!
//! [`PacketAssembler`] is driven with one [`BeatSample`] per rising edge and
//! knows nothing about clocks or hosts, which keeps every protocol rule
//! testable without a runtime.

use std::mem;

use tempo_common::LogicVec;

use crate::error::{MonitorError, PacketSnapshot, ProtocolError};
use crate::stream::{InterfaceConfig, Packet};

/// Bus values sampled on one rising edge.
#[derive(Debug, Clone)]
pub struct BeatSample {
    /// The interface was held in reset.
    pub in_reset: bool,
    /// A transfer was accepted (`valid`, and `ready` where applicable).
    pub accepted: bool,
    /// `startofpacket`.
    pub startofpacket: LogicVec,
    /// `endofpacket`.
    pub endofpacket: LogicVec,
    /// `data`.
    pub data: LogicVec,
    /// `empty`, if the bus has it.
    pub empty: Option<LogicVec>,
    /// `channel`, if the bus has it.
    pub channel: Option<LogicVec>,
}

impl BeatSample {
    /// An accepted transfer with the given framing bits and no optional
    /// signals.
    pub fn transfer(sop: bool, eop: bool, data: LogicVec) -> Self {
        Self {
            in_reset: false,
            accepted: true,
            startofpacket: LogicVec::from_bool(sop),
            endofpacket: LogicVec::from_bool(eop),
            data,
            empty: None,
            channel: None,
        }
    }

    /// An edge without an accepted transfer.
    pub fn idle(data_width: u32) -> Self {
        Self {
            accepted: false,
            ..Self::transfer(false, false, LogicVec::unknown(data_width))
        }
    }

    /// An edge with the interface in reset.
    pub fn reset(data_width: u32) -> Self {
        Self {
            in_reset: true,
            ..Self::idle(data_width)
        }
    }

    /// Sets the `empty` value.
    pub fn with_empty(mut self, empty: LogicVec) -> Self {
        self.empty = Some(empty);
        self
    }

    /// Sets the `channel` value.
    pub fn with_channel(mut self, channel: LogicVec) -> Self {
        self.channel = Some(channel);
        self
    }
}

/// Reassembles packets from accepted transfers.
#[derive(Debug, Clone)]
pub struct PacketAssembler {
    interface: String,
    config: InterfaceConfig,
    in_packet: bool,
    bytes: Vec<u8>,
    invalid_run: u32,
    channel: Option<u128>,
}

impl PacketAssembler {
    /// Creates an idle assembler for the interface named `interface`.
    pub fn new(interface: impl Into<String>, config: InterfaceConfig) -> Self {
        Self {
            interface: interface.into(),
            config,
            in_packet: false,
            bytes: Vec::new(),
            invalid_run: 0,
            channel: None,
        }
    }

    /// The resolved interface parameters.
    pub fn config(&self) -> &InterfaceConfig {
        &self.config
    }

    /// True while a packet is open.
    pub fn in_packet(&self) -> bool {
        self.in_packet
    }

    /// The current decoded state.
    pub fn snapshot(&self) -> PacketSnapshot {
        PacketSnapshot {
            in_packet: self.in_packet,
            bytes: self.bytes.clone(),
            channel: self.channel,
            invalid_run: self.invalid_run,
        }
    }

    /// Returns to idle, dropping any partial packet.
    pub fn clear(&mut self) {
        self.in_packet = false;
        self.bytes.clear();
        self.invalid_run = 0;
        self.channel = None;
    }

    /// Advances by one rising edge. Returns a packet when `beat` completes
    /// one. Any error leaves the assembler idle.
    pub fn step(&mut self, beat: &BeatSample) -> Result<Option<Packet>, MonitorError> {
        match self.advance(beat) {
            Ok(packet) => Ok(packet),
            Err(source) => {
                let state = self.snapshot();
                self.clear();
                Err(MonitorError::Protocol {
                    interface: self.interface.clone(),
                    state,
                    source,
                })
            }
        }
    }

    fn advance(&mut self, beat: &BeatSample) -> Result<Option<Packet>, ProtocolError> {
        if beat.in_reset {
            if self.in_packet {
                log::debug!(
                    "{}: reset dropped a partial packet of {} bytes",
                    self.interface,
                    self.bytes.len()
                );
            }
            self.clear();
            return Ok(None);
        }

        if !beat.accepted {
            if self.in_packet {
                self.invalid_run = self.invalid_run.saturating_add(1);
                let limit = self.config.invalid_timeout;
                if limit > 0 && self.invalid_run >= limit {
                    return Err(ProtocolError::InPacketTimeout { cycles: limit });
                }
            }
            return Ok(None);
        }
        self.invalid_run = 0;

        if control("startofpacket", &beat.startofpacket)? {
            if self.in_packet {
                return Err(ProtocolError::DuplicateStartOfPacket);
            }
            self.in_packet = true;
            self.bytes.clear();
        }
        if !self.in_packet {
            return Err(ProtocolError::DataOutsidePacket);
        }

        let terminal = control("endofpacket", &beat.endofpacket)?;
        if terminal {
            let bytes = self.decode_terminal(beat)?;
            self.bytes.extend_from_slice(&bytes);
        } else {
            let bytes = self
                .config
                .layout
                .decode(&beat.data)
                .map_err(ProtocolError::UnresolvableData)?;
            self.bytes.extend_from_slice(&bytes);
        }

        if let Some(channel) = &beat.channel {
            let seen = channel
                .to_u128()
                .ok_or_else(|| unresolvable("channel", channel))?;
            match self.channel {
                None => {
                    if seen > self.config.max_channel {
                        return Err(ProtocolError::ChannelOutOfRange {
                            channel: seen,
                            max: self.config.max_channel,
                        });
                    }
                    self.channel = Some(seen);
                }
                Some(latched) if latched != seen => {
                    return Err(ProtocolError::ChannelChanged { latched, seen });
                }
                Some(_) => {}
            }
        }

        if !terminal {
            return Ok(None);
        }
        let packet = Packet {
            data: mem::take(&mut self.bytes),
            channel: if self.config.report_channel {
                self.channel
            } else {
                None
            },
        };
        self.clear();
        Ok(Some(packet))
    }

    /// Decodes the last word of a packet, leaving out `empty` padding.
    fn decode_terminal(&self, beat: &BeatSample) -> Result<Vec<u8>, ProtocolError> {
        let symbols = self.config.symbols_per_word;
        let empty = match (&beat.empty, self.config.use_empty) {
            (Some(empty), true) => empty
                .to_u64()
                .ok_or_else(|| unresolvable("empty", empty))?,
            _ => 0,
        };
        if empty >= u64::from(symbols) {
            return Err(ProtocolError::EmptyOutOfRange { empty, symbols });
        }
        let empty = empty as u32;
        self.config
            .layout
            .decode_prefix(&beat.data, symbols - empty)
            .map_err(|source| ProtocolError::UnresolvableAfterMask { empty, source })
    }
}

/// Reads a 1-bit framing signal of an accepted transfer.
fn control(signal: &'static str, value: &LogicVec) -> Result<bool, ProtocolError> {
    value
        .to_u64()
        .map(|v| v != 0)
        .ok_or_else(|| unresolvable(signal, value))
}

fn unresolvable(signal: &'static str, value: &LogicVec) -> ProtocolError {
    ProtocolError::UnresolvableControl {
        signal,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_common::{SymbolError, SymbolLayout};

    fn config(width: u32, first_high: bool) -> InterfaceConfig {
        let layout = SymbolLayout::new(8, first_high).unwrap();
        InterfaceConfig {
            layout,
            symbols_per_word: layout.symbols_in(width).unwrap(),
            max_channel: 3,
            ready_latency: 0,
            invalid_timeout: 0,
            use_empty: true,
            channel_width: Some(2),
            report_channel: false,
        }
    }

    fn word(value: u64) -> LogicVec {
        LogicVec::from_u64(value, 32)
    }

    fn err(result: Result<Option<Packet>, MonitorError>) -> ProtocolError {
        result.unwrap_err().protocol().cloned().unwrap()
    }

    #[test]
    fn single_word_packet() {
        let mut asm = PacketAssembler::new("aso", config(32, true));
        let packet = asm
            .step(&BeatSample::transfer(true, true, word(0x0102_0304)))
            .unwrap();
        assert_eq!(packet, Some(Packet::new(vec![1, 2, 3, 4])));
        assert!(!asm.in_packet());
    }

    #[test]
    fn multi_word_packet_with_padding() {
        let mut asm = PacketAssembler::new("aso", config(32, true));
        assert_eq!(
            asm.step(&BeatSample::transfer(true, false, word(0x0102_0304))).unwrap(),
            None
        );
        assert!(asm.in_packet());
        assert_eq!(asm.step(&BeatSample::idle(32)).unwrap(), None);
        let mut last = LogicVec::unknown(32);
        last.write_slice(24, &LogicVec::from_u64(0x05, 8));
        let packet = asm
            .step(&BeatSample::transfer(false, true, last).with_empty(LogicVec::from_u64(3, 2)))
            .unwrap()
            .unwrap();
        assert_eq!(packet.data, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn little_endian_symbol_order_and_padding() {
        let mut asm = PacketAssembler::new("aso", config(32, false));
        let mut last = LogicVec::unknown(32);
        last.write_slice(0, &LogicVec::from_u64(0x0b0a, 16));
        let packet = asm
            .step(&BeatSample::transfer(true, true, last).with_empty(LogicVec::from_u64(2, 2)))
            .unwrap()
            .unwrap();
        assert_eq!(packet.data, vec![0x0a, 0x0b]);
    }

    #[test]
    fn byte_length_follows_padding() {
        for padding in 0..4u64 {
            let mut asm = PacketAssembler::new("aso", config(32, true));
            asm.step(&BeatSample::transfer(true, false, word(0))).unwrap();
            asm.step(&BeatSample::transfer(false, false, word(0))).unwrap();
            let packet = asm
                .step(
                    &BeatSample::transfer(false, true, word(0))
                        .with_empty(LogicVec::from_u64(padding, 2)),
                )
                .unwrap()
                .unwrap();
            assert_eq!(packet.data.len(), 2 * 4 + (4 - padding as usize));
        }
    }

    #[test]
    fn duplicate_start_of_packet() {
        let mut asm = PacketAssembler::new("aso", config(32, true));
        asm.step(&BeatSample::transfer(true, false, word(1))).unwrap();
        let error = asm
            .step(&BeatSample::transfer(true, false, word(2)))
            .unwrap_err();
        assert_eq!(error.protocol(), Some(&ProtocolError::DuplicateStartOfPacket));
        match error {
            MonitorError::Protocol { interface, state, .. } => {
                assert_eq!(interface, "aso");
                assert!(state.in_packet);
                assert_eq!(state.bytes, vec![0, 0, 0, 1]);
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(!asm.in_packet());
    }

    #[test]
    fn data_outside_packet() {
        let mut asm = PacketAssembler::new("aso", config(32, true));
        assert_eq!(
            err(asm.step(&BeatSample::transfer(false, false, word(1)))),
            ProtocolError::DataOutsidePacket
        );
    }

    #[test]
    fn unresolvable_middle_word() {
        let mut asm = PacketAssembler::new("aso", config(32, true));
        asm.step(&BeatSample::transfer(true, false, word(1))).unwrap();
        assert!(matches!(
            err(asm.step(&BeatSample::transfer(false, false, LogicVec::unknown(32)))),
            ProtocolError::UnresolvableData(SymbolError::Unresolvable { index: 0, .. })
        ));
    }

    #[test]
    fn unresolvable_after_mask() {
        let mut asm = PacketAssembler::new("aso", config(32, true));
        let mut last = LogicVec::unknown(32);
        last.write_slice(24, &LogicVec::from_u64(0x05, 8));
        assert!(matches!(
            err(asm.step(
                &BeatSample::transfer(true, true, last).with_empty(LogicVec::from_u64(2, 2))
            )),
            ProtocolError::UnresolvableAfterMask { empty: 2, .. }
        ));
    }

    #[test]
    fn channel_latched_and_checked() {
        let mut cfg = config(32, true);
        cfg.report_channel = true;
        let mut asm = PacketAssembler::new("aso", cfg);
        let ch = |v| LogicVec::from_u64(v, 2);
        asm.step(&BeatSample::transfer(true, false, word(1)).with_channel(ch(1)))
            .unwrap();
        let packet = asm
            .step(&BeatSample::transfer(false, true, word(2)).with_channel(ch(1)))
            .unwrap()
            .unwrap();
        assert_eq!(packet.channel, Some(1));

        asm.step(&BeatSample::transfer(true, false, word(1)).with_channel(ch(1)))
            .unwrap();
        let error = err(asm.step(&BeatSample::transfer(false, true, word(2)).with_channel(ch(2))));
        assert_eq!(error, ProtocolError::ChannelChanged { latched: 1, seen: 2 });
        assert!(!asm.in_packet());
    }

    #[test]
    fn channel_above_max() {
        let mut cfg = config(32, true);
        cfg.max_channel = 1;
        let mut asm = PacketAssembler::new("aso", cfg);
        let error = err(asm.step(
            &BeatSample::transfer(true, true, word(1)).with_channel(LogicVec::from_u64(2, 2)),
        ));
        assert_eq!(error, ProtocolError::ChannelOutOfRange { channel: 2, max: 1 });
    }

    #[test]
    fn channel_not_reported_by_default() {
        let mut asm = PacketAssembler::new("aso", config(32, true));
        let packet = asm
            .step(&BeatSample::transfer(true, true, word(1)).with_channel(LogicVec::from_u64(3, 2)))
            .unwrap()
            .unwrap();
        assert_eq!(packet.channel, None);
    }

    #[test]
    fn timeout_fires_on_nth_idle_edge() {
        let mut cfg = config(32, true);
        cfg.invalid_timeout = 3;
        let mut asm = PacketAssembler::new("aso", cfg);
        asm.step(&BeatSample::transfer(true, false, word(1))).unwrap();
        assert!(asm.step(&BeatSample::idle(32)).is_ok());
        assert!(asm.step(&BeatSample::idle(32)).is_ok());
        assert_eq!(
            err(asm.step(&BeatSample::idle(32))),
            ProtocolError::InPacketTimeout { cycles: 3 }
        );
    }

    #[test]
    fn accepted_transfer_restarts_timeout() {
        let mut cfg = config(32, true);
        cfg.invalid_timeout = 2;
        let mut asm = PacketAssembler::new("aso", cfg);
        asm.step(&BeatSample::transfer(true, false, word(1))).unwrap();
        asm.step(&BeatSample::idle(32)).unwrap();
        asm.step(&BeatSample::transfer(false, false, word(2))).unwrap();
        asm.step(&BeatSample::idle(32)).unwrap();
        assert_eq!(asm.snapshot().invalid_run, 1);
    }

    #[test]
    fn endless_stall_without_timeout_saturates() {
        let mut asm = PacketAssembler::new("aso", config(32, true));
        asm.step(&BeatSample::transfer(true, false, word(1))).unwrap();
        asm.invalid_run = u32::MAX - 1;
        for _ in 0..3 {
            assert_eq!(asm.step(&BeatSample::idle(32)).unwrap(), None);
        }
        assert_eq!(asm.snapshot().invalid_run, u32::MAX);
        assert!(asm.in_packet());
    }

    #[test]
    fn idle_edges_outside_packet_do_not_count() {
        let mut cfg = config(32, true);
        cfg.invalid_timeout = 1;
        let mut asm = PacketAssembler::new("aso", cfg);
        for _ in 0..5 {
            assert_eq!(asm.step(&BeatSample::idle(32)).unwrap(), None);
        }
    }

    #[test]
    fn reset_returns_to_idle_silently() {
        let mut asm = PacketAssembler::new("aso", config(32, true));
        asm.step(&BeatSample::transfer(true, false, word(1))).unwrap();
        assert_eq!(asm.step(&BeatSample::reset(32)).unwrap(), None);
        assert_eq!(asm.snapshot(), PacketSnapshot::default());
        // A new packet may start cleanly after reset.
        assert!(asm.step(&BeatSample::transfer(true, true, word(7))).unwrap().is_some());
    }

    #[test]
    fn reset_preempts_framing_errors() {
        let mut asm = PacketAssembler::new("aso", config(32, true));
        let mut beat = BeatSample::transfer(false, false, word(1));
        beat.in_reset = true;
        assert_eq!(asm.step(&beat).unwrap(), None);
    }

    #[test]
    fn empty_covering_whole_word_rejected() {
        let mut asm = PacketAssembler::new("aso", config(32, true));
        assert_eq!(
            err(asm.step(
                &BeatSample::transfer(true, true, word(1)).with_empty(LogicVec::from_u64(4, 3))
            )),
            ProtocolError::EmptyOutOfRange { empty: 4, symbols: 4 }
        );
    }

    #[test]
    fn unresolvable_framing_bit() {
        let mut asm = PacketAssembler::new("aso", config(32, true));
        let mut beat = BeatSample::transfer(true, true, word(1));
        beat.startofpacket = LogicVec::unknown(1);
        assert!(matches!(
            err(asm.step(&beat)),
            ProtocolError::UnresolvableControl { signal: "startofpacket", .. }
        ));
    }
}
