//! Sources for streaming interfaces.
//!
//! Both drivers write a word at a rising edge, check `ready` in the
//! read-only phase of the same cycle, and hold the word until the edge on
//! which it is accepted. They assume a ready latency of zero.

use tempo_common::{LogicVec, SymbolLayout};
use tempo_config::StreamConfig;
use tempo_sim::{Bus, Clock, Reset, SignalExt, SignalHost, SignalRef};
use tokio::sync::Mutex;

use crate::driver::{BusLock, Driver, IdleGate, IdleOnDrop};
use crate::error::{ConfigurationError, DriverError};
use crate::stream::{
    InterfaceConfig, Packet, PACKET_OPTIONAL_SIGNALS, PACKET_SIGNALS, WORD_OPTIONAL_SIGNALS,
    WORD_SIGNALS,
};
use crate::timing::TimingSequence;

/// State shared by the single-word and packet sources.
struct Source {
    name: String,
    clock: Clock,
    reset: Option<Reset>,
    valid: SignalRef,
    ready: Option<SignalRef>,
    lock: BusLock,
    gate: Mutex<IdleGate>,
    ready_timeout: Option<u32>,
}

impl Source {
    fn new(bus: &Bus, clock: &Clock) -> Result<Self, ConfigurationError> {
        let valid = bus.signal("valid")?;
        valid.set_bool(false).map_err(ConfigurationError::from)?;
        Ok(Self {
            name: bus.name().to_string(),
            clock: clock.clone(),
            reset: None,
            valid,
            ready: bus.optional("ready"),
            lock: BusLock::new(),
            gate: Mutex::new(IdleGate::always_on()),
            ready_timeout: None,
        })
    }

    fn in_reset(&self) -> bool {
        self.reset.as_ref().is_some_and(Reset::is_asserted)
    }

    fn encode_error(&self) -> impl Fn(tempo_common::SymbolError) -> DriverError + '_ {
        |source| DriverError::Encode {
            bus: self.name.clone(),
            source,
        }
    }

    async fn wait_out_of_reset(&self) -> Result<(), DriverError> {
        while self.in_reset() {
            self.clock.rising_edge().await?;
        }
        Ok(())
    }

    /// Waits until the word written at this edge will be accepted on the
    /// next one.
    async fn wait_ready(&self) -> Result<(), DriverError> {
        let Some(ready) = &self.ready else {
            return Ok(());
        };
        self.clock.read_only().await?;
        let mut waited = 0;
        while !ready.is_high() {
            if self.ready_timeout.is_some_and(|limit| waited >= limit) {
                return Err(DriverError::BusTimeout {
                    bus: self.name.clone(),
                    cycles: waited,
                });
            }
            self.clock.rising_edge().await?;
            self.clock.read_only().await?;
            waited += 1;
        }
        Ok(())
    }
}

/// Drives a single-word stream: every transaction is one data word.
pub struct StreamDriver {
    source: Source,
    data: SignalRef,
    layout: SymbolLayout,
}

impl StreamDriver {
    /// Binds the stream `name` on `host` and idles `valid`.
    pub fn new(
        host: &dyn SignalHost,
        name: &str,
        clock: &Clock,
        config: &StreamConfig,
    ) -> Result<Self, ConfigurationError> {
        let bus = Bus::bind(host, name, WORD_SIGNALS, WORD_OPTIONAL_SIGNALS)?;
        let resolved = InterfaceConfig::resolve(&bus, config, false)?;
        Ok(Self {
            source: Source::new(&bus, clock)?,
            data: bus.signal("data")?,
            layout: resolved.layout,
        })
    }

    /// Holds transactions back while `reset` is asserted.
    pub fn with_reset(mut self, reset: Reset) -> Self {
        self.source.reset = Some(reset);
        self
    }

    /// Fails a send that sees `ready` low for `cycles` edges in a row.
    pub fn with_ready_timeout(mut self, cycles: u32) -> Self {
        self.source.ready_timeout = Some(cycles);
        self
    }

    /// True while the reset input is asserted.
    pub fn in_reset(&self) -> bool {
        self.source.in_reset()
    }

    /// Replaces the idle pattern; `None` sends words back to back.
    pub async fn set_idle_generator(&self, sequence: Option<TimingSequence>) {
        *self.source.gate.lock().await = sequence.map_or_else(IdleGate::always_on, IdleGate::new);
    }

    /// Sends one word. Short words are padded with zero symbols after the
    /// last byte.
    ///
    /// Without `sync` the caller must already be at a rising edge.
    pub async fn send_word(&self, bytes: &[u8], sync: bool) -> Result<(), DriverError> {
        self.send_all([bytes], sync).await
    }

    /// Sends several words back to back, holding the bus in between.
    pub async fn send_all<I>(&self, words: I, sync: bool) -> Result<(), DriverError>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let encoded = words
            .into_iter()
            .map(|bytes| {
                self.layout
                    .encode(bytes.as_ref(), self.data.width())
                    .map(|(word, _)| word)
                    .map_err(self.source.encode_error())
            })
            .collect::<Result<Vec<LogicVec>, _>>()?;

        let source = &self.source;
        let _bus = source.lock.acquire().await;
        let mut gate = source.gate.lock().await;
        let idle = IdleOnDrop::new(vec![source.valid.clone()]);
        if sync {
            source.clock.rising_edge().await?;
        }
        source.wait_out_of_reset().await?;
        for (index, word) in encoded.into_iter().enumerate() {
            if index > 0 {
                source.clock.rising_edge().await?;
            }
            gate.before_word(&source.clock, &source.valid).await?;
            log::debug!("{}: sending word {}", source.name, word);
            source.valid.set_bool(true)?;
            self.data.set_value(word)?;
            source.wait_ready().await?;
        }
        source.clock.rising_edge().await?;
        source.valid.set_bool(false)?;
        idle.disarm();
        Ok(())
    }
}

impl Driver for StreamDriver {
    type Transaction = Vec<u8>;
    type Response = ();

    async fn send(&self, transaction: Vec<u8>, sync: bool) -> Result<(), DriverError> {
        self.send_word(&transaction, sync).await
    }
}

/// One framed word of a packet, ready to drive.
struct Beat {
    word: LogicVec,
    empty: u32,
    startofpacket: bool,
    endofpacket: bool,
}

/// Drives a packetized stream.
pub struct StreamPacketDriver {
    source: Source,
    data: SignalRef,
    startofpacket: SignalRef,
    endofpacket: SignalRef,
    empty: Option<SignalRef>,
    channel: Option<SignalRef>,
    config: InterfaceConfig,
}

impl StreamPacketDriver {
    /// Binds the packetized stream `name` on `host` and idles the framing
    /// signals.
    pub fn new(
        host: &dyn SignalHost,
        name: &str,
        clock: &Clock,
        config: &StreamConfig,
    ) -> Result<Self, ConfigurationError> {
        let bus = Bus::bind(host, name, PACKET_SIGNALS, PACKET_OPTIONAL_SIGNALS)?;
        let config = InterfaceConfig::resolve(&bus, config, false)?;
        let startofpacket = bus.signal("startofpacket")?;
        let endofpacket = bus.signal("endofpacket")?;
        startofpacket.set_bool(false)?;
        endofpacket.set_bool(false)?;
        let empty = bus.optional("empty");
        let channel = bus.optional("channel");
        for signal in empty.iter().chain(channel.iter()) {
            signal.set_u64(0)?;
        }
        Ok(Self {
            source: Source::new(&bus, clock)?,
            data: bus.signal("data")?,
            empty,
            channel,
            startofpacket,
            endofpacket,
            config,
        })
    }

    /// Holds packets back while `reset` is asserted.
    pub fn with_reset(mut self, reset: Reset) -> Self {
        self.source.reset = Some(reset);
        self
    }

    /// Fails a send that sees `ready` low for `cycles` edges in a row.
    pub fn with_ready_timeout(mut self, cycles: u32) -> Self {
        self.source.ready_timeout = Some(cycles);
        self
    }

    /// True while the reset input is asserted.
    pub fn in_reset(&self) -> bool {
        self.source.in_reset()
    }

    /// The resolved interface parameters.
    pub fn config(&self) -> &InterfaceConfig {
        &self.config
    }

    /// Replaces the idle pattern used between the words of a packet;
    /// `None` sends every packet without gaps.
    pub async fn set_idle_generator(&self, sequence: Option<TimingSequence>) {
        *self.source.gate.lock().await = sequence.map_or_else(IdleGate::always_on, IdleGate::new);
    }

    fn frame(&self, packet: &Packet) -> Result<Vec<Beat>, DriverError> {
        if packet.data.is_empty() {
            return Err(DriverError::EmptyPacket {
                bus: self.source.name.clone(),
            });
        }
        if packet.channel.is_some() && self.channel.is_none() {
            return Err(DriverError::NoChannelSignal {
                bus: self.source.name.clone(),
            });
        }
        let chunks: Vec<&[u8]> = packet.data.chunks(self.config.bytes_per_word()).collect();
        let last = chunks.len() - 1;
        let beats = chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let (word, empty) = self
                    .config
                    .layout
                    .encode(chunk, self.data.width())
                    .map_err(self.source.encode_error())?;
                Ok(Beat {
                    word,
                    empty,
                    startofpacket: index == 0,
                    endofpacket: index == last,
                })
            })
            .collect::<Result<Vec<_>, DriverError>>()?;
        if self.empty.is_none() && beats.last().is_some_and(|beat| beat.empty > 0) {
            log::warn!(
                "{}: {}-byte packet does not fill its last word and the bus has no empty signal",
                self.source.name,
                packet.data.len()
            );
        }
        Ok(beats)
    }

    /// Sends one packet, framing it across as many words as it needs.
    ///
    /// Without `sync` the caller must already be at a rising edge.
    pub async fn send_packet(&self, packet: &Packet, sync: bool) -> Result<(), DriverError> {
        let beats = self.frame(packet)?;
        let source = &self.source;
        let _bus = source.lock.acquire().await;
        let mut gate = source.gate.lock().await;
        let idle = IdleOnDrop::new(vec![
            source.valid.clone(),
            self.startofpacket.clone(),
            self.endofpacket.clone(),
        ]);
        if sync {
            source.clock.rising_edge().await?;
        }
        source.wait_out_of_reset().await?;
        log::debug!(
            "{}: sending a packet of {} bytes in {} words",
            source.name,
            packet.data.len(),
            beats.len()
        );
        for (index, beat) in beats.into_iter().enumerate() {
            if index > 0 {
                source.clock.rising_edge().await?;
            }
            gate.before_word(&source.clock, &source.valid).await?;
            source.valid.set_bool(true)?;
            self.startofpacket.set_bool(beat.startofpacket)?;
            self.endofpacket.set_bool(beat.endofpacket)?;
            if let Some(empty) = &self.empty {
                empty.set_u64(u64::from(beat.empty))?;
            }
            if let Some(signal) = &self.channel {
                signal.set_u128(packet.channel.unwrap_or(0))?;
            }
            self.data.set_value(beat.word)?;
            source.wait_ready().await?;
        }
        source.clock.rising_edge().await?;
        source.valid.set_bool(false)?;
        self.startofpacket.set_bool(false)?;
        self.endofpacket.set_bool(false)?;
        idle.disarm();
        Ok(())
    }
}

impl Driver for StreamPacketDriver {
    type Transaction = Packet;
    type Response = ();

    async fn send(&self, transaction: Packet, sync: bool) -> Result<(), DriverError> {
        self.send_packet(&transaction, sync).await
    }
}
