//! Capture loops for streaming interfaces.

use tempo_config::StreamConfig;
use tempo_sim::{Bus, Clock, Reset, SignalExt, SignalHost, SignalRef};

use crate::error::{ConfigurationError, MonitorError, PacketSnapshot, ProtocolError};
use crate::monitor::{Capture, Dispatch};
use crate::stream::{
    hexdump, ready_level, BeatSample, InterfaceConfig, Packet, PacketAssembler, ReadyHistory,
    PACKET_OPTIONAL_SIGNALS, PACKET_SIGNALS, WORD_OPTIONAL_SIGNALS, WORD_SIGNALS,
};

/// Samples a packetized stream on every rising edge.
///
/// Spawn it with [`Monitor::spawn`](crate::monitor::Monitor::spawn) or a
/// [`MonitorBuilder`](crate::monitor::MonitorBuilder); the monitor then
/// dispatches one [`Packet`] per completed packet.
pub struct PacketCapture {
    bus: Bus,
    clock: Clock,
    reset: Option<Reset>,
    valid: SignalRef,
    data: SignalRef,
    startofpacket: SignalRef,
    endofpacket: SignalRef,
    ready: ReadyHistory,
    assembler: PacketAssembler,
}

impl PacketCapture {
    /// Binds the packetized stream `name` on `host` and checks `config`
    /// against it.
    pub fn new(
        host: &dyn SignalHost,
        name: &str,
        clock: &Clock,
        config: &StreamConfig,
        report_channel: bool,
    ) -> Result<Self, ConfigurationError> {
        let bus = Bus::bind(host, name, PACKET_SIGNALS, PACKET_OPTIONAL_SIGNALS)?;
        let resolved = InterfaceConfig::resolve(&bus, config, report_channel)?;
        Ok(Self {
            valid: bus.signal("valid")?,
            data: bus.signal("data")?,
            startofpacket: bus.signal("startofpacket")?,
            endofpacket: bus.signal("endofpacket")?,
            ready: ReadyHistory::new(resolved.ready_latency),
            assembler: PacketAssembler::new(name, resolved),
            clock: clock.clone(),
            reset: None,
            bus,
        })
    }

    /// Holds the state machine idle while `reset` is asserted.
    pub fn with_reset(mut self, reset: Reset) -> Self {
        self.reset = Some(reset);
        self
    }

    /// The resolved interface parameters.
    pub fn config(&self) -> &InterfaceConfig {
        self.assembler.config()
    }

    /// True while the reset input is asserted.
    pub fn in_reset(&self) -> bool {
        self.reset.as_ref().is_some_and(Reset::is_asserted)
    }

    fn sample(&mut self) -> BeatSample {
        let ready = self.ready.push(ready_level(&self.bus));
        let config = self.assembler.config();
        BeatSample {
            in_reset: self.in_reset(),
            accepted: self.valid.is_high() && ready,
            startofpacket: self.startofpacket.value(),
            endofpacket: self.endofpacket.value(),
            data: self.data.value(),
            empty: if config.use_empty {
                self.bus.optional("empty").map(|empty| empty.value())
            } else {
                None
            },
            channel: self.bus.optional("channel").map(|channel| channel.value()),
        }
    }
}

impl Capture for PacketCapture {
    type Item = Packet;

    async fn run(mut self, dispatch: Dispatch<Packet>) -> Result<(), MonitorError> {
        loop {
            if self.clock.rising_edge().await.is_err() {
                log::debug!("{}: clock stopped, ending capture", dispatch.name());
                return Ok(());
            }
            let beat = self.sample();
            if let Some(packet) = self.assembler.step(&beat)? {
                log::info!("{}: received a packet of {} bytes", dispatch.name(), packet.data.len());
                log::trace!("{}: packet contents\n{}", dispatch.name(), hexdump(&packet.data));
                dispatch.send(packet);
            }
        }
    }
}

/// Samples a single-word stream: every accepted transfer is one
/// transaction, the data word decoded to bytes.
pub struct WordCapture {
    bus: Bus,
    clock: Clock,
    reset: Option<Reset>,
    valid: SignalRef,
    data: SignalRef,
    ready: ReadyHistory,
    config: InterfaceConfig,
}

impl WordCapture {
    /// Binds the stream `name` on `host`.
    pub fn new(
        host: &dyn SignalHost,
        name: &str,
        clock: &Clock,
        config: &StreamConfig,
    ) -> Result<Self, ConfigurationError> {
        let bus = Bus::bind(host, name, WORD_SIGNALS, WORD_OPTIONAL_SIGNALS)?;
        let resolved = InterfaceConfig::resolve(&bus, config, false)?;
        Ok(Self {
            valid: bus.signal("valid")?,
            data: bus.signal("data")?,
            ready: ReadyHistory::new(resolved.ready_latency),
            config: resolved,
            clock: clock.clone(),
            reset: None,
            bus,
        })
    }

    /// Ignores transfers while `reset` is asserted.
    pub fn with_reset(mut self, reset: Reset) -> Self {
        self.reset = Some(reset);
        self
    }

    /// True while the reset input is asserted.
    pub fn in_reset(&self) -> bool {
        self.reset.as_ref().is_some_and(Reset::is_asserted)
    }
}

impl Capture for WordCapture {
    type Item = Vec<u8>;

    async fn run(mut self, dispatch: Dispatch<Vec<u8>>) -> Result<(), MonitorError> {
        loop {
            if self.clock.rising_edge().await.is_err() {
                log::debug!("{}: clock stopped, ending capture", dispatch.name());
                return Ok(());
            }
            let ready = self.ready.push(ready_level(&self.bus));
            if self.in_reset() || !(self.valid.is_high() && ready) {
                continue;
            }
            let word = self.data.value();
            let bytes = self.config.layout.decode(&word).map_err(|source| {
                MonitorError::Protocol {
                    interface: dispatch.name().to_string(),
                    state: PacketSnapshot::default(),
                    source: ProtocolError::UnresolvableData(source),
                }
            })?;
            log::debug!("{}: received word {}", dispatch.name(), word);
            dispatch.send(bytes);
        }
    }
}
