//! Building monitors, drivers and timing patterns from a `tempo.toml`.

use tempo_config::{InterfaceKind, InterfaceSpec, TestbenchConfig};
use tempo_sim::{Clock, SimHost, SimTime, TaskHandle};

use crate::error::TestbenchError;
use crate::monitor::Monitor;
use crate::scoreboard::Scoreboard;
use crate::stream::{Packet, PacketCapture, StreamDriver, StreamPacketDriver, WordCapture};
use crate::timing::{TimingSequence, TimingShape};

/// A running clock plus the configuration the testbench was loaded from.
pub struct Testbench {
    config: TestbenchConfig,
    host: SimHost,
    clock: Clock,
    seed: u64,
    _clock_task: TaskHandle<()>,
}

impl Testbench {
    /// Starts the configured clock on `host`.
    ///
    /// Without a configured seed one is drawn at random and logged, so a
    /// failing run can be repeated.
    pub fn start(config: TestbenchConfig, host: SimHost) -> Result<Self, TestbenchError> {
        let meta = &config.testbench;
        let (clock, task) = host.start_clock(&meta.clock, SimTime::from_steps(meta.clock_period))?;
        let seed = match meta.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random();
                log::info!("{}: no seed configured, using {seed}", meta.name);
                seed
            }
        };
        log::debug!(
            "{}: {} interface(s), {} timing pattern(s)",
            meta.name,
            config.interfaces.len(),
            config.timing.len()
        );
        Ok(Self {
            config,
            host,
            clock,
            seed,
            _clock_task: task,
        })
    }

    /// The loaded configuration.
    pub fn config(&self) -> &TestbenchConfig {
        &self.config
    }

    /// The simulation host.
    pub fn host(&self) -> &SimHost {
        &self.host
    }

    /// The testbench clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// The seed every random pattern is derived from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn interface(&self, name: &str, wanted: InterfaceKind) -> Result<&InterfaceSpec, TestbenchError> {
        let spec = self.config.interface(name)?;
        if spec.kind != wanted {
            return Err(TestbenchError::WrongKind {
                interface: name.to_string(),
                actual: spec.kind,
                wanted,
            });
        }
        Ok(spec)
    }

    /// Starts a packet monitor on the `stream-packets` interface `name`.
    pub fn packet_monitor(&self, name: &str) -> Result<Monitor<Packet>, TestbenchError> {
        let spec = self.interface(name, InterfaceKind::StreamPackets)?;
        let capture =
            PacketCapture::new(&self.host, name, &self.clock, &spec.stream, spec.report_channel)?;
        Ok(Monitor::spawn(name, capture))
    }

    /// Starts a word monitor on the `stream` interface `name`.
    pub fn word_monitor(&self, name: &str) -> Result<Monitor<Vec<u8>>, TestbenchError> {
        let spec = self.interface(name, InterfaceKind::Stream)?;
        let capture = WordCapture::new(&self.host, name, &self.clock, &spec.stream)?;
        Ok(Monitor::spawn(name, capture))
    }

    /// A packet source for the `stream-packets` interface `name`.
    pub fn packet_driver(&self, name: &str) -> Result<StreamPacketDriver, TestbenchError> {
        let spec = self.interface(name, InterfaceKind::StreamPackets)?;
        Ok(StreamPacketDriver::new(&self.host, name, &self.clock, &spec.stream)?)
    }

    /// A word source for the `stream` interface `name`.
    pub fn word_driver(&self, name: &str) -> Result<StreamDriver, TestbenchError> {
        let spec = self.interface(name, InterfaceKind::Stream)?;
        Ok(StreamDriver::new(&self.host, name, &self.clock, &spec.stream)?)
    }

    /// The named timing pattern. Each pattern gets its own random stream,
    /// derived from the testbench seed and the pattern's position in the
    /// configuration.
    pub fn timing(&self, name: &str) -> Result<TimingShape, TestbenchError> {
        let spec = self.config.timing(name)?;
        let index = self.config.timing.keys().take_while(|key| *key != name).count();
        Ok(TimingShape::from_spec(spec, self.seed.wrapping_add(index as u64)))
    }

    /// A fresh sequence of the named timing pattern.
    pub fn timing_sequence(&self, name: &str) -> Result<TimingSequence, TestbenchError> {
        Ok(self.timing(name)?.sequence())
    }

    /// A scoreboard with the configured policy.
    pub fn scoreboard<T>(&self) -> Scoreboard<T>
    where
        T: PartialEq + std::fmt::Debug + Clone + Send + 'static,
    {
        Scoreboard::from_config(&self.config.scoreboard)
    }
}
