//! Configuration types deserialized from `tempo.toml`.

use serde::Deserialize;
use std::collections::BTreeMap;

/// The top-level testbench configuration parsed from `tempo.toml`.
#[derive(Debug, Deserialize)]
pub struct TestbenchConfig {
    /// Testbench metadata (name, clock, seed).
    pub testbench: TestbenchMeta,
    /// Scoreboard verdict policy.
    #[serde(default)]
    pub scoreboard: ScoreboardConfig,
    /// Streaming interfaces keyed by their bus prefix (e.g. `stream_out`).
    #[serde(default)]
    pub interfaces: BTreeMap<String, InterfaceSpec>,
    /// Named on/off timing patterns (e.g. `backpressure`, `idle`).
    #[serde(default)]
    pub timing: BTreeMap<String, TimingSpec>,
}

/// Core testbench settings required in every `tempo.toml`.
#[derive(Debug, Deserialize)]
pub struct TestbenchMeta {
    /// The testbench name, used as the logging prefix.
    pub name: String,
    /// Name of the clock signal on the simulation host.
    #[serde(default = "default_clock")]
    pub clock: String,
    /// Clock period in simulation steps.
    #[serde(default = "default_clock_period")]
    pub clock_period: u64,
    /// Seed for every random timing and data source. `None` means the
    /// harness picks one and logs it.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_clock() -> String {
    "clk".to_string()
}

fn default_clock_period() -> u64 {
    10
}

/// How the scoreboard reacts to a mismatch.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// The first mismatch freezes the verdict (default).
    #[default]
    FailImmediately,
    /// Every mismatch is recorded and reported in the final verdict.
    CollectAll,
}

/// Scoreboard settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoreboardConfig {
    /// Mismatch policy.
    #[serde(default)]
    pub policy: FailurePolicy,
    /// How many expected entries past the front an observed transaction may
    /// match. Zero means strict in-order matching.
    #[serde(default)]
    pub reorder_depth: usize,
}

/// Which streaming engine an interface uses.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum InterfaceKind {
    /// Non-packetized: every accepted word is a transaction.
    Stream,
    /// Packetized with start/end-of-packet framing.
    StreamPackets,
}

/// One configured streaming interface.
#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceSpec {
    /// The engine monitoring this interface.
    pub kind: InterfaceKind,
    /// Protocol parameters.
    #[serde(flatten)]
    pub stream: StreamConfig,
    /// Attach the channel id to every dispatched packet.
    #[serde(default, rename = "reportChannel")]
    pub report_channel: bool,
}

/// Protocol parameters of a streaming interface.
///
/// Field names follow the interface parameter names used in bus
/// documentation (`dataBitsPerSymbol`, `firstSymbolInHighOrderBits`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    /// Symbol width in bits.
    #[serde(default = "default_bits_per_symbol")]
    pub data_bits_per_symbol: u32,
    /// Whether the first symbol of a word is carried in its high-order bits.
    #[serde(default = "default_true")]
    pub first_symbol_in_high_order_bits: bool,
    /// Highest legal channel id. `None` means every value the channel
    /// signal can represent (or 0 without a channel signal).
    #[serde(default)]
    pub max_channel: Option<u64>,
    /// Cycles between `ready` and the transfer it permits.
    #[serde(default)]
    pub ready_latency: u32,
    /// Consecutive idle in-packet cycles tolerated; 0 disables the check.
    #[serde(default)]
    pub invalid_timeout: u32,
}

fn default_bits_per_symbol() -> u32 {
    8
}

fn default_true() -> bool {
    true
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            data_bits_per_symbol: default_bits_per_symbol(),
            first_symbol_in_high_order_bits: true,
            max_channel: None,
            ready_latency: 0,
            invalid_timeout: 0,
        }
    }
}

/// A named on/off cycle pattern.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "shape", rename_all = "kebab-case")]
pub enum TimingSpec {
    /// Sine-modulated on and off lengths.
    Wave {
        /// Peak on-length deviation.
        #[serde(default = "default_on_amplitude")]
        on_amplitude: f64,
        /// Samples per on-wave cycle.
        #[serde(default = "default_on_period")]
        on_period: u32,
        /// Peak off-length deviation.
        #[serde(default = "default_off_amplitude")]
        off_amplitude: f64,
        /// Samples per off-wave cycle.
        #[serde(default = "default_off_period")]
        off_period: u32,
    },
    /// Gaussian gaps with a single-cycle pulse.
    Intermittent {
        /// Mean gap length in cycles.
        #[serde(default = "default_mean")]
        mean: f64,
        /// Standard deviation; `mean / 4` when omitted.
        #[serde(default)]
        sigma: Option<f64>,
    },
    /// Symmetric Gaussian on and off lengths.
    Random50 {
        /// Mean length in cycles.
        #[serde(default = "default_mean")]
        mean: f64,
        /// Standard deviation; `mean / 4` when omitted.
        #[serde(default)]
        sigma: Option<f64>,
    },
}

fn default_on_amplitude() -> f64 {
    30.0
}

fn default_on_period() -> u32 {
    200
}

fn default_off_amplitude() -> f64 {
    10.0
}

fn default_off_period() -> u32 {
    100
}

fn default_mean() -> f64 {
    10.0
}
