//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{InterfaceSpec, TestbenchConfig, TimingSpec};
use std::path::Path;

/// File name looked up inside a testbench directory.
pub const CONFIG_FILE_NAME: &str = "tempo.toml";

/// Loads and validates a `tempo.toml` configuration from a testbench directory.
pub fn load_config(testbench_dir: &Path) -> Result<TestbenchConfig, ConfigError> {
    let content = std::fs::read_to_string(testbench_dir.join(CONFIG_FILE_NAME))?;
    load_config_from_str(&content)
}

/// Parses and validates a `tempo.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<TestbenchConfig, ConfigError> {
    let config: TestbenchConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

impl TestbenchConfig {
    /// Looks up an interface by its bus prefix.
    pub fn interface(&self, name: &str) -> Result<&InterfaceSpec, ConfigError> {
        self.interfaces
            .get(name)
            .ok_or_else(|| ConfigError::UnknownInterface(name.to_string()))
    }

    /// Looks up a timing pattern by name.
    pub fn timing(&self, name: &str) -> Result<&TimingSpec, ConfigError> {
        self.timing
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTiming(name.to_string()))
    }
}

/// Validates that required fields are present and values are consistent.
fn validate_config(config: &TestbenchConfig) -> Result<(), ConfigError> {
    if config.testbench.name.is_empty() {
        return Err(ConfigError::MissingField("testbench.name".to_string()));
    }
    if config.testbench.clock.is_empty() {
        return Err(ConfigError::MissingField("testbench.clock".to_string()));
    }
    let period = config.testbench.clock_period;
    if period < 4 || period % 2 != 0 {
        return Err(ConfigError::ValidationError(format!(
            "testbench.clock_period must be an even number of steps >= 4, got {period}"
        )));
    }
    for (name, spec) in &config.interfaces {
        let bits = spec.stream.data_bits_per_symbol;
        if bits == 0 || bits > 64 {
            return Err(ConfigError::ValidationError(format!(
                "interfaces.{name}.dataBitsPerSymbol must be in 1..=64, got {bits}"
            )));
        }
    }
    for (name, spec) in &config.timing {
        match spec {
            TimingSpec::Wave {
                on_period,
                off_period,
                ..
            } => {
                if *on_period == 0 || *off_period == 0 {
                    return Err(ConfigError::ValidationError(format!(
                        "timing.{name}: wave periods must be non-zero"
                    )));
                }
            }
            TimingSpec::Intermittent { mean, sigma } | TimingSpec::Random50 { mean, sigma } => {
                if !mean.is_finite() || sigma.is_some_and(|s| !s.is_finite() || s < 0.0) {
                    return Err(ConfigError::ValidationError(format!(
                        "timing.{name}: mean and sigma must be finite and sigma non-negative"
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FailurePolicy;

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
[testbench]
name = "endian_swapper"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.testbench.name, "endian_swapper");
        assert_eq!(config.testbench.clock, "clk");
        assert_eq!(config.testbench.clock_period, 10);
        assert_eq!(config.testbench.seed, None);
        assert_eq!(config.scoreboard.policy, FailurePolicy::FailImmediately);
        assert_eq!(config.scoreboard.reorder_depth, 0);
        assert!(config.interfaces.is_empty());
        assert!(config.timing.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[testbench]
name = "endian_swapper"
clock = "aclk"
clock_period = 8
seed = 42

[scoreboard]
policy = "collect-all"
reorder_depth = 2

[interfaces.stream_in]
kind = "stream-packets"

[interfaces.stream_out]
kind = "stream-packets"
firstSymbolInHighOrderBits = true
invalidTimeout = 100

[timing.backpressure]
shape = "random50"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.testbench.clock, "aclk");
        assert_eq!(config.testbench.clock_period, 8);
        assert_eq!(config.testbench.seed, Some(42));
        assert_eq!(config.scoreboard.policy, FailurePolicy::CollectAll);
        assert_eq!(config.scoreboard.reorder_depth, 2);
        assert_eq!(config.interface("stream_out").unwrap().stream.invalid_timeout, 100);
        assert!(config.timing("backpressure").is_ok());
    }

    #[test]
    fn missing_name_errors() {
        let toml = r#"
[testbench]
name = ""
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn odd_clock_period_errors() {
        let toml = r#"
[testbench]
name = "tb"
clock_period = 7
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn bad_symbol_width_errors() {
        let toml = r#"
[testbench]
name = "tb"

[interfaces.aso]
kind = "stream"
dataBitsPerSymbol = 0
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn zero_wave_period_errors() {
        let toml = r#"
[testbench]
name = "tb"

[timing.idle]
shape = "wave"
off_period = 0
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn unknown_lookups_error() {
        let config = load_config_from_str("[testbench]\nname = \"tb\"\n").unwrap();
        assert!(matches!(
            config.interface("nope"),
            Err(ConfigError::UnknownInterface(_))
        ));
        assert!(matches!(
            config.timing("nope"),
            Err(ConfigError::UnknownTiming(_))
        ));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[testbench]\nname = \"from_disk\"\n",
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.testbench.name, "from_disk");
    }

    #[test]
    fn io_error_from_nonexistent_dir() {
        let err = load_config(Path::new("/nonexistent/dir")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
