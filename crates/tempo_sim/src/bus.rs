//! Binding logical bus signal names to host signals.
//!
//! A protocol declares the logical names it needs (`valid`, `data`, ...)
//! and the ones it can live without (`ready`, `channel`, ...). [`Bus::bind`]
//! resolves every one of them against the host once, so a missing wire is
//! reported at construction time rather than on the first edge.

use std::collections::BTreeMap;

use crate::error::SimError;
use crate::signal::{SignalExt, SignalHost, SignalRef};

/// Separator placed between the bus prefix and the logical signal name.
pub const DEFAULT_SEPARATOR: &str = "_";

/// A named group of host signals.
#[derive(Debug, Clone)]
pub struct Bus {
    name: String,
    signals: BTreeMap<String, Option<SignalRef>>,
}

impl Bus {
    /// Binds `<name>_<signal>` for every required and optional signal.
    pub fn bind(
        host: &dyn SignalHost,
        name: &str,
        required: &[&str],
        optional: &[&str],
    ) -> Result<Self, SimError> {
        Self::bind_with_separator(host, name, DEFAULT_SEPARATOR, required, optional)
    }

    /// Like [`Bus::bind`] with a custom separator. An empty bus name binds
    /// the bare logical names.
    pub fn bind_with_separator(
        host: &dyn SignalHost,
        name: &str,
        separator: &str,
        required: &[&str],
        optional: &[&str],
    ) -> Result<Self, SimError> {
        let path = |signal: &str| {
            if name.is_empty() {
                signal.to_string()
            } else {
                format!("{name}{separator}{signal}")
            }
        };
        let mut signals = BTreeMap::new();
        for &signal in required {
            let resolved = host.lookup(&path(signal)).ok_or_else(|| SimError::MissingSignal {
                bus: name.to_string(),
                signal: signal.to_string(),
            })?;
            signals.insert(signal.to_string(), Some(resolved));
        }
        for &signal in optional {
            let resolved = host.lookup(&path(signal));
            if resolved.is_none() {
                log::debug!("bus '{name}': optional signal '{signal}' not present");
            }
            signals.insert(signal.to_string(), resolved);
        }
        Ok(Self {
            name: name.to_string(),
            signals,
        })
    }

    /// The bus prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a declared signal that must be present.
    pub fn signal(&self, logical: &str) -> Result<SignalRef, SimError> {
        match self.signals.get(logical) {
            Some(Some(signal)) => Ok(signal.clone()),
            Some(None) => Err(SimError::MissingSignal {
                bus: self.name.clone(),
                signal: logical.to_string(),
            }),
            None => Err(SimError::UnknownSignal {
                bus: self.name.clone(),
                signal: logical.to_string(),
            }),
        }
    }

    /// Returns an optional signal if the host provides it.
    pub fn optional(&self, logical: &str) -> Option<SignalRef> {
        self.signals.get(logical).cloned().flatten()
    }

    /// True if `logical` was declared and resolved.
    pub fn has(&self, logical: &str) -> bool {
        matches!(self.signals.get(logical), Some(Some(_)))
    }
}

/// A reset input together with its polarity.
#[derive(Debug, Clone)]
pub enum Reset {
    /// Asserted while the signal is 1.
    ActiveHigh(SignalRef),
    /// Asserted while the signal is 0.
    ActiveLow(SignalRef),
}

impl Reset {
    /// True while the design is held in reset. An unresolvable level counts
    /// as asserted.
    pub fn is_asserted(&self) -> bool {
        match self {
            Reset::ActiveHigh(signal) => match signal.to_u64() {
                Some(level) => level != 0,
                None => true,
            },
            Reset::ActiveLow(signal) => match signal.to_u64() {
                Some(level) => level == 0,
                None => true,
            },
        }
    }
}
