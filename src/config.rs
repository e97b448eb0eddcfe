//! Construction-time configuration of the override probe.

use alloc::string::String;

use crate::error::{Error, Result};

/// Function probed by default.
pub const DEFAULT_SYMBOL: &str = "devmem_is_allowed";

/// Default number of concurrently probed invocations.
pub const DEFAULT_MAX_ACTIVE: usize = 20;

/// Default forced return value ("permitted").
pub const DEFAULT_FORCED_VALUE: u64 = 1;

/// What to probe and what to force.
///
/// Fixed once the probe is installed; a new value only takes effect on the
/// next install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideConfig {
    /// Target function symbol.
    pub symbol: String,
    /// Concurrency bound (`maxactive`).
    pub max_active: usize,
    /// Value written into the return slot.
    pub forced_value: u64,
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            symbol: String::from(DEFAULT_SYMBOL),
            max_active: DEFAULT_MAX_ACTIVE,
            forced_value: DEFAULT_FORCED_VALUE,
        }
    }
}

impl OverrideConfig {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: String::from(symbol),
            ..Default::default()
        }
    }

    pub fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    pub fn with_forced_value(mut self, value: u64) -> Self {
        self.forced_value = value;
        self
    }

    /// Reject configurations no probe can be built from.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            return Err(Error::InvalidConfig("empty symbol name"));
        }
        if self.max_active == 0 {
            return Err(Error::InvalidConfig("maxactive must be positive"));
        }
        Ok(())
    }

    /// Parse module-parameter style `key=value` pairs separated by whitespace.
    ///
    /// Recognized keys: `symbol`, `maxactive`, `retval`. Missing keys keep
    /// their defaults. Numbers accept a `0x` prefix.
    ///
    /// ```
    /// use axretprobe::config::OverrideConfig;
    ///
    /// let cfg = OverrideConfig::from_params("symbol=foo maxactive=4").unwrap();
    /// assert_eq!(cfg.symbol, "foo");
    /// assert_eq!(cfg.max_active, 4);
    /// assert_eq!(cfg.forced_value, 1);
    /// ```
    pub fn from_params(params: &str) -> Result<Self> {
        let mut config = Self::default();

        for param in params.split_whitespace() {
            let (key, value) = param
                .split_once('=')
                .ok_or(Error::InvalidConfig("expected key=value"))?;
            match key {
                "symbol" => config.symbol = String::from(value),
                "maxactive" => {
                    config.max_active = parse_number(value)
                        .and_then(|v| usize::try_from(v).ok())
                        .ok_or(Error::InvalidConfig("bad maxactive"))?;
                }
                "retval" => {
                    config.forced_value =
                        parse_number(value).ok_or(Error::InvalidConfig("bad retval"))?;
                }
                _ => return Err(Error::InvalidConfig("unknown parameter")),
            }
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_number(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}
