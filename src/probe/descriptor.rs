//! Static description of the probe to install.

use alloc::string::String;

use crate::config::OverrideConfig;
use crate::error::{Error, Result};

/// The constant forced into the return slot of every intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnOverridePolicy {
    value: u64,
}

impl ReturnOverridePolicy {
    pub const fn new(value: u64) -> Self {
        Self { value }
    }

    #[inline]
    pub const fn value(&self) -> u64 {
        self.value
    }
}

/// Target, bound and policy of one return probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeDescriptor {
    symbol: String,
    addr: usize,
    max_active: usize,
    policy: ReturnOverridePolicy,
}

impl ProbeDescriptor {
    /// Build a descriptor for a resolved address.
    ///
    /// The address must be non-null and the bound positive.
    pub fn new(
        symbol: &str,
        addr: usize,
        max_active: usize,
        policy: ReturnOverridePolicy,
    ) -> Result<Self> {
        if addr == 0 {
            return Err(Error::InvalidDescriptor("null probe address"));
        }
        if max_active == 0 {
            return Err(Error::InvalidDescriptor("maxactive must be positive"));
        }
        Ok(Self {
            symbol: String::from(symbol),
            addr,
            max_active,
            policy,
        })
    }

    /// Descriptor for `config` with the symbol resolved to `addr`.
    pub fn from_config(config: &OverrideConfig, addr: usize) -> Result<Self> {
        Self::new(
            &config.symbol,
            addr,
            config.max_active,
            ReturnOverridePolicy::new(config.forced_value),
        )
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn addr(&self) -> usize {
        self.addr
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    pub fn policy(&self) -> ReturnOverridePolicy {
        self.policy
    }
}
