//! Install/uninstall lifecycle of the return-value override.
//!
//! [`ReturnOverride`] is what a module init/exit pair drives: `install`
//! resolves the target, registers the probe and reports where it was
//! planted; `uninstall` removes it and reports how many calls were missed.
//! All state lives in the controller; dropping an installed controller
//! uninstalls it.

use alloc::string::String;

use crate::config::OverrideConfig;
use crate::error::{Error, Result, State};
use crate::probe::backend::ProbeBackend;
use crate::probe::descriptor::ProbeDescriptor;
use crate::probe::registry::{ProbeHandle, ProbeRegistry};
use crate::symbols::SymbolResolver;

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub symbol: String,
    /// Resolved entry address the probe was planted at.
    pub addr: usize,
}

impl core::fmt::Display for InstallReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Planted return probe at {:#x}", self.addr)
    }
}

/// Result of a successful uninstall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallReport {
    pub symbol: String,
    /// Calls not intercepted because maxactive was exhausted.
    pub missed: u64,
    /// Calls whose return value was overridden.
    pub hits: u64,
    /// Instances still running when the probe was removed.
    pub in_flight: usize,
}

impl core::fmt::Display for UninstallReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Missed probing {} instances of {}", self.missed, self.symbol)
    }
}

/// Forces the return value of one kernel function while installed.
pub struct ReturnOverride<R, B: ProbeBackend> {
    config: OverrideConfig,
    resolver: R,
    registry: ProbeRegistry<B>,
    handle: Option<ProbeHandle>,
}

impl<R: SymbolResolver, B: ProbeBackend> ReturnOverride<R, B> {
    pub fn new(config: OverrideConfig, resolver: R, backend: B) -> Self {
        Self {
            config,
            resolver,
            registry: ProbeRegistry::new(backend),
            handle: None,
        }
    }

    pub fn config(&self) -> &OverrideConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProbeRegistry<B> {
        &self.registry
    }

    pub fn state(&self) -> State {
        if self.handle.is_some() {
            State::Installed
        } else {
            State::Uninstalled
        }
    }

    pub fn is_installed(&self) -> bool {
        self.handle.is_some()
    }

    /// Address the probe is planted at, while installed.
    pub fn addr(&self) -> Option<usize> {
        self.handle.as_ref().map(ProbeHandle::addr)
    }

    /// Missed count so far, while installed.
    pub fn missed(&self) -> Option<u64> {
        self.handle.as_ref().map(ProbeHandle::missed)
    }

    /// Overridden returns so far, while installed.
    pub fn hits(&self) -> Option<u64> {
        self.handle.as_ref().map(ProbeHandle::hits)
    }

    /// Live instances, while installed.
    pub fn active(&self) -> Option<usize> {
        self.handle.as_ref().map(ProbeHandle::active)
    }

    /// Resolve the target and plant the return probe.
    ///
    /// On failure nothing is registered and the controller stays
    /// uninstalled.
    pub fn install(&mut self) -> Result<InstallReport> {
        if self.handle.is_some() {
            return Err(Error::InvalidState {
                expected: State::Uninstalled,
                found: State::Installed,
            });
        }

        match self.try_install() {
            Ok((handle, report)) => {
                self.handle = Some(handle);
                info!("{}: {}", report.symbol, report);
                Ok(report)
            }
            Err(e) => {
                error!("{}: failed to install return probe: {}", self.config.symbol, e);
                Err(e)
            }
        }
    }

    fn try_install(&self) -> Result<(ProbeHandle, InstallReport)> {
        self.config.validate()?;
        let addr = self.resolver.resolve(&self.config.symbol)?;
        let descriptor = ProbeDescriptor::from_config(&self.config, addr)?;
        let handle = self.registry.register(&descriptor)?;

        let report = InstallReport {
            symbol: String::from(descriptor.symbol()),
            addr: descriptor.addr(),
        };
        Ok((handle, report))
    }

    /// Remove the return probe and report the final missed count.
    ///
    /// If the backend cannot disarm the target, the controller stays
    /// installed and `uninstall` may be called again.
    pub fn uninstall(&mut self) -> Result<UninstallReport> {
        let handle = self.handle.as_ref().ok_or(Error::InvalidState {
            expected: State::Installed,
            found: State::Uninstalled,
        })?;

        let symbol = String::from(handle.symbol());
        let done = self.registry.unregister(handle)?;
        self.handle = None;

        let report = UninstallReport {
            symbol,
            missed: done.missed,
            hits: done.hits,
            in_flight: done.in_flight,
        };
        info!("{}: return probe unregistered", report.symbol);
        if report.missed > 0 {
            // nmissed > 0 means maxactive was too low for the call rate.
            warn!("{}: {} (maxactive={})", report.symbol, report, self.config.max_active);
        } else {
            info!("{}: {}", report.symbol, report);
        }
        Ok(report)
    }
}

impl<R, B: ProbeBackend> Drop for ReturnOverride<R, B> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            match self.registry.unregister(&handle) {
                Ok(done) => info!(
                    "{}: removed on drop, missed probing {} instances",
                    handle.symbol(),
                    done.missed
                ),
                Err(e) => error!("{}: failed to remove on drop: {}", handle.symbol(), e),
            }
        }
    }
}
