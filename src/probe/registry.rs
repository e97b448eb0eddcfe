//! Probe registry: registers and unregisters return probes on a backend.

use alloc::sync::Arc;

use crate::error::Result;
use crate::probe::backend::ProbeBackend;
use crate::probe::descriptor::ProbeDescriptor;
use crate::probe::retprobe::RetProbe;

/// Handle to a registered return probe, passed to
/// [`ProbeRegistry::unregister`].
#[derive(Debug)]
pub struct ProbeHandle {
    probe: Arc<RetProbe>,
}

impl ProbeHandle {
    pub fn addr(&self) -> usize {
        self.probe.addr()
    }

    pub fn symbol(&self) -> &str {
        self.probe.symbol()
    }

    pub fn missed(&self) -> u64 {
        self.probe.missed()
    }

    pub fn hits(&self) -> u64 {
        self.probe.hits()
    }

    pub fn active(&self) -> usize {
        self.probe.active()
    }

    /// The armed probe, for hosts that dispatch traps themselves.
    pub fn probe(&self) -> &Arc<RetProbe> {
        &self.probe
    }
}

/// Final counters of an unregistered probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unregistered {
    /// Calls that ran unprobed because the pool was exhausted.
    pub missed: u64,
    /// Returns the handler overrode.
    pub hits: u64,
    /// Instances still live when the probe was disarmed.
    pub in_flight: usize,
}

/// Registers return probes through a [`ProbeBackend`].
pub struct ProbeRegistry<B> {
    backend: B,
}

impl<B: ProbeBackend> ProbeRegistry<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Arm a return probe for `descriptor`.
    ///
    /// The instance pool is allocated here, before the probe becomes
    /// reachable from the target.
    pub fn register(&self, descriptor: &ProbeDescriptor) -> Result<ProbeHandle> {
        let probe = Arc::new(RetProbe::new(descriptor));
        self.backend.arm(probe.clone())?;

        info!(
            "retprobe: registered {} at {:#x} (maxactive={}, retval={:#x})",
            descriptor.symbol(),
            descriptor.addr(),
            descriptor.max_active(),
            descriptor.policy().value()
        );
        Ok(ProbeHandle { probe })
    }

    /// Disarm the probe and return its final counters.
    ///
    /// No instance is admitted once this returns. Instances already admitted
    /// complete on their own reference to the probe; its memory is freed when
    /// the last of them returns, so there is no wait here.
    ///
    /// If the backend fails to disarm, the probe stays armed and enabled and
    /// `handle` remains valid, so the call can be retried.
    pub fn unregister(&self, handle: &ProbeHandle) -> Result<Unregistered> {
        let probe = &handle.probe;

        if let Err(e) = self.backend.disarm(probe.addr()) {
            error!(
                "retprobe: failed to disarm {} at {:#x}: {}",
                probe.symbol(),
                probe.addr(),
                e
            );
            return Err(e);
        }
        probe.disable();

        let result = Unregistered {
            missed: probe.missed(),
            hits: probe.hits(),
            in_flight: probe.active(),
        };

        if result.in_flight > 0 {
            debug!(
                "retprobe: {} instances of {} still in flight",
                result.in_flight,
                probe.symbol()
            );
        }
        info!(
            "retprobe: unregistered {} at {:#x}",
            probe.symbol(),
            probe.addr()
        );
        Ok(result)
    }
}
