//! Probe backends: how an armed probe gets hooked into the target.
//!
//! A kernel host implements [`ProbeBackend`] over its breakpoint machinery:
//! `arm` plants the entry breakpoint and keeps the probe reachable from the
//! trap handler, the entry trap calls [`RetProbe::enter`] and redirects the
//! return address to a trampoline, and the trampoline calls
//! [`ProbeInstance::complete`](crate::probe::retprobe::ProbeInstance::complete).
//! A host that stashes the instance with `into_raw` between the two traps
//! must also stash an `Arc<RetProbe>` clone and keep it until the return
//! trap has run: the raw index alone does not keep the probe alive once it
//! is disarmed.
//!
//! [`SoftBackend`] does the same in-process: the target is called through
//! [`SoftBackend::invoke`], which plays the part of the trap handler and the
//! trampoline.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use spin::RwLock;

use crate::context::ExecContext;
use crate::error::{Error, Result};
use crate::probe::retprobe::RetProbe;

/// Glue between the probe core and the host's interception mechanism.
///
/// Between the entry and return traps of one admitted call, the host owns an
/// `Arc<RetProbe>` clone (from its own table, like [`SoftBackend::lookup`]).
/// `disarm` drops only the backend's reference; the probe must stay alive
/// until every outstanding return trap has completed its instance.
pub trait ProbeBackend {
    /// Start intercepting calls at `probe.addr()`.
    fn arm(&self, probe: Arc<RetProbe>) -> Result<()>;

    /// Stop intercepting calls at `addr` and hand back the probe.
    ///
    /// Invocations already admitted keep their own reference and complete
    /// normally after this returns.
    fn disarm(&self, addr: usize) -> Result<Arc<RetProbe>>;
}

impl<T: ProbeBackend + ?Sized> ProbeBackend for &T {
    fn arm(&self, probe: Arc<RetProbe>) -> Result<()> {
        (**self).arm(probe)
    }

    fn disarm(&self, addr: usize) -> Result<Arc<RetProbe>> {
        (**self).disarm(addr)
    }
}

impl<T: ProbeBackend + ?Sized> ProbeBackend for Arc<T> {
    fn arm(&self, probe: Arc<RetProbe>) -> Result<()> {
        (**self).arm(probe)
    }

    fn disarm(&self, addr: usize) -> Result<Arc<RetProbe>> {
        (**self).disarm(addr)
    }
}

/// In-process backend: a dispatch table keyed by function address.
#[derive(Default)]
pub struct SoftBackend {
    armed: RwLock<BTreeMap<usize, Arc<RetProbe>>>,
}

impl SoftBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe armed at `addr`, if any.
    ///
    /// The table lock is held only for the `Arc` clone.
    #[inline]
    pub fn lookup(&self, addr: usize) -> Option<Arc<RetProbe>> {
        self.armed.read().get(&addr).cloned()
    }

    pub fn is_armed(&self, addr: usize) -> bool {
        self.armed.read().contains_key(&addr)
    }

    /// Call the function at `addr` through the probe machinery.
    ///
    /// `body` is the function itself: it runs on `ctx` and leaves its result
    /// in the return slot. If a probe is armed at `addr` and admits the call,
    /// the return handler runs on `ctx` after `body`.
    pub fn invoke<F>(&self, addr: usize, ctx: &mut ExecContext, body: F)
    where
        F: FnOnce(&mut ExecContext),
    {
        let Some(probe) = self.lookup(addr) else {
            body(ctx);
            return;
        };

        let instance = probe.enter(ctx);
        body(&mut *ctx);
        if let Some(instance) = instance {
            instance.complete(ctx);
        }
    }
}

impl ProbeBackend for SoftBackend {
    fn arm(&self, probe: Arc<RetProbe>) -> Result<()> {
        let addr = probe.addr();
        let mut armed = self.armed.write();
        if armed.contains_key(&addr) {
            return Err(Error::AlreadyRegistered(addr));
        }
        armed.insert(addr, probe);
        Ok(())
    }

    fn disarm(&self, addr: usize) -> Result<Arc<RetProbe>> {
        self.armed
            .write()
            .remove(&addr)
            .ok_or(Error::NotRegistered(addr))
    }
}
