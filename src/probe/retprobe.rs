//! Armed return probe: instance admission and the missed counter.
//!
//! Every call of the probed function asks [`RetProbe::enter`] for an
//! instance. Up to `maxactive` instances can be live at once; they live in a
//! pool preallocated at registration, claimed and released with atomic
//! compare-and-swap, so the entry and return paths never allocate or lock.
//! A call that finds the pool exhausted runs unprobed and is counted in
//! `nmissed`.

use alloc::boxed::Box;
use alloc::string::String;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::context::{ExecContext, ReturnSlot};
use crate::platform;
use crate::probe::descriptor::{ProbeDescriptor, ReturnOverridePolicy};
use crate::probe::handler::{self, HandlerAction};

/// Entry state captured when an invocation is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryState {
    /// Instruction pointer at the probe hit.
    pub ip: u64,
    /// Stack pointer at the probe hit.
    pub sp: u64,
    /// CPU the invocation was admitted on.
    pub cpu: u32,
    /// Admission time in nanoseconds.
    pub timestamp_ns: u64,
}

/// One preallocated instance slot.
///
/// The data fields are only written by the slot owner between a successful
/// claim and the release, so they can be Relaxed. The claim itself is
/// SeqCst so it orders against [`RetProbe::disable`].
struct InstanceSlot {
    busy: AtomicBool,
    ip: AtomicU64,
    sp: AtomicU64,
    cpu: AtomicU32,
    timestamp_ns: AtomicU64,
}

impl InstanceSlot {
    fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            ip: AtomicU64::new(0),
            sp: AtomicU64::new(0),
            cpu: AtomicU32::new(0),
            timestamp_ns: AtomicU64::new(0),
        }
    }

    #[inline]
    fn try_claim(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    #[inline]
    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    #[inline]
    fn capture(&self, ctx: &ExecContext) {
        let stamp = platform::stamp();
        self.ip.store(ctx.ip(), Ordering::Relaxed);
        self.sp.store(ctx.sp(), Ordering::Relaxed);
        self.cpu.store(stamp.cpu, Ordering::Relaxed);
        self.timestamp_ns.store(stamp.timestamp_ns, Ordering::Relaxed);
    }

    fn entry(&self) -> EntryState {
        EntryState {
            ip: self.ip.load(Ordering::Relaxed),
            sp: self.sp.load(Ordering::Relaxed),
            cpu: self.cpu.load(Ordering::Relaxed),
            timestamp_ns: self.timestamp_ns.load(Ordering::Relaxed),
        }
    }
}

/// A return probe armed at one function address.
pub struct RetProbe {
    symbol: String,
    addr: usize,
    policy: ReturnOverridePolicy,
    slots: Box<[InstanceSlot]>,
    /// Calls refused for lack of a free slot.
    missed: AtomicU64,
    /// Returns overridden by the handler.
    hits: AtomicU64,
    enabled: AtomicBool,
}

impl RetProbe {
    /// Build the probe and preallocate its instance pool.
    pub fn new(descriptor: &ProbeDescriptor) -> Self {
        let slots = (0..descriptor.max_active())
            .map(|_| InstanceSlot::new())
            .collect();

        Self {
            symbol: String::from(descriptor.symbol()),
            addr: descriptor.addr(),
            policy: descriptor.policy(),
            slots,
            missed: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn addr(&self) -> usize {
        self.addr
    }

    pub fn policy(&self) -> ReturnOverridePolicy {
        self.policy
    }

    /// Concurrency bound (`maxactive`).
    pub fn max_active(&self) -> usize {
        self.slots.len()
    }

    /// Number of calls that ran unprobed because every slot was taken.
    pub fn missed(&self) -> u64 {
        self.missed.load(Ordering::Acquire)
    }

    /// Number of returns the handler has overridden.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Acquire)
    }

    /// Number of instances currently live.
    ///
    /// Counts claimed slots, so an instance is visible here from the moment
    /// its slot is taken.
    pub fn active(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_busy()).count()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Stop admitting new instances. Live instances still complete.
    ///
    /// Once this returns, every instance `enter` will ever hand out is
    /// already counted by [`RetProbe::active`].
    pub(crate) fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// Admission on function entry.
    ///
    /// Returns the instance whose [`ProbeInstance::complete`] must run when
    /// this invocation returns, or `None` if the call must run unprobed
    /// (probe disabled, or pool exhausted which bumps `nmissed`).
    pub fn enter(&self, ctx: &ExecContext) -> Option<ProbeInstance<'_>> {
        if !self.is_enabled() {
            return None;
        }

        for (index, slot) in self.slots.iter().enumerate() {
            if slot.try_claim() {
                // Disabled between the first check and the claim: back out.
                if !self.is_enabled() {
                    slot.release();
                    return None;
                }
                slot.capture(ctx);
                return Some(ProbeInstance { probe: self, index });
            }
        }

        self.missed.fetch_add(1, Ordering::AcqRel);
        None
    }

    /// Rebuild an instance from [`ProbeInstance::into_raw`].
    ///
    /// Returns `None` if `index` does not name a claimed slot.
    ///
    /// # Safety
    /// `index` must come from `into_raw` on an instance of this probe, and
    /// must be turned back into an instance at most once. The caller must
    /// have kept an `Arc<RetProbe>` clone alive since the entry trap.
    pub unsafe fn instance_from_raw(&self, index: usize) -> Option<ProbeInstance<'_>> {
        let slot = self.slots.get(index)?;
        if !slot.busy.load(Ordering::Acquire) {
            return None;
        }
        Some(ProbeInstance { probe: self, index })
    }
}

impl core::fmt::Debug for RetProbe {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RetProbe")
            .field("symbol", &self.symbol)
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("max_active", &self.max_active())
            .field("active", &self.active())
            .field("missed", &self.missed())
            .field("hits", &self.hits())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// A live probed invocation.
///
/// Holds one slot of the pool until it is completed or dropped. Dropping it
/// without completing releases the slot and leaves the return value alone.
#[must_use = "a probe instance must be completed when the invocation returns"]
pub struct ProbeInstance<'a> {
    probe: &'a RetProbe,
    index: usize,
}

impl ProbeInstance<'_> {
    /// State captured on entry.
    pub fn entry(&self) -> EntryState {
        self.probe.slots[self.index].entry()
    }

    pub fn probe(&self) -> &RetProbe {
        self.probe
    }

    /// Run the return handler on the returning context and free the slot.
    #[inline]
    pub fn complete<C: ReturnSlot + ?Sized>(self, ctx: &mut C) -> HandlerAction {
        let action = handler::on_return(&self.probe.policy, ctx);
        self.probe.hits.fetch_add(1, Ordering::AcqRel);
        action
    }

    /// Detach the instance from its borrow, e.g. to stash it in a per-task
    /// return stack between the entry and return traps.
    ///
    /// The index does not keep the probe alive: stash an `Arc<RetProbe>`
    /// clone next to it and drop that only after the return trap ran.
    pub fn into_raw(self) -> usize {
        let index = self.index;
        core::mem::forget(self);
        index
    }
}

impl Drop for ProbeInstance<'_> {
    fn drop(&mut self) {
        self.probe.slots[self.index].release();
    }
}
