//! Concurrent admission tests: maxactive bound, nmissed accounting, and
//! in-flight instances across uninstall.

use std::sync::Barrier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use axretprobe::{ExecContext, OverrideConfig, ReturnOverride, ReturnSlot, SoftBackend, SymbolTable};

const TARGET: &str = "devmem_is_allowed";
const TARGET_ADDR: usize = 0xffff_ffff_8107_2a40;

fn kernel_symbols() -> SymbolTable {
    SymbolTable::new().with_symbol(TARGET, TARGET_ADDR)
}

/// Call the target; `body` runs inside the call, after admission.
fn call_target<F: FnOnce()>(backend: &SoftBackend, body: F) -> u64 {
    let mut ctx = ExecContext::for_host();
    backend.invoke(TARGET_ADDR, &mut ctx, |ctx| {
        body();
        ctx.set_return_slot(0);
    });
    ctx.return_slot()
}

#[test]
fn test_excess_concurrent_calls_pass_through_and_are_counted() {
    const CALLS: usize = 25;

    let backend = SoftBackend::new();
    let mut ovr = ReturnOverride::new(OverrideConfig::default(), kernel_symbols(), &backend);
    ovr.install().unwrap();

    // Every call is admitted (or refused) before any of them returns.
    let all_inside = Barrier::new(CALLS);
    let forced = AtomicUsize::new(0);
    let original = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..CALLS {
            s.spawn(|| {
                let ret = call_target(&backend, || {
                    all_inside.wait();
                });
                match ret {
                    1 => forced.fetch_add(1, Ordering::Relaxed),
                    0 => original.fetch_add(1, Ordering::Relaxed),
                    other => panic!("unexpected return value {}", other),
                };
            });
        }
    });

    assert_eq!(forced.load(Ordering::Relaxed), 20);
    assert_eq!(original.load(Ordering::Relaxed), 5);
    assert_eq!(ovr.active(), Some(0));

    let report = ovr.uninstall().unwrap();
    assert_eq!(report.missed, 5);
    assert_eq!(report.hits, 20);
    assert_eq!(
        report.to_string(),
        "Missed probing 5 instances of devmem_is_allowed"
    );
}

#[test]
fn test_missed_counter_has_no_lost_updates() {
    const THREADS: usize = 8;
    const CALLS_PER_THREAD: usize = 2000;

    let backend = SoftBackend::new();
    let config = OverrideConfig::default().with_max_active(2);
    let mut ovr = ReturnOverride::new(config, kernel_symbols(), &backend);
    ovr.install().unwrap();

    let forced = AtomicUsize::new(0);
    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..CALLS_PER_THREAD {
                    if call_target(&backend, || {}) == 1 {
                        forced.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    let report = ovr.uninstall().unwrap();
    let total = (THREADS * CALLS_PER_THREAD) as u64;
    assert_eq!(report.hits, forced.load(Ordering::Relaxed) as u64);
    assert_eq!(report.hits + report.missed, total);
    assert_eq!(report.in_flight, 0);
}

#[test]
fn test_in_flight_call_completes_after_uninstall() {
    let backend = SoftBackend::new();
    let mut ovr = ReturnOverride::new(OverrideConfig::default(), kernel_symbols(), &backend);
    ovr.install().unwrap();

    let entered = Barrier::new(2);
    let release = Barrier::new(2);

    thread::scope(|s| {
        let in_flight = s.spawn(|| {
            call_target(&backend, || {
                entered.wait();
                release.wait();
            })
        });

        entered.wait();
        let report = ovr.uninstall().unwrap();
        assert_eq!(report.in_flight, 1);

        // New calls are no longer intercepted.
        assert_eq!(call_target(&backend, || {}), 0);

        release.wait();
        // The admitted call still returns through its handler.
        assert_eq!(in_flight.join().unwrap(), 1);
    });

    assert!(!ovr.is_installed());
}

#[test]
fn test_no_admission_after_unregister_returns() {
    use axretprobe::probe::{ProbeDescriptor, ProbeRegistry, ReturnOverridePolicy};
    use std::sync::atomic::AtomicBool;

    const THREADS: usize = 8;

    for _ in 0..50 {
        let registry = ProbeRegistry::new(SoftBackend::new());
        let desc = ProbeDescriptor::new(TARGET, TARGET_ADDR, 4, ReturnOverridePolicy::new(1))
            .unwrap();
        let handle = registry.register(&desc).unwrap();
        let probe = handle.probe().clone();

        let done = AtomicBool::new(false);
        let late_admissions = AtomicUsize::new(0);
        let completed_after = AtomicUsize::new(0);
        let start = Barrier::new(THREADS + 1);

        let in_flight = thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    start.wait();
                    while !done.load(Ordering::SeqCst) {
                        let ctx = ExecContext::for_host();
                        let was_done = done.load(Ordering::SeqCst);
                        let Some(inst) = probe.enter(&ctx) else {
                            continue;
                        };
                        // Admitted although unregister had already returned.
                        if was_done {
                            late_admissions.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::yield_now();
                        // Still live after unregister returned: must have been
                        // counted as in flight.
                        if done.load(Ordering::SeqCst) {
                            completed_after.fetch_add(1, Ordering::SeqCst);
                        }
                        let mut ret = ExecContext::for_host();
                        inst.complete(&mut ret);
                    }
                });
            }

            start.wait();
            thread::yield_now();
            let report = registry.unregister(&handle).unwrap();
            done.store(true, Ordering::SeqCst);
            report.in_flight
        });

        assert_eq!(late_admissions.load(Ordering::SeqCst), 0);
        assert!(completed_after.load(Ordering::SeqCst) <= in_flight);
        assert_eq!(probe.active(), 0);
        assert!(probe.enter(&ExecContext::for_host()).is_none());
    }
}
