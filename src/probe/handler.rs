//! Return handler: forces the return value of an intercepted call.
//!
//! Runs in the returning invocation's own context (the return trampoline or
//! the host's return trap), possibly on several CPUs at once. It must stay
//! bounded, must not allocate, must not block, and must not take a lock.

use crate::context::ReturnSlot;
use crate::probe::descriptor::ReturnOverridePolicy;

/// What the host should do after the handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerAction {
    /// Resume the return to the original caller.
    Continue,
}

/// Overwrite the return slot of `ctx` with the policy constant.
///
/// Never fails and never changes control flow.
#[inline]
pub fn on_return<C: ReturnSlot + ?Sized>(
    policy: &ReturnOverridePolicy,
    ctx: &mut C,
) -> HandlerAction {
    ctx.set_return_slot(policy.value());
    HandlerAction::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ExecContext, HostWidth};

    #[test]
    fn test_overrides_any_previous_value() {
        let policy = ReturnOverridePolicy::new(1);
        for width in [HostWidth::Narrow, HostWidth::Wide] {
            let mut ctx = ExecContext::new(width);
            ctx.set_return_slot(0xdead);
            assert_eq!(on_return(&policy, &mut ctx), HandlerAction::Continue);
            assert_eq!(ctx.return_slot(), 1);
        }
    }
}
