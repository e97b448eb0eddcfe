//! Execution context captured for a probed invocation.
//!
//! The return handler only ever touches one thing in the context: the
//! register the calling convention uses for the return value. Where that
//! register lives depends on the host width, so the register file is a
//! tagged variant and [`ReturnSlot::set_return_slot`] picks the storage.

/// Width of the host instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostWidth {
    /// 32-bit host: return value in `eax`.
    Narrow,
    /// 64-bit host: return value in `ax` (`rax`).
    Wide,
}

impl HostWidth {
    /// Width of the architecture this crate was compiled for.
    pub const fn current() -> Self {
        #[cfg(target_pointer_width = "32")]
        {
            HostWidth::Narrow
        }
        #[cfg(not(target_pointer_width = "32"))]
        {
            HostWidth::Wide
        }
    }
}

/// View over the return-value register of a returning invocation.
///
/// Implementations must be usable from the return-probe hot path: no
/// allocation, no blocking.
pub trait ReturnSlot {
    /// Overwrite the return-value register.
    fn set_return_slot(&mut self, value: u64);

    /// Current content of the return-value register, zero-extended.
    fn return_slot(&self) -> u64;
}

/// Register file of a 32-bit host.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NarrowRegs {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub eip: u32,
}

/// Register file of a 64-bit host.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WideRegs {
    pub ax: u64,
    pub bx: u64,
    pub cx: u64,
    pub dx: u64,
    pub si: u64,
    pub di: u64,
    pub bp: u64,
    pub sp: u64,
    pub ip: u64,
}

/// Register state of an invocation, tagged by host width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecContext {
    Narrow(NarrowRegs),
    Wide(WideRegs),
}

impl ExecContext {
    /// Zeroed context of the given width.
    pub fn new(width: HostWidth) -> Self {
        match width {
            HostWidth::Narrow => ExecContext::Narrow(NarrowRegs::default()),
            HostWidth::Wide => ExecContext::Wide(WideRegs::default()),
        }
    }

    /// Zeroed context for the compile-time host width.
    pub fn for_host() -> Self {
        Self::new(HostWidth::current())
    }

    pub fn width(&self) -> HostWidth {
        match self {
            ExecContext::Narrow(_) => HostWidth::Narrow,
            ExecContext::Wide(_) => HostWidth::Wide,
        }
    }

    /// Instruction pointer.
    pub fn ip(&self) -> u64 {
        match self {
            ExecContext::Narrow(regs) => regs.eip as u64,
            ExecContext::Wide(regs) => regs.ip,
        }
    }

    /// Stack pointer.
    pub fn sp(&self) -> u64 {
        match self {
            ExecContext::Narrow(regs) => regs.esp as u64,
            ExecContext::Wide(regs) => regs.sp,
        }
    }

    /// Set instruction and stack pointer.
    pub fn with_frame(mut self, ip: u64, sp: u64) -> Self {
        match &mut self {
            ExecContext::Narrow(regs) => {
                regs.eip = ip as u32;
                regs.esp = sp as u32;
            }
            ExecContext::Wide(regs) => {
                regs.ip = ip;
                regs.sp = sp;
            }
        }
        self
    }
}

impl ReturnSlot for ExecContext {
    #[inline]
    fn set_return_slot(&mut self, value: u64) {
        match self {
            // Narrow hosts return in a 32-bit register; upper bits are dropped.
            ExecContext::Narrow(regs) => regs.eax = value as u32,
            ExecContext::Wide(regs) => regs.ax = value,
        }
    }

    #[inline]
    fn return_slot(&self) -> u64 {
        match self {
            ExecContext::Narrow(regs) => regs.eax as u64,
            ExecContext::Wide(regs) => regs.ax,
        }
    }
}
