//! Lifecycle syscalls (Linux x86_64 numbering)
//!
//! # Syscall ABI
//!
//! | Register | Purpose        |
//! |----------|----------------|
//! | RAX      | Syscall number |
//! | RDI      | Argument 1     |
//! | RSI      | Argument 2     |
//! | RDX      | Argument 3     |
//! | R10      | Argument 4     |
//! | R8       | Argument 5     |
//! | R9       | Argument 6     |
//! | RAX      | Return value   |
//!
//! [`dispatch`] decodes a trap frame and runs the matching lifecycle
//! operation. It never diverges itself; the [`Disposition`] tells the
//! embedding kernel whether to return to the caller, enter a freshly
//! exec'd image, or retire the calling context. [`handle`] does that last
//! step through a [`UserMode`] implementation.

use alloc::sync::Arc;

use crate::error::errno;
use crate::process::{Process, ProcessManager, UserEntry};
use crate::vm::UserAddr;

pub const SYS_GETPID: u64 = 39;
pub const SYS_FORK: u64 = 57;
pub const SYS_EXECV: u64 = 59;
pub const SYS_EXIT: u64 = 60;
/// `wait4`; the rusage argument is ignored
pub const SYS_WAITPID: u64 = 61;

/// Register state saved on syscall entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TrapFrame {
    // Callee-saved
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbx: u64,
    pub rbp: u64,

    // Arguments and scratch
    pub r9: u64,
    pub r8: u64,
    pub r10: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    /// Syscall number on entry, return value on exit
    pub rax: u64,

    /// Saved RFLAGS (clobbered into R11 by SYSCALL)
    pub r11: u64,
    /// Saved RIP (clobbered into RCX by SYSCALL)
    pub rcx: u64,

    pub rip: u64,
    pub rflags: u64,
    pub rsp: u64,
}

impl TrapFrame {
    /// Frame for syscall `nr` with arguments in ABI order
    pub fn syscall(nr: u64, args: [u64; 6]) -> Self {
        Self {
            rax: nr,
            rdi: args[0],
            rsi: args[1],
            rdx: args[2],
            r10: args[3],
            r8: args[4],
            r9: args[5],
            ..Self::default()
        }
    }

    pub fn number(&self) -> u64 {
        self.rax
    }

    /// Argument `n` (0-based) per the Linux x86_64 convention
    pub fn arg(&self, n: usize) -> u64 {
        match n {
            0 => self.rdi,
            1 => self.rsi,
            2 => self.rdx,
            3 => self.r10,
            4 => self.r8,
            5 => self.r9,
            _ => 0,
        }
    }

    /// Store a syscall return value (negative values are `-errno`)
    pub fn set_return(&mut self, value: i64) {
        self.rax = value as u64;
    }

    pub fn return_value(&self) -> i64 {
        self.rax as i64
    }
}

/// What the caller's execution context does after a syscall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Resume the caller with this value in RAX
    Return(i64),
    /// The caller's image was replaced; enter it
    EnterImage(UserEntry),
    /// The caller has exited; its context must be retired
    Exited,
}

/// Never-returning transitions owned by the embedding kernel
pub trait UserMode {
    /// Drop to user mode at `entry.entry` with `entry.stack_pointer`,
    /// passing `argc` and `argv` as the program's startup arguments.
    fn enter_new_process(&self, entry: UserEntry) -> !;

    /// Retire the current execution context.
    fn exit_thread(&self) -> !;
}

/// Run the lifecycle syscall described by `frame` on behalf of `caller`.
pub fn dispatch(manager: &ProcessManager, caller: &Arc<Process>, frame: &TrapFrame) -> Disposition {
    #[cfg(feature = "trace-syscalls")]
    log::trace!(
        "[PROC syscall] pid {} nr={} a1={:#x} a2={:#x} a3={:#x}",
        caller.pid(),
        frame.number(),
        frame.arg(0),
        frame.arg(1),
        frame.arg(2)
    );

    match frame.number() {
        SYS_GETPID => Disposition::Return(manager.getpid(caller).as_u64() as i64),

        SYS_FORK => match manager.fork(caller, frame) {
            Ok(pid) => Disposition::Return(pid.as_u64() as i64),
            Err(e) => Disposition::Return(e.to_syscall()),
        },

        SYS_EXECV => match manager.exec(caller, UserAddr(frame.arg(0)), UserAddr(frame.arg(1))) {
            Ok(entry) => Disposition::EnterImage(entry),
            Err(e) => Disposition::Return(e.to_syscall()),
        },

        SYS_EXIT => {
            manager.exit(Arc::clone(caller), frame.arg(0) as i32);
            Disposition::Exited
        }

        SYS_WAITPID => {
            let pid = frame.arg(0) as i32 as i64;
            let status = UserAddr(frame.arg(1));
            let options = frame.arg(2) as i32;
            match manager.waitpid(caller, pid, status, options) {
                Ok(pid) => Disposition::Return(pid.as_u64() as i64),
                Err(e) => Disposition::Return(e.to_syscall()),
            }
        }

        unknown => {
            log::warn!(
                "[PROC syscall] Unimplemented syscall #{} from pid {}",
                unknown,
                caller.pid()
            );
            Disposition::Return(-errno::ENOSYS)
        }
    }
}

/// Dispatch and carry out the resulting transition.
///
/// Returns only when the caller resumes where it trapped; the return value
/// has then been stored in `frame`.
pub fn handle<U: UserMode>(
    manager: &ProcessManager,
    caller: &Arc<Process>,
    frame: &mut TrapFrame,
    user: &U,
) {
    match dispatch(manager, caller, frame) {
        Disposition::Return(value) => frame.set_return(value),
        Disposition::EnterImage(entry) => user.enter_new_process(entry),
        Disposition::Exited => user.exit_thread(),
    }
}
