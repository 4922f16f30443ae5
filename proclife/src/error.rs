//! Lifecycle error types

use core::fmt;

/// Linux errno values returned (negated) from lifecycle syscalls.
pub mod errno {
    /// No such file or directory
    pub const ENOENT: i64 = 2;
    /// Argument list too long
    pub const E2BIG: i64 = 7;
    /// No child processes
    pub const ECHILD: i64 = 10;
    /// Try again
    pub const EAGAIN: i64 = 11;
    /// Out of memory
    pub const ENOMEM: i64 = 12;
    /// Bad address
    pub const EFAULT: i64 = 14;
    /// Invalid argument
    pub const EINVAL: i64 = 22;
    /// Function not implemented
    pub const ENOSYS: i64 = 38;
}

/// Lifecycle error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcError {
    /// Address space or image allocation failed
    OutOfMemory,
    /// Every pid in the configured range is reserved
    PidsExhausted,
    /// The process limit has been reached
    ProcessLimitReached,
    /// A user pointer did not reference valid user memory
    BadAddress,
    /// A user string did not fit its bound
    StringTooLong,
    /// Arguments do not fit in the new stack
    ArgumentsTooLarge,
    /// Invalid argument
    InvalidArgument,
    /// The pid is not a child of the caller
    NoSuchChild,
    /// The executable could not be found
    NotFound,
    /// Unknown syscall number
    NotImplemented,
    /// Collaborator-specific failure carrying its own errno
    Errno(i64),
}

impl ProcError {
    /// Linux errno value of this error (positive)
    pub const fn errno(&self) -> i64 {
        match self {
            ProcError::OutOfMemory => errno::ENOMEM,
            ProcError::PidsExhausted => errno::EAGAIN,
            ProcError::ProcessLimitReached => errno::EAGAIN,
            ProcError::BadAddress => errno::EFAULT,
            ProcError::StringTooLong => errno::EFAULT,
            ProcError::ArgumentsTooLarge => errno::E2BIG,
            ProcError::InvalidArgument => errno::EINVAL,
            ProcError::NoSuchChild => errno::ECHILD,
            ProcError::NotFound => errno::ENOENT,
            ProcError::NotImplemented => errno::ENOSYS,
            ProcError::Errno(e) => *e,
        }
    }

    /// Value a syscall returns for this error (`-errno`)
    pub const fn to_syscall(&self) -> i64 {
        -self.errno()
    }
}

impl fmt::Display for ProcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcError::OutOfMemory => write!(f, "out of memory"),
            ProcError::PidsExhausted => write!(f, "no free process ids"),
            ProcError::ProcessLimitReached => write!(f, "process limit reached"),
            ProcError::BadAddress => write!(f, "bad user address"),
            ProcError::StringTooLong => write!(f, "user string exceeds its bound"),
            ProcError::ArgumentsTooLarge => write!(f, "argument list too long"),
            ProcError::InvalidArgument => write!(f, "invalid argument"),
            ProcError::NoSuchChild => write!(f, "no such child process"),
            ProcError::NotFound => write!(f, "executable not found"),
            ProcError::NotImplemented => write!(f, "syscall not implemented"),
            ProcError::Errno(e) => write!(f, "errno {}", e),
        }
    }
}

/// Result type for lifecycle operations
pub type Result<T> = core::result::Result<T, ProcError>;
