//! Lifecycle configuration.
//!
//! Compile-time defaults live in the constants below; [`LifecycleConfig`]
//! lets the embedding kernel override them when it builds its
//! [`ProcessManager`](crate::process::ProcessManager).

/// Reserved pid of the kernel itself. Never handed to a user process.
pub const KERNEL_PID: u64 = 0;

/// Lowest pid handed to a user process.
pub const PID_MIN: u64 = 1;

/// Highest pid handed to a user process.
pub const PID_MAX: u64 = 32767;

/// Default cap on processes registered at once.
pub const MAX_PROCESSES: usize = 1024;

/// Page size (4 KB). User copies never straddle a page in one request.
pub const PAGE_SIZE: u64 = 4096;

/// Maximum executable path length accepted by `execv`, NUL included.
pub const PATH_MAX: usize = 1024;

/// Width of one argument string slot on a freshly built user stack.
/// Every argument, NUL included, must fit in one slot.
pub const ARG_SLOT_SIZE: usize = 128;

/// Width of the pointers a user program reads from its argument vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerWidth {
    /// 32-bit user programs
    Bits32,
    /// 64-bit user programs
    Bits64,
}

impl PointerWidth {
    /// Size of one pointer in bytes
    pub const fn bytes(self) -> usize {
        match self {
            PointerWidth::Bits32 => 4,
            PointerWidth::Bits64 => 8,
        }
    }

    /// Encode `value` as a native-endian pointer of this width.
    ///
    /// Returns `None` when the value does not fit.
    pub fn encode(self, value: u64) -> Option<([u8; 8], usize)> {
        let mut out = [0u8; 8];
        match self {
            PointerWidth::Bits32 => {
                let narrow = u32::try_from(value).ok()?;
                out[..4].copy_from_slice(&narrow.to_ne_bytes());
                Some((out, 4))
            }
            PointerWidth::Bits64 => {
                out.copy_from_slice(&value.to_ne_bytes());
                Some((out, 8))
            }
        }
    }

    /// Decode a native-endian pointer of this width.
    pub fn decode(self, bytes: &[u8]) -> u64 {
        match self {
            PointerWidth::Bits32 => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&bytes[..4]);
                u32::from_ne_bytes(raw) as u64
            }
            PointerWidth::Bits64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                u64::from_ne_bytes(raw)
            }
        }
    }
}

/// Runtime configuration of the lifecycle core.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Lowest pid handed out
    pub pid_min: u64,
    /// Highest pid handed out
    pub pid_max: u64,
    /// Cap on processes registered at once
    pub max_processes: usize,
    /// Maximum path length for `execv`, NUL included
    pub path_max: usize,
    /// Argument string slot width on the user stack
    pub arg_slot_size: usize,
    /// Pointer width of user programs
    pub pointer_width: PointerWidth,
    /// Optional cap on the bytes the argument area may occupy
    pub arg_max: Option<usize>,
}

impl LifecycleConfig {
    /// Configuration for 32-bit user programs (4-byte argv slots).
    pub fn bits32() -> Self {
        Self {
            pointer_width: PointerWidth::Bits32,
            ..Self::default()
        }
    }

    /// Largest argument count whose area fits `arg_max`, if capped
    pub fn max_args(&self) -> Option<usize> {
        let per_arg = self.arg_slot_size + self.pointer_width.bytes();
        self.arg_max
            .map(|max| (max / per_arg.max(1)).saturating_sub(1))
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            pid_min: PID_MIN,
            pid_max: PID_MAX,
            max_processes: MAX_PROCESSES,
            path_max: PATH_MAX,
            arg_slot_size: ARG_SLOT_SIZE,
            pointer_width: PointerWidth::Bits64,
            arg_max: None,
        }
    }
}
