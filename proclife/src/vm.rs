//! Address-space contract and user/kernel copies
//!
//! The lifecycle core never looks inside an address space. It creates,
//! duplicates, activates and drops them, asks for a stack region, and moves
//! bytes across the privilege boundary through [`AddressSpace::copy_in`] and
//! [`AddressSpace::copy_out`]. Dropping the box destroys the address space.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::config::{PointerWidth, PAGE_SIZE};
use crate::error::{ProcError, Result};

/// A virtual address in user space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UserAddr(pub u64);

impl UserAddr {
    /// The null user pointer
    pub const NULL: UserAddr = UserAddr(0);

    pub const fn new(addr: u64) -> Self {
        UserAddr(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address `bytes` above this one, `None` on overflow
    pub fn checked_add(self, bytes: u64) -> Option<UserAddr> {
        self.0.checked_add(bytes).map(UserAddr)
    }

    /// Address `bytes` below this one, `None` on underflow
    pub fn checked_sub(self, bytes: u64) -> Option<UserAddr> {
        self.0.checked_sub(bytes).map(UserAddr)
    }
}

impl fmt::Display for UserAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One process's virtual memory.
pub trait AddressSpace: Send {
    /// Make a full copy of this address space (fork).
    fn duplicate(&self) -> Result<Box<dyn AddressSpace>>;

    /// Load this address space into the MMU of the current CPU.
    fn activate(&self);

    /// Unload this address space from the MMU.
    fn deactivate(&self);

    /// Install the user stack region, returning the initial stack pointer.
    fn define_stack(&mut self) -> Result<UserAddr>;

    /// Copy `dst.len()` bytes from user address `src`.
    ///
    /// Fails with [`ProcError::BadAddress`] if any byte is not mapped.
    fn copy_in(&self, src: UserAddr, dst: &mut [u8]) -> Result<()>;

    /// Copy `src` to user address `dst`.
    ///
    /// Fails with [`ProcError::BadAddress`] if any byte is not mapped
    /// writable.
    fn copy_out(&mut self, dst: UserAddr, src: &[u8]) -> Result<()>;
}

/// Factory for empty address spaces.
pub trait VirtualMemory: Send + Sync {
    /// Create an empty address space.
    fn create(&self) -> Result<Box<dyn AddressSpace>>;
}

/// Copy bytes from user space into `dst`.
pub fn copy_from_user(space: &dyn AddressSpace, dst: &mut [u8], src: UserAddr) -> Result<()> {
    if src.is_null() && !dst.is_empty() {
        return Err(ProcError::BadAddress);
    }
    src.checked_add(dst.len() as u64)
        .ok_or(ProcError::BadAddress)?;
    space.copy_in(src, dst)
}

/// Copy `src` to user space.
pub fn copy_to_user(space: &mut dyn AddressSpace, dst: UserAddr, src: &[u8]) -> Result<()> {
    if dst.is_null() && !src.is_empty() {
        return Err(ProcError::BadAddress);
    }
    dst.checked_add(src.len() as u64)
        .ok_or(ProcError::BadAddress)?;
    space.copy_out(dst, src)
}

/// Read a NUL-terminated string from user space.
///
/// `max_len` bounds the string including its NUL. A string that does not
/// terminate within the bound fails with [`ProcError::StringTooLong`]; it is
/// never truncated. The returned bytes exclude the NUL.
pub fn read_user_string(space: &dyn AddressSpace, ptr: UserAddr, max_len: usize) -> Result<Vec<u8>> {
    if ptr.is_null() {
        return Err(ProcError::BadAddress);
    }

    let mut buf = Vec::with_capacity(max_len.min(256));
    let mut cursor = ptr;
    let mut chunk = [0u8; 64];

    while buf.len() < max_len {
        // Stay within one page per request so an unmapped page after the
        // terminator is never touched.
        let to_page_end = PAGE_SIZE - (cursor.as_u64() % PAGE_SIZE);
        let want = (max_len - buf.len())
            .min(chunk.len())
            .min(to_page_end as usize);

        copy_from_user(space, &mut chunk[..want], cursor)?;

        if let Some(nul) = chunk[..want].iter().position(|&b| b == 0) {
            buf.extend_from_slice(&chunk[..nul]);
            return Ok(buf);
        }
        buf.extend_from_slice(&chunk[..want]);
        cursor = cursor
            .checked_add(want as u64)
            .ok_or(ProcError::BadAddress)?;
    }

    Err(ProcError::StringTooLong)
}

/// Read a NULL-terminated argument vector from user space.
///
/// Each pointer is `width` bytes; each string is bounded by `max_len`
/// (NUL included). More than `max_args` entries fails with
/// [`ProcError::ArgumentsTooLarge`] before the excess string is copied.
pub fn read_user_argv(
    space: &dyn AddressSpace,
    argv: UserAddr,
    width: PointerWidth,
    max_len: usize,
    max_args: Option<usize>,
) -> Result<Vec<Vec<u8>>> {
    if argv.is_null() {
        return Err(ProcError::BadAddress);
    }

    let step = width.bytes() as u64;
    let mut args = Vec::new();
    let mut slot = argv;
    let mut raw = [0u8; 8];

    loop {
        copy_from_user(space, &mut raw[..width.bytes()], slot)?;
        let ptr = UserAddr(width.decode(&raw[..width.bytes()]));
        if ptr.is_null() {
            return Ok(args);
        }
        if max_args.is_some_and(|max| args.len() >= max) {
            return Err(ProcError::ArgumentsTooLarge);
        }
        args.push(read_user_string(space, ptr, max_len)?);
        slot = slot.checked_add(step).ok_or(ProcError::BadAddress)?;
    }
}
