//! Executable and image-loader contracts
//!
//! The file layer opens executables by path; the image loader maps an open
//! executable into an address space and reports its entry point. Closing an
//! executable is dropping it.

use alloc::boxed::Box;

use crate::error::Result;
use crate::vm::{AddressSpace, UserAddr};

/// An open executable file
pub trait Executable: Send {
    /// Path the executable was opened with
    fn path(&self) -> &str;
}

/// File/volume layer
pub trait ExecutableSource: Send + Sync {
    /// Open the executable at `path`.
    ///
    /// Fails with [`ProcError::NotFound`](crate::ProcError::NotFound) when
    /// nothing exists at `path`.
    fn open(&self, path: &str) -> Result<Box<dyn Executable>>;
}

/// Image loader (ELF or otherwise)
pub trait ImageLoader: Send + Sync {
    /// Load `exe` into `space` and return the entry address.
    fn load(&self, exe: &mut dyn Executable, space: &mut dyn AddressSpace) -> Result<UserAddr>;
}
