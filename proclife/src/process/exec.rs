//! `execv` and argument marshalling
//!
//! # Stack layout
//!
//! With `S` the argument slot size, `W` the user pointer width, `N` the
//! argument count and `top` the stack pointer returned by
//! [`AddressSpace::define_stack`]:
//!
//! ```text
//!   top ──────────────► ┌────────────────────────┐
//!                       │ slot N: all zeros      │  S bytes
//!                       ├────────────────────────┤
//!                       │ slot N-1: "argN-1\0.." │
//!                       │ ...                    │
//!   strings ──────────► │ slot 0: "arg0\0...."   │
//!                       ├────────────────────────┤
//!                       │ NULL                   │  W bytes
//!                       │ strings + S*(N-1)      │
//!                       │ ...                    │
//!   argv = sp ────────► │ strings + S*0          │
//!                       └────────────────────────┘
//! ```
//!
//! `strings = top - S*(N+1)` and `argv = strings - W*(N+1)`. Slots are
//! zero-padded. The new program starts with `sp = argv`.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use super::entity::{LifecycleFlags, Process};
use super::manager::ProcessManager;
use crate::config::LifecycleConfig;
use crate::error::{ProcError, Result};
use crate::loader::Executable;
use crate::vm::{copy_to_user, read_user_argv, read_user_string, AddressSpace, UserAddr};

/// Where and how a new image starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserEntry {
    /// Entry point of the loaded image
    pub entry: UserAddr,
    /// Initial user stack pointer
    pub stack_pointer: UserAddr,
    pub argc: usize,
    /// User address of the argument vector
    pub argv: UserAddr,
}

/// Addresses of a marshalled argument area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackLayout {
    /// First string slot
    pub strings: UserAddr,
    /// First pointer of the argument vector
    pub argv: UserAddr,
    pub stack_pointer: UserAddr,
}

impl StackLayout {
    /// Compute the layout for `argc` arguments below `top`.
    ///
    /// Fails with [`ProcError::ArgumentsTooLarge`] if the area exceeds the
    /// configured cap or would run below address zero.
    pub fn compute(top: UserAddr, argc: usize, config: &LifecycleConfig) -> Result<Self> {
        let slots = argc.checked_add(1).ok_or(ProcError::ArgumentsTooLarge)?;
        let string_bytes = config
            .arg_slot_size
            .checked_mul(slots)
            .ok_or(ProcError::ArgumentsTooLarge)?;
        let pointer_bytes = config
            .pointer_width
            .bytes()
            .checked_mul(slots)
            .ok_or(ProcError::ArgumentsTooLarge)?;
        let total = string_bytes
            .checked_add(pointer_bytes)
            .ok_or(ProcError::ArgumentsTooLarge)?;

        if let Some(max) = config.arg_max {
            if total > max {
                return Err(ProcError::ArgumentsTooLarge);
            }
        }

        let strings = top
            .checked_sub(string_bytes as u64)
            .ok_or(ProcError::ArgumentsTooLarge)?;
        let argv = strings
            .checked_sub(pointer_bytes as u64)
            .ok_or(ProcError::ArgumentsTooLarge)?;
        if argv.is_null() {
            return Err(ProcError::ArgumentsTooLarge);
        }

        Ok(Self {
            strings,
            argv,
            stack_pointer: argv,
        })
    }

    /// User address of string slot `index`
    pub fn slot(&self, index: usize, config: &LifecycleConfig) -> UserAddr {
        UserAddr(self.strings.as_u64() + (config.arg_slot_size * index) as u64)
    }
}

/// Write `args` onto the stack below `top`.
///
/// Every argument plus its NUL must fit in one slot. Faults while writing
/// mean the stack region cannot hold the area and are reported as
/// [`ProcError::ArgumentsTooLarge`].
pub(crate) fn marshal_args(
    space: &mut dyn AddressSpace,
    top: UserAddr,
    args: &[Vec<u8>],
    config: &LifecycleConfig,
) -> Result<StackLayout> {
    let slot = config.arg_slot_size;
    let width = config.pointer_width.bytes();

    if args.iter().any(|arg| arg.len() >= slot) {
        return Err(ProcError::StringTooLong);
    }

    let layout = StackLayout::compute(top, args.len(), config)?;

    let mut strings = vec![0u8; slot * (args.len() + 1)];
    for (i, arg) in args.iter().enumerate() {
        strings[slot * i..slot * i + arg.len()].copy_from_slice(arg);
    }

    let mut pointers = vec![0u8; width * (args.len() + 1)];
    for i in 0..args.len() {
        let (raw, len) = config
            .pointer_width
            .encode(layout.slot(i, config).as_u64())
            .ok_or(ProcError::InvalidArgument)?;
        pointers[width * i..width * i + len].copy_from_slice(&raw[..len]);
    }

    let fault = |e: ProcError| match e {
        ProcError::BadAddress => ProcError::ArgumentsTooLarge,
        other => other,
    };
    copy_to_user(space, layout.strings, &strings).map_err(fault)?;
    copy_to_user(space, layout.argv, &pointers).map_err(fault)?;

    Ok(layout)
}

impl ProcessManager {
    /// Replace `caller`'s image with the executable at user address `path`.
    ///
    /// `argv` points to a NULL-terminated vector of user string pointers.
    /// On success the old address space is gone and the returned
    /// [`UserEntry`] describes how to enter the new image. On failure the
    /// caller's original address space is installed and active again.
    pub fn exec(&self, caller: &Arc<Process>, path: UserAddr, argv: UserAddr) -> Result<UserEntry> {
        let (path, args) = caller
            .with_space(|space| -> Result<(Vec<u8>, Vec<Vec<u8>>)> {
                let path = read_user_string(space, path, self.config.path_max)?;
                let args = read_user_argv(
                    space,
                    argv,
                    self.config.pointer_width,
                    self.config.arg_slot_size,
                    self.config.max_args(),
                )?;
                Ok((path, args))
            })
            .ok_or(ProcError::InvalidArgument)??;
        let path = String::from_utf8(path).map_err(|_| ProcError::InvalidArgument)?;

        let mut exe = self.services.vfs.open(&path)?;
        let mut space = self.services.vm.create()?;

        caller.with_space(|old| old.deactivate());
        space.activate();

        match self.build_image(&mut *space, &mut *exe, &args) {
            Ok((entry, layout)) => {
                drop(exe);
                let old = caller.replace_space(Some(space));
                drop(old);

                caller.set_name(path.clone());
                caller.inner.lock().flags.insert(LifecycleFlags::EXECED);

                log::debug!(
                    "[PROC exec] pid {} -> {} argc={} entry={} sp={}",
                    caller.pid(),
                    path,
                    args.len(),
                    entry,
                    layout.stack_pointer
                );
                Ok(UserEntry {
                    entry,
                    stack_pointer: layout.stack_pointer,
                    argc: args.len(),
                    argv: layout.argv,
                })
            }
            Err(e) => {
                space.deactivate();
                drop(space);
                caller.with_space(|old| old.activate());
                log::warn!(
                    "[PROC exec] pid {} exec of {} failed, old image restored: {}",
                    caller.pid(),
                    path,
                    e
                );
                Err(e)
            }
        }
    }

    fn build_image(
        &self,
        space: &mut dyn AddressSpace,
        exe: &mut dyn Executable,
        args: &[Vec<u8>],
    ) -> Result<(UserAddr, StackLayout)> {
        let entry = self.services.loader.load(exe, space)?;
        let top = space.define_stack()?;
        let layout = marshal_args(space, top, args, &self.config)?;
        Ok((entry, layout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PointerWidth;
    use crate::tests::fakes::FakeSpace;
    use proptest::prelude::*;

    const TOP: u64 = 0x8000_0000;

    fn stack() -> FakeSpace {
        FakeSpace::with_region(TOP - 0x10000, 0x10000)
    }

    #[test]
    fn test_layout_two_args_64bit() {
        let config = LifecycleConfig::default();
        let mut space = stack();
        let args = vec![b"prog".to_vec(), b"-v".to_vec()];

        let layout = marshal_args(&mut space, UserAddr(TOP), &args, &config).unwrap();

        assert_eq!(layout.strings, UserAddr(TOP - 128 * 3));
        assert_eq!(layout.argv, UserAddr(TOP - 128 * 3 - 8 * 3));
        assert_eq!(layout.stack_pointer, layout.argv);

        assert_eq!(space.peek(TOP - 384, 5), b"prog\0");
        assert_eq!(space.peek(TOP - 256, 3), b"-v\0");
        assert!(space.peek(TOP - 128, 128).iter().all(|&b| b == 0));
        // Padding after the NUL stays zero
        assert!(space.peek(TOP - 384 + 4, 124).iter().all(|&b| b == 0));

        let argv = layout.argv.as_u64();
        assert_eq!(space.peek_u64(argv), TOP - 384);
        assert_eq!(space.peek_u64(argv + 8), TOP - 256);
        assert_eq!(space.peek_u64(argv + 16), 0);
    }

    #[test]
    fn test_layout_32bit_pointers() {
        let config = LifecycleConfig::bits32();
        let mut space = stack();
        let args = vec![b"a".to_vec()];

        let layout = marshal_args(&mut space, UserAddr(TOP), &args, &config).unwrap();
        assert_eq!(layout.argv, UserAddr(TOP - 256 - 8));
        assert_eq!(space.peek_u32(layout.argv.as_u64()), (TOP - 256) as u32);
        assert_eq!(space.peek_u32(layout.argv.as_u64() + 4), 0);
    }

    #[test]
    fn test_no_arguments() {
        let config = LifecycleConfig::default();
        let mut space = stack();
        let layout = marshal_args(&mut space, UserAddr(TOP), &[], &config).unwrap();
        assert_eq!(layout.strings, UserAddr(TOP - 128));
        assert_eq!(layout.argv, UserAddr(TOP - 128 - 8));
        assert_eq!(space.peek_u64(layout.argv.as_u64()), 0);
    }

    #[test]
    fn test_slot_bound_includes_nul() {
        let config = LifecycleConfig::default();
        let mut space = stack();

        let fits = vec![vec![b'x'; 127]];
        assert!(marshal_args(&mut space, UserAddr(TOP), &fits, &config).is_ok());

        let too_long = vec![vec![b'x'; 128]];
        assert_eq!(
            marshal_args(&mut space, UserAddr(TOP), &too_long, &config),
            Err(ProcError::StringTooLong)
        );
    }

    #[test]
    fn test_arg_max_and_stack_room() {
        let config = LifecycleConfig {
            arg_max: Some(200),
            ..LifecycleConfig::default()
        };
        let mut space = stack();
        let args = vec![b"a".to_vec()];
        // 2 slots of 128 plus 2 pointers exceed 200 bytes
        assert_eq!(
            marshal_args(&mut space, UserAddr(TOP), &args, &config),
            Err(ProcError::ArgumentsTooLarge)
        );

        // Region too small for the area
        let config = LifecycleConfig::default();
        let mut tiny = FakeSpace::with_region(TOP - 64, 64);
        assert_eq!(
            marshal_args(&mut tiny, UserAddr(TOP), &args, &config),
            Err(ProcError::ArgumentsTooLarge)
        );

        // Underflow below address zero
        assert_eq!(
            StackLayout::compute(UserAddr(100), 1, &config),
            Err(ProcError::ArgumentsTooLarge)
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Every argument reads back from the slot its argv pointer names.
        #[test]
        fn prop_argv_points_at_arguments(
            args in proptest::collection::vec(
                proptest::collection::vec(1u8..=255, 0..127), 0..12),
            bits32 in any::<bool>(),
        ) {
            let config = if bits32 { LifecycleConfig::bits32() } else { LifecycleConfig::default() };
            let width = config.pointer_width;
            let mut space = stack();

            let layout = marshal_args(&mut space, UserAddr(TOP), &args, &config).unwrap();
            let n = args.len() as u64;
            prop_assert_eq!(layout.strings.as_u64(), TOP - 128 * (n + 1));
            prop_assert_eq!(layout.argv.as_u64(), layout.strings.as_u64() - width.bytes() as u64 * (n + 1));

            for (i, arg) in args.iter().enumerate() {
                let slot_addr = layout.argv.as_u64() + (i * width.bytes()) as u64;
                let ptr = width.decode(&space.peek(slot_addr, width.bytes()));
                prop_assert_eq!(ptr, layout.strings.as_u64() + 128 * i as u64);
                prop_assert_eq!(space.peek(ptr, arg.len()), arg.clone());
                prop_assert_eq!(space.peek(ptr + arg.len() as u64, 1), vec![0u8]);
            }
            let last = layout.argv.as_u64() + n * width.bytes() as u64;
            prop_assert_eq!(width.decode(&space.peek(last, width.bytes())), 0);
            prop_assert!(matches!(width, PointerWidth::Bits32 | PointerWidth::Bits64));
        }
    }
}
