//! Codebox isolation library
//!
//! Built as a `cdylib` and loaded into the sandboxed interpreter by the
//! generated bootstrap script. [`init_seccomp`] confines the calling process:
//!
//! 1. `chroot(".")` into the sandbox root (the current directory), then `chdir("/")`
//! 2. `PR_SET_NO_NEW_PRIVS`
//! 3. `setgid(gid)` then `setuid(uid)`
//! 4. install a kill-by-default seccomp allowlist
//!
//! The allowlist can be replaced wholesale through the `ALLOWED_SYSCALLS`
//! environment variable (comma-separated syscall numbers).

use std::ffi::c_char;

use libc::{c_int, gid_t, uid_t};

pub mod filter;
pub mod syscalls;

/// Environment variable holding an allowlist override
pub const ALLOWED_SYSCALLS_ENV: &str = "ALLOWED_SYSCALLS";

/// Failure codes returned by [`init_seccomp`]
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    Chroot = -1,
    Chdir = -2,
    NoNewPrivs = -3,
    SetGid = -4,
    SetUid = -5,
    Filter = -6,
}

/// Syscall sets for one filter installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallPolicy {
    pub allowed: Vec<i64>,
    pub denied_with_eperm: Vec<i64>,
}

impl SyscallPolicy {
    /// Resolve the policy for this build.
    ///
    /// A non-empty `override_list` replaces the built-in allowlist entirely
    /// (network syscalls are not appended). Entries that do not parse as
    /// integers are skipped.
    pub fn resolve(enable_network: bool, override_list: Option<&str>) -> Self {
        let mut allowed: Vec<i64> = override_list
            .unwrap_or_default()
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();

        if allowed.is_empty() {
            allowed.extend_from_slice(syscalls::ALLOW);
            if enable_network {
                allowed.extend_from_slice(syscalls::NETWORK);
            }
        }

        Self {
            allowed,
            denied_with_eperm: syscalls::ERRNO.to_vec(),
        }
    }
}

fn enter_root() -> Result<(), InitError> {
    if unsafe { libc::chroot(c".".as_ptr()) } != 0 {
        return Err(InitError::Chroot);
    }
    if unsafe { libc::chdir(c"/".as_ptr()) } != 0 {
        return Err(InitError::Chdir);
    }
    Ok(())
}

fn set_no_new_privs() -> Result<(), InitError> {
    if unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) } != 0 {
        return Err(InitError::NoNewPrivs);
    }
    Ok(())
}

fn drop_privileges(uid: uid_t, gid: gid_t) -> Result<(), InitError> {
    if unsafe { libc::setgid(gid) } != 0 {
        return Err(InitError::SetGid);
    }
    if unsafe { libc::setuid(uid) } != 0 {
        return Err(InitError::SetUid);
    }
    Ok(())
}

fn install_policy(enable_network: bool) -> Result<(), InitError> {
    let override_list = std::env::var(ALLOWED_SYSCALLS_ENV).ok();
    let policy = SyscallPolicy::resolve(enable_network, override_list.as_deref());
    filter::install(&policy).map_err(|_| InitError::Filter)
}

/// Confine the calling process. Returns `0` on success or a negative
/// [`InitError`] code.
///
/// # Safety
///
/// Must be called once, from the main thread, before any untrusted code runs.
/// The working directory must be the sandbox root.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn init_seccomp(uid: uid_t, gid: gid_t, enable_network: c_int) -> c_int {
    let result = enter_root()
        .and_then(|()| set_no_new_privs())
        .and_then(|()| drop_privileges(uid, gid))
        .and_then(|()| install_policy(enable_network != 0));

    match result {
        Ok(()) => 0,
        Err(code) => code as c_int,
    }
}

/// Library version as a static NUL-terminated string
#[unsafe(no_mangle)]
pub extern "C" fn get_lib_version_static() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr().cast()
}

/// Runtime this build targets (`python3` or `nodejs`) as a static NUL-terminated string
#[unsafe(no_mangle)]
pub extern "C" fn get_lib_feature_static() -> *const c_char {
    #[cfg(not(feature = "nodejs"))]
    let feature = c"python3";
    #[cfg(feature = "nodejs")]
    let feature = c"nodejs";
    feature.as_ptr()
}
