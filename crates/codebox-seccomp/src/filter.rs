//! Seccomp filter construction through libseccomp
//!
//! Syscalls in the allow set are permitted, syscalls in the deny set fail
//! with `EPERM`, and everything else kills the process. libseccomp adds the
//! audit architecture check for the native architecture.

use libseccomp::error::SeccompError;
use libseccomp::{ScmpAction, ScmpFilterContext, ScmpSyscall};

use crate::SyscallPolicy;

/// Build an unloaded filter context holding every rule of `policy`.
pub fn build_context(policy: &SyscallPolicy) -> Result<ScmpFilterContext, SeccompError> {
    let mut ctx = ScmpFilterContext::new_filter(ScmpAction::KillProcess)?;

    for &nr in &policy.allowed {
        ctx.add_rule(ScmpAction::Allow, syscall(nr))?;
    }
    for &nr in &policy.denied_with_eperm {
        ctx.add_rule(ScmpAction::Errno(libc::EPERM), syscall(nr))?;
    }

    Ok(ctx)
}

/// Build and load `policy` on the calling thread.
///
/// `PR_SET_NO_NEW_PRIVS` must already be set, or the caller must hold
/// `CAP_SYS_ADMIN`. A loaded filter cannot be removed.
pub fn install(policy: &SyscallPolicy) -> Result<(), SeccompError> {
    build_context(policy)?.load()
}

fn syscall(nr: i64) -> ScmpSyscall {
    ScmpSyscall::from(nr as i32)
}
