//! Unprivileged sandbox identity

use nix::unistd::{Uid, User};
use tokio::process::Command;
use tracing::{info, instrument};

use crate::sandbox::ProvisionError;

/// Fail unless the process runs with an effective uid of 0.
///
/// `init_seccomp` needs root to `chroot` and switch identity.
pub fn require_root() -> Result<(), ProvisionError> {
    if Uid::effective().is_root() {
        Ok(())
    } else {
        Err(ProvisionError::NotRoot)
    }
}

/// Look up the sandbox user, creating it with `useradd` when missing.
///
/// Returns the user's primary gid.
#[instrument]
pub async fn ensure_sandbox_user(name: &str, uid: u32) -> Result<u32, ProvisionError> {
    if let Some(user) = lookup(name)? {
        info!(uid = user.uid.as_raw(), "sandbox user already exists");
        return Ok(user.gid.as_raw());
    }

    let output = Command::new("useradd")
        .arg("-u")
        .arg(uid.to_string())
        .arg(name)
        .output()
        .await
        .map_err(|e| ProvisionError::CreateUser {
            user: name.to_string(),
            message: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(ProvisionError::CreateUser {
            user: name.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    info!(uid, "created sandbox user");

    lookup(name)?
        .map(|user| user.gid.as_raw())
        .ok_or_else(|| ProvisionError::UserNotFound(name.to_string()))
}

fn lookup(name: &str) -> Result<Option<User>, ProvisionError> {
    User::from_name(name).map_err(|e| ProvisionError::CreateUser {
        user: name.to_string(),
        message: e.to_string(),
    })
}
