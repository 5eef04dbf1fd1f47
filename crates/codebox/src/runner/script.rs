//! Generated bootstrap scripts
//!
//! Each execution renders a template into a uniquely named file under the
//! sandbox root. The file is removed when its [`GeneratedScript`] is dropped,
//! which covers success, error, timeout and cancellation alike.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::runner::ExecuteError;

/// Mode of generated scripts and their directory
const SCRIPT_MODE: u32 = 0o755;

/// Substitute `{{name}}` placeholders in a single pass.
///
/// Substituted values are never rescanned, so a preload snippet containing
/// `{{code}}` stays literal. Unknown placeholders are left untouched.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = &after[..end];
                match vars.iter().find(|(key, _)| *key == name) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(name);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// A bootstrap script on disk, deleted on drop
#[derive(Debug)]
pub struct GeneratedScript {
    path: PathBuf,
}

impl GeneratedScript {
    /// Write `contents` to a new `<uuid>.<extension>` file in `dir`.
    ///
    /// The file is created exclusively, so two executions can never share a
    /// path.
    pub async fn write(dir: &Path, extension: &str, contents: &str) -> Result<Self, ExecuteError> {
        let write_err = |path: &Path, source| ExecuteError::ScriptWrite {
            path: path.to_path_buf(),
            source,
        };

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| write_err(dir, e))?;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(SCRIPT_MODE))
            .await
            .map_err(|e| write_err(dir, e))?;

        let path = dir.join(format!("{}.{extension}", Uuid::new_v4().simple()));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(SCRIPT_MODE)
            .open(&path)
            .await
            .map_err(|e| write_err(&path, e))?;

        // from here on the guard owns the file and removes it on any error
        let script = Self { path };
        file.write_all(contents.as_bytes())
            .await
            .map_err(|e| write_err(&script.path, e))?;
        file.flush().await.map_err(|e| write_err(&script.path, e))?;
        tokio::fs::set_permissions(&script.path, std::fs::Permissions::from_mode(SCRIPT_MODE))
            .await
            .map_err(|e| write_err(&script.path, e))?;

        debug!(path = %script.path.display(), "bootstrap script written");
        Ok(script)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for GeneratedScript {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove bootstrap script"),
        }
    }
}
