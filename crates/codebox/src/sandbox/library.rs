//! The isolation library shipped with the service
//!
//! The release build is read into memory once at startup and written into
//! each sandbox root whenever the on-disk copy is missing.

use std::ffi::{CStr, CString, c_char};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::sandbox::ProvisionError;

/// Symbol returning the library version string
const VERSION_SYMBOL: &CStr = c"get_lib_version_static";

/// Symbol returning the runtime the library was built for
const FEATURE_SYMBOL: &CStr = c"get_lib_feature_static";

/// In-memory copy of an isolation library build
#[derive(Debug, Clone)]
pub struct IsolationLibrary {
    source: PathBuf,
    bytes: Arc<[u8]>,
}

/// Strings reported by a loaded isolation library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryInfo {
    pub feature: String,
    pub version: String,
}

impl IsolationLibrary {
    /// Read the release build at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProvisionError> {
        let source = path.as_ref().to_path_buf();
        let bytes = std::fs::read(&source).map_err(|e| ProvisionError::LibraryMissing {
            path: source.clone(),
            source: e,
        })?;
        if bytes.is_empty() {
            return Err(ProvisionError::LibraryEmpty(source));
        }
        Ok(Self {
            source,
            bytes: bytes.into(),
        })
    }

    /// Wrap bytes that did not come from disk
    pub fn from_bytes(source: impl Into<PathBuf>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            source: source.into(),
            bytes: bytes.into(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Load the release build with `dlopen` and read its feature and version.
    ///
    /// Only the static string getters are called; `init_seccomp` is never
    /// invoked in the service process.
    pub fn inspect(&self) -> Result<LibraryInfo, ProvisionError> {
        let path = CString::new(self.source.as_os_str().as_bytes())
            .map_err(|_| ProvisionError::Inspect(format!("{} contains NUL", self.source.display())))?;

        let handle = unsafe { libc::dlopen(path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(ProvisionError::Inspect(last_dl_error()));
        }

        let info = read_symbol(handle, FEATURE_SYMBOL).and_then(|feature| {
            read_symbol(handle, VERSION_SYMBOL).map(|version| LibraryInfo { feature, version })
        });
        unsafe { libc::dlclose(handle) };
        info
    }
}

fn read_symbol(handle: *mut libc::c_void, name: &CStr) -> Result<String, ProvisionError> {
    let symbol = unsafe { libc::dlsym(handle, name.as_ptr()) };
    if symbol.is_null() {
        return Err(ProvisionError::Inspect(format!(
            "symbol {} not found",
            name.to_string_lossy()
        )));
    }
    let getter: extern "C" fn() -> *const c_char = unsafe { std::mem::transmute(symbol) };
    let value = getter();
    if value.is_null() {
        return Ok(String::new());
    }
    Ok(unsafe { CStr::from_ptr(value) }.to_string_lossy().into_owned())
}

fn last_dl_error() -> String {
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        return "dlopen failed".to_string();
    }
    unsafe { CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_reads_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libpython.so");
        std::fs::write(&path, b"\x7fELF fake").unwrap();

        let library = IsolationLibrary::load(&path).unwrap();
        assert_eq!(library.bytes(), b"\x7fELF fake");
        assert_eq!(library.source(), path);
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = IsolationLibrary::load(dir.path().join("absent.so")).unwrap_err();
        assert!(matches!(err, ProvisionError::LibraryMissing { .. }));
    }

    #[test]
    fn load_empty_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.so");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(
            IsolationLibrary::load(&path),
            Err(ProvisionError::LibraryEmpty(_))
        ));
    }

    #[test]
    fn inspect_rejects_non_library() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-lib.so");
        std::fs::write(&path, b"plain text").unwrap();
        let library = IsolationLibrary::load(&path).unwrap();
        assert!(matches!(library.inspect(), Err(ProvisionError::Inspect(_))));
    }
}
