//! Best-effort resolution of the key storage location when none is
//! configured explicitly.

use std::path::PathBuf;

const STORAGE_DIR_NAME: &str = "jwks-kit";

/// Picks a storage directory: user profile first, then a machine-wide
/// location, then an ephemeral temp directory.
///
/// This is a usability fallback, not a correctness guarantee; the
/// selection is static and applied once at store construction.
pub fn default_key_storage_directory() -> PathBuf {
    if let Some(dir) = dirs::data_local_dir() {
        return dir.join(STORAGE_DIR_NAME).join("keys");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(format!(".{STORAGE_DIR_NAME}")).join("keys");
    }
    if let Some(machine_wide) = machine_wide_directory() {
        return machine_wide;
    }
    std::env::temp_dir().join(format!("{STORAGE_DIR_NAME}-keys"))
}

fn machine_wide_directory() -> Option<PathBuf> {
    // %PROGRAMDATA% on Windows, /var/lib elsewhere.
    if let Ok(program_data) = std::env::var("PROGRAMDATA") {
        return Some(PathBuf::from(program_data).join(STORAGE_DIR_NAME).join("keys"));
    }
    let var_lib = PathBuf::from("/var/lib");
    var_lib
        .is_dir()
        .then(|| var_lib.join(STORAGE_DIR_NAME).join("keys"))
}
