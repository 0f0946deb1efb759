use std::path::{Component, Path, PathBuf};
use crate::Result;

pub const APP_NAME: &str = "YggdrasilProxy";
const DATA_DIR_NAME: &str = "yggdrasil-proxy";
const HOME_ENV: &str = "YGGPROXY_HOME";

pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Per-user writable directory holding settings, accounts and the extracted runtime.
pub fn get_data_dir() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME);
    Ok(data_dir)
}

/// Canonical key for a game directory. Existing paths are canonicalized,
/// anything else is made absolute and cleaned lexically.
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = dunce_canonicalize(path) {
        return canonical;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

// Windows canonicalization yields `\\?\` verbatim paths which launchers never pass back.
fn dunce_canonicalize(path: &Path) -> std::io::Result<PathBuf> {
    let canonical = std::fs::canonicalize(path)?;
    #[cfg(windows)]
    {
        let text = canonical.to_string_lossy();
        if let Some(stripped) = text.strip_prefix(r"\\?\") {
            if !stripped.starts_with("UNC\\") {
                return Ok(PathBuf::from(stripped));
            }
        }
    }
    Ok(canonical)
}
