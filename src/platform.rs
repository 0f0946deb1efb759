use std::path::{Path, PathBuf};

pub fn get_default_java_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from("C:\\Program Files\\Java"));
        paths.push(PathBuf::from("C:\\Program Files (x86)\\Java"));
        paths.push(PathBuf::from("C:\\Program Files\\Eclipse Adoptium"));
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/Library/Java/JavaVirtualMachines"));
        paths.push(PathBuf::from("/System/Library/Java/JavaVirtualMachines"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join("Library/Java/JavaVirtualMachines"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/lib/jvm"));
        paths.push(PathBuf::from("/usr/java"));
        paths.push(PathBuf::from("/opt/java"));
    }

    paths
}

pub fn get_classpath_separator() -> &'static str {
    if cfg!(windows) {
        ";"
    } else {
        ":"
    }
}

pub fn java_executable_name() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

/// `bin/java` under a JVM home, accepting the macOS `Contents/Home` bundle layout.
pub fn java_binary_in(home: &Path) -> PathBuf {
    let direct = home.join("bin").join(java_executable_name());
    if direct.exists() {
        return direct;
    }
    let bundle = home
        .join("Contents")
        .join("Home")
        .join("bin")
        .join(java_executable_name());
    if bundle.exists() {
        bundle
    } else {
        direct
    }
}

/// Read-only assets shipped alongside the binary: `<exe dir>/assets`.
pub fn bundled_assets_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let exe_dir = exe.parent()?;
    Some(exe_dir.join("assets"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_java_binary_in_prefers_direct_layout() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join(java_executable_name()), b"").unwrap();
        assert_eq!(java_binary_in(dir.path()), bin.join(java_executable_name()));
    }

    #[test]
    fn test_java_binary_in_macos_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("Contents").join("Home").join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join(java_executable_name()), b"").unwrap();
        assert_eq!(java_binary_in(dir.path()), bin.join(java_executable_name()));
    }
}
