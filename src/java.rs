use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use crate::platform::{get_default_java_paths, java_binary_in, java_executable_name};
use crate::utils::normalize_path;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaVersion {
    pub major: u8,
    pub path: PathBuf,
}

/// Runs `java -version` under `timeout` and parses the reported major version.
pub async fn probe_java(path: &Path, timeout: Duration) -> Result<JavaVersion> {
    let output = Command::new(path)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, output)
        .await
        .map_err(|_| Error::Java(format!("{} did not answer -version in time", path.display())))??;

    if !output.status.success() {
        return Err(Error::Java(format!("{} -version exited with {}", path.display(), output.status)));
    }

    // Most JVMs report on stderr, some wrappers on stdout.
    let mut report = String::from_utf8_lossy(&output.stderr).to_string();
    report.push_str(&String::from_utf8_lossy(&output.stdout));

    let major = parse_java_version(&report)
        .ok_or_else(|| Error::Java(format!("unrecognized version output from {}", path.display())))?;
    Ok(JavaVersion {
        major,
        path: path.to_path_buf(),
    })
}

pub async fn is_java_executable(path: &Path, timeout: Duration) -> bool {
    if !path.is_file() {
        return false;
    }
    match probe_java(path, timeout).await {
        Ok(version) => {
            log::debug!("{} is Java {}", path.display(), version.major);
            true
        }
        Err(e) => {
            log::debug!("Rejecting {}: {}", path.display(), e);
            false
        }
    }
}

fn parse_java_version(version_str: &str) -> Option<u8> {
    // openjdk version "1.8.0_292" / "17.0.1" / "21" 2023-09-19 / "22-ea"
    let line = version_str.lines().find(|l| l.contains(" version \""))?;
    let quoted = line.split('"').nth(1)?;
    let mut parts = quoted.split('.');
    let first = parts.next()?;
    let major = if first == "1" { parts.next()? } else { first };
    let digits: String = major.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Finds the real Java runtime to hand launches to, never the proxy itself.
pub struct JavaLocator {
    own_exe: Option<PathBuf>,
    data_dir: PathBuf,
    timeout: Duration,
}

impl JavaLocator {
    pub fn new(data_dir: &Path, timeout: Duration) -> Self {
        Self {
            own_exe: std::env::current_exe().ok().map(|p| normalize_path(&p)),
            data_dir: normalize_path(data_dir),
            timeout,
        }
    }

    pub fn is_excluded(&self, candidate: &Path) -> bool {
        let candidate = normalize_path(candidate);
        self.own_exe.as_deref() == Some(candidate.as_path()) || candidate.starts_with(&self.data_dir)
    }

    /// Discovery order: `JAVA_HOME`, then `PATH`, then well-known install roots.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();

        if let Some(home) = std::env::var_os("JAVA_HOME").filter(|v| !v.is_empty()) {
            found.push(java_binary_in(Path::new(&home)));
        }

        if let Some(path) = std::env::var_os("PATH") {
            for dir in std::env::split_paths(&path) {
                found.push(dir.join(java_executable_name()));
            }
        }

        for root in get_default_java_paths() {
            let Ok(entries) = std::fs::read_dir(&root) else {
                continue;
            };
            let mut homes: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            // Newest-looking installs first.
            homes.sort();
            homes.reverse();
            found.extend(homes.iter().map(|h| java_binary_in(h)));
        }

        found
    }

    /// The configured Java if it still exists, else the first discovered
    /// candidate that answers `-version`.
    pub async fn locate(&self, configured: Option<&Path>) -> Option<PathBuf> {
        if let Some(configured) = configured {
            if configured.is_file() && !self.is_excluded(configured) {
                return Some(configured.to_path_buf());
            }
            log::warn!("Configured Java {} is unusable, searching again", configured.display());
        }

        for candidate in self.candidates() {
            if !candidate.is_file() || self.is_excluded(&candidate) {
                continue;
            }
            if is_java_executable(&candidate, self.timeout).await {
                log::info!("Found Java at {}", candidate.display());
                return Some(candidate);
            }
        }

        None
    }
}
