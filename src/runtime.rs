use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;
use crate::java::is_java_executable;
use crate::platform::java_binary_in;
use crate::utils::ensure_dir_exists;
use crate::{Error, Result};

pub const JRE_DIR_NAME: &str = "YggProJRE";
pub const JRE_ZIP_NAME: &str = "YggProJRE.zip";
pub const JRE_TARBALL_NAME: &str = "YggProJRE.tar.gz";
pub const AGENT_JAR_NAME: &str = "authlib-injector.jar";
pub const SNIFFER_JAR_NAME: &str = "YggProSniffer.jar";

/// Extracted runtime pieces. A missing entry means that feature is unavailable
/// for this run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeArtifacts {
    pub java: Option<PathBuf>,
    pub agent_jar: Option<PathBuf>,
    pub sniffer_jar: Option<PathBuf>,
}

impl RuntimeArtifacts {
    pub fn require_java(&self) -> Result<&Path> {
        self.java
            .as_deref()
            .ok_or_else(|| Error::Provisioning("fallback Java runtime is unavailable".to_string()))
    }
}

pub struct RuntimeProvisioner {
    assets_dir: PathBuf,
    runtime_dir: PathBuf,
    check_timeout: Duration,
}

impl RuntimeProvisioner {
    pub fn new(assets_dir: PathBuf, runtime_dir: PathBuf, check_timeout: Duration) -> Self {
        Self {
            assets_dir,
            runtime_dir,
            check_timeout,
        }
    }

    pub fn jre_dir(&self) -> PathBuf {
        self.runtime_dir.join(JRE_DIR_NAME)
    }

    /// Verifies every artifact and re-extracts the ones that are missing or
    /// corrupt. Failures are logged per artifact; nothing here aborts the run.
    pub async fn ensure_artifacts(&self) -> RuntimeArtifacts {
        if let Err(e) = ensure_dir_exists(&self.runtime_dir) {
            log::error!("Cannot create runtime directory {}: {}", self.runtime_dir.display(), e);
        }

        let java = match self.ensure_java().await {
            Ok(java) => Some(java),
            Err(e) => {
                log::error!("Fallback Java unavailable: {}", e);
                None
            }
        };
        let agent_jar = self
            .ensure_jar(AGENT_JAR_NAME)
            .map_err(|e| log::warn!("Auth agent unavailable, credentials will not be injected: {}", e))
            .ok();
        let sniffer_jar = self
            .ensure_jar(SNIFFER_JAR_NAME)
            .map_err(|e| log::warn!("Sniffer helper unavailable, hidden arguments cannot be resolved: {}", e))
            .ok();

        RuntimeArtifacts {
            java,
            agent_jar,
            sniffer_jar,
        }
    }

    async fn ensure_java(&self) -> Result<PathBuf> {
        let jre_dir = self.jre_dir();
        let java = java_binary_in(&jre_dir);
        if is_java_executable(&java, self.check_timeout).await {
            return Ok(java);
        }

        log::info!("Extracting bundled Java runtime into {}", jre_dir.display());
        self.extract_jre(&jre_dir)?;
        set_executable_bits(&jre_dir)?;

        let java = java_binary_in(&jre_dir);
        if !java.is_file() {
            return Err(Error::Provisioning(format!(
                "bundled runtime has no {}",
                java.strip_prefix(&jre_dir).unwrap_or(&java).display()
            )));
        }
        if !is_java_executable(&java, self.check_timeout).await {
            return Err(Error::Provisioning(format!("{} failed its version check", java.display())));
        }
        Ok(java)
    }

    fn extract_jre(&self, target: &Path) -> Result<()> {
        remove_dir_best_effort(target);

        let dir = self.assets_dir.join(JRE_DIR_NAME);
        let zip = self.assets_dir.join(JRE_ZIP_NAME);
        let tarball = self.assets_dir.join(JRE_TARBALL_NAME);

        if dir.is_dir() {
            copy_dir(&dir, target)?;
        } else if zip.is_file() {
            extract_zip(&zip, target)?;
        } else if tarball.is_file() {
            extract_tar_gz(&tarball, target)?;
        } else {
            return Err(Error::Provisioning(format!(
                "no bundled Java runtime in {}",
                self.assets_dir.display()
            )));
        }

        flatten_single_root(target)
    }

    fn ensure_jar(&self, name: &str) -> Result<PathBuf> {
        let source = self.assets_dir.join(name);
        let target = self.runtime_dir.join(name);
        let source = source.is_file().then_some(source);

        if target.is_file() && jar_is_intact(&target, source.as_deref()) {
            return Ok(target);
        }

        let Some(source) = source else {
            return Err(Error::Provisioning(format!("bundled {} is missing", name)));
        };

        log::info!("Extracting {}", name);
        ensure_dir_exists(&self.runtime_dir)?;
        fs::copy(&source, &target)?;
        if !is_readable_zip(&target) {
            return Err(Error::Provisioning(format!("bundled {} is not a valid jar", name)));
        }
        Ok(target)
    }
}

fn is_readable_zip(path: &Path) -> bool {
    fs::File::open(path)
        .map_err(Error::from)
        .and_then(|file| zip::ZipArchive::new(file).map_err(Error::from))
        .is_ok()
}

fn jar_is_intact(target: &Path, source: Option<&Path>) -> bool {
    if !is_readable_zip(target) {
        log::warn!("{} is corrupt", target.display());
        return false;
    }
    let Some(source) = source else {
        return true;
    };
    match (sha256_file(target), sha256_file(source)) {
        (Ok(current), Ok(bundled)) if current == bundled => true,
        (Ok(_), Ok(_)) => {
            log::info!("{} differs from the bundled copy", target.display());
            false
        }
        (Err(e), _) | (_, Err(e)) => {
            log::warn!("Cannot hash {}: {}", target.display(), e);
            false
        }
    }
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Locked executables (a running JVM on Windows) may refuse removal; the
/// extraction that follows overwrites whatever is left.
fn remove_dir_best_effort(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = fs::remove_dir_all(path) {
        log::warn!("Could not fully remove {}: {}", path.display(), e);
    }
}

fn copy_dir(source: &Path, target: &Path) -> Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::Provisioning(e.to_string()))?;
        let dest = target.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

fn extract_zip(archive_path: &Path, target: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;
    fs::create_dir_all(target)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            log::warn!("Skipping unsafe archive entry {}", entry.name());
            continue;
        };
        let dest = target.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&dest)?;
        std::io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&dest, fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}

fn extract_tar_gz(archive_path: &Path, target: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    fs::create_dir_all(target)?;
    archive.unpack(target)?;
    Ok(())
}

/// Archives usually wrap the JRE in one versioned folder; lift its contents
/// up so `bin/` (or `Contents/`) sits directly under `target`.
fn flatten_single_root(target: &Path) -> Result<()> {
    let entries: Vec<PathBuf> = fs::read_dir(target)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    let [root] = entries.as_slice() else {
        return Ok(());
    };
    let is_layout_dir = matches!(
        root.file_name().and_then(|n| n.to_str()),
        Some("bin" | "Contents" | "lib")
    );
    if !root.is_dir() || is_layout_dir {
        return Ok(());
    }

    let staging = target.with_extension("staging");
    remove_dir_best_effort(&staging);
    fs::rename(root, &staging)?;
    fs::remove_dir(target)?;
    fs::rename(&staging, target)?;
    Ok(())
}

fn set_executable_bits(jre_dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        for entry in WalkDir::new(jre_dir) {
            let entry = entry?;
            let in_bin = entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .is_some_and(|n| n == "bin");
            let is_helper = entry.file_name() == "jspawnhelper";
            if entry.file_type().is_file() && (in_bin || is_helper) {
                let mut perms = fs::metadata(entry.path())?.permissions();
                perms.set_mode(perms.mode() | 0o111);
                fs::set_permissions(entry.path(), perms)?;
            }
        }
    }
    #[cfg(not(unix))]
    let _ = jre_dir;
    Ok(())
}
