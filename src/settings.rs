use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::{Error, Result};

const DEFAULT_API_NAME: &str = "LittleSkin";
const DEFAULT_API_URL: &str = "https://littleskin.cn/api/yggdrasil";

fn default_api_list() -> Vec<ApiEndpoint> {
    vec![ApiEndpoint::new(DEFAULT_API_NAME, DEFAULT_API_URL)]
}

fn default_version_label() -> String {
    crate::utils::APP_NAME.to_string()
}

fn default_sniff_timeout_secs() -> u64 {
    30
}

fn default_java_check_timeout_secs() -> u64 {
    2
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub name: String,
    pub base_url: String,
}

impl ApiEndpoint {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_api_list")]
    pub api_list: Vec<ApiEndpoint>,
    #[serde(default)]
    pub current_api_index: usize,
    #[serde(default)]
    pub real_java_path: Option<PathBuf>,
    #[serde(default)]
    pub instance_java: BTreeMap<String, PathBuf>,
    #[serde(default = "default_version_label")]
    pub version_label: String,
    #[serde(default = "default_sniff_timeout_secs")]
    pub sniff_timeout_secs: u64,
    #[serde(default = "default_java_check_timeout_secs")]
    pub java_check_timeout_secs: u64,
    #[serde(default)]
    pub extra_wrappers: Vec<String>,
    #[serde(default)]
    pub extra_main_classes: Vec<String>,
    #[serde(default)]
    pub assets_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_list: default_api_list(),
            current_api_index: 0,
            real_java_path: None,
            instance_java: BTreeMap::new(),
            version_label: default_version_label(),
            sniff_timeout_secs: default_sniff_timeout_secs(),
            java_check_timeout_secs: default_java_check_timeout_secs(),
            extra_wrappers: Vec::new(),
            extra_main_classes: Vec::new(),
            assets_dir: None,
        }
    }
}

impl Settings {
    /// The selected endpoint; an out-of-range index falls back to the first entry,
    /// an empty list to the built-in default.
    pub fn current_api(&self) -> ApiEndpoint {
        let endpoint = self
            .api_list
            .get(self.current_api_index)
            .or_else(|| self.api_list.first())
            .cloned()
            .unwrap_or_else(|| ApiEndpoint::new(DEFAULT_API_NAME, DEFAULT_API_URL));
        ApiEndpoint::new(endpoint.name, endpoint.base_url)
    }

    pub fn java_for_instance(&self, game_dir: &Path) -> Option<&PathBuf> {
        self.instance_java.get(&game_dir.to_string_lossy().to_string())
    }
}

pub struct SettingsManager {
    settings: Settings,
    settings_path: PathBuf,
    dirty: bool,
}

impl SettingsManager {
    pub fn new(settings_path: PathBuf) -> Result<Self> {
        let mut manager = Self {
            settings: Settings::default(),
            settings_path,
            dirty: false,
        };

        manager.load()?;
        Ok(manager)
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        self.dirty = true;
        &mut self.settings
    }

    pub fn set_real_java_path(&mut self, path: PathBuf) {
        if self.settings.real_java_path.as_ref() != Some(&path) {
            self.settings.real_java_path = Some(path);
            self.dirty = true;
        }
    }

    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = self.settings_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&self.settings)?;

        std::fs::write(&self.settings_path, content)?;
        self.dirty = false;

        log::debug!("Settings saved to {:?}", self.settings_path);
        Ok(())
    }

    /// Loads settings from disk. A missing file is created with defaults; an
    /// unparsable one is backed up to `*.bak` and replaced by defaults in memory.
    pub fn load(&mut self) -> Result<()> {
        if !self.settings_path.exists() {
            self.dirty = true;
            return self.save();
        }

        let content = std::fs::read_to_string(&self.settings_path)?;

        match toml::from_str::<Settings>(&content) {
            Ok(settings) => {
                self.settings = settings;
                self.dirty = false;
                log::debug!("Settings loaded from {:?}", self.settings_path);
            }
            Err(e) => {
                log::warn!("Failed to parse settings {:?}: {}, using defaults", self.settings_path, e);
                let backup = self.settings_path.with_extension("toml.bak");
                if let Err(e) = std::fs::copy(&self.settings_path, &backup) {
                    log::warn!("Failed to back up broken settings: {}", e);
                }
                self.settings = Settings::default();
                self.dirty = false;
            }
        }
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn validate(&self) -> Result<()> {
        if self.settings.api_list.is_empty() {
            return Err(Error::Settings("API list cannot be empty".to_string()));
        }

        for api in &self.settings.api_list {
            let parsed = url::Url::parse(&api.base_url)?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::Settings(format!(
                    "API '{}' must use http or https, got {}",
                    api.name,
                    parsed.scheme()
                )));
            }
        }

        if self.settings.sniff_timeout_secs == 0 {
            return Err(Error::Settings("Sniff timeout cannot be 0".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let manager = SettingsManager::new(path.clone()).unwrap();

        assert!(path.exists());
        assert_eq!(manager.get().current_api().base_url, DEFAULT_API_URL);
        assert_eq!(manager.get().version_label, "YggdrasilProxy");
        assert!(manager.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            "current_api_index = 1\n\n[[api_list]]\nname = \"A\"\nbase_url = \"https://a.example/api/\"\n\n[[api_list]]\nname = \"B\"\nbase_url = \"https://b.example/api\"\n",
        )
        .unwrap();

        let manager = SettingsManager::new(path).unwrap();
        let api = manager.get().current_api();
        assert_eq!(api.name, "B");
        assert_eq!(api.base_url, "https://b.example/api");
        assert_eq!(manager.get().sniff_timeout_secs, 30);
    }

    #[test]
    fn test_out_of_range_index_falls_back_to_first() {
        let settings = Settings {
            api_list: vec![ApiEndpoint::new("A", "https://a.example/api/")],
            current_api_index: 7,
            ..Settings::default()
        };
        assert_eq!(settings.current_api().base_url, "https://a.example/api");
    }

    #[test]
    fn test_broken_file_is_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "api_list = 12 [[[").unwrap();

        let manager = SettingsManager::new(path.clone()).unwrap();
        assert!(dir.path().join("settings.toml.bak").exists());
        assert_eq!(manager.get().api_list, default_api_list());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = SettingsManager::new(dir.path().join("settings.toml")).unwrap();
        manager.get_mut().api_list = vec![ApiEndpoint::new("bad", "not a url")];
        assert!(manager.validate().is_err());

        manager.get_mut().api_list.clear();
        assert!(matches!(manager.validate(), Err(Error::Settings(_))));
    }

    #[test]
    fn test_set_real_java_path_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut manager = SettingsManager::new(path.clone()).unwrap();
        manager.set_real_java_path(PathBuf::from("/opt/jdk/bin/java"));
        assert!(manager.is_dirty());
        manager.save().unwrap();

        let reloaded = SettingsManager::new(path).unwrap();
        assert_eq!(reloaded.get().real_java_path, Some(PathBuf::from("/opt/jdk/bin/java")));
    }
}
