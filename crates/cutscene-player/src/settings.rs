use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::session::DEFAULT_VOLUME;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSettings {
    pub version: u32,
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default)]
    pub filter_strength: usize,
    /// Language of the audio track; `None` uses the video language.
    #[serde(default)]
    pub audio_language: Option<String>,
    #[serde(default)]
    pub resource_root: Option<PathBuf>,
}

fn default_volume() -> u8 {
    DEFAULT_VOLUME
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            version: 1,
            volume: DEFAULT_VOLUME,
            filter_strength: 0,
            audio_language: None,
            resource_root: None,
        }
    }
}

impl PlayerSettings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cutscene-player").join("settings.json"))
    }

    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<Self>(&json) {
                Ok(mut settings) => {
                    settings.volume = settings.volume.min(100);
                    log::debug!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = Self::config_path() else {
            anyhow::bail!("no config directory on this platform");
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::debug!("Saved settings to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = PlayerSettings::default();
        assert_eq!(s.version, 1);
        assert_eq!(s.volume, 100);
        assert_eq!(s.filter_strength, 0);
        assert!(s.audio_language.is_none());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = PlayerSettings {
            volume: 40,
            filter_strength: 3,
            audio_language: Some("hu".into()),
            resource_root: Some(PathBuf::from("/data/video")),
            ..PlayerSettings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(PlayerSettings::load_from(&path), settings);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"version": 1, "filter_strength": 5}"#).unwrap();
        let loaded = PlayerSettings::load_from(&path);
        assert_eq!(loaded.volume, 100);
        assert_eq!(loaded.filter_strength, 5);
    }

    #[test]
    fn malformed_or_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert_eq!(PlayerSettings::load_from(&path), PlayerSettings::default());
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(PlayerSettings::load_from(&path), PlayerSettings::default());
    }

    #[test]
    fn volume_above_hundred_is_clamped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"version": 1, "volume": 200}"#).unwrap();
        assert_eq!(PlayerSettings::load_from(&path).volume, 100);
    }
}
