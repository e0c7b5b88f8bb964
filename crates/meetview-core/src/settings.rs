use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sdk::VideoQuality;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_true")]
    pub patch_js_media: bool,
    #[serde(default = "default_video_quality")]
    pub video_quality: VideoQuality,
    #[serde(default = "default_true")]
    pub mic_enabled_on_join: bool,
    #[serde(default = "default_true")]
    pub camera_enabled_on_join: bool,
    #[serde(default)]
    pub captions_on_join: bool,
    #[serde(default = "default_chat_interval")]
    pub chat_simulation_interval_ms: u64,
    #[serde(default = "default_exit_url")]
    pub exit_url: String,
    #[serde(default = "default_audio_workaround_timeout")]
    pub audio_workaround_timeout_ms: u64,
    #[serde(default = "default_max_captions")]
    pub max_captions: usize,
}

fn default_true() -> bool {
    true
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_region() -> String {
    "Global".to_string()
}

fn default_video_quality() -> VideoQuality {
    VideoQuality::Video360P
}

fn default_chat_interval() -> u64 {
    2_000
}

fn default_exit_url() -> String {
    "/".to_string()
}

fn default_audio_workaround_timeout() -> u64 {
    5_000
}

fn default_max_captions() -> usize {
    50
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            display_name: None,
            locale: default_locale(),
            region: default_region(),
            patch_js_media: true,
            video_quality: default_video_quality(),
            mic_enabled_on_join: true,
            camera_enabled_on_join: true,
            captions_on_join: false,
            chat_simulation_interval_ms: default_chat_interval(),
            exit_url: default_exit_url(),
            audio_workaround_timeout_ms: default_audio_workaround_timeout(),
            max_captions: default_max_captions(),
        }
    }
}

impl Settings {
    pub fn chat_simulation_interval(&self) -> Duration {
        Duration::from_millis(self.chat_simulation_interval_ms.max(1))
    }

    pub fn audio_workaround_timeout(&self) -> Duration {
        Duration::from_millis(self.audio_workaround_timeout_ms)
    }
}

pub struct SettingsStore {
    settings: Mutex<Settings>,
    file_path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: &str) -> Self {
        let file_path = PathBuf::from(data_dir).join("settings.json");
        let settings = Self::load(&file_path);
        Self {
            settings: Mutex::new(settings),
            file_path,
        }
    }

    pub fn get(&self) -> Settings {
        self.settings.lock().expect("settings lock poisoned").clone()
    }

    pub fn set_display_name(&self, name: Option<String>) {
        self.update(|s| s.display_name = name);
    }

    pub fn set_video_quality(&self, quality: VideoQuality) {
        self.update(|s| s.video_quality = quality);
    }

    pub fn set_mic_enabled_on_join(&self, enabled: bool) {
        self.update(|s| s.mic_enabled_on_join = enabled);
    }

    pub fn set_camera_enabled_on_join(&self, enabled: bool) {
        self.update(|s| s.camera_enabled_on_join = enabled);
    }

    pub fn set_captions_on_join(&self, enabled: bool) {
        self.update(|s| s.captions_on_join = enabled);
    }

    fn update(&self, apply: impl FnOnce(&mut Settings)) {
        {
            let mut settings = self.settings.lock().expect("settings lock poisoned");
            apply(&mut *settings);
        }
        self.save();
    }

    fn save(&self) {
        let settings = self.get();
        if let Some(parent) = self.file_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("cannot create settings dir {}: {e}", parent.display());
                return;
            }
        }
        match serde_json::to_string_pretty(&settings) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.file_path, json) {
                    tracing::warn!("cannot write {}: {e}", self.file_path.display());
                }
            }
            Err(e) => tracing::warn!("cannot serialize settings: {e}"),
        }
    }

    fn load(path: &Path) -> Settings {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable {}: {e}", path.display());
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }
}
