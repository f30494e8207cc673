use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::logger;
use crate::types::{AspectRatio, GenerationMode};

/// User settings, persisted as flat JSON. Missing keys fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mode: GenerationMode,
    pub aspect_ratio: AspectRatio,
    pub auto_download: bool,
    pub delay_seconds: u64,
    pub profile: HostProfile,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: GenerationMode::Image,
            aspect_ratio: AspectRatio::default(),
            auto_download: true,
            delay_seconds: 3,
            profile: HostProfile::default(),
        }
    }
}

impl Settings {
    /// Defaults when the file does not exist. Unreadable or invalid JSON is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Like `load`, but a broken file is moved aside to `<name>.bad` and
    /// defaults are used, so a later `save` cannot clobber hand edits.
    pub fn load_or_recover(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                logger::warn(&format!("{:#}, using defaults", e));
                let aside = backup_path(path);
                match std::fs::rename(path, &aside) {
                    Ok(()) => logger::warn(&format!("kept the old file as {}", aside.display())),
                    Err(e) => logger::error(&format!("moving {} aside: {}", path.display(), e)),
                }
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "settings.json".into());
    name.push(".bad");
    path.with_file_name(name)
}

/// Heuristics and selectors tied to the host page's current layout.
///
/// None of these are guaranteed by the host page; they are what it renders
/// today, kept here so a layout change is a settings edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostProfile {
    /// Substring every generated media URL contains.
    pub content_origin: String,
    /// Images at or below this width are thumbnails or avatars.
    pub min_image_width: u32,
    /// Videos at or below this size (both axes) are controls or hidden.
    pub min_video_size: u32,
    pub images_per_generation: usize,
    pub image_stable_checks: u32,
    pub video_stable_checks: u32,
    pub image_poll_ms: u64,
    pub video_poll_ms: u64,
    pub image_timeout_secs: u64,
    pub video_timeout_secs: u64,
    pub image_grace_ms: u64,
    pub video_grace_ms: u64,

    pub prompt_input_selectors: Vec<String>,
    pub submit_selectors: Vec<String>,
    pub submit_label_terms: Vec<String>,
    pub submit_attempts: u32,
    pub dropdown_selector: String,
    pub option_selector: String,
    pub image_mode_labels: Vec<String>,
    pub video_mode_labels: Vec<String>,

    pub download_folder: String,
    pub file_prefix: String,
}

impl Default for HostProfile {
    fn default() -> Self {
        let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            content_origin: "fbcdn.net".into(),
            min_image_width: 150,
            min_video_size: 100,
            images_per_generation: 4,
            image_stable_checks: 2,
            video_stable_checks: 3,
            image_poll_ms: 1500,
            video_poll_ms: 2000,
            image_timeout_secs: 120,
            video_timeout_secs: 180,
            image_grace_ms: 500,
            video_grace_ms: 2000,

            prompt_input_selectors: strings(&[
                r#"div[role="textbox"][contenteditable="true"]"#,
                r#"div[aria-label="Message Meta AI"]"#,
                r#"div[aria-label="Message"]"#,
                "textarea",
                r#"input[type="text"]"#,
            ]),
            submit_selectors: strings(&[
                r#"button[aria-label="Send"]"#,
                r#"button[aria-label="ส่ง"]"#,
                r#"button[type="submit"]"#,
            ]),
            submit_label_terms: strings(&["send", "ส่ง", "submit", "generate"]),
            submit_attempts: 5,
            dropdown_selector: r#"button[role="combobox"]"#.into(),
            option_selector: r#"div[role="option"], div[role="menuitem"]"#.into(),
            image_mode_labels: strings(&["image", "รูปภาพ"]),
            video_mode_labels: strings(&["video", "วิดีโอ"]),

            download_folder: "Meta AI".into(),
            file_prefix: "meta-ai".into(),
        }
    }
}

impl HostProfile {
    pub fn poll_interval(&self, mode: GenerationMode) -> Duration {
        match mode {
            GenerationMode::Image => Duration::from_millis(self.image_poll_ms),
            GenerationMode::Video => Duration::from_millis(self.video_poll_ms),
        }
    }

    pub fn timeout(&self, mode: GenerationMode) -> Duration {
        match mode {
            GenerationMode::Image => Duration::from_secs(self.image_timeout_secs),
            GenerationMode::Video => Duration::from_secs(self.video_timeout_secs),
        }
    }

    pub fn stable_checks(&self, mode: GenerationMode) -> u32 {
        match mode {
            GenerationMode::Image => self.image_stable_checks,
            GenerationMode::Video => self.video_stable_checks,
        }
    }

    pub fn grace(&self, mode: GenerationMode) -> Duration {
        match mode {
            GenerationMode::Image => Duration::from_millis(self.image_grace_ms),
            GenerationMode::Video => Duration::from_millis(self.video_grace_ms),
        }
    }

    pub fn mode_labels(&self, mode: GenerationMode) -> &[String] {
        match mode {
            GenerationMode::Image => &self.image_mode_labels,
            GenerationMode::Video => &self.video_mode_labels,
        }
    }
}
