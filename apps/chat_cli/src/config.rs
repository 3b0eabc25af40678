use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use reply_format::DEFAULT_FENCE_KEYWORDS;
use serde::Deserialize;
use shared::domain::SenderId;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "chat.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub endpoint_url: String,
    pub sender_id: SenderId,
    pub request_timeout_secs: u64,
    pub fence_keywords: Vec<String>,
    pub dictation_command: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:5005/webhooks/rest/webhook".into(),
            sender_id: SenderId::generate(),
            request_timeout_secs: 30,
            fence_keywords: DEFAULT_FENCE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            dictation_command: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    endpoint_url: Option<String>,
    sender_id: Option<String>,
    request_timeout_secs: Option<u64>,
    fence_keywords: Option<Vec<String>>,
    dictation_command: Option<String>,
}

/// Defaults, then the TOML file, then environment variables.
///
/// An explicit `path` must exist; the default `chat.toml` is optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(&path) {
        Ok(raw) => {
            let file_cfg: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
            apply_file(&mut settings, file_cfg);
        }
        Err(err) if required || err.kind() != std::io::ErrorKind::NotFound => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()));
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.endpoint_url {
        settings.endpoint_url = v;
    }
    if let Some(v) = file_cfg.sender_id {
        settings.sender_id = SenderId(v);
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.fence_keywords {
        settings.fence_keywords = v;
    }
    if let Some(v) = file_cfg.dictation_command {
        settings.dictation_command = Some(v);
    }
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("CHAT_ENDPOINT_URL") {
        settings.endpoint_url = v;
    }
    if let Some(v) = lookup("APP__ENDPOINT_URL") {
        settings.endpoint_url = v;
    }

    if let Some(v) = lookup("CHAT_SENDER_ID") {
        settings.sender_id = SenderId(v);
    }
    if let Some(v) = lookup("APP__SENDER_ID") {
        settings.sender_id = SenderId(v);
    }

    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    if let Some(v) = lookup("APP__FENCE_KEYWORDS") {
        settings.fence_keywords = v
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
    }

    if let Some(v) = lookup("APP__DICTATION_COMMAND") {
        settings.dictation_command = (!v.trim().is_empty()).then_some(v);
    }
}

pub fn validate_endpoint(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid endpoint url '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("endpoint url '{raw}' must use http or https");
    }
    Ok(url)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
