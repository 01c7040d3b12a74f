#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use crate::platform::ytdlp::DEFAULT_PROGRAM;
use crate::sync::{Stage, SyncOptions};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DATABASE_PATH: &str = "youtube_data.db";
pub const DEFAULT_LANGUAGE: &str = "pt";
pub const DEFAULT_TRANSCRIPTION_DIR: &str = "transcriptions";
/// Chat replays land in this subdirectory of the transcription directory.
pub const LIVE_CHAT_SUBDIR: &str = "live_chat";

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub api_keys: Vec<String>,
    pub channel_url: Option<String>,
    pub database_path: PathBuf,
    pub since: Option<String>,
    pub language: String,
    pub transcription_dir: PathBuf,
    pub max_chat_messages: Option<usize>,
    pub yt_dlp_path: PathBuf,
}

impl SyncSettings {
    pub fn chat_dir(&self) -> PathBuf {
        self.transcription_dir.join(LIVE_CHAT_SUBDIR)
    }

    pub fn require_api_keys(&self) -> Result<Vec<String>> {
        if self.api_keys.is_empty() {
            return Err(anyhow!("YOUTUBE_API_KEYS not set"));
        }
        Ok(self.api_keys.clone())
    }

    /// Run options for the sync pipeline; fails when no channel is configured.
    pub fn sync_options(&self, skip: Vec<Stage>) -> Result<SyncOptions> {
        let channel_url = self
            .channel_url
            .clone()
            .ok_or_else(|| anyhow!("CHANNEL_URL not set"))?;
        Ok(SyncOptions {
            since: self.since.clone(),
            language: self.language.clone(),
            transcription_dir: self.transcription_dir.clone(),
            max_chat_messages: self.max_chat_messages,
            skip,
            ..SyncOptions::new(channel_url)
        })
    }
}

/// Values given on the command line; they win over every other source.
#[derive(Debug, Clone, Default)]
pub struct SyncOverrides {
    pub channel_url: Option<String>,
    pub since: Option<String>,
    pub language: Option<String>,
    pub database_path: Option<PathBuf>,
    pub transcription_dir: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: SyncOverrides) -> Result<SyncSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_settings_with_overrides(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<SyncSettings> {
    build_settings_with_overrides(file_vars, env_lookup, SyncOverrides::default())
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SyncOverrides,
) -> Result<SyncSettings> {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);
    let path_override = |path: Option<PathBuf>| {
        path.map(|path| path.to_string_lossy().into_owned())
            .and_then(non_blank)
    };

    let api_keys = lookup("YOUTUBE_API_KEYS")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let channel_url = overrides
        .channel_url
        .and_then(non_blank)
        .or_else(|| lookup("CHANNEL_URL"));
    let database_path = path_override(overrides.database_path)
        .or_else(|| lookup("DATABASE_PATH"))
        .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());
    let since = overrides
        .since
        .and_then(non_blank)
        .or_else(|| lookup("SYNC_SINCE"));
    let language = overrides
        .language
        .and_then(non_blank)
        .or_else(|| lookup("TRANSCRIPTION_LANGUAGE"))
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
    let transcription_dir = path_override(overrides.transcription_dir)
        .or_else(|| lookup("TRANSCRIPTION_DIR"))
        .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_DIR.to_string());
    let max_chat_messages =
        lookup("MAX_CHAT_MESSAGES").and_then(|value| value.parse::<usize>().ok());
    let yt_dlp_path = lookup("YT_DLP_PATH").unwrap_or_else(|| DEFAULT_PROGRAM.to_string());

    Ok(SyncSettings {
        api_keys,
        channel_url,
        database_path: PathBuf::from(database_path),
        since,
        language,
        transcription_dir: PathBuf::from(transcription_dir),
        max_chat_messages,
        yt_dlp_path: PathBuf::from(yt_dlp_path),
    })
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(non_blank)
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned().and_then(non_blank))
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
