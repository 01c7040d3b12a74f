#![forbid(unsafe_code)]

//! Thin wrapper over the `yt-dlp` executable for subtitle tracks and live-chat
//! replays.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use parking_lot::Mutex;

use super::live_chat::parse_line;
use super::{ChatKind, PlatformError, RecordStream};
use crate::model::ChatMessage;

pub const DEFAULT_PROGRAM: &str = "yt-dlp";

fn video_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

pub struct YtDlp {
    program: PathBuf,
    chat_dir: PathBuf,
    /// Videos whose replay file was downloaded during this run; both chat
    /// stream types read the same file.
    fetched_chats: Mutex<HashSet<String>>,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>, chat_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            chat_dir: chat_dir.into(),
            fetched_chats: Mutex::new(HashSet::new()),
        }
    }

    /// Runs `<program> --version` and only returns a handle when it succeeds.
    pub fn locate(program: impl Into<PathBuf>, chat_dir: impl Into<PathBuf>) -> Option<Self> {
        let ytdlp = Self::new(program, chat_dir);
        let status = Command::new(&ytdlp.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Some(ytdlp),
            Ok(status) => {
                tracing::warn!(program = %ytdlp.program.display(), %status, "yt-dlp returned a failure status");
                None
            }
            Err(err) => {
                tracing::warn!(program = %ytdlp.program.display(), error = %err, "yt-dlp is not installed or not in PATH");
                None
            }
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg("--no-progress")
            .arg("--force-overwrites")
            .stdout(Stdio::null());
        command
    }

    fn run(&self, mut command: Command, video_id: &str) -> Result<(), PlatformError> {
        match command.status() {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(PlatformError::ToolFailed {
                tool: "yt-dlp",
                status: status.to_string(),
                target: video_id.to_owned(),
            }),
            Err(source) => Err(PlatformError::Io {
                context: format!("running {}", self.program.display()),
                source,
            }),
        }
    }

    /// Downloads the manual or automatic track for `language` as WebVTT into
    /// `output_dir/<video_id>.<language>.vtt`.
    pub fn download_subtitles(
        &self,
        video_id: &str,
        language: &str,
        output_dir: &Path,
    ) -> Result<PathBuf, PlatformError> {
        fs::create_dir_all(output_dir).map_err(|source| PlatformError::Io {
            context: format!("creating {}", output_dir.display()),
            source,
        })?;

        // Leftover files from an earlier run must not pass for this run's track.
        for stale in track_candidates(output_dir, video_id, language) {
            fs::remove_file(&stale).map_err(|source| PlatformError::Io {
                context: format!("removing stale {}", stale.display()),
                source,
            })?;
        }

        let mut command = self.command();
        command
            .arg("--write-subs")
            .arg("--write-auto-subs")
            .arg("--sub-langs")
            .arg(language)
            .arg("--sub-format")
            .arg("vtt")
            .arg("--output")
            .arg(output_dir.join(video_id))
            .arg(video_url(video_id));
        self.run(command, video_id)?;

        let expected = output_dir.join(format!("{video_id}.{language}.vtt"));
        if expected.exists() {
            return Ok(expected);
        }
        track_candidates(output_dir, video_id, language)
            .into_iter()
            .next()
            .ok_or_else(|| PlatformError::TrackUnavailable {
                video_id: video_id.to_owned(),
                language: language.to_owned(),
            })
    }

    fn replay_path(&self, video_id: &str) -> PathBuf {
        self.chat_dir.join(format!("{video_id}.live_chat.json"))
    }

    /// Downloads the replay once per video and run.
    fn ensure_replay(&self, video_id: &str) -> Result<PathBuf, PlatformError> {
        let path = self.replay_path(video_id);
        if self.fetched_chats.lock().contains(video_id) {
            return Ok(path);
        }

        fs::create_dir_all(&self.chat_dir).map_err(|source| PlatformError::Io {
            context: format!("creating {}", self.chat_dir.display()),
            source,
        })?;
        if path.exists() {
            fs::remove_file(&path).map_err(|source| PlatformError::Io {
                context: format!("removing stale {}", path.display()),
                source,
            })?;
        }

        let mut command = self.command();
        command
            .arg("--write-subs")
            .arg("--sub-langs")
            .arg("live_chat")
            .arg("--output")
            .arg(self.chat_dir.join(video_id))
            .arg(video_url(video_id));
        self.run(command, video_id)?;

        self.fetched_chats.lock().insert(video_id.to_owned());
        Ok(path)
    }

    /// Streams the replay entries of one kind. Videos that never had a live
    /// chat yield an empty sequence.
    pub fn chat_messages<'a>(
        &'a self,
        video_id: &str,
        kind: ChatKind,
    ) -> Result<RecordStream<'a, ChatMessage>, PlatformError> {
        let path = self.ensure_replay(video_id)?;
        if !path.exists() {
            tracing::debug!(video_id, "no live chat replay");
            return Ok(Box::new(std::iter::empty()));
        }

        let file = File::open(&path).map_err(|source| PlatformError::Io {
            context: format!("opening {}", path.display()),
            source,
        })?;
        let context = format!("reading {}", path.display());
        let lines = BufReader::new(file).lines();
        Ok(Box::new(lines.flat_map(move |line| match line {
            Ok(line) => parse_line(&line)
                .into_iter()
                .filter(|(entry_kind, _)| *entry_kind == kind)
                .map(|(_, message)| Ok(message))
                .collect::<Vec<_>>(),
            Err(source) => vec![Err(PlatformError::Io {
                context: context.clone(),
                source,
            })],
        })))
    }
}

/// Tracks yt-dlp may have written for `language`: the exact code or a
/// regional variant (`pt-BR`), as VTT or SRT. WebVTT files rank first.
fn track_candidates(dir: &Path, video_id: &str, language: &str) -> Vec<PathBuf> {
    let prefix = format!("{video_id}.{language}");
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let Some(rest) = name.strip_prefix(&prefix) else {
                return false;
            };
            (rest.starts_with('.') || rest.starts_with('-'))
                && (rest.ends_with(".vtt") || rest.ends_with(".srt"))
        })
        .collect();
    candidates.sort_by_key(|path| {
        let is_vtt = path.extension().is_some_and(|ext| ext == "vtt");
        (!is_vtt, path.clone())
    });
    candidates
}
