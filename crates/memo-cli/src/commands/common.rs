use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use memo_core::config::ClientConfig;
use memo_core::events::ChangeFeed;
use memo_core::remote::RemoteProvider;
use memo_core::store::{LocalStore, NoteStore, SettingsStore};
use memo_core::sync::{Reconciler, SyncReport};
use memo_core::{Note, NoteId};
use serde::Serialize;

use crate::error::CliError;

/// Loaded config plus the opened local store.
pub struct Session {
    pub config: ClientConfig,
    pub store: LocalStore,
    pub changes: Arc<ChangeFeed>,
}

impl Session {
    pub fn open(config_path: Option<&Path>, db_path: Option<PathBuf>) -> Result<Self, CliError> {
        let config = load_config(config_path)?;
        let path = match db_path {
            Some(path) => path,
            None => config.resolved_db_path()?,
        };
        tracing::debug!("Opening local store at {}", path.display());
        Ok(Self {
            store: LocalStore::open(&path)?,
            config,
            changes: ChangeFeed::new(),
        })
    }

    pub fn notes(&self) -> NoteStore {
        NoteStore::new(self.store.clone(), Arc::clone(&self.changes))
    }

    pub fn settings(&self) -> SettingsStore {
        SettingsStore::new(self.store.clone(), Arc::clone(&self.changes))
    }

    /// Build the sync engine over every configured provider.
    pub fn reconciler(&self) -> Result<Reconciler<RemoteProvider>, CliError> {
        let remotes = RemoteProvider::all_configured(&self.config)?;
        if remotes.is_empty() {
            return Err(CliError::SyncNotConfigured);
        }
        let reconciler = Reconciler::new(
            self.store.clone(),
            Arc::clone(&self.changes),
            remotes,
            self.config.provider,
        )?;
        reconciler.set_authenticated(self.config.is_authenticated());
        if self.config.cloud_sync_enabled && !reconciler.is_sync_enabled() {
            reconciler.set_sync_enabled(true)?;
        }
        Ok(reconciler)
    }
}

pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf, CliError> {
    explicit
        .map(Path::to_path_buf)
        .or_else(ClientConfig::default_path)
        .ok_or_else(|| CliError::Config("could not determine a config directory".to_string()))
}

pub fn load_config(explicit: Option<&Path>) -> Result<ClientConfig, CliError> {
    let path = config_path(explicit)?;
    Ok(ClientConfig::load_from(&path)?.with_env_overrides()?)
}

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub preview: String,
    pub content: String,
    pub pinned: bool,
    pub is_public: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
    pub tags: Vec<String>,
    pub backlinks: Vec<String>,
}

/// Resolve a full id or a unique id prefix against both lists.
pub fn resolve_note(query: &str, notes: &NoteStore) -> Result<Note, CliError> {
    if let Some(note) = notes.get(&NoteId::from(query))? {
        return Ok(note);
    }

    let matching = notes.find_by_prefix(query)?;
    match matching.as_slice() {
        [] => Err(CliError::NoteNotFound(query.to_string())),
        [note] => Ok(note.clone()),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|note| short_id(&note.id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &NoteId) -> String {
    id.as_str().chars().take(13).collect()
}

pub fn format_note_lines(notes: &[Note], pinned: &[NoteId]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let marker = if pinned.contains(&note.id) { '*' } else { ' ' };
            let short_id = short_id(&note.id);
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.updated_at.timestamp_millis(), now_ms);
            let tags = render_tags(note);

            if tags.is_empty() {
                format!("{marker}{short_id:<13}  {preview:<40}  {relative_time}")
            } else {
                format!("{marker}{short_id:<13}  {preview:<40}  {relative_time:<10}  {tags}")
            }
        })
        .collect()
}

pub fn note_to_list_item(note: &Note, pinned: bool) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();
    let mut tags = note.tags.clone();
    tags.sort();

    NoteListItem {
        id: note.id.to_string(),
        preview: note_preview(note, 80),
        content: note.content.clone(),
        pinned,
        is_public: note.is_public,
        created_at: note.created_at.timestamp_millis(),
        updated_at: note.updated_at.timestamp_millis(),
        relative_time: format_relative_time(note.updated_at.timestamp_millis(), now_ms),
        tags,
        backlinks: note.backlinks.iter().map(ToString::to_string).collect(),
    }
}

pub fn note_preview(note: &Note, max_chars: usize) -> String {
    let first_line = note.content.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn render_tags(note: &Note) -> String {
    let mut tags = note.tags.clone();
    tags.sort();
    tags.into_iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    if report.coalesced {
        return vec![format!(
            "A sync with {} is already running; queued one more pass",
            report.provider
        )];
    }

    let mut lines = vec![format!(
        "Synced with {}: pulled {} ({}), {} memos after merge",
        report.provider,
        report.pulled,
        pull_source_label(report),
        report.merged
    )];
    lines.push(format!(
        "  added {}, updated {}, dropped {}",
        report.added, report.updated, report.dropped
    ));
    lines.push(format!(
        "  pushed {} ({} failed), deletes {} ({} failed), settings {}",
        report.pushed,
        report.push_failures,
        report.deletes_propagated,
        report.deletes_failed,
        if report.settings_pushed { "pushed" } else { "not pushed" }
    ));
    if report.chained > 0 {
        lines.push(format!("  chained passes: {}", report.chained));
    }
    if let Some(warning) = &report.warning {
        lines.push(format!("  warning: {warning}"));
    }
    lines
}

fn pull_source_label(report: &SyncReport) -> &'static str {
    match report.pull_source {
        memo_core::sync::PullSource::Primary => "primary",
        memo_core::sync::PullSource::Secondary => "legacy route",
        memo_core::sync::PullSource::Unavailable => "remote unreachable",
    }
}

pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input() -> Result<Option<String>, CliError> {
    capture_editor_input_with_initial("")
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("memo-note-{}-{now}.md", std::process::id()))
}
