use std::path::PathBuf;

use memo_core::config::{ClientConfig, ProviderKind};
use memo_core::models::BackgroundConfig;
use memo_core::store::{NoteDraft, TombstoneTracker};
use memo_core::sync::{PullSource, SyncReport};
use tempfile::TempDir;

use crate::cli::{SettingsCommands, Visibility};
use crate::commands::add::run_add;
use crate::commands::common::{
    default_editor, format_note_lines, format_relative_time, format_sync_report,
    format_sync_timestamp, normalize_content, normalize_note_identifier, note_preview,
    note_to_list_item, resolve_note, Session,
};
use crate::commands::config::{apply_config_init, missing_provider_fields, ConfigInit};
use crate::commands::delete::run_delete;
use crate::commands::organize::{run_pin, run_visibility};
use crate::commands::provider::{format_provider_lines, ProviderStatusItem};
use crate::commands::settings::{describe_image, image_data_uri, normalize_hex_color, run_settings};
use crate::commands::sync::run_sync;
use crate::error::CliError;

fn test_session() -> (TempDir, Session) {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("client-config.json");
    let db_path = dir.path().join("memo.db");
    let session = Session::open(Some(config_path.as_path()), Some(db_path)).unwrap();
    (dir, session)
}

fn common_prefix(a: &str, b: &str) -> String {
    a.chars()
        .zip(b.chars())
        .take_while(|(left, right)| left == right)
        .map(|(ch, _)| ch)
        .collect()
}

#[test]
fn normalize_content_trims_and_rejects_empty() {
    assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
    assert_eq!(normalize_content(" \n\t "), None);
}

#[test]
fn normalize_content_keeps_multiline_text() {
    assert_eq!(
        normalize_content("line 1\nline 2\n"),
        Some("line 1\nline 2".to_string())
    );
}

#[test]
fn default_editor_is_defined() {
    assert!(!default_editor().is_empty());
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}

#[test]
fn note_preview_truncates_with_ellipsis() {
    let note = memo_core::Note::new("This is a very long sentence that should be shortened");
    let preview = note_preview(&note, 20);
    assert_eq!(preview, "This is a very lo...");
}

#[test]
fn format_sync_timestamp_returns_utc_label() {
    assert_eq!(format_sync_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn normalize_note_identifier_rejects_empty() {
    assert!(matches!(
        normalize_note_identifier(" \n "),
        Err(CliError::EmptyNoteId)
    ));
    assert_eq!(
        normalize_note_identifier("  abc123  ").unwrap(),
        "abc123".to_string()
    );
}

#[test]
fn resolve_note_supports_exact_and_prefix_id() {
    let (_dir, session) = test_session();
    let store = session.notes();
    let note = store.create("Note A", NoteDraft::default()).unwrap();

    let exact = resolve_note(note.id.as_str(), &store).unwrap();
    assert_eq!(exact.id, note.id);

    let by_prefix = resolve_note(&note.id.as_str()[..13], &store).unwrap();
    assert_eq!(by_prefix.id, note.id);
}

#[test]
fn resolve_note_rejects_ambiguous_prefix() {
    let (_dir, session) = test_session();
    let store = session.notes();
    let first = store.create("Note A", NoteDraft::default()).unwrap();
    let second = store.create("Note B", NoteDraft::default()).unwrap();
    let prefix = common_prefix(first.id.as_str(), second.id.as_str());
    assert!(!prefix.is_empty());

    let error = resolve_note(&prefix, &store).unwrap_err();
    assert!(matches!(error, CliError::AmbiguousNoteId(_)));
}

#[test]
fn resolve_note_rejects_missing_note() {
    let (_dir, session) = test_session();
    let store = session.notes();
    store.create("Note A", NoteDraft::default()).unwrap();

    let error = resolve_note("zzzz", &store).unwrap_err();
    assert!(matches!(error, CliError::NoteNotFound(id) if id == "zzzz"));
}

#[test]
fn run_add_stores_tags_and_visibility() {
    let (_dir, session) = test_session();
    run_add(
        &session,
        &["Groceries".to_string(), "#errands".to_string()],
        vec!["home".to_string()],
        true,
    )
    .unwrap();

    let notes = session.notes().notes().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].content, "Groceries #errands");
    assert_eq!(notes[0].tags, vec!["errands", "home"]);
    assert!(notes[0].is_public);
}

#[test]
fn run_delete_removes_note_and_records_tombstone() {
    let (_dir, session) = test_session();
    let store = session.notes();
    let keep = store.create("keep me", NoteDraft::default()).unwrap();
    let doomed = store.create("delete me", NoteDraft::default()).unwrap();

    run_delete(&session, doomed.id.as_str()).unwrap();

    let remaining = store.notes().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, keep.id);
    let tombstones = TombstoneTracker::new(session.store.clone()).ids().unwrap();
    assert!(tombstones.contains(&doomed.id));
}

#[test]
fn pin_and_visibility_commands_update_store() {
    let (_dir, session) = test_session();
    let store = session.notes();
    let note = store.create("pin me", NoteDraft::default()).unwrap();

    run_pin(&session, note.id.as_str(), true).unwrap();
    assert_eq!(store.pinned().unwrap().len(), 1);
    assert!(store.notes().unwrap().is_empty());

    run_visibility(&session, note.id.as_str(), Visibility::Public).unwrap();
    assert!(store.get(&note.id).unwrap().unwrap().is_public);

    run_pin(&session, note.id.as_str(), false).unwrap();
    assert!(store.pinned().unwrap().is_empty());
    assert_eq!(store.notes().unwrap().len(), 1);
}

#[test]
fn note_lines_mark_pinned_entries() {
    let note = memo_core::Note::new("Pinned thought #idea");
    let lines = format_note_lines(std::slice::from_ref(&note), std::slice::from_ref(&note.id));
    assert!(lines[0].starts_with('*'));
    assert!(lines[0].contains("#idea"));

    let item = note_to_list_item(&note, true);
    assert!(item.pinned);
    assert_eq!(item.tags, vec!["idea"]);
}

#[tokio::test(flavor = "current_thread")]
async fn run_sync_requires_sync_configuration() {
    let (_dir, session) = test_session();
    let error = run_sync(&session, false).await.unwrap_err();
    assert!(matches!(error, CliError::SyncNotConfigured));
}

#[test]
fn sync_report_lines_cover_failures_and_fallback() {
    let mut report = SyncReport::new(ProviderKind::D1);
    report.pulled = 4;
    report.pull_source = PullSource::Secondary;
    report.push_failures = 1;
    report.warning = Some("quota".to_string());

    let lines = format_sync_report(&report);
    assert!(lines[0].contains("legacy route"));
    assert!(lines[2].contains("(1 failed)"));
    assert!(lines.last().unwrap().contains("quota"));

    let coalesced = format_sync_report(&SyncReport::coalesced(ProviderKind::Supabase));
    assert_eq!(coalesced.len(), 1);
    assert!(coalesced[0].contains("already running"));
}

#[test]
fn config_init_normalizes_and_validates_urls() {
    let config = apply_config_init(
        ClientConfig::default(),
        ConfigInit {
            provider: Some(ProviderKind::Supabase),
            supabase_url: Some(" https://project.supabase.co/ ".to_string()),
            ..ConfigInit::default()
        },
    )
    .unwrap();
    assert_eq!(config.provider, ProviderKind::Supabase);
    assert_eq!(config.supabase.url.as_deref(), Some("https://project.supabase.co"));
    assert_eq!(
        missing_provider_fields(&config, ProviderKind::Supabase),
        vec!["supabase_anon_key"]
    );

    let invalid = apply_config_init(
        ClientConfig::default(),
        ConfigInit {
            d1_url: Some("memo.example.com".to_string()),
            ..ConfigInit::default()
        },
    );
    assert!(invalid.is_err());
}

#[test]
fn provider_lines_mark_active_and_state() {
    let items = vec![
        ProviderStatusItem {
            provider: ProviderKind::D1,
            endpoint: Some("https://memo.example.com".to_string()),
            configured: true,
            active: true,
            healthy: false,
            last_sync_at: 0,
        },
        ProviderStatusItem {
            provider: ProviderKind::Supabase,
            endpoint: None,
            configured: false,
            active: false,
            healthy: false,
            last_sync_at: 0,
        },
    ];

    let lines = format_provider_lines(&items);
    assert!(lines[0].starts_with("*d1"));
    assert!(lines[0].contains("unreachable"));
    assert!(lines[0].contains("never synced"));
    assert!(lines[1].contains("not configured"));
}

#[test]
fn hex_colors_are_normalized() {
    assert_eq!(normalize_hex_color("818cf8").unwrap(), "#818CF8");
    assert_eq!(normalize_hex_color(" #abc ").unwrap(), "#ABC");
    assert!(normalize_hex_color("#12345").is_err());
    assert!(normalize_hex_color("purple").is_err());
}

#[test]
fn image_files_become_data_uris() {
    let dir = TempDir::new().unwrap();
    let image = dir.path().join("bg.png");
    std::fs::write(&image, [0x89, b'P', b'N', b'G']).unwrap();
    assert_eq!(image_data_uri(&image).unwrap(), "data:image/png;base64,iVBORw==");

    let text = dir.path().join("notes.txt");
    std::fs::write(&text, "hello").unwrap();
    assert!(image_data_uri(&text).is_err());
}

#[test]
fn describe_image_summarizes_inline_data() {
    assert_eq!(describe_image(""), "(none)");
    assert_eq!(
        describe_image("data:image/png;base64,AAAA"),
        "inline image/png, 26 chars"
    );
    assert_eq!(describe_image("https://img.example.com/a.jpg"), "https://img.example.com/a.jpg");
}

#[test]
fn large_background_image_is_stored_out_of_line() {
    let (dir, session) = test_session();
    let image: PathBuf = dir.path().join("large.png");
    std::fs::write(&image, vec![7_u8; 90_000]).unwrap();

    run_settings(
        &session,
        SettingsCommands::Background {
            url: None,
            image: Some(image),
            brightness: Some(70),
            blur: None,
            random: None,
        },
    )
    .unwrap();

    let settings = session.settings();
    let stored: BackgroundConfig = settings.load().unwrap();
    assert!(stored.image_url.is_empty());
    assert!(stored.image_ref.is_some());
    assert_eq!(stored.brightness, 70);

    let recovered = settings.load_background().unwrap();
    assert!(recovered.image_url.starts_with("data:image/png;base64,"));
}
