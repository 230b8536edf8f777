use chrono::Utc;
use memo_core::models::AudioClip;
use memo_core::util::is_http_url;

use crate::cli::Visibility;
use crate::commands::common::{normalize_note_identifier, resolve_note, Session};
use crate::error::CliError;

pub fn run_pin(session: &Session, id: &str, pin: bool) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let store = session.notes();
    let note = resolve_note(&normalized_id, &store)?;

    let note = if pin {
        store.pin(&note.id)?
    } else {
        store.unpin(&note.id)?
    };
    println!("{}", note.id);
    Ok(())
}

pub fn run_visibility(session: &Session, id: &str, visibility: Visibility) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let store = session.notes();
    let note = resolve_note(&normalized_id, &store)?;

    let note = store.set_public(&note.id, visibility == Visibility::Public)?;
    println!("{}", note.id);
    Ok(())
}

pub fn run_link(session: &Session, id: &str, target: &str, remove: bool) -> Result<(), CliError> {
    let store = session.notes();
    let note = resolve_note(&normalize_note_identifier(id)?, &store)?;
    let target = resolve_note(&normalize_note_identifier(target)?, &store)?;

    let note = if remove {
        store.remove_backlink(&note.id, &target.id)?
    } else {
        store.add_backlink(&note.id, &target.id)?
    };
    println!("{}", note.id);
    Ok(())
}

pub fn run_attach(
    session: &Session,
    id: &str,
    url: &str,
    duration_ms: Option<u64>,
) -> Result<(), CliError> {
    let url = url.trim();
    if !is_http_url(url) {
        return Err(CliError::Config(
            "audio clip URL must include http:// or https://".to_string(),
        ));
    }
    let store = session.notes();
    let note = resolve_note(&normalize_note_identifier(id)?, &store)?;

    let clip = AudioClip {
        url: Some(url.to_string()),
        storage_type: Some("s3".to_string()),
        duration_ms,
        created_at: Some(Utc::now()),
        ..AudioClip::default()
    };
    let note = store.add_audio_clip(&note.id, clip)?;
    println!("{}", note.id);
    Ok(())
}
