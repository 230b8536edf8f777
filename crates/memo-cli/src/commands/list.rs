use memo_core::NoteId;

use crate::commands::common::{
    format_note_lines, normalize_note_identifier, note_to_list_item, resolve_note, NoteListItem,
    Session,
};
use crate::error::CliError;

pub fn run_list(
    session: &Session,
    limit: usize,
    tag: Option<&str>,
    as_json: bool,
) -> Result<(), CliError> {
    let store = session.notes();
    let pinned: Vec<NoteId> = store.pinned()?.into_iter().map(|note| note.id).collect();
    let tag = tag.map(|tag| tag.trim_start_matches('#').to_lowercase());
    let notes = store
        .list()?
        .into_iter()
        .filter(|note| tag.as_ref().is_none_or(|tag| note.tags.contains(tag)))
        .take(limit)
        .collect::<Vec<_>>();

    if as_json {
        let json_items = notes
            .iter()
            .map(|note| note_to_list_item(note, pinned.contains(&note.id)))
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_note_lines(&notes, &pinned) {
            println!("{line}");
        }
    }

    Ok(())
}

pub fn run_show(session: &Session, id: &str, as_json: bool) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let store = session.notes();
    let note = resolve_note(&normalized_id, &store)?;
    let pinned = store.pinned()?.iter().any(|entry| entry.id == note.id);

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&note_to_list_item(&note, pinned))?
        );
        return Ok(());
    }

    println!("{}", note.content);
    for link in &note.backlinks {
        println!("-> {link}");
    }
    for clip in &note.audio_clips {
        let location = clip.url.as_deref().or(clip.id.as_deref()).unwrap_or("(local)");
        match clip.duration_ms {
            Some(duration_ms) => println!("[audio {duration_ms} ms] {location}"),
            None => println!("[audio] {location}"),
        }
    }
    Ok(())
}
