use crate::commands::common::{normalize_note_identifier, resolve_note, Session};
use crate::error::CliError;

pub fn run_delete(session: &Session, id: &str) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let store = session.notes();
    let note = resolve_note(&normalized_id, &store)?;

    store.delete(&note.id)?;
    println!("{}", note.id);
    Ok(())
}
