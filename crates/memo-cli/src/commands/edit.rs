use crate::commands::common::{
    capture_editor_input_with_initial, normalize_note_identifier, resolve_note, Session,
};
use crate::error::CliError;

pub fn run_edit(session: &Session, id: &str) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let store = session.notes();
    let note = resolve_note(&normalized_id, &store)?;

    let Some(edited_content) = capture_editor_input_with_initial(&note.content)? else {
        return Err(CliError::EmptyEditedContent);
    };

    if edited_content == note.content {
        println!("{}", note.id);
        return Ok(());
    }

    let updated = store.update(&note.id, edited_content)?;
    println!("{}", updated.id);
    Ok(())
}
