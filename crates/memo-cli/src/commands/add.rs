use memo_core::store::NoteDraft;

use crate::commands::common::{resolve_note_content, Session};
use crate::error::CliError;

pub fn run_add(
    session: &Session,
    content_parts: &[String],
    tags: Vec<String>,
    public: bool,
) -> Result<(), CliError> {
    let content = resolve_note_content(content_parts)?;

    let note = session.notes().create(
        content,
        NoteDraft {
            tags,
            is_public: public,
            ..NoteDraft::default()
        },
    )?;

    println!("{}", note.id);
    Ok(())
}
