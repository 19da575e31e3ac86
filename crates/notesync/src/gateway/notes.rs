//! Note writes and the reverse indexes that mirror them.
//!
//! A note's tags live both on the note (`notes/{id}/tags/{tag}`) and in the
//! tag index (`tags/{tag}/{id}`); its notebook lives both on the note and in
//! `notebooks/{id}`. Edits that touch both sides go out as a single
//! multi-path update on the user record. Creating a note needs the push key
//! first, so the note and its index entries are two writes joined into one
//! completion. Nothing enforces that the two sides agree.
//!
//! Edits of an existing note (fields, tags, notebook) read it first and fail
//! with `NotFound` when it is gone.

use super::Gateway;
use crate::error::{GatewayError, Result};
use crate::model::{now_millis, Note, NoteDraft, NoteField, NoteId};
use crate::path::schema;
use crate::request::WriteJoin;
use crate::store::{Completion, RealtimeStore};
use crate::validation::{require_key, require_tag, validate_notebook_name};
use serde_json::{Map, Value};
use std::cell::OnceCell;
use std::rc::Rc;

const MODIFIED: &str = "modified";

fn note_field(note_id: &str, field: &str) -> String {
    format!("{}/{}/{}", schema::NOTES, note_id, field)
}

impl<S: RealtimeStore + 'static> Gateway<S> {
    /// Push a new note and index its tags and notebook. Returns the new id
    /// right away; `on_complete` reports it again once every write landed.
    pub fn create_note(
        &self,
        draft: NoteDraft,
        on_complete: impl FnOnce(Result<NoteId>) + 'static,
    ) -> Result<NoteId> {
        let session = self.require_session()?;
        for tag in &draft.tags {
            require_tag(tag)?;
        }
        if let Some(notebook) = &draft.notebook {
            validate_notebook_name(notebook)?;
        }

        let note = Note::from_draft(draft, now_millis());
        let value = serde_json::to_value(&note)?;

        let mut index = Map::new();
        let note_id: Rc<OnceCell<NoteId>> = Rc::new(OnceCell::new());
        let reported = note_id.clone();
        let needs_index = !note.tags.is_empty() || !note.notebook.is_empty();
        let join = WriteJoin::new(
            if needs_index { 2 } else { 1 },
            Box::new(move |result| {
                on_complete(result.map(|()| reported.get().cloned().unwrap_or_default()))
            }),
        );

        let id = self
            .inner
            .store
            .push(&schema::notes(&session.user_id), value, join.part());
        let _ = note_id.set(id.clone());

        if needs_index {
            for tag in &note.tags {
                index.insert(format!("{}/{}/{}", schema::TAGS, tag, id), Value::from(id.as_str()));
            }
            if !note.notebook.is_empty() {
                index.insert(
                    format!("{}/{}", schema::NOTEBOOKS, id),
                    Value::from(note.notebook.as_str()),
                );
            }
            self.inner
                .store
                .update(&schema::user(&session.user_id), index, join.part());
        }
        tracing::debug!(note_id = %id, tags = note.tags.len(), "Created note");
        Ok(id)
    }

    /// Overwrite one scalar field and bump `modified`. Fails with
    /// [`GatewayError::NotFound`] if the note does not exist.
    pub fn update_note_field(
        &self,
        note_id: &str,
        field: NoteField,
        on_complete: impl FnOnce(Result<()>) + 'static,
    ) -> Result<()> {
        let session = self.require_session()?;
        require_key("note id", note_id)?;
        let name = field.name();
        let mut fields = Map::new();
        fields.insert(name.to_string(), Value::from(field.into_value()));
        fields.insert(MODIFIED.to_string(), Value::from(now_millis()));

        let gateway = self.clone();
        let path = schema::note(&session.user_id, note_id);
        self.when_note_exists(
            &session.user_id,
            note_id,
            "update_note_field",
            Box::new(on_complete),
            move |done| gateway.inner.store.update(&path, fields, done),
        );
        tracing::debug!(note_id, field = name, "Updating note field");
        Ok(())
    }

    pub fn add_tag(
        &self,
        note_id: &str,
        tag: &str,
        on_complete: impl FnOnce(Result<()>) + 'static,
    ) -> Result<()> {
        self.write_tag(note_id, tag, true, Box::new(on_complete))
    }

    pub fn remove_tag(
        &self,
        note_id: &str,
        tag: &str,
        on_complete: impl FnOnce(Result<()>) + 'static,
    ) -> Result<()> {
        self.write_tag(note_id, tag, false, Box::new(on_complete))
    }

    /// Move a note into `notebook`, or out of any notebook with `None`.
    /// Fails with [`GatewayError::NotFound`] if the note does not exist.
    pub fn set_notebook(
        &self,
        note_id: &str,
        notebook: Option<&str>,
        on_complete: impl FnOnce(Result<()>) + 'static,
    ) -> Result<()> {
        let session = self.require_session()?;
        require_key("note id", note_id)?;
        if let Some(name) = notebook {
            validate_notebook_name(name)?;
        }

        let mut fields = Map::new();
        fields.insert(
            note_field(note_id, "notebook"),
            Value::from(notebook.unwrap_or_default()),
        );
        fields.insert(
            format!("{}/{}", schema::NOTEBOOKS, note_id),
            notebook.map_or(Value::Null, Value::from),
        );
        fields.insert(note_field(note_id, MODIFIED), Value::from(now_millis()));

        let gateway = self.clone();
        let path = schema::user(&session.user_id);
        self.when_note_exists(
            &session.user_id,
            note_id,
            "set_notebook",
            Box::new(on_complete),
            move |done| gateway.inner.store.update(&path, fields, done),
        );
        tracing::debug!(note_id, notebook = ?notebook, "Setting notebook");
        Ok(())
    }

    /// Remove a note along with its tag and notebook index entries. The note
    /// is read first to learn which tag entries to drop.
    pub fn delete_note(
        &self,
        note_id: &str,
        on_complete: impl FnOnce(Result<()>) + 'static,
    ) -> Result<()> {
        let session = self.require_session()?;
        require_key("note id", note_id)?;

        let gateway = self.clone();
        let note_id = note_id.to_string();
        let on_complete: Completion = Box::new(on_complete);
        self.fetch(
            schema::note(&session.user_id, &note_id),
            "delete_note",
            move |result| {
                let note = match result.and_then(|snap| snap.deserialize::<Note>()) {
                    Ok(note) => note,
                    Err(err) => return on_complete(Err(err)),
                };
                let mut fields = Map::new();
                fields.insert(format!("{}/{}", schema::NOTES, note_id), Value::Null);
                fields.insert(format!("{}/{}", schema::NOTEBOOKS, note_id), Value::Null);
                for tag in note.iter().flat_map(|n| n.tags.iter()) {
                    fields.insert(format!("{}/{}/{}", schema::TAGS, tag, note_id), Value::Null);
                }
                tracing::debug!(note_id = %note_id, found = note.is_some(), "Deleting note");
                gateway
                    .inner
                    .store
                    .update(&schema::user(&session.user_id), fields, on_complete);
            },
        );
        Ok(())
    }

    fn write_tag(&self, note_id: &str, tag: &str, present: bool, on_complete: Completion) -> Result<()> {
        let session = self.require_session()?;
        require_key("note id", note_id)?;
        require_tag(tag)?;

        let mut fields = Map::new();
        fields.insert(
            format!("{}/{}", note_field(note_id, schema::TAGS), tag),
            if present { Value::Bool(true) } else { Value::Null },
        );
        fields.insert(
            format!("{}/{}/{}", schema::TAGS, tag, note_id),
            if present { Value::from(note_id) } else { Value::Null },
        );
        fields.insert(note_field(note_id, MODIFIED), Value::from(now_millis()));

        let gateway = self.clone();
        let path = schema::user(&session.user_id);
        self.when_note_exists(&session.user_id, note_id, "write_tag", on_complete, move |done| {
            gateway.inner.store.update(&path, fields, done)
        });
        tracing::debug!(note_id, tag, present, "Writing tag");
        Ok(())
    }

    /// Read the note, then hand `on_complete` to `write` if it exists. A
    /// field write under a missing id would create a note with no title.
    fn when_note_exists(
        &self,
        user_id: &str,
        note_id: &str,
        label: &'static str,
        on_complete: Completion,
        write: impl FnOnce(Completion) + 'static,
    ) {
        let missing = format!("note {}", note_id);
        self.fetch(schema::note(user_id, note_id), label, move |result| match result {
            Ok(snap) if snap.exists() => write(on_complete),
            Ok(_) => {
                tracing::debug!(request = label, note = %missing, "Nothing to write to");
                on_complete(Err(GatewayError::NotFound(missing)))
            }
            Err(err) => on_complete(Err(err)),
        });
    }
}
