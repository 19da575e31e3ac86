use super::context::AppContext;
use super::print::{print_info, print_note, print_notes, print_session, print_signed_in, print_success};
use super::setup::{EditNote, NewNote, NoteCommands};
use anyhow::{bail, Result};
use notesync::auth::LocalProvider;
use notesync::model::{NoteDraft, NoteField};
use notesync::view::{AppContext as ViewContext, TemplateRenderer, ViewController};
use notesync::GatewayError;
use std::cell::RefCell;
use std::rc::Rc;

pub(super) fn handle_login(ctx: &AppContext, user: Option<&str>) -> Result<()> {
    // Switching accounts: drop the other account's credential first.
    if let Some(user) = user {
        let wanted = LocalProvider::user_id_for(user);
        if let Ok(session) = ctx.resume() {
            if session.user_id != wanted {
                ctx.gateway.logout();
            }
        }
    }
    let record = ctx.wait(|cb| {
        ctx.gateway.login(false, cb);
        Ok(())
    })?;
    print_signed_in(&record);
    Ok(())
}

pub(super) fn handle_logout(ctx: &AppContext) -> Result<()> {
    let session = ctx.resume().ok();
    ctx.gateway.logout();
    ctx.event_loop.run_until_idle();
    match session {
        Some(session) => print_success(&format!("Signed out {}", session.user_id)),
        None => print_info("Not logged in"),
    }
    Ok(())
}

pub(super) fn handle_whoami(ctx: &AppContext) -> Result<()> {
    let session = ctx.resume()?;
    print_session(&session);
    Ok(())
}

pub(super) fn handle_render(ctx: &AppContext, location: &str) -> Result<()> {
    match ctx.resume() {
        Ok(_) | Err(GatewayError::NotAuthenticated) => {}
        Err(err) => return Err(err.into()),
    }
    let controller = ViewController::new(ViewContext::new(ctx.gateway.clone(), TemplateRenderer::new()?));
    let route = controller.navigate(location)?;
    ctx.event_loop.run_until_idle();
    tracing::debug!(route = %route, "Rendered");
    print!("{}", controller.markup());
    Ok(())
}

pub(super) fn handle_note(ctx: &AppContext, command: NoteCommands) -> Result<()> {
    let session = ctx.resume()?;
    let gateway = &ctx.gateway;
    match command {
        NoteCommands::New(new) => {
            let draft = draft_from(new);
            let id = ctx.wait(|cb| gateway.create_note(draft, cb).map(|_| ()))?;
            print_success(&format!("Created note {}", id));
        }
        NoteCommands::Show { id } => {
            match ctx.wait(|cb| gateway.get_note(&session.user_id, &id, cb))? {
                Some(note) => print_note(&id, &note),
                None => bail!("Note {} not found", id),
            }
        }
        NoteCommands::List => {
            let notes = Rc::new(RefCell::new(Vec::new()));
            let sink = notes.clone();
            gateway.on_note(move |id, note| sink.borrow_mut().push((id, note)))?;
            ctx.event_loop.run_until_idle();
            gateway.unload();
            print_notes(&notes.borrow());
        }
        NoteCommands::Edit(edit) => {
            let id = edit.id.clone();
            let fields = fields_from(edit);
            if fields.is_empty() {
                bail!("Nothing to change: pass --title, --url or --description");
            }
            for field in fields {
                let name = field.name();
                ctx.wait(|cb| gateway.update_note_field(&id, field, cb))?;
                print_success(&format!("Updated {} of {}", name, id));
            }
        }
        NoteCommands::Tag { id, tag } => {
            ctx.wait(|cb| gateway.add_tag(&id, &tag, cb))?;
            print_success(&format!("Tagged {} with {}", id, tag));
        }
        NoteCommands::Untag { id, tag } => {
            ctx.wait(|cb| gateway.remove_tag(&id, &tag, cb))?;
            print_success(&format!("Removed {} from {}", tag, id));
        }
        NoteCommands::Move { id, notebook } => {
            ctx.wait(|cb| gateway.set_notebook(&id, notebook.as_deref(), cb))?;
            match notebook {
                Some(notebook) => print_success(&format!("Moved {} to {}", id, notebook)),
                None => print_success(&format!("Moved {} out of its notebook", id)),
            }
        }
        NoteCommands::Rm { id } => {
            ctx.wait(|cb| gateway.delete_note(&id, cb))?;
            print_success(&format!("Deleted note {}", id));
        }
    }
    Ok(())
}

fn draft_from(new: NewNote) -> NoteDraft {
    let mut draft = NoteDraft::new(new.title);
    if let Some(notebook) = new.notebook {
        draft = draft.notebook(notebook);
    }
    if let Some(url) = new.url {
        draft = draft.url(url);
    }
    if let Some(description) = new.description {
        draft = draft.description(description);
    }
    for tag in new.tags {
        draft = draft.tag(tag);
    }
    draft
}

fn fields_from(edit: EditNote) -> Vec<NoteField> {
    let mut fields = Vec::new();
    if let Some(title) = edit.title {
        fields.push(NoteField::Title(title));
    }
    if let Some(url) = edit.url {
        fields.push(NoteField::Url(url));
    }
    if let Some(description) = edit.description {
        fields.push(NoteField::Description(description));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_from_args() {
        let draft = draft_from(NewNote {
            title: "Groceries".into(),
            notebook: Some("Errands".into()),
            url: None,
            tags: vec!["home".into(), "food".into()],
            description: Some("milk".into()),
        });
        assert_eq!(
            draft,
            NoteDraft::new("Groceries")
                .notebook("Errands")
                .tag("food")
                .tag("home")
                .description("milk")
        );
    }

    #[test]
    fn test_fields_from_args_keeps_order() {
        let fields = fields_from(EditNote {
            id: "n1".into(),
            title: Some("t".into()),
            url: None,
            description: Some("d".into()),
        });
        assert_eq!(
            fields,
            vec![NoteField::Title("t".into()), NoteField::Description("d".into())]
        );
    }
}
