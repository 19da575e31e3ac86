use chrono::Utc;
use colored::Colorize;
use notesync::model::{Note, NoteId, Session, UserRecord};
use notesync::view::render::format_time_ago;

pub(super) fn print_success(message: &str) {
    println!("{}", message.green());
}

pub(super) fn print_info(message: &str) {
    println!("{}", message.dimmed());
}

pub(super) fn print_signed_in(record: &UserRecord) {
    print_success(&format!("Signed in as {} ({})", record.name, record.user_id));
}

pub(super) fn print_session(session: &Session) {
    println!("{} ({})", session.display_name.bold(), session.user_id);
}

pub(super) fn print_notes(notes: &[(NoteId, Note)]) {
    if notes.is_empty() {
        println!("No notes found.");
        return;
    }
    let now = Utc::now();
    for (id, note) in notes {
        let mut line = format!("{}  {}", id.yellow(), note.title.bold());
        if !note.notebook.is_empty() {
            line.push_str(&format!("  [{}]", note.notebook.cyan()));
        }
        for tag in &note.tags {
            line.push_str(&format!(" #{}", tag));
        }
        println!("{}  {}", line, format_time_ago(note.modified_at(), now).dimmed());
    }
}

pub(super) fn print_note(id: &str, note: &Note) {
    println!("{} {}", id.yellow(), note.title.bold());
    println!("--------------------------------");
    if !note.notebook.is_empty() {
        println!("notebook: {}", note.notebook);
    }
    if !note.url.is_empty() {
        println!("url: {}", note.url);
    }
    if !note.tags.is_empty() {
        let tags: Vec<&str> = note.tags.iter().map(String::as_str).collect();
        println!("tags: {}", tags.join(", "));
    }
    println!("created: {}", note.created_at().format("%Y-%m-%d %H:%M"));
    println!("modified: {}", note.modified_at().format("%Y-%m-%d %H:%M"));
    if !note.description.is_empty() {
        println!();
        println!("{}", note.description);
    }
}
