use crate::error::Result;
use crate::model::{millis_to_datetime, Note, NoteId, Session, UserRecord};
use chrono::{DateTime, Utc};
use minijinja::Environment;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const LAYOUT_TEMPLATE: &str = include_str!("templates/layout.html");
pub const HOME_TEMPLATE: &str = include_str!("templates/home.html");
pub const PROFILE_TEMPLATE: &str = include_str!("templates/profile.html");
pub const NOTES_TEMPLATE: &str = include_str!("templates/notes.html");
pub const NOT_FOUND_TEMPLATE: &str = include_str!("templates/not_found.html");

/// Turns a view model into markup.
pub trait Renderer {
    fn render(&self, view: &View) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum View {
    Home(HomeView),
    Profile(ProfileView),
    Notes(NotesView),
    NotFound(NotFoundView),
}

impl View {
    pub fn template_name(&self) -> &'static str {
        match self {
            View::Home(_) => "home.html",
            View::Profile(_) => "profile.html",
            View::Notes(_) => "notes.html",
            View::NotFound(_) => "not_found.html",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HomeView {
    pub session: Option<Session>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileView {
    pub session: Option<Session>,
    pub user_id: String,
    pub loading: bool,
    pub found: bool,
    pub name: String,
    pub status: String,
    pub note_count: usize,
    pub tag_count: usize,
    pub notebook_count: usize,
}

impl ProfileView {
    pub fn loading(session: Option<Session>, user_id: &str) -> Self {
        Self {
            session,
            user_id: user_id.to_string(),
            loading: true,
            found: false,
            name: String::new(),
            status: String::new(),
            note_count: 0,
            tag_count: 0,
            notebook_count: 0,
        }
    }

    pub fn from_record(session: Option<Session>, user_id: &str, record: Option<&UserRecord>) -> Self {
        let mut view = Self::loading(session, user_id);
        view.loading = false;
        if let Some(record) = record {
            view.found = true;
            view.name = record.name.clone();
            view.status = record.status.as_str().to_string();
            view.note_count = record.notes.len();
            view.tag_count = record.tags.len();
            view.notebook_count = record.notebooks.len();
        }
        view
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteRow {
    pub id: NoteId,
    pub title: String,
    pub notebook: String,
    pub url: String,
    pub tags: Vec<String>,
    pub description: String,
    pub modified_ago: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagRow {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotesView {
    pub session: Option<Session>,
    pub notes: Vec<NoteRow>,
    pub tags: Vec<TagRow>,
    pub notebooks: Vec<String>,
}

impl NotesView {
    /// Notes keep key order, which for pushed notes is creation order.
    pub fn build(
        session: Option<Session>,
        notes: &BTreeMap<NoteId, Note>,
        tags: &BTreeMap<String, BTreeSet<NoteId>>,
        notebooks: &BTreeMap<NoteId, String>,
        now: DateTime<Utc>,
    ) -> Self {
        let notes = notes
            .iter()
            .map(|(id, note)| NoteRow {
                id: id.clone(),
                title: note.title.clone(),
                notebook: note.notebook.clone(),
                url: note.url.clone(),
                tags: note.tags.iter().cloned().collect(),
                description: note.description.clone(),
                modified_ago: format_time_ago(millis_to_datetime(note.modified), now),
            })
            .collect();
        let tags = tags
            .iter()
            .map(|(name, ids)| TagRow {
                name: name.clone(),
                count: ids.len(),
            })
            .collect();
        let notebooks: BTreeSet<&String> = notebooks.values().collect();
        Self {
            session,
            notes,
            tags,
            notebooks: notebooks.into_iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotFoundView {
    pub session: Option<Session>,
    pub location: String,
}

pub fn format_time_ago(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(timestamp);
    let formatter = timeago::Formatter::new();
    formatter.convert(duration.to_std().unwrap_or_default())
}

/// HTML renderer over the embedded templates. Values are auto-escaped.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("layout.html", LAYOUT_TEMPLATE)?;
        env.add_template("home.html", HOME_TEMPLATE)?;
        env.add_template("profile.html", PROFILE_TEMPLATE)?;
        env.add_template("notes.html", NOTES_TEMPLATE)?;
        env.add_template("not_found.html", NOT_FOUND_TEMPLATE)?;
        Ok(Self { env })
    }
}

impl Renderer for TemplateRenderer {
    fn render(&self, view: &View) -> Result<String> {
        let template = self.env.get_template(view.template_name())?;
        Ok(template.render(view)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NoteDraft;
    use chrono::Duration;

    fn session() -> Option<Session> {
        Some(Session {
            user_id: "u1".into(),
            display_name: "Ada".into(),
        })
    }

    #[test]
    fn test_home_greets_signed_in_user() {
        let renderer = TemplateRenderer::new().unwrap();
        let html = renderer.render(&View::Home(HomeView { session: session() })).unwrap();
        assert!(html.contains("Signed in as Ada."));
        assert!(html.contains("href=\"/notes\""));

        let html = renderer.render(&View::Home(HomeView { session: None })).unwrap();
        assert!(html.contains("Sign in to see your notes."));
        assert!(!html.contains("href=\"/notes\""));
    }

    #[test]
    fn test_notes_view_lists_notes_tags_notebooks() {
        let now = Utc::now();
        let mut notes = BTreeMap::new();
        let note = Note::from_draft(
            NoteDraft::new("<Groceries>").tag("home").notebook("Errands"),
            (now - Duration::hours(2)).timestamp_millis(),
        );
        notes.insert("n1".to_string(), note);
        let mut tags = BTreeMap::new();
        tags.insert("home".to_string(), BTreeSet::from(["n1".to_string()]));
        let mut notebooks = BTreeMap::new();
        notebooks.insert("n1".to_string(), "Errands".to_string());

        let view = NotesView::build(session(), &notes, &tags, &notebooks, now);
        assert_eq!(view.notes[0].modified_ago, "2 hours ago");
        assert_eq!(view.tags, vec![TagRow { name: "home".into(), count: 1 }]);
        assert_eq!(view.notebooks, vec!["Errands"]);

        let html = TemplateRenderer::new().unwrap().render(&View::Notes(view)).unwrap();
        assert!(html.contains("id=\"note-n1\""));
        assert!(html.contains("&lt;Groceries&gt;"));
        assert!(html.contains("home (1)"));
        assert!(!html.contains("No notes yet."));
    }

    #[test]
    fn test_empty_notes_view() {
        let view = NotesView::build(session(), &BTreeMap::new(), &BTreeMap::new(), &BTreeMap::new(), Utc::now());
        let html = TemplateRenderer::new().unwrap().render(&View::Notes(view)).unwrap();
        assert!(html.contains("No notes yet."));
    }

    #[test]
    fn test_profile_states() {
        let renderer = TemplateRenderer::new().unwrap();
        let html = renderer
            .render(&View::Profile(ProfileView::loading(None, "u2")))
            .unwrap();
        assert!(html.contains("Loading u2..."));

        let html = renderer
            .render(&View::Profile(ProfileView::from_record(None, "u2", None)))
            .unwrap();
        assert!(html.contains("No user u2."));

        let record = UserRecord::first_login("u2", "Grace");
        let view = ProfileView::from_record(None, "u2", Some(&record));
        assert_eq!(view.note_count, 0);
        let html = renderer.render(&View::Profile(view)).unwrap();
        assert!(html.contains("<h1>Grace</h1>"));
        assert!(html.contains("offline"));
    }

    #[test]
    fn test_not_found_shows_location() {
        let html = TemplateRenderer::new()
            .unwrap()
            .render(&View::NotFound(NotFoundView {
                session: None,
                location: "/nowhere".into(),
            }))
            .unwrap();
        assert!(html.contains("Nothing lives at"));
        assert!(html.contains("nowhere."));
    }
}
