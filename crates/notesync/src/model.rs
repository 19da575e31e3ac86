use chrono::{DateTime, TimeZone, Utc};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub type UserId = String;
pub type NoteId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Online => "online",
            Presence::Offline => "offline",
        }
    }
}

/// A child collection of the user record.
///
/// A freshly created record stores the owner's user id in place of each
/// collection. The store replaces that placeholder with a map as soon as the
/// first child is written, and drops the key once the last child is removed.
///
/// Children that do not parse are skipped with a warning, so one bad entry
/// never makes the whole record unreadable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Collection<T> {
    Placeholder(String),
    Entries(BTreeMap<String, T>),
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Collection::Entries(BTreeMap::new())
    }
}

impl<T> Collection<T> {
    pub fn entries(&self) -> Option<&BTreeMap<String, T>> {
        match self {
            Collection::Placeholder(_) => None,
            Collection::Entries(entries) => Some(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries().map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_entries(self) -> BTreeMap<String, T> {
        match self {
            Collection::Placeholder(_) => BTreeMap::new(),
            Collection::Entries(entries) => entries,
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Collection<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(owner) => Ok(Collection::Placeholder(owner)),
            Value::Null => Ok(Collection::default()),
            Value::Object(children) => Ok(Collection::Entries(
                children
                    .into_iter()
                    .filter_map(|(key, child)| match serde_json::from_value(child) {
                        Ok(entry) => Some((key, entry)),
                        Err(err) => {
                            tracing::warn!(key = %key, error = %err, "Skipping malformed entry");
                            None
                        }
                    })
                    .collect(),
            )),
            other => Err(serde::de::Error::custom(format!(
                "expected a collection or placeholder, found {}",
                other
            ))),
        }
    }
}

/// Reverse index entry under `/tags/{tag}`: note id -> note id.
pub type TagIndex = BTreeMap<NoteId, NoteId>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub notes: Collection<Note>,
    #[serde(default)]
    pub tags: Collection<TagIndex>,
    #[serde(default)]
    pub notebooks: Collection<String>,
    pub status: Presence,
}

impl UserRecord {
    /// The record written on a user's first login: every collection mirrors
    /// the user id.
    pub fn first_login(user_id: &str, name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            name: name.to_string(),
            notes: Collection::Placeholder(user_id.to_string()),
            tags: Collection::Placeholder(user_id.to_string()),
            notebooks: Collection::Placeholder(user_id.to_string()),
            status: Presence::Offline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub notebook: String,
    #[serde(default)]
    pub url: String,
    /// Stored as `{ "tag": true, ... }`.
    #[serde(default, with = "tag_set")]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub modified: i64,
}

impl Note {
    pub fn from_draft(draft: NoteDraft, now_ms: i64) -> Self {
        Self {
            title: draft.title,
            notebook: draft.notebook.unwrap_or_default(),
            url: draft.url,
            tags: draft.tags,
            description: draft.description,
            created: now_ms,
            modified: now_ms,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        millis_to_datetime(self.created)
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        millis_to_datetime(self.modified)
    }
}

/// Input for creating a note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub notebook: Option<String>,
    pub url: String,
    pub tags: BTreeSet<String>,
    pub description: String,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn notebook(mut self, notebook: impl Into<String>) -> Self {
        self.notebook = Some(notebook.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A single editable scalar field of a note. Tags and notebook go through
/// their own operations because they also maintain reverse indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteField {
    Title(String),
    Url(String),
    Description(String),
}

impl NoteField {
    pub fn name(&self) -> &'static str {
        match self {
            NoteField::Title(_) => "title",
            NoteField::Url(_) => "url",
            NoteField::Description(_) => "description",
        }
    }

    pub fn into_value(self) -> String {
        match self {
            NoteField::Title(v) | NoteField::Url(v) | NoteField::Description(v) => v,
        }
    }
}

/// The signed-in user as seen by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub display_name: String,
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
}

mod tag_set {
    use serde::de::Deserializer;
    use serde::ser::Serializer;
    use serde::{Deserialize, Serialize};
    use std::collections::{BTreeMap, BTreeSet};

    pub fn serialize<S: Serializer>(tags: &BTreeSet<String>, serializer: S) -> Result<S::Ok, S::Error> {
        let map: BTreeMap<&str, bool> = tags.iter().map(|t| (t.as_str(), true)).collect();
        map.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeSet<String>, D::Error> {
        let map = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(map
            .into_iter()
            .filter(|(_, v)| !v.is_null() && *v != serde_json::Value::Bool(false))
            .map(|(k, _)| k)
            .collect())
    }
}
