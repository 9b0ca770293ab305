use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "Untitled Document";
pub const DEFAULT_CONTENT: &str = "# Untitled Document\n\nStart writing your markdown here.\n";
pub const IMPORTED_TAG: &str = "imported";

/// A markdown document row as stored by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub user_id: Uuid,
}

impl Document {
    pub fn new(owner: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: DEFAULT_TITLE.to_string(),
            content: DEFAULT_CONTENT.to_string(),
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
            user_id: owner,
        }
    }

    pub fn has_tags(&self, required: &[String]) -> bool {
        required.iter().all(|tag| self.tags.iter().any(|t| t == tag))
    }

    /// Content always; title and tags only when the patch carries them.
    pub fn merged(&self, patch: &DocumentPatch, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.content = patch.content.clone();
        if let Some(title) = &patch.title {
            next.title = title.trim().to_string();
        }
        if let Some(tags) = &patch.tags {
            next.tags = normalize_tags(tags);
        }
        next.updated_at = now;
        next
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentPatch {
    pub content: String,
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl DocumentPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }
}

/// Filter sent to the storage service. Always scoped to `owner`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentQuery {
    pub text: Option<String>,
    pub tags: Vec<String>,
    pub owner: Uuid,
}

impl DocumentQuery {
    pub fn new(owner: Uuid, text: &str, tags: &[String]) -> Self {
        let text = text.trim();
        Self {
            text: (!text.is_empty()).then(|| text.to_string()),
            tags: tags.to_vec(),
            owner,
        }
    }

    pub fn matches_text(&self, doc: &Document) -> bool {
        match &self.text {
            None => true,
            Some(text) => {
                let needle = text.to_lowercase();
                doc.title.to_lowercase().contains(&needle)
                    || doc.content.to_lowercase().contains(&needle)
            }
        }
    }
}

/// Trims, drops empties and duplicates, keeps first-seen order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

pub fn parse_tag_list(input: &str) -> Vec<String> {
    let raw: Vec<String> = input.split(',').map(str::to_string).collect();
    normalize_tags(&raw)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds since the epoch.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= now.timestamp())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EditorTheme {
    #[default]
    Default,
    Solarized,
    Monokai,
    Dracula,
}

impl EditorTheme {
    pub const ALL: [EditorTheme; 4] = [
        EditorTheme::Default,
        EditorTheme::Solarized,
        EditorTheme::Monokai,
        EditorTheme::Dracula,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EditorTheme::Default => "default",
            EditorTheme::Solarized => "solarized",
            EditorTheme::Monokai => "monokai",
            EditorTheme::Dracula => "dracula",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EditorTheme::Default => "Default",
            EditorTheme::Solarized => "Solarized",
            EditorTheme::Monokai => "Monokai",
            EditorTheme::Dracula => "Dracula",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|theme| theme.name() == name)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PreviewTheme {
    #[default]
    GitHub,
    Academic,
    Minimal,
}

impl PreviewTheme {
    pub const ALL: [PreviewTheme; 3] =
        [PreviewTheme::GitHub, PreviewTheme::Academic, PreviewTheme::Minimal];

    pub fn name(self) -> &'static str {
        match self {
            PreviewTheme::GitHub => "github",
            PreviewTheme::Academic => "academic",
            PreviewTheme::Minimal => "minimal",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PreviewTheme::GitHub => "GitHub",
            PreviewTheme::Academic => "Academic",
            PreviewTheme::Minimal => "Minimal",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|theme| theme.name() == name)
    }
}

pub const MIN_FONT_SIZE: u32 = 10;
pub const MAX_FONT_SIZE: u32 = 32;

/// Process-local UI preferences. Never sent to the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preferences {
    pub editor_theme: EditorTheme,
    pub preview_theme: PreviewTheme,
    pub font_size: u32,
    pub autosave: bool,
    pub dark_mode: bool,
    pub sync_scroll: bool,
    pub show_sidebar: bool,
    pub show_editor: bool,
    pub show_preview: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            editor_theme: EditorTheme::default(),
            preview_theme: PreviewTheme::default(),
            font_size: 16,
            autosave: true,
            dark_mode: false,
            sync_scroll: true,
            show_sidebar: true,
            show_editor: true,
            show_preview: true,
        }
    }
}

impl Preferences {
    pub fn clamped(mut self) -> Self {
        self.font_size = self.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn merge_applies_only_provided_fields() {
        let doc = Document {
            tags: vec!["work".into()],
            ..Document::new(Uuid::nil(), at(10))
        };

        let content_only = doc.merged(&DocumentPatch::content("new body"), at(20));
        assert_eq!(content_only.title, DEFAULT_TITLE);
        assert_eq!(content_only.tags, vec!["work".to_string()]);
        assert_eq!(content_only.content, "new body");
        assert_eq!(content_only.updated_at, at(20));
        assert_eq!(content_only.created_at, at(10));

        let full = doc.merged(
            &DocumentPatch::content("x")
                .with_title("  Notes ")
                .with_tags(vec![" a ".into(), "".into(), "a".into(), "b".into()]),
            at(30),
        );
        assert_eq!(full.title, "Notes");
        assert_eq!(full.tags, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn tag_filter_requires_every_selected_tag() {
        let mut doc = Document::new(Uuid::nil(), at(0));
        doc.tags = vec!["home".into(), "work".into()];
        assert!(doc.has_tags(&[]));
        assert!(doc.has_tags(&["work".into()]));
        assert!(!doc.has_tags(&["work".into(), "urgent".into()]));
    }

    #[test]
    fn query_text_is_trimmed_and_case_insensitive() {
        let owner = Uuid::new_v4();
        assert_eq!(DocumentQuery::new(owner, "   ", &[]).text, None);
        let query = DocumentQuery::new(owner, " Rust ", &[]);
        let mut doc = Document::new(owner, at(0));
        doc.content = "learning rust today".into();
        assert!(query.matches_text(&doc));
    }

    #[test]
    fn session_expiry_and_tag_parsing() {
        let session = Session {
            access_token: "t".into(),
            refresh_token: None,
            expires_at: Some(100),
            user: User { id: Uuid::nil(), email: None },
        };
        assert!(!session.is_expired(at(99)));
        assert!(session.is_expired(at(100)));
        assert_eq!(parse_tag_list("work, home,,work "), vec!["work", "home"]);
    }

    #[test]
    fn theme_names_round_trip() {
        for theme in EditorTheme::ALL {
            assert_eq!(EditorTheme::from_name(theme.name()), Some(theme));
        }
        assert_eq!(PreviewTheme::from_name("academic"), Some(PreviewTheme::Academic));
        assert_eq!(
            Preferences { font_size: 99, ..Preferences::default() }.clamped().font_size,
            MAX_FONT_SIZE
        );
    }
}
