use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use uuid::Uuid;

use crate::backend::DocumentService;
use crate::clock::Clock;
use crate::error::StoreError;
use crate::import::title_from_file_name;
use crate::listeners::{Listeners, Subscription};
use crate::model::{Document, DocumentPatch, DocumentQuery, Preferences, IMPORTED_TAG};
use crate::notify::{Notifier, ToastLevel};

#[derive(Default)]
struct DocumentState {
    owner: Option<Uuid>,
    /// Rows from the last list call, most recently updated first.
    loaded: Vec<Document>,
    current: Option<Document>,
    query: String,
    selected_tags: Vec<String>,
    known_tags: BTreeSet<String>,
    loading: bool,
    preferences: Preferences,
}

impl DocumentState {
    fn visible(&self) -> impl Iterator<Item = &Document> {
        self.loaded
            .iter()
            .filter(|doc| doc.has_tags(&self.selected_tags))
    }

    /// Keep the current document if it is still visible, otherwise fall
    /// back to the first visible one.
    fn reselect(&mut self) {
        let current_id = self.current.as_ref().map(|doc| doc.id);
        let kept = current_id.and_then(|id| self.visible().find(|doc| doc.id == id).cloned());
        self.current = kept.or_else(|| self.visible().next().cloned());
    }

    fn remember_tags(&mut self, doc: &Document) {
        self.known_tags.extend(doc.tags.iter().cloned());
    }

    fn store_saved(&mut self, saved: &Document) {
        self.loaded.retain(|doc| doc.id != saved.id);
        self.loaded.push(saved.clone());
        self.loaded.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        self.remember_tags(saved);
    }
}

struct Inner {
    backend: Rc<dyn DocumentService>,
    notifier: Rc<dyn Notifier>,
    clock: Rc<dyn Clock>,
    state: RefCell<DocumentState>,
    listeners: Listeners<()>,
}

/// The signed-in user's documents, the current selection, the search and
/// tag filters, and UI preferences.
///
/// Every operation reports its own failure through the notifier and leaves
/// the list and selection as they were.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Rc<Inner>,
}

impl DocumentStore {
    pub fn new(
        backend: Rc<dyn DocumentService>,
        notifier: Rc<dyn Notifier>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                backend,
                notifier,
                clock,
                state: RefCell::new(DocumentState::default()),
                listeners: Listeners::new(),
            }),
        }
    }

    pub fn subscribe(&self, listener: impl Fn() + 'static) -> Subscription {
        self.inner.listeners.subscribe(move |_| listener())
    }

    pub fn documents(&self) -> Vec<Document> {
        self.inner.state.borrow().visible().cloned().collect()
    }

    pub fn current(&self) -> Option<Document> {
        self.inner.state.borrow().current.clone()
    }

    pub fn current_id(&self) -> Option<Uuid> {
        self.inner.state.borrow().current.as_ref().map(|doc| doc.id)
    }

    pub fn loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    pub fn query(&self) -> String {
        self.inner.state.borrow().query.clone()
    }

    pub fn selected_tags(&self) -> Vec<String> {
        self.inner.state.borrow().selected_tags.clone()
    }

    /// Every tag seen on any loaded document since sign-in.
    pub fn known_tags(&self) -> Vec<String> {
        self.inner.state.borrow().known_tags.iter().cloned().collect()
    }

    pub fn preferences(&self) -> Preferences {
        self.inner.state.borrow().preferences.clone()
    }

    pub fn update_preferences(&self, update: impl FnOnce(&mut Preferences)) {
        {
            let mut state = self.inner.state.borrow_mut();
            let mut next = state.preferences.clone();
            update(&mut next);
            state.preferences = next.clamped();
        }
        self.emit();
    }

    /// Switches the store to another user (or none), dropping everything
    /// loaded for the previous one. Preferences are kept.
    pub async fn set_owner(&self, owner: Option<Uuid>) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.owner == owner {
                return;
            }
            let preferences = state.preferences.clone();
            *state = DocumentState {
                owner,
                preferences,
                ..DocumentState::default()
            };
        }
        self.emit();
        if owner.is_some() {
            let _ = self.refresh().await;
        }
    }

    pub async fn refresh(&self) -> Result<(), StoreError> {
        let result = self.reload().await;
        self.report("load documents", result)
    }

    pub async fn set_query(&self, text: &str) -> Result<(), StoreError> {
        let text = text.to_string();
        self.refilter(move |state| state.query = text).await
    }

    pub async fn set_tag_filter(&self, tags: Vec<String>) -> Result<(), StoreError> {
        self.refilter(move |state| state.selected_tags = tags).await
    }

    pub async fn toggle_tag(&self, tag: &str) -> Result<(), StoreError> {
        let mut tags = self.selected_tags();
        if let Some(pos) = tags.iter().position(|t| t == tag) {
            tags.remove(pos);
        } else {
            tags.push(tag.to_string());
        }
        self.set_tag_filter(tags).await
    }

    /// Selects a loaded document. Unknown ids leave the selection alone.
    pub fn select(&self, id: Uuid) -> bool {
        let selected = {
            let mut state = self.inner.state.borrow_mut();
            let found = state.loaded.iter().find(|doc| doc.id == id).cloned();
            match found {
                Some(doc) => {
                    state.current = Some(doc);
                    true
                }
                None => false,
            }
        };
        if selected {
            self.emit();
        }
        selected
    }

    pub async fn create_document(&self) -> Result<Document, StoreError> {
        let result = match self.owner() {
            Ok(owner) => self.save_new(Document::new(owner, self.inner.clock.now())).await,
            Err(err) => Err(err),
        };
        self.report("create document", result)
    }

    /// Wraps imported markdown in a new document tagged `imported`.
    pub async fn import_document(
        &self,
        file_name: &str,
        content: String,
    ) -> Result<Document, StoreError> {
        let result = match self.owner() {
            Ok(owner) => {
                let mut doc = Document::new(owner, self.inner.clock.now());
                doc.title = title_from_file_name(file_name);
                doc.content = content;
                doc.tags = vec![IMPORTED_TAG.to_string()];
                self.save_new(doc).await
            }
            Err(err) => Err(err),
        };
        self.report("import document", result)
    }

    pub async fn update_current(&self, patch: DocumentPatch) -> Result<Document, StoreError> {
        match self.current_id() {
            Some(id) => self.update_document(id, patch).await,
            None => self.report("save document", Err(StoreError::NoDocument)),
        }
    }

    /// Saves `patch` onto document `id`. The saved row replaces the current
    /// document when `id` is still the one selected.
    pub async fn update_document(
        &self,
        id: Uuid,
        patch: DocumentPatch,
    ) -> Result<Document, StoreError> {
        let result = self.save_patch(id, patch).await;
        self.report("save document", result)
    }

    pub async fn rename(&self, id: Uuid, title: &str) -> Result<Document, StoreError> {
        let content = self
            .inner
            .state
            .borrow()
            .loaded
            .iter()
            .find(|doc| doc.id == id)
            .map(|doc| doc.content.clone());
        let result = match content {
            Some(content) => {
                self.save_patch(id, DocumentPatch::content(content).with_title(title))
                    .await
            }
            None => Err(StoreError::NotFound),
        };
        self.report("rename document", result)
    }

    pub async fn delete_current(&self) -> Result<(), StoreError> {
        match self.current_id() {
            Some(id) => self.delete_document(id).await,
            None => self.report("delete document", Err(StoreError::NoDocument)),
        }
    }

    pub async fn delete_document(&self, id: Uuid) -> Result<(), StoreError> {
        let result = self.remove(id).await;
        let result = self.report("delete document", result);
        if result.is_ok() {
            let _ = self.refresh().await;
        }
        result
    }

    /// Applies a filter change and reloads. A failed reload puts the
    /// previous query and tags back.
    async fn refilter(&self, change: impl FnOnce(&mut DocumentState)) -> Result<(), StoreError> {
        let previous = {
            let mut state = self.inner.state.borrow_mut();
            let previous = (state.query.clone(), state.selected_tags.clone());
            change(&mut *state);
            previous
        };
        self.emit();
        let result = self.reload().await;
        if result.is_err() {
            {
                let mut state = self.inner.state.borrow_mut();
                state.query = previous.0;
                state.selected_tags = previous.1;
            }
            self.emit();
        }
        self.report("load documents", result)
    }

    async fn reload(&self) -> Result<(), StoreError> {
        let owner = self.owner()?;
        let query = {
            let state = self.inner.state.borrow();
            DocumentQuery::new(owner, &state.query, &state.selected_tags)
        };
        self.set_loading(true);
        let result = self.inner.backend.list(&query).await;
        let rows = match result {
            Ok(rows) => rows,
            Err(err) => {
                self.set_loading(false);
                return Err(err.into());
            }
        };
        {
            let mut state = self.inner.state.borrow_mut();
            state.loading = false;
            if state.owner != Some(owner) {
                log::debug!("dropping document list for a previous user");
            } else {
                let total = rows.len();
                let mut owned: Vec<Document> =
                    rows.into_iter().filter(|doc| doc.user_id == owner).collect();
                if owned.len() != total {
                    log::warn!(
                        "backend returned {} rows not owned by the current user",
                        total - owned.len()
                    );
                }
                owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                for doc in &owned {
                    state.remember_tags(doc);
                }
                state.loaded = owned;
                state.reselect();
                log::debug!("loaded {} documents", state.loaded.len());
            }
        }
        self.emit();
        Ok(())
    }

    async fn save_new(&self, doc: Document) -> Result<Document, StoreError> {
        self.set_loading(true);
        let result = self.inner.backend.upsert(&doc).await;
        self.set_loading(false);
        let saved = result?;
        {
            let mut state = self.inner.state.borrow_mut();
            state.store_saved(&saved);
            state.current = Some(saved.clone());
        }
        log::info!("created document {}", saved.id);
        self.emit();
        Ok(saved)
    }

    async fn save_patch(&self, id: Uuid, patch: DocumentPatch) -> Result<Document, StoreError> {
        if patch
            .title
            .as_deref()
            .is_some_and(|title| title.trim().is_empty())
        {
            return Err(StoreError::Validation("Title cannot be empty.".to_string()));
        }
        let existing = {
            let state = self.inner.state.borrow();
            let found = state
                .current
                .iter()
                .chain(state.loaded.iter())
                .find(|doc| doc.id == id)
                .cloned();
            found
        };
        let existing = existing.ok_or(StoreError::NotFound)?;
        let merged = existing.merged(&patch, self.inner.clock.now());

        self.set_loading(true);
        let result = self.inner.backend.upsert(&merged).await;
        self.set_loading(false);
        let saved = result?;
        {
            let mut state = self.inner.state.borrow_mut();
            state.store_saved(&saved);
            if state.current.as_ref().is_some_and(|doc| doc.id == saved.id) {
                state.current = Some(saved.clone());
            }
        }
        log::debug!("saved document {}", saved.id);
        self.emit();
        Ok(saved)
    }

    async fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        let owner = self.owner()?;
        self.set_loading(true);
        let result = self.inner.backend.delete(id, owner).await;
        self.set_loading(false);
        if !result? {
            return Err(StoreError::DeleteRejected);
        }
        {
            let mut state = self.inner.state.borrow_mut();
            state.loaded.retain(|doc| doc.id != id);
            if state.current.as_ref().is_some_and(|doc| doc.id == id) {
                state.current = None;
            }
            state.reselect();
        }
        log::info!("deleted document {id}");
        self.emit();
        Ok(())
    }

    fn owner(&self) -> Result<Uuid, StoreError> {
        self.inner.state.borrow().owner.ok_or(StoreError::NotSignedIn)
    }

    fn report<T>(&self, operation: &str, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if let Err(err) = &result {
            log::warn!("{operation} failed: {err}");
            self.inner
                .notifier
                .notify(ToastLevel::Error, format!("Could not {operation}: {err}"));
        }
        result
    }

    fn set_loading(&self, loading: bool) {
        self.inner.state.borrow_mut().loading = loading;
        self.emit();
    }

    fn emit(&self) {
        self.inner.listeners.emit(&());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::clock::ManualClock;
    use crate::error::BackendError;
    use crate::model::DEFAULT_TITLE;
    use crate::notify::RecordingNotifier;
    use chrono::Duration;
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;

    struct Fixture {
        clock: Rc<ManualClock>,
        backend: Rc<MemoryBackend>,
        notifier: Rc<RecordingNotifier>,
        store: DocumentStore,
        owner: Uuid,
    }

    fn fixture() -> Fixture {
        let clock = Rc::new(ManualClock::at_millis(1_700_000_000_000));
        let backend = Rc::new(MemoryBackend::new(clock.clone()));
        let notifier = Rc::new(RecordingNotifier::default());
        let store = DocumentStore::new(backend.clone(), notifier.clone(), clock.clone());
        Fixture {
            clock,
            backend,
            notifier,
            store,
            owner: Uuid::new_v4(),
        }
    }

    impl Fixture {
        fn seed(&self, title: &str, tags: &[&str], owner: Uuid) -> Document {
            self.clock.advance(Duration::seconds(1));
            let mut doc = Document::new(owner, self.clock.now());
            doc.title = title.to_string();
            doc.tags = tags.iter().map(|t| t.to_string()).collect();
            self.backend.insert(doc.clone());
            doc
        }

        fn sign_in(&self) {
            block_on(self.store.set_owner(Some(self.owner)));
        }

        fn titles(&self) -> Vec<String> {
            self.store.documents().into_iter().map(|d| d.title).collect()
        }
    }

    #[test]
    fn created_document_is_first_and_current() {
        let f = fixture();
        f.seed("Older", &[], f.owner);
        f.sign_in();
        f.clock.advance(Duration::seconds(5));

        let created = block_on(f.store.create_document()).unwrap();
        assert_eq!(created.title, DEFAULT_TITLE);
        assert_eq!(f.titles(), vec![DEFAULT_TITLE.to_string(), "Older".to_string()]);
        assert_eq!(f.store.current_id(), Some(created.id));
        assert!(!f.store.loading());
    }

    #[test]
    fn tag_filter_keeps_documents_with_the_tag() {
        let f = fixture();
        f.seed("none", &[], f.owner);
        f.seed("work", &["work"], f.owner);
        f.seed("both", &["home", "work"], f.owner);
        f.sign_in();
        assert_eq!(f.store.known_tags(), vec!["home".to_string(), "work".to_string()]);

        block_on(f.store.set_tag_filter(vec!["work".into()])).unwrap();
        assert_eq!(f.titles(), vec!["both".to_string(), "work".to_string()]);

        block_on(f.store.toggle_tag("work")).unwrap();
        assert_eq!(f.titles().len(), 3);
    }

    #[test]
    fn foreign_rows_never_reach_the_list() {
        let f = fixture();
        let stranger = Uuid::new_v4();
        f.seed("mine", &[], f.owner);
        f.seed("theirs", &[], stranger);
        f.seed("also mine", &[], f.owner);
        f.backend.leak_foreign_rows.set(true);
        f.sign_in();

        assert_eq!(f.titles(), vec!["also mine".to_string(), "mine".to_string()]);
        assert!(f.store.documents().iter().all(|d| d.user_id == f.owner));
    }

    #[test]
    fn text_query_reloads_from_backend() {
        let f = fixture();
        f.seed("Groceries", &[], f.owner);
        f.seed("Rust notes", &[], f.owner);
        f.sign_in();
        let calls = f.backend.list_calls.get();

        block_on(f.store.set_query("rust")).unwrap();
        assert_eq!(f.backend.list_calls.get(), calls + 1);
        assert_eq!(f.titles(), vec!["Rust notes".to_string()]);
        assert_eq!(f.store.current().map(|d| d.title), Some("Rust notes".to_string()));
    }

    #[test]
    fn failed_filter_reload_keeps_previous_filters_and_list() {
        let f = fixture();
        f.seed("work", &["work"], f.owner);
        f.seed("plain", &[], f.owner);
        f.sign_in();
        let before = f.store.current();
        assert_eq!(before.as_ref().map(|d| d.title.as_str()), Some("plain"));

        *f.backend.fail_next.borrow_mut() = Some(BackendError::Network("offline".into()));
        assert!(block_on(f.store.set_tag_filter(vec!["work".into()])).is_err());
        assert_eq!(f.titles(), vec!["plain".to_string(), "work".to_string()]);
        assert!(f.store.selected_tags().is_empty());
        assert_eq!(f.store.current(), before);
        assert!(f.store.documents().iter().any(|d| Some(d.id) == f.store.current_id()));

        *f.backend.fail_next.borrow_mut() = Some(BackendError::Network("offline".into()));
        assert!(block_on(f.store.set_query("work")).is_err());
        assert_eq!(f.store.query(), "");
        assert_eq!(f.titles().len(), 2);
        assert_eq!(f.notifier.errors().len(), 2);
    }

    #[test]
    fn selection_falls_back_when_current_is_filtered_out() {
        let f = fixture();
        let plain = f.seed("plain", &[], f.owner);
        f.seed("tagged", &["work"], f.owner);
        f.sign_in();
        assert!(f.store.select(plain.id));

        block_on(f.store.set_tag_filter(vec!["work".into()])).unwrap();
        assert_eq!(f.store.current().map(|d| d.title), Some("tagged".to_string()));

        block_on(f.store.set_tag_filter(vec!["missing".into()])).unwrap();
        assert_eq!(f.store.current(), None);
    }

    #[test]
    fn update_merges_provided_fields_and_reselects() {
        let f = fixture();
        let doc = f.seed("Plan", &["work"], f.owner);
        f.sign_in();
        f.clock.advance(Duration::seconds(3));

        let saved = block_on(f.store.update_current(DocumentPatch::content("# Plan v2"))).unwrap();
        assert_eq!(saved.title, "Plan");
        assert_eq!(saved.tags, vec!["work".to_string()]);
        assert_eq!(saved.content, "# Plan v2");
        assert_eq!(saved.updated_at, f.clock.now());
        assert_eq!(f.store.current(), Some(saved.clone()));

        let retitled = block_on(f.store.update_current(
            DocumentPatch::content("# Plan v2")
                .with_title("Roadmap")
                .with_tags(vec!["work".into(), "q3".into()]),
        ))
        .unwrap();
        assert_eq!(retitled.id, doc.id);
        assert_eq!(retitled.title, "Roadmap");
        assert!(f.store.known_tags().contains(&"q3".to_string()));
    }

    #[test]
    fn failed_save_leaves_state_and_notifies() {
        let f = fixture();
        f.seed("Plan", &[], f.owner);
        f.sign_in();
        let before = f.store.current();

        *f.backend.fail_next.borrow_mut() = Some(BackendError::Network("offline".into()));
        let err = block_on(f.store.update_current(DocumentPatch::content("lost"))).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(f.store.current(), before);
        assert!(!f.store.loading());
        assert_eq!(f.notifier.errors().len(), 1);
    }

    #[test]
    fn delete_reselects_first_remaining() {
        let f = fixture();
        f.seed("first", &[], f.owner);
        f.seed("second", &[], f.owner);
        let newest = f.seed("third", &[], f.owner);
        f.sign_in();
        assert_eq!(f.store.current_id(), Some(newest.id));

        block_on(f.store.delete_current()).unwrap();
        assert_eq!(f.titles(), vec!["second".to_string(), "first".to_string()]);
        assert_eq!(f.store.current().map(|d| d.title), Some("second".to_string()));
    }

    #[test]
    fn failed_delete_keeps_document() {
        let f = fixture();
        f.seed("keep me", &[], f.owner);
        f.sign_in();
        *f.backend.fail_next.borrow_mut() = Some(BackendError::Status {
            status: 500,
            code: None,
            message: "boom".into(),
        });
        assert!(block_on(f.store.delete_current()).is_err());
        assert_eq!(f.titles(), vec!["keep me".to_string()]);
        assert_eq!(f.notifier.errors(), vec!["Could not delete document: boom".to_string()]);
    }

    #[test]
    fn import_creates_tagged_document() {
        let f = fixture();
        f.sign_in();
        let doc = block_on(f.store.import_document("meeting-notes.md", "# Notes".into())).unwrap();
        assert_eq!(doc.title, "meeting-notes");
        assert_eq!(doc.tags, vec![IMPORTED_TAG.to_string()]);
        assert_eq!(doc.content, "# Notes");
        assert_eq!(f.store.current_id(), Some(doc.id));
    }

    #[test]
    fn rename_rejects_empty_title() {
        let f = fixture();
        let doc = f.seed("Keep", &[], f.owner);
        f.sign_in();
        let err = block_on(f.store.rename(doc.id, "   ")).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(f.titles(), vec!["Keep".to_string()]);

        block_on(f.store.rename(doc.id, "Renamed")).unwrap();
        assert_eq!(f.titles(), vec!["Renamed".to_string()]);
    }

    #[test]
    fn operations_without_user_fail_visibly() {
        let f = fixture();
        assert_eq!(
            block_on(f.store.create_document()).unwrap_err(),
            StoreError::NotSignedIn
        );
        assert_eq!(f.notifier.errors().len(), 1);
        assert!(f.store.documents().is_empty());
    }

    #[test]
    fn switching_owner_drops_previous_documents_but_keeps_preferences() {
        let f = fixture();
        f.seed("mine", &[], f.owner);
        f.sign_in();
        f.store.update_preferences(|prefs| prefs.font_size = 200);
        assert_eq!(f.store.preferences().font_size, crate::model::MAX_FONT_SIZE);

        block_on(f.store.set_owner(None));
        assert!(f.store.documents().is_empty());
        assert!(f.store.current().is_none());
        assert_eq!(f.store.preferences().font_size, crate::model::MAX_FONT_SIZE);
    }
}
