//! In-memory backend used by the store tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AuthChange, AuthEvent, AuthService, DocumentService};
use crate::clock::Clock;
use crate::error::BackendError;
use crate::listeners::{Listeners, Subscription};
use crate::model::{Document, DocumentQuery, Session, User};

pub struct MemoryBackend {
    clock: Rc<dyn Clock>,
    pub documents: RefCell<Vec<Document>>,
    session: RefCell<Option<Session>>,
    listeners: Listeners<AuthChange>,
    /// Next call fails with this error.
    pub fail_next: RefCell<Option<BackendError>>,
    /// Ignore the owner filter on `list`, like a misconfigured policy.
    pub leak_foreign_rows: Cell<bool>,
    pub sign_in_calls: RefCell<Vec<DateTime<Utc>>>,
    pub sign_up_calls: RefCell<Vec<DateTime<Utc>>>,
    pub list_calls: Cell<usize>,
}

impl MemoryBackend {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            documents: RefCell::new(Vec::new()),
            session: RefCell::new(None),
            listeners: Listeners::new(),
            fail_next: RefCell::new(None),
            leak_foreign_rows: Cell::new(false),
            sign_in_calls: RefCell::new(Vec::new()),
            sign_up_calls: RefCell::new(Vec::new()),
            list_calls: Cell::new(0),
        }
    }

    pub fn session_for(user_id: Uuid) -> Session {
        Session {
            access_token: format!("token-{user_id}"),
            refresh_token: None,
            expires_at: None,
            user: User {
                id: user_id,
                email: Some("writer@example.com".to_string()),
            },
        }
    }

    /// Sets the session and notifies subscribers, as a push from the auth
    /// service would.
    pub fn push_session(&self, session: Option<Session>) {
        let event = if session.is_some() {
            AuthEvent::SignedIn
        } else {
            AuthEvent::SignedOut
        };
        *self.session.borrow_mut() = session.clone();
        self.listeners.emit(&AuthChange { event, session });
    }

    pub fn insert(&self, document: Document) {
        self.documents.borrow_mut().push(document);
    }

    fn take_failure(&self) -> Result<(), BackendError> {
        match self.fail_next.borrow_mut().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait(?Send)]
impl AuthService for MemoryBackend {
    async fn sign_up(&self, email: &str, _password: &str) -> Result<Option<Session>, BackendError> {
        self.sign_up_calls.borrow_mut().push(self.clock.now());
        self.take_failure()?;
        if email.starts_with("confirm") {
            return Ok(None);
        }
        let session = Self::session_for(Uuid::new_v4());
        self.push_session(Some(session.clone()));
        Ok(Some(session))
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<Session, BackendError> {
        self.sign_in_calls.borrow_mut().push(self.clock.now());
        self.take_failure()?;
        let session = Self::session_for(Uuid::new_v4());
        self.push_session(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.take_failure()?;
        self.push_session(None);
        Ok(())
    }

    async fn reset_password(&self, _email: &str) -> Result<(), BackendError> {
        self.take_failure()
    }

    fn current_session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    fn subscribe(&self, listener: Box<dyn Fn(&AuthChange)>) -> Subscription {
        self.listeners.subscribe(move |change| listener(change))
    }
}

#[async_trait(?Send)]
impl DocumentService for MemoryBackend {
    async fn list(&self, query: &DocumentQuery) -> Result<Vec<Document>, BackendError> {
        self.list_calls.set(self.list_calls.get() + 1);
        self.take_failure()?;
        let mut rows: Vec<Document> = self
            .documents
            .borrow()
            .iter()
            .filter(|doc| self.leak_foreign_rows.get() || doc.user_id == query.owner)
            .filter(|doc| query.matches_text(doc))
            .filter(|doc| doc.has_tags(&query.tags))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rows)
    }

    async fn upsert(&self, document: &Document) -> Result<Document, BackendError> {
        self.take_failure()?;
        let mut documents = self.documents.borrow_mut();
        match documents.iter_mut().find(|doc| doc.id == document.id) {
            Some(existing) => *existing = document.clone(),
            None => documents.push(document.clone()),
        }
        Ok(document.clone())
    }

    async fn delete(&self, id: Uuid, owner: Uuid) -> Result<bool, BackendError> {
        self.take_failure()?;
        let mut documents = self.documents.borrow_mut();
        let before = documents.len();
        documents.retain(|doc| !(doc.id == id && doc.user_id == owner));
        Ok(documents.len() != before)
    }
}
