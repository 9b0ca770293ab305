//! Contracts for the hosted backend, plus the Supabase REST client that
//! implements them.

pub mod supabase;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::BackendError;
use crate::listeners::Subscription;
use crate::model::{Document, DocumentQuery, Session};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    PasswordRecovery,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

#[async_trait(?Send)]
pub trait AuthService {
    /// `Ok(None)` when the account was created but needs email confirmation.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, BackendError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError>;
    async fn sign_out(&self) -> Result<(), BackendError>;
    async fn reset_password(&self, email: &str) -> Result<(), BackendError>;
    fn current_session(&self) -> Option<Session>;
    fn subscribe(&self, listener: Box<dyn Fn(&AuthChange)>) -> Subscription;
}

#[async_trait(?Send)]
pub trait DocumentService {
    /// Rows matching `query`, most recently updated first.
    async fn list(&self, query: &DocumentQuery) -> Result<Vec<Document>, BackendError>;
    async fn upsert(&self, document: &Document) -> Result<Document, BackendError>;
    async fn delete(&self, id: Uuid, owner: Uuid) -> Result<bool, BackendError>;
}
