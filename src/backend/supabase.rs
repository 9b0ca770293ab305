use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{AuthChange, AuthEvent, AuthService, DocumentService};
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::BackendError;
use crate::listeners::{Listeners, Subscription};
use crate::model::{Document, DocumentQuery, Session, User};
use crate::storage::{KeyValueStore, SESSION_KEY};

const DOCUMENTS_TABLE: &str = "documents";

/// REST client for a Supabase project: GoTrue for auth, PostgREST for the
/// `documents` table. Holds the current session and persists it in
/// client-local storage so a reload stays signed in.
pub struct SupabaseClient {
    http: reqwest::Client,
    config: AppConfig,
    storage: Rc<dyn KeyValueStore>,
    clock: Rc<dyn Clock>,
    session: RefCell<Option<Session>>,
    listeners: Listeners<AuthChange>,
}

impl SupabaseClient {
    pub fn new(config: AppConfig, storage: Rc<dyn KeyValueStore>, clock: Rc<dyn Clock>) -> Self {
        let session = storage
            .get(SESSION_KEY)
            .and_then(|raw| match serde_json::from_str::<Session>(&raw) {
                Ok(session) => Some(session),
                Err(err) => {
                    log::warn!("discarding unreadable persisted session: {err}");
                    None
                }
            });
        Self {
            http: reqwest::Client::new(),
            config,
            storage,
            clock,
            session: RefCell::new(session),
            listeners: Listeners::new(),
        }
    }

    /// Exchanges the refresh token when the persisted session has expired.
    /// A failed refresh signs the user out locally.
    pub async fn refresh_if_expired(&self) {
        let Some(current) = self.current_session() else {
            return;
        };
        if !current.is_expired(self.clock.now()) {
            return;
        }
        let Some(refresh_token) = current.refresh_token else {
            self.set_session(None, AuthEvent::SignedOut);
            return;
        };
        log::debug!("access token expired, refreshing");
        match self.refresh(&refresh_token).await {
            Ok(session) => self.set_session(Some(session), AuthEvent::TokenRefreshed),
            Err(err) => {
                log::warn!("session refresh failed: {err}");
                self.set_session(None, AuthEvent::SignedOut);
            }
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let response = self
            .anon(self.http.post(self.config.auth_url("token")))
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let token: TokenResponse = check(response).await?.json().await?;
        Ok(token.into_session(self.clock.now()))
    }

    fn set_session(&self, session: Option<Session>, event: AuthEvent) {
        match &session {
            Some(session) => match serde_json::to_string(session) {
                Ok(raw) => self.storage.set(SESSION_KEY, &raw),
                Err(err) => log::warn!("could not persist session: {err}"),
            },
            None => self.storage.remove(SESSION_KEY),
        }
        *self.session.borrow_mut() = session.clone();
        self.listeners.emit(&AuthChange { event, session });
    }

    fn anon(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", self.config.supabase_anon_key.as_str())
    }

    async fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder, BackendError> {
        self.refresh_if_expired().await;
        let token = self
            .session
            .borrow()
            .as_ref()
            .map(|session| session.access_token.clone())
            .ok_or(BackendError::NotSignedIn)?;
        Ok(self.anon(builder).bearer_auth(token))
    }
}

#[async_trait(?Send)]
impl AuthService for SupabaseClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, BackendError> {
        let response = self
            .anon(self.http.post(self.config.auth_url("signup")))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body: serde_json::Value = check(response).await?.json().await?;
        if body.get("access_token").is_none() {
            log::info!("sign-up accepted, waiting for email confirmation");
            return Ok(None);
        }
        let token: TokenResponse = serde_json::from_value(body)?;
        let session = token.into_session(self.clock.now());
        self.set_session(Some(session.clone()), AuthEvent::SignedIn);
        Ok(Some(session))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let response = self
            .anon(self.http.post(self.config.auth_url("token")))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let token: TokenResponse = check(response).await?.json().await?;
        let session = token.into_session(self.clock.now());
        self.set_session(Some(session.clone()), AuthEvent::SignedIn);
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let token = self
            .session
            .borrow()
            .as_ref()
            .map(|session| session.access_token.clone());
        if let Some(token) = token {
            let result = self
                .anon(self.http.post(self.config.auth_url("logout")))
                .bearer_auth(token)
                .send()
                .await;
            match result {
                Ok(response) => {
                    if let Err(err) = check(response).await {
                        log::warn!("server-side sign-out failed: {err}");
                    }
                }
                Err(err) => log::warn!("server-side sign-out failed: {err}"),
            }
        }
        self.set_session(None, AuthEvent::SignedOut);
        Ok(())
    }

    async fn reset_password(&self, email: &str) -> Result<(), BackendError> {
        let response = self
            .anon(self.http.post(self.config.auth_url("recover")))
            .json(&json!({ "email": email }))
            .send()
            .await?;
        check(response).await?;
        self.listeners.emit(&AuthChange {
            event: AuthEvent::PasswordRecovery,
            session: self.current_session(),
        });
        Ok(())
    }

    fn current_session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    fn subscribe(&self, listener: Box<dyn Fn(&AuthChange)>) -> Subscription {
        self.listeners.subscribe(move |change| listener(change))
    }
}

#[async_trait(?Send)]
impl DocumentService for SupabaseClient {
    async fn list(&self, query: &DocumentQuery) -> Result<Vec<Document>, BackendError> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", query.owner)),
            ("order", "updated_at.desc".to_string()),
        ];
        if let Some(text) = &query.text {
            params.push(("or", text_filter(text)));
        }
        if !query.tags.is_empty() {
            params.push(("tags", tags_filter(&query.tags)));
        }
        let builder = self
            .authed(self.http.get(self.config.rest_url(DOCUMENTS_TABLE)))
            .await?
            .query(&params);
        let documents: Vec<Document> = check(builder.send().await?).await?.json().await?;
        log::debug!("listed {} documents", documents.len());
        Ok(documents)
    }

    async fn upsert(&self, document: &Document) -> Result<Document, BackendError> {
        let builder = self
            .authed(self.http.post(self.config.rest_url(DOCUMENTS_TABLE)))
            .await?
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(document);
        let mut saved: Vec<Document> = check(builder.send().await?).await?.json().await?;
        if saved.is_empty() {
            return Err(BackendError::Decode("upsert returned no rows".to_string()));
        }
        Ok(saved.swap_remove(0))
    }

    async fn delete(&self, id: Uuid, owner: Uuid) -> Result<bool, BackendError> {
        let builder = self
            .authed(self.http.delete(self.config.rest_url(DOCUMENTS_TABLE)))
            .await?
            .header("Prefer", "return=representation")
            .query(&[("id", format!("eq.{id}")), ("user_id", format!("eq.{owner}"))]);
        let deleted: Vec<Document> = check(builder.send().await?).await?.json().await?;
        Ok(!deleted.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| now.timestamp() + secs));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// The error shapes GoTrue and PostgREST return, merged.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(parse_error(status.as_u16(), &body))
}

fn parse_error(status: u16, body: &str) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.error_code.or_else(|| match parsed.code {
        Some(serde_json::Value::String(code)) => Some(code),
        _ => None,
    });
    let message = parsed
        .msg
        .or(parsed.error_description)
        .or(parsed.message)
        .or(parsed.error)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("request failed with status {status}")
            } else {
                body.trim().to_string()
            }
        });
    BackendError::Status {
        status,
        code,
        message,
    }
}

fn quote_filter_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Escapes `ilike` wildcards so user text matches literally. `*` is
/// PostgREST's spelling of `%`.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_' | '*') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// PostgREST `or=` filter: case-insensitive substring on title or content.
fn text_filter(text: &str) -> String {
    let pattern = quote_filter_value(&format!("*{}*", escape_like(text)));
    format!("(title.ilike.{pattern},content.ilike.{pattern})")
}

/// PostgREST array containment: every tag must be present.
fn tags_filter(tags: &[String]) -> String {
    let quoted: Vec<String> = tags.iter().map(|tag| quote_filter_value(tag)).collect();
    format!("cs.{{{}}}", quoted.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RawConfig;
    use crate::storage::MemoryStore;

    fn client(storage: Rc<MemoryStore>) -> SupabaseClient {
        let config = AppConfig::from_raw(RawConfig {
            supabase_url: Some("https://demo.supabase.co".into()),
            supabase_anon_key: Some("anon".into()),
            log_level: None,
        })
        .unwrap();
        SupabaseClient::new(config, storage, Rc::new(ManualClock::at_millis(0)))
    }

    #[test]
    fn builds_postgrest_filters() {
        assert_eq!(
            text_filter("a,b"),
            "(title.ilike.\"*a,b*\",content.ilike.\"*a,b*\")"
        );
        assert_eq!(escape_like("50%_a*b\\"), "50\\%\\_a\\*b\\\\");
        assert_eq!(
            text_filter("50%"),
            "(title.ilike.\"*50\\\\%*\",content.ilike.\"*50\\\\%*\")"
        );
        assert_eq!(
            tags_filter(&["work".into(), "say \"hi\"".into()]),
            "cs.{\"work\",\"say \\\"hi\\\"\"}"
        );
    }

    #[test]
    fn parses_gotrue_and_postgrest_errors() {
        let gotrue = parse_error(
            400,
            r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#,
        );
        assert_eq!(
            gotrue,
            BackendError::Status {
                status: 400,
                code: Some("invalid_credentials".into()),
                message: "Invalid login credentials".into(),
            }
        );

        let postgrest = parse_error(403, r#"{"code":"42501","message":"permission denied"}"#);
        assert_eq!(postgrest.status(), Some(403));
        assert_eq!(postgrest.to_string(), "permission denied");

        let empty = parse_error(502, "");
        assert_eq!(empty.to_string(), "request failed with status 502");
    }

    #[test]
    fn token_response_derives_expiry_from_expires_in() {
        let token: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","expires_in":3600,
                "user":{"id":"00000000-0000-0000-0000-000000000001","email":"me@x.io","role":"authenticated"}}"#,
        )
        .unwrap();
        let now = DateTime::from_timestamp(1_000, 0).unwrap();
        let session = token.into_session(now);
        assert_eq!(session.expires_at, Some(4_600));
        assert_eq!(session.user.email.as_deref(), Some("me@x.io"));
    }

    #[test]
    fn restores_persisted_session_and_ignores_garbage() {
        let storage = Rc::new(MemoryStore::new());
        let session = Session {
            access_token: "tok".into(),
            refresh_token: None,
            expires_at: None,
            user: User {
                id: Uuid::nil(),
                email: None,
            },
        };
        storage.set(SESSION_KEY, &serde_json::to_string(&session).unwrap());
        assert_eq!(client(storage.clone()).current_session(), Some(session));

        storage.set(SESSION_KEY, "{not json");
        assert_eq!(client(storage).current_session(), None);
    }
}
