use std::cell::RefCell;
use std::rc::{Rc, Weak};

use chrono::{DateTime, Duration, Utc};

use crate::backend::{AuthChange, AuthService};
use crate::clock::Clock;
use crate::error::{AuthError, BackendError};
use crate::listeners::{Listeners, Subscription};
use crate::model::{Session, User};
use crate::storage::{
    get_millis, set_millis, KeyValueStore, LAST_SIGN_IN_KEY, LAST_SIGN_UP_KEY,
    RATE_LIMITED_AT_KEY, RATE_LIMITED_KEY,
};

/// Minimum spacing between two attempts of the same kind.
pub const AUTH_COOLDOWN_MS: i64 = 3_000;
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttemptKind {
    SignIn,
    SignUp,
}

impl AttemptKind {
    fn storage_key(self) -> &'static str {
        match self {
            AttemptKind::SignIn => LAST_SIGN_IN_KEY,
            AttemptKind::SignUp => LAST_SIGN_UP_KEY,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn,
    ConfirmationRequired,
}

#[derive(Default)]
struct SessionState {
    session: Option<Session>,
    loading: bool,
}

struct Inner {
    auth: Rc<dyn AuthService>,
    storage: Rc<dyn KeyValueStore>,
    clock: Rc<dyn Clock>,
    state: RefCell<SessionState>,
    subscription: RefCell<Option<Subscription>>,
    listeners: Listeners<()>,
}

/// Read-through cache of the signed-in user plus the auth operations.
#[derive(Clone)]
pub struct SessionStore {
    inner: Rc<Inner>,
}

impl SessionStore {
    pub fn new(
        auth: Rc<dyn AuthService>,
        storage: Rc<dyn KeyValueStore>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                auth,
                storage,
                clock,
                state: RefCell::new(SessionState::default()),
                subscription: RefCell::new(None),
                listeners: Listeners::new(),
            }),
        }
    }

    /// Seeds the cache from the auth service and subscribes to its session
    /// changes. Calling it again is a no-op until `teardown`.
    pub fn init(&self) {
        if self.inner.subscription.borrow().is_some() {
            return;
        }
        self.apply_session(self.inner.auth.current_session());
        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        let subscription = self.inner.auth.subscribe(Box::new(move |change: &AuthChange| {
            if let Some(inner) = weak.upgrade() {
                log::debug!("auth change: {:?}", change.event);
                SessionStore { inner }.apply_session(change.session.clone());
            }
        }));
        *self.inner.subscription.borrow_mut() = Some(subscription);
    }

    pub fn teardown(&self) {
        let subscription = self.inner.subscription.borrow_mut().take();
        drop(subscription);
    }

    pub fn subscribe(&self, listener: impl Fn() + 'static) -> Subscription {
        self.inner.listeners.subscribe(move |_| listener())
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.state.borrow().session.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.inner
            .state
            .borrow()
            .session
            .as_ref()
            .map(|session| session.user.clone())
    }

    pub fn loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    /// When the last rate-limited response was seen, if it has not been
    /// cleared by a successful sign-in since.
    pub fn rate_limit_hint(&self) -> Option<DateTime<Utc>> {
        let storage = self.inner.storage.as_ref();
        if storage.get(RATE_LIMITED_KEY).as_deref() != Some("true") {
            return None;
        }
        get_millis(storage, RATE_LIMITED_AT_KEY).and_then(DateTime::from_timestamp_millis)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let email = validate_credentials(email, password)?;
        self.set_loading(true);
        self.wait_for_cooldown(AttemptKind::SignIn).await;
        let result = self.inner.auth.sign_in(&email, password).await;
        self.set_loading(false);
        match result {
            Ok(session) => {
                self.clear_rate_limited();
                log::info!("signed in as {}", session.user.id);
                self.apply_session(Some(session));
                Ok(())
            }
            Err(err) => Err(self.fail("sign-in", err)),
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let email = validate_credentials(email, password)?;
        self.set_loading(true);
        self.wait_for_cooldown(AttemptKind::SignUp).await;
        let result = self.inner.auth.sign_up(&email, password).await;
        self.set_loading(false);
        match result {
            Ok(Some(session)) => {
                log::info!("registered and signed in as {}", session.user.id);
                self.apply_session(Some(session));
                Ok(SignUpOutcome::SignedIn)
            }
            Ok(None) => Ok(SignUpOutcome::ConfirmationRequired),
            Err(err) => Err(self.fail("sign-up", err)),
        }
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.set_loading(true);
        let result = self.inner.auth.sign_out().await;
        self.set_loading(false);
        match result {
            Ok(()) => {
                self.apply_session(None);
                Ok(())
            }
            Err(err) => Err(self.fail("sign-out", err)),
        }
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        let email = validate_email(email)?;
        self.set_loading(true);
        let result = self.inner.auth.reset_password(&email).await;
        self.set_loading(false);
        result.map_err(|err| self.fail("password reset", err))
    }

    async fn wait_for_cooldown(&self, kind: AttemptKind) {
        let storage = self.inner.storage.as_ref();
        let now = self.inner.clock.now().timestamp_millis();
        if let Some(last) = get_millis(storage, kind.storage_key()) {
            let elapsed = now - last;
            if (0..AUTH_COOLDOWN_MS).contains(&elapsed) {
                let wait = AUTH_COOLDOWN_MS - elapsed;
                log::debug!("{kind:?} attempted {elapsed}ms ago, waiting {wait}ms");
                self.inner.clock.sleep(Duration::milliseconds(wait)).await;
            }
        }
        set_millis(
            storage,
            kind.storage_key(),
            self.inner.clock.now().timestamp_millis(),
        );
    }

    fn fail(&self, operation: &str, err: BackendError) -> AuthError {
        if err.is_rate_limited() {
            let storage = self.inner.storage.as_ref();
            storage.set(RATE_LIMITED_KEY, "true");
            set_millis(
                storage,
                RATE_LIMITED_AT_KEY,
                self.inner.clock.now().timestamp_millis(),
            );
        }
        log::warn!("{operation} failed: {err}");
        AuthError::from(err)
    }

    fn clear_rate_limited(&self) {
        self.inner.storage.remove(RATE_LIMITED_KEY);
        self.inner.storage.remove(RATE_LIMITED_AT_KEY);
    }

    fn apply_session(&self, session: Option<Session>) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.session == session {
                return;
            }
            state.session = session;
        }
        self.inner.listeners.emit(&());
    }

    fn set_loading(&self, loading: bool) {
        self.inner.state.borrow_mut().loading = loading;
        self.inner.listeners.emit(&());
    }
}

fn validate_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::Validation("Email is required.".to_string()));
    }
    Ok(email.to_string())
}

/// Returns the trimmed email.
pub fn validate_credentials(email: &str, password: &str) -> Result<String, AuthError> {
    let email = validate_email(email)?;
    if password.is_empty() {
        return Err(AuthError::Validation("Password is required.".to_string()));
    }
    Ok(email)
}

pub fn validate_sign_up(email: &str, password: &str, confirm: &str) -> Result<String, AuthError> {
    let email = validate_credentials(email, password)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters."
        )));
    }
    if password != confirm {
        return Err(AuthError::Validation("Passwords do not match.".to_string()));
    }
    Ok(email)
}
