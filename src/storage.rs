use std::cell::RefCell;
use std::collections::HashMap;

pub const SESSION_KEY: &str = "markpad.auth.session";
pub const LAST_SIGN_IN_KEY: &str = "markpad.auth.last_sign_in";
pub const LAST_SIGN_UP_KEY: &str = "markpad.auth.last_sign_up";
pub const RATE_LIMITED_KEY: &str = "markpad.auth.rate_limited";
pub const RATE_LIMITED_AT_KEY: &str = "markpad.auth.rate_limited_at";

/// Client-local string key/value persistence.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// `window.localStorage`. Writes are best-effort: quota or privacy-mode
/// failures are logged and otherwise ignored.
pub struct BrowserStorage {
    storage: web_sys::Storage,
}

impl BrowserStorage {
    pub fn open() -> Option<Self> {
        let storage = web_sys::window()?.local_storage().ok().flatten()?;
        Some(Self { storage })
    }
}

impl KeyValueStore for BrowserStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.storage.get_item(key).ok().flatten()
    }

    fn set(&self, key: &str, value: &str) {
        if self.storage.set_item(key, value).is_err() {
            log::warn!("localStorage rejected write for {key}");
        }
    }

    fn remove(&self, key: &str) {
        let _ = self.storage.remove_item(key);
    }
}

/// Process-local fallback when `localStorage` is unavailable; also used in
/// tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

pub fn get_millis(store: &dyn KeyValueStore, key: &str) -> Option<i64> {
    store.get(key)?.trim().parse().ok()
}

pub fn set_millis(store: &dyn KeyValueStore, key: &str, millis: i64) {
    store.set(key, &millis.to_string());
}
