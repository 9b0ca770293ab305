use leptos::prelude::{LocalStorage, StoredValue};

pub mod auth;
pub mod editor;
pub mod find_bar;
pub mod preview;
pub mod settings;
pub mod sidebar;
pub mod toast;

/// Handle to a single-threaded value (stores, timers) owned by the
/// reactive tree. `Copy`, so view closures can capture it.
pub type Local<T> = StoredValue<T, LocalStorage>;
