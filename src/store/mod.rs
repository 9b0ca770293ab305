//! Application state containers. Both stores are cheap to clone handles
//! over shared single-threaded state and are passed to components
//! explicitly.

pub mod documents;
pub mod session;

pub use documents::DocumentStore;
pub use session::{SessionStore, SignUpOutcome};
