//! Session lifecycle: persistent cookie storage and liveness management.

mod manager;
mod store;

pub use manager::{SessionManager, SessionState};
pub use store::SessionStore;
