//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! login/register/OAuth response
//!     → token.rs decodes claims (no signature check) and checks expiry
//!     → store.rs merges profile, persists through storage.rs, broadcasts
//!
//! Executor
//!     → store.rs token_for_request() for the Authorization header
//!     → on 401: store.rs logout(SessionExpired)
//! ```

pub mod storage;
pub mod store;
pub mod token;

pub use storage::{FileStorage, MemoryStorage, SessionStorage, StorageError};
pub use store::{
    ProfileHint, Session, SessionEndReason, SessionEvent, SessionStore, UserProfile, SESSION_KEY,
};
