#![allow(missing_docs)]

//! Authenticated identity: who is signed in, persisted across restarts.

mod manager;
mod models;

pub(crate) use manager::EMAIL_PATTERN;
pub use manager::{LoginOutcome, SessionError, SessionManager, ROLE_KEY, TOKEN_KEY, USER_KEY};
pub use models::{Access, AccessDenied, Role, Session, SessionPhase, User};
