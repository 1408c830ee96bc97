//! Caller session context
//!
//! The hosted platform's auth provider issues the session; this module
//! only carries the authenticated identity into store operations.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// ID of the signed-in user
    pub user_id: String,
    /// Display name of the signed-in user
    pub display_name: String,
}

impl Session {
    /// Create a session for a signed-in user
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Require a session, failing with `NotAuthenticated` when absent
pub fn require_session(session: Option<&Session>) -> Result<&Session> {
    session.ok_or(Error::NotAuthenticated)
}
