use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

/// An authenticated user.
///
/// Passed explicitly to every favorites operation; there is no ambient
/// "current user". The token is whatever the favorites store accepts as
/// proof of sign-in and is masked in `Debug` output.
#[derive(Clone)]
pub struct Session {
    user_id: Arc<str>,
    token: Arc<SecretString>,
}

impl Session {
    pub fn new(user_id: impl Into<Arc<str>>, token: SecretString) -> Self {
        Self {
            user_id: user_id.into(),
            token: Arc::new(token),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }

    pub(crate) fn token_matches(&self, other: &str) -> bool {
        self.token.expose_secret() == other
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
