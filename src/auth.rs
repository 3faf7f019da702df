//! Session collaborator used to authenticate requests and the realtime socket.

use async_trait::async_trait;
use color_eyre::Result;

/// Source of the caller's session.
#[async_trait]
pub trait AuthProvider: Send + Sync {
  /// Whether a session is currently established.
  fn is_authenticated(&self) -> bool;

  /// Current bearer token, if the session has one.
  async fn session_token(&self) -> Result<Option<String>>;
}

/// No session: requests go out without an `Authorization` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

#[async_trait]
impl AuthProvider for Anonymous {
  fn is_authenticated(&self) -> bool {
    false
  }

  async fn session_token(&self) -> Result<Option<String>> {
    Ok(None)
  }
}

/// A fixed token obtained out of band (e.g. from the environment).
#[derive(Clone)]
pub struct StaticToken {
  token: String,
}

impl StaticToken {
  pub fn new(token: impl Into<String>) -> Self {
    Self {
      token: token.into(),
    }
  }
}

impl std::fmt::Debug for StaticToken {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StaticToken").finish_non_exhaustive()
  }
}

#[async_trait]
impl AuthProvider for StaticToken {
  fn is_authenticated(&self) -> bool {
    !self.token.is_empty()
  }

  async fn session_token(&self) -> Result<Option<String>> {
    if self.token.is_empty() {
      Ok(None)
    } else {
      Ok(Some(self.token.clone()))
    }
  }
}
