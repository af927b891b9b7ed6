//! Authentication hook.
//!
//! Laneforge doesn't verify credentials itself. The Coordinator hands the
//! token from an `AUTHENTICATE` message to an [`Authenticator`] and binds
//! the connection to whatever account comes back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use laneforge_protocol::AccountInfo;

use crate::SessionError;

/// Validates a client's token and returns the account behind it.
///
/// Called on the Coordinator thread, once per `AUTHENTICATE`. The call
/// blocks that thread, so implementations backed by a remote service
/// should cache or answer from local state.
///
/// # Example
///
/// ```rust
/// use laneforge_protocol::AccountInfo;
/// use laneforge_session::{Authenticator, SessionError};
///
/// /// Accepts numeric tokens and uses them as the account id.
/// struct NumericTokens;
///
/// impl Authenticator for NumericTokens {
///     fn authenticate(&self, token: &str) -> Result<AccountInfo, SessionError> {
///         let account_id: u64 = token
///             .parse()
///             .map_err(|_| SessionError::AuthFailed("token must be a number".into()))?;
///         Ok(AccountInfo {
///             account_id,
///             nickname: format!("player{account_id}"),
///         })
///     }
/// }
///
/// assert!(NumericTokens.authenticate("42").is_ok());
/// assert!(NumericTokens.authenticate("abc").is_err());
/// ```
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(&self, token: &str) -> Result<AccountInfo, SessionError>;
}

/// Accepts every non-empty token. Development only.
///
/// The token becomes the nickname; account ids are handed out in order.
#[derive(Debug, Default)]
pub struct AllowAll {
    next_id: AtomicU64,
}

impl Authenticator for AllowAll {
    fn authenticate(&self, token: &str) -> Result<AccountInfo, SessionError> {
        if token.is_empty() {
            return Err(SessionError::AuthFailed("empty token".into()));
        }
        Ok(AccountInfo {
            account_id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            nickname: token.to_owned(),
        })
    }
}

/// A fixed table of tokens, for demos and tests.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    accounts: HashMap<String, AccountInfo>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(
        mut self,
        token: impl Into<String>,
        account_id: u64,
        nickname: impl Into<String>,
    ) -> Self {
        self.accounts.insert(
            token.into(),
            AccountInfo {
                account_id,
                nickname: nickname.into(),
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl Authenticator for TokenTable {
    fn authenticate(&self, token: &str) -> Result<AccountInfo, SessionError> {
        self.accounts
            .get(token)
            .cloned()
            .ok_or_else(|| SessionError::AuthFailed("unknown token".into()))
    }
}
