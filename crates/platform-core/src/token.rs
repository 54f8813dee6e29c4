//! Single-use tokens binding a gate action to an exact, previously checked
//! subject (a proposal content hash or a task-set hash).
//!
//! Lifecycle: issued → consumed (irreversible) or expired (TTL, checked on
//! lookup). Consumed records are kept until they expire so a replay reports
//! `TokenAlreadyConsumed` rather than `TokenNotFound`. Records that expired
//! more than one TTL ago are pruned whenever a new token is issued.

use crate::error::{PlatformError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Issued by the design validator, redeemed by the registration gate.
    Validation,
    /// Issued by the critical-path analyzer, redeemed by the decision gate.
    Analysis,
}

impl TokenKind {
    fn prefix(&self) -> &'static str {
        match self {
            TokenKind::Validation => "valid",
            TokenKind::Analysis => "analysis",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token_id: String,
    pub kind: TokenKind,
    pub subject_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn status(&self, now: DateTime<Utc>) -> TokenStatus {
        if self.is_expired(now) {
            TokenStatus::Expired
        } else if self.consumed {
            TokenStatus::Consumed
        } else {
            TokenStatus::Live
        }
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status(now) == TokenStatus::Live
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Live,
    Consumed,
    Expired,
}

impl std::fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TokenStatus::Live => "live",
            TokenStatus::Consumed => "consumed",
            TokenStatus::Expired => "expired",
        })
    }
}

// ---------------------------------------------------------------------------
// Clock / IdSource
// ---------------------------------------------------------------------------

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub trait IdSource: Send + Sync {
    fn next_id(&self, kind: TokenKind) -> String;
}

/// `<kind-prefix>-<uuid v4, simple form>`: 122 random bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdSource;

impl IdSource for UuidIdSource {
    fn next_id(&self, kind: TokenKind) -> String {
        format!("{}-{}", kind.prefix(), uuid::Uuid::new_v4().simple())
    }
}

// ---------------------------------------------------------------------------
// TokenStore
// ---------------------------------------------------------------------------

/// Process-wide token state shared by the issuers and the gates.
///
/// `consume_if_unconsumed` is the only way to flip `consumed`; it performs
/// the whole check-and-set under one lock so two concurrent redemptions of
/// the same token cannot both succeed.
pub trait TokenStore: Send + Sync {
    /// Issue a token for `subject_hash`, or return the live one already
    /// issued for the same kind and subject.
    fn issue(&self, kind: TokenKind, subject_hash: &str) -> Result<Token>;

    /// Insert or replace a record as-is.
    fn put(&self, token: Token);

    fn get(&self, token_id: &str) -> Option<Token>;

    /// Check without consuming. Errors in order: not found (a token of
    /// another kind counts as not found), expired, consumed, wrong subject.
    fn check(&self, token_id: &str, kind: TokenKind, subject_hash: &str) -> Result<Token>;

    /// Same checks as [`check`](Self::check), then mark consumed, atomically.
    fn consume_if_unconsumed(
        &self,
        token_id: &str,
        kind: TokenKind,
        subject_hash: &str,
    ) -> Result<Token>;

    /// Current status of a token.
    fn status(&self, token_id: &str) -> Result<TokenStatus>;

    /// Drop every expired record. Returns how many were removed.
    fn sweep_expired(&self) -> usize;

    fn now(&self) -> DateTime<Utc>;
}

pub struct InMemoryTokenStore {
    tokens: Mutex<HashMap<String, Token>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
}

impl InMemoryTokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_sources(ttl, Arc::new(SystemClock), Arc::new(UuidIdSource))
    }

    pub fn with_sources(ttl: Duration, clock: Arc<dyn Clock>, ids: Arc<dyn IdSource>) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            ttl,
            clock,
            ids,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Token>> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn checked<'a>(
        tokens: &'a mut HashMap<String, Token>,
        now: DateTime<Utc>,
        token_id: &str,
        kind: TokenKind,
        subject_hash: &str,
    ) -> Result<&'a mut Token> {
        let token = tokens
            .get_mut(token_id)
            .filter(|t| t.kind == kind)
            .ok_or_else(|| PlatformError::TokenNotFound(token_id.to_string()))?;
        if token.is_expired(now) {
            return Err(PlatformError::TokenExpired(token_id.to_string()));
        }
        if token.consumed {
            return Err(PlatformError::TokenAlreadyConsumed(token_id.to_string()));
        }
        if token.subject_hash != subject_hash {
            return Err(PlatformError::TokenMismatch {
                token_id: token_id.to_string(),
            });
        }
        Ok(token)
    }

    /// Drop records that expired at least one TTL before `now`. Recently
    /// expired records stay so lookups still report `TokenExpired`.
    fn prune(&self, tokens: &mut HashMap<String, Token>, now: DateTime<Utc>) {
        let Some(cutoff) = now.checked_sub_signed(self.ttl) else {
            return;
        };
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at > cutoff);
        let pruned = before - tokens.len();
        if pruned > 0 {
            tracing::debug!(pruned, "expired tokens pruned");
        }
    }
}

impl TokenStore for InMemoryTokenStore {
    fn issue(&self, kind: TokenKind, subject_hash: &str) -> Result<Token> {
        let now = self.clock.now();
        let mut tokens = self.lock();
        self.prune(&mut tokens, now);
        if let Some(existing) = tokens
            .values()
            .find(|t| t.kind == kind && t.subject_hash == subject_hash && t.is_live(now))
        {
            return Ok(existing.clone());
        }
        let expires_at = now.checked_add_signed(self.ttl).ok_or_else(|| {
            PlatformError::InvalidConfig(format!(
                "token TTL of {}h puts expiry out of range",
                self.ttl.num_hours()
            ))
        })?;
        let token = Token {
            token_id: self.ids.next_id(kind),
            kind,
            subject_hash: subject_hash.to_string(),
            issued_at: now,
            expires_at,
            consumed: false,
            consumed_at: None,
        };
        tokens.insert(token.token_id.clone(), token.clone());
        tracing::info!(token = %token.token_id, kind = ?kind, "token issued");
        Ok(token)
    }

    fn put(&self, token: Token) {
        self.lock().insert(token.token_id.clone(), token);
    }

    fn get(&self, token_id: &str) -> Option<Token> {
        self.lock().get(token_id).cloned()
    }

    fn check(&self, token_id: &str, kind: TokenKind, subject_hash: &str) -> Result<Token> {
        let now = self.clock.now();
        let mut tokens = self.lock();
        Self::checked(&mut tokens, now, token_id, kind, subject_hash).map(|t| t.clone())
    }

    fn consume_if_unconsumed(
        &self,
        token_id: &str,
        kind: TokenKind,
        subject_hash: &str,
    ) -> Result<Token> {
        let now = self.clock.now();
        let mut tokens = self.lock();
        let token = Self::checked(&mut tokens, now, token_id, kind, subject_hash)?;
        token.consumed = true;
        token.consumed_at = Some(now);
        tracing::info!(token = %token_id, kind = ?kind, "token consumed");
        Ok(token.clone())
    }

    fn status(&self, token_id: &str) -> Result<TokenStatus> {
        let now = self.clock.now();
        self.lock()
            .get(token_id)
            .map(|t| t.status(now))
            .ok_or_else(|| PlatformError::TokenNotFound(token_id.to_string()))
    }

    fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut tokens = self.lock();
        let before = tokens.len();
        tokens.retain(|_, t| !t.is_expired(now));
        before - tokens.len()
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Status of a token as seen by a gate, without consuming it.
#[derive(Debug, Clone, Serialize)]
pub struct TokenVerification {
    pub token_id: String,
    pub kind: TokenKind,
    pub status: TokenStatus,
    pub subject_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Look up `token_id` and report its status. A token of another kind
/// reports as not found.
pub fn verify_token(
    store: &dyn TokenStore,
    token_id: &str,
    kind: TokenKind,
) -> Result<TokenVerification> {
    let token = store
        .get(token_id)
        .filter(|t| t.kind == kind)
        .ok_or_else(|| PlatformError::TokenNotFound(token_id.to_string()))?;
    Ok(TokenVerification {
        status: token.status(store.now()),
        token_id: token.token_id,
        kind: token.kind,
        subject_hash: token.subject_hash,
        issued_at: token.issued_at,
        expires_at: token.expires_at,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
