//! Login sessions.
//!
//! A session is a `(timestamp, hash)` pair embedded in the user record. It has no lifecycle
//! of its own: issuing a new one on login overwrites the previous one, and it is persisted
//! together with the user.

use crate::hashing::salted_hash;
use crate::models::User;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Session stored on a user.
///
/// Both fields are optional on disk; a session missing either one is treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Session {
    /// Issues a session for `cpf`/`name` at `timestamp` (ms since epoch).
    pub fn issue(timestamp: i64, cpf: &str, name: &str) -> Self {
        let hash = salted_hash(&format!("session{timestamp}{cpf}{name}hash"));
        Self {
            timestamp: Some(timestamp),
            hash: Some(hash),
        }
    }

    /// Timestamp and hash, if both are present and non-empty.
    fn parts(&self) -> Option<(i64, &str)> {
        let timestamp = self.timestamp.filter(|t| *t != 0)?;
        let hash = self.hash.as_deref().filter(|h| !h.is_empty())?;
        Some((timestamp, hash))
    }
}

/// Outcome of checking a supplied session hash against a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Valid,
    NoUser,
    NoSession,
    HashMismatch,
    Expired,
}

impl SessionStatus {
    /// Human-readable reason for a failed check.
    pub fn message(self) -> Option<&'static str> {
        match self {
            Self::Valid => None,
            Self::NoUser => Some("this CPF is not registered"),
            Self::NoSession => Some("there is no session for this user"),
            Self::HashMismatch => Some("the session hash does not match"),
            Self::Expired => Some("the session has expired"),
        }
    }
}

/// Checks `supplied` against the session stored on `user`.
///
/// A session older than `ttl` at `now_millis` is expired; the boundary itself is still valid.
pub fn validate_session(
    user: Option<&User>,
    supplied: &str,
    now_millis: i64,
    ttl: Duration,
) -> SessionStatus {
    let Some(user) = user else {
        return SessionStatus::NoUser;
    };
    let Some((timestamp, hash)) = user.session.as_ref().and_then(Session::parts) else {
        return SessionStatus::NoSession;
    };
    if hash != supplied {
        return SessionStatus::HashMismatch;
    }
    if now_millis.saturating_sub(timestamp) > ttl.num_milliseconds() {
        return SessionStatus::Expired;
    }
    SessionStatus::Valid
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_792_000_000_000;

    fn user_with_session(session: Option<Session>) -> User {
        let mut user = User::new("Ana", "52998224725", salted_hash("pw1"), "a@x.com", NOW);
        user.session = session;
        user
    }

    #[test]
    fn test_issue_is_deterministic() {
        let a = Session::issue(NOW, "52998224725", "Ana");
        let b = Session::issue(NOW, "52998224725", "Ana");
        assert_eq!(a, b);
        assert_ne!(a, Session::issue(NOW + 1, "52998224725", "Ana"));
        assert_eq!(
            a.hash.as_deref(),
            Some(salted_hash(&format!("session{NOW}52998224725Anahash")).as_str())
        );
    }

    #[test]
    fn test_validate_no_user() {
        let status = validate_session(None, "h", NOW, Duration::minutes(10));
        assert_eq!(status, SessionStatus::NoUser);
    }

    #[test]
    fn test_validate_no_session() {
        let ttl = Duration::minutes(10);
        let user = user_with_session(None);
        assert_eq!(
            validate_session(Some(&user), "h", NOW, ttl),
            SessionStatus::NoSession
        );

        let partial = user_with_session(Some(Session {
            timestamp: Some(NOW),
            hash: None,
        }));
        assert_eq!(
            validate_session(Some(&partial), "h", NOW, ttl),
            SessionStatus::NoSession
        );
    }

    #[test]
    fn test_validate_hash_mismatch_and_expiry() {
        let ttl = Duration::minutes(10);
        let session = Session::issue(NOW, "52998224725", "Ana");
        let hash = session.hash.clone().unwrap();
        let user = user_with_session(Some(session));

        assert_eq!(
            validate_session(Some(&user), "other", NOW, ttl),
            SessionStatus::HashMismatch
        );
        assert_eq!(
            validate_session(Some(&user), &hash, NOW + ttl.num_milliseconds(), ttl),
            SessionStatus::Valid
        );
        assert_eq!(
            validate_session(Some(&user), &hash, NOW + ttl.num_milliseconds() + 1, ttl),
            SessionStatus::Expired
        );
    }

    #[test]
    fn test_corrupt_timestamp_is_expired() {
        let ttl = Duration::minutes(10);
        let user = user_with_session(Some(Session {
            timestamp: Some(i64::MIN),
            hash: Some("h".into()),
        }));
        assert_eq!(
            validate_session(Some(&user), "h", NOW, ttl),
            SessionStatus::Expired
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(SessionStatus::Valid.message(), None);
        assert!(SessionStatus::Expired.message().unwrap().contains("expired"));
    }
}
