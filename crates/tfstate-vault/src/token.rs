use chrono::{DateTime, Duration, Utc};

/// Renewable tokens are replaced this long before their lease ends.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Token issued by an AppRole login.
#[derive(Debug, Clone)]
pub struct Grant {
    pub token: String,
    pub lease_duration: u64,
    pub renewable: bool,
}

/// Authentication state of a session.
///
/// `Unauthenticated` -> `Valid` on login; `Valid` -> `Expired` once its
/// deadline passes; `Expired` -> `Valid` on the next login. A static token is
/// `Valid` with no deadline and never leaves that state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Unauthenticated,
    Valid {
        token: String,
        until: Option<DateTime<Utc>>,
    },
    Expired,
}

impl TokenState {
    pub fn static_token(token: impl Into<String>) -> Self {
        TokenState::Valid {
            token: token.into(),
            until: None,
        }
    }

    /// State after a successful login at `now`.
    ///
    /// A renewable grant is good until `now + lease - 60s`. A non-renewable
    /// grant expires right away, so every operation logs in again. A lease
    /// too long to represent as a date never expires.
    pub fn from_grant(grant: Grant, now: DateTime<Utc>) -> Self {
        let until = if grant.renewable {
            i64::try_from(grant.lease_duration)
                .ok()
                .map(|lease| lease - EXPIRY_MARGIN_SECS)
                .and_then(Duration::try_seconds)
                .and_then(|lease| now.checked_add_signed(lease))
        } else {
            Some(now)
        };

        TokenState::Valid {
            token: grant.token,
            until,
        }
    }

    /// Move a `Valid` state whose deadline is before `now` to `Expired`.
    pub fn observe(&mut self, now: DateTime<Utc>) {
        if let TokenState::Valid {
            until: Some(until), ..
        } = self
        {
            if *until < now {
                *self = TokenState::Expired;
            }
        }
    }

    /// The token to send, if the state holds a usable one.
    pub fn token(&self) -> Option<&str> {
        match self {
            TokenState::Valid { token, .. } => Some(token),
            TokenState::Unauthenticated | TokenState::Expired => None,
        }
    }
}
