use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

const KEY_PREFIX: &str = "dm";

/// Canonical identifier for a two-party conversation.
///
/// The key is derived, never generated: both participants always compute
/// the same key regardless of argument order, which is what lets the
/// directory guarantee at most one summary row per pair without a
/// lookup-before-insert. Call sites must construct keys through
/// [`ConversationKey::between`]; the sort/concat lives here and nowhere
/// else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Derive the key for the unordered pair `(a, b)`.
    ///
    /// Rejects self-conversations and nil ids. Uuids order by byte
    /// value, so the rendered `dm:<low>:<high>` form is total-ordered
    /// and locale-independent; `:` cannot occur inside a hyphenated
    /// uuid, so distinct pairs never collide.
    pub fn between(a: Uuid, b: Uuid) -> Result<Self, AppError> {
        if a.is_nil() || b.is_nil() {
            return Err(AppError::InvalidArgument(
                "participant id must not be nil".into(),
            ));
        }
        if a == b {
            return Err(AppError::InvalidArgument(
                "cannot open a conversation with yourself".into(),
            ));
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self(format!("{KEY_PREFIX}:{low}:{high}")))
    }

    /// Validate and adopt a key received from a client (e.g. in a
    /// `leave_conversation` event). Round-trips through the participant
    /// pair so a malformed or non-canonical string is never accepted.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let mut parts = raw.splitn(3, ':');
        let (prefix, low, high) = match (parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(l), Some(h)) => (p, l, h),
            _ => return Err(AppError::InvalidArgument("malformed conversation key".into())),
        };
        if prefix != KEY_PREFIX {
            return Err(AppError::InvalidArgument("malformed conversation key".into()));
        }
        let low = Uuid::parse_str(low)
            .map_err(|_| AppError::InvalidArgument("malformed conversation key".into()))?;
        let high = Uuid::parse_str(high)
            .map_err(|_| AppError::InvalidArgument("malformed conversation key".into()))?;
        let key = Self::between(low, high)?;
        if key.0 != raw {
            // Right uuids, wrong order or casing: not the canonical form.
            return Err(AppError::InvalidArgument("malformed conversation key".into()));
        }
        Ok(key)
    }

    /// The sorted participant pair `(low, high)` this key was derived from.
    pub fn participants(&self) -> (Uuid, Uuid) {
        let mut parts = self.0.splitn(3, ':');
        parts.next();
        let low = Uuid::parse_str(parts.next().unwrap_or_default())
            .expect("conversation key holds a valid low uuid");
        let high = Uuid::parse_str(parts.next().unwrap_or_default())
            .expect("conversation key holds a valid high uuid");
        (low, high)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
