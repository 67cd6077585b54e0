use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Prefix carried by every item identifier.
pub const ITEM_ID_PREFIX: &str = "it-";

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 10;

/// Opaque, prefixed item identifier (`it-` followed by base36 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
            .collect();
        Self(format!("{ITEM_ID_PREFIX}{suffix}"))
    }

    /// Parse and validate an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidItemId`] when the prefix is missing or the suffix is
    /// empty or contains characters outside `[a-z0-9]`.
    pub fn parse(raw: &str) -> Result<Self, InvalidItemId> {
        let trimmed = raw.trim();
        let Some(suffix) = trimmed.strip_prefix(ITEM_ID_PREFIX) else {
            return Err(InvalidItemId(raw.to_string()));
        };
        let valid = !suffix.is_empty()
            && suffix.len() <= 64
            && suffix
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase());
        if valid {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(InvalidItemId(raw.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ItemId {
    type Err = InvalidItemId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ItemId {
    type Error = InvalidItemId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

/// Rejected item identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid item id '{0}': expected 'it-' followed by [a-z0-9]")]
pub struct InvalidItemId(pub String);

/// Vote direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteDirection {
    type Err = InvalidVoteDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            _ => Err(InvalidVoteDirection(s.to_string())),
        }
    }
}

/// Rejected vote direction string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid vote direction '{0}': expected 'up' or 'down'")]
pub struct InvalidVoteDirection(pub String);

/// The four engagement counters (votes are split into up and down).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub upvotes: u64,
    pub downvotes: u64,
    pub comment_count: u64,
    pub views: u64,
    pub share_count: u64,
}

impl Counters {
    /// `upvotes - downvotes`.
    #[must_use]
    pub fn net_votes(&self) -> i64 {
        to_i64(self.upvotes).saturating_sub(to_i64(self.downvotes))
    }
}

/// Point-in-time read of one live item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSnapshot {
    pub item_id: ItemId,
    pub counters: Counters,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
}

impl ItemSnapshot {
    /// `max(0, expires_at - now)` in milliseconds.
    #[must_use]
    pub fn time_remaining_ms(&self, now_ms: i64) -> i64 {
        self.expires_at_ms.saturating_sub(now_ms).max(0)
    }

    #[must_use]
    pub const fn is_live(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms
    }
}

pub(crate) fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub(crate) fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_parse_back() {
        for _ in 0..32 {
            let id = ItemId::generate();
            assert!(id.as_str().starts_with(ITEM_ID_PREFIX));
            assert_eq!(ItemId::parse(id.as_str()), Ok(id));
        }
    }

    #[test]
    fn rejects_foreign_ids() {
        assert!(ItemId::parse("post-abc").is_err());
        assert!(ItemId::parse("it-").is_err());
        assert!(ItemId::parse("it-ABC").is_err());
        assert!(ItemId::parse("it-a b").is_err());
        assert!(ItemId::parse(" it-abc ").is_ok());
    }

    #[test]
    fn vote_direction_parsing() {
        assert_eq!("up".parse::<VoteDirection>(), Ok(VoteDirection::Up));
        assert_eq!("DOWN".parse::<VoteDirection>(), Ok(VoteDirection::Down));
        assert!("sideways".parse::<VoteDirection>().is_err());
    }

    #[test]
    fn net_votes_can_go_negative() {
        let counters = Counters {
            upvotes: 3,
            downvotes: 10,
            ..Counters::default()
        };
        assert_eq!(counters.net_votes(), -7);
    }

    #[test]
    fn time_remaining_clamps_at_zero() {
        let snapshot = ItemSnapshot {
            item_id: ItemId::generate(),
            counters: Counters::default(),
            created_at_ms: 0,
            expires_at_ms: 1_000,
        };
        assert_eq!(snapshot.time_remaining_ms(400), 600);
        assert_eq!(snapshot.time_remaining_ms(5_000), 0);
        assert!(snapshot.is_live(999));
        assert!(!snapshot.is_live(1_000));
    }

    #[test]
    fn counters_serialize_camel_case() {
        let json = serde_json::to_value(Counters::default()).expect("serialize counters");
        assert!(json.get("commentCount").is_some());
        assert!(json.get("shareCount").is_some());
    }
}
