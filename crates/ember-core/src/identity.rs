//! Anonymous identity derivation.
//!
//! A request's network origin and client signature (user agent) become:
//! - an origin hash, used as the rate-limit key
//! - an identity token, used as the view/vote dedup key
//! - a display label such as `Anonymous Quiet Otter`
//!
//! All three are salted SHA-256 digests (the label is picked from digest
//! bytes), so the raw origin never reaches storage. Derivation is pure:
//! the same salt and inputs always produce the same outputs.

use rand::RngCore;
use sha2::{Digest, Sha256};

const ADJECTIVES: &[&str] = &[
    "Amber", "Bold", "Brisk", "Calm", "Clever", "Cosmic", "Curious", "Daring", "Dusty", "Eager",
    "Fuzzy", "Gentle", "Hidden", "Humble", "Jolly", "Keen", "Lucky", "Mellow", "Misty", "Nimble",
    "Quiet", "Rapid", "Rustic", "Silent", "Sly", "Spry", "Sunny", "Swift", "Tidy", "Vivid",
    "Witty", "Zesty",
];

const ANIMALS: &[&str] = &[
    "Badger", "Bison", "Crane", "Falcon", "Ferret", "Finch", "Fox", "Gecko", "Heron", "Ibex",
    "Jackal", "Koala", "Lemur", "Lynx", "Marten", "Moose", "Newt", "Ocelot", "Otter", "Owl",
    "Panda", "Puffin", "Quail", "Raven", "Seal", "Shrew", "Stoat", "Tapir", "Walrus", "Weasel",
    "Wren", "Yak",
];

const UNKNOWN_ORIGIN: &str = "unknown";

/// Derived anonymous identity for one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Hex digest of the origin alone.
    pub origin_hash: String,
    /// Hex digest of origin + signature (+ optional client hint).
    pub token: String,
    /// Human-displayable anonymous name.
    pub label: String,
    /// Client signature as received, kept for ledger diagnostics.
    pub signature: String,
}

/// Salted, deterministic identity deriver.
#[derive(Clone)]
pub struct IdentityDeriver {
    salt: Vec<u8>,
}

impl std::fmt::Debug for IdentityDeriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityDeriver")
            .field("salt", &"<redacted>")
            .finish()
    }
}

impl IdentityDeriver {
    #[must_use]
    pub fn new(salt: impl AsRef<[u8]>) -> Self {
        Self {
            salt: salt.as_ref().to_vec(),
        }
    }

    /// Deriver with a random salt. Identities are only stable for the life of
    /// the process.
    #[must_use]
    pub fn ephemeral() -> Self {
        let mut salt = [0_u8; 32];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::new(salt)
    }

    /// Derive the identity for `origin` + `signature`.
    #[must_use]
    pub fn derive(&self, origin: &str, signature: &str) -> Identity {
        self.derive_with_hint(origin, signature, None)
    }

    /// Like [`derive`](Self::derive), folding a client-declared session hint
    /// into the token. The origin hash ignores the hint so rate limiting
    /// cannot be dodged by rotating it.
    #[must_use]
    pub fn derive_with_hint(&self, origin: &str, signature: &str, hint: Option<&str>) -> Identity {
        let origin = normalize_origin(origin);
        let signature = signature.trim();

        let origin_digest = self.digest(b"origin", &[origin.as_bytes()]);
        let token_digest = match hint.map(str::trim).filter(|h| !h.is_empty()) {
            Some(hint) => self.digest(
                b"identity+hint",
                &[origin.as_bytes(), signature.as_bytes(), hint.as_bytes()],
            ),
            None => self.digest(b"identity", &[origin.as_bytes(), signature.as_bytes()]),
        };

        Identity {
            origin_hash: hex::encode(origin_digest),
            token: hex::encode(token_digest),
            label: label_for(&token_digest),
            signature: signature.to_string(),
        }
    }

    fn digest(&self, domain: &[u8], parts: &[&[u8]]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        hasher.update([0_u8]);
        hasher.update(&self.salt);
        for part in parts {
            hasher.update([0_u8]);
            // Length prefix keeps ("ab", "c") distinct from ("a", "bc").
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        hasher.finalize().into()
    }
}

fn normalize_origin(origin: &str) -> String {
    let trimmed = origin.trim();
    if trimmed.is_empty() {
        UNKNOWN_ORIGIN.to_string()
    } else {
        trimmed.to_ascii_lowercase()
    }
}

fn label_for(digest: &[u8; 32]) -> String {
    let adjective = ADJECTIVES[usize::from(digest[0]) % ADJECTIVES.len()];
    let animal = ANIMALS[usize::from(digest[1]) % ANIMALS.len()];
    format!("Anonymous {adjective} {animal}")
}

#[cfg(test)]
mod tests {
    use super::IdentityDeriver;

    #[test]
    fn same_inputs_same_identity() {
        let deriver = IdentityDeriver::new("pepper");
        let a = deriver.derive("203.0.113.9", "Mozilla/5.0");
        let b = deriver.derive("203.0.113.9", "Mozilla/5.0");
        assert_eq!(a, b);
        assert!(a.label.starts_with("Anonymous "));
    }

    #[test]
    fn origin_is_normalized() {
        let deriver = IdentityDeriver::new("pepper");
        let a = deriver.derive("  2001:DB8::1 ", "ua");
        let b = deriver.derive("2001:db8::1", "ua");
        assert_eq!(a.token, b.token);
        assert_eq!(a.origin_hash, b.origin_hash);
    }

    #[test]
    fn salt_changes_every_output() {
        let a = IdentityDeriver::new("one").derive("198.51.100.7", "ua");
        let b = IdentityDeriver::new("two").derive("198.51.100.7", "ua");
        assert_ne!(a.origin_hash, b.origin_hash);
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn signature_splits_identity_but_not_origin() {
        let deriver = IdentityDeriver::new("pepper");
        let phone = deriver.derive("198.51.100.7", "phone");
        let laptop = deriver.derive("198.51.100.7", "laptop");
        assert_eq!(phone.origin_hash, laptop.origin_hash);
        assert_ne!(phone.token, laptop.token);
    }

    #[test]
    fn hint_only_affects_token() {
        let deriver = IdentityDeriver::new("pepper");
        let plain = deriver.derive("198.51.100.7", "ua");
        let hinted = deriver.derive_with_hint("198.51.100.7", "ua", Some("session-1"));
        let blank = deriver.derive_with_hint("198.51.100.7", "ua", Some("  "));
        assert_eq!(plain.origin_hash, hinted.origin_hash);
        assert_ne!(plain.token, hinted.token);
        assert_eq!(plain, blank);
    }

    #[test]
    fn digests_do_not_contain_origin() {
        let deriver = IdentityDeriver::new("pepper");
        let identity = deriver.derive("10.1.2.3", "ua");
        assert_eq!(identity.origin_hash.len(), 64);
        assert!(!identity.origin_hash.contains("10.1.2.3"));
        assert!(!format!("{deriver:?}").contains("pepper"));
    }

    #[test]
    fn empty_origin_is_unknown() {
        let deriver = IdentityDeriver::new("pepper");
        assert_eq!(deriver.derive("", "ua"), deriver.derive("unknown", "ua"));
    }
}
