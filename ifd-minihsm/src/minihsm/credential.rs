//! PIN / PUK credential
//!
//! Holds a reference value together with its retry counter. Only the
//! SHA-256 digest of the reference is kept.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Shortest accepted reference value, in bytes
pub const MIN_LENGTH: usize = 4;
/// Longest accepted reference value, in bytes
pub const MAX_LENGTH: usize = 16;

/// Whether a candidate value satisfies the shared length policy
pub fn length_in_bounds(len: usize) -> bool {
    (MIN_LENGTH..=MAX_LENGTH).contains(&len)
}

/// A retry-limited secret
#[derive(Clone)]
pub struct Credential {
    /// Digest of the reference value, None until first update
    digest: Option<[u8; 32]>,
    max_tries: u8,
    tries_remaining: u8,
}

impl Credential {
    /// Create an unset credential with a full retry counter
    pub fn new(max_tries: u8) -> Self {
        Self {
            digest: None,
            max_tries,
            tries_remaining: max_tries,
        }
    }

    /// Create a credential already holding `value`
    pub fn with_value(max_tries: u8, value: &[u8]) -> Self {
        let mut credential = Self::new(max_tries);
        credential.update(value);
        credential
    }

    fn hash(value: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(value);
        hasher.finalize().into()
    }

    /// Replace the reference value
    ///
    /// The retry counter is left alone; callers pair this with
    /// [`Credential::reset_and_unblock`] where the counter must be restored.
    pub fn update(&mut self, value: &[u8]) {
        self.digest = Some(Self::hash(value));
    }

    /// Compare `candidate` against the reference value
    ///
    /// A blocked credential never matches and its counter is not touched.
    /// Otherwise one try is consumed before comparing, even while unset,
    /// and given back in full on a match.
    pub fn check(&mut self, candidate: &[u8]) -> bool {
        if self.tries_remaining == 0 {
            return false;
        }
        self.tries_remaining -= 1;

        let Some(digest) = self.digest else {
            return false;
        };

        let candidate = Self::hash(candidate);
        if bool::from(candidate[..].ct_eq(&digest[..])) {
            self.tries_remaining = self.max_tries;
            true
        } else {
            false
        }
    }

    /// Restore the retry counter to its maximum
    pub fn reset_and_unblock(&mut self) {
        self.tries_remaining = self.max_tries;
    }

    pub fn tries_remaining(&self) -> u8 {
        self.tries_remaining
    }

    pub fn max_tries(&self) -> u8 {
        self.max_tries
    }

    pub fn is_blocked(&self) -> bool {
        self.tries_remaining == 0
    }

    /// Whether a reference value has been written
    pub fn is_set(&self) -> bool {
        self.digest.is_some()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("set", &self.is_set())
            .field("max_tries", &self.max_tries)
            .field("tries_remaining", &self.tries_remaining)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_policy() {
        assert!(!length_in_bounds(3));
        assert!(length_in_bounds(4));
        assert!(length_in_bounds(16));
        assert!(!length_in_bounds(17));
    }

    #[test]
    fn test_new_is_unset_with_full_tries() {
        let pin = Credential::new(3);
        assert!(!pin.is_set());
        assert_eq!(pin.tries_remaining(), 3);
        assert_eq!(pin.max_tries(), 3);
    }

    #[test]
    fn test_check_success_restores_tries() {
        let mut pin = Credential::with_value(3, b"1234");
        assert!(!pin.check(b"0000"));
        assert_eq!(pin.tries_remaining(), 2);
        assert!(pin.check(b"1234"));
        assert_eq!(pin.tries_remaining(), 3);
    }

    #[test]
    fn test_check_failure_decrements_by_one_down_to_zero() {
        let mut pin = Credential::with_value(3, b"1234");
        for expected in [2, 1, 0] {
            assert!(!pin.check(b"4321"));
            assert_eq!(pin.tries_remaining(), expected);
        }
        assert!(pin.is_blocked());

        // Blocked: even the right value fails and the counter stays at zero
        assert!(!pin.check(b"1234"));
        assert_eq!(pin.tries_remaining(), 0);
    }

    #[test]
    fn test_prefix_does_not_match() {
        let mut pin = Credential::with_value(3, b"123456");
        assert!(!pin.check(b"1234"));
        assert!(!pin.check(b"12345678"));
    }

    #[test]
    fn test_unset_never_matches_but_consumes_tries() {
        let mut pin = Credential::new(3);
        for expected in [2, 1, 0] {
            assert!(!pin.check(b"1234"));
            assert_eq!(pin.tries_remaining(), expected);
        }
        assert!(!pin.check(b"1234"));
        assert_eq!(pin.tries_remaining(), 0);

        // Writing a value does not restore the counter on its own
        pin.update(b"1234");
        assert!(!pin.check(b"1234"));
        pin.reset_and_unblock();
        assert!(pin.check(b"1234"));
    }

    #[test]
    fn test_reset_and_unblock() {
        let mut puk = Credential::with_value(10, b"99999999");
        for _ in 0..10 {
            puk.check(b"00000000");
        }
        assert!(puk.is_blocked());
        puk.reset_and_unblock();
        assert_eq!(puk.tries_remaining(), 10);
        assert!(puk.check(b"99999999"));
    }

    #[test]
    fn test_debug_hides_reference() {
        let pin = Credential::with_value(3, b"1234");
        let rendered = format!("{:?}", pin);
        assert!(!rendered.contains("1234"));
        assert!(rendered.contains("tries_remaining: 3"));
    }
}
