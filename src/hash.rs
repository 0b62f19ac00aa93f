//! The digest function the simulator is parameterized over

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// A named, fixed-width digest function.
///
/// Wraps any pure `Fn(&[u8]) -> String` together with a name (so
/// configurations stay printable and comparable) and an output width in hex
/// characters. [`HashFn::digest`] normalizes whatever the inner function
/// returns to exactly `width` characters: longer output is truncated,
/// shorter output is right-padded with `'0'`. Difficulty is judged by a
/// leading-zero string prefix, so the width and the padding are part of the
/// contract, not cosmetics.
#[derive(Clone)]
pub struct HashFn {
    name: String,
    width: usize,
    func: Arc<dyn Fn(&[u8]) -> String + Send + Sync + 'static>,
}

impl HashFn {
    pub fn new<N, F>(name: N, width: usize, func: F) -> Self
    where
        N: Into<String>,
        F: Fn(&[u8]) -> String + Send + Sync + 'static,
    {
        HashFn {
            name: name.into(),
            width,
            func: Arc::new(func),
        }
    }

    /// SHA-256 rendered as lowercase hex. At the default width of 64 the
    /// digest fits exactly and normalization never fires.
    pub fn sha256(width: usize) -> Self {
        HashFn::new("sha256", width, |bytes| hex::encode(Sha256::digest(bytes)))
    }

    /// Output width in hex characters.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The all-`'0'` digest: the genesis `previous_hash` and the Merkle
    /// root of an empty event sequence.
    pub fn zero_digest(&self) -> String {
        "0".repeat(self.width)
    }

    /// Hash `bytes` and normalize the output to exactly [`width`] characters.
    ///
    /// [`width`]: HashFn::width
    pub fn digest(&self, bytes: &[u8]) -> String {
        let mut out = (self.func)(bytes);
        out.truncate(self.width);
        while out.len() < self.width {
            out.push('0');
        }
        out
    }
}

impl fmt::Debug for HashFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<HashFn: {}/{}>", self.name, self.width)
    }
}

impl PartialEq for HashFn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.width == other.width
    }
}

impl Eq for HashFn {}

#[cfg(test)]
mod tests {
    use super::HashFn;

    #[test]
    fn sha256_fills_default_width() {
        let h = HashFn::sha256(64);
        let digest = h.digest(b"abc");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn digest_is_deterministic() {
        let h = HashFn::sha256(64);
        assert_eq!(h.digest(b"same input"), h.digest(b"same input"));
        assert_ne!(h.digest(b"one"), h.digest(b"two"));
    }

    #[test]
    fn short_output_is_right_padded_with_zeros() {
        let h = HashFn::new("stub", 8, |_| "ab".to_string());
        assert_eq!(h.digest(b"x"), "ab000000");
    }

    #[test]
    fn long_output_is_truncated() {
        let h = HashFn::sha256(10);
        assert_eq!(h.digest(b"x").len(), 10);
    }

    #[test]
    fn zero_digest_matches_width() {
        let h = HashFn::sha256(64);
        assert_eq!(h.zero_digest(), "0".repeat(64));
    }
}
