//! Seed derivation and stable identifiers.
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::hash::Hasher;
use twox_hash::XxHash64;

type HmacSha256 = Hmac<Sha256>;

/// Derive an independent RNG seed for one domain (`b"puzzle"`, `b"route"`...)
/// from a user seed. The same pair always yields the same seed.
#[must_use]
pub fn derive_stream_seed(user_seed: u64, domain_tag: &[u8]) -> u64 {
    let Ok(mut mac) = HmacSha256::new_from_slice(&user_seed.to_le_bytes()) else {
        return stable_hash(&[&user_seed.to_le_bytes(), domain_tag]);
    };
    mac.update(domain_tag);
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0_u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}

/// XxHash64 over the concatenated parts, each length-prefixed.
#[must_use]
pub fn stable_hash(parts: &[&[u8]]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    for part in parts {
        hasher.write_usize(part.len());
        hasher.write(part);
    }
    hasher.finish()
}

/// Short hex identifier with a prefix, e.g. `rt_1f0c...`.
#[must_use]
pub fn short_id(prefix: &str, parts: &[&[u8]]) -> String {
    format!("{prefix}_{:016x}", stable_hash(parts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_seeds_are_stable_and_domain_separated() {
        let a = derive_stream_seed(0x00C0_FFEE, b"puzzle");
        assert_eq!(a, derive_stream_seed(0x00C0_FFEE, b"puzzle"));
        assert_ne!(a, derive_stream_seed(0x00C0_FFEE, b"route"));
        assert_ne!(a, derive_stream_seed(0x00C0_FFEF, b"puzzle"));
    }

    #[test]
    fn length_prefix_separates_parts() {
        assert_ne!(stable_hash(&[b"ab", b"c"]), stable_hash(&[b"a", b"bc"]));
        let id = short_id("rt", &[b"eli"]);
        assert!(id.starts_with("rt_"));
        assert_eq!(id.len(), 3 + 16);
    }
}
