//! Key hashing for shard and bucket selection.

use hps_core::Key;

/// splitmix64 finalizer. Spreads sequential keys across all bits.
#[inline]
pub(crate) fn mix64(key: Key) -> u64 {
    let mut z = (key as u64).wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
