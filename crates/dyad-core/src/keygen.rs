//! Path-to-topic key generation.
//!
//! Maps an arbitrary user path to a hierarchical KVS key whose namespace is
//! balanced across a fan-out tree: `depth` hex-encoded bin levels followed
//! by the literal path, so keys stay human-debuggable. Producers and
//! consumers on different ranks derive the key independently and must agree
//! byte-for-byte; the seed schedule below is part of that contract.

use std::fmt::Write;

use crate::murmur3;

const SEEDS: [u32; 10] = [
    104677, 104681, 104683, 104693, 104701, 104707, 104711, 104717, 104723, 104729,
];

const BASE_SEED: u32 = 57;

/// Derive the topic key for `path` with `depth` levels of `bins`-way fan-out.
///
/// Deterministic in `(path, depth, bins)`: every rank of a job produces the
/// identical string. Each level hashes the whole path under a seed
/// accumulated from the schedule, xor-folds the 128-bit result and reduces
/// it modulo `bins`.
pub fn gen_path_key(path: &str, depth: u32, bins: u32) -> String {
    let bins = bins.max(1);
    let mut seed = BASE_SEED;
    let mut key = String::with_capacity(path.len() + 9 * depth as usize);
    for level in 0..depth {
        seed = seed.wrapping_add(SEEDS[(level % 10) as usize]);
        let bin = murmur3::xor_fold32(murmur3::x64_128(path.as_bytes(), seed)) % bins;
        let _ = write!(key, "{bin:x}.");
    }
    key.push_str(path);
    key
}
