//! MurmurHash3, x64 128-bit variant.
//!
//! The topic keys derived from this hash are shared across every rank of a
//! job, so the bit layout here is a wire contract: the two output words must
//! match the reference implementation exactly, little-endian block reads and
//! all. Do not swap this for a different hash or a different variant.

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

/// 128-bit hash of `data` under `seed`, returned as the two 64-bit output
/// words `(h1, h2)` of the reference implementation.
pub fn x64_128(data: &[u8], seed: u32) -> (u64, u64) {
    let len = data.len();
    let nblocks = len / 16;

    let mut h1 = seed as u64;
    let mut h2 = seed as u64;

    for block in data.chunks_exact(16) {
        let mut k1 = u64::from_le_bytes(block[..8].try_into().unwrap_or([0u8; 8]));
        let mut k2 = u64::from_le_bytes(block[8..].try_into().unwrap_or([0u8; 8]));

        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1
            .rotate_left(27)
            .wrapping_add(h2)
            .wrapping_mul(5)
            .wrapping_add(0x52dc_e729);

        k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        h2 ^= k2;
        h2 = h2
            .rotate_left(31)
            .wrapping_add(h1)
            .wrapping_mul(5)
            .wrapping_add(0x3849_5ab5);
    }

    let tail = &data[nblocks * 16..];
    let mut k1: u64 = 0;
    let mut k2: u64 = 0;
    for (i, &b) in tail.iter().enumerate().skip(8) {
        k2 ^= (b as u64) << ((i - 8) * 8);
    }
    if tail.len() > 8 {
        k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        h2 ^= k2;
    }
    for (i, &b) in tail.iter().enumerate().take(8) {
        k1 ^= (b as u64) << (i * 8);
    }
    if !tail.is_empty() {
        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= len as u64;
    h2 ^= len as u64;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (h1, h2)
}

/// Fold the 128-bit result into one 32-bit word by xor of the four 32-bit
/// output words, exactly as a `uint32_t[4]` view of the hash would xor them.
#[inline]
pub fn xor_fold32(h: (u64, u64)) -> u32 {
    let (h1, h2) = h;
    (h1 as u32) ^ ((h1 >> 32) as u32) ^ (h2 as u32) ^ ((h2 >> 32) as u32)
}
