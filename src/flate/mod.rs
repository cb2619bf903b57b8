//! Deflate-compatible compression.
//!
//! [`Deflator`] produces a raw deflate stream (no zlib or gzip
//! wrapper): LZ77 over a 32 KiB sliding window with hash-chain match
//! search and lazy evaluation at the higher levels, entropy-coded with
//! fixed or dynamic Huffman trees, falling back to stored blocks when
//! coding would expand the data. [`Inflator`] is the matching
//! streaming decoder.

mod deflate;
mod inflate;

pub use deflate::Deflator;
pub use inflate::Inflator;

/// Shortest match worth encoding.
pub(crate) const MIN_MATCH: usize = 3;
/// Longest match the format can express.
pub(crate) const MAX_MATCH: usize = 258;
/// History window; distances never exceed this.
pub(crate) const WINDOW_SIZE: usize = 32 * 1024;

/// Base lengths for codes 257..=285.
pub(crate) const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59,
    67, 83, 99, 115, 131, 163, 195, 227, 258,
];

/// Extra bits for codes 257..=285.
pub(crate) const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4,
    5, 5, 5, 5, 0,
];

/// Base distances for codes 0..=29.
pub(crate) const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385,
    513, 769, 1025, 1537, 2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Extra bits for distance codes 0..=29.
pub(crate) const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10,
    10, 11, 11, 12, 12, 13, 13,
];

/// Transmission order of the code-length code lengths.
pub(crate) const CL_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Length code (0-based, add 257 on the wire) for a match length.
pub(crate) fn length_code(len: usize) -> usize {
    debug_assert!((MIN_MATCH..=MAX_MATCH).contains(&len));
    // the exact-258 shortcut code
    if len == MAX_MATCH {
        return LENGTH_BASE.len() - 1;
    }
    for (code, (&base, &extra)) in LENGTH_BASE.iter().zip(LENGTH_EXTRA.iter()).enumerate() {
        let hi = base as usize + (1usize << extra) - 1;
        if len <= hi {
            return code;
        }
    }
    LENGTH_BASE.len() - 1
}

/// Distance code for a match distance.
pub(crate) fn dist_code(dist: usize) -> usize {
    debug_assert!((1..=WINDOW_SIZE).contains(&dist));
    for (code, (&base, &extra)) in DIST_BASE.iter().zip(DIST_EXTRA.iter()).enumerate() {
        let hi = base as usize + (1usize << extra) - 1;
        if dist <= hi {
            return code;
        }
    }
    DIST_BASE.len() - 1
}

/// Fixed literal/length code lengths (RFC 1951 §3.2.6).
pub(crate) fn fixed_literal_lengths() -> [u8; 288] {
    let mut lengths = [8u8; 288];
    for l in lengths.iter_mut().take(256).skip(144) {
        *l = 9;
    }
    for l in lengths.iter_mut().take(280).skip(256) {
        *l = 7;
    }
    lengths
}

/// Fixed distance code lengths.
pub(crate) fn fixed_distance_lengths() -> [u8; 30] {
    [5u8; 30]
}
