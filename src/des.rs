//! Block ciphers: DES / Triple-DES (EDE) and the null cipher, plus the
//! SHA-1-derived keys that feed them.
//!
//! The cipher interface is the block contract the crypto-archive
//! framing is built on: fixed plaintext and ciphertext block sizes and
//! a process-one-block call. Triple-DES is the reference symmetric
//! cipher (8-byte block, 24-byte key, raw single-block ECB); the null
//! cipher copies bytes through while reporting the same block size so
//! the framing above it is identical.

use crate::error::{Error, ErrorKind, Result};
use crate::rng::randomize_bytes;
use crate::sha1::Sha1;

/// Encrypting or decrypting; fixed when a key is scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// Block-cipher contract for the crypto-archive framing.
///
/// Implementations consume `block_size_plain` bytes and produce
/// `block_size_cipher` bytes per call (the sizes differ for the signing
/// cipher, which appends a signature).
pub trait BlockCipher {
    fn block_size_plain(&self) -> usize;
    fn block_size_cipher(&self) -> usize;

    /// Transform one block. `input` and `output` lengths must match the
    /// direction's block sizes.
    fn process_block(&mut self, input: &[u8], output: &mut [u8]) -> Result<()>;
}

// ---------------------------------------------------------------------
// DES primitives
// ---------------------------------------------------------------------

const IP: [u8; 64] = [
    58, 50, 42, 34, 26, 18, 10, 2, 60, 52, 44, 36, 28, 20, 12, 4,
    62, 54, 46, 38, 30, 22, 14, 6, 64, 56, 48, 40, 32, 24, 16, 8,
    57, 49, 41, 33, 25, 17, 9, 1, 59, 51, 43, 35, 27, 19, 11, 3,
    61, 53, 45, 37, 29, 21, 13, 5, 63, 55, 47, 39, 31, 23, 15, 7,
];

const FP: [u8; 64] = [
    40, 8, 48, 16, 56, 24, 64, 32, 39, 7, 47, 15, 55, 23, 63, 31,
    38, 6, 46, 14, 54, 22, 62, 30, 37, 5, 45, 13, 53, 21, 61, 29,
    36, 4, 44, 12, 52, 20, 60, 28, 35, 3, 43, 11, 51, 19, 59, 27,
    34, 2, 42, 10, 50, 18, 58, 26, 33, 1, 41, 9, 49, 17, 57, 25,
];

const E: [u8; 48] = [
    32, 1, 2, 3, 4, 5, 4, 5, 6, 7, 8, 9,
    8, 9, 10, 11, 12, 13, 12, 13, 14, 15, 16, 17,
    16, 17, 18, 19, 20, 21, 20, 21, 22, 23, 24, 25,
    24, 25, 26, 27, 28, 29, 28, 29, 30, 31, 32, 1,
];

const P: [u8; 32] = [
    16, 7, 20, 21, 29, 12, 28, 17, 1, 15, 23, 26, 5, 18, 31, 10,
    2, 8, 24, 14, 32, 27, 3, 9, 19, 13, 30, 6, 22, 11, 4, 25,
];

const PC1: [u8; 56] = [
    57, 49, 41, 33, 25, 17, 9, 1, 58, 50, 42, 34, 26, 18,
    10, 2, 59, 51, 43, 35, 27, 19, 11, 3, 60, 52, 44, 36,
    63, 55, 47, 39, 31, 23, 15, 7, 62, 54, 46, 38, 30, 22,
    14, 6, 61, 53, 45, 37, 29, 21, 13, 5, 28, 20, 12, 4,
];

const PC2: [u8; 48] = [
    14, 17, 11, 24, 1, 5, 3, 28, 15, 6, 21, 10,
    23, 19, 12, 4, 26, 8, 16, 7, 27, 20, 13, 2,
    41, 52, 31, 37, 47, 55, 30, 40, 51, 45, 33, 48,
    44, 49, 39, 56, 34, 53, 46, 42, 50, 36, 29, 32,
];

const SHIFTS: [u8; 16] = [1, 1, 2, 2, 2, 2, 2, 2, 1, 2, 2, 2, 2, 2, 2, 1];

#[rustfmt::skip]
const SBOX: [[u8; 64]; 8] = [
    [
        14, 4, 13, 1, 2, 15, 11, 8, 3, 10, 6, 12, 5, 9, 0, 7,
        0, 15, 7, 4, 14, 2, 13, 1, 10, 6, 12, 11, 9, 5, 3, 8,
        4, 1, 14, 8, 13, 6, 2, 11, 15, 12, 9, 7, 3, 10, 5, 0,
        15, 12, 8, 2, 4, 9, 1, 7, 5, 11, 3, 14, 10, 0, 6, 13,
    ],
    [
        15, 1, 8, 14, 6, 11, 3, 4, 9, 7, 2, 13, 12, 0, 5, 10,
        3, 13, 4, 7, 15, 2, 8, 14, 12, 0, 1, 10, 6, 9, 11, 5,
        0, 14, 7, 11, 10, 4, 13, 1, 5, 8, 12, 6, 9, 3, 2, 15,
        13, 8, 10, 1, 3, 15, 4, 2, 11, 6, 7, 12, 0, 5, 14, 9,
    ],
    [
        10, 0, 9, 14, 6, 3, 15, 5, 1, 13, 12, 7, 11, 4, 2, 8,
        13, 7, 0, 9, 3, 4, 6, 10, 2, 8, 5, 14, 12, 11, 15, 1,
        13, 6, 4, 9, 8, 15, 3, 0, 11, 1, 2, 12, 5, 10, 14, 7,
        1, 10, 13, 0, 6, 9, 8, 7, 4, 15, 14, 3, 11, 5, 2, 12,
    ],
    [
        7, 13, 14, 3, 0, 6, 9, 10, 1, 2, 8, 5, 11, 12, 4, 15,
        13, 8, 11, 5, 6, 15, 0, 3, 4, 7, 2, 12, 1, 10, 14, 9,
        10, 6, 9, 0, 12, 11, 7, 13, 15, 1, 3, 14, 5, 2, 8, 4,
        3, 15, 0, 6, 10, 1, 13, 8, 9, 4, 5, 11, 12, 7, 2, 14,
    ],
    [
        2, 12, 4, 1, 7, 10, 11, 6, 8, 5, 3, 15, 13, 0, 14, 9,
        14, 11, 2, 12, 4, 7, 13, 1, 5, 0, 15, 10, 3, 9, 8, 6,
        4, 2, 1, 11, 10, 13, 7, 8, 15, 9, 12, 5, 6, 3, 0, 14,
        11, 8, 12, 7, 1, 14, 2, 13, 6, 15, 0, 9, 10, 4, 5, 3,
    ],
    [
        12, 1, 10, 15, 9, 2, 6, 8, 0, 13, 3, 4, 14, 7, 5, 11,
        10, 15, 4, 2, 7, 12, 9, 5, 6, 1, 13, 14, 0, 11, 3, 8,
        9, 14, 15, 5, 2, 8, 12, 3, 7, 0, 4, 10, 1, 13, 11, 6,
        4, 3, 2, 12, 9, 5, 15, 10, 11, 14, 1, 7, 6, 0, 8, 13,
    ],
    [
        4, 11, 2, 14, 15, 0, 8, 13, 3, 12, 9, 7, 5, 10, 6, 1,
        13, 0, 11, 7, 4, 9, 1, 10, 14, 3, 5, 12, 2, 15, 8, 6,
        1, 4, 11, 13, 12, 3, 7, 14, 10, 15, 6, 8, 0, 5, 9, 2,
        6, 11, 13, 8, 1, 4, 10, 7, 9, 5, 0, 15, 14, 2, 3, 12,
    ],
    [
        13, 2, 8, 4, 6, 15, 11, 1, 10, 9, 3, 14, 5, 0, 12, 7,
        1, 15, 13, 8, 10, 3, 7, 4, 12, 5, 6, 11, 0, 14, 9, 2,
        7, 11, 4, 1, 9, 12, 14, 2, 0, 6, 10, 13, 15, 3, 5, 8,
        2, 1, 14, 7, 4, 10, 8, 13, 15, 12, 9, 0, 3, 5, 6, 11,
    ],
];

/// Bit-permute `value` (of `in_width` bits, bit 1 = most significant)
/// through a 1-based position table.
fn permute(value: u64, in_width: u32, table: &[u8]) -> u64 {
    let mut out = 0u64;
    for &pos in table {
        out = (out << 1) | (value >> (in_width - pos as u32)) & 1;
    }
    out
}

/// One DES key schedule: sixteen 48-bit round keys.
#[derive(Clone)]
struct DesKey {
    round_keys: [u64; 16],
}

impl DesKey {
    fn new(key: &[u8; 8]) -> DesKey {
        let key64 = u64::from_be_bytes(*key);
        let cd = permute(key64, 64, &PC1);
        let mut c = (cd >> 28) & 0x0FFF_FFFF;
        let mut d = cd & 0x0FFF_FFFF;
        let mut round_keys = [0u64; 16];
        for (i, &shift) in SHIFTS.iter().enumerate() {
            c = ((c << shift) | (c >> (28 - shift))) & 0x0FFF_FFFF;
            d = ((d << shift) | (d >> (28 - shift))) & 0x0FFF_FFFF;
            round_keys[i] = permute((c << 28) | d, 56, &PC2);
        }
        DesKey { round_keys }
    }

    fn feistel(r: u32, subkey: u64) -> u32 {
        let x = permute(r as u64, 32, &E) ^ subkey;
        let mut out = 0u32;
        for (i, sbox) in SBOX.iter().enumerate() {
            let six = ((x >> (42 - 6 * i)) & 0x3F) as usize;
            let row = ((six & 0x20) >> 4) | (six & 0x01);
            let col = (six >> 1) & 0x0F;
            out = (out << 4) | sbox[row * 16 + col] as u32;
        }
        permute(out as u64, 32, &P) as u32
    }

    fn process(&self, block: u64, dir: Direction) -> u64 {
        let ip = permute(block, 64, &IP);
        let mut l = (ip >> 32) as u32;
        let mut r = ip as u32;
        for round in 0..16 {
            let subkey = match dir {
                Direction::Encrypt => self.round_keys[round],
                Direction::Decrypt => self.round_keys[15 - round],
            };
            let next = l ^ DesKey::feistel(r, subkey);
            l = r;
            r = next;
        }
        // the halves are swapped before the final permutation
        permute(((r as u64) << 32) | l as u64, 64, &FP)
    }
}

/// Triple-DES in EDE order with three independent 8-byte subkeys.
pub struct TripleDes {
    k1: DesKey,
    k2: DesKey,
    k3: DesKey,
    dir: Direction,
}

/// Block size in bytes.
pub const DES_BLOCK_SIZE: usize = 8;
/// Triple-DES key length in bytes.
pub const DES_KEY_LENGTH: usize = 24;

impl TripleDes {
    pub fn new(dir: Direction, key: &HashedKey192) -> TripleDes {
        TripleDes::from_key_bytes(dir, key.key())
    }

    pub fn from_key_bytes(dir: Direction, key: &[u8]) -> TripleDes {
        assert_eq!(key.len(), DES_KEY_LENGTH);
        let mut k = [0u8; 8];
        k.copy_from_slice(&key[0..8]);
        let k1 = DesKey::new(&k);
        k.copy_from_slice(&key[8..16]);
        let k2 = DesKey::new(&k);
        k.copy_from_slice(&key[16..24]);
        let k3 = DesKey::new(&k);
        TripleDes { k1, k2, k3, dir }
    }

    fn process(&self, block: u64) -> u64 {
        match self.dir {
            Direction::Encrypt => {
                let a = self.k1.process(block, Direction::Encrypt);
                let b = self.k2.process(a, Direction::Decrypt);
                self.k3.process(b, Direction::Encrypt)
            }
            Direction::Decrypt => {
                let a = self.k3.process(block, Direction::Decrypt);
                let b = self.k2.process(a, Direction::Encrypt);
                self.k1.process(b, Direction::Decrypt)
            }
        }
    }
}

impl BlockCipher for TripleDes {
    fn block_size_plain(&self) -> usize {
        DES_BLOCK_SIZE
    }

    fn block_size_cipher(&self) -> usize {
        DES_BLOCK_SIZE
    }

    fn process_block(&mut self, input: &[u8], output: &mut [u8]) -> Result<()> {
        if input.len() != DES_BLOCK_SIZE || output.len() != DES_BLOCK_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "Triple-DES processes exactly 8-byte blocks",
            ));
        }
        let mut block = [0u8; 8];
        block.copy_from_slice(input);
        let out = self.process(u64::from_be_bytes(block));
        output.copy_from_slice(&out.to_be_bytes());
        Ok(())
    }
}

/// Copies plaintext through unchanged but honors the same block
/// contract as Triple-DES, so the framing above is byte-identical.
pub struct NullCipher;

impl BlockCipher for NullCipher {
    fn block_size_plain(&self) -> usize {
        DES_BLOCK_SIZE
    }

    fn block_size_cipher(&self) -> usize {
        DES_BLOCK_SIZE
    }

    fn process_block(&mut self, input: &[u8], output: &mut [u8]) -> Result<()> {
        if input.len() != output.len() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "null cipher blocks must match in size",
            ));
        }
        output.copy_from_slice(input);
        Ok(())
    }
}

// ---------------------------------------------------------------------
// hashed keys
// ---------------------------------------------------------------------

/// 128-bit key derived from arbitrary input by SHA-1.
pub struct HashedKey128 {
    key: [u8; 16],
}

impl HashedKey128 {
    pub fn new(data: &[u8]) -> HashedKey128 {
        let digest = Sha1::digest_of(data);
        let mut key = [0u8; 16];
        key.copy_from_slice(&digest[..16]);
        HashedKey128 { key }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

impl Drop for HashedKey128 {
    fn drop(&mut self) {
        randomize_bytes(&mut self.key);
    }
}

/// 192-bit key: SHA-1 of the input, extended by a second SHA-1 over the
/// first digest to reach 24 bytes.
pub struct HashedKey192 {
    key: [u8; 24],
}

impl HashedKey192 {
    pub fn new(data: &[u8]) -> HashedKey192 {
        let first = Sha1::digest_of(data);
        let second = Sha1::digest_of(&first);
        let mut key = [0u8; 24];
        key[..20].copy_from_slice(&first);
        key[20..].copy_from_slice(&second[..4]);
        HashedKey192 { key }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

impl Drop for HashedKey192 {
    fn drop(&mut self) {
        randomize_bytes(&mut self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_des_known_answer() {
        // The classic FIPS walkthrough vector.
        let key = DesKey::new(&0x1334_5779_9BBC_DFF1u64.to_be_bytes());
        let cipher = key.process(0x0123_4567_89AB_CDEF, Direction::Encrypt);
        assert_eq!(cipher, 0x85E8_1354_0F0A_B405);
        assert_eq!(key.process(cipher, Direction::Decrypt), 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn triple_des_round_trip() {
        let key: Vec<u8> = (0..24).map(|i| i * 7 + 1).collect();
        let mut enc = TripleDes::from_key_bytes(Direction::Encrypt, &key);
        let mut dec = TripleDes::from_key_bytes(Direction::Decrypt, &key);

        let plain = *b"\x01\x23\x45\x67\x89\xAB\xCD\xEF";
        let mut cipher = [0u8; 8];
        enc.process_block(&plain, &mut cipher).unwrap();
        assert_ne!(cipher, plain);

        let mut back = [0u8; 8];
        dec.process_block(&cipher, &mut back).unwrap();
        assert_eq!(back, plain);
    }

    #[test]
    fn ede_with_equal_keys_degenerates_to_des() {
        // k1 == k2 == k3 makes EDE a single DES pass.
        let mut key = [0u8; 24];
        for part in key.chunks_mut(8) {
            part.copy_from_slice(&0x1334_5779_9BBC_DFF1u64.to_be_bytes());
        }
        let mut ede = TripleDes::from_key_bytes(Direction::Encrypt, &key);
        let mut out = [0u8; 8];
        ede.process_block(&0x0123_4567_89AB_CDEFu64.to_be_bytes(), &mut out)
            .unwrap();
        assert_eq!(u64::from_be_bytes(out), 0x85E8_1354_0F0A_B405);
    }

    #[test]
    fn null_cipher_copies_and_reports_des_sizes() {
        let mut null = NullCipher;
        assert_eq!(null.block_size_plain(), 8);
        assert_eq!(null.block_size_cipher(), 8);
        let input = [9u8; 8];
        let mut out = [0u8; 8];
        null.process_block(&input, &mut out).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn wrong_block_size_is_rejected() {
        let mut enc = TripleDes::from_key_bytes(Direction::Encrypt, &[0u8; 24]);
        let mut out = [0u8; 8];
        assert!(enc.process_block(&[0u8; 7], &mut out).is_err());
    }

    #[test]
    fn hashed_keys_are_deterministic_and_distinct() {
        let a = HashedKey192::new(b"some passphrase");
        let b = HashedKey192::new(b"some passphrase");
        let c = HashedKey192::new(b"other passphrase");
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        assert_eq!(a.key().len(), 24);

        // 192-bit key = SHA1(data) || SHA1(SHA1(data))[..4]
        let first = Sha1::digest_of(b"some passphrase");
        let second = Sha1::digest_of(&first);
        assert_eq!(&a.key()[..20], &first);
        assert_eq!(&a.key()[20..], &second[..4]);

        let k128 = HashedKey128::new(b"some passphrase");
        assert_eq!(k128.key(), &first[..16]);
    }
}
