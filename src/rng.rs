//! Random byte sources.
//!
//! [`randomize_bytes`] pulls straight from the operating system's
//! entropy pool and is what key material, padding, and buffer wipes
//! use. [`X917Rng`] is the ANSI X9.17 construction over Triple-DES: a
//! cipher-stirred generator seeded from OS entropy, suitable for the
//! ephemeral values the signature scheme consumes.

use crate::des::{BlockCipher, Direction, TripleDes, DES_BLOCK_SIZE, DES_KEY_LENGTH};
use rand::RngCore;
use std::time::{SystemTime, UNIX_EPOCH};

/// Byte-at-a-time random source.
pub trait RandomSource {
    fn get_byte(&mut self) -> u8;

    fn get_block(&mut self, out: &mut [u8]) {
        for b in out.iter_mut() {
            *b = self.get_byte();
        }
    }
}

/// Overwrite a buffer with OS-entropy random bytes.
///
/// Used both for generating fresh secrets and for wiping buffers that
/// held them.
pub fn randomize_bytes(dest: &mut [u8]) {
    rand::rngs::OsRng.fill_bytes(dest);
}

/// 64-bit nanosecond wall-clock reading, the X9.17 time input.
fn clock_bytes() -> [u8; 8] {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    nanos.to_be_bytes()
}

fn xor_into(dest: &mut [u8], src: &[u8]) {
    for (d, s) in dest.iter_mut().zip(src) {
        *d ^= s;
    }
}

/// ANSI X9.17 pseudo-random generator keyed by a block cipher.
///
/// Per output block: `D = E(D ⊕ clock)`, `R = E(S ⊕ D)`,
/// `S = E(R ⊕ D)`; bytes are served from `R`.
pub struct X917Rng {
    cipher: TripleDes,
    seed: [u8; DES_BLOCK_SIZE],
    dt: [u8; DES_BLOCK_SIZE],
    buf: [u8; DES_BLOCK_SIZE],
    remaining: usize,
}

impl X917Rng {
    pub fn new(cipher: TripleDes, seed: [u8; DES_BLOCK_SIZE]) -> X917Rng {
        let mut rng = X917Rng {
            cipher,
            seed,
            dt: [0u8; DES_BLOCK_SIZE],
            buf: [0u8; DES_BLOCK_SIZE],
            remaining: 0,
        };
        // stir the date/time vector before first use
        xor_into(&mut rng.dt, &clock_bytes());
        rng.encrypt_in_place_dt();
        rng
    }

    fn encrypt_in_place_dt(&mut self) {
        let mut out = [0u8; DES_BLOCK_SIZE];
        self.cipher
            .process_block(&self.dt.clone(), &mut out)
            .expect("block sizes are fixed");
        self.dt = out;
    }

    fn refill(&mut self) {
        // D = E(D xor clock)
        xor_into(&mut self.dt, &clock_bytes());
        self.encrypt_in_place_dt();

        // R = E(S xor D)
        let mut r_in = self.seed;
        xor_into(&mut r_in, &self.dt);
        let mut r = [0u8; DES_BLOCK_SIZE];
        self.cipher
            .process_block(&r_in, &mut r)
            .expect("block sizes are fixed");

        // S = E(R xor D)
        let mut s_in = r;
        xor_into(&mut s_in, &self.dt);
        let mut s = [0u8; DES_BLOCK_SIZE];
        self.cipher
            .process_block(&s_in, &mut s)
            .expect("block sizes are fixed");
        self.seed = s;

        self.buf = r;
        self.remaining = DES_BLOCK_SIZE;
    }
}

impl RandomSource for X917Rng {
    fn get_byte(&mut self) -> u8 {
        if self.remaining == 0 {
            self.refill();
        }
        self.remaining -= 1;
        self.buf[self.remaining]
    }
}

/// Fresh X9.17 generator keyed and seeded from OS entropy.
pub fn system_rng() -> X917Rng {
    let mut key = [0u8; DES_KEY_LENGTH];
    randomize_bytes(&mut key);
    let mut seed = [0u8; DES_BLOCK_SIZE];
    randomize_bytes(&mut seed);
    let rng = X917Rng::new(TripleDes::from_key_bytes(Direction::Encrypt, &key), seed);
    randomize_bytes(&mut key);
    rng
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rng() -> X917Rng {
        let key: Vec<u8> = (0u8..24).collect();
        X917Rng::new(
            TripleDes::from_key_bytes(Direction::Encrypt, &key),
            *b"seedseed",
        )
    }

    #[test]
    fn produces_bytes_and_refills() {
        let mut rng = test_rng();
        let mut block = [0u8; 100];
        rng.get_block(&mut block);
        // a constant run would mean the stir is broken
        assert!(block.iter().any(|&b| b != block[0]));
    }

    #[test]
    fn streams_diverge_between_instances() {
        // Different seeds give different streams even under one key.
        let key: Vec<u8> = (0u8..24).collect();
        let mut a = X917Rng::new(
            TripleDes::from_key_bytes(Direction::Encrypt, &key),
            *b"seedseed",
        );
        let mut b = X917Rng::new(
            TripleDes::from_key_bytes(Direction::Encrypt, &key),
            *b"deesdees",
        );
        let mut block_a = [0u8; 32];
        let mut block_b = [0u8; 32];
        a.get_block(&mut block_a);
        b.get_block(&mut block_b);
        assert_ne!(block_a, block_b);
    }

    #[test]
    fn system_rng_is_usable() {
        let mut rng = system_rng();
        let mut block = [0u8; 64];
        rng.get_block(&mut block);
        assert!(block.iter().any(|&b| b != 0));
    }

    #[test]
    fn randomize_bytes_fills_buffer() {
        let mut buf = [0u8; 64];
        randomize_bytes(&mut buf);
        assert!(buf.iter().any(|&b| b != 0));
    }
}
