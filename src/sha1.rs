//! Streaming SHA-1.
//!
//! The digest the signature scheme and the hashed-key derivation run
//! on. 64-byte blocks, 20-byte output, big-endian length padding.

/// Digest size in bytes.
pub const DIGEST_SIZE: usize = 20;
/// Compression-function block size in bytes.
pub const BLOCK_SIZE: usize = 64;

const H0: [u32; 5] = [0x6745_2301, 0xEFCD_AB89, 0x98BA_DCFE, 0x1032_5476, 0xC3D2_E1F0];

/// Incremental SHA-1 hasher. `update` any number of times, then
/// `finalize`; the state resets to the initial constants afterwards.
pub struct Sha1 {
    state: [u32; 5],
    block: [u8; BLOCK_SIZE],
    block_len: usize,
    total_len: u64,
}

impl Sha1 {
    pub fn new() -> Sha1 {
        Sha1 {
            state: H0,
            block: [0; BLOCK_SIZE],
            block_len: 0,
            total_len: 0,
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        self.total_len = self.total_len.wrapping_add(data.len() as u64);
        if self.block_len > 0 {
            let n = data.len().min(BLOCK_SIZE - self.block_len);
            self.block[self.block_len..self.block_len + n].copy_from_slice(&data[..n]);
            self.block_len += n;
            data = &data[n..];
            if self.block_len == BLOCK_SIZE {
                let block = self.block;
                self.compress(&block);
                self.block_len = 0;
            }
        }
        while data.len() >= BLOCK_SIZE {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(&data[..BLOCK_SIZE]);
            self.compress(&block);
            data = &data[BLOCK_SIZE..];
        }
        if !data.is_empty() {
            self.block[..data.len()].copy_from_slice(data);
            self.block_len = data.len();
        }
    }

    /// Emit the digest and reset to the initial state.
    pub fn finalize(&mut self, out: &mut [u8; DIGEST_SIZE]) {
        let bit_len = self.total_len.wrapping_mul(8);
        self.update(&[0x80]);
        while self.block_len != 56 {
            self.update(&[0x00]);
        }
        // the length counter must not include its own padding
        self.total_len = 0;
        self.update(&bit_len.to_be_bytes());
        debug_assert_eq!(self.block_len, 0);

        for (i, word) in self.state.iter().enumerate() {
            out[4 * i..4 * i + 4].copy_from_slice(&word.to_be_bytes());
        }
        self.state = H0;
        self.total_len = 0;
        self.block_len = 0;
    }

    /// One-shot digest.
    pub fn digest_of(data: &[u8]) -> [u8; DIGEST_SIZE] {
        let mut sha = Sha1::new();
        sha.update(data);
        let mut out = [0u8; DIGEST_SIZE];
        sha.finalize(&mut out);
        out
    }

    fn compress(&mut self, block: &[u8; BLOCK_SIZE]) {
        let mut w = [0u32; 80];
        for i in 0..16 {
            w[i] = u32::from_be_bytes([
                block[4 * i],
                block[4 * i + 1],
                block[4 * i + 2],
                block[4 * i + 3],
            ]);
        }
        for i in 16..80 {
            w[i] = (w[i - 3] ^ w[i - 8] ^ w[i - 14] ^ w[i - 16]).rotate_left(1);
        }

        let [mut a, mut b, mut c, mut d, mut e] = self.state;
        for (i, &wi) in w.iter().enumerate() {
            let (f, k) = match i {
                0..=19 => ((b & c) | (!b & d), 0x5A82_7999),
                20..=39 => (b ^ c ^ d, 0x6ED9_EBA1),
                40..=59 => ((b & c) | (b & d) | (c & d), 0x8F1B_BCDC),
                _ => (b ^ c ^ d, 0xCA62_C1D6),
            };
            let t = a
                .rotate_left(5)
                .wrapping_add(f)
                .wrapping_add(e)
                .wrapping_add(k)
                .wrapping_add(wi);
            e = d;
            d = c;
            c = b.rotate_left(30);
            b = a;
            a = t;
        }

        self.state[0] = self.state[0].wrapping_add(a);
        self.state[1] = self.state[1].wrapping_add(b);
        self.state[2] = self.state[2].wrapping_add(c);
        self.state[3] = self.state[3].wrapping_add(d);
        self.state[4] = self.state[4].wrapping_add(e);
    }
}

impl Default for Sha1 {
    fn default() -> Self {
        Sha1::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_digest(data: &[u8]) -> String {
        hex::encode(Sha1::digest_of(data))
    }

    #[test]
    fn empty_vector() {
        assert_eq!(hex_digest(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn abc_vector() {
        assert_eq!(hex_digest(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn two_block_vector() {
        assert_eq!(
            hex_digest(b"abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq"),
            "84983e441c3bd26ebaae4aa1f95129e5e54670f1"
        );
    }

    #[test]
    fn split_updates_match_one_shot() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let mut sha = Sha1::new();
        for chunk in data.chunks(17) {
            sha.update(chunk);
        }
        let mut split = [0u8; DIGEST_SIZE];
        sha.finalize(&mut split);
        assert_eq!(split, Sha1::digest_of(&data));
    }

    #[test]
    fn finalize_resets_state() {
        let mut sha = Sha1::new();
        sha.update(b"first message");
        let mut first = [0u8; DIGEST_SIZE];
        sha.finalize(&mut first);

        sha.update(b"abc");
        let mut second = [0u8; DIGEST_SIZE];
        sha.finalize(&mut second);
        assert_eq!(second, Sha1::digest_of(b"abc"));
    }

    #[test]
    fn length_padding_crosses_block_boundary() {
        // 55, 56 and 64 byte messages exercise the padding edges.
        for len in [55usize, 56, 63, 64, 65] {
            let data = vec![0xA5u8; len];
            let mut sha = Sha1::new();
            sha.update(&data);
            let mut out = [0u8; DIGEST_SIZE];
            sha.finalize(&mut out);
            assert_eq!(out, Sha1::digest_of(&data), "len {}", len);
        }
    }
}
