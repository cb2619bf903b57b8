//! ElGamal signatures over a prime-order subgroup, and the signing
//! cipher façade the archive pipeline mounts.
//!
//! A public key is `(p, q, g, y)` with `q` a prime divisor of `p - 1`,
//! `g` of order `q` mod `p`, and `y = g^x`. Signatures are `(r, s)`
//! with `r = (g^k mod p + h) mod q` and `s = (k - x·r) mod q`, each
//! encoded unsigned at the fixed width of `q`. The wire container
//! formats (key-bits field, container magics, length-framed fields)
//! are pinned and must not change.

use crate::archive::{Archive, MemoryArchive};
use crate::error::{Error, ErrorKind, Result};
use crate::des::BlockCipher;
use crate::integer::{Integer, Signedness};
use crate::modular::Montgomery;
use crate::nbtheory::{
    discrete_log_work_factor, random_integer, PrimeAndGenerator, RandomType,
};
use crate::rng::{randomize_bytes, system_rng, RandomSource, X917Rng};
use crate::sha1::Sha1;

/// Container magic for a serialized public key.
pub const PUBLIC_KEY_MAGIC: u32 = 0x7AE2_C945;
/// Container magic for a serialized private key.
pub const PRIVATE_KEY_MAGIC: u32 = 0x0D0F_FA12;

/// Plaintext block size of the signing cipher.
pub const PLAIN_BLOCK_SIZE: usize = 4083;

fn write_framed_integer(archive: &mut dyn Archive, value: &Integer) -> Result<()> {
    let bytes = value.encode_to_vec(Signedness::Unsigned);
    archive.write_u32(bytes.len() as u32)?;
    archive.write(&bytes)
}

fn read_framed_integer(archive: &mut dyn Archive) -> Result<Integer> {
    let len = archive.read_u32()? as usize;
    if len > 9000 {
        return Err(Error::new(
            ErrorKind::InvalidFormat,
            "unreasonable integer field length",
        ));
    }
    let mut bytes = vec![0u8; len];
    archive.read_exact(&mut bytes)?;
    Ok(Integer::decode(&bytes, Signedness::Unsigned))
}

fn framed_len(value: &Integer) -> usize {
    4 + value.min_encoded_size(Signedness::Unsigned)
}

/// Verifying half of a signature key pair.
#[derive(Clone, Debug)]
pub struct SigPublicKey {
    key_bits: u16,
    p: Integer,
    q: Integer,
    g: Integer,
    y: Integer,
    q_len: usize,
    // non-persistent exponent precomputation
    ring: Montgomery,
    g_mont: Integer,
    y_mont: Integer,
}

impl SigPublicKey {
    /// Assemble from raw group parameters.
    pub fn new(key_bits: u16, p: Integer, q: Integer, g: Integer, y: Integer) -> Result<SigPublicKey> {
        let ring = Montgomery::new(p.clone())?;
        let g_mont = ring.convert_in(&g);
        let y_mont = ring.convert_in(&y);
        let q_len = q.byte_count();
        Ok(SigPublicKey {
            key_bits,
            p,
            q,
            g,
            y,
            q_len,
            ring,
            g_mont,
            y_mont,
        })
    }

    pub fn key_bits(&self) -> u16 {
        self.key_bits
    }

    /// Byte width of each signature half.
    pub fn q_byte_count(&self) -> usize {
        self.q_len
    }

    /// Total signature length in bytes.
    pub fn signature_length(&self) -> usize {
        2 * self.q_len
    }

    /// Verify `signature` over a message digest. Rejects `r == 0`.
    pub fn verify_digest(&self, digest: &[u8], signature: &[u8]) -> bool {
        if signature.len() < self.signature_length() {
            return false;
        }
        let h = Integer::decode(digest, Signedness::Unsigned);
        let r = Integer::decode(&signature[..self.q_len], Signedness::Unsigned);
        let s = Integer::decode(&signature[self.q_len..2 * self.q_len], Signedness::Unsigned);
        if r.is_zero() {
            return false;
        }
        // r == (g^s * y^r mod p + h) mod q
        let gs_yr = self
            .ring
            .convert_out(&self.ring.cascade_exponentiate(&self.g_mont, &s, &self.y_mont, &r));
        match (&gs_yr + &h).modulo(&self.q) {
            Ok(expect) => expect == r,
            Err(_) => false,
        }
    }

    /// Key-identity comparison: same group and same `y`.
    pub fn is_equal(&self, other: &SigPublicKey) -> bool {
        self.p == other.p && self.q == other.q && self.g == other.g && self.y == other.y
    }

    pub fn write(&self, archive: &mut dyn Archive) -> Result<()> {
        archive.write_u16(self.key_bits)?;
        archive.write_u32(PUBLIC_KEY_MAGIC)?;
        write_framed_integer(archive, &self.p)?;
        write_framed_integer(archive, &self.q)?;
        write_framed_integer(archive, &self.g)?;
        write_framed_integer(archive, &self.y)
    }

    pub fn read(archive: &mut dyn Archive) -> Result<SigPublicKey> {
        let key_bits = archive.read_u16()?;
        let magic = archive.read_u32()?;
        if magic != PUBLIC_KEY_MAGIC {
            return Err(Error::new(
                ErrorKind::BadMagic,
                format!("expected public-key magic, found {:#010x}", magic),
            ));
        }
        let p = read_framed_integer(archive)?;
        let q = read_framed_integer(archive)?;
        let g = read_framed_integer(archive)?;
        let y = read_framed_integer(archive)?;
        SigPublicKey::new(key_bits, p, q, g, y)
    }

    /// Serialized size in bytes.
    pub fn write_len(&self) -> usize {
        2 + 4
            + framed_len(&self.p)
            + framed_len(&self.q)
            + framed_len(&self.g)
            + framed_len(&self.y)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut mem = MemoryArchive::new();
        self.write(&mut mem)?;
        Ok(mem.into_vec())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<SigPublicKey> {
        let mut mem = MemoryArchive::from_vec(bytes.to_vec());
        SigPublicKey::read(&mut mem)
    }
}

impl PartialEq for SigPublicKey {
    fn eq(&self, other: &SigPublicKey) -> bool {
        self.is_equal(other)
    }
}

impl Eq for SigPublicKey {}

/// Signing half of a key pair: the public parameters plus `x`.
#[derive(Clone, Debug)]
pub struct SigPrivateKey {
    public: SigPublicKey,
    x: Integer,
}

impl SigPrivateKey {
    /// Generate a fresh key pair. Only 1024- and 2048-bit moduli are
    /// accepted.
    pub fn generate(rng: &mut dyn RandomSource, bits: u32) -> Result<SigPrivateKey> {
        if bits != 1024 && bits != 2048 {
            return Err(Error::new(
                ErrorKind::InvalidKeySize,
                format!("{}-bit keys are not supported", bits),
            ));
        }
        SigPrivateKey::generate_unchecked(rng, bits as usize)
    }

    /// Key generation without the size gate; the small sizes exist for
    /// test builds only.
    pub(crate) fn generate_unchecked(
        rng: &mut dyn RandomSource,
        bits: usize,
    ) -> Result<SigPrivateKey> {
        let qbits = 2 * discrete_log_work_factor(bits);
        let pg = PrimeAndGenerator::with_subgroup(1, rng, bits, qbits)?;
        let two = Integer::from(2u32);
        let x_max = &(pg.sub_prime() - &two);
        let x = random_integer(rng, &two, x_max, RandomType::Any)?;

        let ring = Montgomery::new(pg.prime().clone())?;
        let g_mont = ring.convert_in(pg.generator());
        let y = ring.convert_out(&ring.exponentiate(&g_mont, &x));

        let public = SigPublicKey::new(
            bits as u16,
            pg.prime().clone(),
            pg.sub_prime().clone(),
            pg.generator().clone(),
            y,
        )?;
        Ok(SigPrivateKey { public, x })
    }

    /// Assemble from raw parameters, recomputing nothing; `y` must
    /// already match `g^x`.
    pub fn from_params(
        key_bits: u16,
        p: Integer,
        q: Integer,
        g: Integer,
        y: Integer,
        x: Integer,
    ) -> Result<SigPrivateKey> {
        Ok(SigPrivateKey {
            public: SigPublicKey::new(key_bits, p, q, g, y)?,
            x,
        })
    }

    pub fn public_key(&self) -> &SigPublicKey {
        &self.public
    }

    pub fn key_bits(&self) -> u16 {
        self.public.key_bits
    }

    pub fn signature_length(&self) -> usize {
        self.public.signature_length()
    }

    /// Sign a message digest into `signature` (exactly
    /// [`signature_length`](Self::signature_length) bytes).
    pub fn sign_digest(
        &self,
        rng: &mut dyn RandomSource,
        digest: &[u8],
        signature: &mut [u8],
    ) -> Result<()> {
        if signature.len() < self.signature_length() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "signature buffer too small",
            ));
        }
        let h = Integer::decode(digest, Signedness::Unsigned);
        let q = &self.public.q;
        let two = Integer::from(2u32);
        let k_max = q - &two;

        let (r, s) = loop {
            let k = random_integer(rng, &two, &k_max, RandomType::Any)?;
            let gk = self
                .public
                .ring
                .convert_out(&self.public.ring.exponentiate(&self.public.g_mont, &k));
            let r = (&gk + &h).modulo(q)?;
            if r.is_zero() {
                continue;
            }
            let s = (&k - &(&self.x * &r)).modulo(q)?;
            break (r, s);
        };

        let q_len = self.public.q_len;
        r.encode(&mut signature[..q_len], Signedness::Unsigned)?;
        s.encode(&mut signature[q_len..2 * q_len], Signedness::Unsigned)?;
        Ok(())
    }

    pub fn write(&self, archive: &mut dyn Archive) -> Result<()> {
        archive.write_u16(self.public.key_bits)?;
        archive.write_u32(PRIVATE_KEY_MAGIC)?;
        write_framed_integer(archive, &self.public.p)?;
        write_framed_integer(archive, &self.public.q)?;
        write_framed_integer(archive, &self.public.g)?;
        write_framed_integer(archive, &self.public.y)?;
        write_framed_integer(archive, &self.x)
    }

    /// Read a private key. A wrong container magic surfaces as
    /// `BadMagic`; the key-file layer maps that to a bad passphrase.
    pub fn read(archive: &mut dyn Archive) -> Result<SigPrivateKey> {
        let key_bits = archive.read_u16()?;
        let magic = archive.read_u32()?;
        if magic != PRIVATE_KEY_MAGIC {
            return Err(Error::new(
                ErrorKind::BadMagic,
                format!("expected private-key magic, found {:#010x}", magic),
            ));
        }
        let p = read_framed_integer(archive)?;
        let q = read_framed_integer(archive)?;
        let g = read_framed_integer(archive)?;
        let y = read_framed_integer(archive)?;
        let x = read_framed_integer(archive)?;
        Ok(SigPrivateKey {
            public: SigPublicKey::new(key_bits, p, q, g, y)?,
            x,
        })
    }

    pub fn write_len(&self) -> usize {
        self.public.write_len() + framed_len(&self.x)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut mem = MemoryArchive::new();
        self.write(&mut mem)?;
        Ok(mem.into_vec())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<SigPrivateKey> {
        let mut mem = MemoryArchive::from_vec(bytes.to_vec());
        SigPrivateKey::read(&mut mem)
    }
}

enum SigningMode {
    Sign { key: SigPrivateKey, rng: X917Rng },
    Verify { key: SigPublicKey },
}

/// The signing "cipher": each plaintext block travels in the clear
/// followed by random fill and an ElGamal signature over the block's
/// SHA-1 digest. Verification happens in `process_block` on the way
/// back in; a mismatch is a `CryptoFailure`.
pub struct SigningCipher {
    mode: SigningMode,
    key_bits: usize,
}

impl SigningCipher {
    pub fn signing(key: SigPrivateKey) -> SigningCipher {
        let key_bits = key.key_bits() as usize;
        SigningCipher {
            mode: SigningMode::Sign {
                key,
                rng: system_rng(),
            },
            key_bits,
        }
    }

    pub fn verifying(key: SigPublicKey) -> SigningCipher {
        let key_bits = key.key_bits() as usize;
        SigningCipher {
            mode: SigningMode::Verify { key },
            key_bits,
        }
    }
}

impl BlockCipher for SigningCipher {
    fn block_size_plain(&self) -> usize {
        PLAIN_BLOCK_SIZE
    }

    fn block_size_cipher(&self) -> usize {
        PLAIN_BLOCK_SIZE + (discrete_log_work_factor(self.key_bits) >> 1) + 4
    }

    fn process_block(&mut self, input: &[u8], output: &mut [u8]) -> Result<()> {
        match &mut self.mode {
            SigningMode::Sign { key, rng } => {
                let cipher_size = PLAIN_BLOCK_SIZE + (discrete_log_work_factor(self.key_bits) >> 1) + 4;
                if input.len() != PLAIN_BLOCK_SIZE || output.len() != cipher_size {
                    return Err(Error::new(
                        ErrorKind::InvalidArgument,
                        "signing cipher block size mismatch",
                    ));
                }
                output[..PLAIN_BLOCK_SIZE].copy_from_slice(input);
                let digest = Sha1::digest_of(&output[..PLAIN_BLOCK_SIZE]);
                // random fill, then the signature in the block's tail
                randomize_bytes(&mut output[PLAIN_BLOCK_SIZE..]);
                let sig_len = key.signature_length();
                let sig_at = cipher_size - sig_len;
                let mut sig = vec![0u8; sig_len];
                key.sign_digest(rng, &digest, &mut sig)?;
                output[sig_at..].copy_from_slice(&sig);
                Ok(())
            }
            SigningMode::Verify { key } => {
                let cipher_size = PLAIN_BLOCK_SIZE + (discrete_log_work_factor(self.key_bits) >> 1) + 4;
                if input.len() != cipher_size || output.len() != PLAIN_BLOCK_SIZE {
                    return Err(Error::new(
                        ErrorKind::InvalidArgument,
                        "signing cipher block size mismatch",
                    ));
                }
                let digest = Sha1::digest_of(&input[..PLAIN_BLOCK_SIZE]);
                let sig = &input[cipher_size - key.signature_length()..];
                if !key.verify_digest(&digest, sig) {
                    return Err(Error::new(ErrorKind::CryptoFailure, String::new()));
                }
                output.copy_from_slice(&input[..PLAIN_BLOCK_SIZE]);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::des::{Direction, TripleDes};

    fn test_rng() -> X917Rng {
        let key: Vec<u8> = (100u8..124).collect();
        X917Rng::new(
            TripleDes::from_key_bytes(Direction::Encrypt, &key),
            *b"elgseeds",
        )
    }

    fn small_key() -> SigPrivateKey {
        let mut rng = test_rng();
        SigPrivateKey::generate_unchecked(&mut rng, 256).unwrap()
    }

    #[test]
    fn generate_rejects_nonstandard_sizes() {
        let mut rng = test_rng();
        for bits in [256u32, 512, 768, 4096] {
            let err = SigPrivateKey::generate(&mut rng, bits).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidKeySize);
        }
    }

    #[test]
    fn sign_verify_round_trip() {
        let key = small_key();
        let mut rng = test_rng();
        let digest = Sha1::digest_of(b"hello");
        let mut sig = vec![0u8; key.signature_length()];
        key.sign_digest(&mut rng, &digest, &mut sig).unwrap();
        assert!(key.public_key().verify_digest(&digest, &sig));
    }

    #[test]
    fn flipped_signature_fails() {
        let key = small_key();
        let mut rng = test_rng();
        let digest = Sha1::digest_of(b"hello");
        let mut sig = vec![0u8; key.signature_length()];
        key.sign_digest(&mut rng, &digest, &mut sig).unwrap();

        let last = sig.len() - 1;
        sig[last] ^= 0x01;
        assert!(!key.public_key().verify_digest(&digest, &sig));
    }

    #[test]
    fn flipped_message_fails() {
        let key = small_key();
        let mut rng = test_rng();
        let digest = Sha1::digest_of(b"hello");
        let mut sig = vec![0u8; key.signature_length()];
        key.sign_digest(&mut rng, &digest, &mut sig).unwrap();

        let other = Sha1::digest_of(b"hellp");
        assert!(!key.public_key().verify_digest(&other, &sig));
    }

    #[test]
    fn zero_r_is_rejected() {
        let key = small_key();
        let digest = Sha1::digest_of(b"hello");
        let sig = vec![0u8; key.signature_length()];
        assert!(!key.public_key().verify_digest(&digest, &sig));
    }

    #[test]
    fn key_serialization_round_trip() {
        let key = small_key();
        let bytes = key.to_bytes().unwrap();
        assert_eq!(bytes.len(), key.write_len());
        let back = SigPrivateKey::from_bytes(&bytes).unwrap();
        assert!(back.public_key().is_equal(key.public_key()));
        assert_eq!(back.x, key.x);

        let pub_bytes = key.public_key().to_bytes().unwrap();
        assert_eq!(pub_bytes.len(), key.public_key().write_len());
        let pub_back = SigPublicKey::from_bytes(&pub_bytes).unwrap();
        assert!(pub_back.is_equal(key.public_key()));

        // signatures made before serialization verify after it
        let mut rng = test_rng();
        let digest = Sha1::digest_of(b"round trip");
        let mut sig = vec![0u8; key.signature_length()];
        key.sign_digest(&mut rng, &digest, &mut sig).unwrap();
        assert!(pub_back.verify_digest(&digest, &sig));
    }

    #[test]
    fn key_wire_format_layout() {
        let key = small_key();
        let bytes = key.public_key().to_bytes().unwrap();
        // key-bits(16) then the container magic(32), big-endian
        assert_eq!(&bytes[..2], &(key.key_bits()).to_be_bytes());
        assert_eq!(&bytes[2..6], &PUBLIC_KEY_MAGIC.to_be_bytes());

        let priv_bytes = key.to_bytes().unwrap();
        assert_eq!(&priv_bytes[2..6], &PRIVATE_KEY_MAGIC.to_be_bytes());
    }

    #[test]
    fn private_read_rejects_public_container() {
        let key = small_key();
        let bytes = key.public_key().to_bytes().unwrap();
        let err = SigPrivateKey::from_bytes(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadMagic);
    }

    #[test]
    fn verifier_from_private_matches_stored_public() {
        // y recomputed from x must equal the stored y
        let key = small_key();
        let ring = Montgomery::new(key.public.p.clone()).unwrap();
        let g = ring.convert_in(&key.public.g);
        let y = ring.convert_out(&ring.exponentiate(&g, &key.x));
        assert_eq!(y, key.public.y);
    }

    #[test]
    fn signing_cipher_block_round_trip() {
        let key = small_key();
        let mut signer = SigningCipher::signing(key.clone());
        let mut verifier = SigningCipher::verifying(key.public_key().clone());
        assert_eq!(signer.block_size_plain(), PLAIN_BLOCK_SIZE);
        assert!(signer.block_size_cipher() >= PLAIN_BLOCK_SIZE + key.signature_length());

        let plain: Vec<u8> = (0..PLAIN_BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
        let mut cipher = vec![0u8; signer.block_size_cipher()];
        signer.process_block(&plain, &mut cipher).unwrap();
        assert_eq!(&cipher[..PLAIN_BLOCK_SIZE], &plain[..]);

        let mut back = vec![0u8; PLAIN_BLOCK_SIZE];
        verifier.process_block(&cipher, &mut back).unwrap();
        assert_eq!(back, plain);

        // tampering anywhere in the plaintext is caught
        cipher[17] ^= 0x80;
        let err = verifier.process_block(&cipher, &mut back).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CryptoFailure);
    }
}
