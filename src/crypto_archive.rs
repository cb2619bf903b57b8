//! The crypto archive: compression and block-cipher framing layered
//! over an underlying byte archive.
//!
//! Written bytes are deflated, gathered into cipher-plaintext-sized
//! chunks, transformed by the mounted [`BlockCipher`], and appended to
//! the backing archive; the final short chunk is padded with random
//! bytes before it is processed. Reading runs the pipeline in reverse,
//! with the inflater inferring end-of-stream so the pad needs no length
//! prefix. Direction is fixed by the first read or write after
//! [`start`](CryptoArchive::start); mixing directions is an
//! `InvalidOperation`.

use crate::archive::Archive;
use crate::des::{BlockCipher, NullCipher};
use crate::elgamal::{SigPrivateKey, SigPublicKey, SigningCipher};
use crate::error::{Error, ErrorKind, Result};
use crate::flate::{Deflator, Inflator};
use crate::rng::randomize_bytes;

/// Deflate level used for every persistent artifact.
pub const CRYPTO_COMPRESSION_LEVEL: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Unknown,
    Reading,
    Writing,
    Finished,
}

/// Compress-then-cipher pipeline over a borrowed archive.
pub struct CryptoArchive<'a> {
    archive: &'a mut dyn Archive,
    cipher: Box<dyn BlockCipher>,
    mode: Mode,
    deflator: Option<Deflator>,
    inflator: Option<Inflator>,
    /// Write side: plaintext chunk being assembled.
    chunk: Vec<u8>,
    chunk_used: usize,
    /// Read side: the backing archive is exhausted.
    source_done: bool,
}

impl<'a> CryptoArchive<'a> {
    /// Bind a cipher over an archive. The first read or write picks
    /// the direction.
    pub fn start(archive: &'a mut dyn Archive, cipher: Box<dyn BlockCipher>) -> CryptoArchive<'a> {
        CryptoArchive {
            archive,
            cipher,
            mode: Mode::Unknown,
            deflator: None,
            inflator: None,
            chunk: Vec::new(),
            chunk_used: 0,
            source_done: false,
        }
    }

    /// Flush buffered state. After a write session this pads and
    /// writes the final chunk; required before the artifact is
    /// complete.
    pub fn finish(&mut self) -> Result<()> {
        match self.mode {
            Mode::Writing => self.finish_writing(),
            Mode::Reading | Mode::Unknown | Mode::Finished => {
                self.mode = Mode::Finished;
                Ok(())
            }
        }
    }

    fn finish_writing(&mut self) -> Result<()> {
        let deflator = self.deflator.as_mut().expect("writing implies a deflator");
        deflator.input_finished()?;
        self.drain_deflated()?;
        if self.chunk_used > 0 {
            let used = self.chunk_used;
            randomize_bytes(&mut self.chunk[used..]);
            self.process_chunk()?;
        }
        self.deflator = None;
        self.mode = Mode::Finished;
        Ok(())
    }

    /// Move deflated bytes into cipher-sized chunks, writing each full
    /// chunk through the cipher.
    fn drain_deflated(&mut self) -> Result<()> {
        loop {
            let deflator = self.deflator.as_mut().expect("writing implies a deflator");
            let pending = deflator.output().current_size();
            if pending == 0 {
                return Ok(());
            }
            let want = self.chunk.len() - self.chunk_used;
            let take = want.min(pending);
            let got = deflator.output().get(&mut self.chunk[self.chunk_used..self.chunk_used + take]);
            debug_assert_eq!(got, take);
            self.chunk_used += take;
            if self.chunk_used == self.chunk.len() {
                self.process_chunk()?;
            }
        }
    }

    fn process_chunk(&mut self) -> Result<()> {
        let mut out = vec![0u8; self.cipher.block_size_cipher()];
        self.cipher.process_block(&self.chunk, &mut out)?;
        self.archive.write(&out)?;
        self.chunk_used = 0;
        Ok(())
    }

    /// Pull one cipher block from the source into the inflater.
    /// Returns false when the source is exhausted.
    fn pump_block(&mut self) -> Result<bool> {
        if self.source_done {
            return Ok(false);
        }
        let cipher_size = self.cipher.block_size_cipher();
        let mut buf = vec![0u8; cipher_size];
        let n = self.archive.read(&mut buf)?;
        if n < cipher_size {
            self.source_done = true;
            let inflator = self.inflator.as_mut().expect("reading implies an inflator");
            inflator.input_finished()?;
            return Ok(false);
        }
        let mut plain = vec![0u8; self.cipher.block_size_plain()];
        self.cipher.process_block(&buf, &mut plain)?;
        let inflator = self.inflator.as_mut().expect("reading implies an inflator");
        inflator.put(&plain)?;
        if inflator.is_done() {
            // final deflate block decoded; the rest is pad
            self.source_done = true;
        }
        Ok(true)
    }
}

impl Archive for CryptoArchive<'_> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        match self.mode {
            Mode::Unknown => {
                self.mode = Mode::Writing;
                self.deflator = Some(Deflator::new(CRYPTO_COMPRESSION_LEVEL));
                self.chunk = vec![0u8; self.cipher.block_size_plain()];
                self.chunk_used = 0;
            }
            Mode::Writing => {}
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    "write on a non-writing crypto archive",
                ))
            }
        }
        self.deflator
            .as_mut()
            .expect("writing implies a deflator")
            .put(data)?;
        self.drain_deflated()
    }

    fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        match self.mode {
            Mode::Unknown => {
                self.mode = Mode::Reading;
                self.inflator = Some(Inflator::new());
            }
            Mode::Reading => {}
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    "read on a non-reading crypto archive",
                ))
            }
        }
        while self
            .inflator
            .as_ref()
            .expect("reading implies an inflator")
            .available()
            < out.len()
        {
            if !self.pump_block()? {
                break;
            }
        }
        let inflator = self.inflator.as_mut().expect("reading implies an inflator");
        Ok(inflator.output().get(out))
    }

    fn end_of_file(&mut self) -> bool {
        match self.mode {
            Mode::Reading => {}
            _ => return true,
        }
        loop {
            let available = self
                .inflator
                .as_ref()
                .expect("reading implies an inflator")
                .available();
            if available > 0 {
                return false;
            }
            if self.source_done {
                return true;
            }
            match self.pump_block() {
                Ok(true) => continue,
                Ok(false) => return true,
                Err(_) => {
                    self.source_done = true;
                    return true;
                }
            }
        }
    }
}

impl Drop for CryptoArchive<'_> {
    fn drop(&mut self) {
        if self.mode == Mode::Writing {
            // flush the partial write; errors have nowhere to go here
            let _ = self.finish_writing();
        }
    }
}

/// Compressed but unencrypted: the null cipher keeps the framing
/// byte-identical to the encrypted variants.
pub struct NullCryptoArchive<'a> {
    inner: CryptoArchive<'a>,
}

impl<'a> NullCryptoArchive<'a> {
    pub fn start(archive: &'a mut dyn Archive) -> NullCryptoArchive<'a> {
        NullCryptoArchive {
            inner: CryptoArchive::start(archive, Box::new(NullCipher)),
        }
    }

    pub fn finish(&mut self) -> Result<()> {
        self.inner.finish()
    }
}

impl Archive for NullCryptoArchive<'_> {
    fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        self.inner.read(out)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write(data)
    }

    fn end_of_file(&mut self) -> bool {
        self.inner.end_of_file()
    }
}

/// Signing archive: every block travels with an ElGamal signature and
/// verification happens transparently on the way back in. A mismatch
/// surfaces as `CryptoFailure` and the read must be abandoned.
pub struct SigningArchive<'a> {
    inner: CryptoArchive<'a>,
}

impl<'a> SigningArchive<'a> {
    /// Open for writing; blocks are signed with the private key.
    pub fn set_write(
        archive: &'a mut dyn Archive,
        key: &SigPrivateKey,
    ) -> SigningArchive<'a> {
        SigningArchive {
            inner: CryptoArchive::start(archive, Box::new(SigningCipher::signing(key.clone()))),
        }
    }

    /// Open for reading; blocks are verified with the public key.
    pub fn set_read(
        archive: &'a mut dyn Archive,
        key: &SigPublicKey,
    ) -> SigningArchive<'a> {
        SigningArchive {
            inner: CryptoArchive::start(archive, Box::new(SigningCipher::verifying(key.clone()))),
        }
    }

    /// Flush and seal the written artifact.
    pub fn flush_write(&mut self) -> Result<()> {
        self.inner.finish()
    }
}

impl Archive for SigningArchive<'_> {
    fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        self.inner.read(out)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write(data)
    }

    fn end_of_file(&mut self) -> bool {
        self.inner.end_of_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{BidirArchive, MemoryArchive, SeekFrom};
    use crate::des::{Direction, HashedKey192, TripleDes};
    use crate::elgamal::SigPrivateKey;
    use crate::rng::{randomize_bytes, X917Rng};

    fn test_rng() -> X917Rng {
        let key: Vec<u8> = (50u8..74).collect();
        X917Rng::new(
            TripleDes::from_key_bytes(Direction::Encrypt, &key),
            *b"archseed",
        )
    }

    const SIZEOF_CHUNK: usize = 7;
    const NUM_CHUNKS: usize = 1024 * 32;
    const TEST_CHUNKSIZE: usize = 1023 * 7;

    fn build_image() -> MemoryArchive {
        let mut memory = MemoryArchive::with_max_size(0x0080_0000);
        let mut chunk = [0u8; SIZEOF_CHUNK];
        for _ in 0..NUM_CHUNKS {
            randomize_bytes(&mut chunk);
            memory.write(&chunk).unwrap();
        }
        memory
    }

    #[test]
    fn null_crypto_archive_round_trip() {
        let mut memory = build_image();
        let mut packed = MemoryArchive::new();

        {
            let mut out = NullCryptoArchive::start(&mut packed);
            memory.seek(SeekFrom::Beginning(0)).unwrap();
            while !memory.end_of_file() {
                let mut buf = [0u8; SIZEOF_CHUNK];
                memory.read_exact(&mut buf).unwrap();
                out.write(&buf).unwrap();
            }
            out.finish().unwrap();
        }

        packed.seek(SeekFrom::Beginning(0)).unwrap();
        let mut inp = NullCryptoArchive::start(&mut packed);
        let total = NUM_CHUNKS * SIZEOF_CHUNK;
        let mut index = 0usize;
        while index < total {
            let stride = TEST_CHUNKSIZE.min(total - index);
            let mut buf = vec![0u8; stride];
            inp.read(&mut buf).unwrap();
            let expect = memory.map_archive(index as u64, stride).unwrap();
            assert_eq!(&buf[..], expect);
            index += stride;
        }
        assert!(inp.end_of_file());
    }

    #[test]
    fn triple_des_archive_round_trip() {
        let key = HashedKey192::new(b"puddy, puddy, puddy, poo!");
        let data: Vec<u8> = (0..50_000u32).map(|i| (i * 31 % 253) as u8).collect();
        let mut backing = MemoryArchive::new();

        {
            let enc = TripleDes::new(Direction::Encrypt, &key);
            let mut out = CryptoArchive::start(&mut backing, Box::new(enc));
            out.write(&data).unwrap();
            out.finish().unwrap();
        }

        // ciphertext must not contain the plaintext run
        assert_ne!(backing.as_slice(), &data[..]);
        assert_eq!(backing.as_slice().len() % 8, 0);

        backing.seek(SeekFrom::Beginning(0)).unwrap();
        let dec = TripleDes::new(Direction::Decrypt, &key);
        let mut inp = CryptoArchive::start(&mut backing, Box::new(dec));
        let mut buf = vec![0u8; data.len()];
        assert_eq!(inp.read(&mut buf).unwrap(), data.len());
        assert_eq!(buf, data);
        assert!(inp.end_of_file());
    }

    #[test]
    fn wrong_direction_is_invalid_operation() {
        let mut backing = MemoryArchive::new();
        let mut arch = NullCryptoArchive::start(&mut backing);
        arch.write(b"some bytes").unwrap();
        let mut buf = [0u8; 4];
        let err = arch.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        arch.finish().unwrap();
        let err = arch.write(b"more").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn drop_flushes_a_partial_write() {
        let mut backing = MemoryArchive::new();
        {
            let mut arch = NullCryptoArchive::start(&mut backing);
            arch.write(b"dropped without finish").unwrap();
            // no finish() before drop
        }
        backing.seek(SeekFrom::Beginning(0)).unwrap();
        let mut arch = NullCryptoArchive::start(&mut backing);
        let mut buf = vec![0u8; 22];
        assert_eq!(arch.read(&mut buf).unwrap(), 22);
        assert_eq!(&buf, b"dropped without finish");
    }

    #[test]
    fn signing_archive_round_trip_and_tamper() {
        let mut rng = test_rng();
        let key = SigPrivateKey::generate_unchecked(&mut rng, 256).unwrap();

        let data: Vec<u8> = (0..30_000u32).map(|i| (i % 256) as u8).collect();
        let mut backing = MemoryArchive::new();
        {
            let mut out = SigningArchive::set_write(&mut backing, &key);
            out.write(&data).unwrap();
            out.flush_write().unwrap();
        }

        // clean read verifies
        backing.seek(SeekFrom::Beginning(0)).unwrap();
        {
            let mut inp = SigningArchive::set_read(&mut backing, key.public_key());
            let mut buf = vec![0u8; data.len()];
            assert_eq!(inp.read(&mut buf).unwrap(), data.len());
            assert_eq!(buf, data);
        }

        // flip one plaintext byte inside the first signed block
        backing.seek(SeekFrom::Beginning(0)).unwrap();
        let mut bytes = backing.into_vec();
        bytes[100] ^= 0x01;
        let mut tampered = MemoryArchive::from_vec(bytes);
        let mut inp = SigningArchive::set_read(&mut tampered, key.public_key());
        let mut buf = vec![0u8; data.len()];
        let err = inp.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CryptoFailure);
    }

    #[test]
    fn signing_archive_rejects_wrong_key() {
        let mut rng = test_rng();
        let key = SigPrivateKey::generate_unchecked(&mut rng, 256).unwrap();
        let other = SigPrivateKey::generate_unchecked(&mut rng, 256).unwrap();

        let mut backing = MemoryArchive::new();
        {
            let mut out = SigningArchive::set_write(&mut backing, &key);
            out.write(b"signed artifact body").unwrap();
            out.flush_write().unwrap();
        }
        backing.seek(SeekFrom::Beginning(0)).unwrap();
        let mut inp = SigningArchive::set_read(&mut backing, other.public_key());
        let mut buf = [0u8; 20];
        let err = inp.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CryptoFailure);
    }

    #[test]
    fn empty_write_session_reads_back_empty() {
        let mut backing = MemoryArchive::new();
        {
            let mut out = NullCryptoArchive::start(&mut backing);
            out.write(b"").unwrap();
            out.finish().unwrap();
        }
        backing.seek(SeekFrom::Beginning(0)).unwrap();
        let mut inp = NullCryptoArchive::start(&mut backing);
        let mut buf = [0u8; 16];
        assert_eq!(inp.read(&mut buf).unwrap(), 0);
        assert!(inp.end_of_file());
    }
}
