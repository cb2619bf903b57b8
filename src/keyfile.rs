//! The key file: a public key in plaintext alongside a private key
//! sealed under a passphrase.
//!
//! The private half is its raw serialization run through Triple-DES in
//! single-block ECB under the 192-bit double-SHA-1 of the passphrase,
//! tail-padded with random bytes. Nothing in the protected blob
//! authenticates the passphrase directly; a wrong one simply fails the
//! private-key container magic on decrypt, which surfaces as the
//! non-fatal `BadPassphrase`.
//!
//! Passphrase buffers are handed in mutably and are overwritten with
//! random bytes once the key has been derived from them.

use crate::archive::{Archive, BidirArchive, FileArchive, MemoryArchive, OpenMode, SeekFrom};
use crate::des::{BlockCipher, Direction, HashedKey192, TripleDes, DES_BLOCK_SIZE};
use crate::elgamal::{SigPrivateKey, SigPublicKey};
use crate::error::{Error, ErrorKind, Result};
use crate::header::{HeaderId, MAGIC_KEY_FILE};
use crate::rng::{randomize_bytes, system_rng};
use std::path::Path;

/// Format version carried in the key-file preamble.
pub const KEY_FILE_VERSION_MAJOR: u16 = 2;
pub const KEY_FILE_VERSION_MINOR: u16 = 0;

/// Derive the symmetric key from a passphrase, then wipe the
/// passphrase buffer.
fn consume_passphrase(passphrase: &mut [u8]) -> HashedKey192 {
    let key = HashedKey192::new(passphrase);
    randomize_bytes(passphrase);
    key
}

/// ECB over the whole buffer; the length must be block-aligned.
fn ecb_process(dir: Direction, key: &HashedKey192, data: &mut [u8]) -> Result<()> {
    debug_assert_eq!(data.len() % DES_BLOCK_SIZE, 0);
    let mut cipher = TripleDes::new(dir, key);
    let mut block = [0u8; DES_BLOCK_SIZE];
    for chunk in data.chunks_mut(DES_BLOCK_SIZE) {
        cipher.process_block(chunk, &mut block)?;
        chunk.copy_from_slice(&block);
    }
    Ok(())
}

/// A loaded (or freshly generated) key pair with the private half at
/// rest in its encrypted form.
pub struct KeyFile {
    public_key: Option<SigPublicKey>,
    protected_private: Vec<u8>,
    private_plain: Option<SigPrivateKey>,
    use_count: u32,
}

impl KeyFile {
    pub fn new() -> KeyFile {
        KeyFile {
            public_key: None,
            protected_private: Vec::new(),
            private_plain: None,
            use_count: 0,
        }
    }

    /// The artifact-kind identifier key files carry.
    pub fn header_id() -> HeaderId {
        HeaderId(MAGIC_KEY_FILE)
    }

    pub fn keys_loaded(&self) -> bool {
        self.public_key.is_some() && !self.protected_private.is_empty()
    }

    pub fn public_key(&self) -> Result<&SigPublicKey> {
        self.public_key.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::InvalidOperation, "key file holds no keys")
        })
    }

    /// Generate a fresh pair. `bits` must be 1024 or 2048; the
    /// passphrase buffer is wiped before this returns.
    pub fn generate_keys(&mut self, bits: u32, passphrase: &mut [u8]) -> Result<()> {
        let mut rng = system_rng();
        let private = SigPrivateKey::generate(&mut rng, bits)?;
        self.install_keys(private, passphrase)
    }

    /// Install an already-generated pair under a passphrase. Also the
    /// internal tail of `generate_keys`.
    pub(crate) fn install_keys(
        &mut self,
        private: SigPrivateKey,
        passphrase: &mut [u8],
    ) -> Result<()> {
        tracing::debug!(bits = private.key_bits(), "sealing generated key pair");
        self.release_all();
        self.public_key = Some(private.public_key().clone());
        self.protected_private = Self::protect(&private, passphrase)?;
        Ok(())
    }

    fn protect(private: &SigPrivateKey, passphrase: &mut [u8]) -> Result<Vec<u8>> {
        let key = consume_passphrase(passphrase);
        let mut plain = private.to_bytes()?;
        let padded = (plain.len() + DES_BLOCK_SIZE - 1) / DES_BLOCK_SIZE * DES_BLOCK_SIZE;
        let mut pad = vec![0u8; padded - plain.len()];
        randomize_bytes(&mut pad);
        plain.extend_from_slice(&pad);
        ecb_process(Direction::Encrypt, &key, &mut plain)?;
        Ok(plain)
    }

    fn unprotect(protected: &[u8], passphrase: &mut [u8]) -> Result<SigPrivateKey> {
        let key = consume_passphrase(passphrase);
        let mut plain = protected.to_vec();
        ecb_process(Direction::Decrypt, &key, &mut plain)?;
        let result = SigPrivateKey::from_bytes(&plain);
        randomize_bytes(&mut plain);
        result.map_err(|_| Error::new(ErrorKind::BadPassphrase, String::new()))
    }

    /// Decrypt the private key into memory and hand out a reference.
    /// Calls nest; each must be paired with
    /// [`release_private_key`](Self::release_private_key). The
    /// passphrase buffer is wiped before this returns.
    pub fn get_private_key(&mut self, passphrase: &mut [u8]) -> Result<&SigPrivateKey> {
        if self.protected_private.is_empty() {
            randomize_bytes(passphrase);
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                "key file holds no keys",
            ));
        }
        let private = Self::unprotect(&self.protected_private, passphrase)?;
        if self.private_plain.is_none() {
            self.private_plain = Some(private);
        }
        self.use_count += 1;
        Ok(self.private_plain.as_ref().expect("just installed"))
    }

    /// Drop one hold on the plaintext private key; the last release
    /// destroys the in-memory copy.
    pub fn release_private_key(&mut self) {
        if self.use_count > 0 {
            self.use_count -= 1;
            if self.use_count == 0 {
                self.private_plain = None;
            }
        }
    }

    fn release_all(&mut self) {
        self.use_count = 0;
        self.private_plain = None;
    }

    /// Re-encrypt the private key under a new passphrase. The old one
    /// must decrypt successfully; both buffers are wiped.
    pub fn change_passphrase(
        &mut self,
        old_passphrase: &mut [u8],
        new_passphrase: &mut [u8],
    ) -> Result<()> {
        if self.protected_private.is_empty() {
            randomize_bytes(old_passphrase);
            randomize_bytes(new_passphrase);
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                "key file holds no keys",
            ));
        }
        let private = match Self::unprotect(&self.protected_private, old_passphrase) {
            Ok(private) => private,
            Err(e) => {
                randomize_bytes(new_passphrase);
                return Err(e);
            }
        };
        self.protected_private = Self::protect(&private, new_passphrase)?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // persistence
    // -----------------------------------------------------------------

    /// Serialized size of the key file.
    pub fn write_len(&self) -> Result<usize> {
        let public = self.public_key()?;
        Ok(4 + 2 + 2 + 2 + public.write_len() + 4 + 2 + self.protected_private.len())
    }

    fn write_archive(&self, archive: &mut dyn Archive) -> Result<()> {
        let public = self.public_key()?;
        let pub_len = public.write_len();
        if pub_len > u16::MAX as usize || self.protected_private.len() > u16::MAX as usize {
            return Err(Error::new(
                ErrorKind::Internal,
                "key material exceeds the 16-bit length fields",
            ));
        }
        archive.write_u32(MAGIC_KEY_FILE)?;
        archive.write_u16(KEY_FILE_VERSION_MAJOR)?;
        archive.write_u16(KEY_FILE_VERSION_MINOR)?;
        archive.write_u16(pub_len as u16)?;
        public.write(archive)?;
        archive.write_u32(MAGIC_KEY_FILE)?;
        archive.write_u16(self.protected_private.len() as u16)?;
        archive.write(&self.protected_private)
    }

    fn read_archive(&mut self, archive: &mut dyn Archive) -> Result<()> {
        let magic = archive.read_u32()?;
        if magic != MAGIC_KEY_FILE {
            return Err(Error::new(
                ErrorKind::BadMagic,
                format!("not a key file (magic {:#010x})", magic),
            ));
        }
        let major = archive.read_u16()?;
        let _minor = archive.read_u16()?;
        if major > KEY_FILE_VERSION_MAJOR {
            return Err(Error::new(
                ErrorKind::VersionMismatch,
                format!("key file version {} is newer than this build", major),
            ));
        }
        let pub_len = archive.read_u16()? as usize;
        let mut pub_bytes = vec![0u8; pub_len];
        archive.read_exact(&mut pub_bytes)?;
        let public = SigPublicKey::from_bytes(&pub_bytes)?;

        let separator = archive.read_u32()?;
        if separator != MAGIC_KEY_FILE {
            return Err(Error::new(
                ErrorKind::InvalidFormat,
                "key-file separator magic missing",
            ));
        }
        let priv_len = archive.read_u16()? as usize;
        if priv_len == 0 || priv_len % DES_BLOCK_SIZE != 0 {
            return Err(Error::new(
                ErrorKind::InvalidFormat,
                "protected private key is not block-aligned",
            ));
        }
        let mut protected = vec![0u8; priv_len];
        archive.read_exact(&mut protected)?;

        self.release_all();
        self.public_key = Some(public);
        self.protected_private = protected;
        Ok(())
    }

    pub fn write_mem(&self, out: &mut [u8]) -> Result<usize> {
        let len = self.write_len()?;
        if out.len() < len {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "buffer smaller than the key file",
            ));
        }
        let mut mem = MemoryArchive::new();
        self.write_archive(&mut mem)?;
        out[..len].copy_from_slice(mem.as_slice());
        Ok(len)
    }

    pub fn read_mem(&mut self, bytes: &[u8]) -> Result<()> {
        let mut mem = MemoryArchive::from_vec(bytes.to_vec());
        self.read_archive(&mut mem)
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = FileArchive::open(path, OpenMode::Truncate)?;
        self.write_archive(&mut file)
    }

    pub fn read_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = FileArchive::open_read(path)?;
        file.seek(SeekFrom::Beginning(0))?;
        self.read_archive(&mut file)
    }
}

impl Default for KeyFile {
    fn default() -> Self {
        KeyFile::new()
    }
}

/// Scoped hold on a key file's private key; releases on every exit
/// path, including unwinds.
pub struct PrivateKeyProxy<'a> {
    keyfile: &'a mut KeyFile,
}

impl<'a> PrivateKeyProxy<'a> {
    /// Acquire the private key; the passphrase buffer is wiped.
    pub fn acquire(
        keyfile: &'a mut KeyFile,
        passphrase: &mut [u8],
    ) -> Result<PrivateKeyProxy<'a>> {
        keyfile.get_private_key(passphrase)?;
        Ok(PrivateKeyProxy { keyfile })
    }

    pub fn key(&self) -> &SigPrivateKey {
        self.keyfile
            .private_plain
            .as_ref()
            .expect("proxy holds a use count")
    }
}

impl Drop for PrivateKeyProxy<'_> {
    fn drop(&mut self) {
        self.keyfile.release_private_key();
    }
}
