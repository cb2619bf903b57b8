//! witness-pack: the trust core of a file-integrity assessment system.
//!
//! Every persistent artifact the system produces — the state database,
//! change reports, the configuration, the policy, and the key file —
//! flows through the streaming archive stack in this crate: typed
//! serialization on top, deflate compression and block-cipher framing
//! in the middle, a uniform byte archive at the bottom. The
//! cryptographic kernel underneath (multi-precision integers, ElGamal
//! signatures, SHA-1, Triple-DES, an ANSI X9.17 generator) is
//! implemented here because the on-disk formats pin its byte-level
//! behavior.
//!
//! The crate is synchronous and single-threaded by design: an archive,
//! cipher, integer, or queue belongs to exactly one owner, and the
//! only blocking points are the file descriptors at the bottom of the
//! pipeline.
//!
//! # Layout
//!
//! * [`archive`] — byte archives: memory, file, locked-temporary.
//! * [`queue`] — the unbounded byte FIFO gluing pipeline stages.
//! * [`integer`], [`modular`], [`nbtheory`] — the big-integer kernel.
//! * [`sha1`], [`des`], [`rng`] — digest, block ciphers, randomness.
//! * [`elgamal`] — signature keys and the signing block cipher.
//! * [`flate`] — deflate-compatible compression.
//! * [`crypto_archive`] — the compress/cipher pipeline and facades.
//! * [`ser`] — versioned typed serialization with a class registry.
//! * [`header`] — artifact preambles (magic, version, encoding).
//! * [`keyfile`] — passphrase-protected key storage.
//! * [`error`], [`bucket`] — the error model and bucket chains.

pub mod archive;
pub mod bucket;
pub mod crypto_archive;
pub mod des;
pub mod elgamal;
pub mod error;
pub mod flate;
pub mod header;
pub mod integer;
pub mod keyfile;
pub mod modular;
pub mod nbtheory;
pub mod queue;
pub mod rng;
pub mod ser;
pub mod sha1;

pub use error::{Error, ErrorKind, Result};

pub use archive::{
    Archive, BidirArchive, FileArchive, LockedTempArchive, MemoryArchive, OpenMode, SeekFrom,
};
pub use bucket::{ErrorBucket, ErrorQueue, ErrorReporter, ErrorTracer};
pub use crypto_archive::{CryptoArchive, NullCryptoArchive, SigningArchive};
pub use des::{BlockCipher, Direction, HashedKey128, HashedKey192, NullCipher, TripleDes};
pub use elgamal::{SigPrivateKey, SigPublicKey, SigningCipher};
pub use flate::{Deflator, Inflator};
pub use header::{Encoding, FileHeader, HeaderId, Version};
pub use integer::{Integer, Sign, Signedness};
pub use keyfile::{KeyFile, PrivateKeyProxy};
pub use modular::{ModularRing, Montgomery};
pub use nbtheory::{PrimeAndGenerator, RandomType};
pub use queue::ByteQueue;
pub use rng::{randomize_bytes, system_rng, RandomSource, X917Rng};
pub use ser::{ClassEntry, ClassRegistry, Serializable, Serializer};
pub use sha1::Sha1;
