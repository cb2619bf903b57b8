//! Library error types.
//!
//! Every failure in the crate surfaces as an [`Error`]: a kind, a
//! free-form message, and a pair of presentation flags. Each kind owns a
//! stable class-name string, and [`Error::id`] is the CRC-32 of that
//! name, so an error identity survives serialization and version skew.

use std::fmt;

/// A witness-pack Result, normally returning a witness-pack [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The closed set of failure kinds the core distinguishes.
///
/// Fatality defaults follow the kind; a caller placing an error into a
/// bucket chain may downgrade it with [`Error::set_fatality`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A file could not be opened.
    OpenFailed,
    /// A read from an archive's backing store failed.
    ReadFailed,
    /// A write to an archive's backing store failed.
    WriteFailed,
    /// A seek on a bidirectional archive failed.
    SeekFailed,
    /// A bounded memory archive ran out of room.
    ArchiveFull,
    /// A read ran past the end of the archive. Context-dependent
    /// severity; non-fatal by default.
    EndOfFile,
    /// A requested range fell outside the archive.
    OutOfBounds,
    /// A write was attempted on a read-only archive.
    ReadOnly,
    /// A magic number did not match what the format requires.
    BadMagic,
    /// Structural damage other than a bad magic number.
    InvalidFormat,
    /// An artifact was written by a newer version than this reader.
    VersionMismatch,
    /// A signature failed to verify, a key was wrong, or ciphertext was
    /// truncated. Deliberately carries no detail.
    CryptoFailure,
    /// The passphrase did not decrypt the private key. Non-fatal.
    BadPassphrase,
    /// Integer division by zero.
    DivideByZero,
    /// A BER/DER framing error while decoding an integer.
    DecodeError,
    /// A key size outside the supported set was requested.
    InvalidKeySize,
    /// A caller-supplied argument was unusable.
    InvalidArgument,
    /// An operation was issued in a state that forbids it.
    InvalidOperation,
    /// The compressed stream ended mid-block.
    UnexpectedEndOfInput,
    /// A deflate block header was malformed.
    InvalidBlockHeader,
    /// A dynamic Huffman tree description was inconsistent.
    BadBitLengths,
    /// A supposedly-unreachable condition was reached.
    Internal,
}

impl ErrorKind {
    /// Stable class-name string for this kind. These feed the CRC-32
    /// identity and the serialized form of queued errors, so they must
    /// never change once shipped.
    pub fn class_name(self) -> &'static str {
        match self {
            ErrorKind::OpenFailed => "eArchiveOpen",
            ErrorKind::ReadFailed => "eArchiveRead",
            ErrorKind::WriteFailed => "eArchiveWrite",
            ErrorKind::SeekFailed => "eArchiveSeek",
            ErrorKind::ArchiveFull => "eArchiveFull",
            ErrorKind::EndOfFile => "eArchiveEOF",
            ErrorKind::OutOfBounds => "eArchiveOutOfBounds",
            ErrorKind::ReadOnly => "eArchiveNotWritable",
            ErrorKind::BadMagic => "eBadMagic",
            ErrorKind::InvalidFormat => "eInvalidFormat",
            ErrorKind::VersionMismatch => "eVersionMismatch",
            ErrorKind::CryptoFailure => "eArchiveCrypto",
            ErrorKind::BadPassphrase => "eKeyFileBadPassphrase",
            ErrorKind::DivideByZero => "eIntegerDivideByZero",
            ErrorKind::DecodeError => "eIntegerDecode",
            ErrorKind::InvalidKeySize => "eKeyFileInvalidKeySize",
            ErrorKind::InvalidArgument => "eInvalidArgument",
            ErrorKind::InvalidOperation => "eArchiveInvalidOp",
            ErrorKind::UnexpectedEndOfInput => "eInflateUnexpectedEnd",
            ErrorKind::InvalidBlockHeader => "eInflateBadBlockHeader",
            ErrorKind::BadBitLengths => "eInflateBadBitLengths",
            ErrorKind::Internal => "eInternal",
        }
    }

    /// Inverse of [`class_name`](Self::class_name), used when errors are
    /// read back out of a serialized error queue.
    pub fn from_class_name(name: &str) -> Option<ErrorKind> {
        const ALL: [ErrorKind; 22] = [
            ErrorKind::OpenFailed,
            ErrorKind::ReadFailed,
            ErrorKind::WriteFailed,
            ErrorKind::SeekFailed,
            ErrorKind::ArchiveFull,
            ErrorKind::EndOfFile,
            ErrorKind::OutOfBounds,
            ErrorKind::ReadOnly,
            ErrorKind::BadMagic,
            ErrorKind::InvalidFormat,
            ErrorKind::VersionMismatch,
            ErrorKind::CryptoFailure,
            ErrorKind::BadPassphrase,
            ErrorKind::DivideByZero,
            ErrorKind::DecodeError,
            ErrorKind::InvalidKeySize,
            ErrorKind::InvalidArgument,
            ErrorKind::InvalidOperation,
            ErrorKind::UnexpectedEndOfInput,
            ErrorKind::InvalidBlockHeader,
            ErrorKind::BadBitLengths,
            ErrorKind::Internal,
        ];
        ALL.iter().copied().find(|k| k.class_name() == name)
    }

    /// Whether this kind is fatal when no flags override it.
    fn fatal_by_default(self) -> bool {
        !matches!(self, ErrorKind::EndOfFile | ErrorKind::BadPassphrase)
    }
}

/// An error: kind + message + presentation flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
    flags: u32,
}

impl Error {
    /// Marks the error as a warning rather than a hard failure.
    pub const NON_FATAL: u32 = 0x0000_0001;
    /// Suppresses the trailing "Continuing"/"Exiting" line.
    pub const SUPPRESS_THIRD_MSG: u32 = 0x0000_0002;

    /// Build an error with the default flags for its kind.
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Error {
        let flags = if kind.fatal_by_default() { 0 } else { Error::NON_FATAL };
        Error {
            kind,
            msg: msg.into(),
            flags,
        }
    }

    /// Build an error with explicit flags.
    pub fn with_flags(kind: ErrorKind, msg: impl Into<String>, flags: u32) -> Error {
        Error {
            kind,
            msg: msg.into(),
            flags,
        }
    }

    /// A file-system failure carrying the path and the OS error string.
    pub fn file(kind: ErrorKind, path: &std::path::Path, err: &std::io::Error) -> Error {
        Error::new(kind, format!("{}: {}", path.display(), err))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn msg(&self) -> &str {
        &self.msg
    }

    /// System-wide identifier: CRC-32 of the kind's class name. Zero is
    /// reserved for errors that have already been reported once.
    pub fn id(&self) -> u32 {
        crc32(self.kind.class_name().as_bytes())
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
    }

    pub fn is_fatal(&self) -> bool {
        self.flags & Error::NON_FATAL == 0
    }

    pub fn set_fatality(&mut self, fatal: bool) {
        if fatal {
            self.flags &= !Error::NON_FATAL;
        } else {
            self.flags |= Error::NON_FATAL;
        }
    }

    pub fn suppress_third(&self) -> bool {
        self.flags & Error::SUPPRESS_THIRD_MSG != 0
    }

    pub fn set_suppress_third(&mut self, suppress: bool) {
        if suppress {
            self.flags |= Error::SUPPRESS_THIRD_MSG;
        } else {
            self.flags &= !Error::SUPPRESS_THIRD_MSG;
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            // No detail leaks out of a crypto failure.
            ErrorKind::CryptoFailure => f.write_str("cryptographic verification failed"),
            _ if self.msg.is_empty() => f.write_str(self.kind.class_name()),
            _ => write!(f, "{}", self.msg),
        }
    }
}

impl std::error::Error for Error {}

/// Standard reflected CRC-32 (polynomial 0xEDB88320), the hash behind
/// error identities.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_known_value() {
        // CRC-32 of "123456789" is the classic check value.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn ids_are_stable_and_distinct() {
        let eof = Error::new(ErrorKind::EndOfFile, "");
        let crypto = Error::new(ErrorKind::CryptoFailure, "");
        assert_ne!(eof.id(), crypto.id());
        assert_eq!(eof.id(), Error::new(ErrorKind::EndOfFile, "other").id());
        assert_ne!(eof.id(), 0);
    }

    #[test]
    fn fatality_defaults_and_overrides() {
        let mut err = Error::new(ErrorKind::ReadFailed, "boom");
        assert!(err.is_fatal());
        err.set_fatality(false);
        assert!(!err.is_fatal());

        let err = Error::new(ErrorKind::BadPassphrase, "");
        assert!(!err.is_fatal());
        let err = Error::new(ErrorKind::EndOfFile, "");
        assert!(!err.is_fatal());
    }

    #[test]
    fn class_names_round_trip() {
        for kind in [
            ErrorKind::OpenFailed,
            ErrorKind::EndOfFile,
            ErrorKind::CryptoFailure,
            ErrorKind::BadPassphrase,
            ErrorKind::VersionMismatch,
            ErrorKind::Internal,
        ] {
            assert_eq!(ErrorKind::from_class_name(kind.class_name()), Some(kind));
        }
        assert_eq!(ErrorKind::from_class_name("eNotAThing"), None);
    }

    #[test]
    fn crypto_failure_display_is_opaque() {
        let err = Error::new(ErrorKind::CryptoFailure, "block 7 offset 123");
        assert_eq!(err.to_string(), "cryptographic verification failed");
    }
}
