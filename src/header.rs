//! File headers: the preamble that names an artifact's kind, format
//! version, encoding, and (for signed artifacts) the public key that
//! binds it to an identity.

use crate::archive::Archive;
use crate::elgamal::SigPublicKey;
use crate::error::{Error, ErrorKind, Result};
use std::fmt;

/// Artifact magics. Each persistent artifact kind gets its own.
pub const MAGIC_DATABASE: u32 = 0x5750_4442; // "WPDB"
pub const MAGIC_REPORT: u32 = 0x5750_5250; // "WPRP"
pub const MAGIC_CONFIG: u32 = 0x5750_4346; // "WPCF"
pub const MAGIC_POLICY: u32 = 0x5750_504C; // "WPPL"
pub const MAGIC_KEY_FILE: u32 = 0x5750_4B59; // "WPKY"

/// An artifact-kind identifier; compares by magic value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderId(pub u32);

/// How the artifact body after the header is encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    None,
    Compressed,
    AsymmetricSigned,
}

impl From<Encoding> for u8 {
    fn from(e: Encoding) -> u8 {
        match e {
            Encoding::None => 0,
            Encoding::Compressed => 1,
            Encoding::AsymmetricSigned => 2,
        }
    }
}

impl TryFrom<u8> for Encoding {
    type Error = u8;

    fn try_from(v: u8) -> std::result::Result<Encoding, u8> {
        match v {
            0 => Ok(Encoding::None),
            1 => Ok(Encoding::Compressed),
            2 => Ok(Encoding::AsymmetricSigned),
            other => Err(other),
        }
    }
}

/// 32-bit format version displayed as four 8-bit quartets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version(pub u32);

impl Version {
    pub fn new(major: u8, minor: u8, patch: u8, build: u8) -> Version {
        Version(
            (major as u32) << 24 | (minor as u32) << 16 | (patch as u32) << 8 | build as u32,
        )
    }

    pub fn major(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn minor(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn patch(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn build(self) -> u8 {
        self.0 as u8
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major(),
            self.minor(),
            self.patch(),
            self.build()
        )
    }
}

/// The artifact preamble.
#[derive(Clone, Debug)]
pub struct FileHeader {
    id: HeaderId,
    version: Version,
    encoding: Encoding,
    public_key: Option<SigPublicKey>,
}

impl FileHeader {
    pub fn new(id: HeaderId, version: Version, encoding: Encoding) -> FileHeader {
        FileHeader {
            id,
            version,
            encoding,
            public_key: None,
        }
    }

    /// A signed artifact's header embeds the verifying key.
    pub fn new_signed(id: HeaderId, version: Version, public_key: SigPublicKey) -> FileHeader {
        FileHeader {
            id,
            version,
            encoding: Encoding::AsymmetricSigned,
            public_key: Some(public_key),
        }
    }

    pub fn id(&self) -> HeaderId {
        self.id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn public_key(&self) -> Option<&SigPublicKey> {
        self.public_key.as_ref()
    }

    pub fn write(&self, archive: &mut dyn Archive) -> Result<()> {
        archive.write_u32(self.id.0)?;
        archive.write_u32(self.version.0)?;
        archive.write(&[u8::from(self.encoding)])?;
        match (self.encoding, &self.public_key) {
            (Encoding::AsymmetricSigned, Some(key)) => key.write(archive),
            (Encoding::AsymmetricSigned, None) => Err(Error::new(
                ErrorKind::InvalidOperation,
                "signed header has no public key",
            )),
            _ => Ok(()),
        }
    }

    /// Read a header, checking it against the expected artifact kind.
    pub fn read_expecting(archive: &mut dyn Archive, expected: HeaderId) -> Result<FileHeader> {
        let header = FileHeader::read(archive)?;
        if header.id != expected {
            return Err(Error::new(
                ErrorKind::BadMagic,
                format!(
                    "expected artifact magic {:#010x}, found {:#010x}",
                    expected.0, header.id.0
                ),
            ));
        }
        Ok(header)
    }

    pub fn read(archive: &mut dyn Archive) -> Result<FileHeader> {
        let id = HeaderId(archive.read_u32()?);
        let version = Version(archive.read_u32()?);
        let mut tag = [0u8; 1];
        archive.read_exact(&mut tag)?;
        let encoding = Encoding::try_from(tag[0]).map_err(|v| {
            Error::new(
                ErrorKind::InvalidFormat,
                format!("unknown encoding tag {}", v),
            )
        })?;
        let public_key = if encoding == Encoding::AsymmetricSigned {
            Some(SigPublicKey::read(archive)?)
        } else {
            None
        };
        Ok(FileHeader {
            id,
            version,
            encoding,
            public_key,
        })
    }
}
