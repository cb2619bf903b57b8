//! Versioned typed serialization.
//!
//! Objects write themselves through a [`Serializer`] as
//! `class-name || write-version || length-prefixed body`. A
//! [`ClassRegistry`] maps the stable class-name strings to version
//! bounds and factories, so a reader can reconstruct objects it has
//! never seen the concrete type of, and reject artifacts written by a
//! newer release with `VersionMismatch`.

use crate::archive::{Archive, MemoryArchive};
use crate::error::{Error, ErrorKind, Result};
use std::collections::HashMap;

/// An object that can travel through the typed serializer.
pub trait Serializable {
    /// Stable registry identifier; never changes once shipped.
    fn class_name(&self) -> &'static str;

    fn write_body(&self, ser: &mut Serializer<'_>) -> Result<()>;

    /// Populate from a body written at `version` (guaranteed to be
    /// within the registered bounds).
    fn read_body(&mut self, ser: &mut Serializer<'_>, version: u32) -> Result<()>;

    /// Downcast support for callers of
    /// [`Serializer::read_object`].
    fn as_any(&self) -> &dyn std::any::Any;
}

impl std::fmt::Debug for dyn Serializable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Serializable")
            .field("class_name", &self.class_name())
            .finish()
    }
}

/// Registry record for one serializable class.
pub struct ClassEntry {
    /// Version this build writes.
    pub write_version: u32,
    /// Oldest version this build can still read.
    pub min_read_version: u32,
    pub factory: fn() -> Box<dyn Serializable>,
}

/// Class-name to version/factory table, fixed at construction.
pub struct ClassRegistry {
    map: HashMap<&'static str, ClassEntry>,
}

impl ClassRegistry {
    pub fn new() -> ClassRegistry {
        ClassRegistry {
            map: HashMap::new(),
        }
    }

    /// Registry pre-loaded with the crate's own serializable classes.
    pub fn standard() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry.register(
            crate::bucket::ERROR_QUEUE_CLASS,
            ClassEntry {
                write_version: 1,
                min_read_version: 1,
                factory: || Box::new(crate::bucket::ErrorQueue::new()),
            },
        );
        registry
    }

    pub fn register(&mut self, name: &'static str, entry: ClassEntry) {
        let prior = self.map.insert(name, entry);
        debug_assert!(prior.is_none(), "class {} registered twice", name);
    }

    pub fn entry(&self, name: &str) -> Option<&ClassEntry> {
        self.map.get(name)
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        ClassRegistry::new()
    }
}

/// Typed object reader/writer over a byte archive.
pub struct Serializer<'a> {
    archive: &'a mut dyn Archive,
    registry: &'a ClassRegistry,
}

impl<'a> Serializer<'a> {
    pub fn new(archive: &'a mut dyn Archive, registry: &'a ClassRegistry) -> Serializer<'a> {
        Serializer { archive, registry }
    }

    /// Write one object with its class header and framed body.
    pub fn write_object(&mut self, object: &dyn Serializable) -> Result<()> {
        let name = object.class_name();
        let entry = self.registry.entry(name).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidArgument,
                format!("class {} is not registered", name),
            )
        })?;
        self.archive.write_string(name)?;
        self.archive.write_u32(entry.write_version)?;

        // the body is buffered so its length can lead it
        let mut body = MemoryArchive::new();
        {
            let mut sub = Serializer::new(&mut body, self.registry);
            object.write_body(&mut sub)?;
        }
        let bytes = body.into_vec();
        self.archive.write_u32(bytes.len() as u32)?;
        self.archive.write(&bytes)
    }

    /// Read the next object, constructing it through the registry.
    pub fn read_object(&mut self) -> Result<Box<dyn Serializable>> {
        let name = self.archive.read_string()?;
        let entry = self.registry.entry(&name).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidFormat,
                format!("unknown class {} in archive", name),
            )
        })?;
        let version = self.archive.read_u32()?;
        if version > entry.write_version || version < entry.min_read_version {
            return Err(Error::new(
                ErrorKind::VersionMismatch,
                format!(
                    "class {} version {} outside supported {}..={}",
                    name, version, entry.min_read_version, entry.write_version
                ),
            ));
        }
        let len = self.archive.read_u32()? as usize;
        let mut bytes = vec![0u8; len];
        self.archive.read_exact(&mut bytes)?;

        let mut object = (entry.factory)();
        let mut body = MemoryArchive::from_vec(bytes);
        {
            let mut sub = Serializer::new(&mut body, self.registry);
            object.read_body(&mut sub, version)?;
        }
        Ok(object)
    }

    /// Read the next object into an existing instance whose type the
    /// caller already knows.
    pub fn read_object_into(&mut self, object: &mut dyn Serializable) -> Result<()> {
        let name = self.archive.read_string()?;
        if name != object.class_name() {
            return Err(Error::new(
                ErrorKind::InvalidFormat,
                format!(
                    "expected class {}, archive holds {}",
                    object.class_name(),
                    name
                ),
            ));
        }
        let entry = self.registry.entry(&name).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidArgument,
                format!("class {} is not registered", name),
            )
        })?;
        let version = self.archive.read_u32()?;
        if version > entry.write_version || version < entry.min_read_version {
            return Err(Error::new(
                ErrorKind::VersionMismatch,
                format!(
                    "class {} version {} outside supported {}..={}",
                    name, version, entry.min_read_version, entry.write_version
                ),
            ));
        }
        let len = self.archive.read_u32()? as usize;
        let mut bytes = vec![0u8; len];
        self.archive.read_exact(&mut bytes)?;
        let mut body = MemoryArchive::from_vec(bytes);
        let mut sub = Serializer::new(&mut body, self.registry);
        object.read_body(&mut sub, version)
    }

    // -----------------------------------------------------------------
    // primitives
    // -----------------------------------------------------------------

    pub fn write_i16(&mut self, v: i16) -> Result<()> {
        self.archive.write_i16(v)
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.archive.write_i32(v)
    }

    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        self.archive.write_i64(v)
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.archive.write_u32(v)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.archive.read_i16()
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.archive.read_i32()
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.archive.read_i64()
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.archive.read_u32()
    }

    /// Narrow string: 16-bit length prefix plus UTF-8 bytes.
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        self.archive.write_string(s)
    }

    pub fn read_string(&mut self) -> Result<String> {
        self.archive.read_string()
    }

    /// Wide string: 16-bit unit count plus big-endian UTF-16 units.
    pub fn write_wstring(&mut self, s: &str) -> Result<()> {
        let units: Vec<u16> = s.encode_utf16().collect();
        if units.len() > u16::MAX as usize {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "wide string too long for a 16-bit length prefix",
            ));
        }
        self.archive.write_u16(units.len() as u16)?;
        for unit in units {
            self.archive.write_u16(unit)?;
        }
        Ok(())
    }

    pub fn read_wstring(&mut self) -> Result<String> {
        let count = self.archive.read_u16()? as usize;
        let mut units = Vec::with_capacity(count);
        for _ in 0..count {
            units.push(self.archive.read_u16()?);
        }
        String::from_utf16(&units)
            .map_err(|_| Error::new(ErrorKind::InvalidFormat, "wide string is not valid UTF-16"))
    }

    pub fn write_blob(&mut self, data: &[u8]) -> Result<()> {
        self.archive.write(data)
    }

    pub fn read_blob(&mut self, out: &mut [u8]) -> Result<()> {
        self.archive.read_exact(out)
    }
}
