//! Byte archives: the uniform store every persistent artifact is
//! written through.
//!
//! An [`Archive`] is a sequential byte sink/source with typed
//! big-endian primitives layered on top; a [`BidirArchive`] adds
//! seeking and a read-only mapped window. Three flavors are provided:
//! memory-backed, file-backed, and a locked temporary file whose bytes
//! are invisible to other processes for the lifetime of the object.

use crate::error::{Error, ErrorKind, Result};
use byteorder::{BigEndian, ByteOrder};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom as IoSeekFrom, Write};
use std::path::{Path, PathBuf};

/// Origin for [`BidirArchive::seek`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekFrom {
    Beginning(u64),
    Current(i64),
    End(i64),
}

/// Sequential byte-archive contract.
///
/// `read` returns the number of bytes actually delivered and comes up
/// short only at end of data; `write` either takes everything or
/// fails. The typed helpers frame every multi-byte value big-endian
/// and surface a short read as [`ErrorKind::EndOfFile`].
pub trait Archive {
    /// Read up to `buf.len()` bytes. A return below the requested
    /// count means the archive is exhausted.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write the entire buffer or fail.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// True once the read cursor is at the end of the data.
    fn end_of_file(&mut self) -> bool;

    /// Read exactly `buf.len()` bytes or fail with `EndOfFile`.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let n = self.read(buf)?;
        if n != buf.len() {
            return Err(Error::new(
                ErrorKind::EndOfFile,
                format!("needed {} bytes, archive had {}", buf.len(), n),
            ));
        }
        Ok(())
    }

    fn read_i16(&mut self) -> Result<i16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_i16(&buf))
    }

    fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_i32(&buf))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_i64(&buf))
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_u16(&buf))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_u32(&buf))
    }

    fn write_i16(&mut self, v: i16) -> Result<()> {
        let mut buf = [0u8; 2];
        BigEndian::write_i16(&mut buf, v);
        self.write(&buf)
    }

    fn write_i32(&mut self, v: i32) -> Result<()> {
        let mut buf = [0u8; 4];
        BigEndian::write_i32(&mut buf, v);
        self.write(&buf)
    }

    fn write_i64(&mut self, v: i64) -> Result<()> {
        let mut buf = [0u8; 8];
        BigEndian::write_i64(&mut buf, v);
        self.write(&buf)
    }

    fn write_u16(&mut self, v: u16) -> Result<()> {
        let mut buf = [0u8; 2];
        BigEndian::write_u16(&mut buf, v);
        self.write(&buf)
    }

    fn write_u32(&mut self, v: u32) -> Result<()> {
        let mut buf = [0u8; 4];
        BigEndian::write_u32(&mut buf, v);
        self.write(&buf)
    }

    /// 16-bit length prefix followed by the UTF-8 bytes.
    fn write_string(&mut self, s: &str) -> Result<()> {
        let bytes = s.as_bytes();
        if bytes.len() > u16::MAX as usize {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "string too long for a 16-bit length prefix",
            ));
        }
        self.write_u16(bytes.len() as u16)?;
        self.write(bytes)
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let mut bytes = vec![0u8; len];
        self.read_exact(&mut bytes)?;
        String::from_utf8(bytes)
            .map_err(|_| Error::new(ErrorKind::InvalidFormat, "string is not valid UTF-8"))
    }
}

/// Adds random access to the sequential contract.
pub trait BidirArchive: Archive {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;
    fn current_pos(&mut self) -> Result<u64>;
    fn length(&mut self) -> Result<u64>;

    /// Expose `len` bytes starting at `offset` as a read-only window.
    /// The bytes must already be in the archive.
    fn map_archive(&mut self, offset: u64, len: usize) -> Result<&[u8]>;
}

// ---------------------------------------------------------------------
// MemoryArchive
// ---------------------------------------------------------------------

/// Archive backed by a contiguous growable buffer.
pub struct MemoryArchive {
    buf: Vec<u8>,
    pos: usize,
    max_size: usize,
}

impl MemoryArchive {
    pub fn new() -> MemoryArchive {
        MemoryArchive::with_max_size(usize::MAX)
    }

    /// Writing past `max_size` fails with `ArchiveFull`.
    pub fn with_max_size(max_size: usize) -> MemoryArchive {
        MemoryArchive {
            buf: Vec::new(),
            pos: 0,
            max_size,
        }
    }

    /// Wrap an existing buffer; the cursor starts at zero.
    pub fn from_vec(buf: Vec<u8>) -> MemoryArchive {
        MemoryArchive {
            buf,
            pos: 0,
            max_size: usize::MAX,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for MemoryArchive {
    fn default() -> Self {
        MemoryArchive::new()
    }
}

impl Archive for MemoryArchive {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let avail = self.buf.len().saturating_sub(self.pos);
        let n = avail.min(buf.len());
        buf[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let end = self.pos.checked_add(buf.len()).ok_or_else(|| {
            Error::new(ErrorKind::OutOfBounds, "write offset overflows")
        })?;
        if end > self.max_size {
            return Err(Error::new(
                ErrorKind::ArchiveFull,
                format!("memory archive capped at {} bytes", self.max_size),
            ));
        }
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }

    fn end_of_file(&mut self) -> bool {
        self.pos >= self.buf.len()
    }
}

impl BidirArchive for MemoryArchive {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let new = match pos {
            SeekFrom::Beginning(n) => n as i64,
            SeekFrom::Current(d) => self.pos as i64 + d,
            SeekFrom::End(d) => self.buf.len() as i64 + d,
        };
        if new < 0 || new as usize > self.buf.len() {
            return Err(Error::new(
                ErrorKind::SeekFailed,
                format!("seek to {} outside archive of {} bytes", new, self.buf.len()),
            ));
        }
        self.pos = new as usize;
        Ok(self.pos as u64)
    }

    fn current_pos(&mut self) -> Result<u64> {
        Ok(self.pos as u64)
    }

    fn length(&mut self) -> Result<u64> {
        Ok(self.buf.len() as u64)
    }

    fn map_archive(&mut self, offset: u64, len: usize) -> Result<&[u8]> {
        let offset = offset as usize;
        let end = offset.checked_add(len).filter(|&e| e <= self.buf.len());
        match end {
            Some(end) => Ok(&self.buf[offset..end]),
            None => Err(Error::new(
                ErrorKind::OutOfBounds,
                format!("mapped window {}+{} outside archive", offset, len),
            )),
        }
    }
}

// ---------------------------------------------------------------------
// FileArchive
// ---------------------------------------------------------------------

/// How a [`FileArchive`] opens its backing file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only; the file must exist.
    Read,
    /// Read/write; created if missing, existing contents kept.
    ReadWrite,
    /// Read/write; created or truncated to empty.
    Truncate,
    /// Read/write; fails if the file already exists.
    Exclusive,
}

/// Archive backed by a file on disk.
#[derive(Debug)]
pub struct FileArchive {
    file: File,
    path: PathBuf,
    writable: bool,
    map_buf: Vec<u8>,
}

impl FileArchive {
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<FileArchive> {
        let path = path.as_ref();
        let mut opts = OpenOptions::new();
        opts.read(true);
        match mode {
            OpenMode::Read => {}
            OpenMode::ReadWrite => {
                opts.write(true).create(true);
            }
            OpenMode::Truncate => {
                opts.write(true).create(true).truncate(true);
            }
            OpenMode::Exclusive => {
                opts.write(true).create_new(true);
            }
        }
        let file = opts
            .open(path)
            .map_err(|e| Error::file(ErrorKind::OpenFailed, path, &e))?;
        Ok(FileArchive {
            file,
            path: path.to_path_buf(),
            writable: mode != OpenMode::Read,
            map_buf: Vec::new(),
        })
    }

    pub fn open_read(path: impl AsRef<Path>) -> Result<FileArchive> {
        FileArchive::open(path, OpenMode::Read)
    }

    pub fn open_read_write(path: impl AsRef<Path>) -> Result<FileArchive> {
        FileArchive::open(path, OpenMode::ReadWrite)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Archive for FileArchive {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            match self.file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::file(ErrorKind::ReadFailed, &self.path, &e)),
            }
        }
        Ok(total)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(Error::new(
                ErrorKind::ReadOnly,
                format!("{} is open read-only", self.path.display()),
            ));
        }
        self.file
            .write_all(buf)
            .map_err(|e| Error::file(ErrorKind::WriteFailed, &self.path, &e))
    }

    fn end_of_file(&mut self) -> bool {
        match (self.current_pos(), self.length()) {
            (Ok(pos), Ok(len)) => pos >= len,
            _ => true,
        }
    }
}

impl BidirArchive for FileArchive {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Beginning(n) => IoSeekFrom::Start(n),
            SeekFrom::Current(d) => IoSeekFrom::Current(d),
            SeekFrom::End(d) => IoSeekFrom::End(d),
        };
        self.file
            .seek(target)
            .map_err(|e| Error::file(ErrorKind::SeekFailed, &self.path, &e))
    }

    fn current_pos(&mut self) -> Result<u64> {
        self.file
            .stream_position()
            .map_err(|e| Error::file(ErrorKind::SeekFailed, &self.path, &e))
    }

    fn length(&mut self) -> Result<u64> {
        let meta = self
            .file
            .metadata()
            .map_err(|e| Error::file(ErrorKind::ReadFailed, &self.path, &e))?;
        Ok(meta.len())
    }

    fn map_archive(&mut self, offset: u64, len: usize) -> Result<&[u8]> {
        let end = offset
            .checked_add(len as u64)
            .filter(|&e| e <= self.length().unwrap_or(0));
        if end.is_none() {
            return Err(Error::new(
                ErrorKind::OutOfBounds,
                format!("mapped window {}+{} outside archive", offset, len),
            ));
        }
        let saved = self.current_pos()?;
        self.seek(SeekFrom::Beginning(offset))?;
        self.map_buf.resize(len, 0);
        let mut tmp = std::mem::take(&mut self.map_buf);
        let res = self.read_exact(&mut tmp);
        self.map_buf = tmp;
        self.seek(SeekFrom::Beginning(saved))?;
        res?;
        Ok(&self.map_buf)
    }
}

// ---------------------------------------------------------------------
// LockedTempArchive
// ---------------------------------------------------------------------

/// Private scratch archive: the backing file is unlinked while open so
/// its bytes are invisible to any other process, and nothing survives
/// close.
pub struct LockedTempArchive {
    file: File,
    path: Option<PathBuf>,
    map_buf: Vec<u8>,
}

impl LockedTempArchive {
    /// Anonymous scratch in the system temp directory.
    pub fn open() -> Result<LockedTempArchive> {
        let file = tempfile::tempfile().map_err(|e| {
            Error::new(ErrorKind::OpenFailed, format!("temp file: {}", e))
        })?;
        Ok(LockedTempArchive {
            file,
            path: None,
            map_buf: Vec::new(),
        })
    }

    /// Scratch at a caller-chosen path. The file is created
    /// exclusively and immediately unlinked on Unix; elsewhere it is
    /// removed when the archive closes.
    pub fn open_at(path: impl AsRef<Path>) -> Result<LockedTempArchive> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| Error::file(ErrorKind::OpenFailed, path, &e))?;
        #[cfg(unix)]
        {
            std::fs::remove_file(path)
                .map_err(|e| Error::file(ErrorKind::OpenFailed, path, &e))?;
            Ok(LockedTempArchive {
                file,
                path: None,
                map_buf: Vec::new(),
            })
        }
        #[cfg(not(unix))]
        {
            Ok(LockedTempArchive {
                file,
                path: Some(path.to_path_buf()),
                map_buf: Vec::new(),
            })
        }
    }

    /// Release the handle (and on platforms that defer the unlink,
    /// remove the file). Dropping the archive has the same effect.
    pub fn close(self) {}
}

impl Drop for LockedTempArchive {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl Archive for LockedTempArchive {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            match self.file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(Error::new(
                        ErrorKind::ReadFailed,
                        format!("locked temp archive: {}", e),
                    ))
                }
            }
        }
        Ok(total)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.file.write_all(buf).map_err(|e| {
            Error::new(ErrorKind::WriteFailed, format!("locked temp archive: {}", e))
        })
    }

    fn end_of_file(&mut self) -> bool {
        match (self.current_pos(), self.length()) {
            (Ok(pos), Ok(len)) => pos >= len,
            _ => true,
        }
    }
}

impl BidirArchive for LockedTempArchive {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Beginning(n) => IoSeekFrom::Start(n),
            SeekFrom::Current(d) => IoSeekFrom::Current(d),
            SeekFrom::End(d) => IoSeekFrom::End(d),
        };
        self.file.seek(target).map_err(|e| {
            Error::new(ErrorKind::SeekFailed, format!("locked temp archive: {}", e))
        })
    }

    fn current_pos(&mut self) -> Result<u64> {
        self.file.stream_position().map_err(|e| {
            Error::new(ErrorKind::SeekFailed, format!("locked temp archive: {}", e))
        })
    }

    fn length(&mut self) -> Result<u64> {
        let meta = self.file.metadata().map_err(|e| {
            Error::new(ErrorKind::ReadFailed, format!("locked temp archive: {}", e))
        })?;
        Ok(meta.len())
    }

    fn map_archive(&mut self, offset: u64, len: usize) -> Result<&[u8]> {
        let saved = self.current_pos()?;
        self.seek(SeekFrom::Beginning(offset))?;
        self.map_buf.resize(len, 0);
        let mut tmp = std::mem::take(&mut self.map_buf);
        let res = self.read_exact(&mut tmp);
        self.map_buf = tmp;
        self.seek(SeekFrom::Beginning(saved))?;
        res?;
        Ok(&self.map_buf)
    }
}
