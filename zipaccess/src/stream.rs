//! Read-only streams over archive entries.

use std::fmt;
use std::io::{self, BufRead, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::options::Logger;
use crate::resolve::ResolvedEntry;
use crate::{Error, Result};

/// A seekable reader as produced by a container's native stream.
pub trait EntryRead: Read + Seek + Send {}

impl<T: Read + Seek + Send> EntryRead for T {}

/// What a stream is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// `r`
    Read,
    /// `w`
    Write,
    /// `a`
    Append,
    /// `x`
    CreateNew,
}

/// An open mode in the familiar `"rb"` / `"w+"` notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenMode {
    pub access: Access,
    /// `+`: open for reading and writing.
    pub update: bool,
    /// `b`: no newline translation.
    pub binary: bool,
}

impl OpenMode {
    pub const READ: OpenMode = OpenMode {
        access: Access::Read,
        update: false,
        binary: false,
    };

    pub const READ_BINARY: OpenMode = OpenMode {
        access: Access::Read,
        update: false,
        binary: true,
    };

    /// Text-read and binary-read are the only modes archive entries support.
    #[inline(always)]
    pub fn is_read_only(&self) -> bool {
        self.access == Access::Read && !self.update
    }
}

impl Default for OpenMode {
    fn default() -> Self {
        OpenMode::READ
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::UnsupportedMode { mode: s.to_string() };

        let mut access = None;
        let mut update = false;
        let mut binary = None;

        for c in s.chars() {
            let next = match c {
                'r' => Access::Read,
                'w' => Access::Write,
                'a' => Access::Append,
                'x' => Access::CreateNew,
                '+' if !update => {
                    update = true;
                    continue;
                }
                'b' | 't' | 'U' if binary.is_none() => {
                    binary = Some(c == 'b');
                    continue;
                }
                _ => return Err(invalid()),
            };
            if access.replace(next).is_some() {
                return Err(invalid());
            }
        }

        // Legacy `U` on its own means universal-newline reading.
        let access = match (access, s.contains('U')) {
            (Some(Access::Read), _) | (None, true) => Access::Read,
            (Some(_), true) | (None, false) => return Err(invalid()),
            (Some(access), false) => access,
        };

        Ok(OpenMode {
            access,
            update,
            binary: binary.unwrap_or(false),
        })
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let access = match self.access {
            Access::Read => "r",
            Access::Write => "w",
            Access::Append => "a",
            Access::CreateNew => "x",
        };
        f.write_str(access)?;
        if self.binary {
            f.write_str("b")?;
        }
        if self.update {
            f.write_str("+")?;
        }
        Ok(())
    }
}

fn not_writable(name: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("file is not writable: {}", name),
    )
}

/// An in-memory copy of an entry. Seekable, never writable.
#[derive(Debug, Clone)]
pub struct ReadOnlyBuffer {
    name: String,
    inner: Cursor<Vec<u8>>,
}

impl ReadOnlyBuffer {
    pub fn new<S: Into<String>>(name: S, data: Vec<u8>) -> ReadOnlyBuffer {
        ReadOnlyBuffer {
            name: name.into(),
            inner: Cursor::new(data),
        }
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.inner.get_ref().len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.inner.get_ref().is_empty()
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        self.inner.get_ref()
    }

    /// Always fails.
    pub fn truncate(&mut self, _size: u64) -> io::Result<()> {
        Err(not_writable(&self.name))
    }
}

impl Read for ReadOnlyBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for ReadOnlyBuffer {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}

impl Seek for ReadOnlyBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Write for ReadOnlyBuffer {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(not_writable(&self.name))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum EntryInner {
    Native(Box<dyn EntryRead>),
    Buffered(ReadOnlyBuffer),
}

/// A read-only stream over one archive entry.
///
/// The stream owns its data source: it stays readable after the archive it
/// came from is unregistered.
pub struct EntryStream {
    archive: PathBuf,
    entry: String,
    inner: EntryInner,
}

impl EntryStream {
    #[inline(always)]
    pub fn archive(&self) -> &Path {
        &self.archive
    }

    #[inline(always)]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Returns `true` if the entry was read into memory rather than streamed.
    #[inline(always)]
    pub fn is_buffered(&self) -> bool {
        matches!(self.inner, EntryInner::Buffered(_))
    }

    /// Always fails.
    pub fn truncate(&mut self, _size: u64) -> io::Result<()> {
        Err(not_writable(&self.entry))
    }
}

impl fmt::Debug for EntryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryStream")
            .field("archive", &self.archive)
            .field("entry", &self.entry)
            .field("buffered", &self.is_buffered())
            .finish()
    }
}

impl Read for EntryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            EntryInner::Native(r) => r.read(buf),
            EntryInner::Buffered(r) => r.read(buf),
        }
    }
}

impl Seek for EntryStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.inner {
            EntryInner::Native(r) => r.seek(pos),
            EntryInner::Buffered(r) => r.seek(pos),
        }
    }
}

impl Write for EntryStream {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(not_writable(&self.entry))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A real file, or anything else a [`Filesystem`](crate::fs::Filesystem)
/// hands out.
pub trait FileIo: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> FileIo for T {}

/// A stream returned by [`ZipAccess::open`](crate::ZipAccess::open).
///
/// Callers only read (and, for real files, write) bytes; which variant
/// satisfied the open is visible but rarely needed.
pub enum Stream {
    Archive(EntryStream),
    Filesystem(Box<dyn FileIo>),
}

impl Stream {
    #[inline(always)]
    pub fn is_archive(&self) -> bool {
        matches!(self, Stream::Archive(_))
    }

    pub fn as_entry(&self) -> Option<&EntryStream> {
        match self {
            Stream::Archive(stream) => Some(stream),
            Stream::Filesystem(_) => None,
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Archive(stream) => f.debug_tuple("Archive").field(stream).finish(),
            Stream::Filesystem(_) => f.write_str("Filesystem"),
        }
    }
}

impl From<EntryStream> for Stream {
    fn from(stream: EntryStream) -> Self {
        Stream::Archive(stream)
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Archive(r) => r.read(buf),
            Stream::Filesystem(r) => r.read(buf),
        }
    }
}

impl Seek for Stream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Stream::Archive(r) => r.seek(pos),
            Stream::Filesystem(r) => r.seek(pos),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Archive(w) => w.write(buf),
            Stream::Filesystem(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Archive(w) => w.flush(),
            Stream::Filesystem(w) => w.flush(),
        }
    }
}

fn translate_newlines(buf: Vec<u8>) -> Vec<u8> {
    if !buf.contains(&b'\r') {
        return buf;
    }

    let mut out = Vec::with_capacity(buf.len());
    let mut iter = buf.iter().peekable();
    while let Some(&byte) = iter.next() {
        if byte == b'\r' && iter.peek() == Some(&&b'\n') {
            continue;
        }
        out.push(byte);
    }
    out
}

/// Turns resolved entries into streams.
pub struct StreamFactory<'a> {
    logger: &'a Logger,
}

impl<'a> StreamFactory<'a> {
    pub fn new(logger: &'a Logger) -> StreamFactory<'a> {
        StreamFactory { logger }
    }

    /// Opens `resolved` for reading.
    ///
    /// Binary reads use the container's native stream when it has one and
    /// otherwise read the entry into memory. Text reads are always buffered,
    /// with `\r\n` translated to `\n`.
    pub fn open_entry(&self, resolved: &ResolvedEntry, mode: OpenMode) -> Result<EntryStream> {
        let archive = resolved.archive().path();
        let entry = resolved.entry();

        if !mode.is_read_only() {
            self.logger.emit(|| {
                tracing::error!(
                    archive = %archive.display(),
                    entry,
                    %mode,
                    "zip access fail: requires mode 'r' or 'rb'"
                )
            });
            return Err(Error::UnsupportedMode {
                mode: mode.to_string(),
            });
        }

        self.logger.emit(|| {
            tracing::debug!(archive = %archive.display(), entry, %mode, "zip access open")
        });

        let container = resolved.container();
        let native = if mode.binary {
            container.open_stream(entry)
        } else {
            None
        };

        let inner = match native {
            Some(Ok(reader)) => Ok(EntryInner::Native(reader)),
            Some(Err(e)) => Err(e),
            None => container.read(entry).map(|data| {
                let data = if mode.binary {
                    data
                } else {
                    translate_newlines(data)
                };
                EntryInner::Buffered(ReadOnlyBuffer::new(entry, data))
            }),
        };

        match inner {
            Ok(inner) => Ok(EntryStream {
                archive: archive.to_path_buf(),
                entry: entry.to_string(),
                inner,
            }),
            Err(source) => {
                self.logger.emit(|| {
                    tracing::error!(
                        archive = %archive.display(),
                        entry,
                        error = %source,
                        "zip access fail"
                    )
                });
                Err(Error::ReadFailure {
                    archive: archive.to_path_buf(),
                    entry: entry.to_string(),
                    source,
                })
            }
        }
    }
}
