//! Open file handles returned by the storage client.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use storagekit_common::Error;

use crate::backend::{BoxReader, BoxWriter};

/// How a file is opened.
///
/// Parsed from the familiar mode strings: `r`/`rb`, `w`/`wb`, `a`/`ab`.
/// There is no text mode; every handle is a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" | "rb" => Ok(OpenMode::Read),
            "w" | "wb" => Ok(OpenMode::Write),
            "a" | "ab" => Ok(OpenMode::Append),
            other => Err(Error::InvalidInput(format!(
                "Unsupported open mode '{}' (expected r, rb, w, wb, a or ab)",
                other
            ))),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OpenMode::Read => "rb",
            OpenMode::Write => "wb",
            OpenMode::Append => "ab",
        })
    }
}

enum Stream {
    Reader(BoxReader),
    Writer(BoxWriter),
}

/// A readable or writable byte stream on some backend.
///
/// Writes become visible once the file is shut down
/// (`AsyncWriteExt::shutdown`). Using the wrong direction fails with
/// `io::ErrorKind::Unsupported`.
pub struct StorageFile {
    location: String,
    mode: OpenMode,
    stream: Stream,
}

impl StorageFile {
    pub(crate) fn reader(location: String, reader: BoxReader) -> Self {
        Self {
            location,
            mode: OpenMode::Read,
            stream: Stream::Reader(reader),
        }
    }

    pub(crate) fn writer(location: String, mode: OpenMode, writer: BoxWriter) -> Self {
        Self {
            location,
            mode,
            stream: Stream::Writer(writer),
        }
    }

    /// The location this file was opened with.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    fn wrong_direction(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{} is open in mode {}", self.location, self.mode),
        )
    }
}

impl fmt::Debug for StorageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageFile")
            .field("location", &self.location)
            .field("mode", &self.mode)
            .finish()
    }
}

impl AsyncRead for StorageFile {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.stream {
            Stream::Reader(ref mut reader) => reader.as_mut().poll_read(cx, buf),
            Stream::Writer(_) => Poll::Ready(Err(this.wrong_direction())),
        }
    }
}

impl AsyncWrite for StorageFile {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match this.stream {
            Stream::Writer(ref mut writer) => writer.as_mut().poll_write(cx, buf),
            Stream::Reader(_) => Poll::Ready(Err(this.wrong_direction())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().stream {
            Stream::Writer(writer) => writer.as_mut().poll_flush(cx),
            Stream::Reader(_) => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().stream {
            Stream::Writer(writer) => writer.as_mut().poll_shutdown(cx),
            Stream::Reader(_) => Poll::Ready(Ok(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_open_mode_parsing() {
        assert_eq!("r".parse::<OpenMode>().unwrap(), OpenMode::Read);
        assert_eq!("rb".parse::<OpenMode>().unwrap(), OpenMode::Read);
        assert_eq!("wb".parse::<OpenMode>().unwrap(), OpenMode::Write);
        assert_eq!("a".parse::<OpenMode>().unwrap(), OpenMode::Append);
        assert!(matches!("r+".parse::<OpenMode>(), Err(Error::InvalidInput(_))));
        assert!(matches!("".parse::<OpenMode>(), Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_reader_rejects_writes() {
        let mut file = StorageFile::reader(
            "memory://x".to_string(),
            Box::pin(Cursor::new(b"abc".to_vec())),
        );

        let mut out = String::new();
        file.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "abc");

        let err = file.write_all(b"nope").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_writer_rejects_reads() {
        let mut file = StorageFile::writer(
            "memory://y".to_string(),
            OpenMode::Write,
            Box::pin(Vec::<u8>::new()),
        );
        file.write_all(b"data").await.unwrap();

        let mut buf = [0u8; 4];
        let err = file.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
