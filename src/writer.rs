//! Streaming sub-writers.
//!
//! Both writers buffer in memory and implement [`std::io::Write`].
//! [`SnapshotWriter`] commits one write transaction on close;
//! [`BatchWriter`] stages one write into its batch on close. Dropping an
//! unclosed writer closes it best-effort.

use std::io;

use crate::batch::Batch;
use crate::error::Result;
use crate::snapshot::{Snapshot, WriteOptions};

/// Buffered writer committing to a snapshot's branch on close.
///
/// ```rust,no_run
/// use std::io::Write;
/// use vost::{Store, OpenOptions};
///
/// let store = Store::open("/tmp/repo", OpenOptions::default()).unwrap();
/// let snap = store.branches().get("main").unwrap();
/// let mut w = snap.writer("out.bin").unwrap();
/// w.write_all(b"part 1").unwrap();
/// w.write_all(b"part 2").unwrap();
/// let next = w.close().unwrap();
/// assert_eq!(next.read("out.bin").unwrap(), b"part 1part 2");
/// ```
pub struct SnapshotWriter {
    snapshot: Snapshot,
    path: String,
    buf: Vec<u8>,
    closed: bool,
}

impl SnapshotWriter {
    pub(crate) fn new(snapshot: Snapshot, path: String) -> Self {
        Self {
            snapshot,
            path,
            buf: Vec::new(),
            closed: false,
        }
    }

    /// Whether the writer has been closed.
    pub fn closed(&self) -> bool {
        self.closed
    }

    /// Flush the buffer as a single write and return the new snapshot.
    /// Closing twice returns the snapshot of the first close.
    pub fn close(&mut self) -> Result<Snapshot> {
        if self.closed {
            return Ok(self.snapshot.clone());
        }
        let data = std::mem::take(&mut self.buf);
        let next = self
            .snapshot
            .write(&self.path, &data, WriteOptions::default())?;
        self.snapshot = next.clone();
        self.closed = true;
        Ok(next)
    }
}

impl io::Write for SnapshotWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "write to a closed writer",
            ));
        }
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

/// Buffered writer staging into a [`Batch`] on close.
pub struct BatchWriter<'a> {
    batch: &'a mut Batch,
    path: String,
    buf: Vec<u8>,
    closed: bool,
}

impl<'a> BatchWriter<'a> {
    pub(crate) fn new(batch: &'a mut Batch, path: String) -> Self {
        Self {
            batch,
            path,
            buf: Vec::new(),
            closed: false,
        }
    }

    /// Whether the writer has been closed.
    pub fn closed(&self) -> bool {
        self.closed
    }

    /// Flush the buffer as a single staged write in the batch.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let data = std::mem::take(&mut self.buf);
        self.batch.write(&self.path, &data)?;
        self.closed = true;
        Ok(())
    }
}

impl io::Write for BatchWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "write to a closed writer",
            ));
        }
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for BatchWriter<'_> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}
