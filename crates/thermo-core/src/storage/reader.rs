//! Bounded sequential line reader over a [`LogStore`].

use super::LogStore;

/// Bytes fetched from the store per read, one SD block
pub(crate) const READ_CHUNK_LEN: usize = 512;

/// Longest line kept in full; longer lines are reported as oversized
pub(crate) const MAX_LINE_LEN: usize = 48;

pub(crate) enum Line<'a> {
    Complete(&'a [u8]),
    Oversized,
}

/// Splits the store contents into newline-terminated lines.
///
/// Memory use is fixed: one read chunk plus one line buffer, regardless of
/// how large the log has grown. A trailing line without a newline is still
/// returned.
pub(crate) struct LineReader<'s, S: LogStore> {
    store: &'s mut S,
    offset: u32,
    chunk: [u8; READ_CHUNK_LEN],
    pos: usize,
    filled: usize,
    line: heapless::Vec<u8, MAX_LINE_LEN>,
    oversized: bool,
}

impl<'s, S: LogStore> LineReader<'s, S> {
    pub(crate) fn new(store: &'s mut S) -> Self {
        Self {
            store,
            offset: 0,
            chunk: [0; READ_CHUNK_LEN],
            pos: 0,
            filled: 0,
            line: heapless::Vec::new(),
            oversized: false,
        }
    }

    /// Next line without its terminator, `None` at end of log.
    pub(crate) fn next_line(&mut self) -> Result<Option<Line<'_>>, S::Error> {
        self.line.clear();
        self.oversized = false;
        let mut started = false;

        loop {
            if self.pos == self.filled {
                let read = self.store.read_at(self.offset, &mut self.chunk)?;
                if read == 0 {
                    if !started {
                        return Ok(None);
                    }
                    return Ok(Some(self.current()));
                }
                self.offset += read as u32;
                self.pos = 0;
                self.filled = read;
            }

            let byte = self.chunk[self.pos];
            self.pos += 1;
            if byte == b'\n' {
                return Ok(Some(self.current()));
            }

            started = true;
            if self.line.push(byte).is_err() {
                self.oversized = true;
            }
        }
    }

    fn current(&self) -> Line<'_> {
        if self.oversized {
            Line::Oversized
        } else {
            Line::Complete(&self.line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryLogError, MemoryLogStore};

    extern crate alloc;
    use alloc::vec::Vec;

    fn collect(store: &mut MemoryLogStore) -> Result<Vec<Option<Vec<u8>>>, MemoryLogError> {
        let mut reader = LineReader::new(store);
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line()? {
            lines.push(match line {
                Line::Complete(bytes) => Some(bytes.to_vec()),
                Line::Oversized => None,
            });
        }
        Ok(lines)
    }

    #[test]
    fn test_lines_across_chunk_boundaries() {
        let mut text = Vec::new();
        for i in 0..20u32 {
            text.extend_from_slice(crate::storage::Sample::new(1000 + i, 20.0).to_line().as_bytes());
        }
        let mut store = MemoryLogStore::with_contents(&text);
        let lines = collect(&mut store).unwrap();
        assert_eq!(lines.len(), 20);
        assert_eq!(lines[19].as_deref(), Some(&b"1019,20.00"[..]));
    }

    #[test]
    fn test_trailing_line_and_empty_lines() {
        let mut store = MemoryLogStore::with_contents(b"a\n\nb");
        let lines = collect(&mut store).unwrap();
        assert_eq!(
            lines,
            [Some(b"a".to_vec()), Some(Vec::new()), Some(b"b".to_vec())]
        );
    }

    #[test]
    fn test_oversized_line_is_flagged_and_reader_recovers() {
        let mut text = [b'9'; 100].to_vec();
        text.extend_from_slice(b"\n5,1.00\n");
        let mut store = MemoryLogStore::with_contents(&text);
        let lines = collect(&mut store).unwrap();
        assert_eq!(lines, [None, Some(b"5,1.00".to_vec())]);
    }

    /// Counts reads and checks they walk the log front to back
    struct CountingStore {
        inner: MemoryLogStore,
        reads: usize,
        next_offset: u32,
    }

    impl LogStore for CountingStore {
        type Error = MemoryLogError;

        fn append(&mut self, bytes: &[u8]) -> Result<(), MemoryLogError> {
            self.inner.append(bytes)
        }

        fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> Result<usize, MemoryLogError> {
            assert_eq!(offset, self.next_offset);
            self.reads += 1;
            let read = self.inner.read_at(offset, buf)?;
            self.next_offset += read as u32;
            Ok(read)
        }

        fn size(&mut self) -> Result<u32, MemoryLogError> {
            self.inner.size()
        }

        fn clear(&mut self) -> Result<(), MemoryLogError> {
            self.inner.clear()
        }
    }

    #[test]
    fn test_scan_reads_whole_blocks_sequentially() {
        let mut text = Vec::new();
        for i in 0..1000u32 {
            let sample = crate::storage::Sample::new(1_700_000_000 + i * 60, 21.5);
            text.extend_from_slice(sample.to_line().as_bytes());
        }
        let mut store = CountingStore {
            inner: MemoryLogStore::with_contents(&text),
            reads: 0,
            next_offset: 0,
        };

        let mut reader = LineReader::new(&mut store);
        let mut lines = 0;
        while reader.next_line().unwrap().is_some() {
            lines += 1;
        }

        assert_eq!(lines, 1000);
        // Every block plus the read that reports end of log
        assert_eq!(store.reads, text.len().div_ceil(READ_CHUNK_LEN) + 1);
    }

    #[test]
    fn test_missing_log_is_an_error() {
        let mut store = MemoryLogStore::new();
        assert_eq!(collect(&mut store), Err(MemoryLogError::Missing));
    }
}
