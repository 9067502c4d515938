//! Constant-space reverse line scanning
//!
//! The heart of the server: walk a seekable source backward in fixed-size
//! blocks and hand out the last lines one at a time, newest first, without
//! ever holding more than one block in memory.

use std::io::{self, Read, Seek, SeekFrom};

/// Block size used when none is configured (64KB, one read syscall each).
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Tuning knobs for [`TailScanner`].
#[derive(Debug, Clone, Copy)]
pub struct TailParams {
    /// Size of the reused read buffer. Any single line must fit in one
    /// block; a longer line aborts the scan with `InvalidData`.
    pub block_size: usize,
}

impl Default for TailParams {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

enum ScanState {
    /// No I/O performed yet; the first pull seeks to the end and loads the
    /// final block.
    Unstarted,
    /// A block is loaded and the backward scan is in progress.
    Scanning,
    /// The sequence ended (count reached, start of file, or error).
    Finished,
}

/// Pull-based reverse line reader.
///
/// Each call to [`next_line`](TailScanner::next_line) produces the previous
/// line of the source (so the first call yields the last line of the file).
/// Lines keep their on-disk trailing `\n`; the very first line of the file
/// is returned exactly as stored, with no terminator invented for it.
///
/// The returned slice borrows the internal block buffer and is only valid
/// until the next call. With a `grep` needle set, lines that do not contain
/// the needle are skipped and do not count against `n`.
pub struct TailScanner<R> {
    source: R,
    block: Vec<u8>,
    block_len: usize,
    block_start_offset: u64,
    /// Read position: the next block fetch loads the bytes ending here.
    cursor: u64,
    line_start: usize,
    line_end: usize,
    remaining: usize,
    grep: Option<Vec<u8>>,
    state: ScanState,
}

impl<R: Read + Seek> TailScanner<R> {
    pub fn new(source: R, n: usize, grep: Option<String>) -> Self {
        Self::with_params(source, n, grep, TailParams::default())
    }

    /// Create a scanner with an explicit block size. Construction performs
    /// no I/O; with `n == 0` the source is never touched at all.
    pub fn with_params(source: R, n: usize, grep: Option<String>, params: TailParams) -> Self {
        Self {
            source,
            block: vec![0u8; params.block_size],
            block_len: 0,
            block_start_offset: 0,
            cursor: 0,
            line_start: 0,
            line_end: 0,
            remaining: n,
            grep: grep.map(String::into_bytes),
            state: ScanState::Unstarted,
        }
    }

    /// Produce the next line walking backward, or `None` when the sequence
    /// is exhausted.
    ///
    /// Errors are terminal: after an `Err` the scanner stays finished.
    pub fn next_line(&mut self) -> io::Result<Option<&[u8]>> {
        loop {
            match self.state {
                ScanState::Finished => return Ok(None),
                ScanState::Unstarted => {
                    if self.remaining == 0 {
                        self.state = ScanState::Finished;
                        return Ok(None);
                    }
                    self.cursor = self.source.seek(SeekFrom::End(0))?;
                    if !self.read_prev_block()? {
                        // Empty source: no lines at all.
                        self.state = ScanState::Finished;
                        return Ok(None);
                    }
                    self.state = ScanState::Scanning;
                }
                ScanState::Scanning => {
                    // Scan backward for a newline boundary. A line always
                    // contains at least one byte, so a `\n` that sits
                    // directly before `line_end` belongs to the line itself.
                    while self.line_start > 0
                        && (self.block[self.line_start] != b'\n'
                            || self.line_start + 1 == self.line_end)
                    {
                        self.line_start -= 1;
                    }

                    if self.block[self.line_start] == b'\n' && self.line_start + 1 != self.line_end
                    {
                        // Complete line between this boundary and line_end.
                        let (start, end) = (self.line_start + 1, self.line_end);
                        self.line_end = self.line_start + 1;
                        if self.line_start > 0 {
                            self.line_start -= 1;
                        }
                        if self.matches(start, end) {
                            self.remaining -= 1;
                            if self.remaining == 0 {
                                self.state = ScanState::Finished;
                            }
                            return Ok(Some(&self.block[start..end]));
                        }
                        // Filtered out: keep scanning without counting it.
                        continue;
                    }

                    if self.block_start_offset == 0 {
                        // Reached the true start of the file: whatever is
                        // left is the file's first line, yielded as-is.
                        let end = self.line_end;
                        self.state = ScanState::Finished;
                        if self.matches(0, end) {
                            return Ok(Some(&self.block[..end]));
                        }
                        return Ok(None);
                    }

                    // The line continues into the previous block. Move the
                    // cursor so the next fetch ends where the known bytes of
                    // this line begin; the partial prefix is re-read as the
                    // tail of that block.
                    let rewind = self.block_len - self.line_end;
                    if rewind == 0 {
                        self.state = ScanState::Finished;
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!(
                                "line longer than block size {} near offset {}",
                                self.block.len(),
                                self.block_start_offset
                            ),
                        ));
                    }
                    self.cursor = self.block_start_offset + self.line_end as u64;
                    if !self.read_prev_block()? {
                        self.state = ScanState::Finished;
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Load the block of bytes immediately preceding the cursor, in place.
    /// Returns `false` when the cursor is already at offset zero.
    fn read_prev_block(&mut self) -> io::Result<bool> {
        let block_len = self.cursor.min(self.block.len() as u64) as usize;
        if block_len == 0 {
            return Ok(false);
        }
        let start = self.cursor - block_len as u64;
        self.source.seek(SeekFrom::Start(start))?;
        self.source.read_exact(&mut self.block[..block_len])?;
        tracing::trace!(offset = start, len = block_len, "loaded block");

        self.block_len = block_len;
        self.block_start_offset = start;
        self.line_end = block_len;
        self.line_start = block_len - 1;
        Ok(true)
    }

    fn matches(&self, start: usize, end: usize) -> bool {
        match &self.grep {
            None => true,
            Some(needle) => contains(&self.block[start..end], needle),
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}
