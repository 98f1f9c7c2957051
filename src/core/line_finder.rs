//! Line boundary scanner over a stream of byte blocks.
//!
//! Goals
//! - Single pass over each block, `memchr` for '\n'.
//! - 1-based line numbers, offsets relative to the start of the stream.
//! - Fragments spanning two blocks are carried over and joined.
//! - The sink decides per line whether a persistent record is kept.
//!
//! Notes
//! - An empty stream has 0 lines.
//! - A final fragment without '\n' becomes the last line; its length has no
//!   terminator byte.
//! - The sentinel offset equals the total number of bytes fed.

/// Receives every line found by a [`LineFinder`].
pub trait LineSink
{
    type Error;

    /// Called once per line with the line bytes, excluding the '\n'.
    /// Returns whether the line's record should be kept.
    fn on_line(
        &mut self,
        number: u64,
        offset: u64,
        line: &[u8],
    ) -> Result<bool, Self::Error>;
}

/// Persistent record of one line: where it starts and how many bytes it spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRecord
{
    pub line: u64,
    pub offset: u64,
    /// Byte length including the '\n' terminator, when there is one.
    pub length: u64,
}

#[derive(Debug, Default)]
pub struct LineFinder
{
    /// Fragment of a line whose terminator has not been seen yet.
    carry: Vec<u8>,
    /// Offset of the next line to start.
    offset: u64,
    /// Lines emitted so far.
    lines: u64,
    /// Kept records not yet drained by the owner.
    kept: Vec<LineRecord>,
    /// Most recent line, and whether it was kept.
    last: Option<(LineRecord, bool)>,
    /// Total length, set once the final block was fed.
    sentinel: Option<u64>,
}

impl LineFinder
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Process the next block of the stream.
    pub fn feed<S: LineSink>(
        &mut self,
        bytes: &[u8],
        last: bool,
        sink: &mut S,
    ) -> Result<(), S::Error>
    {
        let mut i = 0usize;

        while let Some(pos) = memchr::memchr(b'\n', &bytes[i..])
        {
            let end = i + pos;
            if self
                .carry
                .is_empty()
            {
                self.emit(&bytes[i..end], true, sink)?;
            }
            else
            {
                let mut joined = std::mem::take(&mut self.carry);
                joined.extend_from_slice(&bytes[i..end]);
                self.emit(&joined, true, sink)?;
                // Hand the allocation back for the next fragment.
                joined.clear();
                self.carry = joined;
            }
            i = end + 1;
        }

        self.carry
            .extend_from_slice(&bytes[i..]);

        if last
        {
            if !self
                .carry
                .is_empty()
            {
                let fragment = std::mem::take(&mut self.carry);
                self.emit(&fragment, false, sink)?;
            }

            // The final line is always kept so the line count is recoverable.
            if let Some((record, false)) = self.last
            {
                self.kept
                    .push(record);
                self.last = Some((record, true));
            }

            self.sentinel = Some(self.offset);
        }

        Ok(())
    }

    fn emit<S: LineSink>(
        &mut self,
        line: &[u8],
        terminated: bool,
        sink: &mut S,
    ) -> Result<(), S::Error>
    {
        self.lines += 1;
        let length = line.len() as u64 + u64::from(terminated);
        let record = LineRecord {
            line: self.lines,
            offset: self.offset,
            length,
        };

        let keep = sink.on_line(record.line, record.offset, line)?;
        if keep
        {
            self.kept
                .push(record);
        }
        self.last = Some((record, keep));
        self.offset += length;
        Ok(())
    }

    /// Take the records kept since the previous drain.
    pub fn drain_kept(&mut self) -> std::vec::Drain<'_, LineRecord>
    {
        self.kept
            .drain(..)
    }

    /// Number of lines completed so far.
    pub fn lines_completed(&self) -> u64
    {
        self.lines
    }

    /// Total stream length. Only known after the final block was fed.
    pub fn sentinel(&self) -> Option<u64>
    {
        self.sentinel
    }
}
