//! Single-pass checkpoint builder.
//!
//! Inflates the whole compressed input once, feeding every chunk to a
//! [`LineFinder`], and records an [`AccessPoint`] at the start of every
//! compressed member and at deflate block boundaries roughly every
//! `index_every` uncompressed bytes.

use std::io::Read;

use tracing::debug;

use crate::core::inflate::{Event, InflateError, InflateStream, ResumePoint, compress_window};
use crate::core::line_finder::{LineFinder, LineRecord, LineSink};

/// Default distance between checkpoints, in uncompressed bytes.
pub const DEFAULT_INDEX_EVERY: u64 = 32 * 1024 * 1024;

/// A recorded position from which decompression can restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint
{
    pub uncompressed_offset: u64,
    /// Inclusive end of the span this point covers.
    pub uncompressed_end_offset: u64,
    pub compressed_offset: u64,
    /// Low bits of the byte at `compressed_offset - 1` that belong to the next block.
    pub bit_offset: u8,
    /// Deflate-compressed dictionary window; may be left empty when loaded
    /// without windows.
    pub window: Vec<u8>,
    /// Lines completed before `uncompressed_offset`.
    pub line_num: u64,
}

impl AccessPoint
{
    pub fn resume_point(&self) -> ResumePoint
    {
        ResumePoint {
            uncompressed_offset: self.uncompressed_offset,
            compressed_offset: self.compressed_offset,
            bit_offset: self.bit_offset,
        }
    }

    /// Whether `offset` lies inside this point's span.
    pub fn covers(
        &self,
        offset: u64,
    ) -> bool
    {
        self.uncompressed_offset <= offset && offset <= self.uncompressed_end_offset
    }
}

/// Line consumer that is also told about kept records and scan progress.
pub trait ScanSink: LineSink
{
    /// Called after every inflated chunk with the records kept meanwhile.
    /// `compressed_pos` is the number of compressed bytes consumed so far.
    fn on_records(
        &mut self,
        records: std::vec::Drain<'_, LineRecord>,
        compressed_pos: u64,
    ) -> Result<(), Self::Error>;
}

/// Result of a completed scan.
#[derive(Debug)]
pub struct Checkpoints
{
    pub points: Vec<AccessPoint>,
    pub uncompressed_size: u64,
    pub num_lines: u64,
}

pub struct CheckpointBuilder<R>
{
    stream: InflateStream<R>,
    index_every: u64,
    points: Vec<AccessPoint>,
    finder: LineFinder,
}

impl<R: Read> CheckpointBuilder<R>
{
    /// Parse the first member header; the first checkpoint sits right after it.
    pub fn new(
        reader: R,
        index_every: u64,
    ) -> Result<Self, InflateError>
    {
        let mut builder = Self {
            stream: InflateStream::begin(reader)?,
            index_every,
            points: Vec::new(),
            finder: LineFinder::new(),
        };
        builder.checkpoint(0);
        Ok(builder)
    }

    /// Inflate to the end, reporting lines to `sink`.
    pub fn run<S>(
        mut self,
        sink: &mut S,
    ) -> Result<Checkpoints, S::Error>
    where
        S: ScanSink,
        S::Error: From<InflateError>,
    {
        loop
        {
            let event = self
                .stream
                .step(true)?;

            let pending = self
                .stream
                .pending();
            let produced = pending.len();
            self.finder
                .feed(pending, false, sink)?;
            self.stream
                .consume(produced);
            sink.on_records(
                self.finder
                    .drain_kept(),
                self.stream
                    .compressed_position(),
            )?;

            match event
            {
                Event::Progress => {}
                Event::BlockBoundary =>
                {
                    let since_last = self
                        .stream
                        .position()
                        - self.last_offset();
                    if since_last > self.index_every
                    {
                        let bits = self
                            .stream
                            .boundary_bits()
                            .ok_or_else(|| InflateError::Corrupt {
                                offset: self
                                    .stream
                                    .compressed_position(),
                                status: "no block boundary state".to_string(),
                            })?;
                        self.checkpoint(bits);
                    }
                }
                // Windows never span members, so every member starts fresh.
                Event::MemberStart => self.checkpoint(0),
                Event::End => break,
            }
        }

        self.finder
            .feed(&[], true, sink)?;
        sink.on_records(
            self.finder
                .drain_kept(),
            self.stream
                .compressed_position(),
        )?;

        let total = self
            .finder
            .sentinel()
            .unwrap_or_else(|| self.stream.position());
        let num_lines = self
            .finder
            .lines_completed();
        let mut points = self.points;

        // A trailing empty member can leave a point with nothing to cover.
        points.retain(|p| p.uncompressed_offset == 0 || p.uncompressed_offset < total);
        close_spans(&mut points, total);

        Ok(Checkpoints {
            points,
            uncompressed_size: total,
            num_lines,
        })
    }

    fn last_offset(&self) -> u64
    {
        self.points
            .last()
            .map_or(0, |p| p.uncompressed_offset)
    }

    fn checkpoint(
        &mut self,
        bit_offset: u8,
    )
    {
        let point = AccessPoint {
            uncompressed_offset: self
                .stream
                .position(),
            uncompressed_end_offset: 0,
            compressed_offset: self
                .stream
                .compressed_position(),
            bit_offset,
            window: compress_window(
                &self
                    .stream
                    .window(),
            ),
            line_num: self
                .finder
                .lines_completed(),
        };
        debug!(
            uncompressed = point.uncompressed_offset,
            compressed = point.compressed_offset,
            bits = point.bit_offset,
            line = point.line_num,
            window_bytes = point.window.len(),
            "checkpoint"
        );

        // An empty member yields a second point at the same offset; the later
        // one is where decoding can actually continue.
        match self.points.last_mut()
        {
            Some(last) if last.uncompressed_offset == point.uncompressed_offset => *last = point,
            _ => self
                .points
                .push(point),
        }
    }
}

/// Fill in inclusive end offsets so the spans partition `[0, total)`.
fn close_spans(
    points: &mut [AccessPoint],
    total: u64,
)
{
    let starts: Vec<u64> = points
        .iter()
        .skip(1)
        .map(|p| p.uncompressed_offset)
        .chain(std::iter::once(total.max(1)))
        .collect();
    for (point, next_start) in points
        .iter_mut()
        .zip(starts)
    {
        point.uncompressed_end_offset = next_start.max(point.uncompressed_offset + 1) - 1;
    }
}

#[cfg(test)]
mod tests
{
    use std::io::{Cursor, Write};

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    #[derive(Default)]
    struct CountingSink
    {
        lines: u64,
        records: Vec<LineRecord>,
    }

    impl LineSink for CountingSink
    {
        type Error = InflateError;

        fn on_line(
            &mut self,
            _number: u64,
            _offset: u64,
            _line: &[u8],
        ) -> Result<bool, Self::Error>
        {
            self.lines += 1;
            Ok(true)
        }
    }

    impl ScanSink for CountingSink
    {
        fn on_records(
            &mut self,
            records: std::vec::Drain<'_, LineRecord>,
            _compressed_pos: u64,
        ) -> Result<(), Self::Error>
        {
            self.records
                .extend(records);
            Ok(())
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8>
    {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data)
            .unwrap();
        enc.finish()
            .unwrap()
    }

    fn sample(lines: u32) -> Vec<u8>
    {
        (1..=lines)
            .flat_map(|i| format!("Line {i} - Hex {i:x} - Mod {}\n", i & 0xff).into_bytes())
            .collect()
    }

    #[test]
    fn spans_partition_the_output()
    {
        let data = sample(65536);
        let builder = CheckpointBuilder::new(Cursor::new(gzip(&data)), 64 * 1024).unwrap();
        let mut sink = CountingSink::default();
        let result = builder
            .run(&mut sink)
            .unwrap();

        assert_eq!(result.uncompressed_size, data.len() as u64);
        assert_eq!(result.num_lines, 65536);
        assert_eq!(sink.lines, 65536);
        assert_eq!(sink.records.len(), 65536);

        let points = &result.points;
        assert!(points.len() > 4, "expected several checkpoints, got {}", points.len());
        assert_eq!(points[0].uncompressed_offset, 0);
        for pair in points.windows(2)
        {
            assert_eq!(pair[0].uncompressed_end_offset + 1, pair[1].uncompressed_offset);
        }
        let last = points
            .last()
            .unwrap();
        assert_eq!(last.uncompressed_end_offset, data.len() as u64 - 1);
    }

    #[test]
    fn line_counts_match_offsets()
    {
        let data = sample(20000);
        let builder = CheckpointBuilder::new(Cursor::new(gzip(&data)), 32 * 1024).unwrap();
        let result = builder
            .run(&mut CountingSink::default())
            .unwrap();
        for point in &result.points
        {
            let before = &data[..point.uncompressed_offset as usize];
            let newlines = before
                .iter()
                .filter(|&&b| b == b'\n')
                .count() as u64;
            assert_eq!(point.line_num, newlines);
        }
    }

    #[test]
    fn every_member_gets_a_checkpoint()
    {
        let mut file = gzip(b"alpha\nbeta\n");
        file.extend(gzip(b""));
        file.extend(gzip(b"gamma\n"));
        file.extend(gzip(b""));

        let builder = CheckpointBuilder::new(Cursor::new(file), DEFAULT_INDEX_EVERY).unwrap();
        let result = builder
            .run(&mut CountingSink::default())
            .unwrap();
        let starts: Vec<u64> = result
            .points
            .iter()
            .map(|p| p.uncompressed_offset)
            .collect();
        assert_eq!(starts, vec![0, 11]);
        assert_eq!(result.points[1].line_num, 2);
        assert_eq!(result.points[1].uncompressed_end_offset, 16);
    }

    #[test]
    fn empty_stream_has_one_point()
    {
        let builder = CheckpointBuilder::new(Cursor::new(gzip(b"")), DEFAULT_INDEX_EVERY).unwrap();
        let result = builder
            .run(&mut CountingSink::default())
            .unwrap();
        assert_eq!(result.points.len(), 1);
        assert_eq!(result.uncompressed_size, 0);
        assert_eq!(result.num_lines, 0);
    }
}
