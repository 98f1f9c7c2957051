//! Resumable inflate over gzip or zlib framed deflate streams.
//!
//! [`InflateStream`] owns the decompressor state, a 16 KiB input buffer and a
//! 64 KiB output ring. The ring always holds at least the last 32 KiB of output,
//! which is what a checkpoint needs as its dictionary window.
//!
//! There are exactly two ways to obtain a stream:
//! - [`InflateStream::begin`] at the start of the compressed file;
//! - [`InflateStream::resume`] at a recorded checkpoint: leftover bits are
//!   primed first, then the dictionary window is loaded, and only then can
//!   inflate run.
//!
//! Concatenated members are followed transparently. Each member's framing
//! (gzip or zlib) is detected from its first two bytes, and all members of
//! one file must share it.

use std::io::{Read, Seek, SeekFrom};

use miniz_oxide::inflate::TINFLStatus;
use miniz_oxide::inflate::core::{BlockBoundaryState, DecompressorOxide, decompress, inflate_flags};
use thiserror::Error;
use tracing::debug;

/// Deflate's maximum back-reference distance.
pub const WINDOW_SIZE: usize = 32768;

const CHUNK_SIZE: usize = 16384;

// Power of two, at least the window size.
const RING_SIZE: usize = 65536;

#[derive(Debug, Error)]
pub enum InflateError
{
    #[error("I/O error reading compressed input: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt deflate data near compressed offset {offset} ({status})")]
    Corrupt
    {
        offset: u64,
        status: String,
    },

    #[error("unexpected end of compressed input at offset {0}")]
    Truncated(u64),

    #[error("invalid member header at compressed offset {offset}: {reason}")]
    BadHeader
    {
        offset: u64,
        reason: String,
    },

    #[error("gzip trailer mismatch at compressed offset {offset}: {reason}")]
    BadTrailer
    {
        offset: u64,
        reason: String,
    },

    #[error("crossed a compressed member boundary while seeking (uncompressed offset {0})")]
    MemberBoundary(u64),

    #[error("checkpoint dictionary window is corrupt")]
    BadWindow,
}

/// Framing around one deflate body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing
{
    Gzip,
    Zlib,
}

impl Framing
{
    /// Detect framing from the first two bytes of a member.
    pub fn detect(magic: &[u8]) -> Option<Self>
    {
        match *magic
        {
            [0x1f, 0x8b, ..] => Some(Framing::Gzip),
            [cmf, flg, ..]
                if cmf & 0x0f == 8
                    && cmf >> 4 <= 7
                    && (u16::from(cmf) << 8 | u16::from(flg)) % 31 == 0 =>
            {
                Some(Framing::Zlib)
            }
            _ => None,
        }
    }

    fn trailer_len(self) -> usize
    {
        match self
        {
            Framing::Gzip => 8,
            Framing::Zlib => 4,
        }
    }
}

/// What the last call to [`InflateStream::step`] ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event
{
    /// Output was (possibly) produced; nothing else happened.
    Progress,
    /// The decompressor stopped before the header of a new, non-initial block.
    BlockBoundary,
    /// A member ended and the next member's deflate body starts here.
    MemberStart,
    /// The final member ended.
    End,
}

/// Resumable position recorded in a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint
{
    pub uncompressed_offset: u64,
    pub compressed_offset: u64,
    pub bit_offset: u8,
}

/// Buffered compressed input that tracks its absolute file position.
struct Input<R>
{
    reader: R,
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    /// Compressed offset of `buf[start]`.
    pos: u64,
}

impl<R: Read> Input<R>
{
    fn new(
        reader: R,
        pos: u64,
    ) -> Self
    {
        Self {
            reader,
            buf: vec![0; CHUNK_SIZE].into_boxed_slice(),
            start: 0,
            end: 0,
            pos,
        }
    }

    fn available(&self) -> &[u8]
    {
        &self.buf[self.start..self.end]
    }

    fn consume(
        &mut self,
        n: usize,
    )
    {
        self.start += n;
        self.pos += n as u64;
    }

    fn read_some(
        &mut self,
        at: usize,
    ) -> std::io::Result<usize>
    {
        loop
        {
            match self
                .reader
                .read(&mut self.buf[at..])
            {
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    /// Make sure some input is buffered. Returns false at end of input.
    fn fill(&mut self) -> std::io::Result<bool>
    {
        if self.start < self.end
        {
            return Ok(true);
        }
        self.start = 0;
        self.end = self.read_some(0)?;
        Ok(self.end > 0)
    }

    /// Up to `n` buffered bytes without consuming them; fewer only at end of input.
    fn peek(
        &mut self,
        n: usize,
    ) -> std::io::Result<&[u8]>
    {
        if self.end - self.start < n
        {
            self.buf
                .copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
            while self.end < n
            {
                let got = self.read_some(self.end)?;
                if got == 0
                {
                    break;
                }
                self.end += got;
            }
        }
        let end = self.end.min(self.start + n);
        Ok(&self.buf[self.start..end])
    }
}

impl<R: Read> Read for Input<R>
{
    fn read(
        &mut self,
        out: &mut [u8],
    ) -> std::io::Result<usize>
    {
        if !self.fill()?
        {
            return Ok(0);
        }
        let n = out
            .len()
            .min(self.end - self.start);
        out[..n].copy_from_slice(&self.buf[self.start..self.start + n]);
        self.consume(n);
        Ok(n)
    }
}

pub struct InflateStream<R>
{
    input: Input<R>,
    framing: Framing,
    decomp: Box<DecompressorOxide>,

    /// Circular output buffer.
    ring: Box<[u8]>,
    /// Total uncompressed bytes produced.
    out_pos: u64,
    /// Uncompressed bytes handed to the caller.
    ret_pos: u64,

    /// Checksum state for the current member; only meaningful when it was
    /// inflated from its first byte.
    crc: crc32fast::Hasher,
    member_out: u64,
    verify: bool,

    /// Member starts seen after the first.
    members: u64,
    done: bool,
}

impl<R: Read> InflateStream<R>
{
    /// Start at the very beginning of a compressed stream.
    pub fn begin(reader: R) -> Result<Self, InflateError>
    {
        let mut stream = Self {
            input: Input::new(reader, 0),
            framing: Framing::Gzip,
            decomp: Box::new(DecompressorOxide::new()),
            ring: vec![0; RING_SIZE].into_boxed_slice(),
            out_pos: 0,
            ret_pos: 0,
            crc: crc32fast::Hasher::new(),
            member_out: 0,
            verify: true,
            members: 0,
            done: false,
        };
        stream.begin_member()?;
        Ok(stream)
    }

    /// Inflate one input chunk's worth. Any previously produced output must
    /// have been consumed first.
    pub fn step(
        &mut self,
        stop_on_block_boundary: bool,
    ) -> Result<Event, InflateError>
    {
        debug_assert!(self.pending().is_empty());
        if self.done
        {
            return Ok(Event::End);
        }
        // At end of input the decompressor may still hold buffered output.
        let has_input = self
            .input
            .fill()?;
        let mut flags = if has_input { inflate_flags::TINFL_FLAG_HAS_MORE_INPUT } else { 0 };
        if stop_on_block_boundary
        {
            flags |= inflate_flags::TINFL_FLAG_STOP_ON_BLOCK_BOUNDARY;
        }

        let out_off = (self.out_pos % RING_SIZE as u64) as usize;
        let (status, consumed, produced) = decompress(
            &mut self.decomp,
            self.input.available(),
            &mut self.ring,
            out_off,
            flags,
        );
        self.input
            .consume(consumed);
        if self.verify
        {
            self.crc
                .update(&self.ring[out_off..out_off + produced]);
        }
        self.member_out += produced as u64;
        self.out_pos += produced as u64;

        match status
        {
            TINFLStatus::NeedsMoreInput if !has_input => Err(InflateError::Truncated(self.input.pos)),
            TINFLStatus::NeedsMoreInput | TINFLStatus::HasMoreOutput => Ok(Event::Progress),
            TINFLStatus::BlockBoundary => Ok(Event::BlockBoundary),
            TINFLStatus::Done => self.finish_member(),
            TINFLStatus::FailedCannotMakeProgress => Err(InflateError::Truncated(self.input.pos)),
            other => Err(InflateError::Corrupt {
                offset: self.input.pos,
                status: format!("{other:?}"),
            }),
        }
    }

    /// Output produced but not yet consumed.
    pub fn pending(&self) -> &[u8]
    {
        let start = (self.ret_pos % RING_SIZE as u64) as usize;
        let len = (self.out_pos - self.ret_pos) as usize;
        &self.ring[start..start + len]
    }

    /// Mark `n` pending bytes as consumed.
    pub fn consume(
        &mut self,
        n: usize,
    )
    {
        debug_assert!(n <= self.pending().len());
        self.ret_pos += n as u64;
    }

    /// Uncompressed offset of the next byte the caller will see.
    pub fn position(&self) -> u64
    {
        self.ret_pos
    }

    /// Compressed offset of the next unread input byte.
    pub fn compressed_position(&self) -> u64
    {
        self.input.pos
    }

    /// Bits of the previous input byte still owed to the next block, when the
    /// decompressor sits on a block boundary.
    pub fn boundary_bits(&self) -> Option<u8>
    {
        self.decomp
            .block_boundary_state()
            .map(|s| s.num_bits)
    }

    /// The `WINDOW_SIZE` bytes of output preceding the current output position.
    pub fn window(&self) -> Vec<u8>
    {
        let base = self.out_pos + RING_SIZE as u64 - WINDOW_SIZE as u64;
        (0..WINDOW_SIZE as u64)
            .map(|i| self.ring[((base + i) % RING_SIZE as u64) as usize])
            .collect()
    }

    /// Discard `n` bytes of output. Fails if that would cross into another member.
    pub fn skip(
        &mut self,
        mut n: u64,
    ) -> Result<(), InflateError>
    {
        let members = self.members;
        while n > 0
        {
            let pending = self
                .pending()
                .len() as u64;
            if pending == 0
            {
                // Output pending at a member switch still belongs to the old
                // member; only asking for more after that crosses over.
                if self.members != members
                {
                    return Err(InflateError::MemberBoundary(self.ret_pos));
                }
                let event = self.step(false)?;
                if event == Event::End && self.pending().is_empty()
                {
                    return Err(InflateError::Truncated(self.input.pos));
                }
                continue;
            }
            let take = pending.min(n);
            self.consume(take as usize);
            n -= take;
        }
        Ok(())
    }

    /// Append exactly `n` bytes of output to `out`.
    pub fn read_into(
        &mut self,
        mut n: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), InflateError>
    {
        while n > 0
        {
            let pending = self.pending();
            if pending.is_empty()
            {
                if self.step(false)? == Event::End && self.pending().is_empty()
                {
                    return Err(InflateError::Truncated(self.input.pos));
                }
                continue;
            }
            let take = pending
                .len()
                .min(n);
            out.extend_from_slice(&pending[..take]);
            self.consume(take);
            n -= take;
        }
        Ok(())
    }

    /// Append output up to and including the next '\n' to `out`.
    /// Returns false when the stream ended before any byte was read.
    pub fn read_line(
        &mut self,
        out: &mut Vec<u8>,
    ) -> Result<bool, InflateError>
    {
        let mut read_any = false;
        loop
        {
            let pending = self.pending();
            if pending.is_empty()
            {
                if self.step(false)? == Event::End && self.pending().is_empty()
                {
                    return Ok(read_any);
                }
                continue;
            }
            read_any = true;
            match memchr::memchr(b'\n', pending)
            {
                Some(pos) =>
                {
                    out.extend_from_slice(&pending[..=pos]);
                    self.consume(pos + 1);
                    return Ok(true);
                }
                None =>
                {
                    let len = pending.len();
                    out.extend_from_slice(pending);
                    self.consume(len);
                }
            }
        }
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R
    {
        self.input.reader
    }

    /// Parse the framing header of the member starting at the current input position.
    fn begin_member(&mut self) -> Result<(), InflateError>
    {
        let offset = self.input.pos;
        let mut magic = [0u8; 2];
        let peeked = self
            .input
            .peek(2)?;
        let seen = peeked.len();
        magic[..seen].copy_from_slice(peeked);
        let framing = Framing::detect(&magic[..seen]).ok_or_else(|| InflateError::BadHeader {
            offset,
            reason: "neither gzip nor zlib framing".to_string(),
        })?;

        match framing
        {
            Framing::Gzip =>
            {
                gzip_header::read_gz_header(&mut self.input).map_err(|e| {
                    InflateError::BadHeader {
                        offset,
                        reason: e.to_string(),
                    }
                })?;
            }
            Framing::Zlib =>
            {
                let flg = magic[1];
                if flg & 0x20 != 0
                {
                    return Err(InflateError::BadHeader {
                        offset,
                        reason: "zlib preset dictionaries are not supported".to_string(),
                    });
                }
                self.input
                    .consume(2);
            }
        }

        self.framing = framing;
        *self.decomp = DecompressorOxide::new();
        self.crc = crc32fast::Hasher::new();
        self.member_out = 0;
        self.verify = true;
        Ok(())
    }

    /// Consume the trailer of the member that just ended and start the next one, if any.
    fn finish_member(&mut self) -> Result<Event, InflateError>
    {
        let offset = self.input.pos;
        let mut trailer = [0u8; 8];
        let trailer = &mut trailer[..self
            .framing
            .trailer_len()];
        self.input
            .read_exact(trailer)
            .map_err(|e| match e.kind()
            {
                std::io::ErrorKind::UnexpectedEof => InflateError::Truncated(offset),
                _ => InflateError::Io(e),
            })?;

        if self.framing == Framing::Gzip && self.verify
        {
            let expected_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
            let expected_len = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
            let crc = std::mem::take(&mut self.crc).finalize();
            if crc != expected_crc
            {
                return Err(InflateError::BadTrailer {
                    offset,
                    reason: format!("CRC-32 {crc:08x}, trailer says {expected_crc:08x}"),
                });
            }
            if self.member_out as u32 != expected_len
            {
                return Err(InflateError::BadTrailer {
                    offset,
                    reason: format!(
                        "length {} (mod 2^32), trailer says {expected_len}",
                        self.member_out as u32
                    ),
                });
            }
        }

        if self
            .input
            .peek(1)?
            .is_empty()
        {
            self.done = true;
            return Ok(Event::End);
        }

        let previous = self.framing;
        let next_offset = self.input.pos;
        self.begin_member()?;
        // Resumes use one framing for the whole file.
        if self.framing != previous
        {
            return Err(InflateError::BadHeader {
                offset: next_offset,
                reason: format!("{:?} member follows a {previous:?} member", self.framing),
            });
        }
        self.members += 1;
        debug!(
            compressed_offset = self.input.pos,
            uncompressed_offset = self.out_pos,
            "next compressed member"
        );
        Ok(Event::MemberStart)
    }
}

impl<R: Read + Seek> InflateStream<R>
{
    /// Restart decompression at a checkpoint.
    ///
    /// `window` is the uncompressed dictionary (exactly `WINDOW_SIZE` bytes)
    /// and `framing` the framing of the member the checkpoint lies in.
    pub fn resume(
        mut reader: R,
        point: ResumePoint,
        window: &[u8],
        framing: Framing,
    ) -> Result<Self, InflateError>
    {
        if window.len() != WINDOW_SIZE || point.bit_offset > 7
        {
            return Err(InflateError::BadWindow);
        }

        let seek_to = point.compressed_offset - u64::from(point.bit_offset != 0);
        reader.seek(SeekFrom::Start(seek_to))?;
        let mut input = Input::new(reader, seek_to);

        // 1. Prime the bits left over from the byte before the block.
        let bit_buf = if point.bit_offset != 0
        {
            let mut byte = [0u8];
            input
                .read_exact(&mut byte)
                .map_err(|_| InflateError::Truncated(seek_to))?;
            byte[0] >> (8 - point.bit_offset)
        }
        else
        {
            0
        };
        let state = BlockBoundaryState {
            num_bits: point.bit_offset,
            bit_buf,
            ..Default::default()
        };
        let decomp = Box::new(DecompressorOxide::from_block_boundary_state(&state));

        // 2. Load the dictionary just before the output position.
        let mut ring = vec![0; RING_SIZE].into_boxed_slice();
        let base = point.uncompressed_offset + RING_SIZE as u64 - WINDOW_SIZE as u64;
        for (i, byte) in window
            .iter()
            .enumerate()
        {
            ring[((base + i as u64) % RING_SIZE as u64) as usize] = *byte;
        }

        Ok(Self {
            input,
            framing,
            decomp,
            ring,
            out_pos: point.uncompressed_offset,
            ret_pos: point.uncompressed_offset,
            crc: crc32fast::Hasher::new(),
            member_out: 0,
            // The member was not inflated from its start.
            verify: false,
            members: 0,
            done: false,
        })
    }
}

/// Compress a dictionary window for storage.
pub fn compress_window(window: &[u8]) -> Vec<u8>
{
    miniz_oxide::deflate::compress_to_vec(window, 6)
}

/// Inverse of [`compress_window`].
pub fn decompress_window(stored: &[u8]) -> Result<Vec<u8>, InflateError>
{
    let window =
        miniz_oxide::inflate::decompress_to_vec(stored).map_err(|_| InflateError::BadWindow)?;
    if window.len() != WINDOW_SIZE
    {
        return Err(InflateError::BadWindow);
    }
    Ok(window)
}
