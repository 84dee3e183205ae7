//! Palette-animation container.
//!
//! Layout: a 16-byte header of four little-endian `i32` (width, height,
//! frame count, fps in milli-Hertz) followed by single-byte tagged chunks:
//!
//! - `P` palette update: one length byte `N`, then `N` RGB triples for
//!   palette indices `0..N`
//! - `I` image: `width * height` palette indices
//! - `X` end of stream (end of file ends the stream as well)
//!
//! Files are usually gzip-wrapped; [`open_stream`] unwraps them.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::time::Duration;

use flate2::read::GzDecoder;
use thiserror::Error;

use crate::timing::clock::frame_offset;
use crate::timing::stop;

pub const TAG_PALETTE: u8 = b'P';
pub const TAG_IMAGE: u8 = b'I';
pub const TAG_END: u8 = b'X';

pub const HEADER_LEN: usize = 16;

/// Largest accepted frame, in pixels.
const MAX_PIXELS: u64 = 1 << 24;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const READ_BUFFER: usize = 256 * 1024;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("I/O error while decoding: {0}")]
    Io(#[from] io::Error),
    #[error("stream truncated inside {what}")]
    Truncated { what: &'static str },
    #[error("invalid header field {field}: {value}")]
    InvalidHeader { field: &'static str, value: i64 },
    #[error("unknown chunk tag 0x{tag:02x} at offset {offset}")]
    UnknownTag { tag: u8, offset: u64 },
    #[error("decoding cancelled")]
    Cancelled,
}

impl DecodeError {
    fn from_io(err: io::Error, what: &'static str) -> Self {
        if stop::is_cancelled(&err) {
            DecodeError::Cancelled
        } else if err.kind() == io::ErrorKind::UnexpectedEof {
            DecodeError::Truncated { what }
        } else {
            DecodeError::Io(err)
        }
    }
}

/// Fixed stream header, read once before the first chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub fps_millihz: u32,
}

impl StreamHeader {
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Result<Self, DecodeError> {
        let field = |i: usize| {
            i32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]])
        };
        let width = positive("width", field(0))?;
        let height = positive("height", field(1))?;
        let frame_count = u32::try_from(field(2)).map_err(|_| DecodeError::InvalidHeader {
            field: "frame_count",
            value: i64::from(field(2)),
        })?;
        let fps_millihz = positive("fps", field(3))?;

        let pixels = u64::from(width) * u64::from(height);
        if pixels > MAX_PIXELS {
            return Err(DecodeError::InvalidHeader {
                field: "dimensions",
                value: pixels as i64,
            });
        }

        Ok(Self {
            width,
            height,
            frame_count,
            fps_millihz,
        })
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut bytes = [0u8; HEADER_LEN];
        reader
            .read_exact(&mut bytes)
            .map_err(|e| DecodeError::from_io(e, "header"))?;
        Self::parse(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        let fields = [self.width, self.height, self.frame_count, self.fps_millihz];
        for (chunk, value) in out.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn fps(&self) -> f64 {
        f64::from(self.fps_millihz) / 1000.0
    }

    pub fn frame_interval(&self) -> Duration {
        frame_offset(self.fps_millihz, 1)
    }

    /// Nominal presentation time of frame `index`.
    pub fn frame_time(&self, index: u32) -> Duration {
        frame_offset(self.fps_millihz, u64::from(index))
    }

    /// Nominal wall-clock length of playback starting at `resume_frame`.
    pub fn playback_duration(&self, resume_frame: u32) -> Duration {
        frame_offset(
            self.fps_millihz,
            u64::from(self.frame_count.saturating_sub(resume_frame)),
        )
    }

    /// Audio samples covering the frames before `resume_frame`.
    pub fn audio_skip_samples(&self, resume_frame: u32, sample_rate: u32) -> usize {
        let samples = u64::from(resume_frame) * u64::from(sample_rate) * 1000
            / u64::from(self.fps_millihz.max(1));
        usize::try_from(samples).unwrap_or(usize::MAX)
    }
}

fn positive(field: &'static str, value: i32) -> Result<u32, DecodeError> {
    match u32::try_from(value) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(DecodeError::InvalidHeader {
            field,
            value: i64::from(value),
        }),
    }
}

/// One decoded chunk. Slices borrow the reader's scratch buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Chunk<'a> {
    /// RGB triples for palette indices `0..len / 3`.
    Palette(&'a [u8]),
    /// One palette index per pixel, row-major.
    Image(&'a [u8]),
    End,
}

/// Pull parser over a container stream.
///
/// Holds no palette or image state; callers thread that through
/// [`Palette`](super::image::Palette) and [`FrameBuffer`](super::image::FrameBuffer).
/// After `End` or an error every further call returns `End` without reading.
pub struct ContainerReader<R> {
    inner: R,
    header: StreamHeader,
    scratch: Vec<u8>,
    offset: u64,
    finished: bool,
}

impl<R: Read> ContainerReader<R> {
    pub fn new(mut inner: R) -> Result<Self, DecodeError> {
        let header = StreamHeader::read_from(&mut inner)?;
        log::debug!(
            "Container header: {}x{}, {} frames @ {:.3} fps",
            header.width,
            header.height,
            header.frame_count,
            header.fps()
        );
        Ok(Self {
            inner,
            header,
            scratch: Vec::with_capacity(header.pixel_count()),
            offset: HEADER_LEN as u64,
            finished: false,
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Bytes consumed from the underlying stream so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn next_chunk(&mut self) -> Result<Chunk<'_>, DecodeError> {
        if self.finished {
            return Ok(Chunk::End);
        }
        let tag_offset = self.offset;
        let Some(tag) = self.read_tag()? else {
            self.finished = true;
            return Ok(Chunk::End);
        };
        match tag {
            TAG_END => {
                self.finished = true;
                Ok(Chunk::End)
            }
            TAG_PALETTE => {
                let len = self.read_byte("palette length")?;
                self.fill(usize::from(len) * 3, "palette")?;
                Ok(Chunk::Palette(&self.scratch))
            }
            TAG_IMAGE => {
                self.fill(self.header.pixel_count(), "image")?;
                Ok(Chunk::Image(&self.scratch))
            }
            other => {
                self.finished = true;
                Err(DecodeError::UnknownTag {
                    tag: other,
                    offset: tag_offset,
                })
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Next tag byte, or `None` at a clean end of stream.
    fn read_tag(&mut self) -> Result<Option<u8>, DecodeError> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.offset += 1;
                    return Ok(Some(byte[0]));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.finished = true;
                    return Err(DecodeError::from_io(e, "chunk tag"));
                }
            }
        }
    }

    fn read_byte(&mut self, what: &'static str) -> Result<u8, DecodeError> {
        let mut byte = [0u8; 1];
        if let Err(e) = self.inner.read_exact(&mut byte) {
            self.finished = true;
            return Err(DecodeError::from_io(e, what));
        }
        self.offset += 1;
        Ok(byte[0])
    }

    fn fill(&mut self, len: usize, what: &'static str) -> Result<(), DecodeError> {
        self.scratch.resize(len, 0);
        if let Err(e) = self.inner.read_exact(&mut self.scratch) {
            self.finished = true;
            return Err(DecodeError::from_io(e, what));
        }
        self.offset += len as u64;
        Ok(())
    }
}

/// Buffer `reader`, inflating it first if it starts with the gzip magic.
pub fn open_stream<R>(reader: R) -> io::Result<Box<dyn Read + Send>>
where
    R: Read + Send + 'static,
{
    let mut buffered = BufReader::with_capacity(READ_BUFFER, reader);
    let gzipped = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);
    if gzipped {
        Ok(Box::new(BufReader::with_capacity(
            READ_BUFFER,
            GzDecoder::new(buffered),
        )))
    } else {
        Ok(Box::new(buffered))
    }
}

/// Writes the container format. Used by authoring tools and tests.
pub struct ContainerWriter<W> {
    inner: W,
    header: StreamHeader,
}

impl<W: Write> ContainerWriter<W> {
    pub fn new(mut inner: W, header: StreamHeader) -> io::Result<Self> {
        inner.write_all(&header.to_bytes())?;
        Ok(Self { inner, header })
    }

    /// Write palette entries `0..colors.len()`.
    pub fn palette(&mut self, colors: &[[u8; 3]]) -> io::Result<()> {
        let len = u8::try_from(colors.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "at most 255 palette entries per chunk")
        })?;
        self.inner.write_all(&[TAG_PALETTE, len])?;
        for rgb in colors {
            self.inner.write_all(rgb)?;
        }
        Ok(())
    }

    pub fn image(&mut self, indices: &[u8]) -> io::Result<()> {
        if indices.len() != self.header.pixel_count() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "image has {} pixels, header expects {}",
                    indices.len(),
                    self.header.pixel_count()
                ),
            ));
        }
        self.inner.write_all(&[TAG_IMAGE])?;
        self.inner.write_all(indices)
    }

    /// Write the end tag and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.write_all(&[TAG_END])?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}
