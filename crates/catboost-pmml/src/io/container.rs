//! CatBoost `.cbm` container envelope.
//!
//! # Format Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Magic "CBM1" (4 bytes)                                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Length (u32 LE)  |  0xFFFFFFFF + Length (u64 LE)             │
//! │ Segment payload (Length bytes)                               │
//! ├──────────────────────────────────────────────────────────────┤
//! │ ... further segments until end of input ...                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first segment holds the model table. Later segments (if any) carry
//! auxiliary model parts.

use std::io::{self, Read, Write};

use crate::error::ConvertError;

// ============================================================================
// Constants
// ============================================================================

/// Magic bytes identifying a CatBoost binary model.
pub const MAGIC: &[u8; 4] = b"CBM1";

/// 32-bit length value signalling that a 64-bit length follows.
pub const LENGTH_ESCAPE: u32 = u32::MAX;

// ============================================================================
// Reader
// ============================================================================

/// Reads length-prefixed segments from a CatBoost container.
///
/// The magic tag is verified on construction, before any segment is read.
#[derive(Debug)]
pub struct ContainerReader<R> {
    reader: R,
}

impl<R: Read> ContainerReader<R> {
    /// Verify the magic tag and position the reader at the first segment.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Format`] if the input is shorter than the tag
    /// or the tag does not match [`MAGIC`].
    pub fn new(mut reader: R) -> Result<Self, ConvertError> {
        let mut magic = [0u8; 4];
        let n = read_up_to(&mut reader, &mut magic)?;
        if n < magic.len() || &magic != MAGIC {
            return Err(ConvertError::Format {
                found: magic[..n].to_vec(),
            });
        }
        Ok(Self { reader })
    }

    /// Read the next segment.
    ///
    /// Returns `Ok(None)` when the input ends cleanly on a segment boundary.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Truncated`] if the length prefix or the payload
    /// is cut short.
    pub fn read_segment(&mut self) -> Result<Option<Vec<u8>>, ConvertError> {
        let Some(len) = self.read_length()? else {
            return Ok(None);
        };

        // Grow as bytes arrive instead of trusting the declared length up front.
        let mut payload = Vec::new();
        let actual = (&mut self.reader).take(len).read_to_end(&mut payload)? as u64;
        if actual < len {
            return Err(ConvertError::Truncated {
                expected: len,
                actual,
            });
        }

        Ok(Some(payload))
    }

    /// Skip the next segment without buffering it, returning its length.
    ///
    /// Returns `Ok(None)` at a clean end of input.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Truncated`] if the segment is cut short.
    pub fn skip_segment(&mut self) -> Result<Option<u64>, ConvertError> {
        let Some(len) = self.read_length()? else {
            return Ok(None);
        };

        let actual = io::copy(&mut (&mut self.reader).take(len), &mut io::sink())?;
        if actual < len {
            return Err(ConvertError::Truncated {
                expected: len,
                actual,
            });
        }

        Ok(Some(len))
    }

    /// Iterate over the remaining segments.
    pub fn segments(self) -> Segments<R> {
        Segments {
            reader: self,
            done: false,
        }
    }

    /// Unwrap the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn read_length(&mut self) -> Result<Option<u64>, ConvertError> {
        let mut short = [0u8; 4];
        match read_up_to(&mut self.reader, &mut short)? {
            0 => return Ok(None),
            4 => {}
            n => {
                return Err(ConvertError::Truncated {
                    expected: 4,
                    actual: n as u64,
                })
            }
        }

        let short = u32::from_le_bytes(short);
        if short != LENGTH_ESCAPE {
            return Ok(Some(u64::from(short)));
        }

        let mut wide = [0u8; 8];
        let n = read_up_to(&mut self.reader, &mut wide)?;
        if n < wide.len() {
            return Err(ConvertError::Truncated {
                expected: 8,
                actual: n as u64,
            });
        }
        Ok(Some(u64::from_le_bytes(wide)))
    }
}

/// Iterator over container segments. Stops after the first error.
#[derive(Debug)]
pub struct Segments<R> {
    reader: ContainerReader<R>,
    done: bool,
}

impl<R: Read> Iterator for Segments<R> {
    type Item = Result<Vec<u8>, ConvertError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_segment() {
            Ok(Some(segment)) => Some(Ok(segment)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Fill `buf` as far as the input allows, returning the number of bytes read.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ============================================================================
// Writer
// ============================================================================

/// Writes a CatBoost container. Used to build fixtures.
#[derive(Debug)]
pub struct ContainerWriter<W: Write> {
    writer: W,
}

impl<W: Write> ContainerWriter<W> {
    /// Write the magic tag.
    pub fn new(mut writer: W) -> io::Result<Self> {
        writer.write_all(MAGIC)?;
        Ok(Self { writer })
    }

    /// Write a segment, using the 64-bit length form only when required.
    pub fn write_segment(&mut self, payload: &[u8]) -> io::Result<()> {
        match u32::try_from(payload.len()) {
            Ok(len) if len != LENGTH_ESCAPE => {
                self.writer.write_all(&len.to_le_bytes())?;
                self.writer.write_all(payload)
            }
            _ => self.write_wide_segment(payload),
        }
    }

    /// Write a segment with the escaped 64-bit length prefix regardless of size.
    pub fn write_wide_segment(&mut self, payload: &[u8]) -> io::Result<()> {
        self.writer.write_all(&LENGTH_ESCAPE.to_le_bytes())?;
        self.writer.write_all(&(payload.len() as u64).to_le_bytes())?;
        self.writer.write_all(payload)
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

// ============================================================================
// Tests
// ============================================================================
