//! Byte-range planning for seek + read over ranged GETs
//!
//! A handle tracks a cursor and the whence it was last positioned with. For
//! objects of known size every read resolves to a bounded range clamped to the
//! object. When the size is unknown (the HEAD probe was not allowed), Start and
//! Current reads are requested verbatim and End reads become suffix ranges,
//! leaving the server to judge validity.

use std::fmt;

use objfile_source::{Result, SourceError, Whence};

/// A single HTTP byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// Inclusive `begin..=end`
    Bounded { begin: u64, end: u64 },
    /// The last `n` bytes of the object
    Suffix(u64),
}

impl ByteRange {
    /// Number of bytes the range asks for.
    pub fn len(&self) -> u64 {
        match self {
            ByteRange::Bounded { begin, end } => end - begin + 1,
            ByteRange::Suffix(n) => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteRange::Bounded { begin, end } => write!(f, "bytes={begin}-{end}"),
            ByteRange::Suffix(n) => write!(f, "bytes=-{n}"),
        }
    }
}

/// Range for a read of `len` bytes (`len > 0`) at the given cursor.
pub(crate) fn read_range(
    cursor: i64,
    anchor: Whence,
    known_size: Option<u64>,
    len: usize,
) -> Result<ByteRange> {
    let len = len as u64;

    let Some(size) = known_size else {
        return match anchor {
            Whence::Start | Whence::Current => {
                let begin = u64::try_from(cursor)
                    .map_err(|_| SourceError::InvalidOffset { offset: cursor })?;
                Ok(ByteRange::Bounded {
                    begin,
                    end: begin.saturating_add(len - 1),
                })
            }
            // a non-negative end-relative cursor has nothing left behind it
            Whence::End if cursor >= 0 => Err(SourceError::EndOfStream),
            Whence::End => Ok(ByteRange::Suffix(cursor.unsigned_abs())),
        };
    };

    let begin = match anchor {
        Whence::Start | Whence::Current => cursor,
        Whence::End => (size as i64).saturating_add(cursor).max(0),
    };
    let begin = u64::try_from(begin).map_err(|_| SourceError::InvalidOffset { offset: cursor })?;
    if begin >= size {
        return Err(SourceError::EndOfStream);
    }
    let end = begin.saturating_add(len - 1).min(size - 1);
    Ok(ByteRange::Bounded { begin, end })
}

/// Validate a seek and return the new `(cursor, anchor)` pair.
///
/// End-relative cursors stay relative (`<= 0`). With a known size a Current
/// seek from an end-relative cursor is resolved to an absolute position first.
pub(crate) fn seek_target(
    offset: i64,
    whence: Whence,
    cursor: i64,
    anchor: Whence,
    known_size: Option<u64>,
) -> Result<(i64, Whence)> {
    let invalid = SourceError::InvalidOffset { offset };

    let Some(size) = known_size else {
        return match whence {
            Whence::Start | Whence::End => Ok((offset, whence)),
            Whence::Current => {
                let target = cursor.checked_add(offset).ok_or(invalid)?;
                let anchor = match anchor {
                    Whence::End => Whence::End,
                    Whence::Start | Whence::Current => Whence::Current,
                };
                Ok((target, anchor))
            }
        };
    };

    let size = i64::try_from(size).map_err(|_| invalid.clone())?;
    match whence {
        Whence::Start => {
            if !(0..=size).contains(&offset) {
                return Err(invalid);
            }
            Ok((offset, Whence::Start))
        }
        Whence::Current => {
            let position = match anchor {
                // the cursor may predate the probe and be arbitrary
                Whence::End => size.checked_add(cursor).ok_or(invalid.clone())?,
                Whence::Start | Whence::Current => cursor,
            };
            let target = position.checked_add(offset).ok_or(invalid.clone())?;
            if !(0..=size).contains(&target) {
                return Err(invalid);
            }
            Ok((target, Whence::Current))
        }
        Whence::End => {
            if offset > 0 || offset < -size {
                return Err(invalid);
            }
            Ok((offset, Whence::End))
        }
    }
}
