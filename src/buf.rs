//! Framed text records.
//!
//! A record is a big-endian `u16` byte length followed by the text in modified
//! UTF-8: every UTF-16 code unit is encoded on its own, `U+0000` takes two bytes
//! and supplementary characters are written as two three-byte surrogates.

use std::mem::size_of;

use bytes::{Buf, BufMut};

use crate::error::{DfsResult, Error};

/// Largest body a single record can carry.
pub const MAX_RECORD_LEN: usize = u16::MAX as usize;

pub trait TryBuf: Buf {
    fn try_get_len(&mut self) -> DfsResult<usize>;
    fn try_get_utf(&mut self) -> DfsResult<String>;
}

impl<T: Buf> TryBuf for T {
    fn try_get_len(&mut self) -> DfsResult<usize> {
        if self.remaining() < size_of::<u16>() {
            return Err(Error::Framing("truncated length prefix".to_owned()));
        }

        Ok(usize::from(self.get_u16()))
    }

    fn try_get_utf(&mut self) -> DfsResult<String> {
        let len = self.try_get_len()?;
        if self.remaining() < len {
            return Err(Error::Framing(format!(
                "record announces {len} bytes, {} available",
                self.remaining()
            )));
        }

        decode_utf(&self.copy_to_bytes(len))
    }
}

pub trait PutBuf: BufMut {
    fn put_utf(&mut self, text: &str) -> DfsResult<()>;
}

impl<T: BufMut> PutBuf for T {
    fn put_utf(&mut self, text: &str) -> DfsResult<()> {
        let len = encoded_len(text);
        let prefix = u16::try_from(len).map_err(|_| {
            Error::Framing(format!(
                "encoded text is {len} bytes, a record holds at most {MAX_RECORD_LEN}"
            ))
        })?;

        self.put_u16(prefix);
        for unit in text.encode_utf16() {
            match unit {
                0x0001..=0x007F => self.put_u8(unit as u8),
                0x0000 | 0x0080..=0x07FF => {
                    self.put_u8(0xC0 | ((unit >> 6) & 0x1F) as u8);
                    self.put_u8(0x80 | (unit & 0x3F) as u8);
                }
                _ => {
                    self.put_u8(0xE0 | ((unit >> 12) & 0x0F) as u8);
                    self.put_u8(0x80 | ((unit >> 6) & 0x3F) as u8);
                    self.put_u8(0x80 | (unit & 0x3F) as u8);
                }
            }
        }

        Ok(())
    }
}

fn encoded_len(text: &str) -> usize {
    text.encode_utf16()
        .map(|unit| match unit {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            _ => 3,
        })
        .sum()
}

/// Decodes a record body (without its length prefix).
pub fn decode_utf(body: &[u8]) -> DfsResult<String> {
    let malformed = |at: usize| Error::Framing(format!("malformed input around byte {at}"));
    let continuation = |at: usize| -> DfsResult<u16> {
        match body.get(at) {
            Some(&b) if b & 0xC0 == 0x80 => Ok(u16::from(b & 0x3F)),
            _ => Err(malformed(at)),
        }
    };

    let mut units = Vec::with_capacity(body.len());
    let mut pos = 0;
    while pos < body.len() {
        let lead = body[pos];
        match lead >> 4 {
            0..=7 => {
                units.push(u16::from(lead));
                pos += 1;
            }
            12 | 13 => {
                let low = continuation(pos + 1)?;
                units.push((u16::from(lead & 0x1F) << 6) | low);
                pos += 2;
            }
            14 => {
                let mid = continuation(pos + 1)?;
                let low = continuation(pos + 2)?;
                units.push((u16::from(lead & 0x0F) << 12) | (mid << 6) | low);
                pos += 3;
            }
            _ => return Err(malformed(pos)),
        }
    }

    String::from_utf16(&units).map_err(|e| Error::Framing(e.to_string()))
}
