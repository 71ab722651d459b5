//! Offset-based field extraction over an immutable byte buffer.
//!
//! Decoders mix two styles, the same way the wire formats are documented:
//! absolute reads (`read_*_at`, which also move the cursor just past the
//! field) and cursor reads that advance.

use std::io::Read;
use std::net::Ipv4Addr;

use flate2::read::GzDecoder;
use indexmap::IndexMap;
use thiserror::Error;

use super::framer::DecrypterKind;
use super::tea::TeaError;

/// Why a packet could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("read of {wanted} bytes at offset {offset} exceeds buffer of {len} bytes")]
    OutOfBounds {
        offset: usize,
        wanted: usize,
        len: usize,
    },
    #[error("frame of {0} bytes is shorter than the header")]
    FrameTooShort(usize),
    #[error("bad {what} marker: expected {expected:#04x}, found {found:#04x}")]
    BadMarker {
        what: &'static str,
        expected: u8,
        found: u8,
    },
    #[error("unsupported LV number width {0}")]
    UnsupportedNumberWidth(u16),
    #[error("unknown {what}: {value}")]
    UnknownFlag { what: &'static str, value: String },
    #[error("no {0} key available")]
    MissingKey(DecrypterKind),
    #[error("decryption failed: {0}")]
    Decrypt(#[from] TeaError),
    #[error("gzip inflate failed: {0}")]
    Inflate(#[source] std::io::Error),
}

/// A number read with a u16 width prefix (1, 2, 4 or 8 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LvNumber {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
}

impl LvNumber {
    pub fn as_i64(self) -> i64 {
        match self {
            LvNumber::Byte(v) => v.into(),
            LvNumber::Short(v) => v.into(),
            LvNumber::Int(v) => v.into(),
            LvNumber::Long(v) => v,
        }
    }
}

/// Cursor over a packet body.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Move the cursor to an absolute offset. The end of the buffer is a
    /// valid position.
    pub fn goto(&mut self, offset: usize) -> Result<&mut Self, DecodeError> {
        if offset > self.buf.len() {
            return Err(self.out_of_bounds(offset, 0));
        }
        self.pos = offset;
        Ok(self)
    }

    pub fn skip(&mut self, n: usize) -> Result<&mut Self, DecodeError> {
        self.take(n)?;
        Ok(self)
    }

    fn out_of_bounds(&self, offset: usize, wanted: usize) -> DecodeError {
        DecodeError::OutOfBounds {
            offset,
            wanted,
            len: self.buf.len(),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| self.out_of_bounds(self.pos, n))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    // ========================================================================
    // Cursor reads
    // ========================================================================

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.take(n)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        self.take_array()
    }

    /// Everything from the cursor to the end.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.take_array().map(u16::from_be_bytes)
    }

    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        self.take_array().map(i16::from_be_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.take_array().map(u32::from_be_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.take_array().map(i32::from_be_bytes)
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        self.take_array().map(i64::from_be_bytes)
    }

    /// `n` bytes as text; invalid UTF-8 is replaced.
    pub fn read_string(&mut self, n: usize) -> Result<String, DecodeError> {
        Ok(String::from_utf8_lossy(self.take(n)?).into_owned())
    }

    pub fn read_ip(&mut self) -> Result<Ipv4Addr, DecodeError> {
        self.take_array::<4>().map(Ipv4Addr::from)
    }

    /// u16 length, then that many bytes.
    pub fn read_lv_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_u16()?;
        self.take(len.into())
    }

    pub fn read_lv_string(&mut self) -> Result<String, DecodeError> {
        Ok(String::from_utf8_lossy(self.read_lv_bytes()?).into_owned())
    }

    /// u8 length, then that many bytes.
    pub fn read_u8_lv_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_u8()?;
        self.take(len.into())
    }

    pub fn read_lv_number(&mut self) -> Result<LvNumber, DecodeError> {
        match self.read_u16()? {
            1 => Ok(LvNumber::Byte(self.read_u8()? as i8)),
            2 => self.read_i16().map(LvNumber::Short),
            4 => self.read_i32().map(LvNumber::Int),
            8 => self.read_i64().map(LvNumber::Long),
            other => Err(DecodeError::UnsupportedNumberWidth(other)),
        }
    }

    /// Entries of `u8 tag` + LV value until a `0xFF` tag. With
    /// `expecting_eof`, running out of input also ends the map.
    pub fn read_tlv_map(
        &mut self,
        expecting_eof: bool,
    ) -> Result<IndexMap<u8, &'a [u8]>, DecodeError> {
        let mut map = IndexMap::new();
        loop {
            if expecting_eof && self.remaining() == 0 {
                return Ok(map);
            }
            let tag = self.read_u8()?;
            if tag == 0xFF {
                return Ok(map);
            }
            let value = self.read_lv_bytes()?;
            map.insert(tag, value);
        }
    }

    /// Read `n` bytes and gunzip them.
    pub fn read_gzip(&mut self, n: usize) -> Result<Vec<u8>, DecodeError> {
        inflate(self.take(n)?)
    }

    // ========================================================================
    // Absolute reads
    // ========================================================================

    pub fn read_bytes_at(&mut self, offset: usize, n: usize) -> Result<&'a [u8], DecodeError> {
        self.goto(offset)?.take(n)
    }

    pub fn read_u8_at(&mut self, offset: usize) -> Result<u8, DecodeError> {
        self.goto(offset)?.read_u8()
    }

    pub fn read_bool_at(&mut self, offset: usize) -> Result<bool, DecodeError> {
        self.goto(offset)?.read_bool()
    }

    pub fn read_u16_at(&mut self, offset: usize) -> Result<u16, DecodeError> {
        self.goto(offset)?.read_u16()
    }

    pub fn read_i16_at(&mut self, offset: usize) -> Result<i16, DecodeError> {
        self.goto(offset)?.read_i16()
    }

    pub fn read_u32_at(&mut self, offset: usize) -> Result<u32, DecodeError> {
        self.goto(offset)?.read_u32()
    }

    pub fn read_i32_at(&mut self, offset: usize) -> Result<i32, DecodeError> {
        self.goto(offset)?.read_i32()
    }

    pub fn read_string_at(&mut self, offset: usize, n: usize) -> Result<String, DecodeError> {
        self.goto(offset)?.read_string(n)
    }
}

/// Gunzip a whole segment.
pub fn inflate(bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(DecodeError::Inflate)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn test_cursor_and_absolute_reads() {
        let buf = [0x00, 0x01, 0x12, 0x34, 0x56, 0x78, 0xFF, 0xFE];
        let mut r = PacketReader::new(&buf);
        assert_eq!(r.read_u16().unwrap(), 1);
        assert_eq!(r.read_u32().unwrap(), 0x1234_5678);
        assert_eq!(r.read_i16().unwrap(), -2);
        assert_eq!(r.remaining(), 0);

        assert_eq!(r.read_u8_at(2).unwrap(), 0x12);
        assert_eq!(r.position(), 3);
        assert_eq!(r.read_u16().unwrap(), 0x3456);
        assert_eq!(r.read_i32_at(4).unwrap(), 0x5678_FFFEu32 as i32);
    }

    #[test]
    fn test_out_of_bounds() {
        let buf = [1, 2, 3];
        let mut r = PacketReader::new(&buf);
        assert!(matches!(
            r.read_u32(),
            Err(DecodeError::OutOfBounds { offset: 0, wanted: 4, len: 3 })
        ));
        assert!(r.goto(3).is_ok());
        assert!(matches!(r.goto(4), Err(DecodeError::OutOfBounds { .. })));
        assert!(matches!(r.skip(1), Err(DecodeError::OutOfBounds { .. })));
        assert!(matches!(
            r.read_bytes_at(1, 5),
            Err(DecodeError::OutOfBounds { offset: 1, wanted: 5, .. })
        ));
    }

    #[test]
    fn test_lv_fields() {
        let buf = hex::decode("0003616263000200050008000000000000002a0001ff").unwrap();
        let mut r = PacketReader::new(&buf);
        assert_eq!(r.read_lv_string().unwrap(), "abc");
        assert_eq!(r.read_lv_number().unwrap(), LvNumber::Short(5));
        assert_eq!(r.read_lv_number().unwrap().as_i64(), 42);
        assert_eq!(r.read_lv_number().unwrap(), LvNumber::Byte(-1));

        let bad = [0x00, 0x03, 1, 2, 3];
        assert!(matches!(
            PacketReader::new(&bad).read_lv_number(),
            Err(DecodeError::UnsupportedNumberWidth(3))
        ));
    }

    #[test]
    fn test_tlv_map() {
        // 01 -> "hi", 12 -> [00 01], then terminator
        let buf = hex::decode("010002686912000200 01ff07".replace(' ', "")).unwrap();
        let mut r = PacketReader::new(&buf);
        let map = r.read_tlv_map(false).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&0x01], b"hi");
        assert_eq!(map[&0x12], [0x00, 0x01]);
        assert_eq!(r.read_u8().unwrap(), 0x07);

        let open = hex::decode("0100026869").unwrap();
        assert_eq!(PacketReader::new(&open).read_tlv_map(true).unwrap().len(), 1);
        assert!(PacketReader::new(&open).read_tlv_map(false).is_err());
    }

    #[test]
    fn test_ip() {
        let buf = [0x7F, 0x00, 0x00, 0x01];
        assert_eq!(
            PacketReader::new(&buf).read_ip().unwrap(),
            Ipv4Addr::new(127, 0, 0, 1)
        );
    }

    #[test]
    fn test_gzip_segment() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all("群消息".as_bytes()).unwrap();
        let gz = encoder.finish().unwrap();

        let mut buf = vec![0xAA];
        buf.extend_from_slice(&gz);
        let mut r = PacketReader::new(&buf);
        r.skip(1).unwrap();
        assert_eq!(r.read_gzip(gz.len()).unwrap(), "群消息".as_bytes());

        assert!(matches!(inflate(b"not gzip"), Err(DecodeError::Inflate(_))));
    }
}
