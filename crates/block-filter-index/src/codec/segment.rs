use std::collections::BTreeMap;

use bytes::Bytes;
use roaring::RoaringBitmap;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::segment::BitmapSegment;

const CODEC_VERSION: u8 = 1;
const HEADER_LEN: usize = 1 + 8 + 8 + 4;
const CHECKSUM_LEN: usize = 4;

/// Layout (big-endian):
/// `version u8 | low u64 | size u64 | key_count u32 |
///  (key_len u16 | key | bitmap_len u32 | roaring bitmap)* | checksum u32`
pub fn encode_segment(segment: &BitmapSegment) -> Result<Bytes> {
    let mut out = Vec::with_capacity(HEADER_LEN + CHECKSUM_LEN + segment.len() * 64);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&segment.low().to_be_bytes());
    out.extend_from_slice(&segment.size().to_be_bytes());
    let key_count = u32::try_from(segment.len())
        .map_err(|_| Error::Backend("segment has too many keys to encode".to_string()))?;
    out.extend_from_slice(&key_count.to_be_bytes());

    let mut payload = Vec::new();
    for (key, bitmap) in segment.iter() {
        let key_len = u16::try_from(key.len())
            .map_err(|_| Error::Backend(format!("segment key too long: {} bytes", key.len())))?;
        out.extend_from_slice(&key_len.to_be_bytes());
        out.extend_from_slice(key.as_bytes());

        payload.clear();
        bitmap
            .serialize_into(&mut payload)
            .map_err(|e| Error::Backend(format!("serialize segment bitmap: {e}")))?;
        let bitmap_len = u32::try_from(payload.len())
            .map_err(|_| Error::Backend("segment bitmap too large".to_string()))?;
        out.extend_from_slice(&bitmap_len.to_be_bytes());
        out.extend_from_slice(&payload);
    }

    let checksum = checksum(&out);
    out.extend_from_slice(&checksum.to_be_bytes());
    Ok(Bytes::from(out))
}

pub fn decode_segment(bytes: &[u8]) -> Result<BitmapSegment> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(Error::Decode("segment too short"));
    }
    if bytes[0] != CODEC_VERSION {
        return Err(Error::Decode("unsupported segment version"));
    }

    let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let expected = u32::from_be_bytes(trailer.try_into().map_err(|_| Error::Decode("checksum"))?);
    if expected != checksum(body) {
        return Err(Error::Decode("segment checksum mismatch"));
    }

    let mut cursor = Cursor::new(&body[1..]);
    let low = cursor.read_u64()?;
    let size = cursor.read_u64()?;
    let key_count = cursor.read_u32()?;

    let mut entries = BTreeMap::new();
    for _ in 0..key_count {
        let key_len = cursor.read_u16()? as usize;
        let key = std::str::from_utf8(cursor.take(key_len)?)
            .map_err(|_| Error::Decode("segment key is not utf-8"))?
            .to_string();
        let bitmap_len = cursor.read_u32()? as usize;
        let bitmap = RoaringBitmap::deserialize_from(cursor.take(bitmap_len)?)
            .map_err(|_| Error::Decode("segment bitmap"))?;
        if bitmap.is_empty() {
            return Err(Error::Decode("segment contains an empty bitmap"));
        }
        if entries.insert(key, bitmap).is_some() {
            return Err(Error::Decode("segment contains a duplicate key"));
        }
    }
    if !cursor.is_empty() {
        return Err(Error::Decode("trailing bytes after segment entries"));
    }

    BitmapSegment::from_parts(low, size, entries)
}

fn checksum(bytes: &[u8]) -> u32 {
    let digest = Sha256::digest(bytes);
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(Error::Decode("segment truncated"));
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes(b.try_into().map_err(|_| Error::Decode("u16"))?))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes(b.try_into().map_err(|_| Error::Decode("u32"))?))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes(b.try_into().map_err(|_| Error::Decode("u64"))?))
    }
}
