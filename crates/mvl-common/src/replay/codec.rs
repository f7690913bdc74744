//! Little-endian primitives for the replay format.
//!
//! Strings and byte arrays are prefixed with a `u32` length. Large blobs go
//! through gzip before they are length-prefixed.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::error::ReplayError;

/// Upper bound on any single length-prefixed field, to reject garbage lengths
/// before allocating.
const MAX_FIELD_LEN: usize = 256 * 1024 * 1024;

pub fn write_u8(w: &mut dyn Write, v: u8) -> Result<(), ReplayError> {
    w.write_all(&[v])?;
    Ok(())
}

pub fn write_i8(w: &mut dyn Write, v: i8) -> Result<(), ReplayError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub fn write_u16_le(w: &mut dyn Write, v: u16) -> Result<(), ReplayError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub fn write_u32_le(w: &mut dyn Write, v: u32) -> Result<(), ReplayError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub fn write_i64_le(w: &mut dyn Write, v: i64) -> Result<(), ReplayError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub fn write_str(w: &mut dyn Write, s: &str) -> Result<(), ReplayError> {
    write_bytes(w, s.as_bytes())
}

pub fn write_bytes(w: &mut dyn Write, b: &[u8]) -> Result<(), ReplayError> {
    write_u32_le(w, b.len() as u32)?;
    w.write_all(b)?;
    Ok(())
}

/// Gzip `b` and write it length-prefixed.
pub fn write_compressed(w: &mut dyn Write, b: &[u8]) -> Result<(), ReplayError> {
    write_bytes(w, &compress(b)?)
}

pub fn read_u8(r: &mut dyn Read) -> Result<u8, ReplayError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn read_i8(r: &mut dyn Read) -> Result<i8, ReplayError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(i8::from_le_bytes(buf))
}

pub fn read_u16_le(r: &mut dyn Read) -> Result<u16, ReplayError> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub fn read_u32_le(r: &mut dyn Read) -> Result<u32, ReplayError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read_i64_le(r: &mut dyn Read) -> Result<i64, ReplayError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

pub fn read_str(r: &mut dyn Read) -> Result<String, ReplayError> {
    let buf = read_bytes(r)?;
    String::from_utf8(buf).map_err(|e| ReplayError::malformed(format!("invalid UTF-8 string: {e}")))
}

pub fn read_bytes(r: &mut dyn Read) -> Result<Vec<u8>, ReplayError> {
    let len = read_u32_le(r)? as usize;
    if len > MAX_FIELD_LEN {
        return Err(ReplayError::malformed(format!("field length {len} too large")));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read a length-prefixed gzip blob and return it decompressed.
pub fn read_compressed(r: &mut dyn Read) -> Result<Vec<u8>, ReplayError> {
    decompress(&read_bytes(r)?)
}

pub fn compress(data: &[u8]) -> Result<Vec<u8>, ReplayError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>, ReplayError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ReplayError::malformed(format!("corrupt compressed block: {e}")))?;
    Ok(out)
}
