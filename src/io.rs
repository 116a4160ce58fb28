//! Little-endian scalar read/write primitives.
//!
//! All on-disk numeric fields are little-endian and packed. The helpers here
//! are the only place where bytes are (de)serialized, so every file format in
//! the crate shares the same conventions.

use crate::error::{Result, SmapError};
use std::io::{Read, Write};

/// Refuses to run on big-endian hosts.
///
/// Every persisted file is little-endian; rather than byte-swapping on the
/// fly, big-endian hosts are rejected at startup.
pub fn ensure_little_endian() -> Result<()> {
    if cfg!(target_endian = "big") {
        Err(SmapError::Fatal(
            "smap does not work on big endian systems".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Reads a single byte.
pub fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Reads a little-endian u16.
pub fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Reads a little-endian u32.
pub fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads a little-endian u64.
pub fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Writes a single byte.
pub fn write_u8<W: Write>(writer: &mut W, value: u8) -> Result<()> {
    writer.write_all(&[value])?;
    Ok(())
}

/// Writes a little-endian u32.
pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Writes a little-endian u64.
pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Reads `len` little-endian f32 values.
pub fn read_f32_vec<R: Read>(reader: &mut R, len: usize) -> Result<Vec<f32>> {
    let mut bytes = try_byte_buffer(len, 4)?;
    reader.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Writes a slice of f32 values in little-endian order.
pub fn write_f32_slice<W: Write>(writer: &mut W, values: &[f32]) -> Result<()> {
    for &value in values {
        writer.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

/// Reads `len` little-endian u16 values.
pub fn read_u16_vec<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u16>> {
    let mut bytes = try_byte_buffer(len, 2)?;
    reader.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect())
}

/// Writes a slice of u16 values in little-endian order.
pub fn write_u16_slice<W: Write>(writer: &mut W, values: &[u16]) -> Result<()> {
    for &value in values {
        writer.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

/// Reads `len` little-endian u32 values.
pub fn read_u32_vec<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u32>> {
    let mut bytes = try_byte_buffer(len, 4)?;
    reader.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Writes a slice of u32 values in little-endian order.
pub fn write_u32_slice<W: Write>(writer: &mut W, values: &[u32]) -> Result<()> {
    for &value in values {
        writer.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

/// Allocates a byte buffer, surfacing allocation failure instead of aborting.
fn try_byte_buffer(len: usize, width: usize) -> Result<Vec<u8>> {
    let bytes = len.checked_mul(width).ok_or_else(|| {
        SmapError::ResourceExhausted(format!("buffer of {} x {} bytes overflows", len, width))
    })?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(bytes).map_err(|_| {
        SmapError::ResourceExhausted(format!("failed to allocate {} bytes", bytes))
    })?;
    buf.resize(bytes, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_scalar_roundtrip() {
        let mut buf = Vec::new();
        write_u8(&mut buf, 7).unwrap();
        write_u32(&mut buf, 0xDEAD_BEEF).unwrap();
        write_u64(&mut buf, u64::MAX - 1).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_u8(&mut cursor).unwrap(), 7);
        assert_eq!(read_u32(&mut cursor).unwrap(), 0xDEAD_BEEF);
        assert_eq!(read_u64(&mut cursor).unwrap(), u64::MAX - 1);
    }

    #[test]
    fn test_f32_slice_roundtrip() {
        let values = vec![0.0f32, 1.5, -2.25, f32::MIN_POSITIVE];
        let mut buf = Vec::new();
        write_f32_slice(&mut buf, &values).unwrap();

        let recovered = read_f32_vec(&mut Cursor::new(buf), values.len()).unwrap();
        for (a, b) in values.iter().zip(recovered.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_u16_slice_roundtrip() {
        let values = vec![0u16, 1, 65535, 12345];
        let mut buf = Vec::new();
        write_u16_slice(&mut buf, &values).unwrap();
        assert_eq!(read_u16_vec(&mut Cursor::new(buf), 4).unwrap(), values);
    }

    #[test]
    fn test_short_read_is_an_error() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3]);
        assert!(read_u64(&mut cursor).is_err());
    }

    #[test]
    fn test_little_endian_host() {
        // CI and all supported targets are little-endian.
        assert!(ensure_little_endian().is_ok());
    }
}
