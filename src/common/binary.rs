//! Little-endian field helpers shared by the header, allocation-table and
//! directory codecs.
//!
//! Every on-disk integer in a compound file is little-endian. Reads are
//! bounds-checked and return [`BinaryError`] instead of panicking so that a
//! truncated sector surfaces as a decode error.

use zerocopy::{FromBytes, LE, U16, U32, U64};

/// Binary parsing error type
#[derive(Debug, Clone)]
pub enum BinaryError {
    /// Not enough data to read the requested type
    InsufficientData { expected: usize, available: usize },
    /// Failed to parse the data
    ParseError(String),
}

impl std::fmt::Display for BinaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryError::InsufficientData {
                expected,
                available,
            } => {
                write!(
                    f,
                    "Insufficient data: expected {}, got {}",
                    expected, available
                )
            },
            BinaryError::ParseError(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for BinaryError {}

/// Result type for binary operations
pub type BinaryResult<T> = Result<T, BinaryError>;

#[inline]
fn check_len(data: &[u8], offset: usize, width: usize) -> BinaryResult<()> {
    if offset + width > data.len() {
        return Err(BinaryError::InsufficientData {
            expected: offset + width,
            available: data.len(),
        });
    }
    Ok(())
}

/// Read a little-endian u16 from a byte slice at the given offset.
///
/// # Examples
///
/// ```
/// use poifs::common::binary::read_u16_le;
/// let data = [0x34, 0x12, 0x78, 0x56];
/// assert_eq!(read_u16_le(&data, 0).unwrap(), 0x1234);
/// assert_eq!(read_u16_le(&data, 2).unwrap(), 0x5678);
/// ```
#[inline]
pub fn read_u16_le(data: &[u8], offset: usize) -> BinaryResult<u16> {
    check_len(data, offset, 2)?;
    U16::<LE>::read_from_bytes(&data[offset..offset + 2])
        .map(|v| v.get())
        .map_err(|_| BinaryError::ParseError("Failed to read u16".to_string()))
}

/// Read a little-endian u32 from a byte slice at the given offset.
///
/// # Examples
///
/// ```
/// use poifs::common::binary::read_u32_le;
/// let data = [0x78, 0x56, 0x34, 0x12];
/// assert_eq!(read_u32_le(&data, 0).unwrap(), 0x12345678);
/// ```
#[inline]
pub fn read_u32_le(data: &[u8], offset: usize) -> BinaryResult<u32> {
    check_len(data, offset, 4)?;
    U32::<LE>::read_from_bytes(&data[offset..offset + 4])
        .map(|v| v.get())
        .map_err(|_| BinaryError::ParseError("Failed to read u32".to_string()))
}

/// Read a little-endian u64 from a byte slice at the given offset.
#[inline]
pub fn read_u64_le(data: &[u8], offset: usize) -> BinaryResult<u64> {
    check_len(data, offset, 8)?;
    U64::<LE>::read_from_bytes(&data[offset..offset + 8])
        .map(|v| v.get())
        .map_err(|_| BinaryError::ParseError("Failed to read u64".to_string()))
}

/// Write a little-endian u32 into a byte slice at the given offset.
///
/// # Examples
///
/// ```
/// use poifs::common::binary::{read_u32_le, write_u32_le};
/// let mut data = [0u8; 8];
/// write_u32_le(&mut data, 4, 0xDEADBEEF).unwrap();
/// assert_eq!(read_u32_le(&data, 4).unwrap(), 0xDEADBEEF);
/// ```
#[inline]
pub fn write_u32_le(data: &mut [u8], offset: usize, value: u32) -> BinaryResult<()> {
    check_len(data, offset, 4)?;
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Decode a buffer of little-endian u32 values.
///
/// Trailing bytes that do not form a whole value are ignored. Used for FAT,
/// MiniFAT and DIFAT sectors, which are all flat arrays of sector indices.
pub fn read_u32_array(data: &[u8]) -> Vec<u32> {
    data.chunks_exact(4)
        .map(|chunk| {
            U32::<LE>::read_from_bytes(chunk)
                .map(|v| v.get())
                .unwrap_or(u32::MAX)
        })
        .collect()
}

/// Encode u32 values into `sector_size`-byte blocks, padding the final block
/// with `fill`.
pub fn write_u32_blocks(values: &[u32], sector_size: usize, fill: u32) -> Vec<u8> {
    let per_block = sector_size / 4;
    let blocks = values.len().div_ceil(per_block);
    let mut out = Vec::with_capacity(blocks * sector_size);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    while out.len() < blocks * sector_size {
        out.extend_from_slice(&fill.to_le_bytes());
    }
    out
}
