//! Schema readers for the molecule-encoded structures the lock consumes.
//!
//! Each reader verifies structural validity before any field is extracted.
//! Accessors hand back slices of (or ranges into) the caller's buffer, so
//! nothing is copied and the caller can patch verified regions in place.

use core::ops::Range;

/// Structural violation of the molecule encoding.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EncodingError;

const NUMBER_SIZE: usize = 4;

/// Byte width of a serialized outpoint: 32-byte tx hash plus 4-byte index.
const OUT_POINT_SIZE: usize = 36;

fn uint32_le(data: &[u8], at: usize) -> usize {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]) as usize
}

/// Verifies a table header carrying exactly `N` fields and returns the
/// field ranges in declaration order.
///
/// Table layout: u32 total size, `N` u32 field offsets, field payloads.
/// Offsets must be non-decreasing and stay inside the slice; the total
/// size must equal the slice length.  A different field count is rejected.
fn table_fields<const N: usize>(data: &[u8]) -> Result<[Range<usize>; N], EncodingError> {
    if data.len() < NUMBER_SIZE * 2 {
        return Err(EncodingError);
    }
    let total = uint32_le(data, 0);
    if total != data.len() {
        return Err(EncodingError);
    }
    let first = uint32_le(data, NUMBER_SIZE);
    if first % NUMBER_SIZE != 0 || first < NUMBER_SIZE * 2 || first > total {
        return Err(EncodingError);
    }
    if first / NUMBER_SIZE - 1 != N {
        return Err(EncodingError);
    }
    let mut fields: [Range<usize>; N] = core::array::from_fn(|_| 0..0);
    let mut start = first;
    for (i, field) in fields.iter_mut().enumerate() {
        let end = if i + 1 < N {
            uint32_le(data, NUMBER_SIZE * (i + 2))
        } else {
            total
        };
        if end < start || end > total {
            return Err(EncodingError);
        }
        *field = start..end;
        start = end;
    }
    Ok(fields)
}

/// Verifies a `Bytes` item: u32 byte count followed by exactly that many
/// payload bytes.
fn verify_bytes(data: &[u8]) -> Result<(), EncodingError> {
    if data.len() < NUMBER_SIZE {
        return Err(EncodingError);
    }
    if uint32_le(data, 0) != data.len() - NUMBER_SIZE {
        return Err(EncodingError);
    }
    Ok(())
}

/// Verified `WitnessArgs`: three optional `Bytes` fields (`lock`,
/// `input_type`, `output_type`).
///
/// Only offsets are retained, not a borrow of the buffer, so the caller is
/// free to mutate the verified bytes afterwards.
pub struct WitnessArgs {
    lock: Option<Range<usize>>,
}

impl WitnessArgs {
    pub fn verify(data: &[u8]) -> Result<Self, EncodingError> {
        let fields = table_fields::<3>(data)?;
        for field in &fields {
            if !field.is_empty() {
                verify_bytes(&data[field.clone()])?;
            }
        }
        let lock = &fields[0];
        let lock = if lock.is_empty() {
            None
        } else {
            Some(lock.start + NUMBER_SIZE..lock.end)
        };
        Ok(WitnessArgs { lock })
    }

    /// Payload range of the `lock` field within the verified slice, or
    /// `None` when the option is empty.
    pub fn lock_payload(&self) -> Option<Range<usize>> {
        self.lock.clone()
    }
}

/// Verified `Script`: 32-byte `code_hash`, one-byte `hash_type`, `Bytes`
/// `args`.
pub struct Script<'a> {
    data: &'a [u8],
    fields: [Range<usize>; 3],
}

impl<'a> Script<'a> {
    pub fn verify(data: &'a [u8]) -> Result<Self, EncodingError> {
        let fields = table_fields::<3>(data)?;
        if fields[0].len() != 32 || fields[1].len() != 1 {
            return Err(EncodingError);
        }
        verify_bytes(&data[fields[2].clone()])?;
        Ok(Script { data, fields })
    }

    pub fn code_hash(&self) -> &'a [u8] {
        &self.data[self.fields[0].clone()]
    }

    pub fn hash_type(&self) -> &'a [u8] {
        &self.data[self.fields[1].clone()]
    }

    /// The full serialized `args` field, length header included.  This is
    /// the form committed to by coverage digests.
    pub fn args(&self) -> &'a [u8] {
        &self.data[self.fields[2].clone()]
    }

    /// The raw `args` payload with the length header stripped.
    pub fn args_payload(&self) -> &'a [u8] {
        &self.data[self.fields[2].start + NUMBER_SIZE..self.fields[2].end]
    }
}

/// Verified `OutPoint`: a fixed 36-byte struct.
pub struct OutPoint<'a> {
    data: &'a [u8],
}

impl<'a> OutPoint<'a> {
    pub fn verify(data: &'a [u8]) -> Result<Self, EncodingError> {
        if data.len() != OUT_POINT_SIZE {
            return Err(EncodingError);
        }
        Ok(OutPoint { data })
    }

    pub fn tx_hash(&self) -> &'a [u8] {
        &self.data[..32]
    }

    /// The serialized 4-byte little-endian output index.
    pub fn index(&self) -> &'a [u8] {
        &self.data[32..]
    }
}
