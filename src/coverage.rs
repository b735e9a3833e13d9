//! The sighash-coverage language and its interpreter.
//!
//! A coverage array is a sequence of 3-byte ops, each naming a transaction
//! component to absorb into the signing digest.  Ops are applied in array
//! order; the digest therefore commits to the selection and its order.
//! Before any op runs, every input of the current script group is absorbed
//! unconditionally, binding the signature to the outpoints being spent.

use crate::digest::{Digest, StreamSource, DIGEST_SIZE};
use crate::host::{
    checked_load_cell_by_field, checked_load_input_by_field, CellField, HostVm, InputField,
    Source, SysError,
};
use crate::molecule::{OutPoint, Script};
use crate::{Error, INPUT_BUFFER_SIZE, SCRIPT_BUFFER_SIZE};

/// Absorb the 32-byte transaction hash.
pub const LABEL_SIGHASH_ALL: u8 = 0x0;
/// Absorb fields of the output cell at `index`.
pub const LABEL_OUTPUT: u8 = 0x1;
/// Absorb fields of the cell behind input `index`.
pub const LABEL_INPUT_CELL: u8 = 0x2;
/// Like [`LABEL_INPUT_CELL`], then absorb the input's `since`.
pub const LABEL_INPUT_CELL_SINCE: u8 = 0x3;
/// Absorb fields of input `index`'s outpoint.
pub const LABEL_INPUT_OUTPOINT: u8 = 0x4;
/// Terminates the coverage array.
pub const LABEL_END_OF_LIST: u8 = 0xF;

pub const MASK_CELL_CAPACITY: u8 = 0x01;
pub const MASK_CELL_TYPE_CODE_HASH: u8 = 0x02;
pub const MASK_CELL_TYPE_ARGS: u8 = 0x04;
pub const MASK_CELL_TYPE_HASH_TYPE: u8 = 0x08;
pub const MASK_CELL_LOCK_CODE_HASH: u8 = 0x10;
pub const MASK_CELL_LOCK_ARGS: u8 = 0x20;
pub const MASK_CELL_LOCK_HASH_TYPE: u8 = 0x40;
pub const MASK_CELL_DATA: u8 = 0x80;

pub const MASK_OUTPOINT_TX_HASH: u8 = 0x01;
pub const MASK_OUTPOINT_INDEX: u8 = 0x02;
pub const MASK_OUTPOINT_SINCE: u8 = 0x04;

/// Fast path: absorb the object's full wire serialization instead of
/// per-field segments.  Not equivalent to the union of all field bits.
pub const MASK_ALL: u8 = 0xFF;

const MASK_CELL_ANY_TYPE: u8 =
    MASK_CELL_TYPE_CODE_HASH | MASK_CELL_TYPE_ARGS | MASK_CELL_TYPE_HASH_TYPE;
const MASK_CELL_ANY_LOCK: u8 =
    MASK_CELL_LOCK_CODE_HASH | MASK_CELL_LOCK_ARGS | MASK_CELL_LOCK_HASH_TYPE;

/// Script sub-field selector bits shared by the type and lock mask groups.
/// The lock group is the type group shifted left by 3.
const SELECT_CODE_HASH: u8 = 0b001;
const SELECT_ARGS: u8 = 0b010;
const SELECT_HASH_TYPE: u8 = 0b100;

/// Wire width of one coverage op.
pub const COVERAGE_OP_SIZE: usize = 3;

/// One instruction of the coverage array.
///
/// Packed as `[label:4 | index_hi:4] [index_lo:8] [mask:8]`; `index` is a
/// 12-bit unsigned component index.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CoverageOp {
    pub label: u8,
    pub index: u16,
    pub mask: u8,
}

impl CoverageOp {
    pub fn decode(bytes: [u8; COVERAGE_OP_SIZE]) -> Self {
        CoverageOp {
            label: bytes[0] >> 4,
            index: u16::from(bytes[0] & 0x0F) << 8 | u16::from(bytes[1]),
            mask: bytes[2],
        }
    }

    /// Inverse of [`CoverageOp::decode`].  `index` must fit in 12 bits.
    pub fn encode(self) -> [u8; COVERAGE_OP_SIZE] {
        debug_assert!(self.index < 0x1000);
        [
            self.label << 4 | (self.index >> 8) as u8,
            (self.index & 0xFF) as u8,
            self.mask,
        ]
    }
}

/// Absorbs every input of the current script group, in group order.
///
/// Runs before the coverage array and cannot be opted out of.
pub(crate) fn hash_group_inputs<H: HostVm>(host: &H, digest: &mut Digest) -> Result<(), Error> {
    let mut index = 0;
    loop {
        match digest.absorb_object(host, StreamSource::Input, index, Source::GroupInput) {
            Ok(()) => index += 1,
            Err(SysError::IndexOutOfBound) => return Ok(()),
            Err(err) => return Err(err.into()),
        }
    }
}

/// Interprets the coverage array at the head of `lock_bytes`, driving
/// `digest` as a side effect.
///
/// Returns the number of bytes consumed, terminator included.  Truncated
/// ops and unknown labels fail with [`Error::InvalidLabel`]; reserved mask
/// bits are ignored.
pub(crate) fn process_coverage<H: HostVm>(
    host: &H,
    digest: &mut Digest,
    lock_bytes: &[u8],
) -> Result<usize, Error> {
    let mut consumed = 0;
    loop {
        if consumed + COVERAGE_OP_SIZE > lock_bytes.len() {
            return Err(Error::InvalidLabel);
        }
        let op = CoverageOp::decode([
            lock_bytes[consumed],
            lock_bytes[consumed + 1],
            lock_bytes[consumed + 2],
        ]);
        consumed += COVERAGE_OP_SIZE;
        match op.label {
            LABEL_SIGHASH_ALL => absorb_tx_hash(host, digest)?,
            LABEL_OUTPUT | LABEL_INPUT_CELL | LABEL_INPUT_CELL_SINCE => {
                absorb_cell(host, digest, op)?
            }
            LABEL_INPUT_OUTPOINT => absorb_out_point(host, digest, op)?,
            LABEL_END_OF_LIST => return Ok(consumed),
            _ => return Err(Error::InvalidLabel),
        }
    }
}

fn absorb_tx_hash<H: HostVm>(host: &H, digest: &mut Digest) -> Result<(), Error> {
    let mut tx_hash = [0u8; DIGEST_SIZE];
    let len = host.load_tx_hash(&mut tx_hash, 0)?;
    if len != DIGEST_SIZE {
        return Err(Error::Syscall);
    }
    digest.absorb(&tx_hash);
    Ok(())
}

fn absorb_cell<H: HostVm>(host: &H, digest: &mut Digest, op: CoverageOp) -> Result<(), Error> {
    let source = if op.label == LABEL_OUTPUT {
        Source::Output
    } else {
        Source::Input
    };
    let index = op.index as usize;
    if op.mask == MASK_ALL {
        digest.absorb_object(host, StreamSource::Cell, index, source)?;
        digest.absorb_object(host, StreamSource::CellData, index, source)?;
    } else {
        if op.mask & MASK_CELL_CAPACITY != 0 {
            let mut capacity = [0u8; 8];
            checked_load_cell_by_field(host, &mut capacity, index, source, CellField::Capacity)?;
            digest.absorb(&capacity);
        }
        if op.mask & MASK_CELL_ANY_TYPE != 0 {
            absorb_script_fields(host, digest, index, source, CellField::Type, op.mask >> 1)?;
        }
        if op.mask & MASK_CELL_ANY_LOCK != 0 {
            absorb_script_fields(host, digest, index, source, CellField::Lock, op.mask >> 4)?;
        }
        if op.mask & MASK_CELL_DATA != 0 {
            digest.absorb_object(host, StreamSource::CellData, index, source)?;
        }
    }
    if op.label == LABEL_INPUT_CELL_SINCE {
        let mut since = [0u8; 8];
        checked_load_input_by_field(host, &mut since, index, source, InputField::Since)?;
        digest.absorb(&since);
    }
    Ok(())
}

/// Loads one of the cell's scripts and absorbs the sub-fields named by the
/// low three bits of `selector`, in declaration order.
fn absorb_script_fields<H: HostVm>(
    host: &H,
    digest: &mut Digest,
    index: usize,
    source: Source,
    field: CellField,
    selector: u8,
) -> Result<(), Error> {
    let mut buf = [0u8; SCRIPT_BUFFER_SIZE];
    let len = checked_load_cell_by_field(host, &mut buf, index, source, field)?;
    let script = Script::verify(&buf[..len]).map_err(|_| Error::Encoding)?;
    if selector & SELECT_CODE_HASH != 0 {
        digest.absorb(script.code_hash());
    }
    if selector & SELECT_ARGS != 0 {
        digest.absorb(script.args());
    }
    if selector & SELECT_HASH_TYPE != 0 {
        digest.absorb(script.hash_type());
    }
    Ok(())
}

fn absorb_out_point<H: HostVm>(
    host: &H,
    digest: &mut Digest,
    op: CoverageOp,
) -> Result<(), Error> {
    let index = op.index as usize;
    if op.mask == MASK_ALL {
        digest.absorb_object(host, StreamSource::Input, index, Source::Input)?;
        return Ok(());
    }
    if op.mask & MASK_OUTPOINT_SINCE != 0 {
        let mut since = [0u8; 8];
        checked_load_input_by_field(host, &mut since, index, Source::Input, InputField::Since)?;
        digest.absorb(&since);
    }
    let mut buf = [0u8; INPUT_BUFFER_SIZE];
    let len =
        checked_load_input_by_field(host, &mut buf, index, Source::Input, InputField::OutPoint)?;
    let out_point = OutPoint::verify(&buf[..len]).map_err(|_| Error::Encoding)?;
    if op.mask & MASK_OUTPOINT_TX_HASH != 0 {
        digest.absorb(out_point.tx_hash());
    }
    if op.mask & MASK_OUTPOINT_INDEX != 0 {
        digest.absorb(out_point.index());
    }
    Ok(())
}
