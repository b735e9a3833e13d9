//! Host VM adapter.
//!
//! The verifier runs inside a transaction VM that exposes the surrounding
//! transaction through bounded positioned reads.  [`HostVm`] is that read
//! surface as a trait so the identical verification core runs against the
//! production syscall bindings or an in-memory transaction model in tests.

/// Data source selector for bounded reads.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Source {
    /// All inputs of the transaction, in transaction order.
    Input,
    /// All outputs of the transaction, in transaction order.
    Output,
    /// The inputs whose lock script is the currently executing one.
    GroupInput,
}

/// Field selector for [`HostVm::load_cell_by_field`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CellField {
    /// The 8-byte little-endian capacity.
    Capacity,
    /// The serialized type script, absent on plain cells.
    Type,
    /// The serialized lock script.
    Lock,
}

/// Field selector for [`HostVm::load_input_by_field`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InputField {
    /// The 8-byte little-endian maturity constraint.
    Since,
    /// The serialized previous-output reference.
    OutPoint,
}

/// Error reported by the host for a failed read.
///
/// Codes mirror the host's error ABI; [`SysError::code`] is what the
/// process exits with when a host error is propagated verbatim.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SysError {
    /// `index` is past the end of `source`.  Terminates enumeration loops;
    /// fatal everywhere else.
    IndexOutOfBound,
    /// The requested field does not exist on the object, e.g. the type
    /// script of a cell that has none.
    ItemMissing,
    /// A checked read found the object larger than the provided buffer.
    LengthNotEnough,
    /// Any other host failure, code preserved for the exit status.
    Unknown(i32),
}

impl SysError {
    /// The host-level error code.
    pub fn code(self) -> i32 {
        match self {
            SysError::IndexOutOfBound => 1,
            SysError::ItemMissing => 2,
            SysError::LengthNotEnough => 3,
            SysError::Unknown(code) => code,
        }
    }
}

/// Bounded reads over the host's view of the transaction.
///
/// Every load copies `min(buf.len(), object_len - offset)` bytes into `buf`
/// and returns the full remaining length `object_len - offset`.  A reported
/// length larger than the buffer therefore means the object was truncated;
/// callers that cannot tolerate truncation go through the checked helpers.
pub trait HostVm {
    /// The 32-byte hash of the enclosing transaction.
    fn load_tx_hash(&self, buf: &mut [u8], offset: usize) -> Result<usize, SysError>;

    /// The currently executing script, serialized.
    fn load_script(&self, buf: &mut [u8], offset: usize) -> Result<usize, SysError>;

    /// The witness at `index` of `source`.
    fn load_witness(
        &self,
        buf: &mut [u8],
        offset: usize,
        index: usize,
        source: Source,
    ) -> Result<usize, SysError>;

    /// The serialized cell at `index` of `source`.
    fn load_cell(
        &self,
        buf: &mut [u8],
        offset: usize,
        index: usize,
        source: Source,
    ) -> Result<usize, SysError>;

    /// The data carried by the cell at `index` of `source`.
    fn load_cell_data(
        &self,
        buf: &mut [u8],
        offset: usize,
        index: usize,
        source: Source,
    ) -> Result<usize, SysError>;

    /// A single field of the cell at `index` of `source`.
    fn load_cell_by_field(
        &self,
        buf: &mut [u8],
        offset: usize,
        index: usize,
        source: Source,
        field: CellField,
    ) -> Result<usize, SysError>;

    /// The serialized input at `index` of `source`.
    fn load_input(
        &self,
        buf: &mut [u8],
        offset: usize,
        index: usize,
        source: Source,
    ) -> Result<usize, SysError>;

    /// A single field of the input at `index` of `source`.
    fn load_input_by_field(
        &self,
        buf: &mut [u8],
        offset: usize,
        index: usize,
        source: Source,
        field: InputField,
    ) -> Result<usize, SysError>;

    /// Total number of inputs in the transaction.
    fn inputs_len(&self) -> u64;
}

/// Loads a cell field from offset 0, failing if it does not fit in `buf`.
pub(crate) fn checked_load_cell_by_field<H: HostVm>(
    host: &H,
    buf: &mut [u8],
    index: usize,
    source: Source,
    field: CellField,
) -> Result<usize, SysError> {
    let len = host.load_cell_by_field(buf, 0, index, source, field)?;
    if len > buf.len() {
        return Err(SysError::LengthNotEnough);
    }
    Ok(len)
}

/// Loads an input field from offset 0, failing if it does not fit in `buf`.
pub(crate) fn checked_load_input_by_field<H: HostVm>(
    host: &H,
    buf: &mut [u8],
    index: usize,
    source: Source,
    field: InputField,
) -> Result<usize, SysError> {
    let len = host.load_input_by_field(buf, 0, index, source, field)?;
    if len > buf.len() {
        return Err(SysError::LengthNotEnough);
    }
    Ok(len)
}
