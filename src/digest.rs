//! Streaming BLAKE2b absorption.
//!
//! One [`Digest`] session spans an entire verification run: initialized
//! once, finalized exactly once.  [`Digest::absorb_object`] streams host
//! objects through the session in fixed windows so arbitrarily large cells
//! and inputs never need a full-size buffer.

use blake2b_simd::{Params, State};

use crate::host::{HostVm, Source, SysError};

/// Output width of the message digest.
pub const DIGEST_SIZE: usize = 32;

/// Leading bytes of a BLAKE2b-256 kept for pubkey hashes.
pub const BLAKE160_SIZE: usize = 20;

/// Window size for batched object absorption.
pub(crate) const BATCH_SIZE: usize = 16384;

/// The host chain's hash personalization.
const PERSONALIZATION: &[u8; 16] = b"ckb-default-hash";

/// Which host object a batched absorption streams.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum StreamSource {
    Cell,
    CellData,
    Input,
}

/// A BLAKE2b-256 absorbing session.
pub struct Digest {
    state: State,
}

impl Digest {
    pub fn new() -> Self {
        Digest {
            state: Params::new()
                .hash_length(DIGEST_SIZE)
                .personal(PERSONALIZATION)
                .to_state(),
        }
    }

    /// Appends bytes to the session.
    pub fn absorb(&mut self, bytes: &[u8]) {
        self.state.update(bytes);
    }

    /// Consumes the session and produces the 32-byte digest.
    pub fn finalize(self) -> [u8; DIGEST_SIZE] {
        let mut out = [0u8; DIGEST_SIZE];
        out.copy_from_slice(self.state.finalize().as_bytes());
        out
    }

    /// Absorbs a host object in [`BATCH_SIZE`] windows.
    ///
    /// The first window fixes the object's full length; subsequent reads
    /// are positioned at the running offset until that length is consumed.
    /// Loader errors are returned verbatim.
    pub(crate) fn absorb_object<H: HostVm>(
        &mut self,
        host: &H,
        object: StreamSource,
        index: usize,
        source: Source,
    ) -> Result<(), SysError> {
        let mut buf = [0u8; BATCH_SIZE];
        let len = load(host, object, &mut buf, 0, index, source)?;
        let mut offset = len.min(BATCH_SIZE);
        self.absorb(&buf[..offset]);
        while offset < len {
            let remaining = load(host, object, &mut buf, offset, index, source)?;
            let read = remaining.min(BATCH_SIZE);
            self.absorb(&buf[..read]);
            offset += read;
        }
        Ok(())
    }
}

impl Default for Digest {
    fn default() -> Self {
        Digest::new()
    }
}

fn load<H: HostVm>(
    host: &H,
    object: StreamSource,
    buf: &mut [u8],
    offset: usize,
    index: usize,
    source: Source,
) -> Result<usize, SysError> {
    match object {
        StreamSource::Cell => host.load_cell(buf, offset, index, source),
        StreamSource::CellData => host.load_cell_data(buf, offset, index, source),
        StreamSource::Input => host.load_input(buf, offset, index, source),
    }
}

/// BLAKE2b-256 of `data`, truncated to its leading 20 bytes.
pub fn blake160(data: &[u8]) -> [u8; BLAKE160_SIZE] {
    let mut digest = Digest::new();
    digest.absorb(data);
    let full = digest.finalize();
    let mut out = [0u8; BLAKE160_SIZE];
    out.copy_from_slice(&full[..BLAKE160_SIZE]);
    out
}
