//! Shared test support: molecule writers, an in-memory transaction host,
//! and signing helpers.
//!
//! The digest preimages used to sign are assembled here from the
//! structured mock transaction, not through the verifier's own load path,
//! so agreement between the two is a real check.
#![allow(dead_code)]

use open_transaction::{
    blake160, CellField, CoverageOp, Digest, HostVm, InputField, Source, SysError,
    LABEL_END_OF_LIST, SIGNATURE_SIZE,
};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

const NUMBER_SIZE: usize = 4;

// ---- molecule writers ----

pub fn pack_bytes(payload: &[u8]) -> Vec<u8> {
    let mut out = (payload.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

pub fn pack_table(fields: &[Vec<u8>]) -> Vec<u8> {
    let header = NUMBER_SIZE * (fields.len() + 1);
    let total = header + fields.iter().map(Vec::len).sum::<usize>();
    let mut out = (total as u32).to_le_bytes().to_vec();
    let mut offset = header;
    for field in fields {
        out.extend_from_slice(&(offset as u32).to_le_bytes());
        offset += field.len();
    }
    for field in fields {
        out.extend_from_slice(field);
    }
    out
}

pub fn pack_script(code_hash: [u8; 32], hash_type: u8, args: &[u8]) -> Vec<u8> {
    pack_table(&[code_hash.to_vec(), vec![hash_type], pack_bytes(args)])
}

pub fn pack_out_point(tx_hash: [u8; 32], index: u32) -> Vec<u8> {
    let mut out = tx_hash.to_vec();
    out.extend_from_slice(&index.to_le_bytes());
    out
}

pub fn pack_cell_input(since: u64, out_point: &[u8]) -> Vec<u8> {
    let mut out = since.to_le_bytes().to_vec();
    out.extend_from_slice(out_point);
    out
}

pub fn pack_cell_output(capacity: u64, lock: &[u8], type_script: Option<&[u8]>) -> Vec<u8> {
    pack_table(&[
        capacity.to_le_bytes().to_vec(),
        lock.to_vec(),
        type_script.map(<[u8]>::to_vec).unwrap_or_default(),
    ])
}

pub fn pack_witness_args(
    lock: Option<&[u8]>,
    input_type: Option<&[u8]>,
    output_type: Option<&[u8]>,
) -> Vec<u8> {
    let opt = |field: Option<&[u8]>| field.map(pack_bytes).unwrap_or_default();
    pack_table(&[opt(lock), opt(input_type), opt(output_type)])
}

// ---- mock transaction host ----

#[derive(Clone)]
pub struct MockCell {
    pub capacity: u64,
    pub lock: Vec<u8>,
    pub type_script: Option<Vec<u8>>,
    pub data: Vec<u8>,
}

impl MockCell {
    pub fn simple(capacity: u64, lock: Vec<u8>) -> Self {
        MockCell {
            capacity,
            lock,
            type_script: None,
            data: Vec::new(),
        }
    }

    pub fn serialized(&self) -> Vec<u8> {
        pack_cell_output(self.capacity, &self.lock, self.type_script.as_deref())
    }
}

#[derive(Clone)]
pub struct MockInput {
    pub since: u64,
    pub prev_tx_hash: [u8; 32],
    pub prev_index: u32,
    pub cell: MockCell,
}

impl MockInput {
    pub fn out_point(&self) -> Vec<u8> {
        pack_out_point(self.prev_tx_hash, self.prev_index)
    }

    pub fn serialized(&self) -> Vec<u8> {
        pack_cell_input(self.since, &self.out_point())
    }
}

/// An in-memory transaction serving the verifier's read surface.
///
/// `group` lists the transaction-wide input indices belonging to the
/// currently executing script group; `GroupInput` reads indirect through
/// it for inputs, input cells, and witnesses alike.
pub struct MockTransaction {
    pub tx_hash: [u8; 32],
    pub script: Vec<u8>,
    pub inputs: Vec<MockInput>,
    pub outputs: Vec<MockCell>,
    pub witnesses: Vec<Vec<u8>>,
    pub group: Vec<usize>,
}

impl MockTransaction {
    fn resolve_input(&self, index: usize, source: Source) -> Result<&MockInput, SysError> {
        let tx_index = match source {
            Source::Input => index,
            Source::GroupInput => *self.group.get(index).ok_or(SysError::IndexOutOfBound)?,
            Source::Output => return Err(SysError::IndexOutOfBound),
        };
        self.inputs.get(tx_index).ok_or(SysError::IndexOutOfBound)
    }

    fn resolve_cell(&self, index: usize, source: Source) -> Result<&MockCell, SysError> {
        match source {
            Source::Output => self.outputs.get(index).ok_or(SysError::IndexOutOfBound),
            _ => Ok(&self.resolve_input(index, source)?.cell),
        }
    }

    fn resolve_witness(&self, index: usize, source: Source) -> Result<&Vec<u8>, SysError> {
        let tx_index = match source {
            Source::Input => index,
            Source::GroupInput => *self.group.get(index).ok_or(SysError::IndexOutOfBound)?,
            Source::Output => return Err(SysError::IndexOutOfBound),
        };
        self.witnesses
            .get(tx_index)
            .ok_or(SysError::IndexOutOfBound)
    }
}

/// Partial-loading convention: copy what fits, report the remaining length.
fn read_slice(data: &[u8], buf: &mut [u8], offset: usize) -> Result<usize, SysError> {
    let offset = offset.min(data.len());
    let remaining = data.len() - offset;
    let copied = remaining.min(buf.len());
    buf[..copied].copy_from_slice(&data[offset..offset + copied]);
    Ok(remaining)
}

impl HostVm for MockTransaction {
    fn load_tx_hash(&self, buf: &mut [u8], offset: usize) -> Result<usize, SysError> {
        read_slice(&self.tx_hash, buf, offset)
    }

    fn load_script(&self, buf: &mut [u8], offset: usize) -> Result<usize, SysError> {
        read_slice(&self.script, buf, offset)
    }

    fn load_witness(
        &self,
        buf: &mut [u8],
        offset: usize,
        index: usize,
        source: Source,
    ) -> Result<usize, SysError> {
        read_slice(self.resolve_witness(index, source)?, buf, offset)
    }

    fn load_cell(
        &self,
        buf: &mut [u8],
        offset: usize,
        index: usize,
        source: Source,
    ) -> Result<usize, SysError> {
        read_slice(&self.resolve_cell(index, source)?.serialized(), buf, offset)
    }

    fn load_cell_data(
        &self,
        buf: &mut [u8],
        offset: usize,
        index: usize,
        source: Source,
    ) -> Result<usize, SysError> {
        read_slice(&self.resolve_cell(index, source)?.data, buf, offset)
    }

    fn load_cell_by_field(
        &self,
        buf: &mut [u8],
        offset: usize,
        index: usize,
        source: Source,
        field: CellField,
    ) -> Result<usize, SysError> {
        let cell = self.resolve_cell(index, source)?;
        match field {
            CellField::Capacity => read_slice(&cell.capacity.to_le_bytes(), buf, offset),
            CellField::Lock => read_slice(&cell.lock, buf, offset),
            CellField::Type => {
                let type_script = cell.type_script.as_ref().ok_or(SysError::ItemMissing)?;
                read_slice(type_script, buf, offset)
            }
        }
    }

    fn load_input(
        &self,
        buf: &mut [u8],
        offset: usize,
        index: usize,
        source: Source,
    ) -> Result<usize, SysError> {
        read_slice(&self.resolve_input(index, source)?.serialized(), buf, offset)
    }

    fn load_input_by_field(
        &self,
        buf: &mut [u8],
        offset: usize,
        index: usize,
        source: Source,
        field: InputField,
    ) -> Result<usize, SysError> {
        let input = self.resolve_input(index, source)?;
        match field {
            InputField::Since => read_slice(&input.since.to_le_bytes(), buf, offset),
            InputField::OutPoint => read_slice(&input.out_point(), buf, offset),
        }
    }

    fn inputs_len(&self) -> u64 {
        self.inputs.len() as u64
    }
}

// ---- fixtures ----

/// Code hash of the deployed lock binary; the value itself is arbitrary
/// for the mock host.
const LOCK_CODE_HASH_HEX: &str = "9bd7e06f3ecf4be0f2fcd2188b23f1b9fcc88e5d4b65a8637b17723bbda3cce8";

pub fn lock_code_hash() -> [u8; 32] {
    let bytes = hex::decode(LOCK_CODE_HASH_HEX).expect("code hash hex");
    bytes.try_into().expect("32 bytes")
}

pub fn lock_script(args: &[u8]) -> Vec<u8> {
    pack_script(lock_code_hash(), 1, args)
}

pub fn test_keypair() -> (SecretKey, PublicKey) {
    keypair_from([0xCD; 32])
}

pub fn other_keypair() -> (SecretKey, PublicKey) {
    keypair_from([0x42; 32])
}

fn keypair_from(seed: [u8; 32]) -> (SecretKey, PublicKey) {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&seed).expect("secret key");
    let public = PublicKey::from_secret_key(&secp, &secret);
    (secret, public)
}

pub fn lock_args_for(public: &PublicKey) -> [u8; 20] {
    blake160(&public.serialize())
}

/// One group input locked by `args`, one unrelated output, one witness.
pub fn single_input_tx(args: &[u8]) -> MockTransaction {
    let script = lock_script(args);
    MockTransaction {
        tx_hash: [0x77; 32],
        script: script.clone(),
        inputs: vec![MockInput {
            since: 0,
            prev_tx_hash: [0x11; 32],
            prev_index: 0,
            cell: MockCell::simple(500_0000_0000, script),
        }],
        outputs: vec![MockCell::simple(499_0000_0000, lock_script(&[0x99; 20]))],
        witnesses: vec![Vec::new()],
        group: vec![0],
    }
}

// ---- coverage arrays and signing ----

pub fn op(label: u8, index: u16, mask: u8) -> [u8; 3] {
    CoverageOp { label, index, mask }.encode()
}

/// Concatenates `ops` and appends the terminator.
pub fn coverage(ops: &[[u8; 3]]) -> Vec<u8> {
    let mut out: Vec<u8> = ops.iter().flatten().copied().collect();
    out.extend_from_slice(&op(LABEL_END_OF_LIST, 0, 0));
    out
}

pub fn digest_of(preimage: &[u8]) -> [u8; 32] {
    let mut digest = Digest::new();
    digest.absorb(preimage);
    digest.finalize()
}

pub fn length_prefixed(witness: &[u8]) -> Vec<u8> {
    let mut out = (witness.len() as u64).to_le_bytes().to_vec();
    out.extend_from_slice(witness);
    out
}

pub fn sign_message(secret: &SecretKey, message: [u8; 32]) -> [u8; SIGNATURE_SIZE] {
    let secp = Secp256k1::new();
    let signature = secp.sign_ecdsa_recoverable(&Message::from_digest(message), secret);
    let (recovery_id, compact) = signature.serialize_compact();
    let mut out = [0u8; SIGNATURE_SIZE];
    out[..64].copy_from_slice(&compact);
    out[64] = recovery_id.to_i32() as u8;
    out
}

/// The first witness as hashed by the verifier: lock carries the coverage
/// array and a zeroed signature, length prefix included.
pub fn first_witness_preimage(coverage_bytes: &[u8]) -> Vec<u8> {
    let lock = [coverage_bytes, &[0u8; SIGNATURE_SIZE][..]].concat();
    length_prefixed(&pack_witness_args(Some(&lock), None, None))
}

/// Witness-finalization tail after the first witness: the rest of the
/// group's witnesses, then witnesses beyond the transaction's input count.
pub fn witness_tail_preimage(tx: &MockTransaction) -> Vec<u8> {
    let mut out = Vec::new();
    for &tx_index in tx.group.iter().skip(1) {
        out.extend(length_prefixed(&tx.witnesses[tx_index]));
    }
    for witness in tx.witnesses.iter().skip(tx.inputs.len()) {
        out.extend(length_prefixed(witness));
    }
    out
}

/// Signs `coverage_bytes` over `tx`.  `covered` is the caller-assembled
/// digest contribution of the covered components, spliced between the
/// mandatory group-input prefix and the finalized witnesses.
pub fn sign_coverage(
    tx: &MockTransaction,
    secret: &SecretKey,
    coverage_bytes: &[u8],
    covered: &[u8],
) -> [u8; SIGNATURE_SIZE] {
    let mut preimage = Vec::new();
    for &tx_index in &tx.group {
        preimage.extend(tx.inputs[tx_index].serialized());
    }
    preimage.extend_from_slice(covered);
    preimage.extend(first_witness_preimage(coverage_bytes));
    preimage.extend(witness_tail_preimage(tx));
    sign_message(secret, digest_of(&preimage))
}

/// Places the signed lock bytes in the group's first witness.
pub fn attach_witness(
    tx: &mut MockTransaction,
    coverage_bytes: &[u8],
    signature: &[u8; SIGNATURE_SIZE],
) {
    let lock = [coverage_bytes, &signature[..]].concat();
    tx.witnesses[tx.group[0]] = pack_witness_args(Some(&lock), None, None);
}
