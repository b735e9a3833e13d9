#![cfg_attr(not(feature = "std"), no_std)]
//! Open-transaction signature lock.
//!
//! A lock script for a cell-based UTXO chain that authorizes spending with
//! a recoverable secp256k1 ECDSA signature over a *caller-selected* digest
//! of transaction components.  The witness carries a sighash coverage
//! array naming the pieces the signer commits to; anything left uncovered
//! may be extended by other parties without invalidating the signature.
//! The script argument is the BLAKE2b-160 of the signer's compressed
//! public key.
//!
//! Verification is a single pass:
//!
//! 1. load the group's first witness and extract its lock bytes,
//! 2. absorb every input of the current script group (not optional),
//! 3. interpret the coverage array, absorbing the selected components,
//! 4. absorb the group's witnesses with the signature zeroed out of the
//!    first, then the witnesses beyond the transaction's input count,
//! 5. recover the public key over the final digest and compare its
//!    BLAKE2b-160 against the script argument.
//!
//! There is no heap allocation: working storage is fixed stack buffers,
//! and a [`HostVm`] trait stands in for the transaction VM's read
//! syscalls so the same core runs against in-memory hosts.

use core::fmt;

#[cfg(feature = "std")]
use std::sync::OnceLock;

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1, VerifyOnly};

mod coverage;
mod digest;
mod host;
mod molecule;

pub use coverage::{
    CoverageOp, COVERAGE_OP_SIZE, LABEL_END_OF_LIST, LABEL_INPUT_CELL, LABEL_INPUT_CELL_SINCE,
    LABEL_INPUT_OUTPOINT, LABEL_OUTPUT, LABEL_SIGHASH_ALL, MASK_ALL, MASK_CELL_CAPACITY,
    MASK_CELL_DATA, MASK_CELL_LOCK_ARGS, MASK_CELL_LOCK_CODE_HASH, MASK_CELL_LOCK_HASH_TYPE,
    MASK_CELL_TYPE_ARGS, MASK_CELL_TYPE_CODE_HASH, MASK_CELL_TYPE_HASH_TYPE, MASK_OUTPOINT_INDEX,
    MASK_OUTPOINT_SINCE, MASK_OUTPOINT_TX_HASH,
};
pub use digest::{blake160, Digest, BLAKE160_SIZE, DIGEST_SIZE};
pub use host::{CellField, HostVm, InputField, Source, SysError};

/// Fixed buffer for witnesses.
pub const WITNESS_BUFFER_SIZE: usize = 32768;
/// Fixed buffer for serialized scripts.
pub const SCRIPT_BUFFER_SIZE: usize = 32768;
/// Fixed buffer for single serialized inputs.
pub const INPUT_BUFFER_SIZE: usize = 4096;
/// Compact ECDSA signature plus one recovery byte.
pub const SIGNATURE_SIZE: usize = 65;

const RECID_INDEX: usize = 64;

/// Verification failure.
///
/// [`Error::exit_code`] maps each failure onto the stable on-chain exit
/// status; host errors keep their own code.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// Lock bytes too short, trailing bytes after the signature, or script
    /// args not 20 bytes.
    ArgumentsLen,
    /// A consumed structure failed schema verification, or the witness
    /// carries no lock field.
    Encoding,
    /// The host returned an unexpected result for a mandatory load.
    Syscall,
    /// Public key recovery failed.
    SecpRecoverPubkey,
    /// Reserved for signature verification failures.
    SecpVerification,
    /// Reserved for public key parse failures.
    SecpParsePubkey,
    /// The 65 signature bytes do not parse as a recoverable signature.
    SecpParseSignature,
    /// Reserved; recovered keys currently always serialize.
    SecpSerializePubkey,
    /// The executing script exceeds [`SCRIPT_BUFFER_SIZE`].
    ScriptTooLong,
    /// A witness exceeds [`WITNESS_BUFFER_SIZE`].
    WitnessSize,
    /// The recovered public key does not hash to the script argument.
    PubkeyBlake160Hash,
    /// Unknown coverage label or truncated coverage op.
    InvalidLabel,
    /// Reserved.
    InvalidMask,
    /// Host error code, propagated verbatim.
    Host(i32),
}

impl Error {
    /// The process exit status for this failure.
    pub fn exit_code(self) -> i32 {
        match self {
            Error::ArgumentsLen => -1,
            Error::Encoding => -2,
            Error::Syscall => -3,
            Error::SecpRecoverPubkey => -11,
            Error::SecpVerification => -12,
            Error::SecpParsePubkey => -13,
            Error::SecpParseSignature => -14,
            Error::SecpSerializePubkey => -15,
            Error::ScriptTooLong => -21,
            Error::WitnessSize => -22,
            Error::PubkeyBlake160Hash => -31,
            Error::InvalidLabel => -50,
            Error::InvalidMask => -51,
            Error::Host(code) => code,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            Error::ArgumentsLen => "argument length is invalid",
            Error::Encoding => "schema verification failed",
            Error::Syscall => "host returned an unexpected result",
            Error::SecpRecoverPubkey => "public key recovery failed",
            Error::SecpVerification => "signature verification failed",
            Error::SecpParsePubkey => "public key parsing failed",
            Error::SecpParseSignature => "signature parsing failed",
            Error::SecpSerializePubkey => "public key serialization failed",
            Error::ScriptTooLong => "script exceeds the buffer",
            Error::WitnessSize => "witness exceeds the buffer",
            Error::PubkeyBlake160Hash => "recovered public key hash mismatch",
            Error::InvalidLabel => "invalid coverage label",
            Error::InvalidMask => "invalid coverage mask",
            Error::Host(code) => return write!(f, "host error {code}"),
        };
        f.write_str(description)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<SysError> for Error {
    fn from(err: SysError) -> Self {
        Error::Host(err.code())
    }
}

type VerificationContext = Secp256k1<VerifyOnly>;

#[cfg(feature = "std")]
static SECP256K1: OnceLock<VerificationContext> = OnceLock::new();

fn with_verification_ctx<R>(f: impl FnOnce(&VerificationContext) -> R) -> R {
    #[cfg(feature = "std")]
    {
        f(SECP256K1.get_or_init(Secp256k1::verification_only))
    }
    #[cfg(not(feature = "std"))]
    {
        let ctx = Secp256k1::verification_only();
        f(&ctx)
    }
}

/// Verifies the current script group's spend authorization against `host`.
pub fn verify<H: HostVm>(host: &H) -> Result<(), Error> {
    let mut witness = [0u8; WITNESS_BUFFER_SIZE];
    let witness_len = host
        .load_witness(&mut witness, 0, 0, Source::GroupInput)
        .map_err(|_| Error::Syscall)?;
    if witness_len > WITNESS_BUFFER_SIZE {
        return Err(Error::WitnessSize);
    }

    let witness_args =
        molecule::WitnessArgs::verify(&witness[..witness_len]).map_err(|_| Error::Encoding)?;
    let lock = witness_args.lock_payload().ok_or(Error::Encoding)?;
    // At least one coverage op (the terminator) must precede the signature.
    if lock.len() <= SIGNATURE_SIZE {
        return Err(Error::ArgumentsLen);
    }

    let mut message_digest = Digest::new();
    coverage::hash_group_inputs(host, &mut message_digest)?;
    let coverage_len =
        coverage::process_coverage(host, &mut message_digest, &witness[lock.clone()])?;
    if lock.len() != coverage_len + SIGNATURE_SIZE {
        return Err(Error::ArgumentsLen);
    }

    let signature_start = lock.start + coverage_len;
    let mut signature = [0u8; SIGNATURE_SIZE];
    signature.copy_from_slice(&witness[signature_start..signature_start + SIGNATURE_SIZE]);
    // The signer commits to the witness shape, not the signature bytes.
    witness[signature_start..signature_start + SIGNATURE_SIZE].fill(0);

    message_digest.absorb(&(witness_len as u64).to_le_bytes());
    message_digest.absorb(&witness[..witness_len]);
    absorb_witnesses_from(host, &mut message_digest, 1, Source::GroupInput)?;
    absorb_witnesses_from(
        host,
        &mut message_digest,
        host.inputs_len() as usize,
        Source::Input,
    )?;
    let message = message_digest.finalize();

    let pubkey_hash = recover_pubkey_hash(&signature, &message)?;
    check_lock_args(host, &pubkey_hash)
}

/// Runs the verifier and maps the outcome onto the process exit status.
pub fn run<H: HostVm>(host: &H) -> i32 {
    match verify(host) {
        Ok(()) => 0,
        Err(err) => err.exit_code(),
    }
}

/// Absorbs witnesses `start, start+1, ...` of `source`, each prefixed with
/// its 8-byte little-endian length, until the index range ends.
fn absorb_witnesses_from<H: HostVm>(
    host: &H,
    message_digest: &mut Digest,
    start: usize,
    source: Source,
) -> Result<(), Error> {
    let mut buf = [0u8; WITNESS_BUFFER_SIZE];
    let mut index = start;
    loop {
        let len = match host.load_witness(&mut buf, 0, index, source) {
            Ok(len) => len,
            Err(SysError::IndexOutOfBound) => return Ok(()),
            Err(_) => return Err(Error::Syscall),
        };
        if len > WITNESS_BUFFER_SIZE {
            return Err(Error::WitnessSize);
        }
        message_digest.absorb(&(len as u64).to_le_bytes());
        message_digest.absorb(&buf[..len]);
        index += 1;
    }
}

fn recover_pubkey_hash(
    signature: &[u8; SIGNATURE_SIZE],
    message: &[u8; DIGEST_SIZE],
) -> Result<[u8; BLAKE160_SIZE], Error> {
    let recovery_id = RecoveryId::from_i32(i32::from(signature[RECID_INDEX]))
        .map_err(|_| Error::SecpParseSignature)?;
    let signature = RecoverableSignature::from_compact(&signature[..RECID_INDEX], recovery_id)
        .map_err(|_| Error::SecpParseSignature)?;
    let message = Message::from_digest(*message);
    let pubkey = with_verification_ctx(|ctx| ctx.recover_ecdsa(&message, &signature))
        .map_err(|_| Error::SecpRecoverPubkey)?;
    Ok(blake160(&pubkey.serialize()))
}

fn check_lock_args<H: HostVm>(host: &H, pubkey_hash: &[u8; BLAKE160_SIZE]) -> Result<(), Error> {
    let mut buf = [0u8; SCRIPT_BUFFER_SIZE];
    let len = host.load_script(&mut buf, 0).map_err(|_| Error::Syscall)?;
    if len > SCRIPT_BUFFER_SIZE {
        return Err(Error::ScriptTooLong);
    }
    let script = molecule::Script::verify(&buf[..len]).map_err(|_| Error::Encoding)?;
    let args = script.args_payload();
    if args.len() != BLAKE160_SIZE {
        return Err(Error::ArgumentsLen);
    }
    if args != &pubkey_hash[..] {
        return Err(Error::PubkeyBlake160Hash);
    }
    Ok(())
}
