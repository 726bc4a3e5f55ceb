// Symmetric receiver-side decompression (spec.md §4.2 "Decompression").
// Not exercised by a real daemon `main` here (out of scope per spec.md
// §1) but implemented and tested because the original's `file_bcast.c`
// receiver path is the other half of the same wire contract the sender
// builds, and the §8 round-trip property needs both halves to exist.

use ridge_base::{err, Result};
use ridge_net::wire;

use crate::message::{CompressKind, FileBcastMsg};

/// Unwraps one `REQUEST_FILE_BCAST` wire body -- the `(FileBcastMsg,
/// payload)` pair `send_file` encodes -- back into its header and raw
/// (still possibly compressed) payload.
pub fn decode_wire_body(body: &[u8]) -> Result<(FileBcastMsg, Vec<u8>)> {
    wire::decode(body)
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RecvError {
    /// The decoder produced a different length than `uncomp_len`
    /// declared in the header.
    LengthMismatch { expected: u32, actual: u32 },
}

impl std::fmt::Display for RecvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecvError::LengthMismatch { expected, actual } => {
                write!(f, "decompressed length {actual} disagrees with declared uncomp_len {expected}")
            }
        }
    }
}

impl std::error::Error for RecvError {}

/// Decodes one block's payload, switching on `msg.compress`, and checks
/// the result's length against `msg.uncomp_len`.
pub fn decode_block(msg: &FileBcastMsg, payload: &[u8]) -> Result<Vec<u8>> {
    let decoded = match msg.compress {
        CompressKind::None => payload.to_vec(),
        CompressKind::Lz4 => lz4_flex::block::decompress(payload, msg.uncomp_len as usize)
            .map_err(|e| err(format!("lz4 decompress: {e}")))?,
    };
    if decoded.len() as u32 != msg.uncomp_len {
        return Err(RecvError::LengthMismatch { expected: msg.uncomp_len, actual: decoded.len() as u32 }.into());
    }
    Ok(decoded)
}
