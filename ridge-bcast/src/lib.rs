//! File-broadcast agent (§4.2): stream a local file to every node of a
//! job allocation in fixed-size, optionally LZ4-compressed blocks
//! through `ridge_net::forward`, bounded by a small thread pool.

mod block;
mod libs;
mod message;
mod recv;
mod send;

pub use block::{build_blocks, CompressedBlock, SourceFile, DEFAULT_BLOCK_SIZE};
pub use libs::{broadcast_with_libs, LddLister, LibraryLister};
pub use message::{CompressKind, FileBcastMsg};
pub use recv::{decode_block, RecvError};
pub use send::{send_file, BcastRequest, BcastSummary, MAX_THREADS};
