// The producer side of file broadcast (spec.md §4.2). One block, one
// forward: each block is its own `REQUEST_FILE_BCAST` tree delivery, and
// the agent will not start the next block until every node in the
// allocation has acknowledged the current one.

use std::path::Path;
use std::time::Duration;

use ridge_base::{err, Result};
use ridge_net::wire::{self, MsgKind};
use ridge_net::{forward, ReplyPayload, Transport};
use tracing::{info, warn};

use crate::block::{build_blocks, SourceFile, DEFAULT_BLOCK_SIZE};
use crate::message::FileBcastMsg;

/// Hard ceiling on concurrent sends regardless of how large the
/// allocation is; blocks are large enough (hundreds of KB to MB) that
/// more concurrency than this buys nothing but memory pressure.
pub const MAX_THREADS: usize = 8;

pub struct BcastRequest<'a> {
    pub source: &'a Path,
    pub dest_path: String,
    pub nodes: &'a [String],
    pub fanout: usize,
    pub block_size: Option<usize>,
    pub compress: bool,
    pub preserve: bool,
    pub force: bool,
    pub credential: Vec<u8>,
    pub start_timeout: Duration,
    pub per_message_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BcastSummary {
    pub uncompressed_total: u64,
    pub compressed_total: u64,
    pub compress_wall_time: Duration,
}

/// Streams one file to every node in `req.nodes`, block by block. Fails
/// closed: the first block with any failed node aborts the whole
/// transfer rather than skipping ahead.
pub fn send_file(transport: &(dyn Transport + Sync), req: &BcastRequest) -> Result<BcastSummary> {
    let source = SourceFile::open(req.source)?;
    let block_size = req.block_size.unwrap_or(DEFAULT_BLOCK_SIZE).min(source.len().max(1));
    let fanout = req.fanout.min(MAX_THREADS).max(1);

    let (blocks, compress_wall_time) = build_blocks(source.bytes(), block_size, req.compress);
    let uncompressed_total = source.len() as u64;
    let mut compressed_total = 0u64;

    for block in &blocks {
        let msg = FileBcastMsg {
            dest_path: req.dest_path.clone(),
            block_no: block.block_no,
            block_len: block.bytes.len() as u32,
            uncomp_len: block.uncomp_len,
            compress: block.compress,
            mode: source.mode,
            uid: source.uid,
            gid: source.gid,
            atime: req.preserve.then_some(source.atime),
            mtime: req.preserve.then_some(source.mtime),
            force: req.force,
            last_block: block.last_block,
            credential: req.credential.clone(),
        };
        compressed_total += block.bytes.len() as u64;

        let body = wire::encode(&(msg, block.bytes.clone()))?;

        let replies = forward(
            transport,
            req.nodes,
            MsgKind::FileBcast,
            &body,
            fanout,
            req.start_timeout,
            req.per_message_timeout,
        );

        let failed: Vec<&str> = replies
            .iter()
            .filter(|r| matches!(r.payload, ReplyPayload::Failed { .. }))
            .map(|r| r.node.as_str())
            .collect();
        if !failed.is_empty() {
            for node in &failed {
                warn!(target: "ridge::bcast", node, block = block.block_no, "block delivery failed");
            }
            return Err(err(format!(
                "file broadcast aborted at block {}: {} node(s) failed ({})",
                block.block_no,
                failed.len(),
                failed.join(",")
            )));
        }
    }

    info!(
        target: "ridge::bcast",
        uncompressed = uncompressed_total,
        compressed = compressed_total,
        blocks = blocks.len(),
        "file broadcast complete"
    );

    Ok(BcastSummary { uncompressed_total, compressed_total, compress_wall_time })
}
