// Block pipeline: mmap the source file, slice it into fixed-size blocks,
// optionally LZ4-compress each one. Grounded on spec.md §4.2 steps 1-3
// and `examples/original_source/trunk/src/sbcast/agent.c`'s block loop,
// which mmaps the whole file once and walks it in `block_size` strides
// rather than re-reading from disk per block.

use std::fs::File;
use std::path::Path;
use std::time::{Duration, Instant};

use memmap2::Mmap;
use ridge_base::{err, Result};

use crate::message::CompressKind;

pub const DEFAULT_BLOCK_SIZE: usize = 512 * 1024;

pub struct CompressedBlock {
    pub block_no: u32,
    pub bytes: Vec<u8>,
    pub uncomp_len: u32,
    pub compress: CompressKind,
    pub last_block: bool,
}

pub struct SourceFile {
    mmap: Mmap,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub mtime: i64,
}

impl SourceFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| err(format!("open {}: {e}", path.display())))?;
        let meta = file.metadata().map_err(|e| err(format!("fstat {}: {e}", path.display())))?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| err(format!("mmap {}: {e}", path.display())))?;
        #[cfg(unix)]
        let (mode, uid, gid, atime, mtime) = {
            use std::os::unix::fs::MetadataExt;
            (meta.mode(), meta.uid(), meta.gid(), meta.atime(), meta.mtime())
        };
        #[cfg(not(unix))]
        let (mode, uid, gid, atime, mtime) = (0o644, 0, 0, 0, 0);
        Ok(SourceFile { mmap, mode, uid, gid, atime, mtime })
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }
}

/// Splits `data` into blocks of at most `block_size` bytes, compressing
/// each one when `want_compress` is set. `block_size` is already clamped
/// to the file size by the caller (spec.md §4.2 step 1: "block size =
/// min(user_block_size or 512 KiB, file_size)").
pub fn build_blocks(data: &[u8], block_size: usize, want_compress: bool) -> (Vec<CompressedBlock>, Duration) {
    if data.is_empty() {
        return (
            vec![CompressedBlock { block_no: 1, bytes: Vec::new(), uncomp_len: 0, compress: CompressKind::None, last_block: true }],
            Duration::ZERO,
        );
    }
    let mut blocks = Vec::new();
    let mut compress_time = Duration::ZERO;
    let total = data.len();
    let mut consumed = 0usize;
    let mut block_no = 1u32;
    while consumed < total {
        let end = (consumed + block_size).min(total);
        let chunk = &data[consumed..end];
        let last_block = end == total;

        let (bytes, compress) = if want_compress {
            let start = Instant::now();
            let compressed = lz4_flex::block::compress(chunk);
            compress_time += start.elapsed();
            if compressed.len() < chunk.len() {
                (compressed, CompressKind::Lz4)
            } else {
                (chunk.to_vec(), CompressKind::None)
            }
        } else {
            (chunk.to_vec(), CompressKind::None)
        };

        blocks.push(CompressedBlock {
            block_no,
            uncomp_len: chunk.len() as u32,
            bytes,
            compress,
            last_block,
        });
        consumed = end;
        block_no += 1;
    }
    (blocks, compress_time)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splits_into_expected_block_count() {
        let data = vec![7u8; 2500];
        let (blocks, _) = build_blocks(&data, 1000, false);
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0..2].iter().all(|b| !b.last_block));
        assert!(blocks[2].last_block);
        assert_eq!(blocks.iter().map(|b| b.uncomp_len as usize).sum::<usize>(), data.len());
    }

    #[test]
    fn empty_file_produces_single_last_block() {
        let (blocks, _) = build_blocks(&[], 1000, false);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].last_block);
        assert_eq!(blocks[0].uncomp_len, 0);
    }

    #[test]
    fn compression_shrinks_repetitive_data() {
        let data = vec![7u8; 4096];
        let (blocks, _) = build_blocks(&data, 8192, true);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].compress, CompressKind::Lz4);
        assert!(blocks[0].bytes.len() < data.len());
    }
}
