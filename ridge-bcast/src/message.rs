// The file_bcast_msg header fixed by spec.md §1/§4.2. The payload bytes
// themselves travel alongside this header as the forward message body;
// they are not a field here because the forwarder (`ridge_net::forward`)
// already takes body bytes separately.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CompressKind {
    None,
    Lz4,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBcastMsg {
    pub dest_path: String,
    /// 1-based, per spec.md §4.2 step 3.
    pub block_no: u32,
    pub block_len: u32,
    pub uncomp_len: u32,
    pub compress: CompressKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: Option<i64>,
    pub mtime: Option<i64>,
    pub force: bool,
    pub last_block: bool,
    pub credential: Vec<u8>,
}
