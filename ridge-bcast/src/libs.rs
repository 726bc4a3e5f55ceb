// The `--send-libs` extension (spec.md §4.2 "Shared-object broadcast
// extension"). Grounded on
// `examples/original_source/trunk/src/sbcast/agent.c`, which shells out
// to `ldd` on the source binary and parses `=> /path/to/lib.so` lines
// out of its stdout. Kept behind a trait so tests never have to spawn a
// real subprocess.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use ridge_base::{err, Result};
use ridge_net::Transport;
use tracing::warn;

use crate::send::{send_file, BcastRequest, BcastSummary};

pub trait LibraryLister {
    fn list_libraries(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Shells out to `ldd`, the same collaborator the original agent uses.
pub struct LddLister;

impl LibraryLister for LddLister {
    fn list_libraries(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let output = Command::new("ldd")
            .arg(path)
            .output()
            .map_err(|e| err(format!("spawn ldd: {e}")))?;
        if !output.status.success() {
            return Err(err(format!("ldd {} exited with {}", path.display(), output.status)));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_ldd_output(&stdout))
    }
}

fn parse_ldd_output(stdout: &str) -> Vec<PathBuf> {
    stdout
        .lines()
        .filter_map(|line| line.split("=>").nth(1))
        .map(str::trim)
        .filter_map(|rest| rest.split_whitespace().next())
        .filter(|p| p.starts_with('/'))
        .map(PathBuf::from)
        .collect()
}

/// Runs `lister` against `req.source`, then recursively broadcasts every
/// resolved library not under `exclude` to a cache directory on every
/// node in `req.nodes`. One failure aborts the whole batch; order across
/// libraries is unspecified.
pub fn broadcast_with_libs(
    transport: &(dyn Transport + Sync),
    lister: &dyn LibraryLister,
    req: &BcastRequest,
    cache_dir: &str,
    exclude: &[PathBuf],
) -> Result<Vec<BcastSummary>> {
    let mut summaries = vec![send_file(transport, req)?];

    let libraries = lister.list_libraries(req.source)?;
    let excluded: HashSet<&Path> = exclude.iter().map(PathBuf::as_path).collect();

    for lib in &libraries {
        if excluded.iter().any(|e| lib.starts_with(e)) {
            continue;
        }
        let file_name = lib.file_name().and_then(|n| n.to_str()).ok_or_else(|| err(format!("library path has no file name: {}", lib.display())))?;
        let dest_path = format!("{}/{}", cache_dir.trim_end_matches('/'), file_name);

        let lib_req = BcastRequest {
            source: lib,
            dest_path,
            nodes: req.nodes,
            fanout: req.fanout,
            block_size: req.block_size,
            compress: req.compress,
            preserve: req.preserve,
            force: req.force,
            credential: req.credential.clone(),
            start_timeout: req.start_timeout,
            per_message_timeout: req.per_message_timeout,
        };
        match send_file(transport, &lib_req) {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                warn!(target: "ridge::bcast", library = %lib.display(), error = %format!("{e:?}"), "library broadcast aborted batch");
                return Err(e);
            }
        }
    }

    Ok(summaries)
}
