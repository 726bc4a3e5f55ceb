// Credential issuance (spec.md §4.4). The core only packages the
// argument structure; signing is an external collaborator, same shape
// as `ridge-bcast::libs::LibraryLister` and `ridge-step::gres::GresAdvisor`.

use ridge_base::{Bitmap, NodeIdx, Rle, StepId};
use serde::{Deserialize, Serialize};

use crate::model::{Job, Step};

/// The unsigned body a `CredentialSigner` turns into an opaque blob.
/// Per-node memory and cpu allocations are carried run-length encoded
/// (one run per distinct value), since most clusters are homogeneous
/// enough that this collapses to one or two runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CredentialArgs {
    pub step_id: StepId,
    pub job_id: ridge_base::JobId,
    pub mem_alloc_mb: Rle<u64>,
    pub cpu_alloc: Rle<u32>,
    /// The step's core bitmap, node-by-node, in the job's node order.
    pub core_bitmap: Vec<Bitmap>,
    pub gres: Vec<String>,
    pub node_list: Vec<NodeIdx>,
    pub expiration: i64,
}

pub trait CredentialSigner {
    fn sign(&self, args: &CredentialArgs) -> ridge_base::Result<Vec<u8>>;
}

/// Builds the unsigned credential body for `step` on `job`. Node order
/// in `mem_alloc_mb`/`cpu_alloc`/`core_bitmap` follows `step.layout`.
pub fn build_credential_args(job: &Job, step: &Step) -> CredentialArgs {
    let mem_values: Vec<u64> = step.layout.iter().map(|l| step.mem_per_node_mb.get(&l.node).copied().unwrap_or(0)).collect();
    let cpu_values: Vec<u32> = step.layout.iter().map(|l| l.num_tasks * l.cpus_per_task).collect();
    let core_bitmap: Vec<Bitmap> = step.layout.iter().map(|l| step.core_bitmap_job.get(&l.node).cloned().unwrap_or_else(|| Bitmap::new(0))).collect();
    let node_list: Vec<NodeIdx> = step.layout.iter().map(|l| l.node).collect();

    CredentialArgs {
        step_id: step.step_id,
        job_id: job.id,
        mem_alloc_mb: Rle::build(&mem_values),
        cpu_alloc: Rle::build(&cpu_values),
        core_bitmap,
        gres: step.gres.clone(),
        node_list,
        expiration: job.end_time,
    }
}

/// Packages and signs a step's credential, per §4.4. Returns the opaque
/// signed blob to embed in `Step::credential` and in
/// `RESPONSE_JOB_STEP_CREATE`.
pub fn issue_credential(job: &Job, step: &Step, signer: &dyn CredentialSigner) -> ridge_base::Result<Vec<u8>> {
    let args = build_credential_args(job, step);
    signer.sign(&args)
}
