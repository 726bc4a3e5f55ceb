// Heterogeneous job leader/component linkage (spec.md §9). A component
// job points to its leader by id; the leader itself is the job whose id
// equals its own `het_job_id` (or one with no `het_job_id` set at all,
// for a plain non-hetjob). Validation tolerates a component whose
// leader vanished (abort just that component) but not a leader whose
// component set is incomplete (abort the whole hetjob).

use std::collections::HashMap;

use ridge_base::JobId;

use crate::errors::HetJobError;
use crate::model::Job;

/// A resolved heterogeneous job: its leader plus every component in
/// offset order, `offset 0` first.
pub struct HetJobGroup<'a> {
    pub leader: &'a Job,
    pub components: Vec<&'a Job>,
}

/// Components that point at a leader id with no corresponding job in
/// `jobs` -- each is aborted individually rather than failing the whole
/// table walk.
pub struct OrphanedComponent {
    pub job_id: JobId,
    pub missing_leader: JobId,
}

/// Groups every hetjob in `jobs` by leader, validating that each
/// leader's declared component count (`expected_components`, keyed by
/// leader job id) is fully present. A leader missing any component
/// returns `HetJobError::IncompleteComponentSet` for that leader's
/// whole group; the caller is expected to abort every job in it.
pub fn resolve_het_groups<'a>(
    jobs: &'a [Job],
    expected_components: &HashMap<JobId, u32>,
) -> (Vec<HetJobGroup<'a>>, Vec<OrphanedComponent>, Vec<(JobId, HetJobError)>) {
    let by_id: HashMap<JobId, &Job> = jobs.iter().map(|j| (j.id, j)).collect();

    let mut components_by_leader: HashMap<JobId, Vec<&Job>> = HashMap::new();
    let mut orphaned = Vec::new();

    for job in jobs {
        let Some(leader_id) = job.het_job_id else { continue };
        if leader_id == job.id {
            // The leader is its own group's anchor; ensure an entry exists
            // even if it ends up with zero components found.
            components_by_leader.entry(leader_id).or_default();
            continue;
        }
        if !by_id.contains_key(&leader_id) {
            orphaned.push(OrphanedComponent { job_id: job.id, missing_leader: leader_id });
            continue;
        }
        components_by_leader.entry(leader_id).or_default().push(job);
    }

    let mut groups = Vec::new();
    let mut incomplete = Vec::new();

    for (leader_id, mut components) in components_by_leader {
        let Some(&leader) = by_id.get(&leader_id) else {
            // The "leader" entry was only seeded by a component pointing
            // at it; if the leader job itself doesn't exist every one of
            // its components is orphaned too, already recorded above.
            continue;
        };
        components.sort_by_key(|c| c.het_job_offset.unwrap_or(0));

        if let Some(&expected) = expected_components.get(&leader_id) {
            if components.len() as u32 != expected {
                incomplete.push((leader_id, HetJobError::IncompleteComponentSet));
                continue;
            }
        }
        groups.push(HetJobGroup { leader, components });
    }

    (groups, orphaned, incomplete)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{JobResources, JobState};
    use std::cell::Cell;

    fn job(id: u32, het_job_id: Option<u32>, offset: Option<u32>) -> Job {
        Job {
            id: JobId(id),
            uid: 0,
            gid: 0,
            array_task_id: None,
            het_job_id: het_job_id.map(JobId),
            het_job_offset: offset,
            state: JobState::Running,
            partition: "default".to_string(),
            nodes: Vec::new(),
            job_resources: JobResources::default(),
            cpus_used: HashMap::new(),
            memory_used_mb: HashMap::new(),
            core_bitmap_used: HashMap::new(),
            steps: Vec::new(),
            next_step_id: Cell::new(0),
            next_step_node_inx: Cell::new(0),
            end_time: 0,
            start_time: 0,
            tot_suspend_time: 0,
        }
    }

    #[test]
    fn complete_component_set_resolves_into_one_group() {
        let jobs = vec![job(1, Some(1), Some(0)), job(2, Some(1), Some(1)), job(3, Some(1), Some(2))];
        let mut expected = HashMap::new();
        expected.insert(JobId(1), 2);
        let (groups, orphaned, incomplete) = resolve_het_groups(&jobs, &expected);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].components.len(), 2);
        assert_eq!(groups[0].components[0].id, JobId(2));
        assert!(orphaned.is_empty());
        assert!(incomplete.is_empty());
    }

    #[test]
    fn component_with_missing_leader_is_orphaned_not_fatal() {
        let jobs = vec![job(5, Some(99), Some(0))];
        let (groups, orphaned, incomplete) = resolve_het_groups(&jobs, &HashMap::new());
        assert!(groups.is_empty());
        assert_eq!(orphaned.len(), 1);
        assert_eq!(orphaned[0].job_id, JobId(5));
        assert!(incomplete.is_empty());
    }

    #[test]
    fn incomplete_component_set_aborts_whole_group() {
        let jobs = vec![job(1, Some(1), Some(0)), job(2, Some(1), Some(1))];
        let mut expected = HashMap::new();
        expected.insert(JobId(1), 3);
        let (groups, _orphaned, incomplete) = resolve_het_groups(&jobs, &expected);
        assert!(groups.is_empty());
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].0, JobId(1));
    }
}
