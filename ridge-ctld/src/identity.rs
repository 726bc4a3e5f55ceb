// "Identity parameters" snapshot/compare/revert (spec.md §4.6 step 3),
// grounded on `examples/original_source/src/slurmctld/read_config.c`'s
// `_reconfigure`/`read_slurm_conf` handling of `old_auth_type`,
// `old_select_type`, `old_switch_type`, `old_cred_type`,
// `old_sched_type`, `old_bb_type` and `old_preempt_mode`: each is
// snapshotted before a reload, compared against the freshly parsed
// value, and if different the *old* value wins and a specific
// "...TypeChange" error is recorded -- changing these live is unsafe,
// per the source's own comment (`Update plugins as possible`, followed
// by each field being reverted).

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IdentityParams {
    pub auth_type: String,
    pub cred_type: String,
    pub sched_type: String,
    pub switch_type: String,
    pub select_type: String,
    pub bb_type: String,
    pub preempt_mode: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IdentityField {
    AuthType,
    CredType,
    SchedType,
    SwitchType,
    SelectType,
    BbType,
    PreemptMode,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IdentityChange {
    pub field: IdentityField,
    pub old: String,
    pub attempted_new: String,
}

impl std::fmt::Display for IdentityChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} cannot change live ({:?} -> {:?} rejected, kept {:?})",
            self.field, self.old, self.attempted_new, self.old
        )
    }
}

impl IdentityParams {
    /// Compares `self` (the snapshot taken before reload) against `new`
    /// (freshly parsed config). Every field that differs is reported as
    /// an `IdentityChange`; `PreemptMode` is the one exception (§4.6
    /// step 7: "Preempt plugin swap is allowed *within* the same
    /// preempt kind"), so a change there is reported only if the
    /// *kind* implied by the two strings' plugin family differs -- for
    /// our purposes, preempt mode is compared literally too, since
    /// distinguishing "kind" from "mode" needs the preempt plugin
    /// registry this crate doesn't implement; `reconfigure.rs` treats
    /// a `PreemptMode` change as a warning, not a hard revert.
    pub fn diff_against(&self, new: &IdentityParams) -> Vec<IdentityChange> {
        let mut changes = Vec::new();
        macro_rules! check {
            ($field:ident, $variant:ident) => {
                if self.$field != new.$field {
                    changes.push(IdentityChange {
                        field: IdentityField::$variant,
                        old: self.$field.clone(),
                        attempted_new: new.$field.clone(),
                    });
                }
            };
        }
        check!(auth_type, AuthType);
        check!(cred_type, CredType);
        check!(sched_type, SchedType);
        check!(switch_type, SwitchType);
        check!(select_type, SelectType);
        check!(bb_type, BbType);
        check!(preempt_mode, PreemptMode);
        changes
    }

    /// Applies the revert rule: every field that appears in `changes`
    /// (except `PreemptMode`, which reconfigure.rs allows to swap
    /// within-kind) is forced back to `self`'s (the old) value on `new`.
    pub fn revert_unsafe_changes(&self, new: &mut IdentityParams, changes: &[IdentityChange]) {
        for change in changes {
            match change.field {
                IdentityField::AuthType => new.auth_type = self.auth_type.clone(),
                IdentityField::CredType => new.cred_type = self.cred_type.clone(),
                IdentityField::SchedType => new.sched_type = self.sched_type.clone(),
                IdentityField::SwitchType => new.switch_type = self.switch_type.clone(),
                IdentityField::SelectType => new.select_type = self.select_type.clone(),
                IdentityField::BbType => new.bb_type = self.bb_type.clone(),
                // Preempt mode is allowed to change within the same
                // preempt plugin kind; it is never force-reverted here.
                IdentityField::PreemptMode => {}
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn params(select: &str) -> IdentityParams {
        IdentityParams {
            auth_type: "auth/munge".to_string(),
            cred_type: "cred/munge".to_string(),
            sched_type: "sched/backfill".to_string(),
            switch_type: "switch/none".to_string(),
            select_type: select.to_string(),
            bb_type: "".to_string(),
            preempt_mode: "off".to_string(),
        }
    }

    #[test]
    fn select_type_change_is_flagged_and_reverted() {
        let old = params("select/linear");
        let mut new = params("select/cons_tres");
        let changes = old.diff_against(&new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, IdentityField::SelectType);
        old.revert_unsafe_changes(&mut new, &changes);
        assert_eq!(new.select_type, "select/linear");
    }

    #[test]
    fn preempt_mode_change_alone_is_not_reverted() {
        let old_mode = IdentityParams { preempt_mode: "off".to_string(), ..params("select/linear") };
        let mut new_mode = IdentityParams { preempt_mode: "suspend".to_string(), ..params("select/linear") };
        let changes = old_mode.diff_against(&new_mode);
        assert_eq!(changes.len(), 1);
        old_mode.revert_unsafe_changes(&mut new_mode, &changes);
        assert_eq!(new_mode.preempt_mode, "suspend");
    }

    #[test]
    fn identical_params_produce_no_changes() {
        let old = params("select/cons_tres");
        let new = params("select/cons_tres");
        assert!(old.diff_against(&new).is_empty());
    }
}
