use autobuild_core::{BuildInfo, PackageInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything the coordinator mutates under its single lock, mirroring
/// `SPEC_FULL.md` §3's "Coordinator state". `next_id` is tracked here for
/// persistence purposes but is allocated via an independent atomic counter
/// so id assignment never needs the coordinator lock.
#[derive(Debug, Default)]
pub struct CoordinatorState {
    pub currently_building: Option<PackageInfo>,
    pub queue: Vec<PackageInfo>,
    pub finished: Vec<BuildInfo>,
    pub by_id: BTreeMap<u64, usize>,
}

impl CoordinatorState {
    /// `true` iff `basename` collides with the currently building package.
    pub fn is_building(&self, basename: &str) -> bool {
        self.currently_building
            .as_ref()
            .is_some_and(|p| p.matches_stage_file(basename))
    }

    pub fn is_queued(&self, basename: &str) -> bool {
        self.queue.iter().any(|p| p.matches_stage_file(basename))
    }

    pub fn is_awaiting_release(&self, basename: &str) -> bool {
        self.finished
            .iter()
            .any(|b| b.info.matches_stage_file(basename))
    }

    /// Reindex `by_id` from scratch against `finished`. Called after
    /// mutating `finished` in ways that would otherwise invalidate the
    /// cached indices (insertion/removal anywhere but the end).
    pub fn reindex(&mut self) {
        self.by_id.clear();
        for (pos, build) in self.finished.iter().enumerate() {
            for id in build.packages.keys() {
                self.by_id.insert(*id, pos);
            }
        }
    }

    pub fn find_owned(&self, id: u64, uid: u32) -> Option<(usize, u64)> {
        let pos = *self.by_id.get(&id)?;
        let build = self.finished.get(pos)?;
        if build.info.owner_uid == uid && build.packages.contains_key(&id) {
            Some((pos, id))
        } else {
            None
        }
    }
}

/// What gets written to `run/builder.state`: the in-progress package (if
/// any) is folded back to the head of the queue so a restart resumes it
/// from the beginning.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedState {
    pub finished: Vec<BuildInfo>,
    pub queue: Vec<PackageInfo>,
    pub next_id: u64,
}

impl PersistedState {
    pub fn capture(state: &CoordinatorState, next_id: u64) -> Self {
        let mut queue = Vec::with_capacity(state.queue.len() + 1);
        if let Some(building) = &state.currently_building {
            queue.push(building.clone());
        }
        queue.extend(state.queue.iter().cloned());
        Self {
            finished: state.finished.clone(),
            queue,
            next_id,
        }
    }

    pub fn restore_into(self, state: &mut CoordinatorState) -> u64 {
        state.currently_building = None;
        state.queue = self.queue;
        state.finished = self.finished;
        state.reindex();
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autobuild_core::{Compression, DistroBuildInfo, Distribution};
    use std::path::PathBuf;

    fn sample_package(name: &str, uid: u32) -> PackageInfo {
        PackageInfo::from_stage_path(format!("{name}_1.0.tar.gz").into(), uid).unwrap()
    }

    fn sample_distro_info(id: u64) -> DistroBuildInfo {
        DistroBuildInfo {
            id,
            incoming_dir: PathBuf::from("/tmp/incoming"),
            changes_stem: PathBuf::from("demo_1.0_amd64"),
            distribution: Distribution::new("ubuntu", "noble", vec!["amd64".into()]),
            architecture: "amd64".into(),
            changes_files: vec![],
            files: vec![],
            error: None,
            log: String::new(),
            compression: Compression::Gz,
        }
    }

    #[test]
    fn reindex_rebuilds_by_id() {
        let mut state = CoordinatorState::default();
        let mut build = BuildInfo::new(sample_package("demo", 1000), PathBuf::from("/tmp/results"));
        build.packages.insert(7, sample_distro_info(7));
        state.finished.push(build);
        state.reindex();
        assert_eq!(state.by_id.get(&7), Some(&0));
    }

    #[test]
    fn find_owned_rejects_foreign_uid() {
        let mut state = CoordinatorState::default();
        let mut build = BuildInfo::new(sample_package("demo", 1000), PathBuf::from("/tmp/results"));
        build.packages.insert(7, sample_distro_info(7));
        state.finished.push(build);
        state.reindex();
        assert!(state.find_owned(7, 1000).is_some());
        assert!(state.find_owned(7, 9999).is_none());
    }

    #[test]
    fn persisted_state_folds_currently_building_to_queue_head() {
        let mut state = CoordinatorState::default();
        state.currently_building = Some(sample_package("active", 1));
        state.queue.push(sample_package("waiting", 2));
        let persisted = PersistedState::capture(&state, 5);
        assert_eq!(persisted.queue[0].name, "active");
        assert_eq!(persisted.queue[1].name, "waiting");
        assert_eq!(persisted.next_id, 5);
    }
}
