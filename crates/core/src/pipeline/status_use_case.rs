use crate::clustering::cluster_engine::{ClusterEngine, GroupSummary};

/// Snapshot of the persisted run state.
#[derive(Debug)]
pub struct StatusReport {
    /// Ascending by id.
    pub groups: Vec<GroupSummary>,
    pub completed_images: usize,
}

impl StatusReport {
    pub fn total_references(&self) -> usize {
        self.groups
            .iter()
            .filter_map(|g| g.references.as_ref().ok())
            .sum()
    }

    pub fn unreadable_groups(&self) -> usize {
        self.groups.iter().filter(|g| g.references.is_err()).count()
    }
}

pub struct StatusUseCase {
    engine: ClusterEngine,
}

impl StatusUseCase {
    pub fn new(engine: ClusterEngine) -> Self {
        Self { engine }
    }

    pub fn execute(&mut self) -> StatusReport {
        let groups = self.engine.group_summaries();
        let report = StatusReport {
            completed_images: self.engine.completed_images(),
            groups,
        };
        log::debug!(
            "{} groups ({} unreadable), {} completed images",
            report.groups.len(),
            report.unreadable_groups(),
            report.completed_images
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::cluster_engine::testing::{MemoryCheckpoint, MemoryStore};
    use crate::clustering::domain::observation::GroupId;
    use crate::clustering::infrastructure::vote_oracle::VoteOracle;
    use crate::shared::embedding::Embedding;
    use std::path::PathBuf;

    fn e(v: f32) -> Embedding {
        Embedding::new(vec![v, 0.0])
    }

    #[test]
    fn test_lists_groups_in_id_order_with_sizes() {
        let store = MemoryStore::with_groups(vec![(7, vec![e(0.0)]), (2, vec![e(1.0), e(1.1)])]);
        store.mark_corrupt(4);
        let checkpoint = MemoryCheckpoint::default();
        checkpoint
            .state
            .lock()
            .unwrap()
            .completed
            .insert(PathBuf::from("a.jpg"));
        let engine = ClusterEngine::new(
            Box::new(store),
            Box::new(checkpoint),
            Box::new(VoteOracle::default()),
        );

        let report = StatusUseCase::new(engine).execute();

        let ids: Vec<GroupId> = report.groups.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![GroupId(2), GroupId(4), GroupId(7)]);
        assert_eq!(report.groups[0].references.as_ref().ok(), Some(&2));
        assert!(report.groups[1].references.is_err());
        assert_eq!(report.total_references(), 3);
        assert_eq!(report.unreadable_groups(), 1);
        assert_eq!(report.completed_images, 1);
    }

    #[test]
    fn test_empty_state() {
        let engine = ClusterEngine::new(
            Box::new(MemoryStore::default()),
            Box::new(MemoryCheckpoint::default()),
            Box::new(VoteOracle::default()),
        );
        let report = StatusUseCase::new(engine).execute();
        assert!(report.groups.is_empty());
        assert_eq!(report.completed_images, 0);
    }
}
