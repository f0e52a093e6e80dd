//! Property-based tests for task enumeration and core pinning

use fplbench::{CoreLayout, ParameterGrid, SeedPolicy, enumerate_tasks, pool_size_for};
use proptest::prelude::*;
use std::collections::HashSet;

proptest! {
    /// Ids are 1..=points*replicates in order, each point repeated `replicates` times
    #[test]
    fn task_ids_are_dense(
        k_values in proptest::collection::vec(0usize..30, 0..10),
        replicates in 0usize..20,
    ) {
        let grid = ParameterGrid::NpModal { k_values: k_values.clone() };
        let tasks = enumerate_tasks(&grid, 12, replicates);

        prop_assert_eq!(tasks.len(), k_values.len() * replicates);
        for (i, task) in tasks.iter().enumerate() {
            prop_assert_eq!(task.id, i as u64 + 1);
            prop_assert_eq!(task.replicate, i % replicates.max(1));
        }
    }

    /// Pinned cores lie in the reserved tail and cycle with period pool_size
    #[test]
    fn pinned_cores_in_reserved_range(total in 1usize..256, fraction in 0.01f64..=1.0, id in any::<u64>()) {
        let pool = pool_size_for(fraction, total);
        prop_assert!(pool >= 1);
        prop_assert!(pool <= total);

        let layout = CoreLayout::new(total, pool);
        let core = layout.core_for(id);
        prop_assert!(core >= total - pool);
        prop_assert!(core < total);
        if let Some(next) = id.checked_add(pool as u64) {
            prop_assert_eq!(layout.core_for(next), core);
        }
    }

    /// Consecutive ids map to pairwise distinct cores within one pool cycle
    #[test]
    fn one_cycle_uses_every_core(total in 1usize..64, start in 0u64..1000) {
        let layout = CoreLayout::new(total, total);
        let cores: HashSet<usize> = (start..start + total as u64).map(|id| layout.core_for(id)).collect();
        prop_assert_eq!(cores.len(), total);
    }

    /// Fixed seeds are stable per instance
    #[test]
    fn fixed_seed_is_stable(base in any::<u64>(), id in any::<u64>()) {
        let policy = SeedPolicy::Fixed(base);
        prop_assert_eq!(policy.seed_for(id), policy.seed_for(id));
    }
}
