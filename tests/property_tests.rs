//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for all inputs,
//! helping catch edge cases that unit tests might miss.

use proptest::prelude::*;
use registry_replication::apps::Applications;
use registry_replication::instance::{ActionType, InstanceInfo, InstanceStatus};
use std::collections::BTreeMap;

fn status_strategy() -> impl Strategy<Value = InstanceStatus> {
    prop_oneof![
        Just(InstanceStatus::Starting),
        Just(InstanceStatus::Up),
        Just(InstanceStatus::Down),
        Just(InstanceStatus::OutOfService),
        Just(InstanceStatus::Unknown),
    ]
}

/// Instances spread over a handful of applications, with globally unique ids.
fn instances_strategy(max: usize) -> impl Strategy<Value = Vec<InstanceInfo>> {
    prop::collection::vec((0usize..5, status_strategy()), 0..max).prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (app, status))| {
                InstanceInfo::for_testing(&format!("APP-{app}"), &format!("i-{i}"), status)
            })
            .collect()
    })
}

// =============================================================================
// Reconcile Hash Properties
// =============================================================================

proptest! {
    /// The hash only depends on content, not on insertion order.
    #[test]
    fn reconcile_hash_is_order_independent(instances in instances_strategy(40)) {
        let forward = Applications::from_instances(instances.clone());
        let mut shuffled = instances;
        shuffled.reverse();
        let backward = Applications::from_instances(shuffled);

        prop_assert_eq!(forward.reconcile_hash_code(), backward.reconcile_hash_code());
    }

    /// The hash is exactly the per-status instance counts, status names
    /// sorted, each segment formatted as `STATUS_count_`.
    #[test]
    fn reconcile_hash_matches_status_counts(instances in instances_strategy(40)) {
        let apps = Applications::from_instances(instances.clone());

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for instance in &instances {
            *counts.entry(instance.status.as_str()).or_default() += 1;
        }
        let expected: String = counts
            .iter()
            .map(|(status, count)| format!("{status}_{count}_"))
            .collect();

        prop_assert_eq!(apps.reconcile_hash_code(), expected);
    }

}

/// An empty snapshot hashes to the empty string.
#[test]
fn reconcile_hash_of_empty_is_empty() {
    assert_eq!(Applications::new().reconcile_hash_code(), "");
}

// =============================================================================
// Delta Merge Properties
// =============================================================================

proptest! {
    /// Adds land in the merged snapshot, deletes vanish from it, untouched
    /// base instances survive, and the merge is idempotent and copy-on-write.
    #[test]
    fn delta_merge_applies_adds_and_deletes(
        base in instances_strategy(30),
        add_count in 0usize..10,
        delete_mask in prop::collection::vec(any::<bool>(), 30),
    ) {
        let snapshot = Applications::from_instances(base.clone());

        let mut delta_entries = Vec::new();
        for (i, instance) in base.iter().enumerate() {
            if delete_mask.get(i).copied().unwrap_or(false) {
                delta_entries.push(instance.clone().with_action(ActionType::Deleted));
            }
        }
        for j in 0..add_count {
            delta_entries.push(
                InstanceInfo::for_testing("APP-NEW", &format!("new-{j}"), InstanceStatus::Up)
                    .with_action(ActionType::Added),
            );
        }
        let mut delta = Applications::from_instances(delta_entries);
        delta.set_apps_hash_code("UP_1_");

        let merged = snapshot.with_delta_applied(&delta);

        for j in 0..add_count {
            prop_assert_eq!(merged.instances_by_id(&format!("new-{j}")).len(), 1);
        }
        for (i, instance) in base.iter().enumerate() {
            let deleted = delete_mask.get(i).copied().unwrap_or(false);
            prop_assert_eq!(merged.instances_by_id(&instance.instance_id).is_empty(), deleted);
        }

        // Merged snapshots carry neither the delta's hash nor action tags
        prop_assert!(merged.apps_hash_code().is_none());
        for app in merged.registered_applications() {
            for instance in app.instances() {
                prop_assert!(instance.action_type.is_none());
            }
        }

        // Idempotent: applying the same delta again changes nothing
        let again = merged.with_delta_applied(&delta);
        prop_assert_eq!(&again, &merged);

        // Copy-on-write: the base snapshot is untouched
        prop_assert_eq!(snapshot.total_instance_count(), base.len());
    }

    /// A Modified entry replaces the stored payload wholesale.
    #[test]
    fn delta_merge_modified_replaces_payload(base in instances_strategy(20)) {
        prop_assume!(!base.is_empty());
        let snapshot = Applications::from_instances(base.clone());

        let mut changed = base[0].clone();
        changed.status = InstanceStatus::OutOfService;
        changed.port = 9999;
        let delta =
            Applications::from_instances(vec![changed.clone().with_action(ActionType::Modified)]);

        let merged = snapshot.with_delta_applied(&delta);
        let found = merged.instances_by_id(&changed.instance_id);
        prop_assert_eq!(found.len(), 1);
        prop_assert_eq!(found[0].status, InstanceStatus::OutOfService);
        prop_assert_eq!(found[0].port, 9999);
        prop_assert!(found[0].action_type.is_none());
    }

    /// Entries with no action tag behave as Modified (upsert).
    #[test]
    fn untagged_delta_entry_upserts(base in instances_strategy(20), status in status_strategy()) {
        let snapshot = Applications::from_instances(base);
        let delta = Applications::from_instances(vec![InstanceInfo::for_testing(
            "APP-0", "untagged-1", status,
        )]);

        let merged = snapshot.with_delta_applied(&delta);
        let found = merged.instances_by_id("untagged-1");
        prop_assert_eq!(found.len(), 1);
        prop_assert_eq!(found[0].status, status);
    }

    /// Deleting an instance that was never present is a no-op.
    #[test]
    fn delta_delete_of_absent_instance_is_noop(base in instances_strategy(20)) {
        let snapshot = Applications::from_instances(base.clone());
        let delta = Applications::from_instances(vec![InstanceInfo::for_testing(
            "APP-GHOST",
            "never-registered",
            InstanceStatus::Up,
        )
        .with_action(ActionType::Deleted)]);

        let merged = snapshot.with_delta_applied(&delta);
        prop_assert_eq!(merged.total_instance_count(), base.len());
        prop_assert!(merged.instances_by_id("never-registered").is_empty());
    }

    /// Merging an empty delta yields the same content as the base.
    #[test]
    fn empty_delta_merge_is_identity(base in instances_strategy(30)) {
        let snapshot = Applications::from_instances(base);
        let merged = snapshot.with_delta_applied(&Applications::new());
        prop_assert_eq!(merged, snapshot);
    }
}

// =============================================================================
// Wire Format Properties
// =============================================================================

proptest! {
    /// JSON serialization round-trips the full snapshot.
    #[test]
    fn applications_json_roundtrip(instances in instances_strategy(20)) {
        let mut apps = Applications::from_instances(instances);
        apps.set_apps_hash_code(apps.reconcile_hash_code());

        let json = serde_json::to_string(&apps).unwrap();
        let parsed: Applications = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, apps);
    }
}
