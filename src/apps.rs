//! Application groupings and snapshot reconciliation.
//!
//! [`Applications`] is the unit of registry state: a mapping from application
//! name to [`Application`], itself a mapping from instance id to
//! [`InstanceInfo`]. A whole `Applications` value is what the cache publishes
//! atomically after each successful fetch.
//!
//! # Reconciliation
//!
//! Two independently-held snapshots are compared cheaply via the
//! [reconcile hash code](Applications::reconcile_hash_code): a digest of
//! instance counts per status, e.g. `"STARTING_1_UP_12_"`. Equal content
//! always produces an equal hash; a collision across distinct content is
//! tolerated because the hash only gates a diagnostic full resync, never a
//! safety property. When hashes disagree, [`Applications::reconcile_diff`]
//! produces the per-instance discrepancies for operators.
//!
//! # Delta merge
//!
//! [`Applications::with_delta_applied`] builds a **new** merged value instead
//! of mutating in place, so the cache can publish it with a single atomic
//! pointer swap and readers always see a fully-merged snapshot.

use crate::instance::{ActionType, InstanceInfo, InstanceStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A named grouping of instances, keyed by instance id.
///
/// Invariant: every contained instance's `app_name` equals this
/// application's `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ApplicationWire", into = "ApplicationWire")]
pub struct Application {
    name: String,
    instances: HashMap<String, InstanceInfo>,
}

/// Wire form: instances as a list, the way registry responses carry them.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationWire {
    name: String,
    #[serde(default)]
    instances: Vec<InstanceInfo>,
}

impl From<ApplicationWire> for Application {
    fn from(wire: ApplicationWire) -> Self {
        let mut app = Application::new(wire.name);
        for instance in wire.instances {
            app.add_instance(instance);
        }
        app
    }
}

impl From<Application> for ApplicationWire {
    fn from(app: Application) -> Self {
        let mut instances: Vec<InstanceInfo> = app.instances.into_values().collect();
        instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        ApplicationWire {
            name: app.name,
            instances,
        }
    }
}

impl Application {
    /// Create an empty application.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instances: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Upsert an instance. The instance's `app_name` is normalized to this
    /// application's name to preserve the containment invariant.
    pub fn add_instance(&mut self, mut instance: InstanceInfo) {
        instance.app_name = self.name.clone();
        self.instances.insert(instance.instance_id.clone(), instance);
    }

    /// Remove an instance by id. Removing an absent id is a no-op.
    pub fn remove_instance(&mut self, instance_id: &str) -> Option<InstanceInfo> {
        self.instances.remove(instance_id)
    }

    pub fn get_by_instance_id(&self, instance_id: &str) -> Option<&InstanceInfo> {
        self.instances.get(instance_id)
    }

    pub fn instances(&self) -> impl Iterator<Item = &InstanceInfo> {
        self.instances.values()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// A complete registry snapshot: all applications known to a peer.
///
/// Delta responses additionally carry [`apps_hash_code`](Self::apps_hash_code),
/// the hash the server computed over its own full registry at delta time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ApplicationsWire", into = "ApplicationsWire")]
pub struct Applications {
    apps_hash_code: Option<String>,
    applications: HashMap<String, Application>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationsWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    apps_hash_code: Option<String>,
    #[serde(default)]
    applications: Vec<Application>,
}

impl From<ApplicationsWire> for Applications {
    fn from(wire: ApplicationsWire) -> Self {
        let mut apps = Applications::new();
        apps.apps_hash_code = wire.apps_hash_code;
        for app in wire.applications {
            apps.add_application(app);
        }
        apps
    }
}

impl From<Applications> for ApplicationsWire {
    fn from(apps: Applications) -> Self {
        let mut applications: Vec<Application> = apps.applications.into_values().collect();
        applications.sort_by(|a, b| a.name.cmp(&b.name));
        ApplicationsWire {
            apps_hash_code: apps.apps_hash_code,
            applications,
        }
    }
}

impl Applications {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The hash code the server declared for this payload, if any.
    pub fn apps_hash_code(&self) -> Option<&str> {
        self.apps_hash_code.as_deref()
    }

    /// Set the declared hash code (used when constructing test payloads).
    pub fn set_apps_hash_code(&mut self, hash: impl Into<String>) {
        self.apps_hash_code = Some(hash.into());
    }

    /// Upsert an application wholesale.
    pub fn add_application(&mut self, app: Application) {
        self.applications.insert(app.name().to_string(), app);
    }

    pub fn get_application(&self, name: &str) -> Option<&Application> {
        self.applications.get(name)
    }

    pub fn registered_applications(&self) -> impl Iterator<Item = &Application> {
        self.applications.values()
    }

    /// Number of registered applications (including empty ones).
    pub fn app_count(&self) -> usize {
        self.applications.len()
    }

    /// Total instances across all applications.
    pub fn total_instance_count(&self) -> usize {
        self.applications.values().map(Application::len).sum()
    }

    /// Deterministic digest over instance counts per status.
    ///
    /// Renders `"{STATUS}_{count}_"` segments in status-name order, e.g.
    /// `"DOWN_2_UP_12_"`. Order-independent: equal contents produce equal
    /// hashes regardless of insertion order. An empty snapshot hashes to
    /// the empty string.
    pub fn reconcile_hash_code(&self) -> String {
        let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        for app in self.applications.values() {
            for instance in app.instances() {
                *counts.entry(instance.status.as_str()).or_insert(0) += 1;
            }
        }
        let mut hash = String::new();
        for (status, count) in counts {
            hash.push_str(status);
            hash.push('_');
            hash.push_str(&count.to_string());
            hash.push('_');
        }
        hash
    }

    /// Per-application discrepancies between this snapshot and `other`.
    ///
    /// For every application present in either snapshot, lists instance ids
    /// that are missing on one side or whose statuses disagree. Empty when
    /// the snapshots have identical `(app, instance, status)` contents.
    /// Diagnostic only; the strings are meant for operator logs.
    pub fn reconcile_diff(&self, other: &Applications) -> BTreeMap<String, Vec<String>> {
        let mut diff: BTreeMap<String, Vec<String>> = BTreeMap::new();

        let mut app_names: Vec<&str> = self.applications.keys().map(String::as_str).collect();
        for name in other.applications.keys() {
            if !self.applications.contains_key(name) {
                app_names.push(name);
            }
        }
        app_names.sort_unstable();

        for name in app_names {
            let local = self.applications.get(name);
            let remote = other.applications.get(name);
            let mut entries = Vec::new();

            let mut ids: Vec<&str> = Vec::new();
            if let Some(app) = local {
                ids.extend(app.instances.keys().map(String::as_str));
            }
            if let Some(app) = remote {
                for id in app.instances.keys() {
                    if local.map_or(true, |a| !a.instances.contains_key(id)) {
                        ids.push(id);
                    }
                }
            }
            ids.sort_unstable();

            for id in ids {
                let local_status = local.and_then(|a| a.get_by_instance_id(id)).map(|i| i.status);
                let remote_status = remote.and_then(|a| a.get_by_instance_id(id)).map(|i| i.status);
                match (local_status, remote_status) {
                    (Some(l), Some(r)) if l == r => {}
                    (Some(l), Some(r)) => {
                        entries.push(format!("{}: status local={} remote={}", id, l, r));
                    }
                    (Some(l), None) => {
                        entries.push(format!("{}: present locally ({}), missing remotely", id, l));
                    }
                    (None, Some(r)) => {
                        entries.push(format!("{}: missing locally, present remotely ({})", id, r));
                    }
                    (None, None) => {}
                }
            }

            if !entries.is_empty() {
                diff.insert(name.to_string(), entries);
            }
        }
        diff
    }

    /// Merge a delta payload into this snapshot, returning the merged result
    /// as a new value. `self` is untouched, so the caller can publish the
    /// result with one atomic swap.
    ///
    /// Merge rules per instance action tag:
    /// - `Added` / `Modified` (or no tag): upsert the application if absent,
    ///   then upsert the instance.
    /// - `Deleted`: remove the instance if present; removing from an absent
    ///   application or an absent instance is a no-op.
    ///
    /// The merge is idempotent: applying the same delta twice yields the
    /// same result as applying it once.
    pub fn with_delta_applied(&self, delta: &Applications) -> Applications {
        let mut merged = self.clone();
        merged.apps_hash_code = None;
        let mut delta_count = 0usize;

        for app in delta.applications.values() {
            for instance in app.instances() {
                delta_count += 1;
                match instance.action_type.unwrap_or(ActionType::Modified) {
                    ActionType::Added | ActionType::Modified => {
                        let target = merged
                            .applications
                            .entry(app.name().to_string())
                            .or_insert_with(|| Application::new(app.name()));
                        let mut instance = instance.clone();
                        instance.action_type = None;
                        target.add_instance(instance);
                    }
                    ActionType::Deleted => {
                        if let Some(target) = merged.applications.get_mut(app.name()) {
                            target.remove_instance(&instance.instance_id);
                        }
                    }
                }
            }
        }

        tracing::debug!(delta_count, "Merged delta into registry snapshot");
        merged
    }

    /// Build a snapshot from a list of instances, grouping by app name.
    pub fn from_instances(instances: impl IntoIterator<Item = InstanceInfo>) -> Applications {
        let mut apps = Applications::new();
        for instance in instances {
            let app = apps
                .applications
                .entry(instance.app_name.clone())
                .or_insert_with(|| Application::new(instance.app_name.clone()));
            app.add_instance(instance);
        }
        apps
    }

    /// All instances with the given id, across applications.
    pub fn instances_by_id(&self, instance_id: &str) -> Vec<&InstanceInfo> {
        self.applications
            .values()
            .filter_map(|app| app.get_by_instance_id(instance_id))
            .collect()
    }

    /// Count instances currently in the given status.
    pub fn count_with_status(&self, status: InstanceStatus) -> usize {
        self.applications
            .values()
            .flat_map(|app| app.instances())
            .filter(|i| i.status == status)
            .count()
    }
}
