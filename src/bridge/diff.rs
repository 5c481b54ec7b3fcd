//! Difference between live and desired bridge configuration.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::schema::{BridgeConfig, TcpEndpoint};

/// Which bridge entity map an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    TcpListener,
    TcpConnector,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::TcpListener => "tcpListener",
            EntityKind::TcpConnector => "tcpConnector",
        }
    }
}

/// Changes for one entity kind. A replaced entity appears in both sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityChanges {
    pub deleted: BTreeSet<String>,
    pub added: BTreeMap<String, TcpEndpoint>,
}

impl EntityChanges {
    pub fn difference(current: &BTreeMap<String, TcpEndpoint>, desired: &BTreeMap<String, TcpEndpoint>) -> Self {
        let mut changes = Self::default();

        for (name, live) in current {
            match desired.get(name) {
                None => {
                    changes.deleted.insert(name.clone());
                }
                Some(wanted) if !live.equivalent(wanted) => {
                    changes.deleted.insert(name.clone());
                    changes.added.insert(name.clone(), wanted.clone());
                }
                Some(_) => {}
            }
        }

        for (name, wanted) in desired {
            if !current.contains_key(name) {
                changes.added.insert(name.clone(), wanted.clone());
            }
        }

        changes
    }

    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.added.is_empty()
    }

    fn apply_to(&self, entities: &mut BTreeMap<String, TcpEndpoint>) {
        for name in &self.deleted {
            entities.remove(name);
        }
        for (name, entity) in &self.added {
            entities.insert(name.clone(), entity.clone());
        }
    }
}

/// One management operation derived from a change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation<'a> {
    Delete { kind: EntityKind, name: &'a str },
    Create { kind: EntityKind, entity: &'a TcpEndpoint },
}

/// Asymmetric difference between a live and a desired [`BridgeConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub tcp_listeners: EntityChanges,
    pub tcp_connectors: EntityChanges,
}

impl ChangeSet {
    pub fn difference(current: &BridgeConfig, desired: &BridgeConfig) -> Self {
        Self {
            tcp_listeners: EntityChanges::difference(&current.tcp_listeners, &desired.tcp_listeners),
            tcp_connectors: EntityChanges::difference(&current.tcp_connectors, &desired.tcp_connectors),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tcp_listeners.is_empty() && self.tcp_connectors.is_empty()
    }

    /// The configuration that results from applying these changes.
    pub fn apply_to(&self, current: &BridgeConfig) -> BridgeConfig {
        let mut next = current.clone();
        self.tcp_listeners.apply_to(&mut next.tcp_listeners);
        self.tcp_connectors.apply_to(&mut next.tcp_connectors);
        next
    }

    /// Operations in the order they must be issued: all deletions, then all
    /// creations, so a replaced name is free before it is recreated.
    pub fn operations(&self) -> Vec<Operation<'_>> {
        let kinds = [
            (EntityKind::TcpListener, &self.tcp_listeners),
            (EntityKind::TcpConnector, &self.tcp_connectors),
        ];

        let deletes = kinds.iter().flat_map(|&(kind, changes)| {
            changes.deleted.iter().map(move |name| Operation::Delete { kind, name })
        });
        let creates = kinds.iter().flat_map(|&(kind, changes)| {
            changes.added.values().map(move |entity| Operation::Create { kind, entity })
        });

        deletes.chain(creates).collect()
    }

    /// `(deleted, added)` counts, for logging.
    pub fn counts(&self) -> (usize, usize) {
        (
            self.tcp_listeners.deleted.len() + self.tcp_connectors.deleted.len(),
            self.tcp_listeners.added.len() + self.tcp_connectors.added.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(name: &str, port: &str) -> TcpEndpoint {
        TcpEndpoint {
            name: name.into(),
            port: port.into(),
            address: format!("{name}-addr"),
            ..Default::default()
        }
    }

    fn bridges(listeners: &[TcpEndpoint], connectors: &[TcpEndpoint]) -> BridgeConfig {
        BridgeConfig {
            tcp_listeners: listeners.iter().map(|e| (e.name.clone(), e.clone())).collect(),
            tcp_connectors: connectors.iter().map(|e| (e.name.clone(), e.clone())).collect(),
        }
    }

    #[test]
    fn create_listener_delete_connector() {
        let current = bridges(&[], &[endpoint("C1", "9090")]);
        let desired = bridges(&[endpoint("L1", "8080")], &[]);

        let changes = ChangeSet::difference(&current, &desired);
        assert_eq!(changes.tcp_listeners.added.keys().collect::<Vec<_>>(), vec!["L1"]);
        assert!(changes.tcp_listeners.deleted.is_empty());
        assert_eq!(changes.tcp_connectors.deleted.iter().collect::<Vec<_>>(), vec!["C1"]);
        assert!(changes.tcp_connectors.added.is_empty());
    }

    #[test]
    fn difference_with_itself_is_empty() {
        let config = bridges(
            &[endpoint("a", "1"), endpoint("b", "2")],
            &[endpoint("c", "3")],
        );
        assert!(ChangeSet::difference(&config, &config).is_empty());
        assert!(ChangeSet::difference(&BridgeConfig::default(), &BridgeConfig::default()).is_empty());
    }

    #[test]
    fn applying_difference_converges() {
        let cases = [
            (bridges(&[], &[]), bridges(&[endpoint("a", "1")], &[endpoint("b", "2")])),
            (bridges(&[endpoint("a", "1")], &[endpoint("b", "2")]), bridges(&[], &[])),
            (
                bridges(&[endpoint("a", "1"), endpoint("keep", "5")], &[endpoint("b", "2")]),
                bridges(&[endpoint("a", "7"), endpoint("keep", "5")], &[endpoint("d", "4")]),
            ),
        ];

        for (current, desired) in cases {
            let changes = ChangeSet::difference(&current, &desired);
            assert_eq!(changes.apply_to(&current), desired);
            assert!(ChangeSet::difference(&changes.apply_to(&current), &desired).is_empty());
        }
    }

    #[test]
    fn changed_attributes_are_replaced() {
        let current = bridges(&[endpoint("db", "5432")], &[]);
        let desired = bridges(&[endpoint("db", "5433")], &[]);

        let changes = ChangeSet::difference(&current, &desired);
        assert!(changes.tcp_listeners.deleted.contains("db"));
        assert_eq!(changes.tcp_listeners.added["db"].port, "5433");
        assert_eq!(changes.counts(), (1, 1));
    }

    #[test]
    fn router_defaults_do_not_cause_churn() {
        let desired = bridges(&[endpoint("db", "5432")], &[]);
        let mut live = desired.clone();
        if let Some(db) = live.tcp_listeners.get_mut("db") {
            db.verify_hostname = Some(true);
            db.site_id = Some(String::new());
        }
        assert!(ChangeSet::difference(&live, &desired).is_empty());
    }

    #[test]
    fn deletions_are_issued_before_creations() {
        let current = bridges(&[endpoint("x", "1")], &[endpoint("y", "1")]);
        let desired = bridges(&[endpoint("x", "2"), endpoint("new", "3")], &[endpoint("y", "2")]);

        let changes = ChangeSet::difference(&current, &desired);
        let ops = changes.operations();
        assert_eq!(ops.len(), 5);

        let first_create = ops
            .iter()
            .position(|op| matches!(op, Operation::Create { .. }))
            .unwrap();
        assert!(ops[..first_create].iter().all(|op| matches!(op, Operation::Delete { .. })));
        assert!(ops[first_create..].iter().all(|op| matches!(op, Operation::Create { .. })));
        assert_eq!(first_create, 2);
    }
}
