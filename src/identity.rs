//! Reconciliation of the two user-id namespaces.
//!
//! Most sources only know the platform-native ("external") user id. One migrated
//! source carries a locally assigned ("internal") id instead. Aggregation is keyed
//! by the internal id, so every raw reference is funnelled through here first.

use ahash::AHashMap;
use std::collections::BTreeMap;
use unicase::UniCase;

/// A raw user reference as found in a record. At least one id should be set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct UserRef {
    pub internal: Option<u64>,
    pub external: Option<u64>,
}

impl UserRef {
    pub fn external(id: u64) -> Self {
        Self { internal: None, external: Some(id) }
    }
    pub fn internal(id: u64) -> Self {
        Self { internal: Some(id), external: None }
    }
}

/// One row of the users table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity {
    pub internal_id: u64,
    pub external_id: u64,
    pub display_name: Option<String>,
}

/// Outcome of `IdentityReconciler::register`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    Inserted,
    /// Same identity was already present (or only gained its missing name).
    Known,
    /// Conflicting identity for an already registered internal id; discarded.
    Duplicate,
}

#[derive(Default)]
pub struct IdentityReconciler {
    by_internal: BTreeMap<u64, UserIdentity>,
    by_external: AHashMap<u64, u64>,
    by_name: AHashMap<UniCase<String>, u64>,
    duplicates: u64,
}

impl IdentityReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a raw reference to the internal id used for aggregation.
    /// Returns `None` only when the reference carries no id at all.
    ///
    /// A known internal id paired with a different external id is reported as a
    /// duplicate identity; the counts still go to the internal id.
    pub fn resolve(&mut self, user: UserRef) -> Option<u64> {
        match (user.internal, user.external) {
            (Some(internal), external) => {
                match self.by_internal.get(&internal).map(|known| known.external_id) {
                    None => self.insert(UserIdentity {
                        internal_id: internal,
                        external_id: external.unwrap_or(internal),
                        display_name: None,
                    }),
                    Some(known) => {
                        if let Some(ext) = external.filter(|&ext| ext != known) {
                            self.register(UserIdentity { internal_id: internal, external_id: ext, display_name: None });
                        }
                    }
                }
                Some(internal)
            }
            (None, Some(external)) => {
                if let Some(&internal) = self.by_external.get(&external) {
                    return Some(internal);
                }
                let internal = self.allocate(external);
                self.insert(UserIdentity { internal_id: internal, external_id: external, display_name: None });
                Some(internal)
            }
            (None, None) => None,
        }
    }

    /// Register a full identity row. First registration wins; a later row that
    /// disagrees on the external id or the (case-insensitive) name is a duplicate.
    pub fn register(&mut self, identity: UserIdentity) -> Registration {
        let Some(existing) = self.by_internal.get_mut(&identity.internal_id) else {
            self.insert(identity);
            return Registration::Inserted;
        };

        let same_external = existing.external_id == identity.external_id;
        let same_name = match (&existing.display_name, &identity.display_name) {
            (_, None) => true,
            (None, Some(_)) => true,
            (Some(a), Some(b)) => UniCase::new(a.as_str()) == UniCase::new(b.as_str()),
        };

        if same_external && same_name {
            if existing.display_name.is_none() {
                if let Some(name) = identity.display_name {
                    self.by_name.entry(UniCase::new(name.clone())).or_insert(existing.internal_id);
                    existing.display_name = Some(name);
                }
            }
            return Registration::Known;
        }

        self.duplicates += 1;
        tracing::warn!(
            internal_id = identity.internal_id,
            kept_external = existing.external_id,
            kept_name = existing.display_name.as_deref().unwrap_or(""),
            dropped_external = identity.external_id,
            dropped_name = identity.display_name.as_deref().unwrap_or(""),
            "duplicate user identity; keeping the first registration"
        );
        Registration::Duplicate
    }

    /// Register a named user known by its external id (identity dumps).
    pub fn register_external(&mut self, external: u64, name: &str) -> Registration {
        match self.by_external.get(&external).copied() {
            Some(internal) => self.register(UserIdentity {
                internal_id: internal,
                external_id: external,
                display_name: Some(name.to_string()),
            }),
            None => {
                let internal = self.allocate(external);
                self.register(UserIdentity {
                    internal_id: internal,
                    external_id: external,
                    display_name: Some(name.to_string()),
                })
            }
        }
    }

    /// Case-insensitive lookup by display name.
    pub fn find_by_name(&self, name: &str) -> Option<u64> {
        self.by_name.get(&UniCase::new(name.to_string())).copied()
    }

    pub fn get(&self, internal_id: u64) -> Option<&UserIdentity> {
        self.by_internal.get(&internal_id)
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn len(&self) -> usize {
        self.by_internal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_internal.is_empty()
    }

    /// Identities in ascending internal id order.
    pub fn identities(&self) -> impl Iterator<Item = &UserIdentity> {
        self.by_internal.values()
    }

    /// Every `(external_id, internal_id)` resolution, ascending by external id.
    pub fn external_map(&self) -> Vec<(u64, u64)> {
        let mut map: Vec<(u64, u64)> = self.by_external.iter().map(|(&ext, &int)| (ext, int)).collect();
        map.sort_unstable();
        map
    }

    // Prefer internal == external; otherwise take the next id above everything assigned.
    fn allocate(&self, external: u64) -> u64 {
        if !self.by_internal.contains_key(&external) {
            return external;
        }
        self.by_internal.keys().next_back().map_or(0, |max| max.saturating_add(1))
    }

    fn insert(&mut self, identity: UserIdentity) {
        self.by_external.entry(identity.external_id).or_insert(identity.internal_id);
        if let Some(name) = &identity.display_name {
            self.by_name.entry(UniCase::new(name.clone())).or_insert(identity.internal_id);
        }
        self.by_internal.insert(identity.internal_id, identity);
    }
}
