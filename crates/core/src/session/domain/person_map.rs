use std::collections::BTreeMap;

/// Group name → image URIs. Sorted by group so listings and snapshots
/// serialize deterministically.
pub type PersonMap = BTreeMap<String, Vec<String>>;
