#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashSet};

use strata_ast::{Stability, VersionInfo};

use crate::{Constraint, Version, VersionError};

/// A single registered version of a named entity, linked into its
/// replacement chain.
#[derive(Clone, Debug)]
pub struct VersionedEntity<T> {
    pub name: String,
    pub version: Version,
    pub stability: Stability,
    pub node: T,
    pub replaces: Option<Version>,
    pub replaced_by: Option<Version>,
    pub rollback_safe: bool,
}

/// All registered versions of one name plus cached resolution pointers.
#[derive(Clone, Debug)]
pub struct VersionChain<T> {
    /// Canonical key (`major.minor.patch[-pre]`) to entity.
    pub versions: BTreeMap<String, VersionedEntity<T>>,
    pub latest_version: Option<Version>,
    pub latest_stable_version: Option<Version>,
}

impl<T> Default for VersionChain<T> {
    fn default() -> Self {
        Self {
            versions: BTreeMap::new(),
            latest_version: None,
            latest_stable_version: None,
        }
    }
}

impl<T> VersionChain<T> {
    fn new() -> Self {
        Self {
            versions: BTreeMap::new(),
            latest_version: None,
            latest_stable_version: None,
        }
    }

    /// Versions in ascending order.
    pub fn sorted_versions(&self) -> Vec<Version> {
        let mut out: Vec<Version> = self.versions.values().map(|e| e.version.clone()).collect();
        out.sort();
        out
    }
}

/// Per-name chains of versioned entities.
#[derive(Clone, Debug)]
pub struct VersionRegistry<T> {
    chains: BTreeMap<String, VersionChain<T>>,
}

impl<T> Default for VersionRegistry<T> {
    fn default() -> Self {
        Self {
            chains: BTreeMap::new(),
        }
    }
}

impl<T> VersionRegistry<T> {
    pub fn new() -> Self {
        Self {
            chains: BTreeMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.chains.clear();
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }

    pub fn chain(&self, name: &str) -> Option<&VersionChain<T>> {
        self.chains.get(name)
    }

    /// Register one version of `name`. Rejects unparseable version strings;
    /// wires both sides of the `replaces` link when the predecessor is
    /// already present.
    pub fn register(
        &mut self,
        name: &str,
        info: &VersionInfo,
        node: T,
    ) -> Result<&VersionedEntity<T>, VersionError> {
        let version = Version::parse(&info.version)?;
        let replaces = info
            .replaces
            .as_deref()
            .map(Version::parse)
            .transpose()?;

        let chain = self
            .chains
            .entry(name.to_string())
            .or_insert_with(VersionChain::new);

        let key = version.canonical_key();
        let entity = VersionedEntity {
            name: name.to_string(),
            version: version.clone(),
            stability: info.stability,
            node,
            replaces: replaces.clone(),
            replaced_by: None,
            rollback_safe: info.rollback_safe.unwrap_or(false),
        };
        chain.versions.insert(key.clone(), entity);

        if let Some(pred) = replaces {
            if let Some(pred_entity) = chain.versions.get_mut(&pred.canonical_key()) {
                pred_entity.replaced_by = Some(version.clone());
            }
        }
        // An already-registered successor may name this version.
        let successor = chain
            .versions
            .values()
            .find(|e| e.replaces.as_ref() == Some(&version))
            .map(|e| e.version.clone());
        if let Some(succ) = successor {
            if let Some(me) = chain.versions.get_mut(&key) {
                me.replaced_by = Some(succ);
            }
        }

        if chain
            .latest_version
            .as_ref()
            .map_or(true, |latest| version > *latest)
        {
            chain.latest_version = Some(version.clone());
        }
        if info.stability == Stability::Stable
            && chain
                .latest_stable_version
                .as_ref()
                .map_or(true, |latest| version > *latest)
        {
            chain.latest_stable_version = Some(version.clone());
        }

        Ok(&chain.versions[&key])
    }

    pub fn get(&self, name: &str, version: &Version) -> Option<&VersionedEntity<T>> {
        self.chains.get(name)?.versions.get(&version.canonical_key())
    }

    pub fn get_latest(&self, name: &str) -> Option<&VersionedEntity<T>> {
        let chain = self.chains.get(name)?;
        let latest = chain.latest_version.as_ref()?;
        chain.versions.get(&latest.canonical_key())
    }

    pub fn get_latest_stable(&self, name: &str) -> Option<&VersionedEntity<T>> {
        let chain = self.chains.get(name)?;
        let latest = chain.latest_stable_version.as_ref()?;
        chain.versions.get(&latest.canonical_key())
    }

    /// Resolve `constraint` against the chain for `name`; ambiguity resolves
    /// to the highest satisfying version.
    pub fn resolve(&self, name: &str, constraint: &Constraint) -> Option<&VersionedEntity<T>> {
        match constraint {
            Constraint::Latest => self.get_latest(name),
            Constraint::Stable => self.get_latest_stable(name),
            other => {
                let chain = self.chains.get(name)?;
                chain
                    .versions
                    .values()
                    .filter(|e| other.satisfied_by(&e.version))
                    .max_by(|a, b| a.version.cmp(&b.version))
            }
        }
    }

    /// Forward walk along `replaced_by` starting at (and excluding) `from`.
    /// A visited set bounds malformed chains.
    pub fn replacement_chain(&self, name: &str, from: &Version) -> Vec<Version> {
        let Some(chain) = self.chains.get(name) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor = from.clone();
        seen.insert(cursor.canonical_key());
        while let Some(entity) = chain.versions.get(&cursor.canonical_key()) {
            let Some(next) = entity.replaced_by.clone() else {
                break;
            };
            if !seen.insert(next.canonical_key()) {
                break;
            }
            out.push(next.clone());
            cursor = next;
        }
        out
    }

    /// Backward walk along `replaces` starting at (and excluding) `from`.
    pub fn predecessor_chain(&self, name: &str, from: &Version) -> Vec<Version> {
        let Some(chain) = self.chains.get(name) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor = from.clone();
        seen.insert(cursor.canonical_key());
        while let Some(entity) = chain.versions.get(&cursor.canonical_key()) {
            let Some(prev) = entity.replaces.clone() else {
                break;
            };
            if !seen.insert(prev.canonical_key()) {
                break;
            }
            out.push(prev.clone());
            cursor = prev;
        }
        out
    }

    /// True when `to` is reachable from `from` along replacement links.
    pub fn has_migration_path(&self, name: &str, from: &Version, to: &Version) -> bool {
        self.replacement_chain(name, from).contains(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(version: &str) -> VersionInfo {
        VersionInfo {
            version: version.to_string(),
            ..VersionInfo::default()
        }
    }

    fn info_replacing(version: &str, replaces: &str) -> VersionInfo {
        VersionInfo {
            version: version.to_string(),
            replaces: Some(replaces.to_string()),
            ..VersionInfo::default()
        }
    }

    #[test]
    fn register_and_resolve_latest() {
        let mut reg: VersionRegistry<u32> = VersionRegistry::new();
        reg.register("calc", &info("1.0.0"), 1).unwrap();
        reg.register("calc", &info("1.2.0"), 2).unwrap();
        reg.register("calc", &info("1.1.0"), 3).unwrap();

        let latest = reg.get_latest("calc").unwrap();
        assert_eq!(latest.version, Version::parse("1.2.0").unwrap());
        assert_eq!(latest.node, 2);
    }

    #[test]
    fn latest_stable_skips_prereleases_and_unstable() {
        let mut reg: VersionRegistry<u32> = VersionRegistry::new();
        reg.register("calc", &info("1.0.0"), 1).unwrap();
        let beta = VersionInfo {
            version: "2.0.0-beta".to_string(),
            stability: Stability::Beta,
            ..VersionInfo::default()
        };
        reg.register("calc", &beta, 2).unwrap();

        assert_eq!(
            reg.get_latest("calc").unwrap().version,
            Version::parse("2.0.0-beta").unwrap()
        );
        assert_eq!(
            reg.get_latest_stable("calc").unwrap().version,
            Version::parse("1.0.0").unwrap()
        );
    }

    #[test]
    fn constraint_resolution_picks_highest_match() {
        let mut reg: VersionRegistry<u32> = VersionRegistry::new();
        for (v, n) in [("1.0.0", 1), ("1.5.0", 2), ("2.0.0", 3)] {
            reg.register("calc", &info(v), n).unwrap();
        }
        let c = Constraint::parse("^1.0.0").unwrap();
        assert_eq!(reg.resolve("calc", &c).unwrap().node, 2);
        assert!(reg.resolve("calc", &Constraint::parse("^3.0.0").unwrap()).is_none());
    }

    #[test]
    fn replacement_links_are_bidirectional() {
        let mut reg: VersionRegistry<u32> = VersionRegistry::new();
        reg.register("calc", &info("1.0.0"), 1).unwrap();
        reg.register("calc", &info_replacing("2.0.0", "1.0.0"), 2)
            .unwrap();

        let v1 = Version::parse("1.0.0").unwrap();
        let v2 = Version::parse("2.0.0").unwrap();
        assert_eq!(reg.get("calc", &v1).unwrap().replaced_by, Some(v2.clone()));
        assert_eq!(reg.get("calc", &v2).unwrap().replaces, Some(v1));
    }

    #[test]
    fn backlink_is_set_when_successor_registers_first() {
        let mut reg: VersionRegistry<u32> = VersionRegistry::new();
        reg.register("calc", &info_replacing("2.0.0", "1.0.0"), 2)
            .unwrap();
        reg.register("calc", &info("1.0.0"), 1).unwrap();

        let v1 = Version::parse("1.0.0").unwrap();
        assert_eq!(
            reg.get("calc", &v1).unwrap().replaced_by,
            Some(Version::parse("2.0.0").unwrap())
        );
    }

    #[test]
    fn replacement_chain_walks_forward() {
        let mut reg: VersionRegistry<u32> = VersionRegistry::new();
        reg.register("calc", &info("1.0.0"), 1).unwrap();
        reg.register("calc", &info_replacing("2.0.0", "1.0.0"), 2)
            .unwrap();
        reg.register("calc", &info_replacing("3.0.0", "2.0.0"), 3)
            .unwrap();

        let from = Version::parse("1.0.0").unwrap();
        let chain = reg.replacement_chain("calc", &from);
        assert_eq!(
            chain,
            vec![
                Version::parse("2.0.0").unwrap(),
                Version::parse("3.0.0").unwrap()
            ]
        );
        assert!(reg.has_migration_path("calc", &from, &Version::parse("3.0.0").unwrap()));
        assert!(!reg.has_migration_path(
            "calc",
            &Version::parse("3.0.0").unwrap(),
            &Version::parse("1.0.0").unwrap()
        ));
    }

    #[test]
    fn unparseable_version_is_rejected() {
        let mut reg: VersionRegistry<u32> = VersionRegistry::new();
        assert!(reg.register("calc", &info("nope"), 1).is_err());
    }
}
