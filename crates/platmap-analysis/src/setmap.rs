//! Set map: lines per exact member set

use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Index of a member in [`SetMap::members`]
pub type MemberIndex = usize;

/// Set of members
pub type MemberSet = BTreeSet<MemberIndex>;

/// Line counts keyed by the exact set of members that use the lines.
///
/// Members are platforms, or `platform/pass` labels when passes are
/// reported separately. The entry for the empty set collects lines no
/// member uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetMap {
    members: Vec<String>,
    counts: BTreeMap<MemberSet, u64>,
}

impl SetMap {
    pub fn new(members: Vec<String>) -> Self {
        Self {
            members,
            counts: BTreeMap::new(),
        }
    }

    /// Add lines to the entry for `set`
    pub fn add(&mut self, set: MemberSet, lines: u64) {
        if lines > 0 {
            *self.counts.entry(set).or_default() += lines;
        }
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn member_index(&self, name: &str) -> Option<MemberIndex> {
        self.members.iter().position(|m| m == name)
    }

    /// Lines used by exactly `set`
    pub fn get(&self, set: &MemberSet) -> u64 {
        self.counts.get(set).copied().unwrap_or(0)
    }

    /// Entries with a non-zero count
    pub fn iter(&self) -> impl Iterator<Item = (&MemberSet, u64)> {
        self.counts.iter().map(|(set, &count)| (set, count))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// All analyzed lines
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Lines used by a member
    pub fn member_total(&self, member: MemberIndex) -> u64 {
        self.iter()
            .filter(|(set, _)| set.contains(&member))
            .map(|(_, count)| count)
            .sum()
    }

    /// Lines used by both members
    pub fn intersection(&self, a: MemberIndex, b: MemberIndex) -> u64 {
        self.iter()
            .filter(|(set, _)| set.contains(&a) && set.contains(&b))
            .map(|(_, count)| count)
            .sum()
    }

    /// Lines used by either member
    pub fn union(&self, a: MemberIndex, b: MemberIndex) -> u64 {
        self.iter()
            .filter(|(set, _)| set.contains(&a) || set.contains(&b))
            .map(|(_, count)| count)
            .sum()
    }

    /// Member names of a set, in member order
    pub fn names(&self, set: &MemberSet) -> Vec<&str> {
        set.iter()
            .filter_map(|&i| self.members.get(i))
            .map(String::as_str)
            .collect()
    }
}

#[derive(Serialize)]
struct Entry<'a> {
    members: Vec<&'a str>,
    lines: u64,
}

impl Serialize for SetMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.counts.len()))?;
        for (set, lines) in self.iter() {
            seq.serialize_element(&Entry {
                members: self.names(set),
                lines,
            })?;
        }
        seq.end()
    }
}
