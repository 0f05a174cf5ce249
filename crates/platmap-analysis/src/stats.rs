//! Summary statistics over a set map

use crate::clustering;
use crate::setmap::{MemberIndex, SetMap};
use serde::Serialize;

/// Per-member line counts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberSummary {
    pub name: String,
    /// Lines the member uses
    pub lines: u64,
    /// Lines only this member uses
    pub unique: u64,
}

/// Code base summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: u64,
    /// Lines no member uses
    pub unused: u64,
    /// Lines used by exactly one member
    pub unique: u64,
    /// Lines used by every member
    pub shared_by_all: u64,
    pub members: Vec<MemberSummary>,
    /// Mean pairwise distance between members
    pub divergence: Option<f64>,
    /// Share of lines used by at least one member, in `[0, 1]`
    pub coverage: f64,
}

impl Summary {
    pub fn from_setmap(setmap: &SetMap) -> Self {
        let count = setmap.members().len();
        let all: Vec<MemberIndex> = (0..count).collect();

        let total = setmap.total();
        let mut unused = 0;
        let mut unique = 0;
        let mut shared_by_all = 0;
        let mut per_member_unique = vec![0u64; count];
        for (set, lines) in setmap.iter() {
            match set.len() {
                0 => unused += lines,
                1 => {
                    unique += lines;
                    if let Some(&member) = set.iter().next() {
                        per_member_unique[member] += lines;
                    }
                }
                _ => {}
            }
            if count > 0 && set.len() == count {
                shared_by_all += lines;
            }
        }

        let members = all
            .iter()
            .map(|&m| MemberSummary {
                name: setmap.members()[m].clone(),
                lines: setmap.member_total(m),
                unique: per_member_unique[m],
            })
            .collect();

        let coverage = if total == 0 {
            0.0
        } else {
            (total - unused) as f64 / total as f64
        };

        Self {
            total,
            unused,
            unique,
            shared_by_all,
            members,
            divergence: clustering::divergence(setmap, &all),
            coverage,
        }
    }
}
