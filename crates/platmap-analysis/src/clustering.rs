//! Similarity clustering of members
//!
//! Distance between two members is `1 - |A ∩ B| / |A ∪ B|` over the lines
//! they use, computed from set map counts. Members are merged bottom-up
//! with average linkage into a [`Dendrogram`].

use crate::setmap::{MemberIndex, SetMap};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt::Write;

/// One merge step. Cluster ids below the member count are single
/// members; merge `k` creates cluster `members + k`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub distance: f64,
    /// Members in the merged cluster
    pub size: usize,
}

/// Binary merge tree over members
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dendrogram {
    pub labels: Vec<String>,
    pub merges: Vec<Merge>,
}

/// Jaccard distance between two members; two members using no lines are
/// identical
pub fn distance(setmap: &SetMap, a: MemberIndex, b: MemberIndex) -> f64 {
    let union = setmap.union(a, b);
    if union == 0 {
        return 0.0;
    }
    1.0 - setmap.intersection(a, b) as f64 / union as f64
}

/// Pairwise distances between the given members
pub fn distance_matrix(setmap: &SetMap, members: &[MemberIndex]) -> Vec<Vec<f64>> {
    members
        .iter()
        .map(|&a| members.iter().map(|&b| distance(setmap, a, b)).collect())
        .collect()
}

/// Mean distance over all member pairs, `None` with fewer than two members
pub fn divergence(setmap: &SetMap, members: &[MemberIndex]) -> Option<f64> {
    if members.len() < 2 {
        return None;
    }
    let mut sum = 0.0;
    let mut pairs = 0usize;
    for (i, &a) in members.iter().enumerate() {
        for &b in &members[i + 1..] {
            sum += distance(setmap, a, b);
            pairs += 1;
        }
    }
    Some(sum / pairs as f64)
}

struct Cluster {
    id: usize,
    /// Declaration position of the first member, for tie-breaking
    first: usize,
    size: usize,
}

/// Cluster the given members (in declaration order).
///
/// Returns `None` with fewer than two members.
pub fn cluster(setmap: &SetMap, members: &[MemberIndex]) -> Option<Dendrogram> {
    let n = members.len();
    if n < 2 {
        return None;
    }

    let mut matrix = distance_matrix(setmap, members);
    let mut active: Vec<Cluster> = (0..n).map(|i| Cluster { id: i, first: i, size: 1 }).collect();
    // Row of each active cluster in `matrix`
    let mut rows: Vec<usize> = (0..n).collect();
    let mut merges = Vec::with_capacity(n - 1);

    while active.len() > 1 {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..active.len() {
            for j in i + 1..active.len() {
                let d = matrix[rows[i]][rows[j]];
                let better = match best {
                    None => true,
                    Some((bi, bj, bd)) => match d.partial_cmp(&bd).unwrap_or(Ordering::Equal) {
                        Ordering::Less => true,
                        Ordering::Greater => false,
                        Ordering::Equal => tie_key(&active, i, j) < tie_key(&active, bi, bj),
                    },
                };
                if better {
                    best = Some((i, j, d));
                }
            }
        }
        let Some((i, j, d)) = best else { break };

        let (left, right) = if active[i].first <= active[j].first { (i, j) } else { (j, i) };
        let size = active[i].size + active[j].size;
        merges.push(Merge {
            left: active[left].id,
            right: active[right].id,
            distance: d,
            size,
        });

        // Average linkage: the merged row reuses row i.
        let (ri, rj) = (rows[i], rows[j]);
        let (si, sj) = (active[i].size as f64, active[j].size as f64);
        for k in 0..active.len() {
            if k == i || k == j {
                continue;
            }
            let rk = rows[k];
            let merged = (si * matrix[ri][rk] + sj * matrix[rj][rk]) / (si + sj);
            matrix[ri][rk] = merged;
            matrix[rk][ri] = merged;
        }

        active[i] = Cluster {
            id: n + merges.len() - 1,
            first: active[i].first.min(active[j].first),
            size,
        };
        active.remove(j);
        rows.remove(j);
    }

    Some(Dendrogram {
        labels: members
            .iter()
            .filter_map(|&m| setmap.members().get(m).cloned())
            .collect(),
        merges,
    })
}

fn tie_key(active: &[Cluster], i: usize, j: usize) -> (usize, usize) {
    let (a, b) = (active[i].first, active[j].first);
    (a.min(b), a.max(b))
}

impl Dendrogram {
    /// Indented text rendering, root first
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.labels.len().checked_add(self.merges.len()).and_then(|n| n.checked_sub(1)) {
            self.render_node(root, 0, &mut out);
        }
        out
    }

    fn render_node(&self, id: usize, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        match id.checked_sub(self.labels.len()).and_then(|k| self.merges.get(k)) {
            Some(merge) => {
                let _ = writeln!(out, "{}+ {:.3} ({} members)", indent, merge.distance, merge.size);
                self.render_node(merge.left, depth + 1, out);
                self.render_node(merge.right, depth + 1, out);
            }
            None => {
                let label = self.labels.get(id).map(String::as_str).unwrap_or("?");
                let _ = writeln!(out, "{}- {}", indent, label);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setmap::MemberSet;
    use pretty_assertions::assert_eq;

    fn setmap(members: &[&str], entries: &[(&[usize], u64)]) -> SetMap {
        let mut map = SetMap::new(members.iter().map(|m| m.to_string()).collect());
        for (set, lines) in entries {
            map.add(set.iter().copied().collect::<MemberSet>(), *lines);
        }
        map
    }

    #[test]
    fn test_jaccard_distance() {
        // P1 = {1,2,3}, P2 = {2,3,4}
        let map = setmap(&["P1", "P2"], &[(&[0], 1), (&[1], 1), (&[0, 1], 2)]);
        assert_eq!(distance(&map, 0, 1), 0.5);
        assert_eq!(divergence(&map, &[0, 1]), Some(0.5));

        let dendrogram = cluster(&map, &[0, 1]).unwrap();
        assert_eq!(
            dendrogram.merges,
            vec![Merge {
                left: 0,
                right: 1,
                distance: 0.5,
                size: 2
            }]
        );
    }

    #[test]
    fn test_empty_members_are_identical() {
        let map = setmap(&["a", "b"], &[(&[], 10)]);
        assert_eq!(distance(&map, 0, 1), 0.0);
    }

    #[test]
    fn test_identical_members_merge_first() {
        let map = setmap(
            &["cpu", "gpu", "cpu2"],
            &[(&[0, 2], 5), (&[1], 5), (&[0, 1, 2], 10)],
        );
        let dendrogram = cluster(&map, &[0, 1, 2]).unwrap();
        assert_eq!(dendrogram.merges[0].left, 0);
        assert_eq!(dendrogram.merges[0].right, 2);
        assert_eq!(dendrogram.merges[0].distance, 0.0);
        assert_eq!(dendrogram.merges[1].left, 3);
        assert_eq!(dendrogram.merges[1].right, 1);
        assert_eq!(dendrogram.merges[1].size, 3);
        // d(cpu, gpu) = d(cpu2, gpu) = 1 - 10/20
        assert_eq!(dendrogram.merges[1].distance, 0.5);
    }

    #[test]
    fn test_average_linkage() {
        // a and b close; c far from a, farther from b.
        let map = setmap(
            &["a", "b", "c"],
            &[(&[0, 1, 2], 2), (&[0, 1], 6), (&[0], 1), (&[1], 1), (&[2], 6), (&[0, 2], 2)],
        );
        let d_ac = distance(&map, 0, 2);
        let d_bc = distance(&map, 1, 2);
        let dendrogram = cluster(&map, &[0, 1, 2]).unwrap();
        assert_eq!((dendrogram.merges[0].left, dendrogram.merges[0].right), (0, 1));
        let expected = (d_ac + d_bc) / 2.0;
        assert!((dendrogram.merges[1].distance - expected).abs() < 1e-12);
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let map = setmap(&["w", "x", "y", "z"], &[(&[0, 1, 2, 3], 4)]);
        let dendrogram = cluster(&map, &[0, 1, 2, 3]).unwrap();
        let pairs: Vec<_> = dendrogram.merges.iter().map(|m| (m.left, m.right)).collect();
        assert_eq!(pairs, vec![(0, 1), (4, 2), (5, 3)]);
    }

    #[test]
    fn test_fewer_than_two_members() {
        let map = setmap(&["only"], &[(&[0], 3)]);
        assert!(cluster(&map, &[0]).is_none());
        assert!(cluster(&map, &[]).is_none());
        assert!(divergence(&map, &[0]).is_none());
    }

    #[test]
    fn test_render() {
        let map = setmap(&["P1", "P2"], &[(&[0], 1), (&[1], 1), (&[0, 1], 2)]);
        let text = cluster(&map, &[0, 1]).unwrap().render();
        assert_eq!(text, "+ 0.500 (2 members)\n  - P1\n  - P2\n");
    }
}
