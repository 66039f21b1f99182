//! Ring records shared by the detectors, pattern tagging, and the
//! post-filter ring merger.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Closed set of structural patterns a ring can exhibit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RingKind {
    Cycle,
    FanIn,
    FanOut,
    FanInFanOut,
    ShellNetwork,
}

impl std::fmt::Display for RingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RingKind::Cycle => write!(f, "cycle"),
            RingKind::FanIn => write!(f, "fan_in"),
            RingKind::FanOut => write!(f, "fan_out"),
            RingKind::FanInFanOut => write!(f, "fan_in_fan_out"),
            RingKind::ShellNetwork => write!(f, "shell_network"),
        }
    }
}

/// Hop-amount progression of a shell chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AmountPattern {
    ExactPassthrough,
    GradualDecay,
    Mixed,
}

/// A detector finding before filtering, merging and scoring.
///
/// `members` is a stable, duplicate-free order: traversal order for
/// cycles and chains, sorted counterparties then hub for smurf groups.
#[derive(Debug, Clone)]
pub struct RawRing {
    pub kind: RingKind,
    pub members: Vec<String>,
    pub hub_in: Option<String>,
    pub hub_out: Option<String>,
    pub time_window_hours: Option<f64>,
    pub raw_score: f64,
    pub cycle_length: Option<usize>,
    pub chain_length: Option<usize>,
    pub amount_pattern: Option<AmountPattern>,
}

impl RawRing {
    /// Member lookup helper for overlap computation.
    fn member_set(&self) -> HashSet<&str> {
        self.members.iter().map(String::as_str).collect()
    }
}

/// Per-account pattern tags accumulated across detector findings.
pub type PatternTags = BTreeMap<String, BTreeSet<String>>;

/// Collect the pattern tag set every ring member carries.
///
/// Hubs are tagged with the pattern itself (`fan_in`, `fan_out`);
/// counterparties with a `*_member` variant. Chain interiors become
/// `shell_intermediary`, chain ends `shell_network_endpoint`.
pub fn collect_pattern_tags(rings: &[RawRing]) -> PatternTags {
    fn add(tags: &mut PatternTags, account: &str, tag: &str) {
        tags.entry(account.to_string())
            .or_default()
            .insert(tag.to_string());
    }

    let mut tags: PatternTags = BTreeMap::new();
    for ring in rings {
        match ring.kind {
            RingKind::Cycle => {
                let tag = format!(
                    "cycle_length_{}",
                    ring.cycle_length.unwrap_or(ring.members.len())
                );
                for member in &ring.members {
                    add(&mut tags, member, &tag);
                }
            }
            RingKind::FanIn | RingKind::FanOut | RingKind::FanInFanOut => {
                let hubs: Vec<&String> =
                    ring.hub_in.iter().chain(ring.hub_out.iter()).collect();
                for member in &ring.members {
                    let is_hub = hubs.iter().any(|h| *h == member);
                    if matches!(ring.kind, RingKind::FanIn | RingKind::FanInFanOut) {
                        add(
                            &mut tags,
                            member,
                            if is_hub { "fan_in" } else { "fan_in_member" },
                        );
                    }
                    if matches!(ring.kind, RingKind::FanOut | RingKind::FanInFanOut) {
                        add(
                            &mut tags,
                            member,
                            if is_hub { "fan_out" } else { "fan_out_member" },
                        );
                    }
                }
            }
            RingKind::ShellNetwork => {
                let last = ring.members.len().saturating_sub(1);
                for (idx, member) in ring.members.iter().enumerate() {
                    let tag = if idx == 0 || idx == last {
                        "shell_network_endpoint"
                    } else {
                        "shell_intermediary"
                    };
                    add(&mut tags, member, tag);
                }
            }
        }
    }
    tags
}

/// Disjoint-set forest with path compression.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Anchor on the smaller index so merged groups keep the
            // earliest ring as their representative.
            let (keep, absorb) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[absorb] = keep;
        }
    }
}

/// Merge rings of identical kind whose membership overlap exceeds half
/// of the smaller ring.
///
/// The merged ring keeps the first ring's kind-specific fields and its
/// member order, extended with unseen members of later rings. Output
/// preserves production order of the earliest ring in each group.
pub fn merge_rings(rings: Vec<RawRing>) -> Vec<RawRing> {
    if rings.len() < 2 {
        return rings;
    }

    let mut sets = DisjointSet::new(rings.len());
    for i in 0..rings.len() {
        let set_i = rings[i].member_set();
        for j in (i + 1)..rings.len() {
            if rings[i].kind != rings[j].kind {
                continue;
            }
            let set_j = rings[j].member_set();
            let overlap = set_i.intersection(&set_j).count();
            let min_size = set_i.len().min(set_j.len());
            if min_size > 0 && overlap as f64 / min_size as f64 > 0.5 {
                sets.union(i, j);
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..rings.len() {
        groups.entry(sets.find(i)).or_default().push(i);
    }

    let mut merged = Vec::with_capacity(groups.len());
    for (_root, indices) in groups {
        let mut ring = rings[indices[0]].clone();
        let mut seen: HashSet<String> = ring.members.iter().cloned().collect();
        for &idx in &indices[1..] {
            for member in &rings[idx].members {
                if seen.insert(member.clone()) {
                    ring.members.push(member.clone());
                }
            }
        }
        merged.push(ring);
    }
    merged
}

/// `RING_` + zero-padded three-digit ordinal, unique within a result.
pub fn ring_id(index: usize) -> String {
    format!("RING_{:03}", index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(kind: RingKind, members: &[&str]) -> RawRing {
        RawRing {
            kind,
            members: members.iter().map(|m| m.to_string()).collect(),
            hub_in: None,
            hub_out: None,
            time_window_hours: None,
            raw_score: 50.0,
            cycle_length: match kind {
                RingKind::Cycle => Some(members.len()),
                _ => None,
            },
            chain_length: match kind {
                RingKind::ShellNetwork => Some(members.len()),
                _ => None,
            },
            amount_pattern: None,
        }
    }

    #[test]
    fn test_merge_same_kind_high_overlap() {
        let merged = merge_rings(vec![
            ring(RingKind::Cycle, &["A", "B", "C"]),
            ring(RingKind::Cycle, &["A", "B", "D"]),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].members, ["A", "B", "C", "D"]);
        assert_eq!(merged[0].cycle_length, Some(3));
    }

    #[test]
    fn test_no_merge_across_kinds() {
        let merged = merge_rings(vec![
            ring(RingKind::Cycle, &["A", "B", "C"]),
            ring(RingKind::ShellNetwork, &["A", "B", "C", "D"]),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_no_merge_below_overlap_threshold() {
        // 1 shared member of min size 3 is not enough.
        let merged = merge_rings(vec![
            ring(RingKind::Cycle, &["A", "B", "C"]),
            ring(RingKind::Cycle, &["A", "X", "Y"]),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_transitive_merge_keeps_first_fields() {
        let mut first = ring(RingKind::FanIn, &["S1", "S2", "S3", "H"]);
        first.hub_in = Some("H".to_string());
        first.time_window_hours = Some(4.0);
        let second = ring(RingKind::FanIn, &["S1", "S2", "S3", "S4"]);
        let third = ring(RingKind::FanIn, &["S2", "S3", "S4", "S5"]);

        let merged = merge_rings(vec![first, second, third]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].hub_in.as_deref(), Some("H"));
        assert_eq!(merged[0].time_window_hours, Some(4.0));
        assert_eq!(merged[0].members, ["S1", "S2", "S3", "H", "S4", "S5"]);
    }

    #[test]
    fn test_cycle_tags() {
        let tags = collect_pattern_tags(&[ring(RingKind::Cycle, &["A", "B", "C"])]);
        assert!(tags["A"].contains("cycle_length_3"));
        assert!(tags["C"].contains("cycle_length_3"));
    }

    #[test]
    fn test_shell_role_tags() {
        let tags =
            collect_pattern_tags(&[ring(RingKind::ShellNetwork, &["O", "S1", "S2", "E"])]);
        assert!(tags["O"].contains("shell_network_endpoint"));
        assert!(tags["S1"].contains("shell_intermediary"));
        assert!(tags["S2"].contains("shell_intermediary"));
        assert!(tags["E"].contains("shell_network_endpoint"));
    }

    #[test]
    fn test_fan_hub_and_member_tags() {
        let mut fan = ring(RingKind::FanIn, &["S1", "S2", "H"]);
        fan.hub_in = Some("H".to_string());
        let tags = collect_pattern_tags(&[fan]);
        assert!(tags["H"].contains("fan_in"));
        assert!(tags["S1"].contains("fan_in_member"));
        assert!(!tags["S1"].contains("fan_in"));
    }

    #[test]
    fn test_combined_hub_gets_both_tags() {
        let mut fan = ring(RingKind::FanInFanOut, &["S1", "R1", "H"]);
        fan.hub_in = Some("H".to_string());
        fan.hub_out = Some("H".to_string());
        let tags = collect_pattern_tags(&[fan]);
        assert!(tags["H"].contains("fan_in"));
        assert!(tags["H"].contains("fan_out"));
    }

    #[test]
    fn test_ring_id_format() {
        assert_eq!(ring_id(0), "RING_001");
        assert_eq!(ring_id(41), "RING_042");
        assert_eq!(ring_id(120), "RING_121");
    }
}
