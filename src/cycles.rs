//! Circular fund routing detection.
//!
//! Enumerates simple directed cycles of bounded length with a pruned
//! DFS: seeds are visited in lexicographic order and intermediate
//! vertices must compare strictly greater than the seed, so every cycle
//! is discovered exactly once, already in canonical rotation.

use crate::graph::TransactionGraph;
use crate::rings::{RawRing, RingKind};
use crate::stats;
use crate::AnalyzerConfig;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Cycle scan output: one raw ring per distinct cycle, plus whether the
/// global result cap cut enumeration short.
#[derive(Debug, Clone)]
pub struct CycleScan {
    pub rings: Vec<RawRing>,
    pub truncated: bool,
}

/// Bounded simple-cycle detector.
pub struct CycleDetector<'a> {
    graph: &'a TransactionGraph,
    config: &'a AnalyzerConfig,
}

struct CycleSearch {
    path: Vec<String>,
    amounts: Vec<f64>,
    timestamps: Vec<DateTime<Utc>>,
    seen: HashSet<Vec<String>>,
    rings: Vec<RawRing>,
    truncated: bool,
}

impl<'a> CycleDetector<'a> {
    pub fn new(graph: &'a TransactionGraph, config: &'a AnalyzerConfig) -> Self {
        Self { graph, config }
    }

    /// Enumerate and score cycles of length `cycle_min_len` to
    /// `cycle_max_len`, up to `cycle_max_results` findings.
    pub fn detect(&self) -> CycleScan {
        let mut search = CycleSearch {
            path: Vec::new(),
            amounts: Vec::new(),
            timestamps: Vec::new(),
            seen: HashSet::new(),
            rings: Vec::new(),
            truncated: false,
        };

        for seed in self.graph.accounts() {
            if search.truncated {
                break;
            }
            if self.hub_pruned(seed) {
                continue;
            }
            search.path.push(seed.clone());
            self.extend(seed, seed, &mut search);
            search.path.pop();
        }

        tracing::debug!(
            cycles = search.rings.len(),
            truncated = search.truncated,
            "cycle scan complete"
        );
        CycleScan {
            rings: search.rings,
            truncated: search.truncated,
        }
    }

    /// Out-degree hubs explode the search and are almost always
    /// legitimate; the false-positive filter catches them anyway.
    fn hub_pruned(&self, account: &str) -> bool {
        self.graph.out_edges(account).len() > self.config.cycle_max_out_degree
    }

    fn extend(&self, current: &str, seed: &str, search: &mut CycleSearch) {
        for edge in self.graph.out_edges(current) {
            if search.truncated {
                return;
            }
            let next = edge.counterparty.as_str();

            if next == seed {
                let len = search.path.len();
                if len >= self.config.cycle_min_len && len <= self.config.cycle_max_len {
                    search.amounts.push(edge.amount);
                    search.timestamps.push(edge.timestamp);
                    self.record(search);
                    search.amounts.pop();
                    search.timestamps.pop();
                }
                continue;
            }

            // Johnson-style lower bound: intermediates stay strictly
            // above the seed, so each cycle is rooted at its smallest
            // member only.
            if next <= seed
                || search.path.len() >= self.config.cycle_max_len
                || search.path.iter().any(|p| p == next)
                || self.hub_pruned(next)
            {
                continue;
            }

            search.path.push(next.to_string());
            search.amounts.push(edge.amount);
            search.timestamps.push(edge.timestamp);
            self.extend(next, seed, search);
            search.path.pop();
            search.amounts.pop();
            search.timestamps.pop();
        }
    }

    fn record(&self, search: &mut CycleSearch) {
        // The path is already canonical (seed is the smallest member);
        // parallel edges can still rediscover the same node sequence.
        if !search.seen.insert(search.path.clone()) {
            return;
        }

        let score = self.score_cycle(&search.path, &search.amounts, &search.timestamps);
        search.rings.push(RawRing {
            kind: RingKind::Cycle,
            members: search.path.clone(),
            hub_in: None,
            hub_out: None,
            time_window_hours: stats::span_hours(&search.timestamps),
            raw_score: score,
            cycle_length: Some(search.path.len()),
            chain_length: None,
            amount_pattern: None,
        });

        if search.rings.len() >= self.config.cycle_max_results {
            search.truncated = true;
        }
    }

    fn score_cycle(
        &self,
        members: &[String],
        amounts: &[f64],
        timestamps: &[DateTime<Utc>],
    ) -> f64 {
        let mut score = 50.0;

        score += match members.len() {
            3 => 15.0,
            4 => 10.0,
            _ => 5.0,
        };

        if let Some(cv) = stats::coefficient_of_variation(amounts) {
            if cv < 0.1 {
                score += 15.0;
            } else if cv < 0.3 {
                score += 10.0;
            } else if cv < 0.5 {
                score += 5.0;
            }
        }

        if let Some(span) = stats::span_hours(timestamps) {
            if span < 24.0 {
                score += 15.0;
            } else if span < 72.0 {
                score += 10.0;
            } else if span < 168.0 {
                score += 5.0;
            }
        }

        let low_activity = members
            .iter()
            .filter(|m| {
                self.graph
                    .metadata(m)
                    .map(|meta| meta.tx_count <= 5)
                    .unwrap_or(false)
            })
            .count();
        if low_activity * 2 > members.len() {
            score += 10.0;
        }

        stats::clamp_score(score)
    }
}
