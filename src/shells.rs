//! Layered shell-chain detection.
//!
//! A shell is a barely-used conduit account: three or fewer total
//! transactions with at least one in and one out. Chains of value
//! moving origin -> shells -> endpoint are the classic layering shape;
//! the detector traces them with an amount-coherence prune so unrelated
//! flows through the same accounts do not stitch together.

use crate::graph::TransactionGraph;
use crate::rings::{AmountPattern, RawRing, RingKind};
use crate::stats;
use crate::AnalyzerConfig;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

/// Shell scan output.
#[derive(Debug, Clone)]
pub struct ShellScan {
    pub rings: Vec<RawRing>,
}

/// Shell-chain detector over a built transaction graph.
pub struct ShellNetworkDetector<'a> {
    graph: &'a TransactionGraph,
    config: &'a AnalyzerConfig,
}

struct ChainSearch {
    path: Vec<String>,
    amounts: Vec<f64>,
    timestamps: Vec<DateTime<Utc>>,
    seen: HashSet<Vec<String>>,
    rings: Vec<RawRing>,
}

impl<'a> ShellNetworkDetector<'a> {
    pub fn new(graph: &'a TransactionGraph, config: &'a AnalyzerConfig) -> Self {
        Self { graph, config }
    }

    pub fn detect(&self) -> ShellScan {
        let shells = self.shell_set();
        let mut search = ChainSearch {
            path: Vec::new(),
            amounts: Vec::new(),
            timestamps: Vec::new(),
            seen: HashSet::new(),
            rings: Vec::new(),
        };

        for shell in &shells {
            for in_edge in self.graph.in_edges(shell) {
                let origin = in_edge.counterparty.as_str();
                if shells.contains(origin) {
                    continue;
                }
                search.path.push(origin.to_string());
                search.path.push(shell.to_string());
                search.amounts.push(in_edge.amount);
                search.timestamps.push(in_edge.timestamp);
                self.extend(shell, &shells, &mut search);
                search.timestamps.pop();
                search.amounts.pop();
                search.path.pop();
                search.path.pop();
            }
        }

        tracing::debug!(
            shells = shells.len(),
            chains = search.rings.len(),
            "shell scan complete"
        );
        ShellScan {
            rings: search.rings,
        }
    }

    /// Accounts eligible as chain interiors.
    fn shell_set(&self) -> BTreeSet<String> {
        self.graph
            .accounts()
            .filter(|account| {
                self.graph
                    .metadata(account)
                    .map(|meta| {
                        meta.tx_count <= self.config.shell_tx_threshold
                            && meta.in_degree >= 1
                            && meta.out_degree >= 1
                    })
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    fn extend(&self, current: &str, shells: &BTreeSet<String>, search: &mut ChainSearch) {
        let previous_amount = match search.amounts.last() {
            Some(amount) => *amount,
            None => return,
        };

        for edge in self.graph.out_edges(current) {
            // Money cannot grow along a chain, and a drop past the
            // threshold means the flows are unrelated.
            if edge.amount > previous_amount
                || previous_amount - edge.amount > self.config.shell_max_drop
            {
                continue;
            }
            let next = edge.counterparty.as_str();
            if search.path.iter().any(|p| p == next) {
                continue;
            }

            if shells.contains(next) {
                // Leave room for a non-shell endpoint.
                if search.path.len() < self.config.shell_max_nodes - 1 {
                    search.path.push(next.to_string());
                    search.amounts.push(edge.amount);
                    search.timestamps.push(edge.timestamp);
                    self.extend(next, shells, search);
                    search.timestamps.pop();
                    search.amounts.pop();
                    search.path.pop();
                }
            } else {
                let total_nodes = search.path.len() + 1;
                if total_nodes >= self.config.shell_min_nodes
                    && total_nodes <= self.config.shell_max_nodes
                {
                    search.path.push(next.to_string());
                    search.amounts.push(edge.amount);
                    search.timestamps.push(edge.timestamp);
                    self.record(search);
                    search.timestamps.pop();
                    search.amounts.pop();
                    search.path.pop();
                }
            }
        }
    }

    fn record(&self, search: &mut ChainSearch) {
        if !search.seen.insert(search.path.clone()) {
            return;
        }
        let pattern = classify_amounts(&search.amounts);
        let score = self.score_chain(&search.path, &search.amounts, &search.timestamps, pattern);
        search.rings.push(RawRing {
            kind: RingKind::ShellNetwork,
            members: search.path.clone(),
            hub_in: None,
            hub_out: None,
            time_window_hours: stats::span_hours(&search.timestamps),
            raw_score: score,
            cycle_length: None,
            chain_length: Some(search.path.len()),
            amount_pattern: Some(pattern),
        });
    }

    fn score_chain(
        &self,
        chain: &[String],
        amounts: &[f64],
        timestamps: &[DateTime<Utc>],
        pattern: AmountPattern,
    ) -> f64 {
        let mut score = 45.0;

        score += match chain.len() {
            n if n >= 6 => 20.0,
            5 => 15.0,
            4 => 10.0,
            _ => 5.0,
        };

        score += match pattern {
            AmountPattern::ExactPassthrough => 15.0,
            AmountPattern::GradualDecay => 20.0,
            AmountPattern::Mixed => 10.0,
        };

        let ordered = timestamps.windows(2).all(|w| w[0] <= w[1]);
        if ordered {
            if let Some(span) = stats::span_hours(timestamps) {
                if span < 24.0 {
                    score += 15.0;
                } else if span < 72.0 {
                    score += 10.0;
                } else if span < 168.0 {
                    score += 5.0;
                }
            }
        }

        let interior = &chain[1..chain.len() - 1];
        let pure = interior
            .iter()
            .filter(|account| {
                self.graph
                    .metadata(account)
                    .map(|meta| meta.tx_count == 2)
                    .unwrap_or(false)
            })
            .count();
        if pure * 2 > interior.len() {
            score += 10.0;
        }

        stats::clamp_score(score)
    }
}

/// Classify the hop-amount progression of a chain.
fn classify_amounts(amounts: &[f64]) -> AmountPattern {
    if amounts.len() < 2 {
        return AmountPattern::ExactPassthrough;
    }
    let ratios: Vec<f64> = amounts.windows(2).map(|w| w[1] / w[0]).collect();

    if ratios.iter().all(|r| (r - 1.0).abs() <= 0.01) {
        return AmountPattern::ExactPassthrough;
    }
    let decaying = ratios.iter().filter(|r| (0.80..0.99).contains(*r)).count();
    if decaying as f64 / ratios.len() as f64 >= 0.5 {
        AmountPattern::GradualDecay
    } else {
        AmountPattern::Mixed
    }
}
