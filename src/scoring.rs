//! Two-stage scoring: account suspicion, then ring risk.
//!
//! Stage 1 scores every account appearing in a surviving ring from its
//! flow symmetry, burstiness and detected patterns. Stage 2 aggregates
//! member suspicion into a per-ring risk score. Stage 1 must complete
//! first; stage 2 reads its output.

use crate::graph::TransactionGraph;
use crate::rings::{self, AmountPattern, PatternTags, RawRing, RingKind};
use crate::stats;
use crate::AnalyzerConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// A flagged account with its suspicion score and explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousAccount {
    pub account_id: String,
    pub suspicion_score: f64,
    pub suspicion_label: String,
    pub detected_patterns: Vec<String>,
    pub ring_id: String,
}

/// A scored fraud ring in its output form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudRing {
    pub ring_id: String,
    pub pattern_type: RingKind,
    pub member_accounts: Vec<String>,
    pub risk_score: f64,
    pub risk_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_pattern: Option<AmountPattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_window_hours: Option<f64>,
    #[serde(rename = "aggregatorNode", skip_serializing_if = "Option::is_none")]
    pub aggregator_node: Option<String>,
    #[serde(rename = "disperserNode", skip_serializing_if = "Option::is_none")]
    pub disperser_node: Option<String>,
}

/// Deterministic scoring over the surviving, merged rings.
pub struct ScoringEngine<'a> {
    graph: &'a TransactionGraph,
    config: &'a AnalyzerConfig,
}

impl<'a> ScoringEngine<'a> {
    pub fn new(graph: &'a TransactionGraph, config: &'a AnalyzerConfig) -> Self {
        Self { graph, config }
    }

    /// Stage 1: suspicion for every ring member, sorted by score
    /// descending (account id breaks ties).
    pub fn score_accounts(
        &self,
        rings: &[RawRing],
        tags: &PatternTags,
    ) -> Vec<SuspiciousAccount> {
        let mut flagged: BTreeSet<&str> = BTreeSet::new();
        for ring in rings {
            flagged.extend(ring.members.iter().map(String::as_str));
        }

        let empty = BTreeSet::new();
        let mut accounts: Vec<SuspiciousAccount> = flagged
            .into_iter()
            .map(|account| {
                let account_tags = tags.get(account).unwrap_or(&empty);
                let score = self.suspicion_score(account, account_tags);
                let primary = rings
                    .iter()
                    .position(|r| r.members.iter().any(|m| m == account))
                    .map(rings::ring_id)
                    .unwrap_or_default();
                SuspiciousAccount {
                    account_id: account.to_string(),
                    suspicion_score: score,
                    suspicion_label: suspicion_label(score).to_string(),
                    detected_patterns: account_tags.iter().cloned().collect(),
                    ring_id: primary,
                }
            })
            .collect();

        accounts.sort_by(|a, b| {
            b.suspicion_score
                .partial_cmp(&a.suspicion_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.account_id.cmp(&b.account_id))
        });
        accounts
    }

    /// Stage 2: ring risk from member suspicion plus temporal density
    /// and pattern severity.
    pub fn score_rings(
        &self,
        rings: &[RawRing],
        accounts: &[SuspiciousAccount],
    ) -> Vec<FraudRing> {
        let suspicion: BTreeMap<&str, f64> = accounts
            .iter()
            .map(|a| (a.account_id.as_str(), a.suspicion_score))
            .collect();

        rings
            .iter()
            .enumerate()
            .map(|(index, ring)| {
                let member_scores: Vec<f64> = ring
                    .members
                    .iter()
                    .filter_map(|m| suspicion.get(m.as_str()).copied())
                    .collect();
                let avg = stats::mean(&member_scores).unwrap_or(0.0);
                let risk = stats::round1(stats::clamp_score(
                    avg + self.temporal_density(ring) + severity_bonus(ring),
                ));

                FraudRing {
                    ring_id: rings::ring_id(index),
                    pattern_type: ring.kind,
                    member_accounts: ring.members.clone(),
                    risk_score: risk,
                    risk_label: risk_label(risk).to_string(),
                    cycle_length: ring.cycle_length,
                    chain_length: ring.chain_length,
                    amount_pattern: ring.amount_pattern,
                    temporal_window_hours: ring.time_window_hours,
                    aggregator_node: ring.hub_in.clone(),
                    disperser_node: ring.hub_out.clone(),
                }
            })
            .collect()
    }

    fn suspicion_score(&self, account: &str, tags: &BTreeSet<String>) -> f64 {
        let Some(meta) = self.graph.metadata(account) else {
            return 0.0;
        };

        let max_flow = meta.total_received.max(meta.total_sent);
        let ptr = if max_flow > 0.0 {
            meta.total_received.min(meta.total_sent) / max_flow
        } else {
            0.0
        };

        let velocity = if meta.tx_count <= 1 {
            1.0
        } else {
            let peak = stats::max_count_in_window(
                &meta.all_timestamps,
                self.config.velocity_window_hours,
            );
            peak as f64 / meta.tx_count as f64
        };

        let modifier = self.pattern_modifier(tags, meta.tx_count);

        let false_positive_pressure =
            if meta.tx_count > self.config.fpp_tx_count && ptr < self.config.fpp_ptr {
                50.0
            } else {
                0.0
            };

        stats::round1(stats::clamp_score(
            35.0 * ptr + 35.0 * velocity + modifier - false_positive_pressure,
        ))
    }

    /// Each role contributes at most once; the modifier is a function
    /// of the tag set, never of detector firing order.
    fn pattern_modifier(&self, tags: &BTreeSet<String>, tx_count: usize) -> f64 {
        let mut modifier = 0.0;
        if tags.iter().any(|t| t.starts_with("cycle")) {
            modifier += 20.0;
        }
        if tags.contains("fan_in") {
            modifier += 25.0;
        }
        if tags.contains("fan_out") {
            modifier += 25.0;
        }
        if tags.contains("shell_intermediary") || tags.contains("shell_network_endpoint") {
            modifier += if tx_count <= self.config.shell_tx_threshold {
                30.0
            } else {
                15.0
            };
        }
        modifier
    }

    /// +15 when the ring's internal transactions are temporally dense
    /// (span of at most 72 hours), or too few to judge.
    fn temporal_density(&self, ring: &RawRing) -> f64 {
        let members: HashSet<&str> = ring.members.iter().map(String::as_str).collect();
        let mut stamps: Vec<DateTime<Utc>> = Vec::new();
        for member in &ring.members {
            for edge in self.graph.out_edges(member) {
                if members.contains(edge.counterparty.as_str()) {
                    stamps.push(edge.timestamp);
                }
            }
        }
        if stamps.len() < 2 {
            return 15.0;
        }
        match stats::span_hours(&stamps) {
            Some(span) if span <= 72.0 => 15.0,
            _ => 0.0,
        }
    }
}

/// Severity of the ring's normalized pattern class.
fn severity_bonus(ring: &RawRing) -> f64 {
    match ring.kind {
        RingKind::Cycle => 10.0,
        RingKind::ShellNetwork => {
            let hop_length = ring.chain_length.unwrap_or(ring.members.len()).saturating_sub(1);
            if hop_length > 3 {
                15.0
            } else {
                10.0
            }
        }
        RingKind::FanIn | RingKind::FanOut | RingKind::FanInFanOut => {
            if ring.members.len() >= 25 {
                20.0
            } else {
                10.0
            }
        }
    }
}

pub fn suspicion_label(score: f64) -> &'static str {
    if score >= 75.0 {
        "High Risk"
    } else if score >= 50.0 {
        "Suspicious"
    } else if score >= 20.0 {
        "Monitor"
    } else {
        "Stable / Merchant"
    }
}

pub fn risk_label(score: f64) -> &'static str {
    if score >= 80.0 {
        "Critical"
    } else if score >= 60.0 {
        "High"
    } else if score >= 40.0 {
        "Medium"
    } else {
        "Low"
    }
}
