//! Smurfing (fan-in / fan-out) detection.
//!
//! Three sub-scans over the graph: aggregators pulling funds from many
//! senders, dispersers pushing funds to many receivers, and combined
//! hubs doing both. Each candidate is scored with six additive signals
//! against a legitimacy penalty; only candidates clearing the emit
//! threshold produce a ring.

use crate::graph::{NodeMetadata, TransactionGraph, TxnEdge};
use crate::rings::{RawRing, RingKind};
use crate::stats;
use crate::AnalyzerConfig;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Periods a legitimate actor tends to repeat on: daily, weekly,
/// fortnightly, monthly.
const REGULAR_PERIODS_SECS: [f64; 4] = [
    SECONDS_PER_DAY,
    7.0 * SECONDS_PER_DAY,
    14.0 * SECONDS_PER_DAY,
    30.0 * SECONDS_PER_DAY,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FanDirection {
    In,
    Out,
    Both,
}

/// Smurfing detector over a built transaction graph.
pub struct SmurfingDetector<'a> {
    graph: &'a TransactionGraph,
    config: &'a AnalyzerConfig,
}

impl<'a> SmurfingDetector<'a> {
    pub fn new(graph: &'a TransactionGraph, config: &'a AnalyzerConfig) -> Self {
        Self { graph, config }
    }

    /// Run the fan-in, fan-out and combined scans in order.
    pub fn detect(&self) -> Vec<RawRing> {
        let mut rings = Vec::new();
        let mut emitted_hubs: HashSet<&str> = HashSet::new();

        for account in self.graph.accounts() {
            let Some(meta) = self.graph.metadata(account) else {
                continue;
            };
            if meta.unique_senders >= self.config.fan_threshold {
                if let Some(ring) = self.evaluate(account, meta, FanDirection::In) {
                    emitted_hubs.insert(account.as_str());
                    rings.push(ring);
                }
            }
        }

        for account in self.graph.accounts() {
            let Some(meta) = self.graph.metadata(account) else {
                continue;
            };
            if meta.unique_receivers >= self.config.fan_threshold {
                if let Some(ring) = self.evaluate(account, meta, FanDirection::Out) {
                    emitted_hubs.insert(account.as_str());
                    rings.push(ring);
                }
            }
        }

        for account in self.graph.accounts() {
            if emitted_hubs.contains(account.as_str()) {
                continue;
            }
            let Some(meta) = self.graph.metadata(account) else {
                continue;
            };
            if meta.unique_senders >= self.config.fan_threshold
                && meta.unique_receivers >= self.config.fan_threshold
            {
                if let Some(ring) = self.evaluate(account, meta, FanDirection::Both) {
                    rings.push(ring);
                }
            }
        }

        tracing::debug!(groups = rings.len(), "smurfing scan complete");
        rings
    }

    fn evaluate(
        &self,
        hub: &str,
        meta: &NodeMetadata,
        direction: FanDirection,
    ) -> Option<RawRing> {
        let edges: Vec<&TxnEdge> = match direction {
            FanDirection::In => self.graph.in_edges(hub).iter().collect(),
            FanDirection::Out => self.graph.out_edges(hub).iter().collect(),
            FanDirection::Both => self
                .graph
                .in_edges(hub)
                .iter()
                .chain(self.graph.out_edges(hub).iter())
                .collect(),
        };
        if edges.is_empty() {
            return None;
        }

        let amounts: Vec<f64> = edges.iter().map(|e| e.amount).collect();
        let mut stamps: Vec<DateTime<Utc>> = edges.iter().map(|e| e.timestamp).collect();
        stamps.sort();
        let window = stats::span_hours(&stamps);

        let signals = self.structural_signal(meta, direction)
            + self.burst_signal(&stamps, window)
            + self.off_hours_signal(&stamps)
            + self.velocity_signal(&amounts, window)
            + self.behavioral_signal(&amounts)
            + self.throughput_signal(meta);
        let penalty = self.legitimacy_penalty(hub, meta, &amounts, &stamps, window);

        let score = stats::clamp_score(signals - penalty);
        if score < self.config.smurf_emit_threshold {
            return None;
        }

        let (kind, hub_in, hub_out) = match direction {
            FanDirection::In => (RingKind::FanIn, Some(hub.to_string()), None),
            FanDirection::Out => (RingKind::FanOut, None, Some(hub.to_string())),
            FanDirection::Both => (
                RingKind::FanInFanOut,
                Some(hub.to_string()),
                Some(hub.to_string()),
            ),
        };

        Some(RawRing {
            kind,
            members: self.group_members(hub, direction),
            hub_in,
            hub_out,
            time_window_hours: window,
            raw_score: score,
            cycle_length: None,
            chain_length: None,
            amount_pattern: None,
        })
    }

    /// Counterparties in sorted order, the hub appended once at the end.
    fn group_members(&self, hub: &str, direction: FanDirection) -> Vec<String> {
        let mut counterparties: BTreeSet<&str> = BTreeSet::new();
        if matches!(direction, FanDirection::In | FanDirection::Both) {
            counterparties.extend(self.graph.sender_set(hub));
        }
        if matches!(direction, FanDirection::Out | FanDirection::Both) {
            counterparties.extend(self.graph.receiver_set(hub));
        }
        let mut members: Vec<String> = counterparties
            .iter()
            .filter(|&&c| c != hub)
            .map(|c| c.to_string())
            .collect();
        members.push(hub.to_string());
        members
    }

    fn structural_signal(&self, meta: &NodeMetadata, direction: FanDirection) -> f64 {
        let fan_degree = match direction {
            FanDirection::In => meta.unique_senders,
            FanDirection::Out => meta.unique_receivers,
            FanDirection::Both => meta.unique_senders.max(meta.unique_receivers),
        };
        if fan_degree >= 30 {
            25.0
        } else if fan_degree >= 20 {
            20.0
        } else if fan_degree >= 15 {
            15.0
        } else {
            10.0
        }
    }

    fn burst_signal(&self, stamps: &[DateTime<Utc>], window: Option<f64>) -> f64 {
        let Some(window) = window else { return 0.0 };
        let n = stamps.len();
        if window < 6.0 && n >= 10 {
            return 25.0;
        }
        if window < 12.0 && n >= 10 {
            return 22.0;
        }
        let gaps = stats::inter_txn_gaps_secs(stamps);
        if let (Some(mean), Some(sd)) = (stats::mean(&gaps), stats::std_dev(&gaps)) {
            if mean > 0.0 && sd / mean < 0.3 && window < 24.0 {
                return 20.0;
            }
        }
        if window < 24.0 {
            12.0
        } else if window < 72.0 {
            6.0
        } else {
            0.0
        }
    }

    fn off_hours_signal(&self, stamps: &[DateTime<Utc>]) -> f64 {
        let fraction = stats::hour_fraction(stamps, self.config.utc_offset_hours, |h| {
            h == 23 || h <= 4
        });
        if fraction > 0.7 {
            15.0
        } else if fraction > 0.5 {
            10.0
        } else if fraction > 0.3 {
            5.0
        } else {
            0.0
        }
    }

    fn velocity_signal(&self, amounts: &[f64], window: Option<f64>) -> f64 {
        let total: f64 = amounts.iter().sum();
        let hours = window.unwrap_or(0.0).max(0.1);
        let velocity = total / hours;
        if velocity > 5_000.0 {
            20.0
        } else if velocity > 2_000.0 {
            15.0
        } else if velocity > 1_000.0 {
            10.0
        } else if velocity > 500.0 {
            5.0
        } else {
            0.0
        }
    }

    fn behavioral_signal(&self, amounts: &[f64]) -> f64 {
        let n = amounts.len() as f64;
        let mut signal: f64 = 0.0;

        let structuring_band = amounts
            .iter()
            .filter(|a| **a >= 8_000.0 && **a < 10_000.0)
            .count() as f64;
        if structuring_band / n > 0.3 {
            signal += 8.0;
        }

        if let Some(cv) = stats::coefficient_of_variation(amounts) {
            let mid_band = amounts
                .iter()
                .filter(|a| **a >= 200.0 && **a <= 3_000.0)
                .count() as f64;
            if (0.2..=0.6).contains(&cv) && mid_band / n > 0.6 {
                signal += 5.0;
            }
        }

        let odd_cents = amounts.iter().filter(|a| stats::has_nonzero_cents(**a)).count() as f64;
        if odd_cents / n > 0.7 {
            signal -= 5.0;
        }

        signal.max(0.0)
    }

    fn throughput_signal(&self, meta: &NodeMetadata) -> f64 {
        if meta.total_sent > 0.0 {
            if let Some(ratio) = meta.throughput_ratio {
                if ratio > 0.7 && ratio < 1.3 {
                    return 10.0;
                }
            }
        }
        0.0
    }

    /// Signals a legitimate high-volume actor accumulates: sustained,
    /// regular, business-hours activity with concentrated amounts, or
    /// the structural shape of a merchant or payroll hub.
    fn legitimacy_penalty(
        &self,
        hub: &str,
        meta: &NodeMetadata,
        amounts: &[f64],
        stamps: &[DateTime<Utc>],
        window: Option<f64>,
    ) -> f64 {
        let mut penalty = 0.0;

        if let Some(window) = window {
            if window > 72.0 {
                penalty += 10.0;
            }
            if window > 168.0 {
                penalty += 10.0;
            }
            if window > 720.0 {
                penalty += 15.0;
            }
        }

        let business = stats::hour_fraction(stamps, self.config.utc_offset_hours, |h| {
            (8..=18).contains(&h)
        });
        if business > 0.7 {
            penalty += 10.0;
        }

        let gaps = stats::inter_txn_gaps_secs(stamps);
        if stats::has_regular_interval(&gaps, &REGULAR_PERIODS_SECS, 0.2) {
            penalty += 15.0;
        }

        if dominant_amount_fraction(amounts) > 0.4 {
            penalty += 10.0;
        }

        let senders: HashSet<&str> = self.graph.sender_set(hub).into_iter().collect();
        let receivers: HashSet<&str> = self.graph.receiver_set(hub).into_iter().collect();
        let overlap = senders.intersection(&receivers).count();

        if meta.unique_receivers <= 5
            && meta.unique_senders >= 15
            && (overlap as f64 / meta.unique_senders.max(1) as f64) < 0.1
        {
            penalty += 15.0;
        }

        if meta.unique_senders <= 5 && meta.unique_receivers >= 10 && overlap == 0 {
            penalty += 10.0;
        }

        penalty
    }
}

/// Fraction of transactions carried by the most common rounded amount.
fn dominant_amount_fraction(amounts: &[f64]) -> f64 {
    if amounts.is_empty() {
        return 0.0;
    }
    let mut counts: std::collections::HashMap<i64, usize> = std::collections::HashMap::new();
    for amount in amounts {
        *counts.entry(amount.round() as i64).or_insert(0) += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0);
    max as f64 / amounts.len() as f64
}
