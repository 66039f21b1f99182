//! Legitimate-hub classification and false-positive suppression.
//!
//! High-volume actors look structurally identical to muling hubs:
//! merchants aggregate like smurf collectors, payroll runs disperse
//! like smurf distributors, exchanges do both. This filter classifies
//! them before rings are finalized and strips them (and their obvious
//! counterparties) from the results.

use crate::graph::{NodeMetadata, TransactionGraph, TxnEdge};
use crate::rings::RawRing;
use crate::stats;
use crate::AnalyzerConfig;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

const SECONDS_PER_DAY: f64 = 86_400.0;

const PAYROLL_PERIODS_SECS: [f64; 4] = [
    SECONDS_PER_DAY,
    7.0 * SECONDS_PER_DAY,
    14.0 * SECONDS_PER_DAY,
    30.0 * SECONDS_PER_DAY,
];

/// Classification outcome: accounts to suppress individually, and hubs
/// whose rings are discarded wholesale.
#[derive(Debug, Clone, Default)]
pub struct LegitimacyScan {
    pub legitimate_accounts: BTreeSet<String>,
    pub legitimate_hubs: BTreeSet<String>,
}

impl LegitimacyScan {
    pub fn is_legitimate(&self, account: &str) -> bool {
        self.legitimate_accounts.contains(account)
    }

    /// Apply the filter to raw rings.
    ///
    /// Rings centered on (or containing) a legitimate hub are dropped
    /// entirely; legitimate counterparties are only stripped from
    /// membership, discarding the ring if fewer than three members
    /// remain.
    pub fn filter_rings(&self, rings: Vec<RawRing>) -> Vec<RawRing> {
        rings
            .into_iter()
            .filter_map(|mut ring| {
                let hub_legit = ring
                    .hub_in
                    .iter()
                    .chain(ring.hub_out.iter())
                    .any(|hub| self.legitimate_hubs.contains(hub));
                if hub_legit {
                    return None;
                }
                if ring
                    .members
                    .iter()
                    .any(|m| self.legitimate_hubs.contains(m))
                {
                    return None;
                }
                ring.members.retain(|m| !self.legitimate_accounts.contains(m));
                if ring.members.len() < 3 {
                    return None;
                }
                Some(ring)
            })
            .collect()
    }
}

/// Pre-ring scan for merchants, payroll sources and exchanges.
pub struct FalsePositiveFilter<'a> {
    graph: &'a TransactionGraph,
    config: &'a AnalyzerConfig,
}

impl<'a> FalsePositiveFilter<'a> {
    pub fn new(graph: &'a TransactionGraph, config: &'a AnalyzerConfig) -> Self {
        Self { graph, config }
    }

    pub fn classify(&self) -> LegitimacyScan {
        let mut scan = LegitimacyScan::default();

        for account in self.graph.accounts() {
            let Some(meta) = self.graph.metadata(account) else {
                continue;
            };
            if self.is_merchant(account, meta)
                || self.is_payroll(account, meta)
                || self.is_exchange(account, meta)
            {
                scan.legitimate_hubs.insert(account.clone());
                scan.legitimate_accounts.insert(account.clone());
            }
        }

        // Counterparties living almost entirely off a legitimate hub
        // are themselves legitimate; they suppress individual accounts
        // only, never whole rings.
        let hubs: Vec<String> = scan.legitimate_hubs.iter().cloned().collect();
        for hub in &hubs {
            let mut neighbors: BTreeSet<&str> = BTreeSet::new();
            neighbors.extend(self.graph.sender_set(hub));
            neighbors.extend(self.graph.receiver_set(hub));
            for neighbor in neighbors {
                let Some(meta) = self.graph.metadata(neighbor) else {
                    continue;
                };
                if meta.tx_count > 5 {
                    continue;
                }
                let with_hub = self.interactions_with(neighbor, hub);
                if with_hub as f64 > 0.5 * meta.tx_count as f64 || meta.tx_count <= 3 {
                    scan.legitimate_accounts.insert(neighbor.to_string());
                }
            }
        }

        tracing::debug!(
            hubs = scan.legitimate_hubs.len(),
            accounts = scan.legitimate_accounts.len(),
            "legitimacy scan complete"
        );
        scan
    }

    fn interactions_with(&self, account: &str, hub: &str) -> usize {
        self.graph
            .in_edges(account)
            .iter()
            .chain(self.graph.out_edges(account).iter())
            .filter(|e| e.counterparty == hub)
            .count()
    }

    fn counterparty_overlap(&self, account: &str) -> usize {
        let senders: HashSet<&str> = self.graph.sender_set(account).into_iter().collect();
        let receivers: HashSet<&str> = self.graph.receiver_set(account).into_iter().collect();
        senders.intersection(&receivers).count()
    }

    /// Merchant: broad one-directional inflow with organic amounts and
    /// daytime rhythm.
    fn is_merchant(&self, account: &str, meta: &NodeMetadata) -> bool {
        if meta.unique_senders < 10 || meta.unique_receivers > 5 {
            return false;
        }
        let overlap = self.counterparty_overlap(account);
        if overlap as f64 / meta.unique_senders.max(1) as f64 >= 0.2 {
            return false;
        }

        let in_edges = self.graph.in_edges(account);
        let amounts: Vec<f64> = in_edges.iter().map(|e| e.amount).collect();
        let mut stamps: Vec<DateTime<Utc>> = in_edges.iter().map(|e| e.timestamp).collect();
        stamps.sort();
        let window = stats::span_hours(&stamps);

        let mut points = 0.0;
        if let Some(cv) = stats::coefficient_of_variation(&amounts) {
            if cv > 0.4 {
                points += 20.0;
            }
        }
        if let Some(window) = window {
            if window > 168.0 {
                points += 25.0;
            } else if window > 72.0 {
                points += 15.0;
            }
        }
        let business = stats::hour_fraction(&stamps, self.config.utc_offset_hours, |h| {
            (8..=20).contains(&h)
        });
        if business > 0.6 {
            points += 20.0;
        }
        let gaps = stats::inter_txn_gaps_secs(&stamps);
        if let Some(gap_cv) = stats::coefficient_of_variation(&gaps) {
            if gap_cv < 0.8 {
                points += 15.0;
            }
        }
        if let Some(window) = window {
            if window > 0.0 && meta.total_received / window < 500.0 {
                points += 10.0;
            }
        }

        points >= 40.0
    }

    /// Payroll: few funding sources fanning out clustered amounts on a
    /// schedule, with zero counterparty overlap.
    fn is_payroll(&self, account: &str, meta: &NodeMetadata) -> bool {
        if meta.unique_receivers < 10 || meta.unique_senders > 5 || meta.out_degree < 10 {
            return false;
        }
        if self.counterparty_overlap(account) != 0 {
            return false;
        }

        let out_edges = self.graph.out_edges(account);
        let amounts: Vec<f64> = out_edges.iter().map(|e| e.amount).collect();
        let mut stamps: Vec<DateTime<Utc>> = out_edges.iter().map(|e| e.timestamp).collect();
        stamps.sort();

        let mut points = 0.0;
        if largest_amount_cluster(&amounts) as f64 / out_edges.len() as f64 > 0.3 {
            points += 20.0;
        }
        let odd_cents = amounts
            .iter()
            .filter(|a| stats::has_nonzero_cents(**a))
            .count() as f64;
        if odd_cents / amounts.len() as f64 > 0.5 {
            points += 15.0;
        }
        if repeat_receiver_fraction(out_edges) >= 0.4 {
            points += 15.0;
        }
        let gaps = stats::inter_txn_gaps_secs(&stamps);
        if stats::has_regular_interval(&gaps, &PAYROLL_PERIODS_SECS, 0.25) {
            points += 20.0;
        }
        let business = stats::hour_fraction(&stamps, self.config.utc_offset_hours, |h| {
            (8..=18).contains(&h)
        });
        if business > 0.7 {
            points += 10.0;
        }
        if let Some(window) = stats::span_hours(&stamps) {
            if window > 168.0 {
                points += 15.0;
            } else if window > 72.0 {
                points += 10.0;
            }
        }

        points >= 40.0
    }

    /// Exchange or platform: heavy flow on both sides, near-disjoint
    /// counterparty populations, sustained activity.
    fn is_exchange(&self, account: &str, meta: &NodeMetadata) -> bool {
        if meta.unique_senders < 20 || meta.unique_receivers < 20 {
            return false;
        }
        let overlap = self.counterparty_overlap(account);
        let denom = meta.unique_senders.max(meta.unique_receivers).max(1);
        if overlap as f64 / denom as f64 >= 0.15 {
            return false;
        }
        stats::span_hours(&meta.all_timestamps)
            .map(|span| span > 48.0)
            .unwrap_or(false)
    }
}

/// Size of the largest group of amounts within 10% of the group's
/// smallest value, over the sorted series.
fn largest_amount_cluster(amounts: &[f64]) -> usize {
    if amounts.is_empty() {
        return 0;
    }
    let mut sorted = amounts.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut best = 1;
    let mut group_start = sorted[0];
    let mut group_len = 1;
    for amount in &sorted[1..] {
        if *amount <= group_start * 1.10 {
            group_len += 1;
        } else {
            group_start = *amount;
            group_len = 1;
        }
        best = best.max(group_len);
    }
    best
}

/// Fraction of distinct receivers paid at least twice.
fn repeat_receiver_fraction(out_edges: &[TxnEdge]) -> f64 {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for edge in out_edges {
        *counts.entry(edge.counterparty.as_str()).or_insert(0) += 1;
    }
    if counts.is_empty() {
        return 0.0;
    }
    let repeats = counts.values().filter(|c| **c >= 2).count();
    repeats as f64 / counts.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rings::RingKind;
    use crate::Transaction;
    use chrono::{Duration, TimeZone};

    fn txn(id: &str, from: &str, to: &str, amount: f64, ts: DateTime<Utc>) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            sender_id: from.to_string(),
            receiver_id: to.to_string(),
            amount,
            timestamp: ts,
        }
    }

    fn classify(transactions: &[Transaction]) -> LegitimacyScan {
        let graph = TransactionGraph::from_transactions(transactions);
        let config = AnalyzerConfig::default();
        FalsePositiveFilter::new(&graph, &config).classify()
    }

    /// Forty customers paying a merchant varied daytime amounts across
    /// ten days.
    fn merchant_batch() -> Vec<Transaction> {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        (0..40)
            .map(|i| {
                let ts = start + Duration::days(i / 4) + Duration::hours(2 * (i % 4));
                txn(
                    &format!("M{i:02}"),
                    &format!("CUST{i:02}"),
                    "MERCHANT",
                    5.0 + 12.5 * i as f64,
                    ts,
                )
            })
            .collect()
    }

    #[test]
    fn test_merchant_classified() {
        let scan = classify(&merchant_batch());
        assert!(scan.legitimate_hubs.contains("MERCHANT"));
        assert!(scan.is_legitimate("MERCHANT"));
    }

    #[test]
    fn test_merchant_customers_swept() {
        let scan = classify(&merchant_batch());
        // Single-transaction customers live entirely off the hub.
        assert!(scan.is_legitimate("CUST00"));
        assert!(scan.is_legitimate("CUST39"));
        assert!(!scan.legitimate_hubs.contains("CUST00"));
    }

    /// One funding source, twenty-five salaried receivers, three
    /// monthly runs of an odd-cents amount.
    fn payroll_batch() -> Vec<Transaction> {
        let mut batch = Vec::new();
        for month in 0..3i64 {
            let run = Utc.with_ymd_and_hms(2026, 1, 2, 10, 0, 0).unwrap()
                + Duration::days(30 * month);
            batch.push(txn(
                &format!("F{month}"),
                "TREASURY",
                "PAYROLL",
                60_308.25,
                run - Duration::hours(2),
            ));
            for emp in 0..25 {
                batch.push(txn(
                    &format!("P{month}_{emp:02}"),
                    "PAYROLL",
                    &format!("EMP{emp:02}"),
                    2_412.33,
                    run + Duration::minutes(emp),
                ));
            }
        }
        batch
    }

    #[test]
    fn test_payroll_classified() {
        let scan = classify(&payroll_batch());
        assert!(scan.legitimate_hubs.contains("PAYROLL"));
    }

    #[test]
    fn test_exchange_classified() {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        let mut batch = Vec::new();
        for i in 0..20 {
            batch.push(txn(
                &format!("D{i:02}"),
                &format!("DEP{i:02}"),
                "EXCHANGE",
                1_000.0 + i as f64,
                start + Duration::hours(3 * i as i64),
            ));
            batch.push(txn(
                &format!("W{i:02}"),
                "EXCHANGE",
                &format!("WDR{i:02}"),
                990.0 + i as f64,
                start + Duration::hours(3 * i as i64 + 1),
            ));
        }
        let scan = classify(&batch);
        assert!(scan.legitimate_hubs.contains("EXCHANGE"));
    }

    #[test]
    fn test_exchange_needs_disjoint_counterparties() {
        // Same population on both sides: overlap disqualifies.
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        let mut batch = Vec::new();
        for i in 0..20 {
            batch.push(txn(
                &format!("D{i:02}"),
                &format!("ACC{i:02}"),
                "CAROUSEL",
                1_000.0,
                start + Duration::hours(3 * i as i64),
            ));
            batch.push(txn(
                &format!("W{i:02}"),
                "CAROUSEL",
                &format!("ACC{i:02}"),
                990.0,
                start + Duration::hours(3 * i as i64 + 1),
            ));
        }
        let scan = classify(&batch);
        assert!(!scan.legitimate_hubs.contains("CAROUSEL"));
    }

    #[test]
    fn test_mule_hub_not_classified() {
        // A night-time burst aggregator must stay suspicious.
        let start = Utc.with_ymd_and_hms(2026, 1, 6, 23, 0, 0).unwrap();
        let batch: Vec<Transaction> = (0..12)
            .map(|i| {
                txn(
                    &format!("T{i:02}"),
                    &format!("S{i:02}"),
                    "HUB",
                    9_500.0,
                    start + Duration::minutes(20 * i),
                )
            })
            .collect();
        let scan = classify(&batch);
        assert!(scan.legitimate_hubs.is_empty());
        assert!(scan.legitimate_accounts.is_empty());
    }

    fn ring(kind: RingKind, members: &[&str], hub_in: Option<&str>) -> RawRing {
        RawRing {
            kind,
            members: members.iter().map(|m| m.to_string()).collect(),
            hub_in: hub_in.map(|h| h.to_string()),
            hub_out: None,
            time_window_hours: None,
            raw_score: 60.0,
            cycle_length: None,
            chain_length: None,
            amount_pattern: None,
        }
    }

    #[test]
    fn test_ring_with_legitimate_hub_discarded() {
        let mut scan = LegitimacyScan::default();
        scan.legitimate_hubs.insert("MERCHANT".to_string());
        scan.legitimate_accounts.insert("MERCHANT".to_string());

        let rings = scan.filter_rings(vec![
            ring(
                RingKind::FanIn,
                &["A", "B", "C", "MERCHANT"],
                Some("MERCHANT"),
            ),
            ring(RingKind::Cycle, &["X", "Y", "Z"], None),
        ]);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].kind, RingKind::Cycle);
    }

    #[test]
    fn test_ring_containing_hub_member_discarded() {
        let mut scan = LegitimacyScan::default();
        scan.legitimate_hubs.insert("EXCHANGE".to_string());

        let rings = scan.filter_rings(vec![ring(
            RingKind::Cycle,
            &["A", "B", "EXCHANGE"],
            None,
        )]);
        assert!(rings.is_empty());
    }

    #[test]
    fn test_stripped_ring_below_minimum_discarded() {
        let mut scan = LegitimacyScan::default();
        scan.legitimate_accounts.insert("C1".to_string());
        scan.legitimate_accounts.insert("C2".to_string());

        let kept = scan.filter_rings(vec![ring(
            RingKind::FanIn,
            &["C1", "C2", "S1", "S2", "H"],
            Some("H"),
        )]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].members, ["S1", "S2", "H"]);

        let dropped = scan.filter_rings(vec![ring(
            RingKind::FanIn,
            &["C1", "C2", "S1", "H"],
            Some("H"),
        )]);
        assert!(dropped.is_empty());
    }
}
