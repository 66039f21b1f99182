//! Transaction graph construction and per-account aggregates.
//!
//! The graph is the only shared structure of the pipeline: built once
//! from the input batch, read-only for every detector afterwards.

use crate::{AnalysisError, Transaction};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashSet};

/// One directed transfer edge. Forward edges store the receiver as
/// counterparty, reverse edges the sender.
#[derive(Debug, Clone, PartialEq)]
pub struct TxnEdge {
    pub counterparty: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub transaction_id: String,
}

/// Derived per-account aggregates, immutable after construction.
#[derive(Debug, Clone, Default)]
pub struct NodeMetadata {
    pub total_sent: f64,
    pub total_received: f64,
    pub in_degree: usize,
    pub out_degree: usize,
    pub unique_senders: usize,
    pub unique_receivers: usize,
    pub tx_count: usize,
    /// Every timestamp the account participated in, sorted ascending,
    /// with multiplicity.
    pub all_timestamps: Vec<DateTime<Utc>>,
    /// Minimum gap between consecutive timestamps; unset with fewer
    /// than two.
    pub min_time_delta: Option<Duration>,
    /// total_sent / total_received; unset when nothing was received.
    pub throughput_ratio: Option<f64>,
}

/// Directed weighted multigraph over account identifiers.
///
/// BTreeMap keys give deterministic lexicographic iteration, which the
/// cycle detector's seed order and the output determinism law rely on.
#[derive(Debug, Clone, Default)]
pub struct TransactionGraph {
    outgoing: BTreeMap<String, Vec<TxnEdge>>,
    incoming: BTreeMap<String, Vec<TxnEdge>>,
    metadata: BTreeMap<String, NodeMetadata>,
}

impl TransactionGraph {
    /// Build the graph from an ordered transaction batch.
    ///
    /// Edge insertion order follows input order; metadata is computed in
    /// a single pass after ingestion.
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let mut graph = TransactionGraph::default();
        for txn in transactions {
            graph.add_transaction(txn);
        }
        graph.compute_metadata();
        graph
    }

    fn add_transaction(&mut self, txn: &Transaction) {
        self.outgoing
            .entry(txn.sender_id.clone())
            .or_default()
            .push(TxnEdge {
                counterparty: txn.receiver_id.clone(),
                amount: txn.amount,
                timestamp: txn.timestamp,
                transaction_id: txn.transaction_id.clone(),
            });
        self.incoming
            .entry(txn.receiver_id.clone())
            .or_default()
            .push(TxnEdge {
                counterparty: txn.sender_id.clone(),
                amount: txn.amount,
                timestamp: txn.timestamp,
                transaction_id: txn.transaction_id.clone(),
            });
        // Both endpoints must exist in both maps, even with no edges.
        self.outgoing.entry(txn.receiver_id.clone()).or_default();
        self.incoming.entry(txn.sender_id.clone()).or_default();
    }

    fn compute_metadata(&mut self) {
        let mut metadata = BTreeMap::new();
        for account in self.outgoing.keys() {
            let out_edges = &self.outgoing[account];
            let in_edges = self.incoming.get(account).map(Vec::as_slice).unwrap_or(&[]);

            let total_sent: f64 = out_edges.iter().map(|e| e.amount).sum();
            let total_received: f64 = in_edges.iter().map(|e| e.amount).sum();

            let unique_receivers = out_edges
                .iter()
                .map(|e| e.counterparty.as_str())
                .collect::<HashSet<_>>()
                .len();
            let unique_senders = in_edges
                .iter()
                .map(|e| e.counterparty.as_str())
                .collect::<HashSet<_>>()
                .len();

            let mut all_timestamps: Vec<DateTime<Utc>> = out_edges
                .iter()
                .chain(in_edges.iter())
                .map(|e| e.timestamp)
                .collect();
            all_timestamps.sort();

            let min_time_delta = all_timestamps
                .windows(2)
                .map(|w| w[1] - w[0])
                .min();

            let throughput_ratio = if total_received > 0.0 {
                Some(total_sent / total_received)
            } else {
                None
            };

            metadata.insert(
                account.clone(),
                NodeMetadata {
                    total_sent,
                    total_received,
                    in_degree: in_edges.len(),
                    out_degree: out_edges.len(),
                    unique_senders,
                    unique_receivers,
                    tx_count: in_edges.len() + out_edges.len(),
                    all_timestamps,
                    min_time_delta,
                    throughput_ratio,
                },
            );
        }
        self.metadata = metadata;
    }

    /// Out-edges of an account, in insertion order.
    pub fn out_edges(&self, account: &str) -> &[TxnEdge] {
        self.outgoing.get(account).map(Vec::as_slice).unwrap_or(&[])
    }

    /// In-edges of an account, in insertion order.
    pub fn in_edges(&self, account: &str) -> &[TxnEdge] {
        self.incoming.get(account).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Aggregates for an account, if it appears in the batch.
    pub fn metadata(&self, account: &str) -> Option<&NodeMetadata> {
        self.metadata.get(account)
    }

    /// All accounts in lexicographic order.
    pub fn accounts(&self) -> impl Iterator<Item = &String> {
        self.outgoing.keys()
    }

    /// Number of accounts in the graph.
    pub fn account_count(&self) -> usize {
        self.outgoing.len()
    }

    /// Distinct counterparties that sent to `account`, sorted.
    pub fn sender_set(&self, account: &str) -> Vec<&str> {
        let mut senders: Vec<&str> = self
            .in_edges(account)
            .iter()
            .map(|e| e.counterparty.as_str())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        senders.sort_unstable();
        senders
    }

    /// Distinct counterparties that received from `account`, sorted.
    pub fn receiver_set(&self, account: &str) -> Vec<&str> {
        let mut receivers: Vec<&str> = self
            .out_edges(account)
            .iter()
            .map(|e| e.counterparty.as_str())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        receivers.sort_unstable();
        receivers
    }

    /// Fail-fast structural validation.
    ///
    /// A missing metadata or adjacency entry is a construction bug, not
    /// an input problem; the pipeline must not continue past one.
    pub fn check_invariants(&self) -> Result<(), AnalysisError> {
        for account in self.outgoing.keys() {
            if !self.incoming.contains_key(account) {
                return Err(AnalysisError::InvariantViolation(format!(
                    "account {account} missing from reverse adjacency"
                )));
            }
            let meta = self.metadata.get(account).ok_or_else(|| {
                AnalysisError::InvariantViolation(format!(
                    "account {account} missing from metadata"
                ))
            })?;
            let in_degree = self.in_edges(account).len();
            let out_degree = self.out_edges(account).len();
            if meta.tx_count != in_degree + out_degree {
                return Err(AnalysisError::InvariantViolation(format!(
                    "account {account}: tx_count {} != in {} + out {}",
                    meta.tx_count, in_degree, out_degree
                )));
            }
        }
        for account in self.incoming.keys() {
            if !self.outgoing.contains_key(account) {
                return Err(AnalysisError::InvariantViolation(format!(
                    "account {account} missing from forward adjacency"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn txn(id: &str, from: &str, to: &str, amount: f64, hour: u32, min: u32) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            sender_id: from.to_string(),
            receiver_id: to.to_string(),
            amount,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 6, hour, min, 0).unwrap(),
        }
    }

    #[test]
    fn test_endpoints_exist_everywhere() {
        let graph = TransactionGraph::from_transactions(&[txn("T1", "A", "B", 100.0, 10, 0)]);

        for account in ["A", "B"] {
            assert!(graph.metadata(account).is_some());
        }
        assert_eq!(graph.out_edges("B").len(), 0);
        assert_eq!(graph.in_edges("A").len(), 0);
        assert!(graph.check_invariants().is_ok());
    }

    #[test]
    fn test_metadata_totals() {
        let graph = TransactionGraph::from_transactions(&[
            txn("T1", "A", "B", 100.0, 10, 0),
            txn("T2", "A", "B", 50.0, 11, 0),
            txn("T3", "B", "C", 120.0, 12, 0),
        ]);

        let a = graph.metadata("A").unwrap();
        assert_eq!(a.total_sent, 150.0);
        assert_eq!(a.total_received, 0.0);
        assert_eq!(a.out_degree, 2);
        assert_eq!(a.unique_receivers, 1);
        assert_eq!(a.tx_count, 2);
        assert!(a.throughput_ratio.is_none());

        let b = graph.metadata("B").unwrap();
        assert_eq!(b.in_degree, 2);
        assert_eq!(b.out_degree, 1);
        assert_eq!(b.tx_count, 3);
        assert_eq!(b.unique_senders, 1);
        let ratio = b.throughput_ratio.unwrap();
        assert!((ratio - 120.0 / 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_multigraph_edges_preserved() {
        let graph = TransactionGraph::from_transactions(&[
            txn("T1", "A", "B", 100.0, 10, 0),
            txn("T2", "A", "B", 100.0, 10, 0),
        ]);
        assert_eq!(graph.out_edges("A").len(), 2);
        assert_eq!(graph.metadata("B").unwrap().in_degree, 2);
    }

    #[test]
    fn test_timestamps_sorted_with_min_delta() {
        let graph = TransactionGraph::from_transactions(&[
            txn("T1", "A", "B", 10.0, 14, 0),
            txn("T2", "C", "A", 20.0, 10, 0),
            txn("T3", "A", "D", 30.0, 10, 30),
        ]);
        let a = graph.metadata("A").unwrap();
        assert_eq!(a.all_timestamps.len(), 3);
        assert!(a.all_timestamps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(a.min_time_delta, Some(Duration::minutes(30)));
    }

    #[test]
    fn test_min_delta_unset_for_single_txn() {
        let graph = TransactionGraph::from_transactions(&[txn("T1", "A", "B", 10.0, 10, 0)]);
        assert!(graph.metadata("A").unwrap().min_time_delta.is_none());
    }

    #[test]
    fn test_accounts_iterate_lexicographically() {
        let graph = TransactionGraph::from_transactions(&[
            txn("T1", "ZED", "ALFA", 10.0, 10, 0),
            txn("T2", "MID", "ALFA", 10.0, 10, 0),
        ]);
        let order: Vec<&String> = graph.accounts().collect();
        assert_eq!(order, ["ALFA", "MID", "ZED"]);
    }

    #[test]
    fn test_counterparty_sets_sorted() {
        let graph = TransactionGraph::from_transactions(&[
            txn("T1", "S2", "HUB", 10.0, 10, 0),
            txn("T2", "S1", "HUB", 10.0, 10, 5),
            txn("T3", "S2", "HUB", 10.0, 10, 10),
        ]);
        assert_eq!(graph.sender_set("HUB"), ["S1", "S2"]);
        assert_eq!(graph.metadata("HUB").unwrap().unique_senders, 2);
    }
}
