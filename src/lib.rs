//! # Mulewatch
//!
//! Money-muling detection over batches of financial transactions.
//!
//! ## Features
//!
//! - **Graph Analysis**: Forward/reverse transfer adjacency with
//!   per-account aggregates, built once per batch
//! - **Cycle Detection**: Bounded enumeration of circular fund routing
//!   (3-5 hops) with Johnson-style pruning
//! - **Smurfing Detection**: Fan-in aggregators, fan-out dispersers and
//!   combined hubs, scored with multi-signal heuristics
//! - **Shell Networks**: Layered chains through low-activity conduit
//!   accounts with amount-coherence tracing
//! - **False-Positive Filtering**: Merchant, payroll and exchange hubs
//!   recognized and suppressed before scoring
//! - **Deterministic Scoring**: Account suspicion and ring risk with
//!   stable ordering on identical input
//!
//! ## Usage
//!
//! ```no_run
//! use mulewatch::{MuleAnalyzer, Transaction};
//!
//! let transactions: Vec<Transaction> = Vec::new();
//! let analyzer = MuleAnalyzer::new();
//! let results = analyzer.analyze(&transactions).unwrap();
//! println!("{} rings", results.summary.fraud_rings_detected);
//! ```

pub mod cycles;
pub mod graph;
pub mod legitimacy;
pub mod rings;
pub mod scoring;
pub mod shells;
pub mod smurfing;
pub mod stats;

pub use cycles::{CycleDetector, CycleScan};
pub use graph::{NodeMetadata, TransactionGraph, TxnEdge};
pub use legitimacy::{FalsePositiveFilter, LegitimacyScan};
pub use rings::{AmountPattern, PatternTags, RawRing, RingKind};
pub use scoring::{FraudRing, ScoringEngine, SuspiciousAccount};
pub use shells::{ShellNetworkDetector, ShellScan};
pub use smurfing::SmurfingDetector;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

/// Minimum cycle length reported.
pub const CYCLE_MIN: usize = 3;
/// Maximum cycle length explored.
pub const CYCLE_MAX: usize = 5;
/// Global cap on enumerated cycles.
pub const CYCLE_MAX_RESULTS: usize = 500;
/// Out-degree above which a node is excluded from cycle search.
pub const CYCLE_MAX_OUT_DEGREE: usize = 30;
/// Unique counterparties required for a fan-in/fan-out candidate.
pub const FAN_THRESHOLD: usize = 10;
/// Minimum score at which a smurfing group is emitted.
pub const SMURF_EMIT_THRESHOLD: f64 = 40.0;
/// Maximum transactions for an account to qualify as a shell.
pub const SHELL_TX_THRESHOLD: usize = 3;
/// Minimum nodes in a reported shell chain, endpoints included.
pub const SHELL_MIN_NODES: usize = 4;
/// Maximum nodes in a reported shell chain, endpoints included.
pub const SHELL_MAX_NODES: usize = 7;
/// Largest hop-to-hop amount drop a chain tolerates.
pub const SHELL_MAX_DROP: f64 = 10_000.0;
/// Transaction count beyond which low pass-through dampens suspicion.
pub const FPP_TX_COUNT: usize = 50;
/// Pass-through rate below which the dampener applies.
pub const FPP_PTR: f64 = 0.3;
/// Sliding window for the velocity component of suspicion.
pub const VELOCITY_WINDOW_HOURS: f64 = 72.0;

/// Analysis failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("invalid transaction {transaction_id}: {reason}")]
    InvalidTransaction {
        transaction_id: String,
        reason: String,
    },

    #[error("graph invariant violated: {0}")]
    InvariantViolation(String),
}

/// One validated transfer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Reject records the host should have filtered: non-positive
    /// amounts, self transfers, missing endpoints.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.sender_id.is_empty() || self.receiver_id.is_empty() {
            return Err(AnalysisError::InvalidTransaction {
                transaction_id: self.transaction_id.clone(),
                reason: "missing sender or receiver".to_string(),
            });
        }
        if self.sender_id == self.receiver_id {
            return Err(AnalysisError::InvalidTransaction {
                transaction_id: self.transaction_id.clone(),
                reason: "self transfers are not permitted".to_string(),
            });
        }
        if !(self.amount > 0.0) || !self.amount.is_finite() {
            return Err(AnalysisError::InvalidTransaction {
                transaction_id: self.transaction_id.clone(),
                reason: format!("amount must be a positive number, got {}", self.amount),
            });
        }
        Ok(())
    }
}

/// Operator-tunable detection parameters.
///
/// Hour-of-day signals (off-hours, business hours) are evaluated in the
/// single fixed zone given by `utc_offset_hours`; the process-local
/// timezone is never consulted.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub cycle_min_len: usize,
    pub cycle_max_len: usize,
    pub cycle_max_results: usize,
    pub cycle_max_out_degree: usize,
    pub fan_threshold: usize,
    pub smurf_emit_threshold: f64,
    pub shell_tx_threshold: usize,
    pub shell_min_nodes: usize,
    pub shell_max_nodes: usize,
    pub shell_max_drop: f64,
    pub fpp_tx_count: usize,
    pub fpp_ptr: f64,
    pub velocity_window_hours: f64,
    pub utc_offset_hours: i32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            cycle_min_len: CYCLE_MIN,
            cycle_max_len: CYCLE_MAX,
            cycle_max_results: CYCLE_MAX_RESULTS,
            cycle_max_out_degree: CYCLE_MAX_OUT_DEGREE,
            fan_threshold: FAN_THRESHOLD,
            smurf_emit_threshold: SMURF_EMIT_THRESHOLD,
            shell_tx_threshold: SHELL_TX_THRESHOLD,
            shell_min_nodes: SHELL_MIN_NODES,
            shell_max_nodes: SHELL_MAX_NODES,
            shell_max_drop: SHELL_MAX_DROP,
            fpp_tx_count: FPP_TX_COUNT,
            fpp_ptr: FPP_PTR,
            velocity_window_hours: VELOCITY_WINDOW_HOURS,
            utc_offset_hours: 0,
        }
    }
}

/// Batch-level counters for the result snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_accounts_analyzed: usize,
    pub suspicious_accounts_flagged: usize,
    pub fraud_rings_detected: usize,
    pub processing_time_seconds: f64,
}

/// Immutable result snapshot of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResults {
    pub suspicious_accounts: Vec<SuspiciousAccount>,
    pub fraud_rings: Vec<FraudRing>,
    pub summary: AnalysisSummary,
    /// True when cycle enumeration stopped at its result cap; findings
    /// are valid but not exhaustive.
    pub cycle_scan_truncated: bool,
}

impl AnalysisResults {
    /// Export as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Money-muling batch analyzer.
///
/// A pure function from a transaction batch to a result snapshot:
/// holds no state between calls, so concurrent analyses of distinct
/// batches need no synchronization.
pub struct MuleAnalyzer {
    config: AnalyzerConfig,
}

impl MuleAnalyzer {
    /// Create an analyzer with default configuration
    pub fn new() -> Self {
        Self {
            config: AnalyzerConfig::default(),
        }
    }

    /// Create an analyzer with custom configuration
    pub fn with_config(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Run the full detection pipeline over a closed batch.
    ///
    /// Stages run in a fixed order: graph construction, cycle scan,
    /// smurfing scan, shell scan, false-positive filtering, ring
    /// merging, account scoring, ring scoring. An empty batch yields
    /// empty results.
    pub fn analyze(&self, transactions: &[Transaction]) -> Result<AnalysisResults, AnalysisError> {
        let started = Instant::now();

        for txn in transactions {
            txn.validate()?;
        }

        let graph = TransactionGraph::from_transactions(transactions);
        graph.check_invariants()?;
        tracing::info!(
            accounts = graph.account_count(),
            transactions = transactions.len(),
            "transaction graph built"
        );

        let cycle_scan = CycleDetector::new(&graph, &self.config).detect();
        let smurf_rings = SmurfingDetector::new(&graph, &self.config).detect();
        let shell_scan = ShellNetworkDetector::new(&graph, &self.config).detect();

        let mut raw_rings = cycle_scan.rings;
        raw_rings.extend(smurf_rings);
        raw_rings.extend(shell_scan.rings);
        let tags = rings::collect_pattern_tags(&raw_rings);

        let legitimacy = FalsePositiveFilter::new(&graph, &self.config).classify();
        let surviving = legitimacy.filter_rings(raw_rings);
        let merged = rings::merge_rings(surviving);

        let engine = ScoringEngine::new(&graph, &self.config);
        let suspicious_accounts = engine.score_accounts(&merged, &tags);
        let fraud_rings = engine.score_rings(&merged, &suspicious_accounts);

        tracing::info!(
            suspicious = suspicious_accounts.len(),
            rings = fraud_rings.len(),
            "analysis complete"
        );

        Ok(AnalysisResults {
            summary: AnalysisSummary {
                total_accounts_analyzed: graph.account_count(),
                suspicious_accounts_flagged: suspicious_accounts.len(),
                fraud_rings_detected: fraud_rings.len(),
                processing_time_seconds: started.elapsed().as_secs_f64(),
            },
            suspicious_accounts,
            fraud_rings,
            cycle_scan_truncated: cycle_scan.truncated,
        })
    }
}

impl Default for MuleAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
