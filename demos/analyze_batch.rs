//! Batch analysis example
//!
//! This example demonstrates money-muling detection over a mixed batch:
//! a tight laundering cycle, a shell chain, and a legitimate merchant
//! that must not be flagged.

use chrono::{Duration, TimeZone, Utc};
use mulewatch::{MuleAnalyzer, Transaction};

fn txn(id: &str, from: &str, to: &str, amount: f64, ts: chrono::DateTime<Utc>) -> Transaction {
    Transaction {
        transaction_id: id.to_string(),
        sender_id: from.to_string(),
        receiver_id: to.to_string(),
        amount,
        timestamp: ts,
    }
}

fn main() {
    println!("=== Money-Muling Batch Analyzer ===\n");

    let start = Utc.with_ymd_and_hms(2026, 1, 6, 10, 0, 0).unwrap();
    let mut batch = Vec::new();

    // A three-hop laundering cycle, two hours end to end.
    batch.push(txn("CYC-001", "ACC-ALPHA", "ACC-BRAVO", 10_000.0, start));
    batch.push(txn(
        "CYC-002",
        "ACC-BRAVO",
        "ACC-CHARLIE",
        9_900.0,
        start + Duration::hours(1),
    ));
    batch.push(txn(
        "CYC-003",
        "ACC-CHARLIE",
        "ACC-ALPHA",
        9_800.0,
        start + Duration::hours(2),
    ));

    // A pass-through shell chain moving a large sum in minutes.
    batch.push(txn("SHL-001", "ORIGIN", "SHELL-1", 150_000.0, start));
    batch.push(txn(
        "SHL-002",
        "SHELL-1",
        "SHELL-2",
        150_000.0,
        start + Duration::minutes(9),
    ));
    batch.push(txn(
        "SHL-003",
        "SHELL-2",
        "SHELL-3",
        150_000.0,
        start + Duration::minutes(17),
    ));
    batch.push(txn(
        "SHL-004",
        "SHELL-3",
        "EXIT",
        150_000.0,
        start + Duration::minutes(26),
    ));

    // A merchant trap: forty customers paying varied daytime amounts
    // over ten days. The filter must keep it out of the results.
    for i in 0..40i64 {
        batch.push(txn(
            &format!("MRC-{i:03}"),
            &format!("CUSTOMER-{i:02}"),
            "CORNER-STORE",
            5.0 + 12.5 * i as f64,
            start + Duration::days(i / 4) + Duration::hours(2 * (i % 4)),
        ));
    }

    let analyzer = MuleAnalyzer::new();
    let results = match analyzer.analyze(&batch) {
        Ok(results) => results,
        Err(err) => {
            eprintln!("analysis failed: {err}");
            return;
        }
    };

    println!("Accounts analyzed: {}", results.summary.total_accounts_analyzed);
    println!("Fraud rings:       {}", results.summary.fraud_rings_detected);
    println!(
        "Suspicious:        {}\n",
        results.summary.suspicious_accounts_flagged
    );

    println!("--- Fraud Rings ---");
    for ring in &results.fraud_rings {
        println!(
            "{} [{}] risk {} ({}) members: {}",
            ring.ring_id,
            ring.pattern_type,
            ring.risk_score,
            ring.risk_label,
            ring.member_accounts.join(", ")
        );
    }
    println!();

    println!("--- Suspicious Accounts ---");
    for account in &results.suspicious_accounts {
        println!(
            "{:<14} score {:>5} ({}) patterns: {}",
            account.account_id,
            account.suspicion_score,
            account.suspicion_label,
            account.detected_patterns.join(", ")
        );
    }
    println!();

    let merchant_flagged = results
        .suspicious_accounts
        .iter()
        .any(|a| a.account_id == "CORNER-STORE");
    println!(
        "CORNER-STORE flagged: {} (expected: false)",
        merchant_flagged
    );
}
