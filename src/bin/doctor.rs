//! `dmr-doctor` — self-check tool. Seeds a disposable hot/cold tier, runs a
//! handful of contract checks against a real [`retriever::Retriever`], and
//! writes a JSON report plus a short compliance certificate.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use coldstore::{ColdRow, ColdStore};
use hotstore::{HotStoreBackend, RedbHotStore};
use index::{HotIndex, ShardConfig};
use retriever::{pack_signature, RetrievalPolicy, Retriever};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};

#[derive(Parser, Debug)]
#[command(name = "dmr-doctor", about = "Self-check for the Deterministic Memory Router")]
struct Args {
    #[arg(long, default_value = "doctor-tenant")]
    tenant_id: String,

    #[arg(long, default_value = "doctor-user")]
    user_id: String,

    #[arg(long, default_value_t = vectorizer::DIM)]
    vector_dim: usize,

    #[arg(long, default_value = "./dmr_doctor_report.json")]
    report_out: String,

    #[arg(long, default_value = "./dmr_doctor_report.md")]
    report_md: String,

    #[arg(long, default_value = "./dmr_doctor_cert.md")]
    cert_md: String,

    /// Fail the process (exit code 1) if any check fails.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Serialize)]
struct CheckResult {
    name: &'static str,
    ok: bool,
    details: serde_json::Value,
}

fn sha256_hex16(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    hex::encode(digest)[..16].to_string()
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let tmp = tempfile::tempdir()?;

    let hot_index = Arc::new(HotIndex::new(
        tmp.path().join("hot_index"),
        args.vector_dim,
        ShardConfig::default(),
    ));
    let hot_store: Arc<dyn HotStoreBackend> =
        Arc::new(RedbHotStore::open(tmp.path().join("hot.redb"))?);
    let cold_store = Arc::new(ColdStore::open(tmp.path().join("cold.redb"))?);

    let now = now_secs();
    let cold_rows: Vec<ColdRow> = (0..200)
        .map(|i| ColdRow {
            tenant_id: args.tenant_id.clone(),
            user_id: args.user_id.clone(),
            turn_id: format!("c{i}"),
            signature: sha256_hex16(&format!("cold|{i}")),
            ts: now + i as f64,
            text: format!("Human: alpha_{i} beta_{i}\nAI: ok"),
        })
        .collect();
    cold_store.put_many(&cold_rows)?;

    let policy = RetrievalPolicy {
        threshold: 0.10,
        k_final: 5,
        max_chars: 800,
        k_hot_candidates: 30,
        k_cold_candidates: 30,
        budget_ms_hot: 150.0,
        budget_ms_cold: 150.0,
    };

    let retriever = Retriever::new(hot_index, hot_store, cold_store, policy);
    for i in 0..80 {
        let text = format!("Human: pref_{i}=val_{i}\nAI: ok");
        retriever.ingest_turn(&args.tenant_id, &args.user_id, &format!("h{i}"), &text, now + i as f64)?;
    }

    let query = "alpha";
    let ev1 = retriever.retrieve(&args.tenant_id, &args.user_id, query)?;
    let ev2 = retriever.retrieve(&args.tenant_id, &args.user_id, query)?;
    let sig1 = pack_signature(&args.tenant_id, &args.user_id, query, &policy, &ev1);
    let sig2 = pack_signature(&args.tenant_id, &args.user_id, query, &policy, &ev2);

    let mut checks = Vec::new();
    checks.push(CheckResult {
        name: "strict_determinism_pre",
        ok: ev1 == ev2 && sig1 == sig2 && !ev1.is_empty(),
        details: json!({"sig1": sig1, "sig2": sig2}),
    });

    let returned_chars: usize = ev1.iter().map(|e| e.text.len()).sum();
    checks.push(CheckResult {
        name: "no_saturation_contract",
        ok: ev1.len() <= policy.k_final && returned_chars <= policy.max_chars,
        details: json!({
            "k_final": policy.k_final,
            "returned_k": ev1.len(),
            "max_chars": policy.max_chars,
            "returned_chars": returned_chars,
        }),
    });

    let cold_hits = ev1.iter().filter(|e| e.source == retriever::Source::Cold).count();
    checks.push(CheckResult {
        name: "cold_storage_consultable",
        ok: cold_hits > 0,
        details: json!({"cold_hits": cold_hits}),
    });

    let ok_all = checks.iter().all(|c| c.ok);
    let summary = json!({
        "dmr_version": env!("CARGO_PKG_VERSION"),
        "ok": ok_all,
    });
    let report = json!({
        "summary": summary,
        "checks": checks,
    });
    let report_signature = sha256_hex16(&serde_json::to_string(&report)?);

    let report = json!({
        "summary": {
            "dmr_version": env!("CARGO_PKG_VERSION"),
            "ok": ok_all,
            "report_signature": report_signature,
        },
        "checks": checks,
    });

    std::fs::write(&args.report_out, serde_json::to_string_pretty(&report)?)?;
    std::fs::write(
        &args.report_md,
        format!(
            "# DMR Doctor Report\n\n```json\n{}\n```\n",
            serde_json::to_string_pretty(&report)?
        ),
    )?;
    std::fs::write(
        &args.cert_md,
        format!(
            "# DMR Compliance Certificate\n\n- Overall: {}\n- Signature: `{}`\n",
            if ok_all { "PASS" } else { "FAIL" },
            report_signature,
        ),
    )?;

    if !ok_all && args.strict {
        std::process::exit(1);
    }
    Ok(())
}
