//! Signal export: JSON report, CSV signal tape, plain-text summary.
//!
//! The JSON report carries a `schema_version`; newer versions are rejected on
//! load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bhavlab_core::domain::{InstrumentClass, Provenance};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::pipeline::{PreviousData, RunOutput};
use crate::signal::{Action, Confidence, Setup, Signal};

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

/// Persisted form of a run's signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub session_date: NaiveDate,
    pub previous: PreviousData,
    pub record_count: usize,
    pub provenance: Option<Provenance>,
    pub signals: Vec<Signal>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl SignalReport {
    pub fn from_run(output: &RunOutput) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            session_date: output.snapshot.session_date,
            previous: output.previous,
            record_count: output.snapshot.len(),
            provenance: output.snapshot.provenance.clone(),
            signals: output.signals.clone(),
        }
    }

    /// Keep only signals matching `keep`.
    pub fn retain(&mut self, keep: impl Fn(&Signal) -> bool) {
        self.signals.retain(|s| keep(s));
    }

    pub fn futures_only(mut self) -> Self {
        self.retain(|s| s.class == InstrumentClass::Future);
        self
    }

    /// Non-HOLD signals ordered by absolute price return, largest first.
    pub fn top_movers(&self, n: usize) -> Vec<&Signal> {
        let mut movers: Vec<&Signal> = self
            .signals
            .iter()
            .filter(|s| s.action != Action::Hold)
            .collect();
        movers.sort_by(|a, b| {
            b.features
                .price_return_pct
                .abs()
                .total_cmp(&a.features.price_return_pct.abs())
        });
        movers.truncate(n);
        movers
    }
}

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_json(report: &SignalReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize SignalReport to JSON")
}

pub fn import_json(json: &str) -> Result<SignalReport> {
    let report: SignalReport =
        serde_json::from_str(json).context("failed to deserialize SignalReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV ────────────────────────────────────────────────────────────

/// Columns: symbol, instrument_type, expiry, strike, option_type, class,
/// signal, confidence, setup, price_return_pct, oi_change_pct, momentum,
/// volume_spike, last_price, open_interest, has_history
pub fn export_signals_csv(signals: &[Signal]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "symbol",
        "instrument_type",
        "expiry",
        "strike",
        "option_type",
        "class",
        "signal",
        "confidence",
        "setup",
        "price_return_pct",
        "oi_change_pct",
        "momentum",
        "volume_spike",
        "last_price",
        "open_interest",
        "has_history",
    ])?;

    let opt = |v: Option<f64>, places: usize| v.map(|x| format!("{x:.places$}")).unwrap_or_default();

    let text = |v: &Option<String>| v.clone().unwrap_or_default();

    for s in signals {
        let k = &s.key;
        wtr.write_record([
            text(&k.symbol),
            text(&k.instrument_type),
            text(&k.expiry),
            opt(k.strike_price(), 2),
            text(&k.option_type),
            format!("{:?}", s.class),
            s.label.clone(),
            s.confidence.map(|c| c.to_string()).unwrap_or_default(),
            s.setup.to_string(),
            format!("{:.4}", s.features.price_return_pct),
            format!("{:.4}", s.features.oi_change_pct),
            s.features.momentum.to_string(),
            opt(s.features.volume_spike, 4),
            opt(s.last_price, 2),
            opt(s.open_interest, 0),
            s.has_history.to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Text summary ───────────────────────────────────────────────────

/// Counts by action, setup and confidence, then the top `top` movers.
pub fn render_summary(report: &SignalReport, top: usize) -> String {
    let mut out = String::with_capacity(1024);

    out.push_str("NSE F&O SIGNAL SUMMARY\n");
    out.push_str(&"=".repeat(60));
    out.push('\n');
    out.push_str(&format!("Session:          {}\n", report.session_date));
    match report.previous {
        PreviousData::Available(date) => out.push_str(&format!("Previous session: {date}\n")),
        PreviousData::Unavailable => out.push_str("Previous session: none stored (reported changes used)\n"),
    }
    if let Some(p) = &report.provenance {
        out.push_str(&format!("Source:           {}\n", p.url));
        out.push_str(&format!("Decoded as:       {} / {}\n", p.encoding, p.strategy));
    }
    out.push_str(&format!(
        "Contracts:        {} ({} signalled)\n\n",
        report.record_count,
        report.signals.len()
    ));

    let mut by_action: BTreeMap<Action, (usize, &str)> = BTreeMap::new();
    let mut by_setup: BTreeMap<Setup, usize> = BTreeMap::new();
    let mut by_confidence: BTreeMap<Confidence, usize> = BTreeMap::new();
    for s in &report.signals {
        by_action.entry(s.action).or_insert((0, s.label.as_str())).0 += 1;
        *by_setup.entry(s.setup).or_default() += 1;
        if let Some(c) = s.confidence {
            *by_confidence.entry(c).or_default() += 1;
        }
    }

    out.push_str("By signal:\n");
    for (count, label) in by_action.values() {
        out.push_str(&format!("  {label:<10} {count}\n"));
    }
    out.push_str("By setup:\n");
    for (setup, count) in &by_setup {
        out.push_str(&format!("  {:<16} {count}\n", setup.to_string()));
    }
    if !by_confidence.is_empty() {
        out.push_str("By confidence:\n");
        for (confidence, count) in &by_confidence {
            out.push_str(&format!("  {:<10} {count}\n", confidence.to_string()));
        }
    }

    let movers = report.top_movers(top);
    if !movers.is_empty() {
        out.push_str(&format!("\nTop {} movers:\n", movers.len()));
        out.push_str(&"-".repeat(60));
        out.push('\n');
        for s in movers {
            out.push_str(&format_signal_line(s));
            out.push('\n');
        }
    }
    out
}

/// One-line rendering used by the summary and the CLI table.
pub fn format_signal_line(s: &Signal) -> String {
    let confidence = s
        .confidence
        .map(|c| format!(" ({c})"))
        .unwrap_or_default();
    format!(
        "{:<40} {:>+8.2}%  OI {:>+8.2}%  {}{}  {}",
        s.key.to_string(),
        s.features.price_return_pct,
        s.features.oi_change_pct,
        s.label,
        confidence,
        s.setup
    )
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write `signals.json`, `signals.csv` and `summary.txt` under
/// `{output_dir}/session={YYYY-MM-DD}/`, replacing earlier files for the
/// same session. Returns the directory.
pub fn save_artifacts(report: &SignalReport, output_dir: &Path, top: usize) -> Result<PathBuf> {
    let run_dir = output_dir.join(format!("session={}", report.session_date.format("%Y-%m-%d")));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("signals.json"), export_json(report)?)?;
    std::fs::write(run_dir.join("signals.csv"), export_signals_csv(&report.signals)?)?;
    std::fs::write(run_dir.join("summary.txt"), render_summary(report, top))?;

    Ok(run_dir)
}

pub fn load_artifacts(dir: &Path) -> Result<SignalReport> {
    let path = dir.join("signals.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}
