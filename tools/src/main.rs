//! aci-runner: batch runner for the Attacker Credibility Index.
//!
//! Usage:
//!   aci-runner extract-chat --transcripts chats.jsonl --out chat.csv
//!   aci-runner score --claims claims.jsonl --payments payments.jsonl \
//!                    --transcripts chats.jsonl --by-year --out scores.csv
//!   aci-runner score --claims claims.jsonl --chat-features chat.csv \
//!                    --as-of-year 2023 --db audit.db
//!
//! Optional flags for `score`: --config FILE, --attribution FILE, --db FILE.
//! Without --out the table is written to stdout.

use aci_core::{
    attribution::WalletAttribution,
    chat_features::{ChatFeatureExtractor, ChatFeatureVector},
    config::AciConfig,
    csv,
    evidence::{ClaimEvent, NegotiationTranscript, PaymentEvent},
    ingest::read_jsonl_file,
    scoring::AciScoreRecord,
    store::ScoreStore,
    types::{RunId, Year},
    windowing::{RunMode, WindowController},
};
use anyhow::{bail, Context, Result};
use std::env;
use std::fs::File;
use std::io::{self, BufWriter, Write};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1) else {
        print_usage();
        bail!("missing subcommand");
    };

    let config = match flag_value(&args, "--config") {
        Some(path) => AciConfig::load(path)?,
        None => AciConfig::default(),
    };

    match command.as_str() {
        "extract-chat" => extract_chat(&args, &config),
        "score" => score(&args, config),
        "-h" | "--help" => {
            print_usage();
            Ok(())
        }
        other => {
            print_usage();
            bail!("unknown subcommand '{other}'")
        }
    }
}

// ── Subcommands ────────────────────────────────────────────────

fn extract_chat(args: &[String], config: &AciConfig) -> Result<()> {
    let transcripts_path = flag_value(args, "--transcripts")
        .context("extract-chat needs --transcripts FILE")?;

    let vectors = extract_vectors(transcripts_path, config)?;
    write_output(args, |out| csv::write_chat_features(out, &vectors))?;

    eprintln!("aci-runner extract-chat");
    eprintln!("  transcripts: {transcripts_path}");
    eprintln!("  vectors:     {}", vectors.len());
    eprintln!(
        "  defined:     {}",
        vectors.iter().filter(|v| v.has_defined_features()).count()
    );
    Ok(())
}

fn score(args: &[String], config: AciConfig) -> Result<()> {
    let mode = parse_mode(args)?;

    let claims = match flag_value(args, "--claims") {
        Some(path) => read_jsonl_file::<ClaimEvent>(path)?.records,
        None => Vec::new(),
    };

    let mut payments = match flag_value(args, "--payments") {
        Some(path) => read_jsonl_file::<PaymentEvent>(path)?.records,
        None => Vec::new(),
    };
    if let Some(path) = flag_value(args, "--attribution") {
        let attributed = WalletAttribution::load(path)?.attribute(&payments);
        log::info!(
            "attribution: {} payment(s) resolved, {} unattributed",
            attributed.resolved,
            attributed.unattributed
        );
        payments = attributed.payments;
    }

    let chat_vectors: Vec<ChatFeatureVector> = match (
        flag_value(args, "--chat-features"),
        flag_value(args, "--transcripts"),
    ) {
        (Some(_), Some(_)) => bail!("use either --chat-features or --transcripts, not both"),
        (Some(path), None) => {
            let file = File::open(path).with_context(|| format!("Cannot open {path}"))?;
            csv::read_chat_features(file, path)?.records
        }
        (None, Some(path)) => extract_vectors(path, &config)?,
        (None, None) => Vec::new(),
    };

    if claims.is_empty() && payments.is_empty() && chat_vectors.is_empty() {
        bail!("no evidence given: pass at least one of --claims, --payments, --transcripts, --chat-features");
    }

    let audit = match flag_value(args, "--db") {
        Some(db) => {
            let store = ScoreStore::open(db)?;
            store.migrate()?;
            Some(store)
        }
        None => None,
    };

    let controller = WindowController::new(config)?;
    let records = controller.run(mode, &claims, &payments, &chat_vectors)?;

    let run_id: RunId = uuid::Uuid::new_v4().to_string();
    if let Some(store) = &audit {
        store.record_run(
            &run_id,
            mode,
            controller.scorer().config(),
            env!("CARGO_PKG_VERSION"),
            chrono::Utc::now(),
            &records,
        )?;
    }

    write_output(args, |out| csv::write_scores(out, &records))?;
    print_summary(&run_id, mode, &records, audit.is_some());
    Ok(())
}

// ── Helpers ────────────────────────────────────────────────────

fn extract_vectors(path: &str, config: &AciConfig) -> Result<Vec<ChatFeatureVector>> {
    let transcripts = read_jsonl_file::<NegotiationTranscript>(path)?.records;
    let extractor = ChatFeatureExtractor::new(config)?;
    Ok(extractor.extract_all(&transcripts))
}

fn parse_mode(args: &[String]) -> Result<RunMode> {
    let by_year = args.iter().any(|a| a == "--by-year");
    let as_of = flag_value(args, "--as-of-year")
        .map(|raw| {
            raw.parse::<Year>()
                .with_context(|| format!("--as-of-year expects a year, got '{raw}'"))
        })
        .transpose()?;

    match (by_year, as_of) {
        (true, Some(_)) => bail!("--by-year and --as-of-year are mutually exclusive"),
        (true, None)    => Ok(RunMode::ByYear),
        (false, Some(y)) => Ok(RunMode::AsOfYear(y)),
        (false, None)   => Ok(RunMode::Single),
    }
}

/// Write to --out if given, else stdout.
fn write_output<F>(args: &[String], write: F) -> Result<()>
where
    F: FnOnce(Box<dyn Write>) -> aci_core::error::AciResult<()>,
{
    let out: Box<dyn Write> = match flag_value(args, "--out") {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Cannot create {path}"))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    write(out)?;
    Ok(())
}

fn print_summary(run_id: &str, mode: RunMode, records: &[AciScoreRecord], persisted: bool) {
    let groups: std::collections::BTreeSet<&str> =
        records.iter().map(|r| r.group_id.as_str()).collect();
    let low_confidence = records.iter().filter(|r| r.confidence < 1.0).count();

    eprintln!("aci-runner score");
    eprintln!("  run_id:         {run_id}");
    eprintln!("  mode:           {mode}");
    eprintln!("  records:        {}", records.len());
    eprintln!("  groups:         {}", groups.len());
    eprintln!("  low confidence: {low_confidence}");
    eprintln!("  persisted:      {persisted}");

    if let Some(top) = records
        .iter()
        .max_by(|a, b| a.aci_score.total_cmp(&b.aci_score))
    {
        eprintln!(
            "  top:            {} {:.2} in {}",
            top.group_id, top.aci_score, top.window
        );
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!("  aci-runner extract-chat --transcripts FILE [--config FILE] [--out FILE]");
    eprintln!("  aci-runner score [--claims FILE] [--payments FILE]");
    eprintln!("                   [--transcripts FILE | --chat-features FILE]");
    eprintln!("                   [--by-year | --as-of-year YEAR]");
    eprintln!("                   [--config FILE] [--attribution FILE] [--db FILE] [--out FILE]");
}
