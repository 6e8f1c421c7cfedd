//! `bulk-replace` - scan a DatoCMS project for a pattern and rewrite the matches.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use bulk_replace_core::session_log::{self, session_log};
use bulk_replace_core::{
    highlight_segments, AggregatedRecord, BatchOrchestrator, CmaClient, CollectionWalker,
    FieldMatch, Occurrence, ReplaceConfig, ScanSession, SearchPattern, Selection, SessionCache,
};

/// Bulk search & replace across CMS records
#[derive(Debug, Parser)]
#[command(name = "bulk-replace")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Echo info and debug logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write the session log as JSON to this file on exit
    #[arg(long, global = true)]
    export_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every occurrence of a pattern
    Scan {
        pattern: String,
        /// Treat the pattern as a regular expression
        #[arg(long)]
        regex: bool,
        /// Print the scan results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace every occurrence of a pattern
    Replace {
        pattern: String,
        /// Replacement text, inserted literally; may be empty
        #[arg(long = "with", value_name = "TEXT")]
        replacement: String,
        #[arg(long)]
        regex: bool,
        /// Limit the run to these record ids
        #[arg(long = "only", value_name = "ID")]
        only: Vec<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let code = match run(&args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    };

    if let Some(path) = &args.export_log {
        if let Err(err) = export_log(path) {
            eprintln!("Failed to export log: {err:#}");
        }
    }
    code
}

async fn run(args: &Args) -> Result<ExitCode> {
    let config = ReplaceConfig::load(args.config.as_deref()).context("loading configuration")?;
    session_log::init(
        args.verbose || config.logging.verbose,
        config.logging.log_file.as_deref(),
    )
    .context("installing logger")?;

    if config.store.api_token.is_empty() {
        bail!("no API token configured, set store.apiToken or DATOCMS_API_TOKEN");
    }
    let store = CmaClient::new(&config.store).context("creating store client")?;
    let walker = CollectionWalker::from_options(&config.store);
    let mut cache = SessionCache::new();

    match &args.command {
        Command::Scan {
            pattern,
            regex,
            json,
        } => {
            let pattern = SearchPattern::parse(pattern, *regex)?;
            let session = ScanSession::run(&store, &walker, &mut cache, pattern).await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                print_session(&session);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Replace {
            pattern,
            replacement,
            regex,
            only,
            yes,
        } => {
            let pattern = SearchPattern::parse(pattern, *regex)?;
            let mut session = ScanSession::run(&store, &walker, &mut cache, pattern).await?;
            print_session(&session);
            if session.records.is_empty() {
                return Ok(ExitCode::SUCCESS);
            }

            let pending: Vec<&str> = session
                .pending()
                .map(|record| record.record_id.as_str())
                .collect();
            let mut selection = Selection::new();
            if only.is_empty() {
                selection.select_all(pending.iter().copied());
            } else {
                for record_id in only {
                    if !pending.contains(&record_id.as_str()) {
                        warn!("record {record_id} has no pending matches, ignoring it");
                    }
                }
                selection.select_all(only.iter().map(String::as_str));
            }
            let target = selection.target(pending);

            let mut orchestrator = BatchOrchestrator::from_options(&config.replace);
            let count = orchestrator.request(&session, target, Some(replacement.clone()))?;

            if !*yes && !confirm(count, replacement)? {
                orchestrator.cancel();
                println!("Cancelled");
                return Ok(ExitCode::SUCCESS);
            }

            let mut progress = orchestrator.subscribe();
            let printer = tokio::spawn(async move {
                while progress.changed().await.is_ok() {
                    let current = *progress.borrow();
                    eprint!(
                        "\r{}/{} done, {} failed ({:.0}%)",
                        current.finished(),
                        current.total,
                        current.failed,
                        current.percentage()
                    );
                    if !current.in_progress {
                        eprintln!();
                        break;
                    }
                }
            });

            let report = orchestrator.confirm(&store, &mut session).await?;
            let _ = printer.await;

            for failure in &report.failures {
                println!(
                    "  failed {} ({}): {}",
                    failure.record_id,
                    failure.kind.as_str(),
                    failure.message
                );
            }
            println!("{}", report.summary().message());

            if report.failed > 0 {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

fn confirm(count: usize, replacement: &str) -> Result<bool> {
    print!("Replace matches in {count} record(s) with {replacement:?}? [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn print_session(session: &ScanSession) {
    for record in &session.records {
        print_record(record, session.pattern());
    }
    for skipped in &session.skipped {
        println!(
            "skipped {} ({}): {}",
            skipped.record_type_name,
            skipped.kind.as_str(),
            skipped.message
        );
    }
    println!("{}", session.summary().message());
    info!("scanned {} record(s)", session.records_scanned);
}

fn print_record(record: &AggregatedRecord, pattern: &SearchPattern) {
    let title = if record.title.is_empty() {
        "(untitled)"
    } else {
        record.title.as_str()
    };
    println!("{} - {} [{}]", record.record_type_name, title, record.record_id);

    for field in &record.fields {
        match &field.matches {
            FieldMatch::Single { matches } => {
                for occurrence in matches {
                    println!("  {}: {}", field.field_key, excerpt(occurrence, pattern));
                }
            }
            FieldMatch::Localized { locale_matches } => {
                for (locale, matches) in locale_matches {
                    for occurrence in matches {
                        println!(
                            "  {} [{locale}]: {}",
                            field.field_key,
                            excerpt(occurrence, pattern)
                        );
                    }
                }
            }
        }
    }
}

/// Context with every hit wrapped in `[[ ]]`.
fn excerpt(occurrence: &Occurrence, pattern: &SearchPattern) -> String {
    highlight_segments(&occurrence.context, pattern)
        .into_iter()
        .map(|segment| {
            if segment.highlight {
                format!("[[{}]]", segment.text)
            } else {
                segment.text
            }
        })
        .collect()
}

fn export_log(path: &Path) -> Result<()> {
    let json = session_log().export_json()?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scan() {
        let args = Args::try_parse_from(["bulk-replace", "scan", "hello", "--regex"]).unwrap();
        match args.command {
            Command::Scan {
                pattern,
                regex,
                json,
            } => {
                assert_eq!(pattern, "hello");
                assert!(regex);
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_replace_with_empty_text_and_ids() {
        let args = Args::try_parse_from([
            "bulk-replace",
            "--verbose",
            "replace",
            "hello",
            "--with",
            "",
            "--only",
            "r1",
            "--only",
            "r2",
            "-y",
        ])
        .unwrap();
        assert!(args.verbose);
        match args.command {
            Command::Replace {
                replacement,
                only,
                yes,
                ..
            } => {
                assert_eq!(replacement, "");
                assert_eq!(only, vec!["r1", "r2"]);
                assert!(yes);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn replace_requires_with_before_anything_runs() {
        let err = Args::try_parse_from(["bulk-replace", "replace", "hello"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert!(err.to_string().contains("--with"));
    }

    #[test]
    fn excerpt_marks_hits() {
        let pattern = SearchPattern::literal("cat").unwrap();
        let occurrence = Occurrence {
            matched_text: "Cat".into(),
            context: "Cat and cat".into(),
            offset: 0,
        };
        assert_eq!(excerpt(&occurrence, &pattern), "[[Cat]] and [[cat]]");
    }
}
