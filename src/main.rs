//! Batch extraction driver
//!
//! Runs the extraction pipeline over every program file named on the
//! command line (directories are scanned for `.nc`/`.tap`/`.txt`), one
//! tokio task per file, and emits one JSON line per result on stdout.
//! Exits non-zero when any result is CRITICAL or any file failed to read.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::Serialize;
use tracing::{error, info};

use discprobe::{init_logging, Extractor, ExtractionResult, Tolerances, ValidationStatus};

const PROGRAM_EXTENSIONS: &[&str] = &["nc", "tap", "txt"];

#[derive(Debug, Serialize)]
struct BatchRecord {
    file: String,
    #[serde(flatten)]
    result: ExtractionResult,
}

fn usage() -> String {
    format!(
        "discprobe {} ({})\n\
         Usage: discprobe [--tolerances <file.json>] <program-or-directory>...\n\
         \n\
         Options:\n\
         \x20  --tolerances <path>   load tolerance bands from a JSON file\n\
         \x20  --version             print version and exit\n\
         \x20  --help                print this help and exit",
        discprobe::VERSION,
        discprobe::BUILD_DATE
    )
}

fn is_program_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| PROGRAM_EXTENSIONS.iter().any(|p| e.eq_ignore_ascii_case(p)))
}

/// Expand file and directory arguments into the list of program files
fn collect_programs(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut programs = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let entries = std::fs::read_dir(input)
                .with_context(|| format!("reading directory {}", input.display()))?;
            let mut found: Vec<PathBuf> = entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_program_file(p))
                .collect();
            found.sort();
            programs.extend(found);
        } else {
            programs.push(input.clone());
        }
    }
    Ok(programs)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let mut tolerance_path: Option<PathBuf> = None;
    let mut inputs: Vec<PathBuf> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                println!("{}", usage());
                return Ok(());
            }
            "--version" | "-V" => {
                println!("discprobe {} ({})", discprobe::VERSION, discprobe::BUILD_DATE);
                return Ok(());
            }
            "--tolerances" => {
                let Some(path) = args.next() else {
                    bail!("--tolerances requires a file path\n\n{}", usage());
                };
                tolerance_path = Some(PathBuf::from(path));
            }
            other if other.starts_with('-') => {
                bail!("unknown option {}\n\n{}", other, usage());
            }
            other => inputs.push(PathBuf::from(other)),
        }
    }
    if inputs.is_empty() {
        bail!("no program files given\n\n{}", usage());
    }

    let extractor = match &tolerance_path {
        Some(path) => {
            let tolerances = Tolerances::load(path)
                .with_context(|| format!("loading tolerances from {}", path.display()))?;
            Extractor::with_tolerances(tolerances).context("validating tolerances")?
        }
        None => Extractor::new(),
    };

    let programs = collect_programs(&inputs)?;
    if programs.is_empty() {
        bail!("no program files found under the given paths");
    }
    info!(files = programs.len(), "starting batch extraction");

    let mut tasks = Vec::with_capacity(programs.len());
    for path in programs {
        let extractor = extractor.clone();
        tasks.push(tokio::spawn(async move {
            let text = tokio::fs::read_to_string(&path).await;
            (path, text.map(|t| extractor.extract(&t)))
        }));
    }

    let mut failed = false;
    for task in tasks {
        let (path, outcome) = task.await.context("extraction task panicked")?;
        match outcome {
            Ok(Ok(result)) => {
                if result.validation_status == ValidationStatus::Critical {
                    failed = true;
                }
                let record = BatchRecord {
                    file: path.display().to_string(),
                    result,
                };
                println!("{}", serde_json::to_string(&record)?);
            }
            Ok(Err(err)) => {
                error!(file = %path.display(), %err, "extraction failed");
                failed = true;
            }
            Err(err) => {
                error!(file = %path.display(), %err, "could not read file");
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
