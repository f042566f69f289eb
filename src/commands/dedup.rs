use anyhow::{Context, Result};
use log::{info, warn};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::time::Instant;

use crate::cli::DedupArgs;
use crate::common::{format_elapsed, setup_logging, DedupStats, RawRecord};
use crate::dedup::filter_duplicates;

/// Read raw records from a JSON array or a JSONL file
pub fn load_records(path: &str) -> Result<Vec<RawRecord>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read input: {}", path))?;

    if content.trim_start().starts_with('[') {
        return serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse record array in {}", path));
    }

    let mut records = Vec::new();
    let mut lines_failed = 0;
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                if lines_failed < 5 {
                    warn!("Failed to parse record at line {}: {}", line_no + 1, e);
                }
                lines_failed += 1;
            }
        }
    }
    if lines_failed > 0 {
        warn!("Failed to parse {} records", lines_failed);
    }
    Ok(records)
}

pub fn run_dedup(args: DedupArgs) -> Result<DedupStats> {
    let start = Instant::now();
    setup_logging(&args.log_level)?;

    let records = load_records(&args.input)?;
    let mut stats = DedupStats {
        input_records: records.len(),
        ..Default::default()
    };
    info!("Loaded {} records from {}", stats.input_records, args.input);

    let mut canonical = filter_duplicates(records)?;
    stats.canonical_records = canonical.len();
    if let Some(list_size) = args.list_size {
        canonical.truncate(list_size);
    }
    stats.written_records = canonical.len();

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create output file: {}", path))?,
        ),
        None => Box::new(io::stdout()),
    };
    let mut writer = BufWriter::new(writer);
    if args.pretty {
        serde_json::to_writer_pretty(&mut writer, &canonical)?;
    } else {
        serde_json::to_writer(&mut writer, &canonical)?;
    }
    writeln!(writer)?;
    writer.flush()?;

    info!(
        "Kept {} canonical of {} records ({} written) in {}",
        stats.canonical_records,
        stats.input_records,
        stats.written_records,
        format_elapsed(start.elapsed())
    );
    Ok(stats)
}
