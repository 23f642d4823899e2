use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use engine::Evidence;
use std::path::{Path, PathBuf};

/// uascope: on-premise device detection with auto-updating data files
///
/// uascope loads a detection data file, answers evidence lookups against
/// it, and keeps the file fresh in the background without interrupting
/// detection traffic.
#[derive(Debug, Parser)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Path to configuration file.
    ///
    /// If not provided, the default locations are checked. They are
    /// `/etc/uascope/config.toml` and `/etc/uascope/config.d/*.toml`,
    /// where the latter being a glob pattern. If they don't exist, the
    /// default configuration is used.
    #[arg(short, long, value_parser = validate_file, global = true)]
    pub conffile: Option<PathBuf>,

    /// Path to the detection data file, overriding the configured one.
    #[arg(short, long, global = true)]
    pub data_file: Option<PathBuf>,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Detect device properties for one set of evidence.
    Detect(DetectArgs),
    /// Process an evidence record file through the batch worker pool.
    Batch(BatchArgs),
    /// Measure detection throughput over an evidence record file.
    Bench(BenchArgs),
    /// Run with automatic updates and report every update check.
    Watch(WatchArgs),
}

#[derive(Debug, clap::Args)]
pub struct DetectArgs {
    /// User-Agent header value to detect.
    #[arg(long)]
    pub ua: Option<String>,

    /// Additional evidence as field.key=value, e.g.
    /// `header.sec-ch-ua-platform=Windows` or `query.ua=...`.
    #[arg(long = "evidence", value_parser = parse_evidence)]
    pub evidence: Vec<Evidence>,

    /// Properties to report, comma separated. Defaults to everything the
    /// data file provides for the match.
    #[arg(long, value_delimiter = ',')]
    pub properties: Vec<String>,
}

#[derive(Debug, clap::Args)]
pub struct BatchArgs {
    /// Multi-document YAML evidence file, one record per document with
    /// keys like `header.user-agent`.
    pub evidence_file: PathBuf,

    /// Write results as CSV to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of worker tasks, overriding the configured pool size.
    #[arg(short, long)]
    pub workers: Option<usize>,
}

#[derive(Debug, clap::Args)]
pub struct BenchArgs {
    /// Multi-document YAML evidence file to iterate over.
    pub evidence_file: PathBuf,

    /// Number of passes over the evidence file.
    #[arg(short, long, default_value_t = 4)]
    pub iterations: u32,

    /// Number of worker tasks, overriding the configured pool size.
    #[arg(short, long)]
    pub workers: Option<usize>,
}

#[derive(Debug, clap::Args)]
pub struct WatchArgs {
    /// Run one update check immediately instead of waiting for the first
    /// polling interval.
    #[arg(long)]
    pub update_on_start: bool,
}

/// Check if the file exists.
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}

/// Parse `field.key=value` evidence, where field is `header` or `query`.
fn parse_evidence(raw: &str) -> Result<Evidence, String> {
    let (key_part, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("`{raw}` is not field.key=value"))?;
    let (field, key) = key_part
        .split_once('.')
        .ok_or_else(|| format!("`{key_part}` is missing a `header.` or `query.` prefix"))?;
    match field {
        "header" => Ok(Evidence::header(key, value)),
        "query" => Ok(Evidence::query(key, value)),
        other => Err(format!("`{other}` is not a known evidence field")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::EvidenceField;
    use proptest::prelude::*;

    #[test]
    fn parses_header_and_query_evidence() {
        let header = parse_evidence("header.user-agent=Mozilla/5.0").unwrap();
        assert_eq!(header.field, EvidenceField::Header);
        assert_eq!(header.key, "user-agent");
        assert_eq!(header.value, "Mozilla/5.0");

        let query = parse_evidence("query.ch-ua-mobile=?1").unwrap();
        assert_eq!(query.field, EvidenceField::Query);
    }

    #[test]
    fn rejects_unknown_fields_and_shapes() {
        assert!(parse_evidence("cookie.session=abc").is_err());
        assert!(parse_evidence("no-equals").is_err());
        assert!(parse_evidence("noprefix=value").is_err());
    }

    fn evidence_candidates() -> impl Strategy<Value = String> {
        prop_oneof![
            2 => ("(header|query)", "[a-z-]{1,12}", "[ -~]{0,24}")
                .prop_map(|(field, key, value)| format!("{field}.{key}={value}")),
            1 => ".*",
        ]
    }

    proptest! {
        #[test]
        fn parse_evidence_never_panics(raw in evidence_candidates()) {
            if let Ok(evidence) = parse_evidence(&raw) {
                prop_assert!(matches!(
                    evidence.field,
                    EvidenceField::Header | EvidenceField::Query
                ));
                prop_assert!(!evidence.key.is_empty() || raw.contains(".="));
            }
        }
    }
}
