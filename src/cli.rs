use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "metadata-harvester")]
#[command(about = "Rate-limited search harvesting worker with DOI-aware deduplication")]
#[command(version = "1.0.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the harvesting worker: rate gate -> dequeue -> search -> dedup -> publish
    Run(RunArgs),

    /// Deduplicate a file of raw provider records offline
    Dedup(DedupArgs),

    /// Push a job onto the inbound queue of a store
    Enqueue(EnqueueArgs),
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    /// SQLite coordination store shared by all workers
    #[arg(long, default_value = "harvester.db")]
    pub store: String,

    /// Inbound job queue
    #[arg(long, default_value = "base")]
    pub queue: String,

    /// Downstream queue for search results
    #[arg(long, default_value = "input_data")]
    pub output_queue: String,

    /// Store key holding the rate limiter's theoretical arrival time
    #[arg(long, default_value = "base-ratelimit")]
    pub rate_key: String,

    /// Seconds between requests to the provider
    #[arg(long, default_value = "1.1")]
    pub separation: f64,

    /// Seconds to wait for the rate lock before counting the attempt as limited
    #[arg(long, default_value = "5")]
    pub lock_timeout: u64,

    /// Back-off in milliseconds after a limited attempt
    #[arg(long, default_value = "100")]
    pub poll_interval_ms: u64,

    /// Seconds a single wait on an empty inbound queue may take
    #[arg(long, default_value = "5")]
    pub pop_timeout: u64,

    /// Provider executable or interpreter
    #[arg(long, default_value = "Rscript")]
    pub command: String,

    /// Provider search script, relative to --wd
    #[arg(long, default_value = "run_base.R")]
    pub runner: String,

    /// Provider content-provider listing script, relative to --wd
    #[arg(long, default_value = "run_base_contentproviders.R")]
    pub contentproviders_runner: String,

    /// Working directory passed to the provider scripts
    #[arg(long, default_value = ".")]
    pub wd: String,

    /// Service name stamped onto every job's params
    #[arg(long, default_value = "base")]
    pub service: String,

    /// Stop after this many jobs (default: run until stopped)
    #[arg(long)]
    pub max_jobs: Option<usize>,

    /// Logging level (DEBUG, INFO, WARN, ERROR)
    #[arg(short, long, default_value = "INFO")]
    pub log_level: String,
}

#[derive(Parser, Clone)]
pub struct DedupArgs {
    /// JSON array or JSONL file of raw provider records
    #[arg(short, long, required = true)]
    pub input: String,

    /// Output JSON file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Keep at most this many canonical records
    #[arg(long)]
    pub list_size: Option<usize>,

    /// Pretty-print the output
    #[arg(long, default_value = "false")]
    pub pretty: bool,

    /// Logging level (DEBUG, INFO, WARN, ERROR)
    #[arg(short, long, default_value = "INFO")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum JobEndpoint {
    Search,
    Contentproviders,
}

impl JobEndpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobEndpoint::Search => "search",
            JobEndpoint::Contentproviders => "contentproviders",
        }
    }
}

#[derive(Parser, Clone)]
pub struct EnqueueArgs {
    /// SQLite coordination store
    #[arg(long, default_value = "harvester.db")]
    pub store: String,

    /// Inbound job queue
    #[arg(long, default_value = "base")]
    pub queue: String,

    /// Job endpoint
    #[arg(short, long, value_enum, default_value = "search")]
    pub endpoint: JobEndpoint,

    /// Search query
    #[arg(short, long, default_value = "")]
    pub q: String,

    /// Maximum number of records handed downstream
    #[arg(long, default_value = "100")]
    pub list_size: usize,

    /// Write the result to the job's output slot instead of the downstream queue
    #[arg(long, default_value = "false")]
    pub raw: bool,

    /// Job id (default: random UUID)
    #[arg(long)]
    pub id: Option<String>,

    /// Logging level (DEBUG, INFO, WARN, ERROR)
    #[arg(short, long, default_value = "INFO")]
    pub log_level: String,
}
