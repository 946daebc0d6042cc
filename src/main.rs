use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::FmtSubscriber;

use perfci::concurrency::{self, ConcurrencyConfig};
use perfci::config::{self, Environment, Settings};
use perfci::e2e::{self, E2eConfig};
use perfci::generator::HttpGenerator;
use perfci::latency_table::{self, LatencyTableConfig};
use perfci::merge::{self, MergeConfig};
use perfci::sweep;
use perfci::types::{BenchmarkConfig, LogLevel, SamplingParams};

#[derive(Parser)]
#[command(name = "perfci", version, about = "Drive and post-process LLM serving benchmarks in CI")]
struct Cli {
    /// Settings file (TOML). Defaults to the user config dir when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sweep batch sizes against a serving engine and record latencies
    Latency(LatencyArgs),
    /// Render per-batch latency results as a markdown table
    LatencyTable {
        /// Base filename of latency data, e.g. 'latency_bs' for latency_bs<batch_size>.json
        #[arg(long)]
        base_filename: String,

        #[arg(long)]
        output_dir: PathBuf,
    },
    /// Summarize in_<I>_out_<O>.json results and extend the timeseries history
    E2e {
        #[arg(long, default_value = ".")]
        input_dir: PathBuf,

        #[arg(long)]
        db_dir: Option<PathBuf>,

        /// Markdown file to append the summary table to
        #[arg(long)]
        summary_path: Option<PathBuf>,
    },
    /// Collect concurrency_<C>.json results with derived per-user rate and cost
    Concurrency {
        #[arg(long, default_value = ".")]
        input_dir: PathBuf,

        #[arg(long)]
        db_dir: Option<PathBuf>,

        /// GPU price in USD per hour for the cost metric
        #[arg(long)]
        price_per_hour: Option<f64>,
    },
    /// Merge history snapshots into a single list
    Merge {
        #[arg(long, default_value = merge::DEFAULT_HISTORY_DIR)]
        history_dir: PathBuf,

        #[arg(long, default_value = merge::DEFAULT_OUTPUT)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct LatencyArgs {
    #[arg(long, default_value_t = 32)]
    input_len: usize,

    #[arg(long, default_value_t = 128)]
    output_len: usize,

    #[arg(long)]
    bs_start: usize,

    #[arg(long)]
    bs_end: usize,

    #[arg(long, default_value_t = 1)]
    bs_step: usize,

    /// Number of generated sequences per prompt
    #[arg(long, default_value_t = 1)]
    n: usize,

    #[arg(long)]
    use_beam_search: bool,

    /// Number of iterations to run for warmup
    #[arg(long, default_value_t = 10)]
    num_iters_warmup: usize,

    /// Number of iterations to run
    #[arg(long, default_value_t = 30)]
    num_iters: usize,

    /// Profile the generation process of a single batch
    #[arg(long)]
    profile: bool,

    #[arg(long)]
    profiler_dir: Option<PathBuf>,

    /// Base path for JSON output files
    #[arg(long)]
    output_json: String,

    /// Do not include detokenization time in the latency measurement.
    /// Sent as vLLM's `detokenize` request field; other servers may ignore it.
    #[arg(long)]
    disable_detokenize: bool,

    #[arg(long, default_value_t = 1.0)]
    temperature: f32,

    #[arg(long, default_value_t = 1.0)]
    top_p: f32,

    /// Also write <output-json><batch_size>.pytorch.json
    #[arg(long)]
    pytorch_format: bool,

    #[arg(long)]
    server_url: Option<String>,

    /// Model to benchmark; defaults to the first model the server lists
    #[arg(long)]
    model: Option<String>,

    /// Pause between batch sizes
    #[arg(long)]
    settle_delay_secs: Option<u64>,

    #[arg(long, default_value_t = 600)]
    request_timeout_secs: u64,
}

impl LatencyArgs {
    fn to_config(&self, settings: &Settings) -> BenchmarkConfig {
        BenchmarkConfig {
            input_len: self.input_len,
            output_len: self.output_len,
            bs_start: self.bs_start,
            bs_end: self.bs_end,
            bs_step: self.bs_step,
            num_iters_warmup: self.num_iters_warmup,
            num_iters: self.num_iters,
            sampling: SamplingParams {
                n: self.n,
                temperature: self.temperature,
                top_p: self.top_p,
                max_tokens: self.output_len,
                ignore_eos: true,
                use_beam_search: self.use_beam_search,
                detokenize: !self.disable_detokenize,
            },
            profile: self.profile,
            profiler_dir: self
                .profiler_dir
                .clone()
                .or_else(|| settings.profiler_dir.clone()),
            output_json: self.output_json.clone(),
            settle_delay_secs: self
                .settle_delay_secs
                .unwrap_or_else(|| settings.settle_delay_secs()),
            pytorch_format: self.pytorch_format,
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::from(cli.log_level))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let env = Environment::from_process();
    let settings = Settings::load(cli.config.as_deref())?.with_environment(&env);

    match cli.command {
        Command::Latency(args) => {
            let bench = args.to_config(&settings);
            // Fail on bad flags before touching the server.
            sweep::validate(&bench)?;

            let server_url = args.server_url.clone().unwrap_or_else(|| settings.server_url());
            let mut generator = HttpGenerator::connect(
                &server_url,
                args.model.as_deref(),
                Duration::from_secs(args.request_timeout_secs),
            )?;
            let mut rng = rand::rng();
            sweep::run_sweep(&mut generator, &bench, &mut rng)?;
        }
        Command::LatencyTable {
            base_filename,
            output_dir,
        } => {
            let table_config = LatencyTableConfig {
                base_filename,
                output_dir,
            };
            latency_table::run(&table_config, Utc::now())?;
        }
        Command::E2e {
            input_dir,
            db_dir,
            summary_path,
        } => {
            let e2e_config = E2eConfig {
                input_dir,
                db_dir: config::require_db_dir(db_dir, &settings)?,
                summary_path: summary_path.or_else(|| settings.step_summary.clone()),
            };
            e2e::run(&e2e_config, Utc::now())?;
        }
        Command::Concurrency {
            input_dir,
            db_dir,
            price_per_hour,
        } => {
            let concurrency_config = ConcurrencyConfig {
                input_dir,
                db_dir: config::require_db_dir(db_dir, &settings)?,
                price_per_hour: price_per_hour.unwrap_or_else(|| settings.price_per_hour()),
            };
            concurrency::run(&concurrency_config, Utc::now())?;
        }
        Command::Merge {
            history_dir,
            output,
        } => {
            merge::run(&MergeConfig {
                history_dir,
                output,
            })?;
        }
    }

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{}", err);
        process::exit(1);
    }
}
