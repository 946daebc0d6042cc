use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::display;
use crate::errors::PerfCiError;
use crate::generator::{Generator, random_prompts};
use crate::stats;
use crate::store;
use crate::types::{BatchResult, BenchmarkConfig};

/// Batch sizes `start, start+step, ...` up to `end` inclusive.
pub fn batch_sizes(start: usize, end: usize, step: usize) -> Result<Vec<usize>> {
    if end < start {
        return Err(PerfCiError::InvalidBatchRange { start, end }.into());
    }
    if step == 0 {
        return Err(PerfCiError::InvalidBatchStep.into());
    }
    Ok((start..=end).step_by(step).collect())
}

/// Checks that need no engine: profiler directory, then the batch range.
/// Returns the batch sizes to sweep.
pub fn validate(config: &BenchmarkConfig) -> Result<Vec<usize>> {
    if config.profile && config.profiler_dir.is_none() {
        return Err(PerfCiError::ProfilerDirNotSet.into());
    }
    batch_sizes(config.bs_start, config.bs_end, config.bs_step)
}

pub fn check_context(generator: &impl Generator, config: &BenchmarkConfig) -> Result<()> {
    let max_model_len = generator.max_model_len()?;
    let required = config.input_len + config.output_len;
    if max_model_len < required {
        return Err(PerfCiError::ContextTooShort {
            max_model_len,
            required,
        }
        .into());
    }
    Ok(())
}

/// Run the whole sweep, sleeping with `std::thread::sleep` between batch sizes.
pub fn run_sweep<G: Generator>(
    generator: &mut G,
    config: &BenchmarkConfig,
    rng: &mut impl Rng,
) -> Result<Vec<BatchResult>> {
    run_sweep_with(generator, config, rng, &mut std::thread::sleep)
}

/// Like [`run_sweep`] with an injectable sleep for the settle delay.
///
/// Writes one result file per batch size as it completes. Profiling runs
/// write nothing and return no results.
pub fn run_sweep_with<G: Generator>(
    generator: &mut G,
    config: &BenchmarkConfig,
    rng: &mut impl Rng,
    sleep: &mut dyn FnMut(Duration),
) -> Result<Vec<BatchResult>> {
    let sizes = validate(config)?;
    check_context(&*generator, config)?;

    info!(
        model = generator.model_name(),
        batch_sizes = ?sizes,
        input_len = config.input_len,
        output_len = config.output_len,
        "starting latency sweep"
    );

    let mut results = Vec::new();
    for (i, &batch_size) in sizes.iter().enumerate() {
        if i > 0 {
            debug!(delay = ?config.settle_delay(), "settling before next batch size");
            sleep(config.settle_delay());
        }

        let Some(result) = benchmark_batch_size(generator, config, batch_size, rng)? else {
            continue;
        };

        print!("{}", display::format_batch_summary(&result));
        let path = write_batch_result(config, &result, generator.model_name())?;
        info!(batch_size, path = %path.display(), "wrote latency results");
        results.push(result);
    }

    Ok(results)
}

/// Warm up, then either capture one profiled generation (returning `None`)
/// or time `num_iters` generations.
pub fn benchmark_batch_size<G: Generator>(
    generator: &mut G,
    config: &BenchmarkConfig,
    batch_size: usize,
    rng: &mut impl Rng,
) -> Result<Option<BatchResult>> {
    let prompts = random_prompts(rng, batch_size, config.input_len);

    let warmup = iteration_bar("Warmup iterations", config.num_iters_warmup);
    for _ in 0..config.num_iters_warmup {
        generator.generate(&prompts, &config.sampling)?;
        warmup.inc(1);
    }
    warmup.finish_and_clear();

    if config.profile {
        generator.start_profile()?;
        generator.generate(&prompts, &config.sampling)?;
        generator.stop_profile()?;
        info!(batch_size, "captured profile");
        return Ok(None);
    }

    let timed = iteration_bar("Profiling iterations", config.num_iters);
    let mut latencies = Vec::with_capacity(config.num_iters);
    for _ in 0..config.num_iters {
        let start = Instant::now();
        generator.generate(&prompts, &config.sampling)?;
        latencies.push(start.elapsed().as_secs_f64());
        timed.inc(1);
    }
    timed.finish_and_clear();

    stats::summarize(batch_size, latencies).map(Some)
}

fn iteration_bar(label: &str, total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{msg}: [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    bar.set_style(style);
    bar.set_message(label.to_string());
    bar
}

pub fn result_path(base: &str, batch_size: usize) -> PathBuf {
    PathBuf::from(format!("{}{}.json", base, batch_size))
}

pub fn pytorch_path(base: &str, batch_size: usize) -> PathBuf {
    PathBuf::from(format!("{}{}.pytorch.json", base, batch_size))
}

/// Records in the PyTorch OSS benchmark database format.
pub fn pytorch_records(config: &BenchmarkConfig, result: &BatchResult, model: &str) -> Value {
    json!([{
        "benchmark": {
            "name": "perfci latency sweep",
            "extra_info": { "args": config },
        },
        "model": { "name": model },
        "metric": {
            "name": "latency",
            "benchmark_values": result.latencies,
            "extra_info": {
                "avg_latency": result.avg_latency,
                "percentiles": result.percentiles,
            },
        },
    }])
}

/// Write `<base><batch_size>.json` and, when enabled, its pytorch companion.
pub fn write_batch_result(
    config: &BenchmarkConfig,
    result: &BatchResult,
    model: &str,
) -> Result<PathBuf> {
    let path = result_path(&config.output_json, result.batch_size);
    store::write_json(&path, result, 4)?;

    if config.pytorch_format {
        let pt_path = pytorch_path(&config.output_json, result.batch_size);
        store::write_json(&pt_path, &pytorch_records(config, result, model), 4)?;
    }

    Ok(path)
}
