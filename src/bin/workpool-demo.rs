use std::process::exit;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use workpool::{Pool, PoolError, Result};

const DEFAULT_WORKERS: &str = "5";
const DEFAULT_JOBS: &str = "30";
const DEFAULT_SLEEP_MS: &str = "1000";

#[derive(Parser)]
#[command(
    name = "workpool-demo",
    version,
    about = "Runs sleep-and-print jobs on a fixed-size worker pool"
)]
struct Cli {
    /// Number of worker threads
    #[arg(long, default_value = DEFAULT_WORKERS, value_name = "N")]
    workers: usize,

    /// Number of jobs to submit
    #[arg(long, default_value = DEFAULT_JOBS, value_name = "M")]
    jobs: u64,

    /// How long each job sleeps before printing
    #[arg(long, default_value = DEFAULT_SLEEP_MS, value_name = "MS")]
    sleep_ms: u64,

    /// Make every K-th job panic instead of completing
    #[arg(long, value_name = "K")]
    panic_every: Option<u64>,
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{}", e);
        if let PoolError::JobsPanicked(panics) = &e {
            for panic in panics {
                error!("{}", panic);
            }
        }
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    info!("workpool-demo {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Submitting {} job(s) to {} worker(s)",
        cli.jobs, cli.workers
    );

    let pool = Pool::new(cli.workers)?;
    let sleep = Duration::from_millis(cli.sleep_ms);

    for job_id in 0..cli.jobs {
        let panics = cli.panic_every.is_some_and(|k| k > 0 && (job_id + 1) % k == 0);
        pool.add_job(move || {
            thread::sleep(sleep);
            if panics {
                panic!("Job {job_id}: failed");
            }
            println!("Job {job_id}: completed");
        })?;
    }

    pool.wait()?;
    info!("All {} job(s) finished", pool.completed());
    Ok(())
}
