// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.
use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing::info;
use tracing::warn;
use tracing_subscriber::filter::EnvFilter;

use qslice::circuit::Backend;
use qslice::console;
use qslice::controller::DEFAULT_TOTAL_PRBS;
use qslice::optimizer::DEFAULT_LEARNING_RATE;
use qslice::optimizer::DYNAMIC_STEPS;
use qslice::optimizer::FIXED_STEPS;
use qslice::policy::DEFAULT_POLICY_FILE;
use qslice::quantize::DriftPolicy;
use qslice::ControlHandle;
use qslice::Controller;
use qslice::ControllerConfig;
use qslice::DeviceRegistry;
use qslice::Optimizer;
use qslice::OptimizerConfig;

/// qslice: A PRB slice controller
///
/// Devices are registered at runtime through a small command interpreter on
/// stdin (add, remove, list, exit). Every device is given its own slice.
///
/// Every interval, the controller scores the slices with a simulated qubit
/// circuit, one qubit per slice, whose rotation weights are tuned by a fixed
/// number of gradient descent steps. The scores are split proportionally
/// into whole PRBs adding up to the PRB budget and written to the RRM policy
/// file as {"slices": [{"id": 1, "PRBs": 60}, ...]}.
///
/// With no device registered, the controller idles and leaves the policy
/// file untouched.
#[derive(Debug, Parser)]
struct Opts {
    /// Deprecated, noop, use RUST_LOG or --log-level instead.
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Specify the logging level. Accepts rust's envfilter syntax for modular
    /// logging: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html#example-syntax. Examples: ["info", "warn,qslice=debug"]
    #[clap(long, default_value = "info")]
    log_level: String,

    /// Total number of PRBs split across the slices.
    #[clap(short = 'p', long, default_value_t = DEFAULT_TOTAL_PRBS)]
    total_prbs: u32,

    /// Interval between allocation cycles in seconds.
    #[clap(short = 'i', long, default_value = "10")]
    interval_s: u64,

    /// Gradient descent steps per allocation. Defaults to 30, or 50 with
    /// --fixed-slices.
    #[clap(short = 's', long)]
    steps: Option<usize>,

    /// Gradient descent learning rate.
    #[clap(short = 'l', long, default_value_t = DEFAULT_LEARNING_RATE)]
    learning_rate: f64,

    /// How the rounding residual is corrected. correct-first adds it to
    /// slice 1. force-max-first reorders the counts so slice 1 holds the
    /// largest one before adding it. Defaults to correct-first, or
    /// force-max-first with --fixed-slices.
    #[clap(short = 'd', long, value_enum)]
    drift_policy: Option<DriftPolicy>,

    /// Circuit simulator backend.
    #[clap(short = 'b', long, value_enum, default_value_t = Backend::Statevector)]
    backend: Backend,

    /// Path of the RRM policy file.
    #[clap(short = 'o', long, default_value = DEFAULT_POLICY_FILE)]
    policy_path: PathBuf,

    /// Run with a fixed number of slices instead of reading devices from
    /// stdin. Slices are registered as slice-1 .. slice-N.
    #[clap(short = 'f', long)]
    fixed_slices: Option<usize>,

    /// Seed for the weight initialization. Random if not given.
    #[clap(long)]
    seed: Option<u64>,
}

impl Opts {
    fn validate(&self) -> Result<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            bail!("--learning-rate must be a positive number");
        }
        if self.interval_s == 0 {
            bail!("--interval-s must be greater than zero");
        }
        if self.fixed_slices == Some(0) {
            bail!("--fixed-slices must be at least 1");
        }
        Ok(())
    }

    fn optimizer_config(&self) -> OptimizerConfig {
        let fixed = self.fixed_slices.is_some();
        OptimizerConfig {
            steps: self
                .steps
                .unwrap_or(if fixed { FIXED_STEPS } else { DYNAMIC_STEPS }),
            learning_rate: self.learning_rate,
            drift_policy: self.drift_policy.unwrap_or(if fixed {
                DriftPolicy::ForceMaxFirst
            } else {
                DriftPolicy::CorrectFirst
            }),
            backend: self.backend,
        }
    }

    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            total_prbs: self.total_prbs,
            interval: Duration::from_secs(self.interval_s),
            policy_path: self.policy_path.clone(),
        }
    }

    fn registry(&self) -> Result<DeviceRegistry> {
        let ids = (1..=self.fixed_slices.unwrap_or(0)).map(|i| format!("slice-{}", i));
        DeviceRegistry::with_devices(ids).context("Failed to seed fixed slices")
    }
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| match EnvFilter::try_new(&opts.log_level) {
            Ok(filter) => Ok(filter),
            Err(e) => {
                eprintln!(
                    "invalid log envvar: {}, using info, err is: {}",
                    opts.log_level, e
                );
                EnvFilter::try_new("info")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
    {
        Ok(()) => {}
        Err(e) => eprintln!("failed to init logger: {}", e),
    }

    if opts.verbose > 0 {
        warn!("Setting verbose via -v is deprecated and will be an error in future releases.");
    }

    debug!("opts={:?}", &opts);
    opts.validate()?;

    let handle = ControlHandle::new(opts.registry()?);
    let shutdown = handle.shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    })
    .context("Error setting Ctrl-C handler")?;

    let ctrl_cfg = opts.controller_config();
    let optimizer = Optimizer::new(opts.optimizer_config(), opts.seed);
    let controller = Controller::new(&ctrl_cfg, handle.registry.clone(), optimizer);
    controller.writer().ensure_exists()?;

    info!(
        "Starting qslice ({} mode), policy file {}",
        if opts.fixed_slices.is_some() { "fixed" } else { "dynamic" },
        ctrl_cfg.policy_path.display()
    );
    let ctrl_thread = controller.spawn(handle.shutdown.clone())?;

    if opts.fixed_slices.is_none() {
        let console_handle = handle.clone();
        // Left detached, a blocked stdin read must not hold up shutdown.
        std::thread::Builder::new()
            .name("console".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                let mut stdout = std::io::stdout();
                if let Err(e) = console::run(&console_handle, stdin.lock(), &mut stdout) {
                    warn!("Console stopped: {:#}", e);
                    console_handle.stop();
                }
            })
            .context("Failed to spawn console thread")?;
    }

    let metrics = match ctrl_thread.join() {
        Ok(res) => res?,
        Err(_) => bail!("Controller thread panicked"),
    };

    let mut summary = vec![];
    metrics.format(&mut summary)?;
    info!("Controller stopped: {}", String::from_utf8_lossy(&summary).trim_end());
    Ok(())
}
