use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::Parser;
use rand::{thread_rng, Rng};
use tch::{kind, Device, Kind, Tensor};
use tqdm::tqdm;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use domain_discriminator::{DiscriminatorConfig, DiscriminatorModel};

#[derive(Parser, Debug)]
#[command(version, about = "Domain discriminator via Rust.", long_about = None)]
struct Args {
    /// Number of domains/classes to discriminate
    #[arg(long, default_value_t = 2)]
    nb_outputs: i64,
    #[arg(long, default_value_t = 8)]
    batch_size: i64,
    /// Height of the input feature map
    #[arg(long, default_value_t = 3)]
    height: i64,
    /// Width of the input feature map
    #[arg(long, default_value_t = 4)]
    width: i64,
    /// Number of forward passes
    #[arg(short, long, default_value_t = 10)]
    iters: i64,
    /// Run the training-mode forward (updates batch-norm statistics)
    #[arg(long, default_value_t = false)]
    train_mode: bool,
    /// Weights to load, if the file exists
    #[arg(short, long)]
    weights: Option<PathBuf>,
    /// Where to save the weights after the run
    #[arg(short, long)]
    save: Option<PathBuf>,
    #[arg(long)]
    seed: Option<i64>,
    #[arg(long, default_value_t = false)]
    cpu: bool,
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => bail!("Unknown log level: {other}"),
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    print_oss_license();

    if args.batch_size <= 0 {
        bail!("--batch-size must be positive, got {}", args.batch_size);
    }
    if args.iters <= 0 {
        bail!("--iters must be positive, got {}", args.iters);
    }

    let seed = args.seed.unwrap_or_else(|| thread_rng().gen_range(0..i64::MAX));
    tch::manual_seed(seed);

    let device = if args.cpu { Device::Cpu } else { Device::cuda_if_available() };
    println!("Use Device: {device:?}");
    println!("--------");

    let config = DiscriminatorConfig::new(args.nb_outputs).with_input_size(args.height, args.width);
    let mut model = DiscriminatorModel::new(device, config)?;

    if let Some(path) = &args.weights {
        if path.is_file() {
            model.load(path)?;
            println!("Loaded: {}", path.display());
        } else {
            warn!("weights file {} not found, using fresh parameters", path.display());
        }
    }

    let config = model.config().clone();
    println!("Seed: {seed}");
    println!("Outputs: {}", config.nb_outputs);
    println!("Input: {} x {} x {}", config.in_channels, args.height, args.width);
    println!("Hidden Channels: {:?}", config.hidden_channels);
    println!("Flat Features: {}", config.flat_features());
    println!("Parameters: {}", model.num_parameters());
    println!("Batch Size: {}", args.batch_size);
    println!("Iterations: {}", args.iters);
    println!("Mode: {}", if args.train_mode { "train" } else { "eval" });
    println!("--------");

    let minibatch = || {
        Tensor::randn([args.batch_size, config.in_channels, args.height, args.width], kind::FLOAT_CPU)
    };

    println!("Forward Iteration...");
    let start = Instant::now();
    let mut logits = None;
    for _ in tqdm(0..args.iters) {
        let batch = minibatch();
        let scores = if args.train_mode {
            model.forward_train(&batch)?
        } else {
            model.predict(&batch)?
        };
        logits = Some(scores);
    }
    let elapsed = start.elapsed();
    info!(iters = args.iters, elapsed_ms = elapsed.as_millis() as u64, "forward passes done");

    if let Some(logits) = logits {
        println!("Logits {:?}:", logits.size());
        logits.to_kind(Kind::Float).to_device(Device::Cpu).print();
    }
    println!("Mean Time per Pass: {:?}", mean_pass_time(elapsed, args.iters));

    if let Some(path) = &args.save {
        model.save(path)?;
        println!("Saved: {}", path.display());
    }

    Ok(())
}

fn mean_pass_time(elapsed: Duration, iters: i64) -> Duration {
    if iters <= 0 {
        return Duration::ZERO;
    }
    elapsed.div_f64(iters as f64)
}

fn print_oss_license() {
    println!("OSS Library: PyTorch");
    println!("URL: https://github.com/pytorch/pytorch");
    println!("License: 3-Clause BSD License");
    println!("");
    println!("OSS Library: tch-rs");
    println!("URL: https://github.com/LaurentMazare/tch-rs");
    println!("License: MIT License");
    println!("");
    println!("OSS Library: anyhow");
    println!("URL: https://github.com/dtolnay/anyhow");
    println!("License: Apache License Version 2.0");
    println!("");
    println!("OSS Library: thiserror");
    println!("URL: https://github.com/dtolnay/thiserror");
    println!("License: MIT OR Apache-2.0");
    println!("");
    println!("OSS Library: rand");
    println!("URL: https://github.com/rust-random/rand");
    println!("License: MIT OR Apache-2.0");
    println!("");
    println!("OSS Library: tqdm");
    println!("URL: https://github.com/mrlazy1708/tqdm");
    println!("License: MIT OR Apache-2.0");
    println!("");
    println!("OSS Library: clap");
    println!("URL: https://github.com/clap-rs/clap");
    println!("License: MIT OR Apache-2.0");
    println!("");
    println!("OSS Library: tracing");
    println!("URL: https://github.com/tokio-rs/tracing");
    println!("License: MIT");
    println!("--------");
    println!("");
}
