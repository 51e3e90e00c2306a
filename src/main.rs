use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use qconv::config::{LayerConfig, Precision};
use qconv::conv::{conv_per_channel, conv_per_channel_par, ConvVariant, Int16Conv, Int8Conv};
use qconv::reduce::{Backend, DotReduce, ScalarReduce};
use qconv::vcopy::{vcopy_with, COPY_VLMAX};
use qconv::{TensorView, TensorViewMut};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "qconv", version, about = "Time quantized convolution layers and the vector bulk copy")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one convolution layer repeatedly and check it against the scalar reduction
    Conv(ConvArgs),
    /// Time the bulk copy over a frame-sized buffer
    Copy(CopyArgs),
}

#[derive(clap::Args, Debug)]
struct ConvArgs {
    /// Layer description (JSON); defaults to a 48x48x16 -> 32 channel 3x3 layer
    #[arg(long)]
    layer: Option<PathBuf>,

    /// Reduction backend: auto, scalar, strip, avx2, neon
    #[arg(long, default_value = "auto")]
    backend: Backend,

    /// Timed iterations
    #[arg(long, default_value_t = 50)]
    iters: usize,

    /// Threads (rows are split across a rayon pool when > 1)
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Seed for the synthetic tensors
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,

    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct CopyArgs {
    /// Bytes per copy (default: one 96x96 RGBA frame)
    #[arg(long, default_value_t = 96 * 96 * 4)]
    bytes: usize,

    /// Timed iterations
    #[arg(long, default_value_t = 10_000)]
    iters: usize,

    /// Maximum bytes granted per strip
    #[arg(long, default_value_t = COPY_VLMAX)]
    vlmax: usize,
}

#[derive(Serialize, Debug)]
struct ConvReport {
    backend: &'static str,
    precision: Precision,
    threads: usize,
    input: [usize; 4],
    filter: [usize; 4],
    output: [usize; 4],
    iters: usize,
    total_ms: f64,
    per_iter_us: f64,
    gmacs: f64,
    matches_scalar: bool,
}

/// Random tensor contents per data width.
trait Synthetic: ConvVariant {
    fn input(rng: &mut SmallRng) -> Self::Input;
    fn bias(rng: &mut SmallRng) -> Self::Bias;
}

impl Synthetic for Int8Conv {
    fn input(rng: &mut SmallRng) -> i8 { rng.gen() }
    fn bias(rng: &mut SmallRng) -> i32 { rng.gen_range(-4096..4096) }
}

impl Synthetic for Int16Conv {
    fn input(rng: &mut SmallRng) -> i16 { rng.gen() }
    fn bias(rng: &mut SmallRng) -> i64 { rng.gen_range(-65_536..65_536) }
}

fn run_layer<V>(cfg: &LayerConfig, reducer: &dyn DotReduce, args: &ConvArgs) -> Result<ConvReport>
where
    V: Synthetic,
    V::Output: Default + PartialEq,
{
    let mut rng = SmallRng::seed_from_u64(args.seed);
    let in_shape = cfg.input_shape();
    let f_shape = cfg.filter_shape();
    let out_shape = cfg.output_shape();
    let input: Vec<V::Input> = (0..in_shape.flat_size()).map(|_| V::input(&mut rng)).collect();
    let filter: Vec<i8> = (0..f_shape.flat_size()).map(|_| rng.gen()).collect();
    let bias: Option<Vec<V::Bias>> = if cfg.bias {
        Some((0..f_shape.batch()).map(|_| V::bias(&mut rng)).collect())
    } else {
        None
    };
    let rescale = cfg.rescale()?;
    let quant = rescale.as_per_channel();
    let iv = TensorView::new(in_shape, &input)?;
    let fv = TensorView::new(f_shape, &filter)?;

    let mut expected = vec![V::Output::default(); out_shape.flat_size()];
    {
        let mut ov = TensorViewMut::new(out_shape, &mut expected)?;
        conv_per_channel::<V, _>(&ScalarReduce, &cfg.params, &quant, &iv, &fv, bias.as_deref(), &mut ov);
    }

    let threads = args.threads.max(1);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().context("build thread pool")?;
    let iters = args.iters.max(1);
    let pb = ProgressBar::new(iters as u64);
    pb.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed_precise}]")?);

    let mut got = vec![V::Output::default(); out_shape.flat_size()];
    let t0 = Instant::now();
    for _ in 0..iters {
        let mut ov = TensorViewMut::new(out_shape, &mut got)?;
        if threads > 1 {
            pool.install(|| conv_per_channel_par::<V, _>(reducer, &cfg.params, &quant, &iv, &fv, bias.as_deref(), &mut ov));
        } else {
            conv_per_channel::<V, _>(reducer, &cfg.params, &quant, &iv, &fv, bias.as_deref(), &mut ov);
        }
        pb.inc(1);
    }
    let dt = t0.elapsed();
    pb.finish_and_clear();

    let secs = dt.as_secs_f64();
    let gmacs = if secs > 0.0 { cfg.macs() as f64 * iters as f64 / secs / 1e9 } else { 0.0 };
    Ok(ConvReport {
        backend: reducer.name(),
        precision: cfg.precision,
        threads,
        input: cfg.input,
        filter: cfg.filter,
        output: out_shape.dims,
        iters,
        total_ms: secs * 1e3,
        per_iter_us: secs * 1e6 / iters as f64,
        gmacs,
        matches_scalar: got == expected,
    })
}

fn run_conv(args: &ConvArgs) -> Result<()> {
    let cfg = match &args.layer {
        Some(path) => LayerConfig::load(path)?,
        None => LayerConfig::default(),
    };
    let reducer = args
        .backend
        .resolve()
        .with_context(|| format!("backend {:?} is not available on this machine", args.backend))?;
    info!("layer {:?} * {:?} -> {:?} ({:?}) on {}", cfg.input, cfg.filter, cfg.output_shape().dims, cfg.precision, reducer.name());

    let report = match cfg.precision {
        Precision::Int8 => run_layer::<Int8Conv>(&cfg, reducer, args)?,
        Precision::Int16 => run_layer::<Int16Conv>(&cfg, reducer, args)?,
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "backend={} precision={:?} threads={} iters={} elapsed={:.3}ms per_iter={:.1}us gmacs={:.3} matches_scalar={}",
            report.backend, report.precision, report.threads, report.iters, report.total_ms, report.per_iter_us, report.gmacs, report.matches_scalar
        );
    }
    if !report.matches_scalar {
        bail!("{} backend disagrees with the scalar reduction", report.backend);
    }
    Ok(())
}

fn run_copy(args: &CopyArgs) -> Result<()> {
    if args.vlmax == 0 {
        bail!("--vlmax must be positive");
    }
    let mut rng = SmallRng::seed_from_u64(7);
    let src: Vec<u8> = (0..args.bytes).map(|_| rng.gen()).collect();
    let mut dst = vec![0u8; args.bytes];
    let iters = args.iters.max(1);
    let t0 = Instant::now();
    for _ in 0..iters {
        vcopy_with(&mut dst, &src, args.bytes, args.vlmax);
    }
    let secs = t0.elapsed().as_secs_f64();
    if dst != src {
        bail!("copy mismatch");
    }
    let mbps = if secs > 0.0 { (args.bytes * iters) as f64 / secs / 1e6 } else { 0.0 };
    println!("bytes={} iters={} vlmax={} elapsed={:.3}s throughput={:.1}MB/s", args.bytes, iters, args.vlmax, secs, mbps);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match &cli.cmd {
        Command::Conv(args) => run_conv(args),
        Command::Copy(args) => run_copy(args),
    }
}
