use clap::Parser;
use std::env;
use wsconv::simulator::config::config::{load_and_merge_configs, CliOverrides};
use wsconv::simulator::simulator::run_from_config;
use wsconv::simulator::utils::log::init_log;

/// wsconv - cycle-level model of a weight-stationary INT8 convolution accelerator
#[derive(Parser, Debug)]
#[command(name = "wsconv")]
#[command(version = "0.1.0")]
#[command(about = "Cycle-level simulator for a 16x16 weight-stationary convolution accelerator", long_about = None)]
struct Args {
  /// Configuration file merged over the built-in defaults
  #[arg(short, long, value_name = "FILE")]
  config: Option<String>,

  /// Enable step mode (interactive stepping)
  #[arg(short, long)]
  step: bool,

  /// Quiet mode (suppress progress messages)
  #[arg(short, long)]
  quiet: bool,

  /// Output trace file path (JSON lines)
  #[arg(long, value_name = "FILE")]
  trace_file: Option<String>,

  /// Int8 CHW input tensor
  #[arg(long, value_name = "FILE")]
  input: Option<String>,

  /// Int8 OIHW weight tensor (raw bytes, or text for .txt)
  #[arg(long, value_name = "FILE")]
  weights: Option<String>,

  /// Where to write the requantized int8 output
  #[arg(short, long, value_name = "FILE")]
  output: Option<String>,

  /// Fill pattern for tensors without a file: ones or ramp
  #[arg(long, value_name = "PATTERN")]
  fill: Option<String>,

  /// Skip the comparison against the reference convolution
  #[arg(long)]
  no_check: bool,
}

fn main() -> std::io::Result<()> {
  init_log();

  let args = Args::parse();
  let cli = CliOverrides {
    quiet: args.quiet,
    step: args.step,
    no_check: args.no_check,
    trace_file: args.trace_file,
    input: args.input,
    weights: args.weights,
    output: args.output,
    fill: args.fill,
  };

  let root = env::current_dir()?;
  let config = load_and_merge_configs(args.config.as_deref(), &root, &cli)?;
  let result = run_from_config(&config)?;
  println!("cycles: {}", result.cycles);

  Ok(())
}
