use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::arch::conv::accelerator::MemoryConfig;
use crate::arch::conv::job::{output_dim, ConvolutionJob};
use crate::arch::conv::regfile::fits_registers;

pub const ENV_PREFIX: &str = "WSCONV";

const DEFAULT_TOML: &str = include_str!("default.toml");

/// Simulation section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationSection {
  pub quiet: bool,
  pub step_mode: bool,
  pub trace_file: String,
  pub max_cycles: u64,
}

impl Default for SimulationSection {
  fn default() -> Self {
    Self {
      quiet: false,
      step_mode: false,
      trace_file: String::new(),
      max_cycles: 100_000_000,
    }
  }
}

/// Storage depths, in vectors
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MemorySection {
  pub weight_depth: usize,
  pub act_depth: usize,
  pub psum_depth: usize,
}

impl Default for MemorySection {
  fn default() -> Self {
    let mem = MemoryConfig::default();
    Self {
      weight_depth: mem.weight_depth,
      act_depth: mem.act_depth,
      psum_depth: mem.psum_depth,
    }
  }
}

impl MemorySection {
  pub fn to_memory_config(&self) -> MemoryConfig {
    MemoryConfig {
      weight_depth: self.weight_depth,
      act_depth: self.act_depth,
      psum_depth: self.psum_depth,
    }
  }
}

/// Convolution shape. `output_h`/`output_w` of 0 are derived.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct JobSection {
  pub kernel_h: usize,
  pub kernel_w: usize,
  pub input_h: usize,
  pub input_w: usize,
  pub in_channels: usize,
  pub out_channels: usize,
  pub stride: usize,
  pub padding: usize,
  pub output_h: usize,
  pub output_w: usize,
}

impl Default for JobSection {
  fn default() -> Self {
    Self {
      kernel_h: 3,
      kernel_w: 3,
      input_h: 8,
      input_w: 8,
      in_channels: 16,
      out_channels: 16,
      stride: 1,
      padding: 1,
      output_h: 0,
      output_w: 0,
    }
  }
}

impl JobSection {
  pub fn to_job(&self) -> ConvolutionJob {
    let mut job = ConvolutionJob::new(
      (self.kernel_h, self.kernel_w),
      (self.input_h, self.input_w),
      self.in_channels,
      self.out_channels,
      self.stride,
      self.padding,
    );
    if self.output_h != 0 {
      job.output_h = self.output_h;
    }
    if self.output_w != 0 {
      job.output_w = self.output_w;
    }
    job
  }
}

/// Tensor files and host-side post-processing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DataSection {
  pub input_path: String,
  pub weight_path: String,
  pub bias_path: String,
  pub output_path: String,
  pub fill: String,
  pub requant_shift: u32,
  pub check: bool,
}

impl Default for DataSection {
  fn default() -> Self {
    Self {
      input_path: String::new(),
      weight_path: String::new(),
      bias_path: String::new(),
      output_path: String::new(),
      fill: "ramp".to_string(),
      requant_shift: 9,
      check: true,
    }
  }
}

/// Unified application configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
  pub simulation: SimulationSection,
  pub memory: MemorySection,
  pub job: JobSection,
  pub data: DataSection,
}

/// Command-line overrides, applied last
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
  pub quiet: bool,
  pub step: bool,
  pub no_check: bool,
  pub trace_file: Option<String>,
  pub input: Option<String>,
  pub weights: Option<String>,
  pub output: Option<String>,
  pub fill: Option<String>,
}

/// Load the built-in defaults
pub fn load_default_config() -> io::Result<AppConfig> {
  parse_config(DEFAULT_TOML)
}

pub fn parse_config(content: &str) -> io::Result<AppConfig> {
  toml::from_str::<AppConfig>(content)
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("failed to parse TOML config: {}", e)))
}

/// Load a configuration file
pub fn load_config_file(path: &Path) -> io::Result<AppConfig> {
  let content = fs::read_to_string(path)
    .map_err(|e| io::Error::new(io::ErrorKind::NotFound, format!("cannot read config file {:?}: {}", path, e)))?;
  parse_config(&content)
}

macro_rules! merge_fields {
  ($base:expr, $over:expr, $default:expr, [$($field:ident),* $(,)?]) => {
    $(
      if $over.$field != $default.$field {
        $base.$field = $over.$field.clone();
      }
    )*
  };
}

/// Merge two configurations; fields the override sets away from the
/// built-in default win.
pub fn merge_config(mut base: AppConfig, override_config: AppConfig) -> AppConfig {
  let default = AppConfig::default();

  merge_fields!(
    base.simulation,
    override_config.simulation,
    default.simulation,
    [quiet, step_mode, trace_file, max_cycles]
  );
  merge_fields!(
    base.memory,
    override_config.memory,
    default.memory,
    [weight_depth, act_depth, psum_depth]
  );
  merge_fields!(
    base.job,
    override_config.job,
    default.job,
    [kernel_h, kernel_w, input_h, input_w, in_channels, out_channels, stride, padding, output_h, output_w]
  );
  merge_fields!(
    base.data,
    override_config.data,
    default.data,
    [input_path, weight_path, bias_path, output_path, fill, requant_shift, check]
  );

  base
}

/// Layer `WSCONV_<SECTION>__<KEY>` variables over `config`.
///
/// `vars` replaces the process environment when given.
pub fn apply_env_overrides(config: &AppConfig, vars: Option<HashMap<String, String>>) -> io::Result<AppConfig> {
  let to_io = |e: config::ConfigError| io::Error::new(io::ErrorKind::InvalidData, format!("environment override: {}", e));

  Config::builder()
    .add_source(Config::try_from(config).map_err(to_io)?)
    .add_source(
      Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .source(vars),
    )
    .build()
    .map_err(to_io)?
    .try_deserialize::<AppConfig>()
    .map_err(to_io)
}

/// Apply CLI overrides
pub fn apply_cli_overrides(config: &mut AppConfig, cli: &CliOverrides) {
  if cli.quiet {
    config.simulation.quiet = true;
  }
  if cli.step {
    config.simulation.step_mode = true;
  }
  if cli.no_check {
    config.data.check = false;
  }
  if let Some(file) = &cli.trace_file {
    config.simulation.trace_file = file.clone();
  }
  if let Some(path) = &cli.input {
    config.data.input_path = path.clone();
  }
  if let Some(path) = &cli.weights {
    config.data.weight_path = path.clone();
  }
  if let Some(path) = &cli.output {
    config.data.output_path = path.clone();
  }
  if let Some(fill) = &cli.fill {
    config.data.fill = fill.clone();
  }
}

fn invalid(msg: String) -> io::Error {
  io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Validate configuration
pub fn validate_config(config: &AppConfig) -> io::Result<()> {
  let section = &config.job;
  for (name, value) in [
    ("kernel_h", section.kernel_h),
    ("kernel_w", section.kernel_w),
    ("input_h", section.input_h),
    ("input_w", section.input_w),
    ("in_channels", section.in_channels),
    ("out_channels", section.out_channels),
  ] {
    if value == 0 {
      return Err(invalid(format!("job.{} must be non-zero", name)));
    }
  }

  let job = section.to_job();
  if !fits_registers(&job) {
    return Err(invalid(format!("job does not fit the configuration registers: {:?}", job)));
  }
  if section.input_h + 2 * section.padding < section.kernel_h || section.input_w + 2 * section.padding < section.kernel_w {
    return Err(invalid("kernel is larger than the padded input".to_string()));
  }
  let derived_h = output_dim(section.input_h, section.kernel_h, job.stride(), section.padding);
  let derived_w = output_dim(section.input_w, section.kernel_w, job.stride(), section.padding);
  if job.output_h != derived_h || job.output_w != derived_w {
    return Err(invalid(format!(
      "output dims {}x{} disagree with the derived {}x{}",
      job.output_h, job.output_w, derived_h, derived_w
    )));
  }

  let mem = &config.memory;
  for (name, depth, need) in [
    ("weight_depth", mem.weight_depth, job.weight_vectors()),
    ("act_depth", mem.act_depth, job.act_vectors()),
    ("psum_depth", mem.psum_depth, job.psum_slots()),
  ] {
    if depth < need {
      return Err(invalid(format!("memory.{} = {} but the job needs {}", name, depth, need)));
    }
  }

  match config.data.fill.to_lowercase().as_str() {
    "ones" | "ramp" => {},
    other => return Err(invalid(format!("unsupported fill pattern: {}", other))),
  }
  if config.data.requant_shift > 31 {
    return Err(invalid("data.requant_shift must be at most 31".to_string()));
  }
  if config.simulation.max_cycles == 0 {
    return Err(invalid("simulation.max_cycles must be non-zero".to_string()));
  }

  Ok(())
}

/// Resolve relative paths against `root`
pub fn resolve_paths(config: &mut AppConfig, root: &Path) {
  for path in [
    &mut config.simulation.trace_file,
    &mut config.data.input_path,
    &mut config.data.weight_path,
    &mut config.data.bias_path,
    &mut config.data.output_path,
  ] {
    *path = resolve_single_path(path, root);
  }
}

fn resolve_single_path(path_str: &str, root: &Path) -> String {
  if path_str.is_empty() || Path::new(path_str).is_absolute() {
    return path_str.to_string();
  }
  root.join(path_str).to_string_lossy().to_string()
}

/// Load and merge configuration
///
/// Order:
/// 1. built-in defaults
/// 2. custom configuration file, if any
/// 3. environment variables
/// 4. CLI overrides
/// 5. path resolution against `root`
/// 6. validation
pub fn load_and_merge_configs(custom_config_path: Option<&str>, root: &Path, cli: &CliOverrides) -> io::Result<AppConfig> {
  let mut config = load_default_config()?;

  if let Some(custom_path) = custom_config_path {
    let custom_path_buf = PathBuf::from(custom_path);
    let custom_path_abs = if custom_path_buf.is_absolute() {
      custom_path_buf
    } else {
      root.join(&custom_path_buf)
    };
    let custom_config = load_config_file(&custom_path_abs)?;
    config = merge_config(config, custom_config);
  }

  let mut config = apply_env_overrides(&config, None)?;
  apply_cli_overrides(&mut config, cli);
  resolve_paths(&mut config, root);
  validate_config(&config)?;

  Ok(config)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_toml_matches_default_impl() {
    assert_eq!(load_default_config().unwrap(), AppConfig::default());
  }

  #[test]
  fn test_partial_file_merges_over_defaults() {
    let custom = parse_config(
      r#"
      [job]
      kernel_h = 1
      kernel_w = 1
      padding = 0
      [data]
      fill = "ones"
      "#,
    )
    .unwrap();
    let merged = merge_config(load_default_config().unwrap(), custom);
    assert_eq!((merged.job.kernel_h, merged.job.kernel_w, merged.job.padding), (1, 1, 0));
    assert_eq!(merged.job.in_channels, 16);
    assert_eq!(merged.data.fill, "ones");
    assert!(merged.data.check);
  }

  #[test]
  fn test_env_overrides() {
    let vars = HashMap::from([
      ("WSCONV_JOB__IN_CHANNELS".to_string(), "40".to_string()),
      ("WSCONV_SIMULATION__QUIET".to_string(), "true".to_string()),
      ("OTHER_JOB__STRIDE".to_string(), "2".to_string()),
    ]);
    let config = apply_env_overrides(&AppConfig::default(), Some(vars)).unwrap();
    assert_eq!(config.job.in_channels, 40);
    assert!(config.simulation.quiet);
    assert_eq!(config.job.stride, 1);
  }

  #[test]
  fn test_cli_overrides_and_paths() {
    let mut config = AppConfig::default();
    let cli = CliOverrides {
      no_check: true,
      input: Some("data/in.bin".to_string()),
      weights: Some("/abs/w.bin".to_string()),
      ..Default::default()
    };
    apply_cli_overrides(&mut config, &cli);
    resolve_paths(&mut config, Path::new("/work"));
    assert!(!config.data.check);
    assert_eq!(config.data.input_path, "/work/data/in.bin");
    assert_eq!(config.data.weight_path, "/abs/w.bin");
    assert_eq!(config.data.bias_path, "");
  }

  #[test]
  fn test_validate_config() {
    assert!(validate_config(&AppConfig::default()).is_ok());

    let mut zero = AppConfig::default();
    zero.job.in_channels = 0;
    assert!(validate_config(&zero).is_err());

    let mut wide = AppConfig::default();
    wide.job.out_channels = 256;
    assert!(validate_config(&wide).is_err());

    let mut bad_out = AppConfig::default();
    bad_out.job.output_h = 3;
    assert!(validate_config(&bad_out).is_err());

    let mut shallow = AppConfig::default();
    shallow.memory.psum_depth = 8;
    assert!(validate_config(&shallow).is_err());

    let mut fill = AppConfig::default();
    fill.data.fill = "noise".to_string();
    assert!(validate_config(&fill).is_err());
  }
}
