//! Host-side tensors for one job: loading, synthetic fills, requantization
//! and the golden-model check.

use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use super::config::AppConfig;
use crate::arch::conv::job::ConvolutionJob;
use crate::arch::conv::reference::{conv2d, requantize_tensor};
use crate::arch::conv::regfile::fits_registers;
use crate::arch::conv::{AccT, ElemT};

/// Synthetic data used when no tensor file is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
  Ones,
  Ramp,
}

impl FromStr for Fill {
  type Err = io::Error;

  fn from_str(s: &str) -> io::Result<Self> {
    match s.to_lowercase().as_str() {
      "ones" => Ok(Fill::Ones),
      "ramp" => Ok(Fill::Ramp),
      other => Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("unknown fill pattern: {}", other),
      )),
    }
  }
}

impl Fill {
  /// Deterministic tensor of `len` values; `seed` decorrelates tensors.
  pub fn generate(self, len: usize, seed: usize) -> Vec<ElemT> {
    match self {
      Fill::Ones => vec![1; len],
      Fill::Ramp => (0..len).map(|i| ((i * 7 + seed * 13) % 15) as ElemT - 7).collect(),
    }
  }
}

/// Read a raw int8 tensor and check its element count.
pub fn read_int8_tensor(path: &Path, expected_len: usize) -> io::Result<Vec<ElemT>> {
  let bytes = fs::read(path)
    .map_err(|e| io::Error::new(e.kind(), format!("cannot read tensor {:?}: {}", path, e)))?;
  if bytes.len() != expected_len {
    return Err(io::Error::new(
      io::ErrorKind::InvalidData,
      format!("tensor {:?} holds {} values, expected {}", path, bytes.len(), expected_len),
    ));
  }
  Ok(bytes.into_iter().map(|b| b as ElemT).collect())
}

pub fn write_int8_tensor(path: &Path, data: &[ElemT]) -> io::Result<()> {
  let bytes: Vec<u8> = data.iter().map(|v| *v as u8).collect();
  fs::write(path, bytes)
}

/// Whitespace-separated numbers from a text file.
fn read_numbers(path: &Path, what: &str) -> io::Result<Vec<f64>> {
  let text = fs::read_to_string(path)
    .map_err(|e| io::Error::new(e.kind(), format!("cannot read {} {:?}: {}", what, path, e)))?;
  text
    .split_whitespace()
    .map(|tok| {
      tok
        .parse::<f64>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("bad {} value '{}': {}", what, tok, e)))
    })
    .collect()
}

fn check_len(path: &Path, what: &str, len: usize, expected_len: usize) -> io::Result<()> {
  if len != expected_len {
    return Err(io::Error::new(
      io::ErrorKind::InvalidData,
      format!("{} {:?} holds {} values, expected {}", what, path, len, expected_len),
    ));
  }
  Ok(())
}

/// Read whitespace-separated bias values, one per output channel.
/// Fractional values are rounded to the nearest integer.
pub fn read_bias(path: &Path, expected_len: usize) -> io::Result<Vec<AccT>> {
  let values = read_numbers(path, "bias")?;
  check_len(path, "bias", values.len(), expected_len)?;
  Ok(values.into_iter().map(|v| v.round() as AccT).collect())
}

/// Read a tensor stored as whitespace-separated text. Values are rounded and
/// clipped to the int8 range.
pub fn read_int8_text(path: &Path, expected_len: usize) -> io::Result<Vec<ElemT>> {
  let values = read_numbers(path, "tensor")?;
  check_len(path, "tensor", values.len(), expected_len)?;
  Ok(
    values
      .into_iter()
      .map(|v| v.round().clamp(ElemT::MIN as f64, ElemT::MAX as f64) as ElemT)
      .collect(),
  )
}

/// Load an int8 tensor, as text when the file ends in `.txt` and as raw
/// bytes otherwise.
pub fn load_int8_tensor(path: &Path, expected_len: usize) -> io::Result<Vec<ElemT>> {
  match path.extension().and_then(|ext| ext.to_str()) {
    Some("txt") => read_int8_text(path, expected_len),
    _ => read_int8_tensor(path, expected_len),
  }
}

/// Everything the host hands to, and expects back from, one job.
#[derive(Debug, Clone)]
pub struct Workload {
  pub job: ConvolutionJob,
  /// CHW
  pub input: Vec<ElemT>,
  /// OIHW
  pub weights: Vec<ElemT>,
  pub bias: Vec<AccT>,
  pub requant_shift: u32,
}

impl Workload {
  pub fn new(job: ConvolutionJob, input: Vec<ElemT>, weights: Vec<ElemT>) -> Self {
    let bias = vec![0; job.out_channels];
    Self {
      job,
      input,
      weights,
      bias,
      requant_shift: 0,
    }
  }

  /// Build the workload a configuration describes, falling back to the fill
  /// pattern for tensors without a file.
  pub fn from_config(config: &AppConfig) -> io::Result<Self> {
    let job = config.job.to_job();
    let fill: Fill = config.data.fill.parse()?;

    let input = match config.data.input_path.as_str() {
      "" => fill.generate(job.input_len(), 0),
      path => load_int8_tensor(Path::new(path), job.input_len())?,
    };
    let weights = match config.data.weight_path.as_str() {
      "" => fill.generate(job.weight_len(), 1),
      path => load_int8_tensor(Path::new(path), job.weight_len())?,
    };
    let bias = match config.data.bias_path.as_str() {
      "" => vec![0; job.out_channels],
      path => read_bias(Path::new(path), job.out_channels)?,
    };

    Ok(Self {
      job,
      input,
      weights,
      bias,
      requant_shift: config.data.requant_shift,
    })
  }

  /// Reject jobs the register file cannot encode and tensors that do not
  /// match the job's shape.
  pub fn validate(&self) -> io::Result<()> {
    let invalid = |msg: String| Err(io::Error::new(io::ErrorKind::InvalidData, msg));
    if !fits_registers(&self.job) {
      return invalid(format!("job {:?} does not fit the configuration registers", self.job));
    }
    if self.input.len() != self.job.input_len() {
      return invalid(format!("input holds {} values, expected {}", self.input.len(), self.job.input_len()));
    }
    if self.weights.len() != self.job.weight_len() {
      return invalid(format!("weights hold {} values, expected {}", self.weights.len(), self.job.weight_len()));
    }
    if self.bias.len() != self.job.out_channels {
      return invalid(format!("bias holds {} values, expected {}", self.bias.len(), self.job.out_channels));
    }
    Ok(())
  }

  /// Raw accumulators the golden model expects.
  pub fn reference(&self) -> Vec<AccT> {
    conv2d(&self.job, &self.input, &self.weights)
  }

  /// Bias, shift and clip a raw CHW accumulator tensor.
  pub fn requantize(&self, acc: &[AccT]) -> Vec<ElemT> {
    let plane = self.job.output_h * self.job.output_w;
    requantize_tensor(acc, &self.bias, plane, self.requant_shift)
  }

  /// Compare raw accumulators against the golden model.
  pub fn check(&self, acc: &[AccT]) -> io::Result<()> {
    let expected = self.reference();
    if acc.len() != expected.len() {
      return Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("output holds {} values, expected {}", acc.len(), expected.len()),
      ));
    }
    let plane = self.job.output_h * self.job.output_w;
    let mismatches: Vec<usize> = (0..acc.len()).filter(|i| acc[*i] != expected[*i]).collect();
    if let Some(&first) = mismatches.first() {
      let (oc, rest) = (first / plane, first % plane);
      return Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!(
          "{} mismatches; first at oc={} oy={} ox={}: got {}, expected {}",
          mismatches.len(),
          oc,
          rest / self.job.output_w,
          rest % self.job.output_w,
          acc[first],
          expected[first]
        ),
      ));
    }
    Ok(())
  }
}
