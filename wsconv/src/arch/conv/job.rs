use serde::{Deserialize, Serialize};

use super::batch::num_batches;

/// Immutable job descriptor sampled by the controller at `start`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvolutionJob {
  pub kernel_h: usize,
  pub kernel_w: usize,
  pub input_h: usize,
  pub input_w: usize,
  pub output_h: usize,
  pub output_w: usize,
  pub in_channels: usize,
  pub out_channels: usize,
  /// Raw stride field; see [`ConvolutionJob::stride`]
  pub stride: usize,
  pub padding: usize,
}

impl ConvolutionJob {
  /// Build a job whose output dims follow the zero-padding convention.
  pub fn new(
    kernel: (usize, usize),
    input: (usize, usize),
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    padding: usize,
  ) -> Self {
    let mut job = Self {
      kernel_h: kernel.0,
      kernel_w: kernel.1,
      input_h: input.0,
      input_w: input.1,
      output_h: 0,
      output_w: 0,
      in_channels,
      out_channels,
      stride,
      padding,
    };
    job.output_h = output_dim(job.input_h, job.kernel_h, job.stride(), padding);
    job.output_w = output_dim(job.input_w, job.kernel_w, job.stride(), padding);
    job
  }

  /// A fully-connected layer is a 1x1 kernel over a 1x1 image.
  pub fn fully_connected(input_size: usize, output_size: usize) -> Self {
    Self::new((1, 1), (1, 1), input_size, output_size, 1, 0)
  }

  /// Effective stride; a stride field of 0 runs as 1.
  pub fn stride(&self) -> usize {
    self.stride.max(1)
  }

  pub fn ic_batches(&self) -> usize {
    num_batches(self.in_channels)
  }

  pub fn oc_batches(&self) -> usize {
    num_batches(self.out_channels)
  }

  /// Whether OH/OW agree with the input, kernel, stride and padding.
  pub fn is_consistent(&self) -> bool {
    self.kernel_h > 0
      && self.kernel_w > 0
      && self.in_channels > 0
      && self.out_channels > 0
      && self.input_h + 2 * self.padding >= self.kernel_h
      && self.input_w + 2 * self.padding >= self.kernel_w
      && self.output_h == output_dim(self.input_h, self.kernel_h, self.stride(), self.padding)
      && self.output_w == output_dim(self.input_w, self.kernel_w, self.stride(), self.padding)
  }

  pub fn input_len(&self) -> usize {
    self.in_channels * self.input_h * self.input_w
  }

  pub fn weight_len(&self) -> usize {
    self.out_channels * self.in_channels * self.kernel_h * self.kernel_w
  }

  pub fn output_len(&self) -> usize {
    self.out_channels * self.output_h * self.output_w
  }

  /// Activation vectors the job touches.
  pub fn act_vectors(&self) -> usize {
    self.input_h * self.input_w * self.ic_batches()
  }

  /// Weight vectors the job touches.
  pub fn weight_vectors(&self) -> usize {
    self.kernel_h * self.kernel_w * self.out_channels * self.ic_batches()
  }

  /// Partial-sum slots the job touches.
  pub fn psum_slots(&self) -> usize {
    self.output_h * self.output_w * self.oc_batches()
  }
}

pub fn output_dim(input: usize, kernel: usize, stride: usize, padding: usize) -> usize {
  (input + 2 * padding).saturating_sub(kernel) / stride.max(1) + 1
}
