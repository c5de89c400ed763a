use serde::{Deserialize, Serialize};

use super::job::ConvolutionJob;

// Register map (32-bit words)
pub const REG_CONTROL: u32 = 0;
pub const REG_STATUS: u32 = 1;
pub const REG_KERNEL_DIMS: u32 = 2;
pub const REG_INPUT_DIMS: u32 = 3;
pub const REG_STRIDE_PAD: u32 = 4;
pub const REG_OUTPUT_DIMS: u32 = 5;
pub const REG_CHANNELS: u32 = 6;
pub const NUM_REGS: usize = 7;

pub const CONTROL_START: u32 = 1 << 0;
pub const STATUS_DONE: u32 = 1 << 0;

/// Memory-mapped configuration registers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterFile {
  regs: [u32; NUM_REGS],
  /// Pending start pulse, consumed by the next cycle
  start: bool,
  /// Sticky done bit
  done: bool,
}

impl RegisterFile {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn write(&mut self, addr: u32, value: u32) {
    match addr {
      REG_CONTROL => {
        if value & CONTROL_START != 0 {
          self.start = true;
          self.done = false;
        }
      },
      REG_STATUS => {},
      a if (a as usize) < NUM_REGS => self.regs[a as usize] = value,
      _ => log::debug!("ignored write to unmapped register {}", addr),
    }
  }

  pub fn read(&self, addr: u32) -> u32 {
    match addr {
      REG_CONTROL => {
        if self.start {
          CONTROL_START
        } else {
          0
        }
      },
      REG_STATUS => {
        if self.done {
          STATUS_DONE
        } else {
          0
        }
      },
      a if (a as usize) < NUM_REGS => self.regs[a as usize],
      _ => 0,
    }
  }

  /// Take the start pulse; the control bit clears itself once sampled.
  pub fn take_start(&mut self) -> bool {
    std::mem::take(&mut self.start)
  }

  pub fn set_done(&mut self) {
    self.done = true;
  }

  pub fn is_done(&self) -> bool {
    self.done
  }

  pub fn reset(&mut self) {
    *self = Self::default();
  }

  /// Decode the job descriptor from the configuration registers.
  pub fn job(&self) -> ConvolutionJob {
    let kernel = self.regs[REG_KERNEL_DIMS as usize];
    let input = self.regs[REG_INPUT_DIMS as usize];
    let stride_pad = self.regs[REG_STRIDE_PAD as usize];
    let output = self.regs[REG_OUTPUT_DIMS as usize];
    let channels = self.regs[REG_CHANNELS as usize];
    ConvolutionJob {
      kernel_w: field(kernel, 0, 4),
      kernel_h: field(kernel, 8, 4),
      input_w: field(input, 0, 8),
      input_h: field(input, 8, 8),
      stride: field(stride_pad, 0, 4),
      padding: field(stride_pad, 4, 4),
      output_w: field(output, 0, 8),
      output_h: field(output, 8, 8),
      in_channels: field(channels, 0, 8),
      out_channels: field(channels, 8, 8),
    }
  }
}

fn field(word: u32, lsb: u32, bits: u32) -> usize {
  ((word >> lsb) & ((1 << bits) - 1)) as usize
}

/// Whether every job field fits its register field.
pub fn fits_registers(job: &ConvolutionJob) -> bool {
  job.kernel_h < 16
    && job.kernel_w < 16
    && job.stride < 16
    && job.padding < 16
    && job.input_h < 256
    && job.input_w < 256
    && job.output_h < 256
    && job.output_w < 256
    && job.in_channels < 256
    && job.out_channels < 256
}

/// Register writes a host issues to program `job`, ending with the start pulse.
pub fn encode_job(job: &ConvolutionJob) -> Vec<(u32, u32)> {
  let kernel = (job.kernel_w as u32 & 0xf) | ((job.kernel_h as u32 & 0xf) << 8);
  let input = (job.input_w as u32 & 0xff) | ((job.input_h as u32 & 0xff) << 8);
  let stride_pad = (job.stride as u32 & 0xf) | ((job.padding as u32 & 0xf) << 4);
  let output = (job.output_w as u32 & 0xff) | ((job.output_h as u32 & 0xff) << 8);
  let channels = (job.in_channels as u32 & 0xff) | ((job.out_channels as u32 & 0xff) << 8);
  vec![
    (REG_KERNEL_DIMS, kernel),
    (REG_INPUT_DIMS, input),
    (REG_STRIDE_PAD, stride_pad),
    (REG_OUTPUT_DIMS, output),
    (REG_CHANNELS, channels),
    (REG_CONTROL, CONTROL_START),
  ]
}
