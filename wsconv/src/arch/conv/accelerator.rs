use serde::{Deserialize, Serialize};

use super::accumulator::{accumulate, mask_lanes};
use super::bank::{Bank, ReadRequest};
use super::batch::batch_width;
use super::controller::{Controller, ControllerState};
use super::iteration::LoopBounds;
use super::job::ConvolutionJob;
use super::layout::{pack_activations, pack_weights, unpack_output};
use super::regfile::{encode_job, RegisterFile};
use super::systolic_array::SystolicArray;
use super::{AccT, AccVec, ElemT, ElemVec, MEM_READ_LATENCY, PIPE_DEPTH, PSUM_READ_LATENCY, WEIGHT_LOAD_DEPTH};

/// Storage depths, in vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
  pub weight_depth: usize,
  pub act_depth: usize,
  pub psum_depth: usize,
}

impl Default for MemoryConfig {
  fn default() -> Self {
    Self {
      weight_depth: 1 << 16,
      act_depth: 1 << 16,
      psum_depth: 1 << 16,
    }
  }
}

/// One partial-sum write-back, kept when tracing is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBack {
  pub cycle: u64,
  pub issued_at: u64,
  pub addr: usize,
  pub clear: bool,
}

/// Accelerator core: register file, controller, PE array, memories and the
/// partial-sum read-modify-write path, advanced one clock at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Accelerator {
  regs: RegisterFile,
  controller: Controller,
  array: SystolicArray,
  weight_mem: Bank<ElemVec>,
  act_mem: Bank<ElemVec>,
  psum_mem: Bank<AccVec>,
  cycle: u64,
  /// Write-backs whose array output was not valid
  misaligned: u64,
  writebacks: Option<Vec<WriteBack>>,
}

impl Default for Accelerator {
  fn default() -> Self {
    Self::new(MemoryConfig::default())
  }
}

impl Accelerator {
  pub fn new(mem: MemoryConfig) -> Self {
    Self {
      regs: RegisterFile::new(),
      controller: Controller::new(),
      array: SystolicArray::new(),
      weight_mem: Bank::new(mem.weight_depth, MEM_READ_LATENCY),
      act_mem: Bank::new(mem.act_depth, MEM_READ_LATENCY),
      psum_mem: Bank::new(mem.psum_depth, PSUM_READ_LATENCY),
      cycle: 0,
      misaligned: 0,
      writebacks: None,
    }
  }

  /// Keep a log of every partial-sum write-back.
  pub fn enable_writeback_trace(&mut self) {
    self.writebacks.get_or_insert_with(Vec::new);
  }

  pub fn writebacks(&self) -> &[WriteBack] {
    self.writebacks.as_deref().unwrap_or(&[])
  }

  pub fn write_reg(&mut self, addr: u32, value: u32) {
    self.regs.write(addr, value);
  }

  pub fn read_reg(&self, addr: u32) -> u32 {
    self.regs.read(addr)
  }

  /// Job currently described by the configuration registers.
  pub fn job(&self) -> ConvolutionJob {
    self.regs.job()
  }

  pub fn controller(&self) -> &Controller {
    &self.controller
  }

  pub fn cycle(&self) -> u64 {
    self.cycle
  }

  pub fn misaligned(&self) -> u64 {
    self.misaligned
  }

  pub fn is_busy(&self) -> bool {
    self.controller.is_busy()
  }

  pub fn is_done(&self) -> bool {
    self.regs.is_done()
  }

  /// Global synchronous reset. Memory contents and latched weights survive;
  /// every sweep reloads its weights before streaming.
  pub fn reset(&mut self) {
    self.regs.reset();
    self.controller.reset();
    self.array.flush();
    self.weight_mem.reset_port();
    self.act_mem.reset_port();
    self.psum_mem.reset_port();
    self.cycle = 0;
    self.misaligned = 0;
    if let Some(log) = self.writebacks.as_mut() {
      log.clear();
    }
  }

  /// Advance one clock cycle. Returns true on cycles the controller asserts done.
  pub fn tick(&mut self) -> bool {
    let start = self.regs.take_start();
    let job = self.regs.job();
    let sig = self.controller.tick(start, false, &job);

    let weight = self.weight_mem.tick(sig.weight_rd.map(ReadRequest::Addr));
    let act = self.act_mem.tick(sig.act_rd);
    let out = self.array.tick(act);
    if let (Some(col), Some(w)) = (sig.weight_load, weight) {
      self.array.load_column(col, &w);
    }

    let stored = self.psum_mem.tick(sig.psum_rd.map(ReadRequest::Addr));
    if let Some(rec) = sig.psum_wr {
      if !out.valid || stored.is_none() {
        self.misaligned += 1;
        log::warn!(
          "cycle {}: write-back to {} issued at {} met no valid data (array valid={}, stored={})",
          self.cycle,
          rec.addr,
          rec.issued_at,
          out.valid,
          stored.is_some()
        );
      }
      let merged = accumulate(rec.clear, &out.psum, &stored.unwrap_or_default());
      self.psum_mem.write(rec.addr, mask_lanes(merged, rec.lanes));
      if let Some(log) = self.writebacks.as_mut() {
        log.push(WriteBack {
          cycle: self.cycle,
          issued_at: rec.issued_at,
          addr: rec.addr,
          clear: rec.clear,
        });
      }
    }

    if sig.done {
      self.regs.set_done();
    }
    self.cycle += 1;
    sig.done
  }

  /// Tick until done or `max_cycles` elapse; returns the cycles spent.
  pub fn run_to_completion(&mut self, max_cycles: u64) -> Option<u64> {
    let begin = self.cycle;
    while self.cycle - begin < max_cycles {
      if self.tick() {
        return Some(self.cycle - begin);
      }
    }
    None
  }

  /// Program the job registers and raise start.
  pub fn start(&mut self, job: &ConvolutionJob) {
    for (addr, value) in encode_job(job) {
      self.write_reg(addr, value);
    }
  }

  // ===========================================
  // Host (backdoor) access
  // ===========================================

  /// Fill weight memory from an OIHW tensor.
  pub fn load_weights(&mut self, job: &ConvolutionJob, weights: &[ElemT]) {
    for (addr, v) in pack_weights(job, weights) {
      self.weight_mem.write(addr, v);
    }
  }

  /// Fill activation memory from a CHW tensor.
  pub fn load_activations(&mut self, job: &ConvolutionJob, input: &[ElemT]) {
    for (addr, v) in pack_activations(job, input) {
      self.act_mem.write(addr, v);
    }
  }

  pub fn psum_slot(&self, addr: usize) -> AccVec {
    self.psum_mem.peek(addr)
  }

  /// Read the raw accumulators of `job` as a CHW tensor.
  pub fn read_output(&self, job: &ConvolutionJob) -> Vec<AccT> {
    unpack_output(job, |addr| self.psum_mem.peek(addr))
  }

  /// Whether the controller sits between sweeps with nothing in flight.
  pub fn is_quiescent(&self) -> bool {
    !self.array.is_busy()
      && matches!(
        self.controller.state(),
        ControllerState::Idle | ControllerState::Done | ControllerState::UpdateLoops
      )
  }
}

/// Cycles a job takes from the start pulse until done is raised.
pub fn expected_cycles(job: &ConvolutionJob) -> u64 {
  let bounds = LoopBounds::from_job(job);
  let stream = (job.output_h * job.output_w) as u64;
  let oc_batches = job.oc_batches();
  let mut per_kernel = 0u64;
  for ocb in 0..oc_batches {
    let width = batch_width(job.out_channels, ocb) as u64;
    // CalcBatches + LoadWeights + WaitWeights + StreamRun + DrainPipe + UpdateLoops
    let sweep = 1 + width + WEIGHT_LOAD_DEPTH as u64 + stream + PIPE_DEPTH as u64 + 1;
    per_kernel += sweep * bounds.ic_batches as u64;
  }
  // one Idle cycle samples start, one Done cycle raises done
  1 + per_kernel * (bounds.kh * bounds.kw) as u64 + 1
}
