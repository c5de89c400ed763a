// Tiling controller: iterates kernel position -> output-channel batch ->
// input-channel batch -> output pixel, emitting memory addresses and carrying
// partial-sum bookkeeping through a pipeline as deep as memory + array latency.

use serde::{Deserialize, Serialize};

use super::bank::ReadRequest;
use super::batch::{act_addr, input_coord, psum_addr, weight_addr, ChannelBatch};
use super::iteration::{IterationState, LoopBounds};
use super::job::ConvolutionJob;
use super::pipeline::{PipelineRecord, ShiftPipe};
use super::{PIPE_DEPTH, PSUM_READ_LATENCY, WEIGHT_LOAD_DEPTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
  Idle,
  CalcBatches,
  LoadWeights,
  WaitWeights,
  StreamRun,
  DrainPipe,
  UpdateLoops,
  Done,
}

/// Everything the controller drives during one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSignals {
  /// Weight memory read address
  pub weight_rd: Option<usize>,
  /// Column latching the weight data returned this cycle
  pub weight_load: Option<usize>,
  /// Activation read; `Zero` for padding taps
  pub act_rd: Option<ReadRequest>,
  /// Partial-sum storage read address
  pub psum_rd: Option<usize>,
  /// Record whose partial sum leaves the array this cycle
  pub psum_wr: Option<PipelineRecord>,
  pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Controller {
  state: ControllerState,
  /// Job sampled at start
  job: ConvolutionJob,
  bounds: LoopBounds,
  iter: IterationState,
  oc_batch: ChannelBatch,
  ic_batch: ChannelBatch,
  /// Next weight column to fetch
  col: usize,
  wait_cnt: usize,
  weight_pipe: ShiftPipe<Option<usize>>,
  psum_pipe: ShiftPipe<PipelineRecord>,
  cycle: u64,
  sweeps_done: usize,
}

impl Default for Controller {
  fn default() -> Self {
    Self::new()
  }
}

impl Controller {
  pub fn new() -> Self {
    Self {
      state: ControllerState::Idle,
      job: ConvolutionJob::default(),
      bounds: LoopBounds::default(),
      iter: IterationState::default(),
      oc_batch: ChannelBatch::default(),
      ic_batch: ChannelBatch::default(),
      col: 0,
      wait_cnt: 0,
      weight_pipe: ShiftPipe::new(WEIGHT_LOAD_DEPTH),
      psum_pipe: ShiftPipe::new(PIPE_DEPTH),
      cycle: 0,
      sweeps_done: 0,
    }
  }

  pub fn state(&self) -> ControllerState {
    self.state
  }

  pub fn iteration(&self) -> &IterationState {
    &self.iter
  }

  pub fn job(&self) -> &ConvolutionJob {
    &self.job
  }

  pub fn is_busy(&self) -> bool {
    !matches!(self.state, ControllerState::Idle | ControllerState::Done)
  }

  /// Completed (ky, kx, ocb, icb) sweeps of the current job.
  pub fn sweeps_done(&self) -> usize {
    self.sweeps_done
  }

  /// Synchronous reset; in-flight pipeline content is discarded.
  pub fn reset(&mut self) {
    *self = Self::new();
  }

  /// Advance one clock cycle.
  ///
  /// `job` is only sampled on the cycle `start` is seen in `Idle`.
  pub fn tick(&mut self, start: bool, ack: bool, job: &ConvolutionJob) -> ControlSignals {
    let mut sig = ControlSignals::default();
    let mut load_col = None;
    let mut record = PipelineRecord::default();

    match self.state {
      ControllerState::Idle => {
        if start {
          self.begin(job);
        }
      },
      ControllerState::CalcBatches => {
        self.oc_batch = ChannelBatch::new(self.job.out_channels, self.iter.ocb);
        self.ic_batch = ChannelBatch::new(self.job.in_channels, self.iter.icb);
        self.col = 0;
        log::debug!(
          "sweep ky={} kx={} oc[{:?}] ic[{:?}]",
          self.iter.ky,
          self.iter.kx,
          self.oc_batch.channels(),
          self.ic_batch.channels()
        );
        self.goto(ControllerState::LoadWeights);
      },
      ControllerState::LoadWeights => {
        let oc = self.oc_batch.base + self.col;
        sig.weight_rd = Some(weight_addr(
          self.iter.ky,
          self.iter.kx,
          oc,
          self.iter.icb,
          self.job.kernel_w,
          self.job.out_channels,
          self.bounds.ic_batches,
        ));
        load_col = Some(self.col);
        self.col += 1;
        if self.col >= self.oc_batch.width {
          self.wait_cnt = 0;
          self.goto(ControllerState::WaitWeights);
        }
      },
      ControllerState::WaitWeights => {
        // Weight registers are single-buffered: stream only once every column is latched
        self.wait_cnt += 1;
        if self.wait_cnt >= WEIGHT_LOAD_DEPTH {
          self.goto(ControllerState::StreamRun);
        }
      },
      ControllerState::StreamRun => {
        sig.act_rd = Some(self.activation_request());
        record = PipelineRecord {
          valid: true,
          clear: self.iter.is_first_visit(),
          addr: psum_addr(
            self.iter.oy,
            self.iter.ox,
            self.iter.ocb,
            self.job.output_w,
            self.bounds.oc_batches,
          ),
          lanes: self.oc_batch.width,
          issued_at: self.cycle,
        };
        match self.iter.advance_spatial(&self.bounds) {
          Some(next) => self.iter = next,
          None => {
            self.wait_cnt = 0;
            self.goto(ControllerState::DrainPipe);
          },
        }
      },
      ControllerState::DrainPipe => {
        // Nothing computed under the old weights may still be in flight when they change
        self.wait_cnt += 1;
        if self.wait_cnt >= PIPE_DEPTH {
          self.goto(ControllerState::UpdateLoops);
        }
      },
      ControllerState::UpdateLoops => {
        self.sweeps_done += 1;
        match self.iter.advance_sweep(&self.bounds) {
          Some(next) => {
            self.iter = next;
            self.goto(ControllerState::CalcBatches);
          },
          None => {
            log::info!("job finished after {} sweeps at cycle {}", self.sweeps_done, self.cycle);
            self.goto(ControllerState::Done);
          },
        }
      },
      ControllerState::Done => {
        sig.done = true;
        if !start || ack {
          self.goto(ControllerState::Idle);
        }
      },
    }

    // Storage read issued PSUM_READ_LATENCY cycles before the record retires
    let pending = self.psum_pipe.tap(PIPE_DEPTH - PSUM_READ_LATENCY);
    sig.psum_rd = pending.valid.then_some(pending.addr);
    let retired = self.psum_pipe.shift(record);
    sig.psum_wr = retired.valid.then_some(retired);
    sig.weight_load = self.weight_pipe.shift(load_col);

    self.cycle += 1;
    sig
  }

  fn begin(&mut self, job: &ConvolutionJob) {
    self.job = *job;
    self.bounds = LoopBounds::from_job(job);
    self.iter = IterationState::default();
    self.sweeps_done = 0;
    log::info!(
      "job start: {}x{} kernel, {}x{}x{} input -> {}x{}x{} output, stride {}, padding {}",
      job.kernel_h,
      job.kernel_w,
      job.in_channels,
      job.input_h,
      job.input_w,
      job.out_channels,
      job.output_h,
      job.output_w,
      job.stride(),
      job.padding
    );
    self.goto(ControllerState::CalcBatches);
  }

  fn activation_request(&self) -> ReadRequest {
    let stride = self.job.stride();
    let iy = input_coord(self.iter.oy, self.iter.ky, stride, self.job.padding, self.job.input_h);
    let ix = input_coord(self.iter.ox, self.iter.kx, stride, self.job.padding, self.job.input_w);
    match (iy, ix) {
      (Some(iy), Some(ix)) => ReadRequest::Addr(act_addr(iy, ix, self.iter.icb, self.job.input_w, self.bounds.ic_batches)),
      _ => ReadRequest::Zero,
    }
  }

  fn goto(&mut self, next: ControllerState) {
    log::trace!("cycle {}: {:?} -> {:?}", self.cycle, self.state, next);
    self.state = next;
  }
}

#[cfg(test)]
mod tests {
  use super::super::ARRAY_DIM;
  use super::*;
  use std::collections::HashMap;

  /// Run the controller alone until it reports done, collecting its outputs.
  fn run(job: &ConvolutionJob) -> Vec<ControlSignals> {
    let mut ctrl = Controller::new();
    let mut trace = Vec::new();
    let mut start = true;
    for _ in 0..1_000_000 {
      let sig = ctrl.tick(start, false, job);
      start = false;
      let done = sig.done;
      trace.push(sig);
      if done {
        return trace;
      }
    }
    panic!("controller never finished");
  }

  #[test]
  fn test_state_sequence_single_sweep() {
    let job = ConvolutionJob::new((1, 1), (2, 2), 1, 3, 1, 0);
    let mut ctrl = Controller::new();
    let mut states = Vec::new();
    let mut start = true;
    while states.last() != Some(&ControllerState::Done) {
      ctrl.tick(start, false, &job);
      start = false;
      if states.last() != Some(&ctrl.state()) {
        states.push(ctrl.state());
      }
    }
    assert_eq!(
      states,
      vec![
        ControllerState::CalcBatches,
        ControllerState::LoadWeights,
        ControllerState::WaitWeights,
        ControllerState::StreamRun,
        ControllerState::DrainPipe,
        ControllerState::UpdateLoops,
        ControllerState::Done,
      ]
    );
    // done drops once start is low
    assert!(ctrl.tick(false, false, &job).done);
    assert_eq!(ctrl.state(), ControllerState::Idle);
  }

  #[test]
  fn test_done_held_while_start_high() {
    let job = ConvolutionJob::new((1, 1), (1, 1), 1, 1, 1, 0);
    let mut ctrl = Controller::new();
    let mut cycles = 0;
    while ctrl.state() != ControllerState::Done {
      ctrl.tick(true, false, &job);
      cycles += 1;
      assert!(cycles < 1000);
    }
    assert!(ctrl.tick(true, false, &job).done);
    assert!(ctrl.tick(true, false, &job).done);
    assert!(ctrl.tick(true, true, &job).done);
    assert_eq!(ctrl.state(), ControllerState::Idle);
  }

  #[test]
  fn test_every_record_retires_after_pipe_depth() {
    let job = ConvolutionJob::new((3, 3), (5, 5), 20, 18, 1, 1);
    let trace = run(&job);
    let mut retired = 0;
    for (cycle, sig) in trace.iter().enumerate() {
      if let Some(rec) = sig.psum_wr {
        assert_eq!(cycle as u64 - rec.issued_at, PIPE_DEPTH as u64);
        // matching storage read went out PSUM_READ_LATENCY cycles earlier
        assert_eq!(trace[cycle - PSUM_READ_LATENCY].psum_rd, Some(rec.addr));
        retired += 1;
      }
    }
    let expected = job.output_h * job.output_w * LoopBounds::from_job(&job).sweeps();
    assert_eq!(retired, expected);
  }

  #[test]
  fn test_clear_once_per_slot() {
    let job = ConvolutionJob::new((2, 3), (6, 5), 33, 17, 2, 1);
    let mut clears: HashMap<usize, usize> = HashMap::new();
    let mut writes: HashMap<usize, usize> = HashMap::new();
    for sig in run(&job) {
      if let Some(rec) = sig.psum_wr {
        *writes.entry(rec.addr).or_default() += 1;
        if rec.clear {
          *clears.entry(rec.addr).or_default() += 1;
          // the first write of a slot is the clearing one
          assert_eq!(writes[&rec.addr], 1);
        }
      }
    }
    assert_eq!(clears.len(), job.psum_slots());
    assert!(clears.values().all(|n| *n == 1));
    let per_slot = job.kernel_h * job.kernel_w * job.ic_batches();
    assert!(writes.values().all(|n| *n == per_slot));
  }

  #[test]
  fn test_weight_load_aligned_with_memory_latency() {
    let job = ConvolutionJob::new((1, 2), (3, 3), 4, 20, 1, 0);
    let trace = run(&job);
    let mut loads = 0;
    for (cycle, sig) in trace.iter().enumerate() {
      if let Some(col) = sig.weight_load {
        let issued = trace[cycle - WEIGHT_LOAD_DEPTH].weight_rd;
        assert!(issued.is_some());
        assert!(col < ARRAY_DIM);
        loads += 1;
      }
    }
    // 20 output channels -> 16 + 4 columns per kernel position
    assert_eq!(loads, 2 * 20);
  }

  #[test]
  fn test_no_stream_while_weights_in_flight() {
    let job = ConvolutionJob::new((2, 2), (4, 4), 4, 4, 1, 0);
    let trace = run(&job);
    let mut last_load = None;
    for (cycle, sig) in trace.iter().enumerate() {
      if sig.weight_load.is_some() {
        last_load = Some(cycle);
        // no partial sum of the previous sweep is still in flight
        let in_flight = trace[..cycle]
          .iter()
          .enumerate()
          .filter(|(_, s)| s.act_rd.is_some())
          .any(|(c, _)| c + PIPE_DEPTH >= cycle);
        assert!(!in_flight, "weights reloaded at cycle {} with data in flight", cycle);
      }
      if sig.act_rd.is_some() {
        assert!(last_load.map_or(false, |l| l < cycle), "stream before weight load");
      }
    }
  }

  #[test]
  fn test_padding_issues_zero_requests() {
    let job = ConvolutionJob::new((3, 3), (4, 4), 1, 1, 1, 1);
    let trace = run(&job);
    let zeros = trace
      .iter()
      .filter(|s| s.act_rd == Some(ReadRequest::Zero))
      .count();
    // each of the 9 taps misses the border for some output pixels of a 4x4 image:
    // per row/column offset, 4 of 16 pixels fall outside for k != 1
    let reads: usize = (0..3)
      .flat_map(|ky| (0..3).map(move |kx| (ky, kx)))
      .map(|(ky, kx)| {
        let rows = if ky == 1 { 4 } else { 3 };
        let cols = if kx == 1 { 4 } else { 3 };
        rows * cols
      })
      .sum();
    assert_eq!(zeros, 9 * 16 - reads);
  }

  #[test]
  fn test_misconfigured_job_terminates() {
    let mut job = ConvolutionJob::new((3, 3), (4, 4), 0, 0, 1, 1);
    job.output_h = 0;
    run(&job);
  }
}
