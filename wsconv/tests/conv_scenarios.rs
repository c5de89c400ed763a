use std::collections::HashMap;

use wsconv::arch::conv::accelerator::{expected_cycles, Accelerator};
use wsconv::arch::conv::batch::psum_addr;
use wsconv::arch::conv::reference::{conv2d, fc};
use wsconv::arch::conv::regfile::{encode_job, REG_CHANNELS, REG_CONTROL, CONTROL_START, REG_STATUS, STATUS_DONE};
use wsconv::arch::conv::{ConvolutionJob, ARRAY_DIM, PIPE_DEPTH};

fn init() {
  let _ = env_logger::builder().is_test(true).try_init();
}

fn ramp(len: usize, modulo: usize, offset: i32) -> Vec<i8> {
  (0..len).map(|i| ((i * 5 % modulo) as i32 + offset) as i8).collect()
}

fn loaded(job: &ConvolutionJob, input: &[i8], weights: &[i8]) -> Accelerator {
  let mut acc = Accelerator::default();
  acc.enable_writeback_trace();
  acc.load_activations(job, input);
  acc.load_weights(job, weights);
  acc.start(job);
  acc
}

fn run(job: &ConvolutionJob, input: &[i8], weights: &[i8]) -> (Accelerator, u64) {
  let mut acc = loaded(job, input, weights);
  let cycles = acc.run_to_completion(50_000_000).expect("job did not finish");
  (acc, cycles)
}

#[test]
fn scenario_a_pointwise_identity() {
  init();
  let job = ConvolutionJob::new((1, 1), (4, 4), 1, 1, 1, 0);
  assert_eq!((job.output_h, job.output_w), (4, 4));
  let (acc, _) = run(&job, &[1; 16], &[1]);
  assert_eq!(acc.read_output(&job), vec![1; 16]);
  assert_eq!(acc.read_reg(REG_STATUS) & STATUS_DONE, STATUS_DONE);
}

#[test]
fn scenario_b_accumulates_across_kernel_positions() {
  init();
  let job = ConvolutionJob::new((2, 2), (4, 4), 4, 4, 1, 0);
  let mut acc = loaded(&job, &vec![1; job.input_len()], &vec![1; job.weight_len()]);

  // one channel batch each way, so the first sweep is the first kernel position
  while acc.controller().sweeps_done() < 1 {
    acc.tick();
  }
  let slot = acc.psum_slot(psum_addr(0, 0, 0, job.output_w, 1));
  assert_eq!(&slot[..4], &[4; 4]);
  assert!(slot[4..].iter().all(|v| *v == 0));

  acc.run_to_completion(100_000).expect("job did not finish");
  let out = acc.read_output(&job);
  assert_eq!(out.len(), 4 * 3 * 3);
  assert!(out.iter().all(|v| *v == 16));
}

#[test]
fn scenario_c_same_padding_borders() {
  init();
  let job = ConvolutionJob::new((3, 3), (8, 8), 1, 1, 1, 1);
  assert_eq!((job.output_h, job.output_w), (8, 8));
  let (acc, _) = run(&job, &[1; 64], &[1; 9]);
  let out = acc.read_output(&job);
  let at = |y: usize, x: usize| out[y * 8 + x];
  for (y, x) in [(0, 0), (0, 7), (7, 0), (7, 7)] {
    assert_eq!(at(y, x), 4);
  }
  assert_eq!(at(0, 3), 6);
  assert_eq!(at(4, 0), 6);
  for y in 1..7 {
    for x in 1..7 {
      assert_eq!(at(y, x), 9);
    }
  }
}

#[test]
fn multi_batch_strided_matches_reference() {
  init();
  let job = ConvolutionJob::new((3, 3), (9, 7), 33, 20, 2, 1);
  let input = ramp(job.input_len(), 17, -8);
  let weights = ramp(job.weight_len(), 11, -5);
  let (acc, cycles) = run(&job, &input, &weights);
  assert_eq!(acc.read_output(&job), conv2d(&job, &input, &weights));
  assert_eq!(acc.misaligned(), 0);
  assert_eq!(cycles, expected_cycles(&job));
}

#[test]
fn saturating_products_wrap_like_hardware() {
  init();
  let job = ConvolutionJob::new((1, 1), (2, 2), 16, 16, 1, 0);
  let input = vec![-128; job.input_len()];
  let weights = vec![-128; job.weight_len()];
  let (acc, _) = run(&job, &input, &weights);
  assert!(acc.read_output(&job).iter().all(|v| *v == 16 * 16384));
}

#[test]
fn every_slot_cleared_exactly_once() {
  init();
  let job = ConvolutionJob::new((2, 3), (5, 5), 20, 35, 1, 1);
  let (acc, _) = run(&job, &ramp(job.input_len(), 7, -3), &ramp(job.weight_len(), 5, -2));

  let mut clears: HashMap<usize, usize> = HashMap::new();
  let mut writes: HashMap<usize, usize> = HashMap::new();
  for wb in acc.writebacks() {
    *writes.entry(wb.addr).or_default() += 1;
    if wb.clear {
      *clears.entry(wb.addr).or_default() += 1;
    }
  }
  assert_eq!(clears.len(), job.psum_slots());
  assert!(clears.values().all(|n| *n == 1));
  let visits = job.kernel_h * job.kernel_w * job.ic_batches();
  assert!(writes.values().all(|n| *n == visits));
}

#[test]
fn writeback_latency_is_pipe_depth() {
  init();
  let job = ConvolutionJob::new((3, 3), (6, 6), 17, 17, 1, 0);
  let (acc, _) = run(&job, &ramp(job.input_len(), 9, -4), &ramp(job.weight_len(), 3, -1));
  assert!(!acc.writebacks().is_empty());
  assert!(acc
    .writebacks()
    .iter()
    .all(|wb| wb.cycle - wb.issued_at == PIPE_DEPTH as u64));
}

#[test]
fn replay_is_deterministic() {
  init();
  let job = ConvolutionJob::new((2, 2), (6, 5), 18, 19, 1, 1);
  let input = ramp(job.input_len(), 13, -6);
  let weights = ramp(job.weight_len(), 7, -3);
  let (a, ca) = run(&job, &input, &weights);
  let (b, cb) = run(&job, &input, &weights);
  assert_eq!(ca, cb);
  assert_eq!(a.writebacks(), b.writebacks());
  assert_eq!(a.read_output(&job), b.read_output(&job));
}

#[test]
fn fully_connected_as_pointwise_job() {
  init();
  let job = ConvolutionJob::fully_connected(40, 20);
  let input = ramp(40, 19, -9);
  let weights = ramp(40 * 20, 13, -6);
  let (acc, _) = run(&job, &input, &weights);
  assert_eq!(acc.read_output(&job), fc(&input, &weights, 20));
}

#[test]
fn start_while_busy_is_ignored() {
  init();
  let job = ConvolutionJob::new((2, 2), (4, 4), 3, 5, 1, 0);
  let input = ramp(job.input_len(), 7, -3);
  let weights = ramp(job.weight_len(), 5, -2);
  let mut acc = loaded(&job, &input, &weights);
  for _ in 0..40 {
    acc.tick();
  }
  assert!(acc.is_busy());
  acc.write_reg(REG_CONTROL, CONTROL_START);
  let rest = acc.run_to_completion(100_000).expect("job did not finish");
  assert_eq!(40 + rest, expected_cycles(&job));
  assert_eq!(acc.read_output(&job), conv2d(&job, &input, &weights));
}

#[test]
fn misconfigured_jobs_terminate() {
  init();
  let job = ConvolutionJob::new((3, 3), (4, 4), 2, 2, 1, 0);
  let mut acc = Accelerator::default();
  for (addr, value) in encode_job(&job) {
    if addr == REG_CHANNELS {
      // zero input channels
      acc.write_reg(addr, 2 << 8);
    } else {
      acc.write_reg(addr, value);
    }
  }
  assert!(acc.run_to_completion(1_000_000).is_some());

  let mut empty = Accelerator::default();
  empty.write_reg(REG_CONTROL, CONTROL_START);
  assert!(empty.run_to_completion(1_000_000).is_some());
}

#[test]
fn unused_lanes_stay_zero() {
  init();
  let job = ConvolutionJob::new((1, 1), (3, 3), 5, 3, 1, 0);
  let (acc, _) = run(&job, &vec![2; job.input_len()], &vec![3; job.weight_len()]);
  for g in 0..job.psum_slots() {
    let slot = acc.psum_slot(g);
    assert_eq!(&slot[..3], &[30; 3]);
    assert!(slot[3..ARRAY_DIM].iter().all(|v| *v == 0));
  }
}

#[test]
fn back_to_back_jobs_share_one_accelerator() {
  init();
  let first = ConvolutionJob::new((3, 3), (6, 6), 18, 20, 1, 1);
  let first_input = ramp(first.input_len(), 11, -5);
  let first_weights = ramp(first.weight_len(), 7, -3);
  let (mut acc, cycles) = run(&first, &first_input, &first_weights);
  assert_eq!(cycles, expected_cycles(&first));
  assert_eq!(acc.read_output(&first), conv2d(&first, &first_input, &first_weights));

  // smaller job over the same memories; its first write to each slot clears it
  let second = ConvolutionJob::new((2, 2), (4, 4), 3, 5, 1, 0);
  let second_input = ramp(second.input_len(), 9, -4);
  let second_weights = ramp(second.weight_len(), 5, -2);
  acc.load_activations(&second, &second_input);
  acc.load_weights(&second, &second_weights);
  acc.start(&second);
  assert_eq!(acc.read_reg(REG_STATUS) & STATUS_DONE, 0);

  let cycles = acc.run_to_completion(1_000_000).expect("second job did not finish");
  assert_eq!(cycles, expected_cycles(&second));
  assert_eq!(acc.read_output(&second), conv2d(&second, &second_input, &second_weights));
  assert_eq!(acc.read_reg(REG_STATUS) & STATUS_DONE, STATUS_DONE);
  assert_eq!(acc.misaligned(), 0);
}
