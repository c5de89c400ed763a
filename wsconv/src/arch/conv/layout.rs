//! Host-side packing between dense tensors and the accelerator's vector memories.
//!
//! Activations are CHW (`[in_channel][y][x]`), weights are OIHW
//! (`[out_channel][in_channel][ky][kx]`), outputs are CHW
//! (`[out_channel][oy][ox]`), all row-major.

use super::batch::{act_addr, num_batches, psum_addr, weight_addr};
use super::job::ConvolutionJob;
use super::{AccT, AccVec, ElemT, ElemVec, ARRAY_DIM};

/// Activation vectors keyed by activation-memory address.
///
/// Lanes past the last input channel stay zero.
pub fn pack_activations(job: &ConvolutionJob, input: &[ElemT]) -> Vec<(usize, ElemVec)> {
  let ic_batches = job.ic_batches();
  let mut out = Vec::with_capacity(job.act_vectors());
  for iy in 0..job.input_h {
    for ix in 0..job.input_w {
      for icb in 0..ic_batches {
        let mut v = [0; ARRAY_DIM];
        for (lane, x) in v.iter_mut().enumerate() {
          let ic = icb * ARRAY_DIM + lane;
          if ic < job.in_channels {
            *x = input[(ic * job.input_h + iy) * job.input_w + ix];
          }
        }
        out.push((act_addr(iy, ix, icb, job.input_w, ic_batches), v));
      }
    }
  }
  out
}

/// Weight vectors keyed by weight-memory address; one vector holds the
/// input-channel batch of a single output channel at one kernel position.
pub fn pack_weights(job: &ConvolutionJob, weights: &[ElemT]) -> Vec<(usize, ElemVec)> {
  let ic_batches = job.ic_batches();
  let (kh, kw, cin) = (job.kernel_h, job.kernel_w, job.in_channels);
  let mut out = Vec::with_capacity(job.weight_vectors());
  for ky in 0..kh {
    for kx in 0..kw {
      for oc in 0..job.out_channels {
        for icb in 0..ic_batches {
          let mut v = [0; ARRAY_DIM];
          for (lane, w) in v.iter_mut().enumerate() {
            let ic = icb * ARRAY_DIM + lane;
            if ic < cin {
              *w = weights[((oc * cin + ic) * kh + ky) * kw + kx];
            }
          }
          out.push((weight_addr(ky, kx, oc, icb, kw, job.out_channels, ic_batches), v));
        }
      }
    }
  }
  out
}

/// Gather a CHW output tensor from partial-sum slots.
pub fn unpack_output<F>(job: &ConvolutionJob, mut slot: F) -> Vec<AccT>
where
  F: FnMut(usize) -> AccVec,
{
  let oc_batches = num_batches(job.out_channels);
  let mut out = vec![0; job.output_len()];
  for oy in 0..job.output_h {
    for ox in 0..job.output_w {
      for ocb in 0..oc_batches {
        let v = slot(psum_addr(oy, ox, ocb, job.output_w, oc_batches));
        for (lane, acc) in v.iter().enumerate() {
          let oc = ocb * ARRAY_DIM + lane;
          if oc < job.out_channels {
            out[(oc * job.output_h + oy) * job.output_w + ox] = *acc;
          }
        }
      }
    }
  }
  out
}
