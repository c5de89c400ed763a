//! Golden models used to check the cycle model, plus the host-side
//! requantization applied to raw partial sums.

use super::batch::input_coord;
use super::job::ConvolutionJob;
use super::{AccT, ElemT};

pub const OUTPUT_CLIP: i32 = 127;

/// Zero-padded direct convolution over a CHW input and OIHW weights.
///
/// Returns the raw 32-bit accumulators in CHW order, wrapping like the hardware.
pub fn conv2d(job: &ConvolutionJob, input: &[ElemT], weights: &[ElemT]) -> Vec<AccT> {
  let stride = job.stride();
  let (kh, kw, cin) = (job.kernel_h, job.kernel_w, job.in_channels);
  let mut out = vec![0; job.output_len()];
  for oc in 0..job.out_channels {
    for oy in 0..job.output_h {
      for ox in 0..job.output_w {
        let mut acc: AccT = 0;
        for ic in 0..cin {
          for ky in 0..kh {
            let Some(iy) = input_coord(oy, ky, stride, job.padding, job.input_h) else {
              continue;
            };
            for kx in 0..kw {
              let Some(ix) = input_coord(ox, kx, stride, job.padding, job.input_w) else {
                continue;
              };
              let x = input[(ic * job.input_h + iy) * job.input_w + ix] as AccT;
              let w = weights[((oc * cin + ic) * kh + ky) * kw + kx] as AccT;
              acc = acc.wrapping_add(x * w);
            }
          }
        }
        out[(oc * job.output_h + oy) * job.output_w + ox] = acc;
      }
    }
  }
  out
}

/// Fully-connected layer, weights laid out `[output][input]`.
pub fn fc(input: &[ElemT], weights: &[ElemT], output_size: usize) -> Vec<AccT> {
  let input_size = input.len();
  (0..output_size)
    .map(|o| {
      input
        .iter()
        .zip(&weights[o * input_size..(o + 1) * input_size])
        .fold(0, |acc: AccT, (x, w)| acc.wrapping_add(*x as AccT * *w as AccT))
    })
    .collect()
}

/// Add bias, arithmetic shift right, clip to the symmetric int8 range.
pub fn requantize(acc: AccT, bias: AccT, shift: u32) -> ElemT {
  let shifted = acc.wrapping_add(bias) >> shift.min(31);
  shifted.clamp(-OUTPUT_CLIP, OUTPUT_CLIP) as ElemT
}

/// Requantize a CHW tensor with one bias per output channel.
pub fn requantize_tensor(acc: &[AccT], bias: &[AccT], plane: usize, shift: u32) -> Vec<ElemT> {
  acc
    .iter()
    .enumerate()
    .map(|(i, a)| {
      let b = if plane == 0 { 0 } else { bias.get(i / plane).copied().unwrap_or(0) };
      requantize(*a, b, shift)
    })
    .collect()
}
