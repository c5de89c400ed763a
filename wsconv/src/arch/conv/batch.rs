use serde::{Deserialize, Serialize};

use super::ARRAY_DIM;

/// A contiguous group of at most `ARRAY_DIM` channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelBatch {
  /// Batch index
  pub index: usize,
  /// First channel covered by the batch
  pub base: usize,
  /// Number of live channels, 1..=ARRAY_DIM for a well-formed job
  pub width: usize,
}

impl ChannelBatch {
  pub fn new(channels: usize, index: usize) -> Self {
    Self {
      index,
      base: index * ARRAY_DIM,
      width: batch_width(channels, index),
    }
  }

  pub fn channels(&self) -> std::ops::Range<usize> {
    self.base..self.base + self.width
  }
}

pub fn num_batches(channels: usize) -> usize {
  channels.div_ceil(ARRAY_DIM)
}

/// Width of batch `index`; only the last batch may be narrower than the array.
pub fn batch_width(channels: usize, index: usize) -> usize {
  let batches = num_batches(channels);
  if index + 1 < batches {
    ARRAY_DIM
  } else if index + 1 == batches {
    channels - ARRAY_DIM * (batches - 1)
  } else {
    0
  }
}

/// Maps an output coordinate and kernel offset to an input coordinate.
///
/// Returns `None` when the tap falls into the zero-padding border.
pub fn input_coord(out: usize, k: usize, stride: usize, padding: usize, extent: usize) -> Option<usize> {
  let pos = (out * stride + k) as i64 - padding as i64;
  if pos >= 0 && (pos as usize) < extent {
    Some(pos as usize)
  } else {
    None
  }
}

// ===========================================
// Address generation
// ===========================================

/// Weight memory address of the input-channel-batch vector for output channel `oc`
/// at kernel position (ky, kx).
pub fn weight_addr(ky: usize, kx: usize, oc: usize, icb: usize, kw: usize, cout: usize, ic_batches: usize) -> usize {
  ((ky * kw + kx) * cout + oc) * ic_batches + icb
}

/// Activation memory address of input-channel batch `icb` at pixel (iy, ix).
pub fn act_addr(iy: usize, ix: usize, icb: usize, iw: usize, ic_batches: usize) -> usize {
  (iy * iw + ix) * ic_batches + icb
}

/// Partial-sum storage address of output-channel batch `ocb` at output pixel (oy, ox).
pub fn psum_addr(oy: usize, ox: usize, ocb: usize, ow: usize, oc_batches: usize) -> usize {
  (oy * ow + ox) * oc_batches + ocb
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  #[test]
  fn test_batch_sizing() {
    assert_eq!(num_batches(1), 1);
    assert_eq!(num_batches(16), 1);
    assert_eq!(num_batches(17), 2);
    assert_eq!(num_batches(40), 3);

    assert_eq!(batch_width(40, 0), 16);
    assert_eq!(batch_width(40, 1), 16);
    assert_eq!(batch_width(40, 2), 8);
    assert_eq!(batch_width(40, 3), 0);
    assert_eq!(batch_width(16, 0), 16);

    let last = ChannelBatch::new(20, 1);
    assert_eq!(last.base, 16);
    assert_eq!(last.channels(), 16..20);
  }

  #[test]
  fn test_input_coord_padding() {
    // 3x3 kernel, pad 1: top-left output sees the border for k=0
    assert_eq!(input_coord(0, 0, 1, 1, 8), None);
    assert_eq!(input_coord(0, 1, 1, 1, 8), Some(0));
    assert_eq!(input_coord(7, 2, 1, 1, 8), None);
    assert_eq!(input_coord(3, 2, 2, 1, 8), Some(7));
  }

  #[test]
  fn test_weight_addr_is_bijective() {
    let (kh, kw, cout, ic_batches) = (3, 2, 5, 3);
    let mut seen = HashSet::new();
    for ky in 0..kh {
      for kx in 0..kw {
        for oc in 0..cout {
          for icb in 0..ic_batches {
            assert!(seen.insert(weight_addr(ky, kx, oc, icb, kw, cout, ic_batches)));
          }
        }
      }
    }
    assert_eq!(seen.len(), kh * kw * cout * ic_batches);
    assert_eq!(*seen.iter().max().unwrap(), kh * kw * cout * ic_batches - 1);
  }
}
