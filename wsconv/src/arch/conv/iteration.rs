use serde::{Deserialize, Serialize};

use super::job::ConvolutionJob;

/// Trip counts of the six nested loops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopBounds {
  pub kh: usize,
  pub kw: usize,
  pub oc_batches: usize,
  pub ic_batches: usize,
  pub oh: usize,
  pub ow: usize,
}

impl LoopBounds {
  pub fn from_job(job: &ConvolutionJob) -> Self {
    Self {
      kh: job.kernel_h,
      kw: job.kernel_w,
      oc_batches: job.oc_batches(),
      ic_batches: job.ic_batches(),
      oh: job.output_h,
      ow: job.output_w,
    }
  }

  /// Number of (ky, kx, ocb, icb) sweeps in a job.
  pub fn sweeps(&self) -> usize {
    self.kh * self.kw * self.oc_batches * self.ic_batches
  }
}

/// Loop counters, outer to inner: ky, kx, ocb, icb, oy, ox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationState {
  pub ky: usize,
  pub kx: usize,
  pub ocb: usize,
  pub icb: usize,
  pub oy: usize,
  pub ox: usize,
}

impl IterationState {
  /// First visit of every output tile in this sweep: overwrite, don't accumulate.
  pub fn is_first_visit(&self) -> bool {
    self.ky == 0 && self.kx == 0 && self.icb == 0
  }

  /// Next spatial position in raster order, or `None` once the sweep is exhausted.
  pub fn advance_spatial(self, bounds: &LoopBounds) -> Option<Self> {
    let mut next = self;
    next.ox += 1;
    if next.ox < bounds.ow {
      return Some(next);
    }
    next.ox = 0;
    next.oy += 1;
    if next.oy < bounds.oh {
      return Some(next);
    }
    None
  }

  /// Next (ky, kx, ocb, icb) sweep with the spatial cursor rewound, or `None`
  /// once the kernel loops are exhausted.
  pub fn advance_sweep(self, bounds: &LoopBounds) -> Option<Self> {
    let mut next = Self {
      oy: 0,
      ox: 0,
      ..self
    };
    next.icb += 1;
    if next.icb < bounds.ic_batches {
      return Some(next);
    }
    next.icb = 0;
    next.ocb += 1;
    if next.ocb < bounds.oc_batches {
      return Some(next);
    }
    next.ocb = 0;
    next.kx += 1;
    if next.kx < bounds.kw {
      return Some(next);
    }
    next.kx = 0;
    next.ky += 1;
    if next.ky < bounds.kh {
      return Some(next);
    }
    None
  }
}
