// Weight-stationary systolic array
// Rows are input channels, columns are output channels. Activations enter
// diagonally skewed, partial sums cascade top to bottom one row per cycle.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::pe::ProcessingElement;
use super::{AccVec, ElemT, ElemVec, ARRAY_DIM};

/// Registered array output for the current cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayOutput {
  pub valid: bool,
  pub psum: AccVec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystolicArray {
  /// 2D grid of processing elements, `pe_grid[row][col]`
  pe_grid: Vec<Vec<ProcessingElement>>,
  /// Per-row input delay; row `r` holds `r` entries
  skew: Vec<VecDeque<Option<ElemT>>>,
  /// Output register below the last row
  out_reg: AccVec,
  out_valid: bool,
}

impl Default for SystolicArray {
  fn default() -> Self {
    Self::new()
  }
}

impl SystolicArray {
  pub fn new() -> Self {
    let pe_grid = (0..ARRAY_DIM)
      .map(|_| vec![ProcessingElement::new(); ARRAY_DIM])
      .collect();
    Self {
      pe_grid,
      skew: empty_skew(),
      out_reg: [0; ARRAY_DIM],
      out_valid: false,
    }
  }

  /// Latch a weight vector into column `col`, one element per row.
  ///
  /// Takes effect from the next cycle, like every other register in the grid.
  pub fn load_column(&mut self, col: usize, weights: &ElemVec) {
    if col >= ARRAY_DIM {
      log::warn!("weight load for column {} outside the array ignored", col);
      return;
    }
    for (row, w) in weights.iter().enumerate() {
      self.pe_grid[row][col].load_weight(*w);
    }
  }

  pub fn weight(&self, row: usize, col: usize) -> ElemT {
    self.pe_grid[row][col].weight()
  }

  /// Advance the array by one cycle.
  ///
  /// `input` is the activation vector presented to the array this cycle (`None`
  /// for a bubble). Returns the output register as seen during this cycle; the
  /// vector injected at cycle `T` shows up at cycle `T + ARRAY_LATENCY`.
  pub fn tick(&mut self, input: Option<ElemVec>) -> ArrayOutput {
    let out = ArrayOutput {
      valid: self.out_valid,
      psum: self.out_reg,
    };

    // Diagonal feed: row r sees the sample injected r cycles ago
    let mut operands: [Option<ElemT>; ARRAY_DIM] = [None; ARRAY_DIM];
    for (row, queue) in self.skew.iter_mut().enumerate() {
      queue.push_back(input.map(|v| v[row]));
      operands[row] = queue.pop_front().flatten();
    }

    let bottom = &self.pe_grid[ARRAY_DIM - 1];
    for (col, pe) in bottom.iter().enumerate() {
      self.out_reg[col] = pe.psum_out();
    }
    self.out_valid = bottom[0].valid();

    // Bottom-up so every row still reads the value latched above it last cycle
    for row in (0..ARRAY_DIM).rev() {
      let x = operands[row];
      for col in 0..ARRAY_DIM {
        let psum_in = if row == 0 {
          0
        } else {
          self.pe_grid[row - 1][col].psum_out()
        };
        let next = self.pe_grid[row][col].mac(x.unwrap_or(0), psum_in);
        self.pe_grid[row][col].latch(next, x.is_some());
      }
    }

    out
  }

  /// Whether any sample is still travelling through the grid.
  pub fn is_busy(&self) -> bool {
    self.out_valid
      || self.skew.iter().flatten().any(|s| s.is_some())
      || self.pe_grid.iter().flatten().any(|pe| pe.valid())
  }

  /// Discard in-flight data; weights stay loaded.
  pub fn flush(&mut self) {
    self.skew = empty_skew();
    for pe in self.pe_grid.iter_mut().flatten() {
      pe.flush();
    }
    self.out_reg = [0; ARRAY_DIM];
    self.out_valid = false;
  }
}

fn empty_skew() -> Vec<VecDeque<Option<ElemT>>> {
  (0..ARRAY_DIM)
    .map(|row| std::iter::repeat(None).take(row).collect())
    .collect()
}

// ===========================================
// Unit Tests
// ===========================================
