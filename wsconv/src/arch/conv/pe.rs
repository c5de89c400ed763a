use serde::{Deserialize, Serialize};

use super::{AccT, ElemT};

// ===========================================
// Processing Element (PE) Module
// ===========================================

/// Weight-stationary multiply-accumulate cell.
///
/// Holds one stationary weight and one registered partial sum that feeds the
/// cell below on the next cycle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProcessingElement {
  /// Stationary weight
  weight: ElemT,
  /// Registered partial sum leaving the cell
  psum: AccT,
  /// Registered validity of `psum`
  valid: bool,
}

impl ProcessingElement {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn load_weight(&mut self, weight: ElemT) {
    self.weight = weight;
  }

  pub fn weight(&self) -> ElemT {
    self.weight
  }

  /// Partial sum visible to the cell below during the current cycle.
  pub fn psum_out(&self) -> AccT {
    self.psum
  }

  pub fn valid(&self) -> bool {
    self.valid
  }

  /// Combinational MAC: `psum_in + sext32(input * weight)`.
  pub fn mac(&self, input: ElemT, psum_in: AccT) -> AccT {
    let product = (input as i16) * (self.weight as i16);
    psum_in.wrapping_add(product as AccT)
  }

  /// Clock edge: latch the MAC result for the cell below.
  pub fn latch(&mut self, psum: AccT, valid: bool) {
    self.psum = psum;
    self.valid = valid;
  }

  /// Clear pipeline registers; the stationary weight is kept.
  pub fn flush(&mut self) {
    self.psum = 0;
    self.valid = false;
  }
}
