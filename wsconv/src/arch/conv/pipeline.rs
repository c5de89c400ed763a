use serde::{Deserialize, Serialize};

/// Partial-sum bookkeeping that travels alongside the data it describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRecord {
  pub valid: bool,
  /// Overwrite instead of accumulate
  pub clear: bool,
  /// Partial-sum storage address
  pub addr: usize,
  /// Live output-channel lanes
  pub lanes: usize,
  /// Cycle the record entered the pipeline
  pub issued_at: u64,
}

/// Fixed-depth delay line backed by a ring buffer indexed by cycle modulo depth.
///
/// A value shifted in at cycle `T` comes out of [`ShiftPipe::shift`] at cycle `T + depth`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftPipe<T> {
  slots: Vec<T>,
  cycle: u64,
}

impl<T: Copy + Default> ShiftPipe<T> {
  pub fn new(depth: usize) -> Self {
    assert!(depth > 0, "pipeline depth must be positive");
    Self {
      slots: vec![T::default(); depth],
      cycle: 0,
    }
  }

  pub fn depth(&self) -> usize {
    self.slots.len()
  }

  /// Value shifted in `age` cycles ago, 1 <= age <= depth.
  ///
  /// Must be called before `shift` in the current cycle.
  pub fn tap(&self, age: usize) -> T {
    debug_assert!(age >= 1 && age <= self.depth());
    let depth = self.depth();
    let now = (self.cycle % depth as u64) as usize;
    self.slots[(now + depth - age % depth) % depth]
  }

  /// Advance one cycle: insert `input` and return the value leaving the last stage.
  pub fn shift(&mut self, input: T) -> T {
    let idx = (self.cycle % self.depth() as u64) as usize;
    self.cycle += 1;
    std::mem::replace(&mut self.slots[idx], input)
  }

  pub fn clear(&mut self) {
    self.slots.iter_mut().for_each(|slot| *slot = T::default());
    self.cycle = 0;
  }

  /// Values still travelling through the pipe.
  pub fn in_flight(&self) -> impl Iterator<Item = &T> {
    self.slots.iter()
  }
}
