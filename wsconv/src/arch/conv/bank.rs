use serde::{Deserialize, Serialize};

use super::pipeline::ShiftPipe;

/// Read request presented to a memory port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadRequest {
  Addr(usize),
  /// No access; the port returns an all-zero word (padding taps)
  Zero,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SRAM<T> {
  data: Vec<T>,
}

impl<T: Copy + Default> SRAM<T> {
  fn new(depth: usize) -> Self {
    Self {
      data: vec![T::default(); depth],
    }
  }

  fn read(&self, addr: usize) -> T {
    self.data.get(addr).copied().unwrap_or_default()
  }

  fn write(&mut self, addr: usize, value: T) {
    if let Some(slot) = self.data.get_mut(addr) {
      *slot = value;
    } else {
      log::warn!("write to address {} beyond depth {} dropped", addr, self.data.len());
    }
  }
}

/// Synchronous memory with a fixed read latency and an independent write port.
///
/// A read issued at cycle `T` returns data at cycle `T + latency`. The read samples
/// the array when issued, so a write in the same cycle is not observed by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bank<T> {
  sram: SRAM<T>,
  read_pipe: ShiftPipe<Option<T>>,
}

impl<T: Copy + Default> Bank<T> {
  pub fn new(depth: usize, latency: usize) -> Self {
    Self {
      sram: SRAM::new(depth),
      read_pipe: ShiftPipe::new(latency),
    }
  }

  /// Advance the read port one cycle.
  pub fn tick(&mut self, req: Option<ReadRequest>) -> Option<T> {
    let data = req.map(|r| match r {
      ReadRequest::Addr(addr) => self.sram.read(addr),
      ReadRequest::Zero => T::default(),
    });
    self.read_pipe.shift(data)
  }

  /// Write port, takes effect at the end of the cycle.
  pub fn write(&mut self, addr: usize, value: T) {
    self.sram.write(addr, value);
  }

  /// Backdoor access for hosts and readout, bypassing the read latency.
  pub fn peek(&self, addr: usize) -> T {
    self.sram.read(addr)
  }

  /// Drop in-flight reads; contents survive.
  pub fn reset_port(&mut self) {
    self.read_pipe.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_read_latency() {
    let mut bank: Bank<u32> = Bank::new(8, 2);
    bank.write(3, 77);
    assert_eq!(bank.tick(Some(ReadRequest::Addr(3))), None);
    assert_eq!(bank.tick(None), None);
    assert_eq!(bank.tick(None), Some(77));
    assert_eq!(bank.tick(None), None);
  }

  #[test]
  fn test_zero_request_and_out_of_range() {
    let mut bank: Bank<[i8; 4]> = Bank::new(2, 1);
    bank.write(0, [1, 2, 3, 4]);
    bank.tick(Some(ReadRequest::Zero));
    assert_eq!(bank.tick(Some(ReadRequest::Addr(9))), Some([0; 4]));
    assert_eq!(bank.tick(None), Some([0; 4]));
    assert_eq!(bank.peek(0), [1, 2, 3, 4]);
  }

  #[test]
  fn test_read_first_on_same_cycle_write() {
    let mut bank: Bank<u32> = Bank::new(4, 1);
    bank.write(1, 5);
    assert_eq!(bank.tick(Some(ReadRequest::Addr(1))), None);
    bank.write(1, 6);
    assert_eq!(bank.tick(None), Some(5));
    assert_eq!(bank.peek(1), 6);
  }
}
