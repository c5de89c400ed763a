pub mod arch;
pub mod simulator;

pub use arch::conv::{Accelerator, ConvolutionJob};
pub use simulator::sim::mode::{SimConfig, StepMode};
pub use simulator::utils::log;
