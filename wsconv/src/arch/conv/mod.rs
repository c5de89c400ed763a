pub mod accelerator;
pub mod accumulator;
pub mod bank;
pub mod batch;
pub mod controller;
pub mod host;
pub mod iteration;
pub mod job;
pub mod layout;
pub mod main;
pub mod npu;
pub mod pe;
pub mod pipeline;
pub mod reference;
pub mod regfile;
pub mod systolic_array;

pub use accelerator::Accelerator;
pub use job::ConvolutionJob;
pub use main::create_simulation;

// Accelerator parameters
pub const ARRAY_DIM: usize = 16;
pub const MEM_READ_LATENCY: usize = 2;
pub const PSUM_READ_LATENCY: usize = MEM_READ_LATENCY;
/// One register stage per PE row plus the output register.
pub const ARRAY_LATENCY: usize = ARRAY_DIM + 1;
/// Stages a partial-sum record travels from address issue to write-back.
pub const PIPE_DEPTH: usize = MEM_READ_LATENCY + ARRAY_LATENCY;
/// The weight-load enable is delayed to line up with weight memory data.
pub const WEIGHT_LOAD_DEPTH: usize = MEM_READ_LATENCY;

// Type aliases
pub type ElemT = i8;
pub type AccT = i32;
pub type ElemVec = [ElemT; ARRAY_DIM];
pub type AccVec = [AccT; ARRAY_DIM];
