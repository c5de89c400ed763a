use sim::simulator::Simulation;
use std::fs::File;
use std::io::{self, BufWriter, Result};
use std::path::Path;

use super::config::AppConfig;
use super::sim::inject::inject_reg_write;
use super::sim::mode::{SimConfig, StepMode};
use super::sim::model::model_step;
use super::sim::shell::{Command, Shell};
use super::utils::log::set_log;
use super::utils::report::{last_record, print_simulation_records};
use super::workload::{write_int8_tensor, Workload};
use crate::arch::conv::accelerator::{Accelerator, MemoryConfig};
use crate::arch::conv::main::{create_simulation, HOST_MODEL};
use crate::arch::conv::regfile::encode_job;
use crate::arch::conv::AccT;
use crate::log_info;

/// What the host collected once the accelerator raised done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
  pub cycles: u64,
  /// Raw accumulators, CHW
  pub output: Vec<AccT>,
}

pub struct Simulator {
  config: SimConfig,
  workload: Workload,
  simulation: Simulation,
  trace_writer: Option<BufWriter<File>>,
  steps: u64,
}

impl Simulator {
  /// Preload the memories with the workload and wire up the event model.
  pub fn new(config: SimConfig, mem: MemoryConfig, workload: Workload) -> Result<Self> {
    workload.validate()?;
    let mut accel = Accelerator::new(mem);
    accel.load_activations(&workload.job, &workload.input);
    accel.load_weights(&workload.job, &workload.weights);
    let simulation = create_simulation(accel, config.max_cycles);

    let trace_writer = match config.trace_file.as_deref() {
      Some(path) if !path.is_empty() => Some(BufWriter::new(File::create(path)?)),
      _ => None,
    };

    Ok(Self {
      config,
      workload,
      simulation,
      trace_writer,
      steps: 0,
    })
  }

  pub fn run(&mut self) -> Result<RunResult> {
    set_log(!self.config.quiet);
    log_info!("job {:?}", self.workload.job);

    for (addr, value) in encode_job(&self.workload.job) {
      inject_reg_write(&mut self.simulation, addr, value);
    }

    match self.config.step_mode {
      StepMode::Continuous => self.run_continuous()?,
      StepMode::Step => self.run_step_mode()?,
    }
    self.result()
  }

  fn run_step_mode(&mut self) -> Result<()> {
    println!("Step mode - Enter to step, 'si N' to step N times, 'p' for records, 'c' to continue, 'q' to quit");
    let mut shell = Shell::new()?;
    loop {
      match shell.read_command()? {
        Command::Step(n) => {
          for _ in 0..n {
            if !self.step()? {
              log_info!("simulation idle after {} steps", self.steps);
              return Ok(());
            }
          }
        },
        Command::Records => print_simulation_records(&mut self.simulation),
        Command::Continue => return self.run_continuous(),
        Command::Quit => return Ok(()),
      }
    }
  }

  fn run_continuous(&mut self) -> Result<()> {
    while self.step()? {}
    Ok(())
  }

  fn step(&mut self) -> Result<bool> {
    let active = model_step(&mut self.simulation, &mut self.trace_writer)?;
    self.steps += 1;
    Ok(active)
  }

  /// Collect cycles and output tensor from the host model.
  pub fn result(&mut self) -> Result<RunResult> {
    let not_done = || io::Error::new(io::ErrorKind::Other, "accelerator did not signal done");
    let bad = |e: serde_json::Error| io::Error::new(io::ErrorKind::InvalidData, e);

    let cycles = last_record(&mut self.simulation, HOST_MODEL, "done").ok_or_else(not_done)?;
    let output = last_record(&mut self.simulation, HOST_MODEL, "psum_out").ok_or_else(not_done)?;
    Ok(RunResult {
      cycles: serde_json::from_str(&cycles).map_err(bad)?,
      output: serde_json::from_str(&output).map_err(bad)?,
    })
  }

  pub fn workload(&self) -> &Workload {
    &self.workload
  }

  pub fn simulation(&mut self) -> &mut Simulation {
    &mut self.simulation
  }
}

/// Run the job a configuration describes: simulate, check against the
/// golden model and write the requantized output.
pub fn run_from_config(config: &AppConfig) -> Result<RunResult> {
  let sim_config = SimConfig {
    quiet: config.simulation.quiet,
    step_mode: if config.simulation.step_mode {
      StepMode::Step
    } else {
      StepMode::Continuous
    },
    trace_file: Some(config.simulation.trace_file.clone()).filter(|p| !p.is_empty()),
    max_cycles: config.simulation.max_cycles,
  };
  let workload = Workload::from_config(config)?;

  let mut simulator = Simulator::new(sim_config, config.memory.to_memory_config(), workload)?;
  let result = simulator.run()?;
  log_info!("done after {} cycles", result.cycles);

  let workload = simulator.workload();
  if config.data.check {
    workload.check(&result.output)?;
    log_info!("output matches the reference convolution");
  }
  if !config.data.output_path.is_empty() {
    let quantized = workload.requantize(&result.output);
    write_int8_tensor(Path::new(&config.data.output_path), &quantized)?;
    log_info!("wrote {} values to {}", quantized.len(), config.data.output_path);
  }
  if !config.simulation.quiet {
    print_simulation_records(simulator.simulation());
  }

  Ok(result)
}
