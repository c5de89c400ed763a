use serde::{Deserialize, Serialize};
use sim::models::model_trait::{DevsModel, Reportable, ReportableModel, SerializableModel};
use sim::models::{ModelMessage, ModelRecord};
use sim::simulator::Services;
use sim::utils::errors::SimulationError;
use std::f64::INFINITY;

use super::accelerator::Accelerator;
use super::regfile::{CONTROL_START, REG_CONTROL};
use crate::model_record;

/// Discrete-event wrapper around the accelerator core.
///
/// Register writes arrive as `[addr, value]`; once started, every internal
/// event advances the core by one clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvNpu {
  accel: Accelerator,
  reg_write_port: String,
  done_port: String,
  psum_out_port: String,
  max_cycles: u64,
  running: bool,
  started_at: u64,
  until_next_event: f64,
  records: Vec<ModelRecord>,
}

impl ConvNpu {
  pub fn new(
    accel: Accelerator,
    reg_write_port: String,
    done_port: String,
    psum_out_port: String,
    max_cycles: u64,
  ) -> Self {
    Self {
      accel,
      reg_write_port,
      done_port,
      psum_out_port,
      max_cycles,
      running: false,
      started_at: 0,
      until_next_event: INFINITY,
      records: Vec::new(),
    }
  }

  fn finish(&mut self) -> Result<Vec<ModelMessage>, SimulationError> {
    let cycles = self.accel.cycle() - self.started_at;
    let job = self.accel.job();
    let output = self.accel.read_output(&job);
    log::info!(
      "job finished after {} cycles, {} outputs, {} misaligned write-backs",
      cycles,
      output.len(),
      self.accel.misaligned()
    );

    self.running = false;
    self.until_next_event = INFINITY;

    Ok(vec![
      ModelMessage {
        content: serde_json::to_string(&cycles).map_err(|_| SimulationError::InvalidModelState)?,
        port_name: self.done_port.clone(),
      },
      ModelMessage {
        content: serde_json::to_string(&output).map_err(|_| SimulationError::InvalidModelState)?,
        port_name: self.psum_out_port.clone(),
      },
    ])
  }
}

impl DevsModel for ConvNpu {
  fn events_ext(&mut self, incoming_message: &ModelMessage, services: &mut Services) -> Result<(), SimulationError> {
    if incoming_message.port_name != self.reg_write_port {
      return Ok(());
    }

    let (addr, value) =
      serde_json::from_str::<(u32, u32)>(&incoming_message.content).map_err(|_| SimulationError::InvalidModelState)?;
    self.accel.write_reg(addr, value);
    model_record!(self, services, "reg_write", format!("reg[{}] = {:#x}", addr, value));

    if addr == REG_CONTROL && value & CONTROL_START != 0 {
      if self.running {
        // the core ignores start while busy
        log::warn!("start written while a job is running");
      } else {
        self.running = true;
        self.started_at = self.accel.cycle();
        self.until_next_event = 1.0;
        model_record!(self, services, "start", format!("{:?}", self.accel.job()));
      }
    }

    Ok(())
  }

  fn events_int(&mut self, services: &mut Services) -> Result<Vec<ModelMessage>, SimulationError> {
    if !self.running {
      self.until_next_event = INFINITY;
      return Ok(Vec::new());
    }

    if self.accel.tick() {
      model_record!(
        self,
        services,
        "done",
        format!("cycles={}", self.accel.cycle() - self.started_at)
      );
      return self.finish();
    }

    if self.accel.cycle() - self.started_at >= self.max_cycles {
      log::warn!("job exceeded {} cycles, giving up", self.max_cycles);
      self.running = false;
      self.until_next_event = INFINITY;
      return Err(SimulationError::InvalidModelState);
    }

    self.until_next_event = 1.0;
    Ok(Vec::new())
  }

  fn time_advance(&mut self, time_delta: f64) {
    self.until_next_event -= time_delta;
  }

  fn until_next_event(&self) -> f64 {
    self.until_next_event
  }
}

impl Reportable for ConvNpu {
  fn status(&self) -> String {
    format!(
      "state={:?}, cycle={}",
      self.accel.controller().state(),
      self.accel.cycle()
    )
  }

  fn records(&self) -> &Vec<ModelRecord> {
    &self.records
  }
}

impl ReportableModel for ConvNpu {}

impl SerializableModel for ConvNpu {
  fn get_type(&self) -> &'static str {
    "ConvNpu"
  }
}
