use serde::{Deserialize, Serialize};
use sim::models::model_trait::{DevsModel, Reportable, ReportableModel, SerializableModel};
use sim::models::{ModelMessage, ModelRecord};
use sim::simulator::Services;
use sim::utils::errors::SimulationError;
use std::f64::INFINITY;

use crate::model_record;

/// Sink for the accelerator's completion outputs.
///
/// The payload of each message is kept verbatim in the record subject so a
/// driver can pick results out of the simulation after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
  done_port: String,
  psum_in_port: String,
  jobs_done: u64,
  records: Vec<ModelRecord>,
}

impl Host {
  pub fn new(done_port: String, psum_in_port: String) -> Self {
    Self {
      done_port,
      psum_in_port,
      jobs_done: 0,
      records: Vec::new(),
    }
  }
}

impl DevsModel for Host {
  fn events_ext(&mut self, incoming_message: &ModelMessage, services: &mut Services) -> Result<(), SimulationError> {
    if incoming_message.port_name == self.done_port {
      let cycles: u64 = serde_json::from_str(&incoming_message.content).map_err(|_| SimulationError::InvalidModelState)?;
      self.jobs_done += 1;
      model_record!(self, services, "done", cycles);
    } else if incoming_message.port_name == self.psum_in_port {
      model_record!(self, services, "psum_out", &incoming_message.content);
    }
    Ok(())
  }

  fn events_int(&mut self, _services: &mut Services) -> Result<Vec<ModelMessage>, SimulationError> {
    Ok(Vec::new())
  }

  fn time_advance(&mut self, _time_delta: f64) {}

  fn until_next_event(&self) -> f64 {
    INFINITY
  }
}

impl Reportable for Host {
  fn status(&self) -> String {
    format!("jobs_done={}", self.jobs_done)
  }

  fn records(&self) -> &Vec<ModelRecord> {
    &self.records
  }
}

impl ReportableModel for Host {}

impl SerializableModel for Host {
  fn get_type(&self) -> &'static str {
    "Host"
  }
}
