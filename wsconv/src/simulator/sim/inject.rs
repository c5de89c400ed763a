use sim::simulator::{Message, Simulation};

use crate::arch::conv::main::{NPU_MODEL, REG_WRITE_PORT};

/// Inject a message into `target_model` at the current global time.
///
/// Source id and ports default to "host" / "default".
pub fn inject_message(
  simulation: &mut Simulation,
  target_model: &str,
  source_id: Option<&str>,
  source_port: Option<&str>,
  target_port: Option<&str>,
  content: &str,
) {
  let msg = Message::new(
    source_id.unwrap_or("host").to_string(),
    source_port.unwrap_or("default").to_string(),
    target_model.to_string(),
    target_port.unwrap_or("default").to_string(),
    simulation.get_global_time(),
    content.to_string(),
  );
  simulation.inject_input(msg);
}

/// Queue a configuration-register write for the accelerator model.
pub fn inject_reg_write(simulation: &mut Simulation, addr: u32, value: u32) {
  let content = serde_json::json!([addr, value]).to_string();
  inject_message(simulation, NPU_MODEL, None, None, Some(REG_WRITE_PORT), &content);
}
