use sim::models::model_trait::DevsModel;
use sim::simulator::{Message, Simulation};
use std::fs::File;
use std::io::{self, BufWriter, Result, Write};

use crate::log_info;

fn trace_messages(messages: &[Message], trace_writer: &mut Option<BufWriter<File>>) -> Result<()> {
  for msg in messages {
    log_info!(
      "[MSG] t={:.1} {}:{} -> {}:{} | {}",
      msg.time(),
      msg.source_id(),
      msg.source_port(),
      msg.target_id(),
      msg.target_port(),
      truncate(msg.content(), 120)
    );
  }

  if let Some(writer) = trace_writer {
    for msg in messages {
      let trace_entry = serde_json::json!({
        "time": msg.time(),
        "source": msg.source_id(),
        "source_port": msg.source_port(),
        "target": msg.target_id(),
        "target_port": msg.target_port(),
        "content": msg.content()
      });
      writeln!(writer, "{}", trace_entry)?;
    }
    writer.flush()?;
  }
  Ok(())
}

fn truncate(s: &str, max: usize) -> &str {
  match s.char_indices().nth(max) {
    Some((idx, _)) => &s[..idx],
    None => s,
  }
}

/// Run one simulation step; returns whether global time moved.
fn step_once(simulation: &mut Simulation) -> Result<bool> {
  let time0 = simulation.get_global_time();
  simulation.step().map_err(|e| {
    log::error!("simulation step error: {:?}", e);
    io::Error::new(io::ErrorKind::Other, format!("Simulation error: {:?}", e))
  })?;
  Ok(simulation.get_global_time() > time0)
}

/// Earliest pending internal event over all models.
pub fn next_event_time(simulation: &mut Simulation) -> f64 {
  simulation
    .models()
    .iter()
    .fold(f64::INFINITY, |min, model| f64::min(min, model.until_next_event()))
}

/// Deliver pending messages, then advance until global time moves by one event.
///
/// Returns false once every model is idle and no messages are left.
pub fn model_step(simulation: &mut Simulation, trace_writer: &mut Option<BufWriter<File>>) -> Result<bool> {
  let mut messages = simulation.get_messages().clone();
  while !messages.is_empty() {
    trace_messages(&messages, trace_writer)?;
    if step_once(simulation)? {
      return Ok(true);
    }
    messages = simulation.get_messages().clone();
  }

  loop {
    if next_event_time(simulation) == f64::INFINITY {
      return Ok(false);
    }
    if step_once(simulation)? {
      break;
    }
    let pending = simulation.get_messages().clone();
    trace_messages(&pending, trace_writer)?;
  }
  Ok(true)
}
