use sim::models::{Model, Reportable};
use sim::simulator::Simulation;

pub fn print_simulation_records(simulation: &mut Simulation) {
  println!("\n--- Simulation Records ---");

  for model in simulation.models().iter() {
    print_model_records(model);
  }

  println!("--- End Records ---\n");
}

fn print_model_records(model: &Model) {
  let records = model.records();
  if records.is_empty() {
    return;
  }

  println!("\n[{}] {}", model.id(), model.status());
  for record in records {
    // tensors travel as records too; keep the listing readable
    let subject = if record.subject.len() > 64 {
      format!("{}... ({} bytes)", &record.subject[..64], record.subject.len())
    } else {
      record.subject.clone()
    };
    println!("  Time {:.1}: {} {}", record.time, record.action, subject);
  }
}

/// Subject of the latest record `action` emitted by `model_id`.
pub fn last_record(simulation: &mut Simulation, model_id: &str, action: &str) -> Option<String> {
  let models = simulation.models();
  let model = models.iter().find(|model| model.id() == model_id)?;
  model
    .records()
    .iter()
    .rev()
    .find(|record| record.action == action)
    .map(|record| record.subject.clone())
}
