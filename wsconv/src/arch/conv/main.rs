use sim::models::Model;
use sim::simulator::{Connector, Simulation};

use super::accelerator::Accelerator;
use super::host::Host;
use super::npu::ConvNpu;

pub const NPU_MODEL: &str = "npu";
pub const HOST_MODEL: &str = "host";
pub const REG_WRITE_PORT: &str = "reg_write";

pub fn create_simulation(accel: Accelerator, max_cycles: u64) -> Simulation {
  let models = vec![
    Model::new(
      String::from(NPU_MODEL),
      Box::new(ConvNpu::new(
        accel,
        String::from(REG_WRITE_PORT),
        String::from("done"),
        String::from("psum_out"),
        max_cycles,
      )),
    ),
    Model::new(
      String::from(HOST_MODEL),
      Box::new(Host::new(String::from("done"), String::from("psum_in"))),
    ),
  ];

  let connectors = vec![
    Connector::new(
      String::from("npu_host_done"),
      String::from(NPU_MODEL),
      String::from(HOST_MODEL),
      String::from("done"),
      String::from("done"),
    ),
    Connector::new(
      String::from("npu_host_psum"),
      String::from(NPU_MODEL),
      String::from(HOST_MODEL),
      String::from("psum_out"),
      String::from("psum_in"),
    ),
  ];

  Simulation::post(models, connectors)
}
