/// Global logging configuration
use std::sync::atomic::{AtomicBool, Ordering};

static ENABLE_LOG: AtomicBool = AtomicBool::new(true);

/// Install the `env_logger` backend. `RUST_LOG` wins over the `info` default.
pub fn init_log() {
  let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
    .format_timestamp(None)
    .try_init();
}

/// Set console progress output enabled
pub fn set_log(enabled: bool) {
  ENABLE_LOG.store(enabled, Ordering::Relaxed);
}

/// Check if console progress output is enabled, default is true
pub fn is_log_enabled() -> bool {
  ENABLE_LOG.load(Ordering::Relaxed)
}

/// Print a progress line with a blue [Log] prefix unless quiet
#[macro_export]
macro_rules! log_info {
  ($($arg:tt)*) => {
    if $crate::simulator::utils::log::is_log_enabled() {
      println!("\x1b[34m[Log]\x1b[0m {}", format!($($arg)*));
    }
  };
}
