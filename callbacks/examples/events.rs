//! Fan one event out to several listeners, synchronously and on a pool.
//!
//! Run with `RUST_LOG=skein_callbacks=trace cargo run -p skein_callbacks --example events`.

use skein_callbacks::{CallbackRegistry, FailureMode};
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
struct Event {
  id: u32,
  payload: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_thread_names(true)
    .init();

  let registry = CallbackRegistry::<Event>::builder().thread_pool(2).build()?;

  let logger = registry.add_callback(|event: Event| info!(id = event.id, payload = %event.payload, "logged"));
  registry.add_callback(|event: Event| {
    thread::sleep(Duration::from_millis(50));
    info!(id = event.id, "slow listener done");
  });
  registry.add_callback(|event: Event| -> Result<(), String> {
    if event.payload.is_empty() {
      return Err(format!("event {} has no payload", event.id));
    }
    Ok(())
  });

  registry.call_all(Event {
    id: 1,
    payload: "sync".into(),
  })?;

  registry.call_all_async(Event {
    id: 2,
    payload: String::new(),
  });
  let launched = registry.call_all_async(Event {
    id: 3,
    payload: "too early".into(),
  });
  info!(launched, "second launch while listeners were busy");

  let clean = registry.wait_for_all_callbacks(FailureMode::Capture, Some(Duration::from_secs(1)))?;
  info!(clean, "async round finished");

  registry.remove_callback(logger);
  info!(listeners = registry.len(), "logger removed");
  Ok(())
}
