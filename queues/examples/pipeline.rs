//! A two-stage pipeline: producers feed a `BlockingQueue`, a router moves
//! items into a bounded `SpinQueue`, and a sink drains it.
//!
//! Run with `RUST_LOG=debug cargo run -p skein --example pipeline`.

use skein::{BlockingQueue, SpinQueue, Stopwatch};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const PRODUCERS: u64 = 4;
const ITEMS_PER_PRODUCER: u64 = 25_000;
const STAGE_CAPACITY: usize = 256;

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_thread_names(true)
    .init();

  let mut watch = Stopwatch::new();
  info!(started_at = %Stopwatch::utc_now(), "pipeline starting");

  let inbound = Arc::new(BlockingQueue::new());
  let stage = Arc::new(SpinQueue::with_capacity(STAGE_CAPACITY));

  let producers: Vec<_> = (0..PRODUCERS)
    .map(|p| {
      let inbound = Arc::clone(&inbound);
      thread::Builder::new()
        .name(format!("producer-{}", p))
        .spawn(move || {
          for i in 0..ITEMS_PER_PRODUCER {
            if inbound.push(p * ITEMS_PER_PRODUCER + i).is_err() {
              break;
            }
          }
          debug!("producer done");
        })
        .expect("spawn producer")
    })
    .collect();

  let router = {
    let inbound = Arc::clone(&inbound);
    let stage = Arc::clone(&stage);
    thread::Builder::new()
      .name("router".into())
      .spawn(move || {
        while let Some(mut value) = inbound.pop() {
          while let Err(err) = stage.try_push(value) {
            value = err.into_inner();
            thread::yield_now();
          }
        }
        stage.close();
        debug!("router done");
      })
      .expect("spawn router")
  };

  let sink = {
    let stage = Arc::clone(&stage);
    thread::Builder::new()
      .name("sink".into())
      .spawn(move || {
        let mut sum = 0u64;
        let mut count = 0u64;
        loop {
          match stage.try_pop() {
            Some(value) => {
              sum += value;
              count += 1;
            }
            None if stage.is_closed() && stage.len() == 0 => break,
            None => thread::yield_now(),
          }
        }
        (count, sum)
      })
      .expect("spawn sink")
  };

  for producer in producers {
    producer.join().expect("producer panicked");
  }
  inbound.close();
  router.join().expect("router panicked");
  let (count, sum) = sink.join().expect("sink panicked");

  watch.stop();
  let n = PRODUCERS * ITEMS_PER_PRODUCER;
  assert_eq!(count, n);
  assert_eq!(sum, n * (n - 1) / 2);
  info!(count, sum, elapsed = %watch, "pipeline finished");
}
