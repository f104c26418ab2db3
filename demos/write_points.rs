//! Writes a few points to a local InfluxDB, once through a callback, once by
//! awaiting the write, and once through the `metrics` recorder.
//!
//! Expects a database named `demo` on `localhost:8086`. Run with `RUST_LOG=debug`
//! to see the requests being dispatched.

use influx_line_client::{ClientOptions, InfluxClient, InfluxRecorderBuilder, Measurement};
use std::time::Duration;
use tokio::sync::oneshot;

#[tokio::main]
async fn main() {
    env_logger::init();

    let client = match InfluxClient::create(ClientOptions::default().timeout(Duration::from_secs(5)))
    {
        Ok(client) => client.use_database("demo"),
        Err(e) => {
            eprintln!("Failed to create client: {e}");
            return;
        }
    };

    let cpu = Measurement::new("cpu")
        .tag("host", "demo-host")
        .field("usage_user", 12.5)
        .field("usage_system", 3.25)
        .timestamp_now();

    let (done, wait) = oneshot::channel();
    if let Err(e) = client.send(&cpu, move |result| {
        let _ = done.send(result);
    }) {
        eprintln!("Failed to send: {e}");
        return;
    }
    match wait.await {
        Ok(Ok(())) => println!("cpu point written"),
        Ok(Err(e)) => eprintln!("cpu point failed: {e}"),
        Err(_) => eprintln!("callback dropped"),
    }

    let batch = [
        Measurement::new("mem").field("used", 1024_u64 * 1024).timestamp_now(),
        Measurement::new("disk").tag("path", "/").field("free", 0.42).timestamp_now(),
    ];
    match client.write_to(&batch, "demo").await {
        Ok(()) => println!("batch written"),
        Err(e) => eprintln!("batch failed: {e}"),
    }

    if let Err(e) = InfluxRecorderBuilder::new(client).install() {
        eprintln!("Failed to set up InfluxDB recorder: {e}");
        return;
    }
    metrics::counter!("demo_runs").increment(1);

    // Recorder writes are fire-and-forget; give them a moment before exiting.
    tokio::time::sleep(Duration::from_millis(500)).await;
}
