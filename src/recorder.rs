use crate::{
    client::InfluxClient,
    error::InfluxError,
    measurement::{FieldValue, Measurement},
};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

fn push_point(client: &InfluxClient, key: &metrics::Key, value: impl Into<FieldValue>) {
    let measurement = key
        .labels()
        .fold(Measurement::new(key.name()), |m, label| {
            m.tag(label.key(), label.value())
        })
        .field("value", value)
        .timestamp_now();

    let name = key.name().to_string();
    let sent = client.send(&measurement, move |result| match result {
        Ok(()) => log::trace!("Wrote {name} to InfluxDB"),
        Err(InfluxError::Rejected { status, body }) => {
            log::warn!("InfluxDB rejected {name} ({status}): {body}");
        }
        Err(e) => log::error!("Failed to write {name} to InfluxDB: {e}"),
    });
    if let Err(e) = sent {
        log::error!("Failed to write {} to InfluxDB: {e}", key.name());
    }
}

// Saturates at `i64::MAX`.
fn counter_value(total: u64) -> i64 {
    i64::try_from(total).unwrap_or(i64::MAX)
}

#[derive(Debug)]
struct Handle {
    key: metrics::Key,
    client: InfluxClient,
    // Counter total, or the bit pattern of the gauge value.
    state: AtomicU64,
}

impl Handle {
    const fn new(key: metrics::Key, client: InfluxClient) -> Self {
        Self {
            key,
            client,
            state: AtomicU64::new(0),
        }
    }

    fn update_gauge(&self, f: impl Fn(f64) -> f64) -> f64 {
        let previous = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some(f(f64::from_bits(bits)).to_bits())
            })
            .unwrap_or_else(|bits| bits);
        f(f64::from_bits(previous))
    }
}

impl metrics::CounterFn for Handle {
    fn increment(&self, value: u64) {
        let total = self.state.fetch_add(value, Ordering::AcqRel).wrapping_add(value);
        push_point(&self.client, &self.key, counter_value(total));
    }

    fn absolute(&self, value: u64) {
        let total = self.state.fetch_max(value, Ordering::AcqRel).max(value);
        push_point(&self.client, &self.key, counter_value(total));
    }
}

impl metrics::GaugeFn for Handle {
    fn increment(&self, value: f64) {
        let current = self.update_gauge(|v| v + value);
        push_point(&self.client, &self.key, current);
    }

    fn decrement(&self, value: f64) {
        let current = self.update_gauge(|v| v - value);
        push_point(&self.client, &self.key, current);
    }

    fn set(&self, value: f64) {
        self.state.store(value.to_bits(), Ordering::Release);
        push_point(&self.client, &self.key, value);
    }
}

impl metrics::HistogramFn for Handle {
    fn record(&self, value: f64) {
        push_point(&self.client, &self.key, value);
    }
}

/// A recorder that writes every metric update to InfluxDB as a measurement.
///
/// The metric name becomes the measurement name, labels become tags and the
/// value is written to the `value` field: the running total for counters, the
/// current value for gauges and each sample for histograms.
#[derive(Debug, Clone)]
pub struct InfluxRecorder {
    client: InfluxClient,
}

impl InfluxRecorder {
    fn handle(&self, key: &metrics::Key) -> Arc<Handle> {
        Arc::new(Handle::new(key.clone(), self.client.clone()))
    }
}

impl metrics::Recorder for InfluxRecorder {
    fn describe_counter(
        &self,
        key_name: metrics::KeyName,
        _unit: Option<metrics::Unit>,
        _description: metrics::SharedString,
    ) {
        log::trace!("Ignoring description of counter {}", key_name.as_str());
    }

    fn describe_gauge(
        &self,
        key_name: metrics::KeyName,
        _unit: Option<metrics::Unit>,
        _description: metrics::SharedString,
    ) {
        log::trace!("Ignoring description of gauge {}", key_name.as_str());
    }

    fn describe_histogram(
        &self,
        key_name: metrics::KeyName,
        _unit: Option<metrics::Unit>,
        _description: metrics::SharedString,
    ) {
        log::trace!("Ignoring description of histogram {}", key_name.as_str());
    }

    fn register_counter(
        &self,
        key: &metrics::Key,
        _meta: &metrics::Metadata<'_>,
    ) -> metrics::Counter {
        metrics::Counter::from_arc(self.handle(key))
    }

    fn register_gauge(&self, key: &metrics::Key, _meta: &metrics::Metadata<'_>) -> metrics::Gauge {
        metrics::Gauge::from_arc(self.handle(key))
    }

    fn register_histogram(
        &self,
        key: &metrics::Key,
        _meta: &metrics::Metadata<'_>,
    ) -> metrics::Histogram {
        metrics::Histogram::from_arc(self.handle(key))
    }
}

#[derive(Debug)]
pub struct InfluxRecorderBuilder {
    client: InfluxClient,
}

impl InfluxRecorderBuilder {
    /// Creates a builder for a recorder writing through `client`, which must
    /// have a database set.
    pub const fn new(client: InfluxClient) -> Self {
        Self { client }
    }

    /// Builds the recorder without installing it.
    ///
    /// # Errors
    /// Returns [`InfluxError::NoDatabase`] if the client has no database set.
    pub fn build(self) -> Result<InfluxRecorder, InfluxError> {
        if self.client.database().is_none() {
            return Err(InfluxError::NoDatabase);
        }
        Ok(InfluxRecorder {
            client: self.client,
        })
    }

    /// Builds the recorder and sets it as the global recorder.
    /// All metrics recorded after this call are written to InfluxDB.
    ///
    /// # Example
    /// ```rust,no_run
    /// use influx_line_client::{ClientOptions, InfluxClient, InfluxRecorderBuilder};
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let client = InfluxClient::create(ClientOptions::default())
    ///     .expect("client")
    ///     .use_database("telemetry");
    /// if let Err(e) = InfluxRecorderBuilder::new(client).install() {
    ///     eprintln!("Failed to set up InfluxDB recorder: {e}");
    /// }
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns an error if the client has no database set or if a global
    /// recorder is already installed.
    pub fn install(self) -> Result<(), InfluxError> {
        let recorder = self.build()?;
        metrics::set_global_recorder(recorder).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientOptions;
    use std::time::Duration;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    async fn mock_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("db", "telemetry"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        server
    }

    fn recorder(server: &MockServer) -> InfluxRecorder {
        let address = server.address();
        let client = InfluxClient::create(
            ClientOptions::default()
                .host(&address.ip().to_string())
                .port(address.port()),
        )
        .unwrap()
        .use_database("telemetry");
        InfluxRecorderBuilder::new(client).build().unwrap()
    }

    /// Collects the bodies of the first `count` requests, without timestamps.
    async fn received_lines(server: &MockServer, count: usize) -> Vec<String> {
        let requests: Vec<Request> = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let requests = server.received_requests().await.unwrap_or_default();
                if requests.len() >= count {
                    return requests;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("writes did not arrive");

        let mut lines: Vec<String> = requests
            .iter()
            .map(|r| {
                let body = String::from_utf8_lossy(&r.body);
                let line = body.trim_end();
                line.rsplit_once(' ').map_or(line, |(l, _)| l).to_string()
            })
            .collect();
        lines.sort();
        lines
    }

    #[tokio::test]
    async fn counter_writes_running_total() {
        let server = mock_server().await;
        let recorder = recorder(&server);

        metrics::with_local_recorder(&recorder, || {
            let counter = metrics::counter!("requests", "route" => "/home");
            counter.increment(2);
            counter.increment(3);
        });

        assert_eq!(
            received_lines(&server, 2).await,
            vec![
                "requests,route=/home value=2i".to_string(),
                "requests,route=/home value=5i".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn gauge_writes_current_value() {
        let server = mock_server().await;
        let recorder = recorder(&server);

        metrics::with_local_recorder(&recorder, || {
            let gauge = metrics::gauge!("queue_depth");
            gauge.set(4.0);
            gauge.increment(1.5);
            gauge.decrement(0.5);
        });

        assert_eq!(
            received_lines(&server, 3).await,
            vec![
                "queue_depth value=4".to_string(),
                "queue_depth value=5".to_string(),
                "queue_depth value=5.5".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn histogram_writes_each_sample() {
        let server = mock_server().await;
        let recorder = recorder(&server);

        metrics::with_local_recorder(&recorder, || {
            metrics::histogram!("latency").record(0.25);
        });

        assert_eq!(
            received_lines(&server, 1).await,
            vec!["latency value=0.25".to_string()]
        );
    }

    #[tokio::test]
    async fn builder_requires_database() {
        let client = InfluxClient::create(ClientOptions::default()).unwrap();
        let result = InfluxRecorderBuilder::new(client).build();
        assert!(matches!(result, Err(InfluxError::NoDatabase)));
    }
}
