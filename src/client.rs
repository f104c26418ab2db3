use crate::{
    error::{InfluxError, WriteResult},
    line_protocol,
    measurement::Measurement,
};
use reqwest::{StatusCode, Url, header::CONTENT_TYPE};
use serde::{Deserialize, Deserializer};
use std::{future::Future, net::IpAddr, sync::Arc, time::Duration};
use tokio::runtime::Handle;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8086;

/// Precision of the timestamps carried by written measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Precision {
    #[serde(rename = "ns")]
    Nanoseconds,
    #[serde(rename = "us")]
    Microseconds,
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "s")]
    Seconds,
}

impl Precision {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
        }
    }
}

/// Transport configuration for an [`InfluxClient`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    host: String,
    port: u16,
    #[serde(rename = "timeout_ms", deserialize_with = "deserialize_millis")]
    timeout: Option<Duration>,
    precision: Option<Precision>,
    #[serde(skip)]
    runtime: Option<Handle>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            timeout: None,
            precision: None,
            runtime: None,
        }
    }
}

impl ClientOptions {
    /// Sets the host the database listens on.
    #[must_use]
    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Sets the port of the write endpoint.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets a timeout applied to each write request.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the precision timestamps are written in.
    #[must_use]
    pub const fn precision(mut self, precision: Precision) -> Self {
        self.precision = Some(precision);
        self
    }

    /// Sets the runtime write requests are spawned on. Defaults to the runtime
    /// the client is created from.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    fn write_url(&self) -> Result<Url, InfluxError> {
        let endpoint_error = |reason: String| InfluxError::Endpoint {
            url: format!("{}:{}", self.host, self.port),
            reason,
        };

        let mut parsed =
            Url::parse("http://localhost/write").map_err(|e| endpoint_error(e.to_string()))?;
        match self.host.parse::<IpAddr>() {
            Ok(ip) => parsed
                .set_ip_host(ip)
                .map_err(|()| endpoint_error("cannot set IP host".into()))?,
            Err(_) => parsed
                .set_host(Some(&self.host))
                .map_err(|e| endpoint_error(e.to_string()))?,
        }
        parsed
            .set_port(Some(self.port))
            .map_err(|()| endpoint_error("cannot set port".into()))?;

        if let Some(precision) = self.precision {
            parsed
                .query_pairs_mut()
                .append_pair("precision", precision.as_str());
        }
        Ok(parsed)
    }
}

fn deserialize_millis<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}

#[derive(Debug)]
struct Transport {
    http: reqwest::Client,
    write_url: Url,
    runtime: Handle,
}

impl Transport {
    fn post(&self, payload: String, database: &str) -> impl Future<Output = WriteResult> + use<> {
        let mut url = self.write_url.clone();
        url.query_pairs_mut().append_pair("db", database);
        log::debug!("Writing {} bytes to {url}", payload.len());

        let request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(payload)
            .send();

        async move { translate(request.await).await }
    }
}

async fn translate(response: Result<reqwest::Response, reqwest::Error>) -> WriteResult {
    let response = response?;
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(());
    }
    let body = response.text().await?;
    Err(InfluxError::Rejected {
        status: status.as_u16(),
        body,
    })
}

/// Invokes the wrapped callback exactly once: with the write result, or with
/// [`InfluxError::Canceled`] if dropped before a result arrived.
struct Completion<F: FnOnce(WriteResult)> {
    callback: Option<F>,
}

impl<F: FnOnce(WriteResult)> Completion<F> {
    const fn new(callback: F) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    fn complete(mut self, result: WriteResult) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl<F: FnOnce(WriteResult)> Drop for Completion<F> {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Err(InfluxError::Canceled));
        }
    }
}

/// A client for the line-protocol write endpoint.
///
/// Cloning a client, or deriving one with [`InfluxClient::use_database`], shares
/// the underlying HTTP transport. The database of an instance never changes
/// after it is created.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    transport: Arc<Transport>,
    database: Option<Arc<str>>,
}

impl InfluxClient {
    /// Creates a client bound to the host and port in `options`. No database is
    /// set; use [`InfluxClient::use_database`] or the `*_to` methods.
    ///
    /// # Example
    /// ```rust,no_run
    /// use influx_line_client::{ClientOptions, InfluxClient};
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let client = InfluxClient::create(ClientOptions::default().host("influx.local"))
    ///     .expect("client")
    ///     .use_database("telemetry");
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns an error if the endpoint is not a valid URL, if the HTTP client
    /// cannot be built, or if no runtime was given and none is current.
    pub fn create(options: ClientOptions) -> Result<Self, InfluxError> {
        let write_url = options.write_url()?;
        let runtime = match options.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()?,
        };

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            transport: Arc::new(Transport {
                http: builder.build()?,
                write_url,
                runtime,
            }),
            database: None,
        })
    }

    /// Returns a new client writing to `database` by default, sharing this
    /// client's transport. `self` is left untouched.
    #[must_use]
    pub fn use_database(&self, database: &str) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            database: Some(Arc::from(database)),
        }
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn default_database(&self) -> Result<&str, InfluxError> {
        self.database().ok_or(InfluxError::NoDatabase)
    }

    /// Writes `measurements` to the default database.
    ///
    /// The payload is encoded and the database resolved before this returns;
    /// the returned future performs the request.
    ///
    /// # Errors
    /// Returns [`InfluxError::NoDatabase`] if no database is set.
    pub fn write(
        &self,
        measurements: &[Measurement],
    ) -> Result<impl Future<Output = WriteResult> + Send + 'static + use<>, InfluxError> {
        let database = self.default_database()?;
        Ok(self.write_to(measurements, database))
    }

    /// Writes `measurements` to `database`, ignoring the default database.
    pub fn write_to(
        &self,
        measurements: &[Measurement],
        database: &str,
    ) -> impl Future<Output = WriteResult> + Send + 'static + use<> {
        self.transport
            .post(line_protocol::encode(measurements), database)
    }

    /// Sends one measurement to the default database and reports the outcome to
    /// `callback`.
    ///
    /// # Errors
    /// Returns [`InfluxError::NoDatabase`] if no database is set; `callback` is
    /// not invoked in that case.
    pub fn send<F>(&self, measurement: &Measurement, callback: F) -> Result<(), InfluxError>
    where
        F: FnOnce(WriteResult) + Send + 'static,
    {
        self.send_batch(std::slice::from_ref(measurement), callback)
    }

    /// Sends a batch of measurements to the default database as one request.
    ///
    /// # Errors
    /// Returns [`InfluxError::NoDatabase`] if no database is set; `callback` is
    /// not invoked in that case.
    pub fn send_batch<F>(&self, measurements: &[Measurement], callback: F) -> Result<(), InfluxError>
    where
        F: FnOnce(WriteResult) + Send + 'static,
    {
        let database = self.default_database()?;
        self.send_batch_to(measurements, database, callback);
        Ok(())
    }

    /// Sends one measurement to `database`.
    pub fn send_to<F>(&self, measurement: &Measurement, database: &str, callback: F)
    where
        F: FnOnce(WriteResult) + Send + 'static,
    {
        self.send_batch_to(std::slice::from_ref(measurement), database, callback);
    }

    /// Sends a batch of measurements to `database` as one request.
    ///
    /// Returns as soon as the request is scheduled. `callback` runs on the
    /// client's runtime once the request completes.
    pub fn send_batch_to<F>(&self, measurements: &[Measurement], database: &str, callback: F)
    where
        F: FnOnce(WriteResult) + Send + 'static,
    {
        let completion = Completion::new(callback);
        let write = self.write_to(measurements, database);
        self.transport.runtime.spawn(async move {
            completion.complete(write.await);
        });
    }
}
