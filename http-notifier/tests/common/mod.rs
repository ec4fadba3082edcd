#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Redirect;
use axum::routing::post;
use http_notifier::{
    BindingResolver, Build, BuildStatus, EnvSecretGetter, HttpNotifier, NotifierConfig,
    ParamsBindingResolver, RequestContext,
};
use tokio::net::TcpListener;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// One request seen by the receiver.
#[derive(Debug, Clone)]
pub struct Captured {
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The body decoded as the JSON string it must be.
    pub fn message(&self) -> String {
        serde_json::from_slice(&self.body).expect("body is a JSON string")
    }
}

#[derive(Clone)]
struct ReceiverState {
    requests: Arc<Mutex<Vec<Captured>>>,
    status: StatusCode,
    delay: Duration,
}

/// In-process webhook endpoint.
pub struct Receiver {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Captured>>>,
}

impl Receiver {
    pub async fn start(status: StatusCode) -> Self {
        Self::start_with_delay(status, Duration::ZERO).await
    }

    /// Records each request, waits `delay`, then answers with `status`.
    pub async fn start_with_delay(status: StatusCode, delay: Duration) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = ReceiverState {
            requests: requests.clone(),
            status,
            delay,
        };
        let app = Router::new()
            .route("/hook", post(record))
            .route("/moved", post(|| async { Redirect::temporary("/hook") }))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}/hook", self.addr)
    }

    /// Answers 307 pointing at [`Receiver::url`].
    pub fn moved_url(&self) -> String {
        format!("http://{}/moved", self.addr)
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }
}

async fn record(State(state): State<ReceiverState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    state.requests.lock().unwrap().push(Captured { headers, body });
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    state.status
}

/// Collects formatted log output from the current thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Route this thread's events, `debug` and above, into the capture.
    pub fn set_default(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Lines logged by this crate at `level`.
    pub fn lines_at(&self, level: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains(level) && line.contains("http_notifier"))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// An address nothing listens on.
pub async fn closed_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/hook")
}

pub fn config(filter: &str, url: &str, template: &str) -> NotifierConfig {
    config_with_params(filter, url, template, &[])
}

pub fn config_with_params(
    filter: &str,
    url: &str,
    template: &str,
    params: &[(&str, &str)],
) -> NotifierConfig {
    let params: Vec<serde_json::Value> = params
        .iter()
        .map(|(name, value)| serde_json::json!({ "name": name, "value": value }))
        .collect();
    let document = serde_json::json!({
        "apiVersion": "build-notifiers/v1",
        "kind": "HTTPNotifier",
        "metadata": { "name": "test-notifier" },
        "spec": {
            "notification": {
                "filter": filter,
                "delivery": { "url": url },
                "template": { "type": "golang", "content": template },
                "params": params,
            }
        }
    });
    NotifierConfig::from_yaml(&document.to_string()).unwrap()
}

pub async fn notifier(config: &NotifierConfig) -> http_notifier::Result<HttpNotifier> {
    let ctx = RequestContext::new();
    let template = config.template_source(None)?;
    let resolver: Arc<dyn BindingResolver> =
        Arc::new(ParamsBindingResolver::from_config(&ctx, config, &EnvSecretGetter).await?);
    HttpNotifier::setup(&ctx, config, &template, &EnvSecretGetter, resolver).await
}

pub fn build(id: &str, status: BuildStatus) -> Build {
    let mut build = Build::new(id, status)
        .with_log_url(format!("https://ci.example.com/builds/{id}/log"))
        .with_substitution("BRANCH_NAME", "main");
    build.project_id = "demo-project".into();
    build
}
