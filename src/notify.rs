/// Push notification delivery: one POST to an ntfy-style topic per run.
///
/// The request carries a `Title` header naming the job, an optional
/// `Authorization` header, and, for large payloads, a `Filename` header that
/// makes the server deliver the body as an attachment instead of inline text.
use crate::config::NotifyConfig;
use crate::console;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Local};
use reqwest::StatusCode;

/// Payloads of this many bytes or more go out as an attachment.
pub const ATTACHMENT_THRESHOLD: usize = 4096;

const BODY_PREVIEW_LIMIT: usize = 512;

/// A fully formed notification, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub authorization: Option<String>,
    pub filename: Option<String>,
    /// Size of the decoded payload in bytes (before the body prefix).
    pub payload_bytes: usize,
}

/// Errors from delivering a notification. All of them are fatal to the run.
#[derive(Debug)]
pub enum NotifyError {
    /// The HTTP client could not be constructed.
    Client { source: reqwest::Error },
    /// The request never produced a response (DNS, connect, TLS, bad header).
    Request { url: String, source: reqwest::Error },
    /// The server answered with a non-success status.
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    /// Ctrl-C arrived before the server answered.
    Interrupted,
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::Client { source } => {
                write!(f, "failed to build HTTP client: {}", source)
            }
            NotifyError::Request { url, source } => {
                write!(f, "notification request to {} failed: {}", url, source)
            }
            NotifyError::Status { url, status, body } => {
                write!(f, "notification to {} rejected with {}", url, status)?;
                if !body.is_empty() {
                    write!(f, ": {}", body)?;
                }
                Ok(())
            }
            NotifyError::Interrupted => {
                write!(f, "interrupted before the notification was delivered")
            }
        }
    }
}

impl std::error::Error for NotifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NotifyError::Client { source } => Some(source),
            NotifyError::Request { source, .. } => Some(source),
            NotifyError::Status { .. } | NotifyError::Interrupted => None,
        }
    }
}

impl Notification {
    /// Assemble the notification for `job`. Byte payloads are decoded as
    /// UTF-8, with invalid sequences replaced.
    pub fn build(
        job: &str,
        output: impl AsRef<[u8]>,
        config: &NotifyConfig,
        finished_at: DateTime<Local>,
    ) -> Self {
        let payload = String::from_utf8_lossy(output.as_ref());
        let payload_bytes = payload.len();
        let filename = (payload_bytes >= ATTACHMENT_THRESHOLD).then(|| format!("{job}.log"));

        Self {
            title: format!("Scrapy spider {job} finished!"),
            body: format_body(finished_at, &payload),
            authorization: authorization(config),
            filename,
            payload_bytes,
        }
    }

    pub fn is_attachment(&self) -> bool {
        self.filename.is_some()
    }
}

/// `Authorization` header value. Basic needs both username and password;
/// a bearer token, when set, takes precedence.
pub fn authorization(config: &NotifyConfig) -> Option<String> {
    let mut header = None;
    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        if !user.is_empty() && !pass.is_empty() {
            let encoded = STANDARD.encode(format!("{user}:{pass}"));
            header = Some(format!("Basic {encoded}"));
        }
    }
    if let Some(token) = config.bearer.as_deref().filter(|t| !t.is_empty()) {
        header = Some(format!("Bearer {token}"));
    }
    header
}

pub fn format_body(finished_at: DateTime<Local>, payload: &str) -> String {
    format!("Finished at {} Output: {}", format_timestamp(finished_at), payload)
}

/// `YYYY-MM-DD HH:MM:SS[.ffffff]`; the fraction is left out on a whole second.
fn format_timestamp(at: DateTime<Local>) -> String {
    if at.timestamp_subsec_micros() == 0 {
        at.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        at.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

pub fn build_client() -> Result<reqwest::Client, NotifyError> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .build()
        .map_err(|e| NotifyError::Client { source: e })
}

/// POST the notification once. Any non-success status is an error.
pub async fn send(
    client: &reqwest::Client,
    url: &str,
    notification: &Notification,
) -> Result<StatusCode, NotifyError> {
    let mut request = client
        .post(url)
        .header("Title", &notification.title)
        .body(notification.body.clone());
    if let Some(auth) = &notification.authorization {
        request = request.header(reqwest::header::AUTHORIZATION, auth);
    }
    if let Some(filename) = &notification.filename {
        request = request.header("Filename", filename);
    }

    let response = request.send().await.map_err(|e| NotifyError::Request {
        url: url.to_string(),
        source: e,
    })?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(NotifyError::Status {
            url: url.to_string(),
            status,
            body: preview(&text),
        });
    }
    Ok(status)
}

/// Build and deliver the end-of-run notification for `job`.
pub async fn notify(
    client: &reqwest::Client,
    config: &NotifyConfig,
    job: &str,
    output: &str,
) -> Result<(), NotifyError> {
    let notification = Notification::build(job, output, config, Local::now());
    if notification.is_attachment() {
        console::print_warning(&format!(
            "You'll receive your log as an attachment, because it's {} bytes long.",
            notification.payload_bytes
        ));
    }

    let url = config.url();
    let status = send(client, &url, &notification).await?;
    tracing::info!(
        %url,
        status = status.as_u16(),
        payload_bytes = notification.payload_bytes,
        attachment = notification.is_attachment(),
        "notification delivered"
    );
    Ok(())
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= BODY_PREVIEW_LIMIT {
        return trimmed.to_string();
    }
    let mut end = BODY_PREVIEW_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}
