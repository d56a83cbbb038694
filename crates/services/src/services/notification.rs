//! Owner notifications for newly generated tasks.
//!
//! Delivery is best effort. Callers dispatch through [`NotificationService`], which
//! runs each delivery on its own tracked task and only logs failures. Short-lived
//! processes call [`NotificationService::drain`] before exiting.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use db::models::task::Task;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::NotificationConfig;

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
}

impl NotificationError {
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Http { status, .. } => *status == 429 || (500..=599).contains(status),
        }
    }
}

/// Subject and plain-text body announcing a new task to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskCreatedMessage {
    pub subject: String,
    pub body: String,
}

impl TaskCreatedMessage {
    pub fn render(task: &Task, dashboard_url: &str) -> Self {
        let due = task
            .due_date
            .map(|d| d.format("%B %d, %Y").to_string())
            .unwrap_or_else(|| "No due date".to_string());
        let description = task
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or("No description provided");
        let category = task.category.as_deref().unwrap_or("Uncategorized");

        let body = format!(
            "A new maintenance task has been created for you.\n\n\
             Task: {title}\n\
             Category: {category}\n\
             Priority: {priority}\n\
             Due Date: {due}\n\n\
             Description:\n{description}\n\n\
             View your tasks: {dashboard_url}\n",
            title = task.title,
            priority = capitalize(&task.priority.to_string()),
        );

        Self {
            subject: format!("New Task: {}", task.title),
            body,
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[async_trait]
pub trait TaskNotifier: Send + Sync {
    async fn task_created(&self, owner_id: Uuid, task: &Task) -> Result<(), NotificationError>;
}

/// Renders the message and writes it to the log.
pub struct LogNotifier {
    dashboard_url: String,
}

impl LogNotifier {
    pub fn new(dashboard_url: impl Into<String>) -> Self {
        Self {
            dashboard_url: dashboard_url.into(),
        }
    }
}

#[async_trait]
impl TaskNotifier for LogNotifier {
    async fn task_created(&self, owner_id: Uuid, task: &Task) -> Result<(), NotificationError> {
        let message = TaskCreatedMessage::render(task, &self.dashboard_url);
        info!(
            owner_id = %owner_id,
            task_id = %task.id,
            subject = %message.subject,
            "Task notification"
        );
        debug!(body = %message.body, "Task notification body");
        Ok(())
    }
}

pub struct DisabledNotifier;

#[async_trait]
impl TaskNotifier for DisabledNotifier {
    async fn task_created(&self, _owner_id: Uuid, _task: &Task) -> Result<(), NotificationError> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    owner_id: Uuid,
    task_id: Uuid,
    subject: &'a str,
    body: &'a str,
}

/// POSTs the rendered message as JSON, retrying transient failures.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: Client,
    url: String,
    dashboard_url: String,
}

impl WebhookNotifier {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(url: impl Into<String>, dashboard_url: impl Into<String>) -> Result<Self, NotificationError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("homekeep/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
            dashboard_url: dashboard_url.into(),
        })
    }

    async fn post(&self, payload: &WebhookPayload<'_>) -> Result<(), NotificationError> {
        let res = self
            .http
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = res.status();
        if status.is_success() {
            return Ok(());
        }
        let body = res.text().await.unwrap_or_default();
        Err(NotificationError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl TaskNotifier for WebhookNotifier {
    async fn task_created(&self, owner_id: Uuid, task: &Task) -> Result<(), NotificationError> {
        let message = TaskCreatedMessage::render(task, &self.dashboard_url);
        let payload = WebhookPayload {
            owner_id,
            task_id: task.id,
            subject: &message.subject,
            body: &message.body,
        };

        (|| async { self.post(&payload).await })
            .retry(
                &ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(500))
                    .with_max_delay(Duration::from_secs(10))
                    .with_max_times(3)
                    .with_jitter(),
            )
            .when(|e: &NotificationError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "Task notification webhook failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }
}

fn map_reqwest_error(e: reqwest::Error) -> NotificationError {
    if e.is_timeout() {
        NotificationError::Timeout
    } else {
        NotificationError::Transport(e.to_string())
    }
}

/// Fire-and-forget front for a [`TaskNotifier`]. Clones share one set of in-flight
/// deliveries.
#[derive(Clone)]
pub struct NotificationService {
    notifier: Arc<dyn TaskNotifier>,
    in_flight: TaskTracker,
}

impl NotificationService {
    /// Upper bound a process should wait for pending deliveries on shutdown.
    pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(notifier: Arc<dyn TaskNotifier>) -> Self {
        Self {
            notifier,
            in_flight: TaskTracker::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledNotifier))
    }

    pub fn from_config(config: &NotificationConfig) -> Result<Self, NotificationError> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let notifier: Arc<dyn TaskNotifier> = match &config.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url, &config.dashboard_url)?),
            None => Arc::new(LogNotifier::new(&config.dashboard_url)),
        };
        Ok(Self::new(notifier))
    }

    /// Deliver on a background task. The caller never waits on, or sees, the outcome.
    pub fn dispatch_task_created(&self, owner_id: Uuid, task: Task) -> JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        self.in_flight.spawn(async move {
            if let Err(e) = notifier.task_created(owner_id, &task).await {
                warn!(
                    owner_id = %owner_id,
                    task_id = %task.id,
                    error = %e,
                    "Failed to send task notification"
                );
            }
        })
    }

    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait up to `timeout` for dispatched deliveries to finish. Returns `false` if
    /// some were still running when the timeout elapsed.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.in_flight.close();
        let finished = tokio::time::timeout(timeout, self.in_flight.wait())
            .await
            .is_ok();
        self.in_flight.reopen();
        if !finished {
            warn!(
                pending = self.in_flight.len(),
                "Gave up waiting for task notifications"
            );
        }
        finished
    }
}
