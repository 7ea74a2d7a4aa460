//! Asynchronous task polling

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::client::FmgClient;
use crate::error::{FmgError, Result};
use crate::version::{render, Capability};

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Error,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error | TaskStatus::Cancelled)
    }

    /// Map the appliance's numeric or string task state.
    ///
    /// Numeric states: 0 pending, 1 running, 2 cancelling, 3 cancelled,
    /// 4 done, 5 error, 6 aborting, 7 aborted, 8 warning, 9 to-continue,
    /// 10 unknown. A finished task with warnings counts as done.
    pub fn from_state(state: &Value) -> Self {
        match state {
            Value::Number(n) => match n.as_i64() {
                Some(0) => TaskStatus::Pending,
                Some(3) | Some(7) => TaskStatus::Cancelled,
                Some(4) | Some(8) => TaskStatus::Done,
                Some(5) => TaskStatus::Error,
                _ => TaskStatus::Running,
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "pending" | "queued" => TaskStatus::Pending,
                "done" | "success" | "warning" | "complete" | "completed" => TaskStatus::Done,
                "error" | "failed" | "fail" => TaskStatus::Error,
                "cancelled" | "canceled" | "aborted" => TaskStatus::Cancelled,
                other => match other.parse::<i64>() {
                    Ok(n) => Self::from_state(&Value::from(n)),
                    Err(_) => TaskStatus::Running,
                },
            },
            _ => TaskStatus::Pending,
        }
    }
}

/// Per-device detail of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLine {
    pub name: Option<String>,
    pub vdom: Option<String>,
    pub status: TaskStatus,
    pub percent: u8,
    pub detail: Option<String>,
}

impl TaskLine {
    fn from_value(value: &Value) -> Self {
        Self {
            name: string_field(value, "name"),
            vdom: string_field(value, "vdom"),
            status: value
                .get("state")
                .map(TaskStatus::from_state)
                .unwrap_or(TaskStatus::Pending),
            percent: percent_field(value),
            detail: string_field(value, "detail"),
        }
    }
}

/// Snapshot of a remote task. Read-only; never mutated locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub title: Option<String>,
    pub status: TaskStatus,
    pub percent: u8,
    pub num_done: u64,
    pub num_err: u64,
    pub num_lines: u64,
    pub lines: Vec<TaskLine>,
}

impl Task {
    /// Build a snapshot from a `/task/task/{id}` payload.
    pub fn from_value(id: u64, value: &Value) -> Self {
        let lines = value
            .get("line")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(TaskLine::from_value).collect())
            .unwrap_or_default();

        Self {
            id: number_field(value, "id").unwrap_or(id),
            title: string_field(value, "title"),
            status: value
                .get("state")
                .map(TaskStatus::from_state)
                .unwrap_or(TaskStatus::Pending),
            percent: percent_field(value),
            num_done: number_field(value, "num_done").unwrap_or(0),
            num_err: number_field(value, "num_err").unwrap_or(0),
            num_lines: number_field(value, "num_lines").unwrap_or(0),
            lines,
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_field(value: &Value, key: &str) -> Option<u64> {
    match value.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn percent_field(value: &Value) -> u8 {
    number_field(value, "percent").map(|p| p.min(100) as u8).unwrap_or(0)
}

/// Extract a task id from a submission response such as `{"task": 42}`.
pub fn task_id_from(data: &Value) -> Option<u64> {
    number_field(data, "task").or_else(|| number_field(data, "taskid"))
}

/// Polls tasks through a client
#[derive(Clone)]
pub struct TaskPoller {
    client: FmgClient,
}

impl TaskPoller {
    pub fn new(client: FmgClient) -> Self {
        Self { client }
    }

    /// Fetch one snapshot
    #[instrument(skip(self))]
    pub async fn get(&self, task_id: u64) -> Result<Task> {
        let id = task_id.to_string();
        let template = self.client.endpoint_for(Capability::TaskStatus).await?;
        let url = render(template, &[("task", &id)]);
        let data = self.client.get(&url).await?;
        Ok(Task::from_value(task_id, &data))
    }

    /// Per-device lines of a task
    #[instrument(skip(self))]
    pub async fn lines(&self, task_id: u64) -> Result<Vec<TaskLine>> {
        let id = task_id.to_string();
        let template = self.client.endpoint_for(Capability::TaskLines).await?;
        let url = render(template, &[("task", &id)]);
        let data = self.client.get(&url).await?;
        Ok(data
            .as_array()
            .map(|items| items.iter().map(TaskLine::from_value).collect())
            .unwrap_or_default())
    }

    /// Wait using the client's configured interval and deadline
    pub async fn wait_default(&self, task_id: u64) -> Result<Task> {
        let settings = self.client.settings();
        self.wait(task_id, settings.poll_interval(), settings.poll_deadline())
            .await
    }

    /// Poll until the task reaches a terminal state or the deadline passes.
    ///
    /// Stops with [`FmgError::TaskTimeout`] as soon as one more interval
    /// would cross the deadline, so `deadline < interval` polls exactly once.
    /// A poll still in flight at the deadline is abandoned and the last
    /// snapshot is reported.
    /// The remote task keeps running either way.
    pub async fn wait(&self, task_id: u64, interval: Duration, deadline: Duration) -> Result<Task> {
        self.wait_with_progress(task_id, interval, deadline, |_| {})
            .await
    }

    /// [`wait`](Self::wait) with a callback invoked after every poll
    #[instrument(skip(self, on_poll))]
    pub async fn wait_with_progress<F>(
        &self,
        task_id: u64,
        interval: Duration,
        deadline: Duration,
        mut on_poll: F,
    ) -> Result<Task>
    where
        F: FnMut(&Task) + Send,
    {
        let start = Instant::now();
        let mut last: Option<Task> = None;

        loop {
            // A poll stuck in retries must not outlive the wait itself
            let task = match tokio::time::timeout_at(start + deadline, self.get(task_id)).await {
                Ok(polled) => polled?,
                Err(_) => {
                    let waited = start.elapsed();
                    warn!(task_id, "Task poll still outstanding at the wait deadline");
                    let task = last.unwrap_or_else(|| Task::from_value(task_id, &Value::Null));
                    return Err(FmgError::TaskTimeout {
                        task: Box::new(task),
                        waited,
                    });
                }
            };
            on_poll(&task);

            if task.status.is_terminal() {
                info!(task_id, status = ?task.status, "Task finished");
                return Ok(task);
            }

            let waited = start.elapsed();
            if waited + interval > deadline {
                warn!(task_id, percent = task.percent, "Task wait deadline reached");
                return Err(FmgError::TaskTimeout {
                    task: Box::new(task),
                    waited,
                });
            }

            debug!(task_id, percent = task.percent, "Task still running");
            last = Some(task);
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_states() {
        let cases = [
            (0, TaskStatus::Pending),
            (1, TaskStatus::Running),
            (2, TaskStatus::Running),
            (3, TaskStatus::Cancelled),
            (4, TaskStatus::Done),
            (5, TaskStatus::Error),
            (6, TaskStatus::Running),
            (7, TaskStatus::Cancelled),
            (8, TaskStatus::Done),
        ];
        for (state, expected) in cases {
            assert_eq!(TaskStatus::from_state(&json!(state)), expected, "state {}", state);
        }
    }

    #[test]
    fn test_string_states() {
        assert_eq!(TaskStatus::from_state(&json!("done")), TaskStatus::Done);
        assert_eq!(TaskStatus::from_state(&json!("Error")), TaskStatus::Error);
        assert_eq!(TaskStatus::from_state(&json!("4")), TaskStatus::Done);
        assert_eq!(TaskStatus::from_state(&json!("running")), TaskStatus::Running);
    }

    #[test]
    fn test_task_from_value() {
        let data = json!({
            "id": 17,
            "title": "Install policy package",
            "state": 1,
            "percent": 40,
            "num_done": 1,
            "num_err": 0,
            "num_lines": 2,
            "line": [
                {"name": "FGT-A", "vdom": "root", "state": 4, "percent": 100, "detail": "ok"},
                {"name": "FGT-B", "state": 1, "percent": 10}
            ]
        });

        let task = Task::from_value(17, &data);
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.percent, 40);
        assert_eq!(task.lines.len(), 2);
        assert_eq!(task.lines[0].status, TaskStatus::Done);
        assert_eq!(task.lines[1].vdom, None);
        assert!(!task.status.is_terminal());
    }

    #[test]
    fn test_task_id_from_submission() {
        assert_eq!(task_id_from(&json!({"task": 99})), Some(99));
        assert_eq!(task_id_from(&json!({"task": "12"})), Some(12));
        assert_eq!(task_id_from(&json!({"pid": 1})), None);
    }
}
