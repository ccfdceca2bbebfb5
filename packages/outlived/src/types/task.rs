//! Units of scrape work and their content-derived identities.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::form_urlencoded;

use super::date::days_in_month;
use crate::error::{QueueError, QueueResult};

/// Dispatch path for day tasks.
pub const DAY_TASK_PATH: &str = "/task/scrapeday";

/// Dispatch path for person tasks.
pub const PERSON_TASK_PATH: &str = "/task/scrapeperson";

/// Deterministic task identity: hex SHA-256 of the task's key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    fn for_key(key: &str) -> Self {
        Self(hex::encode(Sha256::digest(key.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// What a task asks a worker to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Read the death list for a calendar day
    Day { month: u32, day: u32 },
    /// Read one person's page
    Person {
        href: String,
        title: String,
        desc: String,
    },
}

impl TaskPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskPayload::Day { .. } => "day",
            TaskPayload::Person { .. } => "person",
        }
    }

    /// Key hashed into the task id. Person tasks are keyed by link alone so
    /// a person listed twice collapses to one task.
    fn key(&self) -> String {
        match self {
            TaskPayload::Day { month, day } => format!("day:{}/{}", month, day),
            TaskPayload::Person { href, .. } => format!("person:{}", href),
        }
    }
}

/// A task with its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeTask {
    pub id: TaskId,
    pub payload: TaskPayload,
}

impl ScrapeTask {
    pub fn new(payload: TaskPayload) -> Self {
        Self {
            id: TaskId::for_key(&payload.key()),
            payload,
        }
    }

    pub fn day(month: u32, day: u32) -> Self {
        Self::new(TaskPayload::Day { month, day })
    }

    pub fn person(
        href: impl Into<String>,
        title: impl Into<String>,
        desc: impl Into<String>,
    ) -> Self {
        Self::new(TaskPayload::Person {
            href: href.into(),
            title: title.into(),
            desc: desc.into(),
        })
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    /// Relative URI an external router can deliver this task to.
    pub fn dispatch_uri(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        let path = match &self.payload {
            TaskPayload::Day { month, day } => {
                query
                    .append_pair("m", &month.to_string())
                    .append_pair("d", &day.to_string());
                DAY_TASK_PATH
            }
            TaskPayload::Person { href, title, desc } => {
                query
                    .append_pair("href", href)
                    .append_pair("title", title)
                    .append_pair("desc", desc);
                PERSON_TASK_PATH
            }
        };
        format!("{}?{}", path, query.finish())
    }

    /// Rebuild a task from a dispatch URI.
    pub fn from_dispatch_uri(uri: &str) -> QueueResult<Self> {
        let invalid = |reason: &str| QueueError::InvalidDispatch {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        let params: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        let param = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };

        match path {
            DAY_TASK_PATH => {
                let month: u32 = param("m")
                    .and_then(|m| m.parse().ok())
                    .ok_or_else(|| invalid("missing or non-numeric m"))?;
                let day: u32 = param("d")
                    .and_then(|d| d.parse().ok())
                    .ok_or_else(|| invalid("missing or non-numeric d"))?;
                // February 29th is a valid slot, so check against a leap year
                match days_in_month(2000, month) {
                    Some(last) if (1..=last).contains(&day) => Ok(Self::day(month, day)),
                    _ => Err(invalid("no such calendar day")),
                }
            }
            PERSON_TASK_PATH => {
                let href = param("href")
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| invalid("missing href"))?;
                Ok(Self::person(
                    href,
                    param("title").unwrap_or_default(),
                    param("desc").unwrap_or_default(),
                ))
            }
            _ => Err(invalid("unknown task path")),
        }
    }
}

/// Every (month, day) of the calendar, including February 29th: 366 slots.
pub fn calendar_day_slots() -> impl Iterator<Item = (u32, u32)> {
    (1..=12u32).flat_map(|month| {
        let last = days_in_month(2000, month).unwrap_or(0);
        (1..=last).map(move |day| (month, day))
    })
}
