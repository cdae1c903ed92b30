//! Issue tracker adapter for the GitHub REST API (v3).
//!
//! Issues are addressed by their repository-local number, which is also the
//! [`TrackerId`] stored in the mapping table. Pull requests come back from
//! the issues endpoint too and are dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tandem_core::{ItemState, RetryPolicy, TrackerConfig, TrackerId, TrackerItem};
use tandem_sync::{NewTrackerItem, PortError, TrackerPort, TrackerUpdate};

use crate::http;
use crate::retry;

const PAGE_SIZE: usize = 100;
const ACCEPT: &str = "application/vnd.github.v3+json";

#[derive(Debug, Deserialize)]
struct IssueWire {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: ItemState,
    #[serde(default)]
    labels: Vec<LabelWire>,
    html_url: String,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct LabelWire {
    name: String,
}

impl IssueWire {
    fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    fn into_item(self) -> TrackerItem {
        TrackerItem {
            id: TrackerId::from(self.number),
            title: self.title,
            body: self.body,
            state: self.state,
            labels: self.labels.into_iter().map(|label| label.name).collect(),
            url: self.html_url,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateBody<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    labels: &'a [String],
}

#[derive(Debug, Serialize)]
struct PatchBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<ItemState>,
}

impl<'a> From<&'a TrackerUpdate> for PatchBody<'a> {
    fn from(update: &'a TrackerUpdate) -> Self {
        Self {
            title: update.title.as_deref(),
            body: update.body.as_deref(),
            state: update.state,
        }
    }
}

/// Tracker port backed by one GitHub repository.
pub struct GitHubTracker {
    agent: ureq::Agent,
    repo_url: String,
    authorization: String,
    retry: RetryPolicy,
}

impl GitHubTracker {
    pub fn new(config: &TrackerConfig, agent: ureq::Agent, retry: RetryPolicy) -> Self {
        Self {
            agent,
            repo_url: format!(
                "{}/repos/{}",
                config.api_base.trim_end_matches('/'),
                config.repository
            ),
            authorization: format!("token {}", config.token),
            retry,
        }
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        self.agent
            .request(method, url)
            .set("Authorization", &self.authorization)
            .set("Accept", ACCEPT)
    }

    fn list(&self, state: &str) -> Result<Vec<TrackerItem>, PortError> {
        let url = format!("{}/issues", self.repo_url);
        let mut items = Vec::new();
        let mut page = 1usize;
        loop {
            let batch: Vec<IssueWire> = retry::call(&self.retry, "list issues", || {
                let response = self
                    .request("GET", &url)
                    .query("state", state)
                    .query("per_page", &PAGE_SIZE.to_string())
                    .query("page", &page.to_string())
                    .call()
                    .map_err(|err| http::port_error("list issues", "", err))?;
                http::read_json("list issues", response)
            })?;
            let fetched = batch.len();
            items.extend(
                batch
                    .into_iter()
                    .filter(|issue| !issue.is_pull_request())
                    .map(IssueWire::into_item),
            );
            if fetched < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        tracing::debug!(state, pages = page, count = items.len(), "listed tracker issues");
        Ok(items)
    }
}

impl TrackerPort for GitHubTracker {
    fn list_open(&self) -> Result<Vec<TrackerItem>, PortError> {
        self.list("open")
    }

    fn list_all(&self) -> Result<Vec<TrackerItem>, PortError> {
        self.list("all")
    }

    fn get(&self, id: &TrackerId) -> Result<Option<TrackerItem>, PortError> {
        let url = format!("{}/issues/{}", self.repo_url, id);
        let issue = http::found(retry::call(&self.retry, "get issue", || {
            let response = self
                .request("GET", &url)
                .call()
                .map_err(|err| http::port_error("get issue", &id.0, err))?;
            http::read_json::<IssueWire>("get issue", response)
        }))?;
        Ok(issue.map(IssueWire::into_item))
    }

    fn create(&self, item: &NewTrackerItem) -> Result<TrackerItem, PortError> {
        let url = format!("{}/issues", self.repo_url);
        let payload = CreateBody {
            title: &item.title,
            body: &item.body,
            labels: &item.labels,
        };
        let response = self
            .request("POST", &url)
            .send_json(&payload)
            .map_err(|err| http::port_error("create issue", "", err))?;
        if response.status() != 201 {
            return Err(PortError::Status {
                operation: "create issue".to_string(),
                status: response.status(),
            });
        }
        let created: IssueWire = http::read_json("create issue", response)?;
        Ok(created.into_item())
    }

    fn update(&self, id: &TrackerId, update: &TrackerUpdate) -> Result<(), PortError> {
        if update.is_empty() {
            return Ok(());
        }
        let url = format!("{}/issues/{}", self.repo_url, id);
        let payload = PatchBody::from(update);
        retry::call(&self.retry, "update issue", || {
            self.request("PATCH", &url)
                .send_json(&payload)
                .map_err(|err| http::port_error("update issue", &id.0, err))?;
            Ok(())
        })
    }
}
