//! Task board adapter for Microsoft Planner via Graph v1.0.
//!
//! A Planner task is split over two resources: the task itself (title,
//! percentComplete) and `/details` (description). Each has its own ETag and
//! every PATCH must send the current one in `If-Match`.

use serde::{Deserialize, Serialize};

use tandem_core::{BoardConfig, BoardId, BoardItem, ConcurrencyToken, RetryPolicy};
use tandem_sync::{BoardPort, CoreUpdate, PortError};

use crate::auth::TokenProvider;
use crate::http;
use crate::retry;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskWire {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    percent_complete: u8,
    #[serde(rename = "@odata.etag")]
    etag: String,
}

#[derive(Debug, Deserialize)]
struct TaskPage {
    value: Vec<TaskWire>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailsWire {
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "@odata.etag")]
    etag: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewTask<'a> {
    plan_id: &'a str,
    bucket_id: &'a str,
    title: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CorePatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    percent_complete: Option<u8>,
}

#[derive(Debug, Serialize)]
struct DetailsPatch<'a> {
    description: &'a str,
}

fn board_item(task: TaskWire, description: Option<String>) -> BoardItem {
    BoardItem {
        id: BoardId::from(task.id),
        title: task.title,
        description,
        completion: task.percent_complete.min(100),
        token: ConcurrencyToken::from(task.etag),
    }
}

/// Pair each listed task with its details.
///
/// A task whose details cannot be read is logged and left out of the
/// listing. An authentication failure ends the listing, since every later
/// fetch would fail the same way.
fn attach_details(
    tasks: Vec<TaskWire>,
    mut fetch: impl FnMut(&str) -> Result<DetailsWire, PortError>,
) -> Result<Vec<BoardItem>, PortError> {
    let mut items = Vec::with_capacity(tasks.len());
    for task in tasks {
        match fetch(&task.id) {
            Ok(details) => items.push(board_item(task, details.description)),
            Err(err @ PortError::Auth { .. }) => return Err(err),
            Err(err) => tracing::warn!(task = %task.id, "board task left out of listing: {err}"),
        }
    }
    Ok(items)
}

/// Board port backed by one Planner bucket.
pub struct PlannerBoard<P> {
    agent: ureq::Agent,
    api_base: String,
    plan_id: String,
    bucket_id: String,
    tokens: P,
    retry: RetryPolicy,
}

impl<P: TokenProvider> PlannerBoard<P> {
    pub fn new(config: &BoardConfig, agent: ureq::Agent, tokens: P, retry: RetryPolicy) -> Self {
        Self {
            agent,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            plan_id: config.plan_id.clone(),
            bucket_id: config.bucket_id.clone(),
            tokens,
            retry,
        }
    }

    fn task_url(&self, id: &str) -> String {
        format!("{}/planner/tasks/{}", self.api_base, id)
    }

    fn request(&self, method: &str, url: &str) -> Result<ureq::Request, PortError> {
        let bearer = self.tokens.bearer()?;
        Ok(self
            .agent
            .request(method, url)
            .set("Authorization", &format!("Bearer {bearer}")))
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        id: &str,
        url: &str,
    ) -> Result<T, PortError> {
        retry::call(&self.retry, operation, || {
            let response = self
                .request("GET", url)?
                .call()
                .map_err(|err| http::port_error(operation, id, err))?;
            http::read_json(operation, response)
        })
    }

    fn fetch_task(&self, id: &str) -> Result<TaskWire, PortError> {
        self.get_json("get task", id, &self.task_url(id))
    }

    fn fetch_details(&self, id: &str) -> Result<DetailsWire, PortError> {
        self.get_json("get task details", id, &format!("{}/details", self.task_url(id)))
    }

    fn with_details(&self, task: TaskWire) -> Result<BoardItem, PortError> {
        let details = self.fetch_details(&task.id)?;
        Ok(board_item(task, details.description))
    }

    fn patch(
        &self,
        operation: &str,
        id: &BoardId,
        url: &str,
        token: &ConcurrencyToken,
        payload: &impl Serialize,
    ) -> Result<(), PortError> {
        retry::call(&self.retry, operation, || {
            self.request("PATCH", url)?
                .set("If-Match", &token.0)
                .send_json(payload)
                .map_err(|err| http::port_error(operation, &id.0, err))?;
            Ok(())
        })
    }
}

impl<P: TokenProvider> BoardPort for PlannerBoard<P> {
    fn list_tasks(&self) -> Result<Vec<BoardItem>, PortError> {
        let mut url = Some(format!(
            "{}/planner/buckets/{}/tasks",
            self.api_base, self.bucket_id
        ));
        let mut tasks = Vec::new();
        while let Some(next) = url.take() {
            let page: TaskPage = self.get_json("list tasks", &self.bucket_id, &next)?;
            tasks.extend(page.value);
            url = page.next_link;
        }
        tracing::debug!(count = tasks.len(), bucket = %self.bucket_id, "listed board tasks");
        attach_details(tasks, |id| self.fetch_details(id))
    }

    fn get(&self, id: &BoardId) -> Result<Option<BoardItem>, PortError> {
        match http::found(self.fetch_task(&id.0))? {
            Some(task) => self.with_details(task).map(Some),
            None => Ok(None),
        }
    }

    fn create(&self, title: &str) -> Result<BoardItem, PortError> {
        let payload = NewTask {
            plan_id: &self.plan_id,
            bucket_id: &self.bucket_id,
            title,
        };
        let url = format!("{}/planner/tasks", self.api_base);
        let response = self
            .request("POST", &url)?
            .send_json(&payload)
            .map_err(|err| http::port_error("create task", "", err))?;
        if response.status() != 201 {
            return Err(PortError::Status {
                operation: "create task".to_string(),
                status: response.status(),
            });
        }
        let task: TaskWire = http::read_json("create task", response)?;
        Ok(board_item(task, None))
    }

    fn core_token(&self, id: &BoardId) -> Result<ConcurrencyToken, PortError> {
        Ok(ConcurrencyToken::from(self.fetch_task(&id.0)?.etag))
    }

    fn details_token(&self, id: &BoardId) -> Result<ConcurrencyToken, PortError> {
        Ok(ConcurrencyToken::from(self.fetch_details(&id.0)?.etag))
    }

    fn update_core(
        &self,
        id: &BoardId,
        update: &CoreUpdate,
        token: &ConcurrencyToken,
    ) -> Result<(), PortError> {
        if update.is_empty() {
            return Ok(());
        }
        let payload = CorePatch {
            title: update.title.as_deref(),
            percent_complete: update.completion,
        };
        self.patch("update task", id, &self.task_url(&id.0), token, &payload)
    }

    fn update_details(
        &self,
        id: &BoardId,
        description: &str,
        token: &ConcurrencyToken,
    ) -> Result<(), PortError> {
        let url = format!("{}/details", self.task_url(&id.0));
        self.patch(
            "update task details",
            id,
            &url,
            token,
            &DetailsPatch { description },
        )
    }
}
