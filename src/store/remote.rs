use super::{Patchable, Record, StorageError};
use crate::model::{CourseBlock, NewCourseBlock};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Header carrying the shared secret on every gateway call.
pub const SECRET_HEADER: &str = "x-api-secret";

/// Body of a successful `POST`.
#[derive(Serialize, Deserialize, Debug)]
pub struct Created<R> {
    pub success: bool,
    pub id: JsonValue,
    pub record: R,
}

/// Body of a successful `PATCH`.
#[derive(Serialize, Deserialize, Debug)]
pub struct Updated<R> {
    pub success: bool,
    pub record: R,
}

/// Body of a successful `DELETE`.
#[derive(Serialize, Deserialize, Debug)]
pub struct Deleted {
    pub success: bool,
}

/// Body of every failed gateway call.
#[derive(Serialize, Deserialize, Debug)]
pub struct Failure {
    pub success: bool,
    pub error: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplaceBlocksQuery {
    course_id: i64,
}

/// Client for the remote store gateway. Holds no cache: every fetch is a round trip.
#[derive(Clone)]
pub struct RemoteStore {
    client: Client,
    base_url: Url,
    secret: String,
}

impl RemoteStore {
    pub fn new(
        base_url: Url,
        secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::unavailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            secret: secret.into(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                StorageError::unavailable(format!(
                    "Remote store URL {} cannot be a base",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StorageError> {
        let response = request.header(SECRET_HEADER, &self.secret).send().await?;
        decode(response).await
    }

    pub async fn fetch<R: Record>(&self, filter: &R::Filter) -> Result<Vec<R>, StorageError> {
        let url = self.endpoint(&[R::COLLECTION.path()])?;
        self.send(self.client.get(url).query(filter)).await
    }

    pub async fn create<R: Record>(&self, new: &R::New) -> Result<R, StorageError> {
        let url = self.endpoint(&[R::COLLECTION.path()])?;
        let created: Created<R> = self.send(self.client.post(url).json(new)).await?;
        debug!("Remote store created {} record {}", R::COLLECTION, created.id);
        Ok(created.record)
    }

    pub async fn update<R: Patchable>(
        &self,
        id: &R::Id,
        patch: &R::Patch,
    ) -> Result<R, StorageError> {
        let id = id.to_string();
        let url = self.endpoint(&[R::COLLECTION.path(), &id])?;
        let updated: Updated<R> = self.send(self.client.patch(url).json(patch)).await?;
        Ok(updated.record)
    }

    pub async fn delete<R: Record>(&self, id: &R::Id) -> Result<(), StorageError> {
        let id = id.to_string();
        let url = self.endpoint(&[R::COLLECTION.path(), &id])?;
        let _: Deleted = self.send(self.client.delete(url)).await?;
        Ok(())
    }

    pub async fn replace_blocks(
        &self,
        course_id: i64,
        blocks: &[NewCourseBlock],
    ) -> Result<Vec<CourseBlock>, StorageError> {
        let url = self.endpoint(&[CourseBlock::COLLECTION.path()])?;
        let request = self
            .client
            .put(url)
            .query(&ReplaceBlocksQuery { course_id })
            .json(blocks);
        self.send(request).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let message = match response.json::<Failure>().await {
        Ok(failure) => failure.error,
        Err(_) => status.to_string(),
    };
    warn!("Remote store responded with {}: {}", status, message);
    Err(status_error(status, message))
}

fn status_error(status: StatusCode, message: String) -> StorageError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StorageError::unavailable(format!("Remote store rejected credentials: {}", message))
        }
        StatusCode::NOT_FOUND => StorageError::not_found(message),
        s if s.is_client_error() => StorageError::conflict(message),
        s if s.is_server_error() => StorageError::unavailable(message),
        _ => StorageError::unknown(message),
    }
}
