use super::retry::{server_wait, Backoff, Failure, RetryPolicy};
use super::{PageRequest, RecordStore, StoreError};
use crate::config::StoreOptions;
use crate::model::{FieldSchema, Record, RecordTypeInfo, SiteInfo};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::{Duration, SystemTime};

const JSON_API: &str = "application/vnd.api+json";
const API_VERSION: &str = "3";

/// HTTP client for a JSON:API content management endpoint.
#[derive(Debug, Clone)]
pub struct CmaClient {
    http: Client,
    base_url: String,
    api_token: String,
    environment: Option<String>,
    policy: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct Document<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct Resource {
    id: String,
    #[serde(default)]
    attributes: Map<String, Value>,
    #[serde(default)]
    relationships: Map<String, Value>,
}

impl Resource {
    fn relationship_id(&self, name: &str) -> Option<String> {
        self.relationships
            .get(name)?
            .get("data")?
            .get("id")?
            .as_str()
            .map(str::to_string)
    }

    fn string_attribute(&self, name: &str) -> String {
        self.attributes
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

impl CmaClient {
    pub fn new(options: &StoreOptions) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|err| StoreError::Network(err.to_string()))?;

        let policy = RetryPolicy {
            max_retries: options.max_retries,
            ..RetryPolicy::default()
        };

        Ok(Self {
            http,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            api_token: options.api_token.trim().to_string(),
            environment: options
                .environment
                .as_deref()
                .map(str::trim)
                .filter(|env| !env.is_empty())
                .map(str::to_string),
            policy,
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, StoreError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;

        loop {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&self.api_token)
                .header(ACCEPT, JSON_API)
                .header("X-Api-Version", API_VERSION);
            if let Some(environment) = &self.environment {
                request = request.header("X-Environment", environment);
            }
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.header(CONTENT_TYPE, JSON_API).body(body.to_string());
            }

            let delay = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<Value>()
                            .await
                            .map_err(|err| StoreError::Decode(err.to_string()));
                    }

                    let wait = server_wait(response.headers(), SystemTime::now());
                    let text = response.text().await.unwrap_or_default();
                    let failure = Failure::Status {
                        status,
                        server_wait: wait,
                    };
                    match self.policy.decide(failure, attempt) {
                        Backoff::GiveUp => {
                            return Err(StoreError::Http {
                                status: status.as_u16(),
                                message: error_message(status, &text),
                            })
                        }
                        Backoff::Wait { delay, .. } => {
                            warn!(
                                "{method} {path} answered {status}, retrying in {delay:?} (attempt {})",
                                attempt + 1
                            );
                            delay
                        }
                    }
                }
                Err(err) => match self.policy.decide(Failure::Transport, attempt) {
                    Backoff::GiveUp => return Err(StoreError::Network(err.to_string())),
                    Backoff::Wait { delay, .. } => {
                        warn!(
                            "{method} {path} failed ({err}), retrying in {delay:?} (attempt {})",
                            attempt + 1
                        );
                        delay
                    }
                },
            };

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn get_document<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, StoreError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let value = self.request(Method::GET, path, query, None).await?;
        let document: Document<T> =
            serde_json::from_value(value).map_err(|err| StoreError::Decode(err.to_string()))?;
        Ok(document.data)
    }

    async fn list_items(&self, query: Vec<(&str, String)>) -> Result<Vec<Record>, StoreError> {
        let resources: Vec<Resource> = self.get_document("/items", &query).await?;
        debug!("listed {} items with {:?}", resources.len(), query);
        resources.into_iter().map(record_from_resource).collect()
    }
}

fn page_query(page: PageRequest) -> [(&'static str, String); 2] {
    [
        ("page[offset]", page.offset.to_string()),
        ("page[limit]", page.limit.to_string()),
    ]
}

fn record_from_resource(resource: Resource) -> Result<Record, StoreError> {
    let record_type_id = resource.relationship_id("item_type").ok_or_else(|| {
        StoreError::Decode(format!("item {} has no item_type relationship", resource.id))
    })?;
    Ok(Record {
        id: resource.id,
        record_type_id,
        fields: resource.attributes,
    })
}

/// Builds a readable message from a JSON:API error body.
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let errors = parsed
        .as_ref()
        .and_then(|value| value.get("data"))
        .and_then(Value::as_array);

    if let Some(errors) = errors {
        let described: Vec<String> = errors
            .iter()
            .filter_map(|error| error.get("attributes"))
            .map(|attributes| {
                let code = attributes
                    .get("code")
                    .and_then(Value::as_str)
                    .unwrap_or("UNKNOWN");
                match attributes.get("details") {
                    Some(details) if !details.is_null() => format!("{code} {details}"),
                    _ => code.to_string(),
                }
            })
            .collect();
        if !described.is_empty() {
            return described.join("; ");
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl RecordStore for CmaClient {
    async fn fetch_site(&self) -> Result<SiteInfo, StoreError> {
        let site: Resource = self.get_document("/site", &[]).await?;
        let locales = site
            .attributes
            .get("locales")
            .and_then(Value::as_array)
            .map(|locales| {
                locales
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(SiteInfo { locales })
    }

    async fn list_record_types(&self) -> Result<Vec<RecordTypeInfo>, StoreError> {
        let resources: Vec<Resource> = self.get_document("/item-types", &[]).await?;
        Ok(resources
            .into_iter()
            .map(|resource| {
                let singleton = resource
                    .attributes
                    .get("singleton")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                RecordTypeInfo {
                    name: resource.string_attribute("name"),
                    api_key: resource.string_attribute("api_key"),
                    title_field_id: resource.relationship_id("title_field"),
                    singleton_item_id: if singleton {
                        resource.relationship_id("singleton_item")
                    } else {
                        None
                    },
                    id: resource.id,
                }
            })
            .collect())
    }

    async fn list_fields(&self, record_type_id: &str) -> Result<Vec<FieldSchema>, StoreError> {
        let path = format!("/item-types/{record_type_id}/fields");
        let resources: Vec<Resource> = self.get_document(&path, &[]).await?;
        Ok(resources
            .into_iter()
            .map(|resource| FieldSchema {
                api_key: resource.string_attribute("api_key"),
                localized: resource
                    .attributes
                    .get("localized")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                id: resource.id,
            })
            .collect())
    }

    async fn list_records(
        &self,
        record_type_id: &str,
        page: PageRequest,
    ) -> Result<Vec<Record>, StoreError> {
        let mut query = vec![("filter[type]", record_type_id.to_string())];
        query.extend(page_query(page));
        self.list_items(query).await
    }

    async fn search_records(
        &self,
        record_type_id: &str,
        search: &str,
        page: PageRequest,
    ) -> Result<Vec<Record>, StoreError> {
        let mut query = vec![
            ("filter[type]", record_type_id.to_string()),
            ("filter[query]", search.to_string()),
        ];
        query.extend(page_query(page));
        self.list_items(query).await
    }

    async fn get_record(&self, record_id: &str) -> Result<Record, StoreError> {
        let resource: Resource = self
            .get_document(&format!("/items/{record_id}"), &[])
            .await?;
        record_from_resource(resource)
    }

    async fn update_record(
        &self,
        record_id: &str,
        patch: Map<String, Value>,
    ) -> Result<Record, StoreError> {
        let body = json!({
            "data": {
                "type": "item",
                "id": record_id,
                "attributes": patch,
            }
        });
        let value = self
            .request(Method::PUT, &format!("/items/{record_id}"), &[], Some(&body))
            .await?;
        let document: Document<Resource> =
            serde_json::from_value(value).map_err(|err| StoreError::Decode(err.to_string()))?;
        record_from_resource(document.data)
    }
}
