//! Milvus v2 REST client.
//!
//! Every call is a `POST` with a JSON body. The server answers HTTP 200 with an
//! envelope `{ "code": 0, "data": ... }`; a non-zero code carries a `message`
//! and is mapped to [`StoreError::Api`].

use async_trait::async_trait;
use reqwest::{Client, Url, header};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::schema::{CollectionSchema, DataType, FieldSchema, IndexRecord, IndexSpec};
use crate::store::VectorStore;

const HAS_PATH: &str = "v2/vectordb/collections/has";
const RELEASE_PATH: &str = "v2/vectordb/collections/release";
const DROP_PATH: &str = "v2/vectordb/collections/drop";
const CREATE_PATH: &str = "v2/vectordb/collections/create";
const FLUSH_PATH: &str = "v2/vectordb/collections/flush";
const INSERT_PATH: &str = "v2/vectordb/entities/insert";
const CREATE_INDEX_PATH: &str = "v2/vectordb/indexes/create";

#[derive(Debug, Clone)]
pub struct MilvusRestStore {
    http: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: JsonValue,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionRequest<'a> {
    collection_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCollectionRequest<'a> {
    collection_name: &'a str,
    description: &'a str,
    schema: WireSchema<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireSchema<'a> {
    auto_id: bool,
    enable_dynamic_field: bool,
    fields: Vec<WireField<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireField<'a> {
    field_name: &'a str,
    data_type: DataType,
    is_primary: bool,
    description: &'a str,
    #[serde(skip_serializing_if = "JsonMap::is_empty")]
    element_type_params: JsonMap<String, JsonValue>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertRequest<'a> {
    collection_name: &'a str,
    data: &'a [IndexRecord],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateIndexRequest<'a> {
    collection_name: &'a str,
    index_params: Vec<WireIndex<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireIndex<'a> {
    field_name: &'a str,
    index_name: String,
    metric_type: &'a str,
    index_type: &'a str,
    params: &'a JsonMap<String, JsonValue>,
}

impl<'a> From<&'a FieldSchema> for WireField<'a> {
    fn from(field: &'a FieldSchema) -> Self {
        let mut element_type_params = JsonMap::new();
        if let Some(dim) = field.dim {
            // Milvus expects the dimension as a string.
            element_type_params.insert("dim".to_string(), JsonValue::from(dim.to_string()));
        }
        if let Some(max_length) = field.max_length {
            element_type_params.insert("max_length".to_string(), JsonValue::from(max_length));
        }
        Self {
            field_name: &field.name,
            data_type: field.data_type,
            is_primary: field.is_primary,
            description: &field.description,
            element_type_params,
        }
    }
}

impl MilvusRestStore {
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let mut base_url = Url::parse(config.url.trim())
            .map_err(|_| StoreError::InvalidUrl(config.url.clone()))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = header::HeaderMap::new();
        if let Some(token) = config.token.as_deref().filter(|t| !t.trim().is_empty()) {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|_| StoreError::message("store token is not a valid header value"))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let http = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .user_agent("shotit-loader/0.1")
            .build()
            .map_err(|err| StoreError::request("build_client", err))?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        stage: &'static str,
        path: &str,
        body: &B,
    ) -> StoreResult<JsonValue> {
        debug_assert!(!path.starts_with('/'));
        let url = self
            .base_url
            .join(path)
            .map_err(|_| StoreError::InvalidUrl(format!("{}{path}", self.base_url)))?;

        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| StoreError::request(stage, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::HttpStatus {
                stage,
                status: status.as_u16(),
            });
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|err| StoreError::decode(stage, err.to_string()))?;
        // Older 2.x gateways report success as 200 inside the envelope.
        if envelope.code != 0 && envelope.code != 200 {
            return Err(StoreError::Api {
                stage,
                code: envelope.code,
                message: envelope.message.unwrap_or_default(),
            });
        }
        debug!(stage, "store call succeeded");
        Ok(envelope.data)
    }
}

#[async_trait]
impl VectorStore for MilvusRestStore {
    async fn has_collection(&self, collection: &str) -> StoreResult<bool> {
        let data = self
            .call(
                "has_collection",
                HAS_PATH,
                &CollectionRequest {
                    collection_name: collection,
                },
            )
            .await?;
        data.get("has")
            .and_then(JsonValue::as_bool)
            .ok_or_else(|| StoreError::decode("has_collection", "missing `has` flag"))
    }

    async fn release_collection(&self, collection: &str) -> StoreResult<()> {
        self.call(
            "release_collection",
            RELEASE_PATH,
            &CollectionRequest {
                collection_name: collection,
            },
        )
        .await
        .map(|_| ())
    }

    async fn drop_collection(&self, collection: &str) -> StoreResult<()> {
        self.call(
            "drop_collection",
            DROP_PATH,
            &CollectionRequest {
                collection_name: collection,
            },
        )
        .await
        .map(|_| ())
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> StoreResult<()> {
        debug_assert!(schema.primary_field().is_some());
        let request = CreateCollectionRequest {
            collection_name: &schema.name,
            description: &schema.description,
            schema: WireSchema {
                auto_id: false,
                enable_dynamic_field: false,
                fields: schema.fields.iter().map(WireField::from).collect(),
            },
        };
        self.call("create_collection", CREATE_PATH, &request)
            .await
            .map(|_| ())
    }

    async fn insert(&self, collection: &str, records: &[IndexRecord]) -> StoreResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let data = self
            .call(
                "insert",
                INSERT_PATH,
                &InsertRequest {
                    collection_name: collection,
                    data: records,
                },
            )
            .await?;
        Ok(data
            .get("insertCount")
            .and_then(JsonValue::as_u64)
            .unwrap_or(records.len() as u64))
    }

    async fn flush(&self, collection: &str) -> StoreResult<()> {
        self.call(
            "flush",
            FLUSH_PATH,
            &CollectionRequest {
                collection_name: collection,
            },
        )
        .await
        .map(|_| ())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()> {
        let request = CreateIndexRequest {
            collection_name: collection,
            index_params: vec![WireIndex {
                field_name: &index.field,
                index_name: index.index_name(),
                metric_type: index.metric.as_ref(),
                index_type: index.index_type.as_ref(),
                params: &index.params,
            }],
        };
        self.call("create_index", CREATE_INDEX_PATH, &request)
            .await
            .map(|_| ())
    }
}
