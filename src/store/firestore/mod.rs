//! Firestore REST v1 backend

mod auth;
mod value;

pub use auth::ServiceAccount;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use self::auth::TokenSource;
use self::value::Fields;
use super::{DocumentStore, DocumentStream, WriteMode};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::Record;

/// Document store backed by Cloud Firestore
pub struct FirestoreStore {
    http: reqwest::Client,
    base_url: String,
    /// `projects/{project}/databases/{database}/documents`
    documents_root: String,
    page_size: u32,
    tokens: TokenSource,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default)]
    fields: Fields,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct CommitRequest {
    writes: Vec<Write>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Write {
    #[serde(skip_serializing_if = "Option::is_none")]
    update: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delete: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    update_mask: Option<DocumentMask>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentMask {
    field_paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    #[serde(default)]
    message: String,
}

enum Cursor {
    First,
    Next(String),
    Done,
}

impl FirestoreStore {
    /// Build a client from configuration.
    ///
    /// Service account credentials are required unless an emulator host is
    /// configured.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("bookshelf/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(config, http)
    }

    /// Build a client that sends requests through `http`
    pub fn with_client(config: &Config, http: reqwest::Client) -> Result<Self> {
        let fs = &config.firestore;

        let tokens = match (&fs.credentials, &fs.emulator_host) {
            (_, Some(host)) => {
                tracing::info!("Using Firestore emulator at {}", host);
                TokenSource::Emulator
            }
            (Some(credentials), None) => {
                let account = ServiceAccount::from_json(credentials)?;
                tracing::info!("Authenticating to Firestore as {}", account.client_email);
                TokenSource::service_account(account, http.clone())
            }
            (None, None) => {
                return Err(Error::Config(format!(
                    "{} is not set and no emulator host is configured",
                    crate::config::CREDENTIALS_VAR
                )))
            }
        };

        Ok(Self {
            http,
            base_url: config.firestore_base_url(),
            documents_root: format!(
                "projects/{}/databases/{}/documents",
                fs.project_id, fs.database
            ),
            page_size: fs.page_size.max(1),
            tokens,
        })
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.documents_root, collection, id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.tokens.bearer().await?;
        Ok(request.bearer_auth(token))
    }

    async fn list_page(&self, collection: &str, page_token: Option<String>) -> Result<ListPage> {
        let mut query = vec![("pageSize", self.page_size.to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let url = self.url(&format!("{}/{}", self.documents_root, collection));
        let request = self.authorized(self.http.get(url).query(&query)).await?;
        let response = check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn commit(&self, write: Write) -> Result<()> {
        let url = self.url(&format!("{}:commit", self.documents_root));
        let body = CommitRequest {
            writes: vec![write],
        };
        let request = self.authorized(self.http.post(url).json(&body)).await?;
        check(request.send().await?).await?;
        Ok(())
    }
}

/// Turn a non-success response into a store error
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<GoogleError>(&body)
        .map(|e| e.error.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or(body);

    Err(Error::Store(format!("Firestore returned {}: {}", status, message)))
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    fn list<'a>(&'a self, collection: &'a str) -> DocumentStream<'a> {
        stream::unfold(Cursor::First, move |cursor| async move {
            let page_token = match cursor {
                Cursor::First => None,
                Cursor::Next(token) => Some(token),
                Cursor::Done => return None,
            };

            match self.list_page(collection, page_token).await {
                Ok(page) => {
                    let next = match page.next_page_token {
                        Some(token) if !token.is_empty() => Cursor::Next(token),
                        _ => Cursor::Done,
                    };
                    let docs: Vec<Result<Record>> = page
                        .documents
                        .into_iter()
                        .map(|doc| value::decode_fields(doc.fields))
                        .collect();
                    Some((stream::iter(docs), next))
                }
                Err(e) => Some((stream::iter(vec![Err(e)]), Cursor::Done)),
            }
        })
        .flatten()
        .boxed()
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Record> {
        let name = self.document_name(collection, id);
        let request = self.authorized(self.http.get(self.url(&name))).await?;
        let response = request.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::DocumentNotFound(format!("{}/{}", collection, id)));
        }

        let doc: Document = check(response).await?.json().await?;
        value::decode_fields(doc.fields)
    }

    async fn set(&self, collection: &str, id: &str, record: Record, mode: WriteMode) -> Result<()> {
        let update_mask = match mode {
            WriteMode::Overwrite => None,
            WriteMode::Merge => Some(DocumentMask {
                field_paths: value::merge_field_paths(&record),
            }),
        };

        let write = Write {
            update: Some(Document {
                name: self.document_name(collection, id),
                fields: value::encode_fields(&record),
            }),
            delete: None,
            update_mask,
        };

        self.commit(write).await?;
        tracing::debug!("Wrote {}/{} ({:?})", collection, id, mode);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let write = Write {
            update: None,
            delete: Some(self.document_name(collection, id)),
            update_mask: None,
        };
        self.commit(write).await
    }
}
