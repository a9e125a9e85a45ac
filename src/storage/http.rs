//! [`StorageAgent`] backed by a storage-agent HTTP gateway.
//!
//! The gateway fronts the decentralized storage agent and exposes:
//!
//! | Method | Path | Body / Reply |
//! |--------|------|--------------|
//! | `POST` | `/namespaces/{ns}` | |
//! | `POST` | `/files` | `{namespace, content}` → `{fileId, contentIpfsHash}` |
//! | `GET` | `/files/{id}` | → `{content?, contentIpfsHash}`, 404 if absent |
//! | `PUT` | `/files/{id}` | `{namespace, content}` → `{fileId, contentIpfsHash}` |
//! | `DELETE` | `/files/{id}` | → `{fileId, hash}`, 404 if absent |
//!
//! When the gateway returns only a content hash, the content is fetched
//! from `{ipfs_gateway}/ipfs/{hash}` (https unless the gateway names a
//! scheme), with `PINATA_JWT` as the bearer token when set.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{DeletedFile, FileContent, StorageAgent, StoredFile};
use crate::config::StorageConfig;
use crate::models::FileId;

pub struct HttpAgent {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    ipfs_gateway: Option<String>,
    ipfs_token: Option<String>,
    namespace: RwLock<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedReply {
    file_id: FileId,
    content_ipfs_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileReply {
    #[serde(default)]
    content: Option<String>,
    content_ipfs_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletedReply {
    file_id: FileId,
    #[serde(default)]
    hash: String,
}

impl HttpAgent {
    pub fn new(
        config: &StorageConfig,
        token: Option<String>,
        ipfs_token: Option<String>,
    ) -> Result<Self> {
        let base_url = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("storage.url required for http storage agent"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            ipfs_gateway: config.ipfs_gateway.clone(),
            ipfs_token,
            namespace: RwLock::new(config.namespace.clone()),
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn namespace(&self) -> String {
        self.namespace.read().await.clone()
    }

    async fn fetch_ipfs(&self, hash: &str) -> Result<String> {
        let gateway = self
            .ipfs_gateway
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("storage.ipfs_gateway required to resolve {}", hash))?;

        let mut request = self.client.get(ipfs_url(gateway, hash));
        if let Some(token) = &self.ipfs_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("IPFS gateway request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("IPFS gateway error {}: {}", status, body);
        }
        Ok(response.text().await?)
    }
}

/// Gateway URL for a content hash; accepts bare CIDs and `ipfs://` URIs.
/// A gateway given without a scheme is reached over https.
pub fn ipfs_url(gateway: &str, hash: &str) -> String {
    let gateway = gateway.trim_end_matches('/');
    let hash = hash.trim_start_matches("ipfs://");
    if gateway.starts_with("https://") || gateway.starts_with("http://") {
        format!("{}/ipfs/{}", gateway, hash)
    } else {
        format!("https://{}/ipfs/{}", gateway, hash)
    }
}

async fn error_for(response: reqwest::Response, action: &str) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    anyhow::anyhow!("Storage agent {} failed {}: {}", action, status, body)
}

#[async_trait]
impl StorageAgent for HttpAgent {
    fn name(&self) -> &str {
        "http"
    }

    async fn setup(&self, namespace: &str) -> Result<()> {
        let response = self
            .authorized(
                self.client
                    .post(format!("{}/namespaces/{}", self.base_url, namespace)),
            )
            .send()
            .await
            .context("storage agent unreachable")?;

        if !response.status().is_success() {
            return Err(error_for(response, "setup").await);
        }

        *self.namespace.write().await = namespace.to_string();
        Ok(())
    }

    async fn create(&self, content: &str) -> Result<StoredFile> {
        let body = serde_json::json!({
            "namespace": self.namespace().await,
            "content": content,
        });

        let response = self
            .authorized(self.client.post(format!("{}/files", self.base_url)))
            .json(&body)
            .send()
            .await
            .context("storage agent unreachable")?;

        if !response.status().is_success() {
            return Err(error_for(response, "create").await);
        }

        let reply: CreatedReply = response
            .json()
            .await
            .context("Invalid storage agent reply to create")?;
        Ok(StoredFile {
            file_id: reply.file_id,
            content_hash: reply.content_ipfs_hash,
        })
    }

    async fn get_file(&self, file_id: FileId) -> Result<Option<FileContent>> {
        let namespace = self.namespace().await;
        let response = self
            .authorized(
                self.client
                    .get(format!("{}/files/{}", self.base_url, file_id))
                    .query(&[("namespace", namespace.as_str())]),
            )
            .send()
            .await
            .context("storage agent unreachable")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_for(response, "get").await);
        }

        let reply: FileReply = response
            .json()
            .await
            .context("Invalid storage agent reply to get")?;

        let content = match reply.content.filter(|c| !c.is_empty()) {
            Some(content) => content,
            None => self.fetch_ipfs(&reply.content_ipfs_hash).await?,
        };

        Ok(Some(FileContent {
            content,
            content_hash: reply.content_ipfs_hash,
        }))
    }

    async fn update(&self, file_id: FileId, content: &str) -> Result<StoredFile> {
        let body = serde_json::json!({
            "namespace": self.namespace().await,
            "content": content,
        });

        let response = self
            .authorized(
                self.client
                    .put(format!("{}/files/{}", self.base_url, file_id)),
            )
            .json(&body)
            .send()
            .await
            .context("storage agent unreachable")?;

        if !response.status().is_success() {
            return Err(error_for(response, "update").await);
        }

        let reply: CreatedReply = response
            .json()
            .await
            .context("Invalid storage agent reply to update")?;
        Ok(StoredFile {
            file_id: reply.file_id,
            content_hash: reply.content_ipfs_hash,
        })
    }

    async fn delete(&self, file_id: FileId) -> Result<Option<DeletedFile>> {
        let namespace = self.namespace().await;
        let response = self
            .authorized(
                self.client
                    .delete(format!("{}/files/{}", self.base_url, file_id))
                    .query(&[("namespace", namespace.as_str())]),
            )
            .send()
            .await
            .context("storage agent unreachable")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_for(response, "delete").await);
        }

        let reply: DeletedReply = response
            .json()
            .await
            .context("Invalid storage agent reply to delete")?;
        Ok(Some(DeletedFile {
            file_id: reply.file_id,
            hash: reply.hash,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::HeaderMap;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};

    const GUIDE_CID: &str = "bafkreiguide";
    const IPFS_JWT: &str = "jwt-secret";

    /// Serve `router` on an ephemeral local port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// A gateway holding file 7 as hash-only, file 9 as broken, and
    /// nothing else. It also serves the IPFS side under `/ipfs/{cid}`.
    fn fake_gateway() -> Router {
        async fn get_file(Path(id): Path<u64>) -> Response {
            match id {
                7 => Json(serde_json::json!({ "contentIpfsHash": format!("ipfs://{}", GUIDE_CID) }))
                    .into_response(),
                9 => (StatusCode::INTERNAL_SERVER_ERROR, "agent crashed").into_response(),
                _ => StatusCode::NOT_FOUND.into_response(),
            }
        }

        async fn delete_file(Path(id): Path<u64>) -> Response {
            match id {
                7 => Json(serde_json::json!({ "fileId": 7, "hash": GUIDE_CID })).into_response(),
                _ => StatusCode::NOT_FOUND.into_response(),
            }
        }

        async fn create_file(Json(body): Json<serde_json::Value>) -> Response {
            if body["namespace"] != "audio-guides" {
                return StatusCode::BAD_REQUEST.into_response();
            }
            Json(serde_json::json!({ "fileId": "12", "contentIpfsHash": "bafkreinew" }))
                .into_response()
        }

        async fn ipfs(Path(cid): Path<String>, headers: HeaderMap) -> Response {
            let bearer = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if bearer != Some(format!("Bearer {}", IPFS_JWT)) {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            if cid != GUIDE_CID {
                return StatusCode::NOT_FOUND.into_response();
            }
            "# Old Town\nStart at the fountain.".into_response()
        }

        Router::new()
            .route("/files", post(create_file))
            .route("/files/{id}", get(get_file).delete(delete_file))
            .route("/ipfs/{cid}", get(ipfs))
    }

    async fn agent(ipfs_token: Option<&str>) -> HttpAgent {
        let base = serve(fake_gateway()).await;
        let config = StorageConfig {
            provider: "http".to_string(),
            url: Some(base.clone()),
            ipfs_gateway: Some(base),
            timeout_secs: 5,
            ..StorageConfig::default()
        };
        HttpAgent::new(&config, Some("agent-token".to_string()), ipfs_token.map(str::to_string))
            .unwrap()
    }

    #[test]
    fn test_ipfs_url_strips_prefix_and_keeps_scheme() {
        assert_eq!(
            ipfs_url("example.mypinata.cloud", "ipfs://bafkreiabc"),
            "https://example.mypinata.cloud/ipfs/bafkreiabc"
        );
        assert_eq!(
            ipfs_url("https://gw.example/", "bafkreiabc"),
            "https://gw.example/ipfs/bafkreiabc"
        );
        assert_eq!(
            ipfs_url("http://127.0.0.1:8080", "ipfs://bafkreiabc"),
            "http://127.0.0.1:8080/ipfs/bafkreiabc"
        );
    }

    #[tokio::test]
    async fn test_get_missing_file_is_none() {
        let agent = agent(Some(IPFS_JWT)).await;
        assert!(agent.get_file(FileId(404)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_server_error_is_err() {
        let agent = agent(Some(IPFS_JWT)).await;
        let err = agent.get_file(FileId(9)).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_none() {
        let agent = agent(Some(IPFS_JWT)).await;
        assert!(agent.delete(FileId(404)).await.unwrap().is_none());

        let deleted = agent.delete(FileId(7)).await.unwrap().unwrap();
        assert_eq!(deleted.file_id, FileId(7));
        assert_eq!(deleted.hash, GUIDE_CID);
    }

    #[tokio::test]
    async fn test_hash_only_reply_fetched_from_ipfs() {
        let agent = agent(Some(IPFS_JWT)).await;
        let file = agent.get_file(FileId(7)).await.unwrap().unwrap();
        assert_eq!(file.content, "# Old Town\nStart at the fountain.");
        assert_eq!(file.content_hash, format!("ipfs://{}", GUIDE_CID));
    }

    #[tokio::test]
    async fn test_ipfs_fetch_without_token_fails() {
        let agent = agent(None).await;
        let err = agent.get_file(FileId(7)).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_create_sends_namespace() {
        let agent = agent(None).await;
        let stored = agent.create("# Tour\nbody").await.unwrap();
        assert_eq!(stored.file_id, FileId(12));
        assert_eq!(stored.content_hash, "bafkreinew");
    }

    #[test]
    fn test_created_reply_accepts_numeric_and_string_ids() {
        let a: CreatedReply =
            serde_json::from_str(r#"{"fileId": 11, "contentIpfsHash": "ipfs://x"}"#).unwrap();
        let b: CreatedReply =
            serde_json::from_str(r#"{"fileId": "11", "contentIpfsHash": "ipfs://x"}"#).unwrap();
        assert_eq!(a.file_id, b.file_id);
    }

    #[test]
    fn test_file_reply_content_optional() {
        let reply: FileReply = serde_json::from_str(r#"{"contentIpfsHash": "bafy"}"#).unwrap();
        assert!(reply.content.is_none());
    }

    #[test]
    fn test_requires_url() {
        let config = StorageConfig {
            provider: "http".to_string(),
            ..StorageConfig::default()
        };
        assert!(HttpAgent::new(&config, None, None).is_err());
    }
}
