//! Upload of local files to Azure Blob Storage with a shared access signature.
//!
//! Small files are sent with a single `Put Blob`. Files larger than the configured block size
//! are sent as `Put Block` requests followed by a `Put Block List` committing them in order.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use log::{debug, info};
use reqwest::{Client, Response, Url};

use crate::{config::StorageConfig, error::PlacematchError};

const API_VERSION: &str = "2021-08-06";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSummary {
    pub key: String,
    pub bytes: usize,
    /// Number of blocks, 0 for a single request upload.
    pub blocks: usize,
}

pub struct BlobUploader {
    config: StorageConfig,
    client: Client,
}

/// Block ids must all have the same length before encoding.
fn block_id(idx: usize) -> String {
    STANDARD.encode(format!("block-{idx:06}"))
}

fn block_list_body(ids: &[String]) -> String {
    let latest: String = ids
        .iter()
        .map(|id| format!("<Latest>{id}</Latest>"))
        .collect();
    format!("<?xml version=\"1.0\" encoding=\"utf-8\"?><BlockList>{latest}</BlockList>")
}

async fn check(response: Response, key: &str) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(PlacematchError::UploadFailed {
        key: key.to_string(),
        status: status.as_u16(),
        body,
    }
    .into())
}

impl BlobUploader {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Blob address with each `/`-separated part of `key` percent-encoded as a path segment.
    fn blob_url(&self, key: &str) -> Result<Url> {
        let account_url = &self.config.account_url;
        let mut url = Url::parse(account_url)
            .with_context(|| format!("Invalid storage account URL '{account_url}'"))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Storage account URL '{account_url}' cannot hold a path"))?
            .pop_if_empty()
            .push(&self.config.container)
            .extend(key.split('/'));
        if let Some(sas) = self.config.sas_token.as_deref().filter(|sas| !sas.is_empty()) {
            url.set_query(Some(sas.trim_start_matches('?')));
        }
        Ok(url)
    }

    /// Upload the file at `path` under `key`.
    pub async fn upload(&self, path: &Path, key: &str) -> Result<UploadSummary> {
        if self.config.block_size == 0 {
            bail!("Storage block size must be greater than zero");
        }
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        let bytes = data.len();
        info!(
            "Uploading '{}' ({bytes} bytes) to '{}/{key}'",
            path.display(),
            self.config.container
        );
        let blocks = if bytes <= self.config.block_size {
            self.put_blob(key, data).await?;
            0
        } else {
            self.put_blocks(key, &data).await?
        };
        Ok(UploadSummary {
            key: key.to_string(),
            bytes,
            blocks,
        })
    }

    async fn put_blob(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let response = self
            .client
            .put(self.blob_url(key)?)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-version", API_VERSION)
            .body(data)
            .send()
            .await?;
        check(response, key).await
    }

    async fn put_blocks(&self, key: &str, data: &[u8]) -> Result<usize> {
        let mut ids = vec![];
        for (idx, chunk) in data.chunks(self.config.block_size).enumerate() {
            let id = block_id(idx);
            debug!("Uploading block {idx} of '{key}' ({} bytes)", chunk.len());
            let response = self
                .client
                .put(self.blob_url(key)?)
                .query(&[("comp", "block"), ("blockid", id.as_str())])
                .header("x-ms-version", API_VERSION)
                .body(chunk.to_vec())
                .send()
                .await?;
            check(response, key).await?;
            ids.push(id);
        }
        let response = self
            .client
            .put(self.blob_url(key)?)
            .query(&[("comp", "blocklist")])
            .header("x-ms-version", API_VERSION)
            .header("content-type", "application/xml")
            .body(block_list_body(&ids))
            .send()
            .await?;
        check(response, key).await?;
        Ok(ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use tempfile::TempDir;

    fn uploader(server: &MockServer, block_size: usize) -> BlobUploader {
        BlobUploader::new(StorageConfig {
            account_url: server.base_url(),
            container: "survey".into(),
            sas_token: Some("sv=2021&sig=abc".into()),
            block_size,
            prefix: None,
        })
    }

    fn write_file(dir: &TempDir, len: usize) -> std::path::PathBuf {
        let path = dir.path().join("res_deb_2000.dta");
        std::fs::write(&path, vec![7u8; len]).unwrap();
        path
    }

    #[test]
    fn block_ids_should_have_equal_length() {
        assert_eq!(block_id(0), STANDARD.encode("block-000000"));
        assert_eq!(block_id(3).len(), block_id(123_456).len());
    }

    #[test]
    fn blob_url_should_encode_key_segments() {
        let uploader = BlobUploader::new(StorageConfig {
            account_url: "https://acct.blob.core.windows.net/".into(),
            container: "survey".into(),
            sas_token: Some("?sv=2021&sig=abc".into()),
            block_size: 16,
            prefix: None,
        });
        let url = uploader.blob_url("raw/notes #2?.csv").unwrap();
        assert_eq!(
            url.as_str(),
            "https://acct.blob.core.windows.net/survey/raw/notes%20%232%3F.csv?sv=2021&sig=abc"
        );
    }

    #[tokio::test]
    async fn small_files_should_use_a_single_put() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/survey/raw/res_deb_2000.dta")
                    .query_param("sig", "abc")
                    .header("x-ms-blob-type", "BlockBlob");
                then.status(201);
            })
            .await;
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, 10);

        let summary = uploader(&server, 16)
            .upload(&path, "raw/res_deb_2000.dta")
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(summary.bytes, 10);
        assert_eq!(summary.blocks, 0);
    }

    #[tokio::test]
    async fn large_files_should_use_a_block_list() {
        let server = MockServer::start_async().await;
        let blocks = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/survey/res_deb_2000.dta")
                    .query_param("comp", "block")
                    .query_param_exists("blockid");
                then.status(201);
            })
            .await;
        let commit = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/survey/res_deb_2000.dta")
                    .query_param("comp", "blocklist")
                    .body_contains(format!("<Latest>{}</Latest>", block_id(2)));
                then.status(201);
            })
            .await;
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, 40);

        let summary = uploader(&server, 16)
            .upload(&path, "res_deb_2000.dta")
            .await
            .unwrap();
        blocks.assert_hits_async(3).await;
        commit.assert_async().await;
        assert_eq!(summary.blocks, 3);
        assert_eq!(summary.bytes, 40);
    }

    #[tokio::test]
    async fn rejected_upload_should_fail() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT);
                then.status(403).body("AuthenticationFailed");
            })
            .await;
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, 4);

        let err = uploader(&server, 16)
            .upload(&path, "res_deb_2000.dta")
            .await
            .unwrap_err();
        match err.downcast_ref::<PlacematchError>() {
            Some(PlacematchError::UploadFailed { status, body, .. }) => {
                assert_eq!(*status, 403);
                assert_eq!(body, "AuthenticationFailed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_block_size_should_fail() {
        let server = MockServer::start_async().await;
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, 4);
        assert!(uploader(&server, 0)
            .upload(&path, "res_deb_2000.dta")
            .await
            .is_err());
    }
}
