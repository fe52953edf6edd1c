//! Config server client.
//!
//! Talks to the training-config server:
//! - `GET  /config`   the document as JSON
//! - `POST /config`   `{"config": <document>}`, replaces the stored file
//! - `GET  /download` the stored file as served (YAML)
//!
//! No retries: a failed load or save is reported and the session stays as it was.

use modelcfg_core::ConfigDocument;
use reqwest::blocking::{Client, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{decode_document, snippet, ConfigStore, StoreError};
use crate::settings::ClientSettings;

#[derive(Serialize)]
struct SaveRequest<'a> {
    config: &'a ConfigDocument,
}

pub struct HttpConfigStore {
    client: Client,
    base_url: String,
    snippet_len: usize,
}

impl HttpConfigStore {
    pub fn new(settings: &ClientSettings) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| StoreError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            snippet_len: settings.snippet_len,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn get(&self, path: &str) -> Result<Response, StoreError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::Http {
                status: status.as_u16(),
                url,
            });
        }
        Ok(resp)
    }
}

impl ConfigStore for HttpConfigStore {
    fn name(&self) -> &str {
        "http"
    }

    fn snippet_len(&self) -> usize {
        self.snippet_len
    }

    fn fetch_raw(&self) -> Result<Value, StoreError> {
        let body = self
            .get("config")?
            .text()
            .map_err(|e| StoreError::Network(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| StoreError::Decode {
            message: e.to_string(),
            snippet: snippet(&body, self.snippet_len),
        })
    }

    fn fetch(&self) -> Result<ConfigDocument, StoreError> {
        let doc = decode_document(self.fetch_raw()?, self.snippet_len)?;
        info!(base_url = %self.base_url, version = %doc.version, "config loaded");
        Ok(doc)
    }

    fn save(&self, doc: &ConfigDocument) -> Result<(), StoreError> {
        let url = self.url("config");
        debug!(%url, "POST");
        let resp = self
            .client
            .post(&url)
            .json(&SaveRequest { config: doc })
            .send()
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::SaveRejected {
                status: status.as_u16(),
            });
        }
        info!(base_url = %self.base_url, updated = %doc.updated, "config saved");
        Ok(())
    }

    fn download(&self) -> Result<Vec<u8>, StoreError> {
        let bytes = self
            .get("download")?
            .bytes()
            .map_err(|e| StoreError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
