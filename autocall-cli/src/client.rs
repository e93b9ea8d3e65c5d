use std::path::PathBuf;

use anyhow::{Result, bail};
use bytes::Bytes;
use reqwest::{Client as ReqwestClient, StatusCode};

use crate::types::*;

pub enum StartOutcome {
    Started,
    MissingPermissions(PermissionReport),
}

pub struct Client {
    http: ReqwestClient,
}

impl Client {
    pub fn new(socket_path: PathBuf) -> Result<Self> {
        let http = ReqwestClient::builder().unix_socket(socket_path).build()?;
        Ok(Self { http })
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        let resp = self
            .http
            .get(format!("http://localhost{path}"))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("{path}: {status} {text}");
        }
        Ok(resp.bytes().await?)
    }

    async fn post(&self, path: &str) -> Result<Bytes> {
        let resp = self
            .http
            .post(format!("http://localhost{path}"))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("{path}: {status} {text}");
        }
        Ok(resp.bytes().await?)
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        let body = self.get("/status").await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn set_api_url(&self, url: &str) -> Result<()> {
        let path = "/config/api-url";
        let resp = self
            .http
            .put(format!("http://localhost{path}"))
            .json(&ApiUrlRequest {
                url: url.to_string(),
            })
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("{path}: {status} {text}");
        }
        Ok(())
    }

    pub async fn start_service(&self, force: bool) -> Result<StartOutcome> {
        let mut url = String::from("/service/start");
        if force {
            url.push_str("?force=true");
        }
        let resp = self
            .http
            .post(format!("http://localhost{url}"))
            .send()
            .await?;
        let status = resp.status();
        if status == StatusCode::CONFLICT {
            let body = resp.bytes().await?;
            return Ok(StartOutcome::MissingPermissions(serde_json::from_slice(&body)?));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("{url}: {status} {text}");
        }
        Ok(StartOutcome::Started)
    }

    pub async fn stop_service(&self) -> Result<()> {
        self.post("/service/stop").await.map(drop)
    }

    pub async fn hang_up(&self) -> Result<()> {
        self.post("/call/hang-up").await.map(drop)
    }

    pub async fn permissions(&self) -> Result<PermissionReport> {
        let body = self.get("/permissions").await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn request_permissions(&self) -> Result<PermissionReport> {
        let body = self.post("/permissions/request").await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
