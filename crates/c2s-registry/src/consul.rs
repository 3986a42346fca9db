use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use c2s_core::ServiceRecord;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use tracing::debug;

use crate::error::RegistryError;
use crate::Registry;

const REDACTED: &str = "<redacted>";

#[derive(Clone)]
pub struct ConsulConfig {
    pub host: String,
    pub port: u16,
    /// ACL token appended to every request as `?token=`.
    pub token: Option<String>,
    /// Datacenter merged into catalog payloads and KV queries.
    pub datacenter: Option<String>,
    pub request_timeout: Duration,
}

impl ConsulConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            token: None,
            datacenter: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for ConsulConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsulConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("token", &self.token.as_ref().map(|_| REDACTED))
            .field("datacenter", &self.datacenter)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogRegistration<'a> {
    node: &'a str,
    address: &'a str,
    service: CatalogService<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    datacenter: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogService<'a> {
    service: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    tags: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogDeregistration<'a> {
    node: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    datacenter: Option<&'a str>,
}

/// Consul HTTP API client limited to the KV and catalog endpoints.
#[derive(Clone)]
pub struct ConsulClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
    datacenter: Option<String>,
}

impl fmt::Debug for ConsulClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsulClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| REDACTED))
            .field("datacenter", &self.datacenter)
            .finish()
    }
}

impl ConsulClient {
    pub fn new(config: ConsulConfig) -> Result<Self, RegistryError> {
        let base_url = Url::parse(&format!("http://{}:{}/", config.host, config.port))
            .map_err(|err| RegistryError::Address(format!("{}:{}: {err}", config.host, config.port)))?;
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            base_url,
            token: config.token,
            datacenter: config.datacenter,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Builds `<base>/<segments>?<flags>&dc=..&token=..`, percent-encoding
    /// each path segment and query value.
    fn url(&self, segments: &[&str], flags: &[&str], with_dc: bool) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.clear().extend(segments);
        }
        if !flags.is_empty() {
            url.set_query(Some(&flags.join("&")));
        }
        let dc = self.datacenter.as_deref().filter(|_| with_dc);
        if dc.is_some() || self.token.is_some() {
            let mut query = url.query_pairs_mut();
            if let Some(dc) = dc {
                query.append_pair("dc", dc);
            }
            if let Some(token) = &self.token {
                query.append_pair("token", token);
            }
        }
        url
    }

    /// KV endpoint for `key`; every `/`-separated part becomes one segment.
    fn kv_url(&self, key: &str, flags: &[&str]) -> Url {
        let segments: Vec<&str> = ["v1", "kv"].into_iter().chain(key.split('/')).collect();
        self.url(&segments, flags, true)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, RegistryError> {
        // Request URLs carry the ACL token.
        let response = request.send().await.map_err(reqwest::Error::without_url)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Registry for ConsulClient {
    async fn kv_keys(&self, prefix: &str) -> Result<Vec<String>, RegistryError> {
        debug!(prefix, "consul: listing keys");
        let response = self
            .send(self.http.get(self.kv_url(prefix, &["keys"])), prefix)
            .await?;
        response
            .json::<Vec<String>>()
            .await
            .map_err(|err| RegistryError::Decode(err.to_string()))
    }

    async fn kv_get(&self, key: &str) -> Result<String, RegistryError> {
        debug!(key, "consul: reading key");
        let response = self
            .send(self.http.get(self.kv_url(key, &["raw"])), key)
            .await?;
        response
            .text()
            .await
            .map_err(|err| RegistryError::Decode(err.to_string()))
    }

    async fn kv_set(&self, key: &str, value: &str) -> Result<(), RegistryError> {
        debug!(key, "consul: writing key");
        self.send(
            self.http.put(self.kv_url(key, &[])).body(value.to_string()),
            key,
        )
        .await?;
        Ok(())
    }

    async fn kv_delete(&self, key: &str, recurse: bool) -> Result<(), RegistryError> {
        debug!(key, recurse, "consul: deleting key");
        let flags: &[&str] = if recurse { &["recurse"] } else { &[] };
        self.send(self.http.delete(self.kv_url(key, flags)), key)
            .await?;
        Ok(())
    }

    async fn catalog_register(&self, record: &ServiceRecord) -> Result<(), RegistryError> {
        let payload = CatalogRegistration {
            node: &record.node,
            address: &record.address,
            service: CatalogService {
                service: &record.service,
                port: record.port,
                tags: &record.tags,
            },
            datacenter: self.datacenter.as_deref(),
        };
        debug!(node = %record.node, address = %record.address, "consul: catalog register");
        self.send(
            self.http
                .put(self.url(&["v1", "catalog", "register"], &[], false))
                .json(&payload),
            &record.node,
        )
        .await?;
        Ok(())
    }

    async fn catalog_deregister(&self, node: &str) -> Result<(), RegistryError> {
        let payload = CatalogDeregistration {
            node,
            datacenter: self.datacenter.as_deref(),
        };
        debug!(node, "consul: catalog deregister");
        self.send(
            self.http
                .put(self.url(&["v1", "catalog", "deregister"], &[], false))
                .json(&payload),
            node,
        )
        .await?;
        Ok(())
    }
}
