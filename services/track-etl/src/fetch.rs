//!
//! src/fetch.rs
//!
//! Defines the catalog client used by the extract stage. One request
//! per run, no retries; any non-success status fails the whole fetch
//!

use reqwest::{Client, header, redirect, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use crate::config::{CatalogConfig, HttpConfig};
use crate::errors::EtlError;

/// Client building functionality
fn client_helper(http: &HttpConfig) -> reqwest::ClientBuilder {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .pool_idle_timeout(Some(http.pool_idle_timeout))
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
}

pub fn base_client(http: &HttpConfig) -> Result<Client, EtlError> {
    let mut h = header::HeaderMap::new();
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    client_helper(http)
        .default_headers(h)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| EtlError::Config(format!("build client: {e}")))
}

#[derive(Clone, Debug)]
pub struct DeezerClient {
    pub http: Client,
    pub cfg: CatalogConfig
}

impl DeezerClient {
    pub fn new(http_config: &HttpConfig, cfg: &CatalogConfig) -> Result<Self, EtlError> {
        let http = base_client(http_config)?;
        Ok( Self {
            http,
            cfg: cfg.clone()
        })
    }

    /// GET /search?q=...&limit=...
    pub fn search(&self, query: &str, limit: u32) -> Result<RequestBuilder, EtlError> {
        let url = self.cfg.api_base.join("search")
            .map_err(|e| EtlError::Config(format!("search url: {e}")))?;
        Ok( self.http.get(url).query(&[
            ("q", query),
            ("limit", &limit.to_string())
        ]) )
    }

    /// Issues the search and returns the records found under `data`.
    /// All-or-nothing: a failed status carries no partial results
    pub async fn fetch_tracks(&self, category: &str, limit: u32) ->
        Result<Vec<Value>, EtlError> {
        let response = self.search(category, limit)?
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EtlError::Retrieval(
                format!("catalog search for {category:?} returned {status}")
            ));
        }

        let body: Value = response.json().await?;
        let records = match body.get("data") {
            Some(Value::Array(arr)) => arr.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => return Err(EtlError::Retrieval(
                format!("catalog field `data` is not an array: {other}")
            ))
        };

        debug!(category, limit, records = records.len(), "fetch.search.ok");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(base: &str) -> DeezerClient {
        let cfg = CatalogConfig::with_base(base, 50).unwrap();
        DeezerClient::new(&HttpConfig::default(), &cfg).unwrap()
    }

    #[tokio::test]
    async fn search_hits_query_with_category_and_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "rock".into()),
                Matcher::UrlEncoded("limit".into(), "25".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": [{"id": 1, "title": "a"}, {"id": 2, "title": "b"}], "total": 2}"#)
            .create_async()
            .await;

        let records = client(&server.url()).fetch_tracks("rock", 25).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["title"], "b");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_data_field_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"total": 0}"#)
            .create_async()
            .await;

        let records = client(&server.url()).fetch_tracks("nothing", 50).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_retrieval_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let err = client(&server.url()).fetch_tracks("pop", 50).await.unwrap_err();
        assert!(matches!(err, EtlError::Retrieval(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn non_json_body_is_retrieval_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let err = client(&server.url()).fetch_tracks("pop", 50).await.unwrap_err();
        assert!(matches!(err, EtlError::Retrieval(_)), "got {err:?}");
    }
}
