use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use scanr_core::AppError;
use scanr_core::catalog::{CatalogMatch, ModLookup, ModPayload, saved_mod_id};
use scanr_core::config::ApiSettings;
use scanr_core::text::limit_text;
use scanr_core::traits::CatalogApi;
use url::Url;

use crate::map_send_error;

/// Path of the mod resource on the catalog host.
pub const MOD_ENDPOINT: &str = "/api/content/mod";

/// Remote mod catalog over HTTP.
///
/// Every request carries the configured token verbatim in the
/// `Authorization` header. Any status other than 200 is returned as
/// [`AppError::RemoteApi`].
#[derive(Clone)]
pub struct ModCatalogClient {
    client: Client,
    endpoint: String,
    token: Option<String>,
    timeout_secs: u64,
}

impl ModCatalogClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, AppError> {
        let timeout = Duration::from_secs(settings.timeout_secs);
        let client = Client::builder()
            .user_agent(concat!("scanr/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}{MOD_ENDPOINT}", settings.host.trim_end_matches('/')),
            token: settings.token.clone(),
            timeout_secs: settings.timeout_secs,
        })
    }

    fn request(&self, method: Method, query: &[(&str, String)]) -> Result<RequestBuilder, AppError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| AppError::ConfigError(format!("Invalid catalog host: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let builder = self.client.request(method, url);
        Ok(match &self.token {
            Some(token) => builder.header(reqwest::header::AUTHORIZATION, token),
            None => builder,
        })
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, AppError> {
        let response = builder
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::RemoteApi {
                status: status.as_u16(),
                message: limit_text(body.trim(), 200),
            });
        }
        Ok(response)
    }

    async fn send_json(&self, builder: RequestBuilder) -> Result<serde_json::Value, AppError> {
        self.send(builder)
            .await?
            .json()
            .await
            .map_err(|e| AppError::RemoteApi {
                status: 200,
                message: format!("Invalid JSON body: {e}"),
            })
    }
}

impl CatalogApi for ModCatalogClient {
    async fn find_mod(&self, lookup: &ModLookup) -> Result<Option<CatalogMatch>, AppError> {
        let query = lookup.query_pairs()?;
        tracing::debug!(?query, "Looking up mod in catalog");

        let body = self.send_json(self.request(Method::GET, &query)?).await?;
        CatalogMatch::from_lookup_body(&body)
    }

    async fn save_mod(&self, id: Option<i64>, payload: &ModPayload) -> Result<i64, AppError> {
        let builder = match id {
            Some(id) => self.request(Method::PUT, &[("id", id.to_string())])?,
            None => {
                payload.validate_for_create()?;
                self.request(Method::POST, &[])?
            }
        };

        let body = self.send_json(builder.json(payload)).await?;
        saved_mod_id(&body)
    }

    async fn delete_mod(&self, id: i64) -> Result<(), AppError> {
        self.send(self.request(Method::DELETE, &[("id", id.to_string())])?)
            .await?;
        Ok(())
    }
}
