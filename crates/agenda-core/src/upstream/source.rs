//! Upstream contacts API.

use crate::config::{NetworkConfig, UpstreamSettings};
use crate::error::{AgendaError, Result};
use crate::models::{Contact, ContactPage};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Paged source of contacts.
#[async_trait]
pub trait ContactSource: Send + Sync {
    /// Fetch one page. `None` leaves the choice to the source.
    async fn fetch_page(&self, page: Option<u64>, page_size: Option<u64>) -> Result<ContactPage>;
}

/// `ContactSource` backed by the upstream HTTP API.
pub struct HttpContactSource {
    client: Client,
    endpoint: Url,
    api_token: Option<String>,
    timeout: Duration,
}

impl HttpContactSource {
    pub fn new(settings: &UpstreamSettings) -> Result<Self> {
        let timeout = settings.request_timeout();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| AgendaError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        let endpoint = Url::parse(&settings.base_url)
            .and_then(|base| base.join(NetworkConfig::CONTACTS_PATH))
            .map_err(|e| AgendaError::Config {
                message: format!("Invalid upstream base URL {}: {}", settings.base_url, e),
            })?;

        Ok(Self {
            client,
            endpoint,
            api_token: settings.api_token.clone().filter(|t| !t.is_empty()),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn map_send_error(&self, err: reqwest::Error) -> AgendaError {
        if err.is_timeout() {
            AgendaError::Timeout(self.timeout)
        } else {
            AgendaError::Network {
                message: format!("GET {} failed: {}", self.endpoint, err),
                source: Some(err),
            }
        }
    }
}

#[async_trait]
impl ContactSource for HttpContactSource {
    async fn fetch_page(&self, page: Option<u64>, page_size: Option<u64>) -> Result<ContactPage> {
        let mut query = Vec::new();
        if let Some(page) = page {
            query.push(("page", page));
        }
        if let Some(page_size) = page_size {
            query.push(("pageSize", page_size));
        }

        let mut request = self
            .client
            .get(self.endpoint.clone())
            .query(&query)
            .header(header::ACCEPT, "application/json");
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        debug!("Fetching contacts page {:?} (size {:?})", page, page_size);
        let response = request.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgendaError::Upstream {
                status: status.as_u16(),
                message: upstream_message(status, &body),
            });
        }

        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        let mut contacts: Vec<Contact> = serde_json::from_str(&body)?;
        for contact in &mut contacts {
            contact
                .source
                .get_or_insert_with(|| NetworkConfig::CONTACT_SOURCE_TAG.to_string());
        }

        Ok(ContactPage::from_parts(contacts, headers))
    }
}

fn upstream_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        status.canonical_reason().unwrap_or("error").to_string()
    } else {
        body.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_contacts_path() {
        let settings = UpstreamSettings {
            base_url: "http://contacts.internal:9090".into(),
            ..UpstreamSettings::default()
        };
        let source = HttpContactSource::new(&settings).unwrap();
        assert_eq!(
            source.endpoint().as_str(),
            "http://contacts.internal:9090/api/v1/contacts"
        );
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let settings = UpstreamSettings {
            base_url: "not a url".into(),
            ..UpstreamSettings::default()
        };
        assert!(matches!(
            HttpContactSource::new(&settings),
            Err(AgendaError::Config { .. })
        ));
    }

    #[test]
    fn test_upstream_message_falls_back_to_reason() {
        assert_eq!(
            upstream_message(StatusCode::SERVICE_UNAVAILABLE, "  "),
            "Service Unavailable"
        );
        assert_eq!(upstream_message(StatusCode::BAD_GATEWAY, "boom"), "boom");
    }
}
