//! JSON-over-HTTP client for the deck service

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::RemoteApi;
use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::models::{Card, CardId, Deck, DeckId};
use crate::util::{compact_text, is_http_url};

/// [`RemoteApi`] over `/api/decks` and `/api/cards`
#[derive(Debug, Clone)]
pub struct HttpRemoteApi {
    base_url: String,
    client: reqwest::Client,
}

/// What a request targets, for error reporting
struct Target<'a> {
    entity: &'static str,
    id: Option<&'a str>,
}

impl HttpRemoteApi {
    /// Build a client for an explicit base URL with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(&base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Config(format!("Failed to construct HTTP client: {error}")))?;
        Ok(Self { base_url, client })
    }

    /// Build a client from settings; fails if no API URL is configured
    pub fn from_settings(settings: &SyncSettings) -> Result<Self> {
        let base_url = settings
            .api_base_url
            .clone()
            .ok_or_else(|| Error::Config("no API base URL configured".to_string()))?;
        Self::new(base_url, settings.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}{route}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder, target: &Target<'_>) -> Result<Response> {
        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::NOT_FOUND {
            if let Some(id) = target.id {
                return Err(Error::NotFound {
                    entity: target.entity,
                    id: id.to_string(),
                });
            }
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::Remote {
            status: Some(status.as_u16()),
            message: format!(
                "{} request failed with HTTP {}: {}",
                target.entity,
                status.as_u16(),
                compact_text(&body)
            ),
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        target: &Target<'_>,
    ) -> Result<T> {
        let response = self.send(request, target).await?;
        response.json::<T>().await.map_err(|error| Error::Remote {
            status: None,
            message: format!("Failed to parse {} response: {error}", target.entity),
        })
    }
}

impl RemoteApi for HttpRemoteApi {
    async fn get_all_decks(&self) -> Result<Vec<Deck>> {
        let target = Target {
            entity: "Deck",
            id: None,
        };
        self.send_json(self.client.get(self.endpoint("/api/decks")), &target)
            .await
    }

    async fn get_deck(&self, id: &DeckId) -> Result<Deck> {
        let id = id.as_str();
        let target = Target {
            entity: "Deck",
            id: Some(id.as_str()),
        };
        let url = self.endpoint(&format!("/api/decks/{id}"));
        self.send_json(self.client.get(url), &target).await
    }

    async fn create_deck(&self, deck: &Deck) -> Result<Deck> {
        let target = Target {
            entity: "Deck",
            id: None,
        };
        let request = self.client.post(self.endpoint("/api/decks")).json(deck);
        self.send_json(request, &target).await
    }

    async fn update_deck(&self, id: &DeckId, deck: &Deck) -> Result<Deck> {
        let id = id.as_str();
        let target = Target {
            entity: "Deck",
            id: Some(id.as_str()),
        };
        let request = self
            .client
            .put(self.endpoint(&format!("/api/decks/{id}")))
            .json(deck);
        self.send_json(request, &target).await
    }

    async fn delete_deck(&self, id: &DeckId) -> Result<()> {
        let id = id.as_str();
        let target = Target {
            entity: "Deck",
            id: Some(id.as_str()),
        };
        let url = self.endpoint(&format!("/api/decks/{id}"));
        self.send(self.client.delete(url), &target).await?;
        Ok(())
    }

    async fn get_card(&self, id: &CardId) -> Result<Card> {
        let id = id.as_str();
        let target = Target {
            entity: "Card",
            id: Some(id.as_str()),
        };
        let url = self.endpoint(&format!("/api/cards/{id}"));
        self.send_json(self.client.get(url), &target).await
    }

    async fn create_card(&self, card: &Card) -> Result<Card> {
        let target = Target {
            entity: "Card",
            id: None,
        };
        let request = self.client.post(self.endpoint("/api/cards")).json(card);
        self.send_json(request, &target).await
    }

    async fn update_card(&self, id: &CardId, card: &Card) -> Result<Card> {
        let id = id.as_str();
        let target = Target {
            entity: "Card",
            id: Some(id.as_str()),
        };
        let request = self
            .client
            .put(self.endpoint(&format!("/api/cards/{id}")))
            .json(card);
        self.send_json(request, &target).await
    }

    async fn delete_card(&self, id: &CardId) -> Result<()> {
        let id = id.as_str();
        let target = Target {
            entity: "Card",
            id: Some(id.as_str()),
        };
        let url = self.endpoint(&format!("/api/cards/{id}"));
        self.send(self.client.delete(url), &target).await?;
        Ok(())
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::Config("API base URL is empty".to_string()));
    }
    if !is_http_url(trimmed) {
        return Err(Error::Config(format!(
            "API base URL must include http:// or https:// (got '{trimmed}')"
        )));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}
