//! Shared HTTP plumbing for remote providers

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::util::compact_text;

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Send a request and map unsuccessful statuses onto the error taxonomy.
pub(crate) async fn send(request: RequestBuilder) -> Result<Response> {
    let response = request
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await?;
    check_status(response).await
}

/// Send a request and decode a JSON body.
pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder, context: &str) -> Result<T> {
    let response = send(request).await?;
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|error| Error::parse(context, error))
}

/// Response of a route that older deployments may not serve.
#[derive(Debug)]
pub(crate) enum Routed<T> {
    Found(T),
    MissingRoute,
}

/// Like [`send_json`], but a 404 reports a missing route instead of failing.
pub(crate) async fn send_json_routed<T: DeserializeOwned>(
    request: RequestBuilder,
    context: &str,
) -> Result<Routed<T>> {
    let response = request
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await?;
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(Routed::MissingRoute);
    }
    let response = check_status(response).await?;
    let body = response.text().await?;
    serde_json::from_str(&body)
        .map(Routed::Found)
        .map_err(|error| Error::parse(context, error))
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(Error::AuthRequired);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Network(parse_api_error(status, &body)))
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

pub(crate) fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
