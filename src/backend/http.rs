// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP route backend.
//!
//! Layout (JSON bodies, bearer token when configured):
//! - `GET  /api/routes/{id}`                  route with stops
//! - `GET  /api/routes/{id}/participants`     participant positions
//! - `POST /api/routes/{id}/participants`     own position report
//! - `POST /api/routes/{id}/checkins`         one round at a stop
//! - `POST /api/routes/{id}/drinks`           one consumed unit
//! - `GET  /api/routes/{id}/pot`              pot snapshot
//! - `POST /api/routes/{id}/pot`              spend (`action = "spend"`)
//! - `GET  /api/places/nearby`                `?lat=&lng=&radius=`
//! - `POST /api/routes/{id}/stops`            append a stop
//! - `POST /api/routes/{id}/complete`         finalize
//! - `POST /api/routes/{id}/achievements`     gamification event
//! - `GET  /api/routes/{id}/events`           NDJSON real-time stream

use super::{Endpoint, RouteBackend, UPDATE_CHANNEL_CAPACITY};
use crate::error::{AppError, Result};
use crate::models::{
    AchievementEvent, CheckInReceipt, CheckInRequest, DrinkLogRequest, NewStopRequest,
    Participant, PlaceCandidate, PlaceQuery, PositionReport, PotSnapshot, PotSpendRequest,
    RealtimeEvent, Route, Stop,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

/// Per-request timeout; the event stream has none.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Route backend client.
#[derive(Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn route_url(&self, route_id: &str, path: &str) -> String {
        format!("{}/api/routes/{}{}", self.base_url, route_id, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: DeserializeOwned>(&self, endpoint: Endpoint, url: &str) -> Result<T> {
        let response = self
            .authorize(self.http.get(url))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error(endpoint, e))?;

        check_response_json(endpoint, response).await
    }

    /// POST a JSON body and parse the JSON response.
    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        url: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.send_post(endpoint, url, body).await?;
        check_response_json(endpoint, response).await
    }

    /// POST a JSON body, ignoring any response body.
    async fn post<B: Serialize + ?Sized>(&self, endpoint: Endpoint, url: &str, body: &B) -> Result<()> {
        let response = self.send_post(endpoint, url, body).await?;
        check_response(endpoint, response).await
    }

    async fn send_post<B: Serialize + ?Sized>(
        &self,
        endpoint: Endpoint,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        self.authorize(self.http.post(url))
            .timeout(REQUEST_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(endpoint, e))
    }
}

fn transport_error(endpoint: Endpoint, err: reqwest::Error) -> AppError {
    AppError::Backend(format!("{} request failed: {}", endpoint, err))
}

/// Check response status and return error if not successful.
async fn check_response(endpoint: Endpoint, response: reqwest::Response) -> Result<()> {
    if response.status().is_success() {
        return Ok(());
    }
    Err(status_error(endpoint, response).await)
}

/// Check response and parse JSON body.
async fn check_response_json<T: DeserializeOwned>(
    endpoint: Endpoint,
    response: reqwest::Response,
) -> Result<T> {
    if !response.status().is_success() {
        return Err(status_error(endpoint, response).await);
    }
    response
        .json()
        .await
        .map_err(|e| AppError::Backend(format!("{} response parse error: {}", endpoint, e)))
}

async fn status_error(endpoint: Endpoint, response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status == reqwest::StatusCode::NOT_FOUND {
        return AppError::NotFound(format!("{}: {}", endpoint, body));
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        tracing::warn!(endpoint = %endpoint, "Backend rejected session token");
    }
    AppError::Backend(format!("{} HTTP {}: {}", endpoint, status, body))
}

#[async_trait]
impl RouteBackend for HttpBackend {
    async fn get_route(&self, route_id: &str) -> Result<Route> {
        self.get_json(Endpoint::Route, &self.route_url(route_id, ""))
            .await
    }

    async fn get_participants(&self, route_id: &str) -> Result<Vec<Participant>> {
        self.get_json(
            Endpoint::Participants,
            &self.route_url(route_id, "/participants"),
        )
        .await
    }

    async fn report_position(&self, route_id: &str, report: &PositionReport) -> Result<()> {
        self.post(
            Endpoint::ReportPosition,
            &self.route_url(route_id, "/participants"),
            report,
        )
        .await
    }

    async fn check_in(&self, route_id: &str, request: &CheckInRequest) -> Result<CheckInReceipt> {
        self.post_json(
            Endpoint::CheckIn,
            &self.route_url(route_id, "/checkins"),
            request,
        )
        .await
    }

    async fn log_drink(&self, route_id: &str, request: &DrinkLogRequest) -> Result<()> {
        self.post(
            Endpoint::DrinkLog,
            &self.route_url(route_id, "/drinks"),
            request,
        )
        .await
    }

    async fn get_pot(&self, route_id: &str) -> Result<PotSnapshot> {
        self.get_json(Endpoint::Pot, &self.route_url(route_id, "/pot"))
            .await
    }

    async fn spend_from_pot(
        &self,
        route_id: &str,
        request: &PotSpendRequest,
    ) -> Result<PotSnapshot> {
        self.post_json(
            Endpoint::PotSpend,
            &self.route_url(route_id, "/pot"),
            request,
        )
        .await
    }

    async fn nearby_places(&self, query: &PlaceQuery) -> Result<Vec<PlaceCandidate>> {
        let url = format!("{}/api/places/nearby", self.base_url);
        let response = self
            .authorize(self.http.get(&url))
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error(Endpoint::Places, e))?;

        check_response_json(Endpoint::Places, response).await
    }

    async fn create_stop(&self, route_id: &str, request: &NewStopRequest) -> Result<Stop> {
        self.post_json(
            Endpoint::CreateStop,
            &self.route_url(route_id, "/stops"),
            request,
        )
        .await
    }

    async fn finalize_route(&self, route_id: &str) -> Result<()> {
        self.post(
            Endpoint::Finalize,
            &self.route_url(route_id, "/complete"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn record_achievement(&self, route_id: &str, event: &AchievementEvent) -> Result<()> {
        self.post(
            Endpoint::Achievement,
            &self.route_url(route_id, "/achievements"),
            event,
        )
        .await
    }

    async fn subscribe_updates(&self, route_id: &str) -> Result<mpsc::Receiver<RealtimeEvent>> {
        let url = self.route_url(route_id, "/events");
        let mut response = self
            .authorize(self.http.get(&url))
            .header(reqwest::header::ACCEPT, "application/x-ndjson")
            .send()
            .await
            .map_err(|e| transport_error(Endpoint::Updates, e))?;

        if !response.status().is_success() {
            return Err(status_error(Endpoint::Updates, response).await);
        }

        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let route_id = route_id.to_string();

        tokio::spawn(async move {
            let mut buf: Vec<u8> = Vec::new();
            loop {
                let chunk = match response.chunk().await {
                    Ok(Some(chunk)) => chunk,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(route_id = %route_id, error = %e, "Update stream failed");
                        break;
                    }
                };
                buf.extend_from_slice(&chunk);

                while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let Some(event) = parse_update_line(&line) else {
                        continue;
                    };
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            tracing::info!(route_id = %route_id, "Update stream closed");
        });

        Ok(rx)
    }
}

/// Parse one NDJSON line. Blank lines are keep-alives; unknown events are skipped.
fn parse_update_line(line: &[u8]) -> Option<RealtimeEvent> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str(text) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!(error = %e, line = %text, "Skipping unparseable update");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_url() {
        let backend = HttpBackend::new("https://crawl.example.com/", None);
        assert_eq!(
            backend.route_url("r1", "/checkins"),
            "https://crawl.example.com/api/routes/r1/checkins"
        );
        assert_eq!(
            backend.route_url("r1", ""),
            "https://crawl.example.com/api/routes/r1"
        );
    }

    #[test]
    fn test_parse_update_line() {
        assert!(parse_update_line(b"\n").is_none());
        assert!(parse_update_line(b"{\"type\":\"mystery\"}\n").is_none());
        assert!(parse_update_line(&[0xff, 0xfe]).is_none());

        let event = parse_update_line(
            b"{\"type\":\"nudge\",\"fromParticipantId\":\"u2\",\"message\":\"Next bar!\"}\n",
        )
        .unwrap();
        assert!(matches!(event, RealtimeEvent::Nudge { .. }));
    }
}
