//! `BookingGateway` backed by the remote booking/creation API.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use wayfare_core::{BookingGateway, BookingRequest, GatewayError, GatewayResponse};

pub struct HttpBookingGateway {
    client: Client,
    base_url: String,
}

impl HttpBookingGateway {
    /// `timeout` bounds each request at the transport level; the submission
    /// handler applies its own deadline on top.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self, flow: &str) -> String {
        format!("{}/flows/{}/bookings", self.base_url, flow)
    }
}

#[async_trait]
impl BookingGateway for HttpBookingGateway {
    async fn submit(&self, request: &BookingRequest) -> Result<GatewayResponse, GatewayError> {
        let url = self.endpoint(&request.flow);
        debug!(draft_id = %request.draft_id, %url, "POST booking");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Transport(format!("request timed out: {e}"))
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                draft_id = %request.draft_id,
                status = status.as_u16(),
                "Booking API refused request"
            );
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<GatewayResponse>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wayfare_core::{BookingDraft, FormFields};

    /// Serve one canned HTTP response and hand back the request head
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            let head_end = loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
            let content_length = head
                .lines()
                .find_map(|l| {
                    let l = l.to_ascii_lowercase();
                    l.strip_prefix("content-length:").map(|v| v.trim().to_string())
                })
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            while raw.len() < head_end + content_length {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\
                 Connection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            head
        });

        (base_url, handle)
    }

    fn request() -> BookingRequest {
        BookingRequest::from_draft(&BookingDraft::with_defaults(
            "hotel",
            FormFields::from([("stay.checkIn", json!("2031-05-01"))]),
        ))
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let gateway =
            HttpBookingGateway::new("https://api.example.com/v2/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            gateway.endpoint("car-rental"),
            "https://api.example.com/v2/flows/car-rental/bookings"
        );
    }

    #[tokio::test]
    async fn test_success_body_is_decoded() {
        let (base_url, server) =
            serve_once("HTTP/1.1 201 Created", r#"{"ok":true,"id":"BK-77"}"#).await;
        let gateway = HttpBookingGateway::new(&base_url, Duration::from_secs(5)).unwrap();

        let response = gateway.submit(&request()).await.unwrap();
        assert_eq!(response, GatewayResponse::accepted("BK-77"));

        let head = server.await.unwrap();
        assert!(head.starts_with("POST /flows/hotel/bookings HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let (base_url, _server) =
            serve_once("HTTP/1.1 409 Conflict", r#"{"error":"sold out"}"#).await;
        let gateway = HttpBookingGateway::new(&base_url, Duration::from_secs(5)).unwrap();

        match gateway.submit(&request()).await {
            Err(GatewayError::Status { status, body }) => {
                assert_eq!(status, 409);
                assert!(body.contains("sold out"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreadable_body_is_decode_error() {
        let (base_url, _server) = serve_once("HTTP/1.1 200 OK", "not json").await;
        let gateway = HttpBookingGateway::new(&base_url, Duration::from_secs(5)).unwrap();

        assert!(matches!(gateway.submit(&request()).await, Err(GatewayError::Decode(_))));
    }
}
