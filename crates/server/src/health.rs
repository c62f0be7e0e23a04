use std::io;
use std::net::{IpAddr, SocketAddr};

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use firmscope_slack::socket::ConnectionStatus;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    slack: ConnectionStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub slack: HealthCheck,
    pub checked_at: String,
}

pub fn router(slack: ConnectionStatus) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { slack })
}

pub async fn spawn(bind_address: &str, port: u16, slack: ConnectionStatus) -> io::Result<()> {
    let address = socket_address(bind_address, port)?;
    let listener = tokio::net::TcpListener::bind(address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(slack)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let slack = slack_check(&state.slack);
    let ready = slack.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "firmscope-server runtime initialized".to_string(),
        },
        slack,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

/// Accepts bare or bracketed IPv6 (`::`, `[::1]`) as well as IPv4.
fn socket_address(bind_address: &str, port: u16) -> io::Result<SocketAddr> {
    let host = bind_address.trim();
    let host = host.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')).unwrap_or(host);
    let ip: IpAddr = host.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("server.bind_address `{bind_address}` is not an IP address"),
        )
    })?;
    Ok(SocketAddr::from((ip, port)))
}

fn slack_check(status: &ConnectionStatus) -> HealthCheck {
    if status.is_connected() {
        HealthCheck { status: "ready", detail: "socket mode connected".to_string() }
    } else {
        HealthCheck { status: "degraded", detail: "socket mode not connected".to_string() }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        extract::State,
        http::{Request, StatusCode},
        Json,
    };
    use firmscope_slack::socket::ConnectionStatus;
    use tower::ServiceExt;

    use crate::health::{health, router, socket_address, HealthState};

    #[test]
    fn bind_address_accepts_ipv4_and_ipv6() {
        assert_eq!(
            socket_address("127.0.0.1", 8080).expect("ipv4").to_string(),
            "127.0.0.1:8080"
        );
        assert_eq!(socket_address("::", 8080).expect("ipv6").to_string(), "[::]:8080");
        assert_eq!(socket_address("[::1]", 9000).expect("bracketed").to_string(), "[::1]:9000");
        assert!(socket_address("localhost", 8080).is_err());
    }

    #[tokio::test]
    async fn health_returns_ready_when_socket_is_connected() {
        let slack = ConnectionStatus::default();
        slack.set_connected(true);

        let (status, Json(payload)) = health(State(HealthState { slack })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.slack.status, "ready");
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn health_route_reports_degraded_until_socket_connects() {
        let slack = ConnectionStatus::default();
        let app = router(slack.clone());

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload["status"], "degraded");
        assert_eq!(payload["slack"]["detail"], "socket mode not connected");

        slack.set_connected(true);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
