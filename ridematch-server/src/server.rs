//! Axum server setup and router configuration.

use crate::api;
use crate::shutdown::shutdown_signal;
use crate::state::AppState;
use axum::{Json, Router, response::IntoResponse, routing::get};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        .merge(api::routes())
        // Add state to all routes
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Simple health check - returns OK if the server is running.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Run the server with graceful shutdown support.
pub async fn run_server(router: Router, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use ridematch_core::collaborators::LoggingCollaborator;
    use ridematch_core::config::{
        CollaboratorConfig, MatchingConfig, ServerConfig, SharedConfig, StoreBackend,
    };
    use ridematch_core::events::{
        EventSenders, NotificationEventReceiver, notification_event_channel, ride_status_channel,
    };
    use ridematch_core::matching::MatchingEngine;
    use ridematch_core::store::InMemoryStore;
    use ridematch_core::utils::ManualClock;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use time::macros::datetime;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct TestApp {
        router: Router,
        // Keeps the notification queue open.
        _notifications: NotificationEventReceiver,
    }

    fn test_app() -> TestApp {
        let clock = Arc::new(ManualClock::new(datetime!(2025-03-03 10:00:00)));
        let config = SharedConfig::new(
            ServerConfig {
                listen: SocketAddr::from(([127, 0, 0, 1], 0)),
                store: StoreBackend::Memory,
            },
            MatchingConfig::default(),
            CollaboratorConfig::default(),
        );
        let (notification_tx, notifications) = notification_event_channel();
        let engine = MatchingEngine::new(
            Arc::new(InMemoryStore::new()),
            clock,
            config.matching.clone(),
            Arc::new(LoggingCollaborator),
            EventSenders::new(notification_tx, ride_status_channel()),
        );
        TestApp {
            router: build_router(AppState::new(engine, config)),
            _notifications: notifications,
        }
    }

    impl TestApp {
        async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let builder = Request::builder().method(method).uri(uri);
            let request = match body {
                Some(body) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
            (status, value)
        }

        async fn online_driver(&self, n: u128, features: &[&str]) -> Uuid {
            let driver_id = Uuid::from_u128(n);
            let working_hours: Vec<Value> = [
                "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
            ]
            .iter()
            .map(|day| json!({ "day": day, "start_minute": 0, "end_minute": 1440 }))
            .collect();
            let (status, _) = self
                .call(
                    "PUT",
                    &format!("/drivers/{driver_id}/profile"),
                    Some(json!({
                        "vehicle": "standard",
                        "features": features,
                        "working_hours": working_hours,
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            let (status, body) = self
                .call("POST", &format!("/drivers/{driver_id}/online"), None)
                .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["online"], true);
            driver_id
        }

        async fn create_ride(&self) -> Value {
            let (status, body) = self
                .call(
                    "POST",
                    "/rides",
                    Some(json!({
                        "rider_id": Uuid::from_u128(0x5EED),
                        "pickup": "Central Station",
                        "dropoff": "Airport",
                        "kind": "immediate",
                        "duration_minutes": 30,
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            body
        }

        async fn first_offer(&self, driver_id: Uuid) -> String {
            let (status, offers) = self
                .call("GET", &format!("/drivers/{driver_id}/offers"), None)
                .await;
            assert_eq!(status, StatusCode::OK);
            offers[0]["offer_id"].as_str().unwrap().to_string()
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = app.call("GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_offer_accept_assigns_ride() {
        let app = test_app();
        let driver_id = app.online_driver(1, &[]).await;

        let created = app.create_ride().await;
        assert_eq!(created["dispatch"]["result"], "offered");
        assert_eq!(created["dispatch"]["offers_created"], 1);
        assert_eq!(created["ride"]["status"], "offering");
        let ride_id = created["ride"]["ride_id"].as_str().unwrap().to_string();

        let offer_id = app.first_offer(driver_id).await;
        let (status, accepted) = app
            .call(
                "POST",
                &format!("/drivers/{driver_id}/offers/{offer_id}/accept"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(accepted["offer"]["state"], "accepted");
        assert_eq!(accepted["assignment"]["ride_id"], ride_id.as_str());

        let (status, ride) = app.call("GET", &format!("/rides/{ride_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ride["status"], "assigned");
        assert_eq!(ride["assigned_driver"], driver_id.to_string());
    }

    #[tokio::test]
    async fn test_losing_accept_is_conflict() {
        let app = test_app();
        let first = app.online_driver(1, &[]).await;
        let second = app.online_driver(2, &[]).await;
        let created = app.create_ride().await;
        assert_eq!(created["dispatch"]["offers_created"], 2);

        let first_offer = app.first_offer(first).await;
        let second_offer = app.first_offer(second).await;
        let (status, _) = app
            .call(
                "POST",
                &format!("/drivers/{first}/offers/{first_offer}/accept"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .call(
                "POST",
                &format!("/drivers/{second}/offers/{second_offer}/accept"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, "ride no longer available");
    }

    #[tokio::test]
    async fn test_accept_after_cancel_is_withdrawn() {
        let app = test_app();
        let driver_id = app.online_driver(1, &[]).await;
        let created = app.create_ride().await;
        let ride_id = created["ride"]["ride_id"].as_str().unwrap().to_string();
        let offer_id = app.first_offer(driver_id).await;

        let (status, cancelled) = app
            .call("POST", &format!("/rides/{ride_id}/cancel"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cancelled["changed"], true);
        assert_eq!(cancelled["offers_withdrawn"], 1);

        let (status, body) = app
            .call(
                "POST",
                &format!("/drivers/{driver_id}/offers/{offer_id}/accept"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, "offer withdrawn");
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let app = test_app();
        let driver_id = app.online_driver(1, &[]).await;
        let missing = Uuid::from_u128(0xDEAD);

        let (status, _) = app.call("GET", &format!("/rides/{missing}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app
            .call(
                "POST",
                &format!("/drivers/{driver_id}/offers/{missing}/accept"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ride_without_eligible_driver_stays_unmatched() {
        let app = test_app();
        app.online_driver(1, &[]).await;
        let (status, created) = app
            .call(
                "POST",
                "/rides",
                Some(json!({
                    "rider_id": Uuid::from_u128(0x5EED),
                    "pickup": "Central Station",
                    "dropoff": "Airport",
                    "kind": "immediate",
                    "duration_minutes": 30,
                    "accessibility": ["wheelchair_ramp"],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["dispatch"]["result"], "no_eligible_drivers");
        assert_eq!(created["ride"]["status"], "unmatched");
    }

    #[tokio::test]
    async fn test_prebooked_ride_in_the_past_is_rejected() {
        let app = test_app();
        let (status, _) = app
            .call(
                "POST",
                "/rides",
                Some(json!({
                    "rider_id": Uuid::from_u128(0x5EED),
                    "pickup": "Central Station",
                    "dropoff": "Airport",
                    "kind": "pre_booked",
                    "window_start": 1_000,
                    "duration_minutes": 30,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_presence_repeats_are_no_ops() {
        let app = test_app();
        let driver_id = app.online_driver(1, &[]).await;

        let (_, again) = app
            .call("POST", &format!("/drivers/{driver_id}/online"), None)
            .await;
        assert_eq!(again["online"], true);
        assert_eq!(again["changed"], false);

        let (_, offline) = app
            .call("POST", &format!("/drivers/{driver_id}/offline"), None)
            .await;
        assert_eq!(offline["changed"], true);
        let (status, offline) = app
            .call("POST", &format!("/drivers/{driver_id}/offline"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(offline["online"], false);
        assert_eq!(offline["changed"], false);

        let (_, heartbeat) = app
            .call("POST", &format!("/drivers/{driver_id}/heartbeat"), None)
            .await;
        assert_eq!(heartbeat["online"], false);
    }

    #[tokio::test]
    async fn test_invalid_working_slot_is_rejected() {
        let app = test_app();
        let (status, _) = app
            .call(
                "PUT",
                &format!("/drivers/{}/profile", Uuid::from_u128(1)),
                Some(json!({
                    "vehicle": "minivan",
                    "working_hours": [{ "day": "monday", "start_minute": 600, "end_minute": 500 }],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_views() {
        let app = test_app();
        let driver_id = app.online_driver(1, &[]).await;
        let created = app.create_ride().await;
        let ride_id = created["ride"]["ride_id"].as_str().unwrap().to_string();

        let (status, online) = app.call("GET", "/admin/drivers/online", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(online["drivers"], json!([driver_id]));

        let (status, expired) = app.call("GET", "/admin/rides", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(expired, json!([]));

        let (status, offering) = app.call("GET", "/admin/rides?status=offering", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(offering[0]["ride_id"], ride_id.as_str());

        // Re-dispatch keeps the driver's live offer.
        let (status, summary) = app
            .call("POST", &format!("/admin/rides/{ride_id}/dispatch"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["result"], "offered");
        assert_eq!(summary["offers_created"], 0);
        assert_eq!(summary["offers_live"], 1);

        let (status, _) = app
            .call("POST", &format!("/rides/{ride_id}/cancel"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app
            .call("POST", &format!("/admin/rides/{ride_id}/dispatch"), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
