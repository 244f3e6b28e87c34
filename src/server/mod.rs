mod extract;
mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Extension, Json},
    routing::{get, patch, post},
    Router,
};

use crate::server::handlers::{chat, drivers, rides, ws};
use crate::{api::API, auth::DynAuthenticator, error::Error, hub::Hub};

pub type DynAPI = Arc<dyn API + Send + Sync>;

pub fn router(api: DynAPI, hub: Arc<Hub>, authenticator: DynAuthenticator) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rides", post(rides::create))
        .route("/rides/available", get(rides::available))
        .route("/rides/mine", get(rides::mine))
        .route("/rides/:id", get(rides::find))
        .route("/rides/:id/bids", post(rides::place_bid).get(rides::list_bids))
        .route("/rides/:id/accept", post(rides::accept))
        .route("/rides/:id/status", patch(rides::update_status))
        .route(
            "/drivers/:id/location",
            post(drivers::update_location).delete(drivers::remove_location),
        )
        .route("/drivers/nearest", get(drivers::nearest))
        .route("/chat/:ride_id/messages", get(chat::history))
        .route("/ws/tracking", get(ws::tracking))
        .route("/ws/chat", get(ws::chat))
        .layer(Extension(api))
        .layer(Extension(hub))
        .layer(Extension(authenticator))
}

async fn health() -> Json<&'static str> {
    Json("ok")
}

/// Serves `app` until ctrl-c.
pub async fn serve(addr: SocketAddr, app: Router) -> Result<(), Error> {
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {}", err);
                futures::future::pending::<()>().await;
            }
        })
        .await
        .map_err(|err| {
            tracing::error!("server error: {}", err);
            crate::error::unexpected_error()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{DevAuthenticator, User};
    use crate::engine::Engine;
    use crate::events::TracingPublisher;
    use crate::geo::{DynGeoIndex, MemoryGeoIndex};
    use crate::hub::{CloseReason, HubConfig, JoinRequest, Role};
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app() -> (Router, Arc<Hub>) {
        let store = Arc::new(MemoryStore::new());
        let geo: DynGeoIndex = Arc::new(MemoryGeoIndex::new(None));

        let engine = Engine::new(store.clone(), geo.clone(), Arc::new(TracingPublisher)).unwrap();
        let hub = Arc::new(Hub::new(store, geo, HubConfig::default()));

        (
            router(Arc::new(engine), hub.clone(), Arc::new(DevAuthenticator)),
            hub,
        )
    }

    fn token(user: &User) -> String {
        format!("Bearer {}:{}", user.roles[0], user.id)
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        authorization: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(authorization) = authorization {
            request = request.header(header::AUTHORIZATION, authorization);
        }

        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, body)
    }

    fn ride_body() -> Value {
        json!({
            "origin": {"lat": 55.75, "lng": 37.61, "address": "Red Square"},
            "destination": {"lat": 55.76, "lng": 37.62},
        })
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let (app, _) = app();

        let (status, body) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("ok"));
    }

    #[tokio::test]
    async fn bearer_tokens_are_required() {
        let (app, _) = app();
        let driver = User::driver(Uuid::new_v4());
        let raw = format!("driver:{}", driver.id);

        for authorization in [None, Some(raw.as_str()), Some("Bearer "), Some("Bearer admin:nobody")] {
            let (status, body) = call(&app, Method::GET, "/rides/available", authorization, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{:?}", authorization);
            assert!(body["code"].is_number());
        }

        let (status, body) = call(&app, Method::GET, "/rides/available", Some(token(&driver).as_str()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn finishing_a_ride_over_http_closes_its_room() {
        let (app, hub) = app();
        let passenger = User::passenger(Uuid::new_v4());
        let driver = User::driver(Uuid::new_v4());
        let (p, d) = (token(&passenger), token(&driver));
        let (p, d) = (p.as_str(), d.as_str());

        let (status, ride) = call(&app, Method::POST, "/rides", Some(p), Some(ride_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(ride["status"], "requested");
        let ride_id = ride["id"].as_str().unwrap().to_string();

        let (status, _) = call(&app, Method::POST, "/rides", Some(d), Some(ride_body())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let bids = format!("/rides/{}/bids", ride_id);
        let (status, _) = call(&app, Method::POST, &bids, Some(d), Some(json!({"price": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, bid) = call(&app, Method::POST, &bids, Some(d), Some(json!({"price": 400}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(bid["status"], "pending");

        let (status, listed) = call(&app, Method::GET, &bids, Some(p), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let accept = format!("/rides/{}/accept", ride_id);
        let bid_id = bid["id"].clone();
        let (status, matched) = call(&app, Method::POST, &accept, Some(p), Some(json!({ "bid_id": bid_id }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(matched["status"], "matched");

        let (status, _) = call(&app, Method::POST, &bids, Some(d), Some(json!({"price": 350}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let ride_uuid = Uuid::parse_str(&ride_id).unwrap();
        let mut session = hub
            .join(JoinRequest {
                ride_id: ride_uuid,
                role: Role::Passenger,
                user_id: passenger.id,
            })
            .await
            .unwrap();
        assert_eq!(hub.room_count(), 1);

        let status_uri = format!("/rides/{}/status", ride_id);
        let (status, _) = call(&app, Method::PATCH, &status_uri, Some(p), Some(json!({"status": "in_progress"}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, ride) = call(&app, Method::PATCH, &status_uri, Some(d), Some(json!({"status": "in_progress"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ride["status"], "in_progress");
        assert_eq!(hub.room_count(), 1);

        let (status, ride) = call(&app, Method::PATCH, &status_uri, Some(d), Some(json!({"status": "completed"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ride["status"], "completed");
        assert_eq!(hub.room_count(), 0);
        assert_eq!(session.next().await.unwrap_err(), CloseReason::RoomClosed);

        let (status, _) = call(&app, Method::PATCH, &status_uri, Some(d), Some(json!({"status": "cancelled"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, mine) = call(&app, Method::GET, "/rides/mine", Some(d), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine[0]["id"], ride_id.as_str());

        let history = format!("/chat/{}/messages", ride_id);
        let (status, messages) = call(&app, Method::GET, &history, Some(p), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(messages, json!([]));
    }

    #[tokio::test]
    async fn unknown_rides_are_not_found() {
        let (app, _) = app();
        let passenger = User::passenger(Uuid::new_v4());

        let uri = format!("/rides/{}", Uuid::new_v4());
        let (status, body) = call(&app, Method::GET, &uri, Some(token(&passenger).as_str()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 200);
    }

    #[tokio::test]
    async fn driver_locations() {
        let (app, _) = app();
        let driver = User::driver(Uuid::new_v4());
        let other = User::driver(Uuid::new_v4());
        let passenger = User::passenger(Uuid::new_v4());
        let location = format!("/drivers/{}/location", driver.id);

        let (status, _) = call(&app, Method::POST, &location, Some(token(&other).as_str()), Some(json!({"lat": 55.751, "lng": 37.61}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(&app, Method::POST, &location, Some(token(&driver).as_str()), Some(json!({"lat": 91.0, "lng": 37.61}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, position) = call(&app, Method::POST, &location, Some(token(&driver).as_str()), Some(json!({"lat": 55.751, "lng": 37.61}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(position["driver_id"], driver.id.to_string());

        let nearest = "/drivers/nearest?lat=55.75&lng=37.61&radius_km=2";
        let (status, found) = call(&app, Method::GET, nearest, Some(token(&passenger).as_str()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found[0]["driver_id"], driver.id.to_string());
        assert!(found[0]["distance_km"].as_f64().unwrap() < 0.2);

        let (status, _) = call(&app, Method::DELETE, &location, Some(token(&driver).as_str()), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, found) = call(&app, Method::GET, nearest, Some(token(&passenger).as_str()), None).await;
        assert_eq!(found, json!([]));
    }
}
