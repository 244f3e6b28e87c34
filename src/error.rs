use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::env;
use std::fmt::Debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct Error {
    pub code: i32,
    pub message: String,
}

/// Error families, each occupying a fixed band of codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Internal,
    Validation,
    NotFound,
    Conflict,
    Forbidden,
    Unauthorized,
}

impl Error {
    pub fn kind(&self) -> Kind {
        match self.code {
            100..=199 => Kind::Validation,
            200..=299 => Kind::NotFound,
            300..=399 => Kind::Conflict,
            400..=499 => Kind::Forbidden,
            500..=599 => Kind::Unauthorized,
            _ => Kind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            Kind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Kind::Validation => StatusCode::BAD_REQUEST,
            Kind::NotFound => StatusCode::NOT_FOUND,
            Kind::Conflict => StatusCode::CONFLICT,
            Kind::Forbidden => StatusCode::FORBIDDEN,
            Kind::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn is_validation_error(&self) -> bool {
        self.kind() == Kind::Validation
    }

    pub fn is_not_found_error(&self) -> bool {
        self.kind() == Kind::NotFound
    }

    pub fn is_conflict_error(&self) -> bool {
        self.kind() == Kind::Conflict
    }
}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        env_var_error(err)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        database_error(err)
    }
}

impl From<oso::OsoError> for Error {
    fn from(err: oso::OsoError) -> Self {
        policy_error(err)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self.kind() {
            Kind::Internal => "Internal Server Error",
            _ => self.message.as_str(),
        };

        let body = Json(json!({
            "code": self.code,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub fn env_var_error(err: env::VarError) -> Error {
    tracing::error!("environment variable error: {}", err);
    Error {
        code: 1,
        message: "environment variable error".into(),
    }
}

pub fn database_error<T: Debug>(err: T) -> Error {
    tracing::error!("database error: {:?}", err);
    Error {
        code: 2,
        message: "database error".into(),
    }
}

pub fn policy_error<T: Debug>(err: T) -> Error {
    tracing::error!("authorization policy error: {:?}", err);
    Error {
        code: 3,
        message: "authorization policy error".into(),
    }
}

pub fn unexpected_error() -> Error {
    Error {
        code: 5,
        message: "unexpected error".into(),
    }
}

pub fn invalid_input_error() -> Error {
    Error {
        code: 100,
        message: "invalid input".into(),
    }
}

pub fn invalid_coordinates_error() -> Error {
    Error {
        code: 101,
        message: "latitude must be within [-90, 90] and longitude within [-180, 180]".into(),
    }
}

pub fn invalid_price_error() -> Error {
    Error {
        code: 102,
        message: "price must be greater than zero".into(),
    }
}

pub fn invalid_config_error(name: &str) -> Error {
    Error {
        code: 103,
        message: format!("invalid value for {}", name),
    }
}

pub fn ride_not_found_error() -> Error {
    Error {
        code: 200,
        message: "ride not found".into(),
    }
}

pub fn bid_not_found_error() -> Error {
    Error {
        code: 201,
        message: "bid not found".into(),
    }
}

pub fn invalid_status_error() -> Error {
    Error {
        code: 300,
        message: "invalid status transition".into(),
    }
}

pub fn ride_not_bidding_error() -> Error {
    Error {
        code: 301,
        message: "ride is not open for bidding".into(),
    }
}

pub fn forbidden_error() -> Error {
    Error {
        code: 400,
        message: "forbidden".into(),
    }
}

pub fn not_passenger_error() -> Error {
    Error {
        code: 401,
        message: "caller is not the ride's passenger".into(),
    }
}

pub fn not_driver_error() -> Error {
    Error {
        code: 402,
        message: "caller is not the ride's driver".into(),
    }
}

pub fn unauthorized_error() -> Error {
    Error {
        code: 500,
        message: "unauthorized".into(),
    }
}

#[test]
fn status_table() {
    assert_eq!(invalid_coordinates_error().status(), StatusCode::BAD_REQUEST);
    assert_eq!(invalid_price_error().status(), StatusCode::BAD_REQUEST);
    assert_eq!(ride_not_found_error().status(), StatusCode::NOT_FOUND);
    assert_eq!(bid_not_found_error().status(), StatusCode::NOT_FOUND);
    assert_eq!(invalid_status_error().status(), StatusCode::CONFLICT);
    assert_eq!(ride_not_bidding_error().status(), StatusCode::CONFLICT);
    assert_eq!(not_passenger_error().status(), StatusCode::FORBIDDEN);
    assert_eq!(not_driver_error().status(), StatusCode::FORBIDDEN);
    assert_eq!(unauthorized_error().status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unexpected_error().status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn internal_errors_hide_their_message() {
    use axum::body::HttpBody;

    let response = database_error("connection refused").into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = tokio_test::block_on(response.into_body().data())
        .unwrap()
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(value["code"], 2);
    assert_eq!(value["error"], "Internal Server Error");
}
