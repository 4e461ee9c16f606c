//! # API REST
//!
//! REST API implementation for flatshop.
//!
//! Handles:
//! - HTTP endpoints with axum, mounted under [`API_PREFIX`]
//! - OpenAPI/Swagger documentation (`/swagger-ui`, `/api-docs/openapi.json`)
//! - REST-specific concerns (JSON envelopes, CPF normalisation, CORS)
//!
//! Every endpoint answers `200 OK` with a JSON envelope; failures are reported in the body via
//! `success: false` and `err`. Endpoints that need a login check `cpf` and `session` first and
//! answer `{success: false, err, logged: false}` when the check fails.

#![warn(rust_2018_idioms)]

mod types;

pub use types::*;

use axum::{
    extract::{Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use flatshop_core::{DataService, StoreError};
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Path prefix for every API route.
pub const API_PREFIX: &str = "/api/v1";

/// Application state shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DataService>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        status,
        user_exists,
        create_user,
        resubmit_confirmation,
        confirm_sign_up,
        change_password,
        login,
        session,
        get_address,
        post_address,
        get_order,
        post_order,
    ),
    components(schemas(
        StatusRes,
        AckRes,
        AuthFailureRes,
        UserExistsRes,
        CreateUserReq,
        CreateUserRes,
        CpfReq,
        ChangePasswordReq,
        LoginReq,
        LoginRes,
        AddressInput,
        AddressReq,
        AddressRes,
        OrderRes,
        PlaceOrderReq,
        PlaceOrderRes,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router around `service`.
pub fn router(service: Arc<DataService>) -> Router {
    let api = Router::new()
        .route("/status", get(status))
        .route("/user-exists", get(user_exists))
        .route("/user", post(create_user))
        .route("/sign-up-resubmit", post(resubmit_confirmation))
        .route("/sign-up/confirm", get(confirm_sign_up))
        .route("/change-password", post(change_password))
        .route("/login", post(login))
        .route("/session", get(session))
        .route("/address", get(get_address).post(post_address))
        .route("/order", get(get_order).post(post_order));

    Router::new()
        .nest(API_PREFIX, api)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(AppState { service })
}

/// Renders a service error as the `err` value of an envelope.
///
/// Storage failures are logged here and reported to the client without detail.
fn error_value(err: &StoreError) -> Value {
    match err {
        StoreError::Field { field, message } => {
            let mut map = Map::new();
            map.insert((*field).to_owned(), Value::String(message.clone()));
            Value::Object(map)
        }
        e if e.is_user_facing() => Value::String(e.to_string()),
        e => {
            tracing::error!(error = %e, "storage error while handling request");
            Value::String("internal storage error".into())
        }
    }
}

fn ack(result: Result<(), StoreError>) -> Json<AckRes> {
    Json(AckRes {
        success: result.is_ok(),
        err: result.err().as_ref().map(error_value),
    })
}

/// Checks the caller's session, producing the logged-out envelope on failure.
async fn authorise(state: &AppState, cpf: &str, session: &str) -> Result<(), Json<AuthFailureRes>> {
    state.service.validate(cpf, session).await.map_err(|e| {
        Json(AuthFailureRes {
            success: false,
            err: error_value(&e),
            logged: false,
        })
    })
}

/// Credentials from the query string, falling back to the request body.
fn credentials(query: &SessionQuery, cpf: Option<&Value>, session: Option<&str>) -> (String, String) {
    let cpf = match query.cpf.as_deref() {
        Some(q) if !q.is_empty() => cpf_from_query(Some(q)),
        _ => cpf_from_value(cpf),
    };
    let session = query
        .session
        .as_deref()
        .filter(|s| !s.is_empty())
        .or(session)
        .unwrap_or_default()
        .to_owned();
    (cpf, session)
}

#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses(
        (status = 200, description = "Service is up", body = StatusRes)
    )
)]
/// Liveness check.
#[axum::debug_handler]
async fn status() -> Json<StatusRes> {
    Json(StatusRes {
        status: "ok".into(),
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/user-exists",
    params(CpfQuery),
    responses(
        (status = 200, description = "Whether the CPF has an account", body = UserExistsRes)
    )
)]
/// Reports whether a CPF has an account and whether its email is confirmed.
#[axum::debug_handler]
async fn user_exists(
    State(state): State<AppState>,
    Query(query): Query<CpfQuery>,
) -> Json<UserExistsRes> {
    let cpf = cpf_from_query(query.cpf.as_deref());
    let res = match state.service.user_exists(&cpf).await {
        Ok(status) => UserExistsRes {
            success: true,
            err: None,
            exists: status.exists,
            registered: status.registered,
        },
        Err(e) => UserExistsRes {
            success: false,
            err: Some(error_value(&e)),
            exists: false,
            registered: false,
        },
    };
    Json(res)
}

#[utoipa::path(
    post,
    path = "/api/v1/user",
    request_body = CreateUserReq,
    responses(
        (status = 200, description = "Sign-up result", body = CreateUserRes)
    )
)]
/// Sign up a new user
///
/// Stores the user and sends the confirmation email. The CPF may be formatted
/// (`529.982.247-25`) or sent as a number; it is reduced to digits before use.
///
/// # Returns
/// * `Json<CreateUserRes>` - `success: true` with the normalised CPF, or a field-keyed `err`
#[axum::debug_handler]
async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserReq>,
) -> Json<CreateUserRes> {
    let cpf = cpf_from_value(req.cpf.as_ref());
    let result = state
        .service
        .create_user(
            req.name.as_deref().unwrap_or_default(),
            &cpf,
            req.password.as_deref().unwrap_or_default(),
            req.email.as_deref().unwrap_or_default(),
        )
        .await;

    Json(CreateUserRes {
        success: result.is_ok(),
        err: result.err().as_ref().map(error_value),
        cpf,
        email: req.email,
    })
}

#[utoipa::path(
    post,
    path = "/api/v1/sign-up-resubmit",
    request_body = CpfReq,
    responses(
        (status = 200, description = "Confirmation email queued again", body = AckRes)
    )
)]
/// Sends the sign-up confirmation email again.
#[axum::debug_handler]
async fn resubmit_confirmation(
    State(state): State<AppState>,
    Json(req): Json<CpfReq>,
) -> Json<AckRes> {
    let cpf = cpf_from_value(req.cpf.as_ref());
    ack(state.service.resend_confirmation(&cpf).await)
}

#[utoipa::path(
    get,
    path = "/api/v1/sign-up/confirm",
    params(ConfirmQuery),
    responses(
        (status = 200, description = "Email confirmation result", body = AckRes)
    )
)]
/// Target of the link in the confirmation email.
#[axum::debug_handler]
async fn confirm_sign_up(
    State(state): State<AppState>,
    Query(query): Query<ConfirmQuery>,
) -> Json<AckRes> {
    let cpf = cpf_from_query(query.cpf.as_deref());
    let code = query.confirm.unwrap_or_default();
    ack(state.service.confirm_email(&cpf, &code).await)
}

#[utoipa::path(
    post,
    path = "/api/v1/change-password",
    request_body = ChangePasswordReq,
    responses(
        (status = 200, description = "Password change result", body = AckRes)
    )
)]
#[axum::debug_handler]
async fn change_password(
    State(state): State<AppState>,
    Json(req): Json<ChangePasswordReq>,
) -> Json<AckRes> {
    let cpf = cpf_from_value(req.cpf.as_ref());
    ack(state
        .service
        .change_password(
            &cpf,
            req.old_pass.as_deref().unwrap_or_default(),
            req.new_pass.as_deref().unwrap_or_default(),
        )
        .await)
}

#[utoipa::path(
    post,
    path = "/api/v1/login",
    request_body = LoginReq,
    responses(
        (status = 200, description = "Login result with session hash", body = LoginRes)
    )
)]
/// Log in
///
/// Checks the password and issues a new session, replacing any previous one. The returned
/// user carries only `name` and `cpf` until the email address has been confirmed.
///
/// # Returns
/// * `Json<LoginRes>` - the session hash and user view, or `err` keyed by `cpf` or `pass`
#[axum::debug_handler]
async fn login(State(state): State<AppState>, Json(req): Json<LoginReq>) -> Json<LoginRes> {
    let cpf = cpf_from_value(req.cpf.as_ref());
    let password = req.password.unwrap_or_default();

    let res = match state.service.login(&cpf, &password).await {
        Ok(login) => LoginRes {
            success: true,
            err: None,
            cpf,
            session: Some(login.hash),
            user: Some(login.user),
        },
        Err(e) => LoginRes {
            success: false,
            err: Some(error_value(&e)),
            cpf,
            session: None,
            user: None,
        },
    };
    Json(res)
}

#[utoipa::path(
    get,
    path = "/api/v1/session",
    params(SessionQuery),
    responses(
        (status = 200, description = "Session check result; `logged: false` when invalid", body = AckRes)
    )
)]
/// Checks whether a session is still valid.
#[axum::debug_handler]
async fn session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<AckRes>, Json<AuthFailureRes>> {
    let (cpf, session) = credentials(&query, None, None);
    authorise(&state, &cpf, &session).await?;
    Ok(ack(Ok(())))
}

#[utoipa::path(
    get,
    path = "/api/v1/address",
    params(SessionQuery),
    responses(
        (status = 200, description = "The caller's registered address", body = AddressRes)
    )
)]
#[axum::debug_handler]
async fn get_address(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<AddressRes>, Json<AuthFailureRes>> {
    let (cpf, session) = credentials(&query, None, None);
    authorise(&state, &cpf, &session).await?;

    let res = match state.service.address_for(&cpf).await {
        Ok(address) => AddressRes {
            success: true,
            err: None,
            address: Some(address),
            logged: true,
        },
        Err(e) => AddressRes {
            success: false,
            err: Some(error_value(&e)),
            address: None,
            logged: true,
        },
    };
    Ok(Json(res))
}

#[utoipa::path(
    post,
    path = "/api/v1/address",
    params(SessionQuery),
    request_body = AddressReq,
    responses(
        (status = 200, description = "Address stored and linked", body = AddressRes)
    )
)]
/// Set the caller's address
///
/// `line2` is optional; every other field is required. Identical addresses are stored once
/// and shared between users.
#[axum::debug_handler]
async fn post_address(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    Json(req): Json<AddressReq>,
) -> Result<Json<AddressRes>, Json<AuthFailureRes>> {
    let (cpf, session) = credentials(&query, req.cpf.as_ref(), req.session.as_deref());
    authorise(&state, &cpf, &session).await?;

    let address = req.address.map(Into::into).unwrap_or_default();
    let result = state.service.set_address(&cpf, address).await;
    Ok(Json(AddressRes {
        success: result.is_ok(),
        err: result.err().as_ref().map(error_value),
        address: None,
        logged: true,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/order",
    params(OrderQuery),
    responses(
        (status = 200, description = "One of the caller's orders", body = OrderRes)
    )
)]
/// Fetches one of the caller's orders by id.
///
/// Orders placed by another user are reported as not found.
#[axum::debug_handler]
async fn get_order(
    State(state): State<AppState>,
    Query(query): Query<OrderQuery>,
) -> Result<Json<OrderRes>, Json<AuthFailureRes>> {
    let credentials_query = SessionQuery {
        cpf: query.cpf,
        session: query.session,
    };
    let (cpf, session) = credentials(&credentials_query, None, None);
    authorise(&state, &cpf, &session).await?;

    let raw_id = query.id.unwrap_or_default();
    let result = match raw_id.trim().parse::<u64>() {
        Ok(id) => match state.service.order(id).await {
            Ok(order) if order.cpf == cpf => Ok(order),
            Ok(_) => Err(StoreError::NotFound(format!("order {id} not found"))),
            Err(e) => Err(e),
        },
        Err(_) => Err(StoreError::InvalidInput(format!("invalid order id '{raw_id}'"))),
    };

    let res = match result {
        Ok(order) => OrderRes {
            success: true,
            err: None,
            order: Some(order),
            logged: true,
        },
        Err(e) => OrderRes {
            success: false,
            err: Some(error_value(&e)),
            order: None,
            logged: true,
        },
    };
    Ok(Json(res))
}

#[utoipa::path(
    post,
    path = "/api/v1/order",
    params(SessionQuery),
    request_body = PlaceOrderReq,
    responses(
        (status = 200, description = "Order placed", body = PlaceOrderRes)
    )
)]
/// Place an order
///
/// Stores the delivery address (if new), records the order and links it to the caller.
///
/// # Returns
/// * `Json<PlaceOrderRes>` - the new order id, `YYMMDD` followed by the serial of the day
#[axum::debug_handler]
async fn post_order(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    Json(req): Json<PlaceOrderReq>,
) -> Result<Json<PlaceOrderRes>, Json<AuthFailureRes>> {
    let (cpf, session) = credentials(&query, req.cpf.as_ref(), req.session.as_deref());
    authorise(&state, &cpf, &session).await?;

    let res = match state
        .service
        .place_order(&cpf, req.products, req.address.map(Into::into))
        .await
    {
        Ok(id) => PlaceOrderRes {
            success: true,
            err: None,
            id: Some(id),
            logged: true,
        },
        Err(e) => PlaceOrderRes {
            success: false,
            err: Some(error_value(&e)),
            id: None,
            logged: true,
        },
    };
    Ok(Json(res))
}
