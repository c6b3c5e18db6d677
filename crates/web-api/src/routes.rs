use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use validator::Validate;

use application::{ListMessagesRequest, MessageDto, ParticipantDto, SendMessageRequest};

use crate::{
    error::ApiError,
    extract::{caller, ValidatedJson},
    state::AppState,
};

#[derive(Debug, Deserialize, Validate)]
struct JoinPayload {
    #[validate(length(min = 1))]
    name: String,
}

#[derive(Debug, Deserialize, Validate)]
struct SendMessagePayload {
    #[validate(length(min = 1))]
    to: String,
    #[validate(length(min = 1))]
    text: String,
    // 取值由领域层校验，返回 INVALID_MESSAGE_TYPE
    #[serde(rename = "type")]
    message_type: String,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    // 保留原始文本，`abc`、`0` 之类的值交给领域层拒绝
    limit: Option<String>,
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/participants", post(join).get(list_participants))
        .route("/messages", post(send_message).get(list_messages))
        .route("/status", post(heartbeat))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "忽略无效的 CORS 来源");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn join(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<JoinPayload>,
) -> Result<(StatusCode, Json<ParticipantDto>), ApiError> {
    let participant = state.chat_service.join(&payload.name).await?;
    Ok((StatusCode::CREATED, Json(ParticipantDto::from(&participant))))
}

async fn list_participants(
    State(state): State<AppState>,
) -> Result<Json<Vec<ParticipantDto>>, ApiError> {
    let participants = state.chat_service.list_participants().await?;
    Ok(Json(participants.iter().map(ParticipantDto::from).collect()))
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<SendMessagePayload>,
) -> Result<(StatusCode, Json<MessageDto>), ApiError> {
    // 缺少 User 头时发送者为空，由应用层按未登记处理
    let message = state
        .chat_service
        .send(SendMessageRequest {
            from: caller(&headers).unwrap_or_default(),
            to: payload.to,
            text: payload.text,
            message_type: payload.message_type,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(MessageDto::from(&message))))
}

async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let messages = state
        .chat_service
        .list_messages(ListMessagesRequest {
            viewer: caller(&headers),
            limit: query.limit,
        })
        .await?;

    Ok(Json(messages.iter().map(MessageDto::from).collect()))
}

async fn heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    state
        .chat_service
        .heartbeat(&caller(&headers).unwrap_or_default())
        .await?;
    Ok(StatusCode::OK)
}
