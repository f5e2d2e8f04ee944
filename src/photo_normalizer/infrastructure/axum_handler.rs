use crate::application::error::ApplicationError; // Added for handler return types
use axum::{
    extract::{DefaultBodyLimit, Json, Multipart, State},
    http::header::HeaderName,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use super::data_uri::parse_data_uri;
use crate::application::avatar_editor::AvatarEditor;
use crate::application::normalizer_service::NormalizerService;
use crate::application::post_composer::{AttachOutcome, PostComposer};
use crate::domain::budget::EncodingBudget;
use crate::domain::document_store::DocumentStore;
use crate::domain::image::{data_uri_payload_len, NormalizedImage, RawImageInput};
use crate::domain::tweet::{Author, TweetText};

// 元画像はスマホの写真を想定して大きめに取る
pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub normalizer: Arc<NormalizerService>,
    pub store: Arc<dyn DocumentStore + Send + Sync>,
    pub post_budget: EncodingBudget,
    pub avatar_budget: EncodingBudget,
    pub shutdown: CancellationToken,
}

impl AppState {
    // リクエストごとに新しいフォーム状態を作る
    fn post_composer(&self) -> PostComposer {
        PostComposer::new(self.normalizer.clone(), self.store.clone(), self.post_budget)
    }

    fn avatar_editor(&self) -> AvatarEditor {
        AvatarEditor::new(self.normalizer.clone(), self.store.clone(), self.avatar_budget)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(vec![HeaderName::from_static("content-type")]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/normalize", post(normalize_upload_handler))
        .route("/normalize/data-uri", post(normalize_data_uri_handler))
        .route("/tweets", post(post_tweet_handler))
        .route("/profiles/avatar", post(update_avatar_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize, Debug)]
pub struct NormalizedImageResponse {
    #[serde(rename = "dataUri")]
    pub data_uri: String,
    #[serde(rename = "mimeType")]
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "encodedByteSize")]
    pub encoded_byte_size: usize,
    pub quality: f32,
}

impl From<&NormalizedImage> for NormalizedImageResponse {
    fn from(image: &NormalizedImage) -> Self {
        Self {
            data_uri: image.to_data_uri(),
            mime_type: image.mime_type,
            width: image.width,
            height: image.height,
            encoded_byte_size: image.encoded_byte_size,
            quality: image.quality.as_f32(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct NormalizeDataUriParams {
    #[serde(rename = "dataUri")]
    pub data_uri: String,
    #[serde(rename = "maxBytes")]
    pub max_bytes: Option<usize>,
    #[serde(rename = "maxDimensionPx")]
    pub max_dimension_px: Option<u32>,
}

#[derive(Default)]
struct UploadForm {
    file: Option<RawImageInput>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    fn require_text(&self, name: &str) -> Result<&str, ApplicationError> {
        self.text(name)
            .ok_or_else(|| ApplicationError::InvalidRequest(format!("missing field: {}", name)))
    }

    fn number<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>, ApplicationError> {
        self.text(name)
            .map(|raw| {
                raw.trim()
                    .parse()
                    .map_err(|_| ApplicationError::InvalidRequest(format!("{} is not a number: {}", name, raw)))
            })
            .transpose()
    }
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApplicationError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(|e| ApplicationError::InvalidRequest(format!("Multipart error: {}", e)))? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let mime_type = field.content_type().unwrap_or("application/octet-stream").to_string();
            let data = field.bytes().await.map_err(|e| ApplicationError::InvalidRequest(format!("Failed to read bytes from multipart field: {}", e)))?;
            debug!(%mime_type, bytes = data.len(), "received upload");
            form.file = Some(RawImageInput::new(data.to_vec(), mime_type));
        } else {
            let value = field.text().await.map_err(|e| ApplicationError::InvalidRequest(format!("Failed to read multipart field {}: {}", name, e)))?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

// 指定がなければ投稿用の予算を使う
fn budget_with_overrides(
    default: EncodingBudget,
    max_bytes: Option<usize>,
    max_dimension_px: Option<u32>,
) -> Result<EncodingBudget, ApplicationError> {
    Ok(EncodingBudget::new(
        max_bytes.unwrap_or(default.max_bytes()),
        max_dimension_px.unwrap_or(default.max_dimension_px()),
    )?)
}

pub async fn health_handler() -> &'static str {
    "ok"
}

pub async fn normalize_upload_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<NormalizedImageResponse>, ApplicationError> {
    let form = read_form(multipart).await?;
    let budget = budget_with_overrides(
        state.post_budget,
        form.number("maxBytes")?,
        form.number("maxDimensionPx")?,
    )?;
    let input = form
        .file
        .ok_or_else(|| ApplicationError::InvalidRequest("missing field: file".to_string()))?;

    let image = state
        .normalizer
        .normalize(input, budget, &state.shutdown.child_token())
        .await?;
    Ok(Json(NormalizedImageResponse::from(&image)))
}

pub async fn normalize_data_uri_handler(
    State(state): State<Arc<AppState>>,
    Json(params): Json<NormalizeDataUriParams>,
) -> Result<Json<NormalizedImageResponse>, ApplicationError> {
    debug!(payload_bytes = ?data_uri_payload_len(&params.data_uri), "received data URI");
    let budget = budget_with_overrides(state.post_budget, params.max_bytes, params.max_dimension_px)?;
    let input = parse_data_uri(&params.data_uri)?;

    let image = state
        .normalizer
        .normalize(input, budget, &state.shutdown.child_token())
        .await?;
    Ok(Json(NormalizedImageResponse::from(&image)))
}

pub async fn post_tweet_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Value>, ApplicationError> {
    let form = read_form(multipart).await?;
    let author = Author::new(form.require_text("userId")?, form.text("username").map(str::to_string));
    let text = form.fields.get("tweet").cloned().unwrap_or_default();
    // 本文が不正なら画像の圧縮を始める前に断る
    TweetText::parse(&text)?;

    let composer = state.post_composer();
    if let Some(file) = form.file {
        // 確認ダイアログはクライアント側で済んでいる
        let outcome = composer
            .attach_photo(file, |_| true, &state.shutdown.child_token())
            .await?;
        debug!(?outcome, "photo attached");
        if outcome != AttachOutcome::Attached {
            return Err(ApplicationError::InvalidRequest("photo was not attached".to_string()));
        }
    }
    let id = composer.submit(&author, &text).await?;
    Ok(Json(json!({ "id": id })))
}

pub async fn update_avatar_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<NormalizedImageResponse>, ApplicationError> {
    let form = read_form(multipart).await?;
    let author = Author::new(form.require_text("userId")?, form.text("username").map(str::to_string));
    let input = form
        .file
        .ok_or_else(|| ApplicationError::InvalidRequest("missing field: file".to_string()))?;

    let image = state
        .avatar_editor()
        .update_avatar(&author, input, &state.shutdown.child_token())
        .await?;
    info!(user_id = %author.user_id, "avatar request served");
    Ok(Json(NormalizedImageResponse::from(&image)))
}
