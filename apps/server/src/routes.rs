//! Axum route handlers.

use crate::state::SharedContext;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};
use whale_alerts::{DbError, InboundUpdate, TelegramError};
use whale_core::{decode_batch, resolve_chain_header, Webhook, CHAIN_ID_HEADER};
use whale_webhooks::{
    balances_callback_url, create_webhooks, fetch_holders, load_token_universe,
    EnumerationError, PartialListingPolicy, ReconcileReport, Scope, SetupError, TokenListError,
};

/// Any handler failure. Always rendered as 500 with `{error}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid payload: {0}")]
    Payload(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Telegram(#[from] TelegramError),
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    TokenList(#[from] TokenListError),
    #[error(transparent)]
    Enumeration(#[from] EnumerationError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self, "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(ctx: SharedContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/balances", post(balances))
        .route("/telegram/webhook", post(telegram_webhook))
        .route("/setup/fetch-holders", post(setup_fetch_holders))
        .route("/setup/create-webhooks", post(setup_create_webhooks))
        .route("/setup/view-webhooks", get(view_webhooks))
        .route("/setup/pause-webhooks", post(pause_webhooks))
        .route("/setup/resume-webhooks", post(resume_webhooks))
        .route("/setup/resume-local-webhooks", post(resume_local_webhooks))
        .with_state(ctx)
}

// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

#[derive(Deserialize)]
struct BalancesPayload {
    #[serde(default)]
    balance_changes: Vec<Value>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct BalancesResponse {
    pub ok: bool,
    pub processed: usize,
}

// POST /balances
pub async fn balances(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<BalancesResponse> {
    let payload: BalancesPayload =
        serde_json::from_slice(&body).map_err(|e| ApiError::Payload(e.to_string()))?;

    let header = headers.get(CHAIN_ID_HEADER).and_then(|v| v.to_str().ok());
    let (chain_id, defaulted) = resolve_chain_header(header);
    if defaulted {
        warn!(header = ?header, chain_id = %chain_id, "Missing or invalid chain id header, assuming Ethereum");
    }

    let batch = decode_batch(payload.balance_changes);
    let report = ctx.pipeline.ingest(&batch.events, chain_id).await;

    Ok(Json(BalancesResponse {
        ok: true,
        processed: report.processed,
    }))
}

// POST /telegram/webhook
pub async fn telegram_webhook(
    State(ctx): State<SharedContext>,
    body: Bytes,
) -> ApiResult<Value> {
    let update: InboundUpdate =
        serde_json::from_slice(&body).map_err(|e| ApiError::Payload(e.to_string()))?;
    ctx.commands.handle_update(&update, ctx.chat.as_ref()).await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FetchHoldersResponse {
    pub ok: bool,
    pub total_holders: usize,
    pub tokens_processed: usize,
    pub unsupported_chain: usize,
    pub failed: usize,
}

// POST /setup/fetch-holders
pub async fn setup_fetch_holders(
    State(ctx): State<SharedContext>,
) -> ApiResult<FetchHoldersResponse> {
    let tokens = load_token_universe(&ctx.config.tokens_csv)?;
    let report = fetch_holders(
        &tokens,
        ctx.holders.as_ref(),
        &ctx.db,
        ctx.upstream_limiter.as_ref(),
        ctx.config.holders_per_token,
    )
    .await?;

    Ok(Json(FetchHoldersResponse {
        ok: true,
        total_holders: report.total_holders,
        tokens_processed: report.tokens_processed,
        unsupported_chain: report.unsupported_chain,
        failed: report.failed,
    }))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebhooksResponse {
    pub ok: bool,
    pub webhooks_created: usize,
    pub webhook_ids: Vec<String>,
    pub already_registered: usize,
    pub failed: usize,
}

// POST /setup/create-webhooks
pub async fn setup_create_webhooks(
    State(ctx): State<SharedContext>,
) -> ApiResult<CreateWebhooksResponse> {
    let callback = balances_callback_url(&ctx.config.webhook_base_url);
    let report = create_webhooks(
        &ctx.db,
        ctx.registry.as_ref(),
        ctx.upstream_limiter.as_ref(),
        &callback,
    )
    .await?;

    Ok(Json(CreateWebhooksResponse {
        ok: true,
        webhooks_created: report.webhooks_created,
        webhook_ids: report.webhook_ids,
        already_registered: report.already_registered,
        failed: report.failed,
    }))
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ViewWebhooksResponse {
    pub ok: bool,
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    /// False when the listing may be partial.
    pub complete: bool,
    pub termination: String,
    pub webhooks: Vec<Webhook>,
}

// GET /setup/view-webhooks
pub async fn view_webhooks(State(ctx): State<SharedContext>) -> ApiResult<ViewWebhooksResponse> {
    let listing = ctx
        .enumerator
        .enumerate(ctx.registry.as_ref(), PartialListingPolicy::BestEffort)
        .await?;
    let active = listing.active_count();
    let total = listing.webhooks.len();

    Ok(Json(ViewWebhooksResponse {
        ok: true,
        total,
        active,
        inactive: total - active,
        complete: listing.termination.is_complete(),
        termination: listing.termination.to_string(),
        webhooks: listing.webhooks,
    }))
}

async fn lifecycle(
    ctx: &SharedContext,
    target: bool,
    scope: Scope,
) -> Result<ReconcileReport, ApiError> {
    let report = ctx.reconciler.set_all_active(target, scope).await?;
    info!(target, ?scope, changed = report.changed, "Lifecycle request handled");
    Ok(report)
}

// POST /setup/pause-webhooks
pub async fn pause_webhooks(State(ctx): State<SharedContext>) -> ApiResult<Value> {
    let report = lifecycle(&ctx, false, Scope::AllRemote).await?;
    Ok(Json(json!({
        "ok": true,
        "paused": report.changed,
        "skipped": report.skipped,
        "failed": report.failed,
        "mirrorFailed": report.mirror_failed,
        "total": report.total,
    })))
}

// POST /setup/resume-webhooks
pub async fn resume_webhooks(State(ctx): State<SharedContext>) -> ApiResult<Value> {
    let report = lifecycle(&ctx, true, Scope::AllRemote).await?;
    Ok(Json(json!({
        "ok": true,
        "resumed": report.changed,
        "skipped": report.skipped,
        "failed": report.failed,
        "mirrorFailed": report.mirror_failed,
        "total": report.total,
    })))
}

// POST /setup/resume-local-webhooks
pub async fn resume_local_webhooks(State(ctx): State<SharedContext>) -> ApiResult<Value> {
    let report = lifecycle(&ctx, true, Scope::LocalOnly).await?;
    Ok(Json(json!({
        "ok": true,
        "resumed": report.changed,
        "failed": report.failed,
        "mirrorFailed": report.mirror_failed,
        "total": report.total,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::{AppContext, Collaborators};
    use axum::http::HeaderValue;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use whale_alerts::{Database, RecordingSink};
    use whale_core::{ChainId, HolderRecord, Unlimited};
    use whale_webhooks::MockRegistry;

    fn config() -> AppConfig {
        AppConfig::from_lookup(|key| {
            let value = match key {
                "SIM_API_KEY" => "k",
                "TELEGRAM_BOT_TOKEN" => "t",
                "WEBHOOK_BASE_URL" => "https://whales.example.com",
                "DATABASE_URL" => "sqlite::memory:",
                "TOKENS_CSV" => "/nonexistent/tokens.csv",
                _ => return None,
            };
            Some(value.to_string())
        })
        .unwrap()
    }

    async fn context(
        registry: MockRegistry,
    ) -> (SharedContext, Arc<RecordingSink>, Arc<MockRegistry>) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let sink = Arc::new(RecordingSink::new());
        let registry = Arc::new(registry);
        let ctx = AppContext::from_parts(
            config(),
            db,
            Collaborators {
                chat: sink.clone(),
                registry: registry.clone(),
                holders: registry.clone(),
                upstream_limiter: Arc::new(Unlimited),
                chat_limiter: Arc::new(Unlimited),
            },
        );
        (Arc::new(ctx), sink, registry)
    }

    fn webhook(id: &str, token: &str, active: bool) -> Webhook {
        Webhook {
            id: id.into(),
            token_address: token.into(),
            chain_id: ChainId(1),
            active,
        }
    }

    #[tokio::test]
    async fn test_health() {
        assert_eq!(health().await.0, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_balances_alerts_subscribers() {
        let (ctx, sink, _) = context(MockRegistry::new()).await;
        ctx.db.add_subscriber("7").await.unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(CHAIN_ID_HEADER, HeaderValue::from_static("8453"));
        let body = json!({
            "balance_changes": [
                { "transaction_hash": "0x1", "direction": "in", "value_delta_usd": 500.0,
                  "amount_delta": "5000000", "asset": { "symbol": "USDC", "decimals": 6 },
                  "subscribed_address": "0x1111111111111111111111111111111111111111" },
                { "transaction_hash": "0x1", "direction": "in", "value_delta_usd": 500.0 },
                { "transaction_hash": "0x2", "value_delta_usd": 1.0 }
            ]
        });

        let response = balances(State(ctx), headers, Bytes::from(body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.0, BalancesResponse { ok: true, processed: 2 });

        let messages = sink.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.contains("https://basescan.org/tx/0x1"));
    }

    #[tokio::test]
    async fn test_balances_without_chain_header_uses_ethereum() {
        let (ctx, sink, _) = context(MockRegistry::new()).await;
        ctx.db.add_subscriber("7").await.unwrap();

        let body = json!({
            "balance_changes": [
                { "transaction_hash": "0x9", "direction": "out", "value_delta_usd": 150000,
                  "amount_delta": "1", "asset": { "symbol": "FOO", "decimals": 0 },
                  "subscribed_address": "0x1111111111111111111111111111111111111111" }
            ]
        });
        let response = balances(State(ctx), HeaderMap::new(), Bytes::from(body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.0.processed, 1);
        assert!(sink.messages()[0].1.contains("https://etherscan.io/tx/0x9"));
    }

    #[tokio::test]
    async fn test_balances_rejects_non_json() {
        let (ctx, _, _) = context(MockRegistry::new()).await;
        let result = balances(State(ctx), HeaderMap::new(), Bytes::from_static(b"nope")).await;
        let response = result.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_telegram_subscribe() {
        let (ctx, sink, _) = context(MockRegistry::new()).await;
        let body = json!({
            "update_id": 1,
            "message": { "message_id": 1, "chat": { "id": 42, "type": "private" }, "text": "/start" }
        });

        let response = telegram_webhook(State(ctx.clone()), Bytes::from(body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.0, json!({ "ok": true }));
        assert_eq!(ctx.db.count_subscribers().await.unwrap(), 1);
        assert_eq!(sink.messages()[0].0, "42");
    }

    #[tokio::test]
    async fn test_fetch_holders_missing_file_is_500() {
        let (ctx, _, _) = context(MockRegistry::new()).await;
        let err = setup_fetch_holders(State(ctx)).await.unwrap_err();
        assert!(matches!(err, ApiError::TokenList(_)));
    }

    #[tokio::test]
    async fn test_create_then_view_webhooks() {
        let (ctx, _, registry) = context(MockRegistry::new()).await;
        ctx.db
            .upsert_holder(&HolderRecord::new("0xaaa", ChainId(1), "AAA", vec!["0x1".into()]))
            .await
            .unwrap();

        let created = setup_create_webhooks(State(ctx.clone())).await.unwrap();
        assert_eq!(created.0.webhooks_created, 1);
        assert_eq!(created.0.webhook_ids, vec!["MOCK_1"]);
        assert_eq!(registry.webhooks().len(), 1);

        let view = view_webhooks(State(ctx)).await.unwrap();
        assert_eq!(view.0.total, 1);
        assert_eq!(view.0.active, 1);
        assert!(view.0.complete);
        assert_eq!(view.0.termination, "lastPage");
    }

    #[tokio::test]
    async fn test_pause_reports_mirror_failures() {
        let remote = vec![webhook("a", "0xaaa", true)];
        let (ctx, _, registry) = context(MockRegistry::with_webhooks(remote)).await;
        ctx.db.close().await;

        let paused = pause_webhooks(State(ctx)).await.unwrap();
        assert_eq!(paused.0["paused"], 1);
        assert_eq!(paused.0["mirrorFailed"], 1);
        assert!(!registry.webhook("a").unwrap().active);
    }

    #[tokio::test]
    async fn test_pause_then_resume_local() {
        let remote = vec![webhook("a", "0xaaa", true), webhook("b", "0xbbb", false)];
        let (ctx, _, registry) = context(MockRegistry::with_webhooks(remote.clone())).await;
        ctx.db.insert_webhook(&remote[0]).await.unwrap();

        let paused = pause_webhooks(State(ctx.clone())).await.unwrap();
        assert_eq!(
            paused.0,
            json!({
                "ok": true, "paused": 1, "skipped": 1, "failed": 0, "mirrorFailed": 0, "total": 2
            })
        );

        let resumed = resume_local_webhooks(State(ctx.clone())).await.unwrap();
        assert_eq!(
            resumed.0,
            json!({ "ok": true, "resumed": 1, "failed": 0, "mirrorFailed": 0, "total": 1 })
        );
        assert!(registry.webhook("a").unwrap().active);
        assert!(!registry.webhook("b").unwrap().active);

        let resumed = resume_webhooks(State(ctx)).await.unwrap();
        assert_eq!(
            resumed.0,
            json!({
                "ok": true, "resumed": 1, "skipped": 1, "failed": 0, "mirrorFailed": 0, "total": 2
            })
        );
    }
}
