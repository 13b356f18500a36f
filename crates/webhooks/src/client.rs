//! Upstream subscription API client.
//!
//! Two seams: [`WebhookRegistry`] for the webhook subscription registry and
//! [`HolderSource`] for the top-holder query. [`SimClient`] implements both
//! over HTTP; [`MockRegistry`] implements both in memory.

use crate::error::{UpstreamError, UpstreamResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use whale_core::{normalize_address, ChainId, NewWebhook, Webhook};

/// Header carrying the upstream API key.
pub const API_KEY_HEADER: &str = "X-Sim-Api-Key";

const WEBHOOKS_PATH: &str = "/beta/evm/subscriptions/webhooks";
const HOLDERS_PATH: &str = "/v1/evm/token-holders";

/// Trait for the remote webhook registry.
#[async_trait]
pub trait WebhookRegistry: Send + Sync {
    /// Register a webhook and return the id assigned by the registry.
    async fn create_webhook(&self, webhook: &NewWebhook) -> UpstreamResult<String>;

    /// Fetch one page of registered webhooks.
    async fn list_webhooks(&self, limit: usize, offset: usize) -> UpstreamResult<Vec<Webhook>>;

    /// Set the active flag of one webhook.
    async fn set_active(&self, id: &str, active: bool) -> UpstreamResult<()>;
}

/// Trait for the top-holder query.
#[async_trait]
pub trait HolderSource: Send + Sync {
    /// Largest holders of `token_address` on `chain_id`, largest first.
    async fn top_holders(
        &self,
        chain_id: ChainId,
        token_address: &str,
        limit: usize,
    ) -> UpstreamResult<Vec<String>>;
}

/// Configuration for [`SimClient`].
#[derive(Debug, Clone)]
pub struct SimClientConfig {
    pub base_url: String,
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl SimClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client for the upstream API.
///
/// Holds `gate` across every request, so at most one call is in flight no
/// matter how many handlers share the client.
pub struct SimClient {
    http: Client,
    base_url: String,
    api_key: String,
    gate: Mutex<()>,
}

#[derive(Serialize)]
struct CreateWebhookBody<'a> {
    name: &'a str,
    url: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    chain_ids: [u64; 1],
    addresses: &'a [String],
    token_address: &'a str,
}

#[derive(Deserialize)]
struct CreatedWebhook {
    id: String,
}

#[derive(Serialize)]
struct SetActiveBody {
    active: bool,
}

#[derive(Deserialize)]
struct RemoteWebhook {
    id: String,
    #[serde(default)]
    token_address: Option<String>,
    #[serde(default)]
    chain_ids: Vec<u64>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

impl From<RemoteWebhook> for Webhook {
    fn from(remote: RemoteWebhook) -> Self {
        Webhook {
            id: remote.id,
            token_address: remote
                .token_address
                .map(|a| normalize_address(&a))
                .unwrap_or_default(),
            chain_id: remote
                .chain_ids
                .first()
                .copied()
                .map(ChainId)
                .unwrap_or(ChainId::ETHEREUM),
            active: remote.active,
        }
    }
}

/// The registry has answered both with a bare array and with a wrapper
/// object.
#[derive(Deserialize)]
#[serde(untagged)]
enum WebhookPage {
    Wrapped {
        #[serde(default)]
        webhooks: Vec<RemoteWebhook>,
    },
    Bare(Vec<RemoteWebhook>),
}

impl WebhookPage {
    fn into_webhooks(self) -> Vec<Webhook> {
        let items = match self {
            WebhookPage::Wrapped { webhooks } => webhooks,
            WebhookPage::Bare(items) => items,
        };
        items.into_iter().map(Webhook::from).collect()
    }
}

#[derive(Deserialize)]
struct HoldersResponse {
    #[serde(default)]
    holders: Vec<RemoteHolder>,
}

#[derive(Deserialize)]
struct RemoteHolder {
    wallet_address: String,
}

impl SimClient {
    /// Create a new client.
    pub fn new(config: SimClientConfig) -> UpstreamResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UpstreamError::Transport(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            gate: Mutex::new(()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and return the response body. Non-2xx is an error.
    async fn call(&self, request: RequestBuilder) -> UpstreamResult<String> {
        let _gate = self.gate.lock().await;

        let response = request.header(API_KEY_HEADER, &self.api_key).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    fn decode<T: serde::de::DeserializeOwned>(body: &str) -> UpstreamResult<T> {
        serde_json::from_str(body).map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

#[async_trait]
impl WebhookRegistry for SimClient {
    async fn create_webhook(&self, webhook: &NewWebhook) -> UpstreamResult<String> {
        let body = CreateWebhookBody {
            name: &webhook.name,
            url: &webhook.url,
            kind: "balances",
            chain_ids: [webhook.chain_id.get()],
            addresses: &webhook.addresses,
            token_address: &webhook.token_address,
        };
        let response = self
            .call(self.http.post(self.url(WEBHOOKS_PATH)).json(&body))
            .await?;
        let created: CreatedWebhook = Self::decode(&response)?;
        debug!(id = %created.id, token = %webhook.token_address, "Webhook registered");
        Ok(created.id)
    }

    async fn list_webhooks(&self, limit: usize, offset: usize) -> UpstreamResult<Vec<Webhook>> {
        let request = self
            .http
            .get(self.url(WEBHOOKS_PATH))
            .query(&[("limit", limit), ("offset", offset)]);
        let response = self.call(request).await?;
        let page: WebhookPage = Self::decode(&response)?;
        Ok(page.into_webhooks())
    }

    async fn set_active(&self, id: &str, active: bool) -> UpstreamResult<()> {
        let url = self.url(&format!("{}/{}", WEBHOOKS_PATH, id));
        self.call(self.http.patch(url).json(&SetActiveBody { active }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl HolderSource for SimClient {
    async fn top_holders(
        &self,
        chain_id: ChainId,
        token_address: &str,
        limit: usize,
    ) -> UpstreamResult<Vec<String>> {
        let url = self.url(&format!("{}/{}/{}", HOLDERS_PATH, chain_id, token_address));
        let response = self
            .call(self.http.get(url).query(&[("limit", limit)]))
            .await?;
        let holders: HoldersResponse = Self::decode(&response)?;
        Ok(holders
            .holders
            .into_iter()
            .take(limit)
            .map(|h| normalize_address(&h.wallet_address))
            .collect())
    }
}

/// In-memory registry and holder source for tests.
#[derive(Default)]
pub struct MockRegistry {
    webhooks: StdMutex<Vec<Webhook>>,
    holders: HashMap<(ChainId, String), Vec<String>>,
    /// Return the first page for every offset.
    ignore_offset: bool,
    /// Ids whose `set_active` fails.
    failing_ids: HashSet<String>,
    /// Tokens whose holder query fails.
    failing_tokens: HashSet<String>,
    /// List calls beyond this many fail.
    fail_list_after: Option<usize>,
    list_calls: AtomicUsize,
    set_active_calls: AtomicUsize,
    id_counter: AtomicUsize,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with webhooks.
    pub fn with_webhooks(webhooks: Vec<Webhook>) -> Self {
        Self {
            webhooks: StdMutex::new(webhooks),
            ..Self::default()
        }
    }

    pub fn ignoring_offset(mut self) -> Self {
        self.ignore_offset = true;
        self
    }

    pub fn failing_ids(mut self, ids: &[&str]) -> Self {
        self.failing_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn failing_tokens(mut self, tokens: &[&str]) -> Self {
        self.failing_tokens = tokens.iter().map(|t| normalize_address(t)).collect();
        self
    }

    pub fn failing_list_after(mut self, pages: usize) -> Self {
        self.fail_list_after = Some(pages);
        self
    }

    pub fn with_holders(mut self, chain_id: ChainId, token: &str, holders: &[&str]) -> Self {
        self.holders.insert(
            (chain_id, normalize_address(token)),
            holders.iter().map(|h| h.to_string()).collect(),
        );
        self
    }

    /// Current remote state.
    pub fn webhooks(&self) -> Vec<Webhook> {
        self.webhooks.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn webhook(&self, id: &str) -> Option<Webhook> {
        self.webhooks().into_iter().find(|w| w.id == id)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn set_active_calls(&self) -> usize {
        self.set_active_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookRegistry for MockRegistry {
    async fn create_webhook(&self, webhook: &NewWebhook) -> UpstreamResult<String> {
        if self.failing_tokens.contains(&webhook.token_address) {
            return Err(UpstreamError::Status {
                status: 500,
                body: "mock failure".to_string(),
            });
        }

        let id = format!("MOCK_{}", self.id_counter.fetch_add(1, Ordering::SeqCst) + 1);
        if let Ok(mut webhooks) = self.webhooks.lock() {
            webhooks.push(Webhook {
                id: id.clone(),
                token_address: webhook.token_address.clone(),
                chain_id: webhook.chain_id,
                active: true,
            });
        }
        Ok(id)
    }

    async fn list_webhooks(&self, limit: usize, offset: usize) -> UpstreamResult<Vec<Webhook>> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list_after.is_some_and(|pages| call >= pages) {
            return Err(UpstreamError::Transport("mock connection reset".to_string()));
        }

        let offset = if self.ignore_offset { 0 } else { offset };
        Ok(self
            .webhooks()
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn set_active(&self, id: &str, active: bool) -> UpstreamResult<()> {
        self.set_active_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_ids.contains(id) {
            return Err(UpstreamError::Status {
                status: 503,
                body: "mock failure".to_string(),
            });
        }

        let mut webhooks = self
            .webhooks
            .lock()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        match webhooks.iter_mut().find(|w| w.id == id) {
            Some(webhook) => {
                webhook.active = active;
                Ok(())
            }
            None => Err(UpstreamError::NotFound(id.to_string())),
        }
    }
}

#[async_trait]
impl HolderSource for MockRegistry {
    async fn top_holders(
        &self,
        chain_id: ChainId,
        token_address: &str,
        limit: usize,
    ) -> UpstreamResult<Vec<String>> {
        let token = normalize_address(token_address);
        if self.failing_tokens.contains(&token) {
            return Err(UpstreamError::Transport("mock timeout".to_string()));
        }
        Ok(self
            .holders
            .get(&(chain_id, token))
            .map(|h| h.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn webhook(id: &str, active: bool) -> Webhook {
        Webhook {
            id: id.to_string(),
            token_address: "0xabc".to_string(),
            chain_id: ChainId::ETHEREUM,
            active,
        }
    }

    #[test]
    fn test_decode_wrapped_page() {
        let body = r#"{"webhooks":[{"id":"w1","token_address":"0xABC","chain_ids":[8453],"active":false,"url":"x"}]}"#;
        let page: WebhookPage = SimClient::decode(body).unwrap();
        assert_eq!(
            page.into_webhooks(),
            vec![Webhook {
                id: "w1".to_string(),
                token_address: "0xabc".to_string(),
                chain_id: ChainId(8453),
                active: false,
            }]
        );
    }

    #[test]
    fn test_decode_bare_page_defaults() {
        let page: WebhookPage = SimClient::decode(r#"[{"id":"w2"}]"#).unwrap();
        let webhooks = page.into_webhooks();
        assert_eq!(webhooks[0].chain_id, ChainId::ETHEREUM);
        assert!(webhooks[0].active);
        assert_eq!(webhooks[0].token_address, "");
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let result: UpstreamResult<WebhookPage> = SimClient::decode("<html>");
        assert!(matches!(result, Err(UpstreamError::Decode(_))));
    }

    #[test]
    fn test_create_body_shape() {
        let addresses = vec!["0x1".to_string()];
        let body = CreateWebhookBody {
            name: "FOO",
            url: "https://example.com/balances",
            kind: "balances",
            chain_ids: [1],
            addresses: &addresses,
            token_address: "0xabc",
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["type"], "balances");
        assert_eq!(value["chain_ids"], serde_json::json!([1]));
    }

    #[test]
    fn test_client_trims_base_url() {
        let client = SimClient::new(SimClientConfig::new("https://api.sim.dune.com/", "k")).unwrap();
        assert_eq!(
            client.url(WEBHOOKS_PATH),
            "https://api.sim.dune.com/beta/evm/subscriptions/webhooks"
        );
    }

    #[tokio::test]
    async fn test_mock_pages_and_ignore_offset() {
        let hooks = vec![webhook("a", true), webhook("b", true), webhook("c", true)];
        let registry = MockRegistry::with_webhooks(hooks.clone());
        assert_eq!(registry.list_webhooks(2, 2).await.unwrap(), vec![hooks[2].clone()]);

        let registry = MockRegistry::with_webhooks(hooks.clone()).ignoring_offset();
        assert_eq!(registry.list_webhooks(2, 2).await.unwrap(), hooks[..2].to_vec());
        assert_eq!(registry.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_set_active() {
        let registry = MockRegistry::with_webhooks(vec![webhook("a", true), webhook("b", true)])
            .failing_ids(&["b"]);

        registry.set_active("a", false).await.unwrap();
        assert!(!registry.webhook("a").unwrap().active);
        assert!(registry.set_active("b", false).await.is_err());
        assert!(matches!(
            registry.set_active("zzz", false).await,
            Err(UpstreamError::NotFound(_))
        ));
    }
}
