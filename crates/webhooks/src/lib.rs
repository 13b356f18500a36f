//! Upstream webhook management: registry client, defensive enumeration,
//! pause/resume reconciliation and setup flows.

pub mod client;
pub mod error;
pub mod pagination;
pub mod reconcile;
pub mod setup;
pub mod tokens;

pub use client::{
    HolderSource, MockRegistry, SimClient, SimClientConfig, WebhookRegistry, API_KEY_HEADER,
};
pub use error::{SetupError, UpstreamError, UpstreamResult};
pub use pagination::{
    EnumerationError, Enumerator, EnumeratorConfig, Listing, PartialListingPolicy, Termination,
    DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE,
};
pub use reconcile::{ReconcileReport, Reconciler, Scope};
pub use setup::{
    balances_callback_url, create_webhooks, fetch_holders, CreateWebhooksReport,
    FetchHoldersReport,
};
pub use tokens::{load_token_universe, parse_token_universe, TokenListError, TokenListing};
