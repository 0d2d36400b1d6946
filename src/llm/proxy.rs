//! Proxy: the request lifecycle glueing Router, trackers,
//! adapters, budget/chain accounting and the audit log together.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::budget::BudgetTracker;
use crate::chain::ChainTracker;
use crate::concurrency::{ConcurrencyTracker, ProviderKind};
use crate::config::ConfigStore;
use crate::database::models::ProviderRow;
use crate::database::{DbError, DbPool};
use crate::error::{KernelError, ProviderError, RouteError, TransportError};
use crate::llm::adapter::ProviderAdapter;
use crate::llm::adapters::{ClaudeAdapter, LocalAdapter, OpenAiAdapter};
use crate::llm::audit::AuditLog;
use crate::llm::router::Router;
use crate::llm::types::{Request, Response};
use crate::vram::VramTracker;

const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_ATTEMPTS: u32 = 3;

/// Maps a provider row to the concrete adapter it speaks. No dedicated
/// "adapter kind" column exists in the data model; the kernel infers
/// it from provider shape — a reasonable default documented as an Open
/// Question decision (see DESIGN.md).
pub fn default_adapter_for(provider: &ProviderRow, client: reqwest::Client) -> Arc<dyn ProviderAdapter> {
    if provider.total_vram_bytes.is_some() {
        Arc::new(LocalAdapter::new(client))
    } else if provider.name == "anthropic" {
        Arc::new(ClaudeAdapter::new(client))
    } else {
        Arc::new(OpenAiAdapter::new(client))
    }
}

/// Everything a live reconfiguration swaps atomically.
struct ProxyState {
    router: Arc<Router>,
    budget: Arc<BudgetTracker>,
    concurrency: Arc<ConcurrencyTracker>,
    vram: Arc<VramTracker>,
    adapters: Arc<HashMap<String, Arc<dyn ProviderAdapter>>>,
}

pub struct Proxy {
    state: RwLock<ProxyState>,
    chains: Arc<ChainTracker>,
    config: Arc<ConfigStore>,
    audit: Arc<AuditLog>,
    http_client: reqwest::Client,
}

impl Proxy {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<ConfigStore>,
        router: Arc<Router>,
        budget: Arc<BudgetTracker>,
        concurrency: Arc<ConcurrencyTracker>,
        vram: Arc<VramTracker>,
        chains: Arc<ChainTracker>,
        audit: Arc<AuditLog>,
        http_client: reqwest::Client,
    ) -> Self {
        let adapters = Self::build_adapter_registry(&config, &http_client);
        Self {
            state: RwLock::new(ProxyState {
                router,
                budget,
                concurrency,
                vram,
                adapters: Arc::new(adapters),
            }),
            chains,
            config,
            audit,
            http_client,
        }
    }

    fn build_adapter_registry(config: &ConfigStore, client: &reqwest::Client) -> HashMap<String, Arc<dyn ProviderAdapter>> {
        let mut map = HashMap::new();
        if let Ok(providers) = config.list_providers() {
            for provider in providers {
                let adapter = default_adapter_for(&provider, client.clone());
                map.insert(provider.name.clone(), adapter);
            }
        }
        map
    }

    /// Atomically swaps router + budget + concurrency + VRAM trackers under
    /// a write lock; the old VRAM poller is explicitly stopped.
    pub async fn reconfigure(
        &self,
        router: Arc<Router>,
        budget: Arc<BudgetTracker>,
        concurrency: Arc<ConcurrencyTracker>,
        vram: Arc<VramTracker>,
    ) {
        let adapters = Arc::new(Self::build_adapter_registry(&self.config, &self.http_client));
        let mut state = self.state.write().await;
        state.vram.stop();
        state.router = router;
        state.budget = budget;
        state.concurrency = concurrency;
        state.vram = vram;
        state.adapters = adapters;
    }

    pub async fn think(&self, request: Request) -> Result<Response, KernelError> {
        // Step 1: fill defaults.
        let request = request.with_defaults_filled();
        self.audit.log_request(&request);

        // Step 2: chain guard.
        if let (Some(chain_id), Some(max_cost)) = (&request.chain_id, request.max_cost) {
            let current = self.chains.total_cost(chain_id);
            if current >= max_cost {
                let response = Response {
                    content: format!(
                        "chain {chain_id} exceeded max_cost ({current:.4} >= {max_cost:.4})"
                    ),
                    tool_calls: vec![],
                    done: true,
                    model_used: String::new(),
                    provider: String::new(),
                    tokens_in: 0,
                    tokens_out: 0,
                    cost: 0.0,
                    total_chain_cost: current,
                    budget_remaining: 0.0,
                };
                self.audit.log_response(&response);
                return Ok(response);
            }
        }

        let result = self.think_inner(&request).await;
        match &result {
            Ok(response) => self.audit.log_response(response),
            Err(e) => self.audit.log_error(e.to_string()),
        }
        result
    }

    async fn think_inner(&self, request: &Request) -> Result<Response, KernelError> {
        // Step 3: snapshot pointers under a read lock, then release it.
        let (router, budget, concurrency, vram, adapters) = {
            let state = self.state.read().await;
            (
                state.router.clone(),
                state.budget.clone(),
                state.concurrency.clone(),
                state.vram.clone(),
                state.adapters.clone(),
            )
        };

        // Step 4: route.
        let needs_tools = request.needs_tools();
        let decision = router.route(&request.intent, needs_tools)?;
        let provider = &decision.provider;
        let model = &decision.model;

        let adapter = adapters
            .get(&provider.name)
            .cloned()
            .ok_or_else(|| KernelError::Route(RouteError::NoRoute { intent: request.intent.clone() }))?;

        // Step 5: acquire the concurrency slot (VRAM slot for local models).
        if decision.kind == ProviderKind::Local && vram.is_enabled() {
            if !vram.acquire(model.wire_name()) {
                return Err(KernelError::Route(RouteError::ModelBusy {
                    provider: provider.name.clone(),
                    model_key: model.model_key.clone(),
                }));
            }
        } else if !concurrency.acquire(&provider.name, &model.model_key, decision.kind) {
            return Err(KernelError::Route(RouteError::ModelBusy {
                provider: provider.name.clone(),
                model_key: model.model_key.clone(),
            }));
        }

        let release = || {
            if decision.kind == ProviderKind::Local && vram.is_enabled() {
                vram.release(model.wire_name());
            } else {
                concurrency.release(&provider.name, &model.model_key);
            }
        };

        let started_at = Instant::now();
        let outcome = self
            .execute(request, provider, model, adapter.as_ref())
            .await;
        release();

        match outcome {
            Ok((parsed, attempts_elapsed)) => {
                let cost = model.cost(parsed.tokens_in, parsed.tokens_out);
                budget
                    .log_usage(&provider.name, model.wire_name(), &request.intent, parsed.tokens_in, parsed.tokens_out, cost)
                    .map_err(db_to_kernel_noop)
                    .ok();
                let total_chain_cost = match &request.chain_id {
                    Some(chain_id) => self.chains.add_cost(chain_id, cost),
                    None => cost,
                };
                let budget_remaining = budget
                    .get_all_budget_status()
                    .ok()
                    .and_then(|m| m.get(&provider.name).map(|s| s.remaining))
                    .unwrap_or(0.0);

                self.record_call(request, Some(provider.name.as_str()), Some(model.wire_name()), Some(parsed.content.as_str()), &parsed.tool_calls, parsed.tokens_in, parsed.tokens_out, cost, attempts_elapsed, None);

                Ok(Response {
                    content: parsed.content,
                    tool_calls: parsed.tool_calls,
                    done: parsed.done,
                    model_used: model.wire_name().to_string(),
                    provider: provider.name.clone(),
                    tokens_in: parsed.tokens_in,
                    tokens_out: parsed.tokens_out,
                    cost,
                    total_chain_cost,
                    budget_remaining,
                })
            }
            Err(e) => {
                self.record_call(request, Some(provider.name.as_str()), Some(model.wire_name()), None, &[], 0, 0, 0.0, started_at.elapsed().as_millis() as i64, Some(e.to_string()));
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_call(
        &self,
        request: &Request,
        provider: Option<&str>,
        model: Option<&str>,
        content: Option<&str>,
        tool_calls: &[crate::llm::types::ToolCall],
        tokens_in: i64,
        tokens_out: i64,
        cost: f64,
        duration_ms: i64,
        error: Option<String>,
    ) {
        use crate::database::models::NewLlmCallRow;

        let messages_json = serde_json::to_string(&request.messages).unwrap_or_default();
        let row = match (provider, model, &error) {
            (Some(provider), Some(model), None) => NewLlmCallRow::succeeded(
                request.chain_id.clone(),
                request.intent.clone(),
                provider,
                model,
                request.system.clone(),
                messages_json,
                request.tools.as_ref().map(|t| serde_json::to_string(t).unwrap_or_default()),
                content.map(str::to_string),
                Some(serde_json::to_string(tool_calls).unwrap_or_default()),
                tokens_in,
                tokens_out,
                cost,
                duration_ms,
            ),
            _ => NewLlmCallRow::failed(
                request.chain_id.clone(),
                request.intent.clone(),
                messages_json,
                error.unwrap_or_else(|| "unknown error".to_string()),
                duration_ms,
            ),
        };

        if let Err(e) = self.insert_call_row(row) {
            tracing::warn!(error = %e, "failed to persist llm_calls row, continuing");
        }
    }

    fn insert_call_row(&self, row: crate::database::models::NewLlmCallRow) -> Result<(), DbError> {
        use crate::database::schema::llm_calls;
        use diesel::RunQueryDsl;

        let mut conn = self.pool().get()?;
        diesel::insert_into(llm_calls::table).values(&row).execute(&mut conn)?;
        Ok(())
    }

    fn pool(&self) -> DbPool {
        self.config.pool()
    }

    /// Step 6-8: build the wire request, execute with retry, parse the
    /// response. Returns the parsed response and the elapsed wall time.
    async fn execute(
        &self,
        request: &Request,
        provider: &ProviderRow,
        model: &crate::database::models::ModelRow,
        adapter: &dyn ProviderAdapter,
    ) -> Result<(crate::llm::adapter::ParsedResponse, i64), KernelError> {
        let started_at = Instant::now();

        let api_key = self.config.get_secret(&format!("provider_api_key:{}", provider.name)).ok();
        let base_url = provider.base_url.clone().unwrap_or_default();

        let http_request = adapter
            .build_request(request, model.wire_name(), api_key.as_deref(), &base_url)
            .map_err(KernelError::Adapter)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = self.send_once(&http_request).await;
            match outcome {
                Ok((status, body)) => {
                    if (200..300).contains(&status) {
                        let parsed = adapter.parse_response(status, &body).map_err(KernelError::Adapter)?;
                        return Ok((parsed, started_at.elapsed().as_millis() as i64));
                    }
                    if ProviderError::is_retryable(status) && attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_BASE_DELAY * 2u32.saturating_pow(attempt - 1)).await;
                        continue;
                    }
                    return Err(KernelError::Provider(ProviderError {
                        status,
                        body: String::from_utf8_lossy(&body).to_string(),
                    }));
                }
                Err(e) => {
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_BASE_DELAY * 2u32.saturating_pow(attempt - 1)).await;
                        continue;
                    }
                    return Err(KernelError::Transport(e));
                }
            }
        }
    }

    /// `/api/memory/{store,search}` computes an embedding through the
    /// same router/adapter machinery `think` uses, simplified: no retry
    /// loop, no chain accounting — embedding calls are single-shot.
    pub async fn embed(&self, text: &str) -> Result<(Vec<f32>, i64, f64), KernelError> {
        let (router, budget, concurrency, adapters) = {
            let state = self.state.read().await;
            (state.router.clone(), state.budget.clone(), state.concurrency.clone(), state.adapters.clone())
        };

        let decision = router.route_embed()?;
        let provider = &decision.provider;
        let model = &decision.model;
        let adapter = adapters
            .get(&provider.name)
            .cloned()
            .ok_or_else(|| KernelError::Route(RouteError::NoRoute { intent: "embed".to_string() }))?;
        if !adapter.supports_embed() {
            return Err(KernelError::Adapter(crate::error::AdapterError::BuildFailed(format!(
                "{} does not support embeddings",
                provider.name
            ))));
        }

        if !concurrency.acquire(&provider.name, &model.model_key, decision.kind) {
            return Err(KernelError::Route(RouteError::ModelBusy {
                provider: provider.name.clone(),
                model_key: model.model_key.clone(),
            }));
        }

        let api_key = self.config.get_secret(&format!("provider_api_key:{}", provider.name)).ok();
        let base_url = provider.base_url.clone().unwrap_or_default();
        let result = adapter.embed(model.wire_name(), text, api_key.as_deref(), &base_url).await;
        concurrency.release(&provider.name, &model.model_key);

        let (vector, tokens) = result.map_err(KernelError::Adapter)?;
        let cost = model.cost(tokens, 0);
        budget.log_usage(&provider.name, model.wire_name(), "embed", tokens, 0, cost).map_err(db_to_kernel_noop).ok();
        Ok((vector, tokens, cost))
    }

    /// Current budget tracker, for read-only reporting endpoints
    /// (`/api/budget`, `/api/budget/breakdown`) that must reflect the
    /// latest `Reconfigure` swap rather than a stale snapshot.
    pub async fn budget_tracker(&self) -> Arc<BudgetTracker> {
        self.state.read().await.budget.clone()
    }

    /// `/api/log`: the agent's own log lines are forwarded into the
    /// audit trail rather than the database.
    pub fn audit_log_forwarded(&self, level: &str, message: &str) {
        self.audit.log_agent(level, message);
    }

    async fn send_once(&self, request: &crate::llm::adapter::HttpRequest) -> Result<(u16, Vec<u8>), TransportError> {
        let mut builder = self.http_client.post(&request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        let resp = builder
            .body(request.body_bytes.clone())
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| TransportError(e.to_string()))?.to_vec();
        Ok((status, body))
    }
}

fn db_to_kernel_noop(e: crate::database::DbError) -> crate::database::DbError {
    tracing::warn!(error = %e, "failed to log budget usage, continuing");
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::database::init_test_pool;
    use crate::llm::types::{Message, ToolChoice};
    use crate::security::RootKey;
    use base64::Engine;

    fn test_proxy() -> Proxy {
        let pool = init_test_pool();
        let key = RootKey::from_base64(&base64::engine::general_purpose::STANDARD.encode([9u8; 32])).unwrap();
        let config = Arc::new(ConfigStore::new(pool.clone(), key));
        let concurrency = Arc::new(ConcurrencyTracker::new());
        let vram = Arc::new(VramTracker::disabled());
        let budget = Arc::new(BudgetTracker::new(pool));
        let router = Arc::new(Router::new(config.clone(), concurrency.clone(), vram.clone(), budget.clone()));
        let chains = Arc::new(ChainTracker::new());
        let audit_path = std::env::temp_dir().join(format!("kernel-proxy-test-{}.jsonl", uuid::Uuid::new_v4()));
        let audit = Arc::new(AuditLog::open(audit_path).unwrap());
        Proxy::new(config, router, budget, concurrency, vram, chains, audit, reqwest::Client::new())
    }

    fn request(chain_id: &str) -> Request {
        Request {
            intent: "chat".to_string(),
            system: None,
            messages: vec![Message::user("hi")],
            tools: None,
            tool_choice: ToolChoice::Auto,
            max_tokens: 100,
            max_cost: Some(0.05),
            chain_id: Some(chain_id.to_string()),
        }
    }

    /// A chain already at or over `max_cost` is rejected
    /// before any routing or network I/O happens — provable even with no
    /// providers configured at all, since `route()` would otherwise fail
    /// with `NoRoute` instead.
    #[tokio::test]
    async fn chain_at_cap_short_circuits_before_routing() {
        let proxy = test_proxy();
        proxy.chains.add_cost("c1", 0.10);

        let response = proxy.think(request("c1")).await.unwrap();

        assert!(response.done);
        assert!(response.content.contains("exceeded max_cost"));
        assert_eq!(response.total_chain_cost, 0.10);
        assert_eq!(response.cost, 0.0);
        assert_eq!(response.provider, "");
    }

    #[tokio::test]
    async fn chain_below_cap_falls_through_to_routing_and_fails_with_no_route() {
        let proxy = test_proxy();
        proxy.chains.add_cost("c2", 0.01);

        let err = proxy.think(request("c2")).await.unwrap_err();

        assert!(matches!(err, KernelError::Route(RouteError::NoRoute { .. })));
    }
}
