//! Typed reseller operations over [`Transport`].

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{instrument, warn};

use provider_types::domain::{AgentBillsQuery, AssignBundle, BundleListQuery, OrderListQuery};
use provider_types::{ProviderError, UsageItem};

use crate::config::ResellerConfig;
use crate::transport::{RequestContext, Transport};

pub const DEFAULT_USAGE_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResellerOperation {
    AssignBundle,
    ListOrders,
    OrderDetail,
    OrderConsumption,
    Countries,
    Regions,
    BundleList,
    BundleNetworks,
    AgentAccount,
    AgentBills,
}

impl ResellerOperation {
    pub const ALL: [ResellerOperation; 10] = [
        Self::AssignBundle,
        Self::ListOrders,
        Self::OrderDetail,
        Self::OrderConsumption,
        Self::Countries,
        Self::Regions,
        Self::BundleList,
        Self::BundleNetworks,
        Self::AgentAccount,
        Self::AgentBills,
    ];

    pub fn default_path(self) -> &'static str {
        match self {
            Self::AssignBundle => "/bundle/assign",
            Self::ListOrders => "/orders/list",
            Self::OrderDetail => "/orders/detail",
            Self::OrderConsumption => "/orders/consumption",
            Self::Countries => "/bundle/countries",
            Self::Regions => "/bundle/regions",
            Self::BundleList => "/bundle/list",
            Self::BundleNetworks => "/bundle/networks",
            Self::AgentAccount => "/agent/account",
            Self::AgentBills => "/agent/bills",
        }
    }

    /// Environment variable overriding the path, e.g. `PROVIDER_ORDERS_LIST_PATH`.
    pub fn env_key(self) -> String {
        let stem = self
            .default_path()
            .trim_start_matches('/')
            .replace('/', "_")
            .to_ascii_uppercase();
        format!("PROVIDER_{}_PATH", stem)
    }
}

impl std::str::FromStr for ResellerOperation {
    type Err = String;

    /// Accepts either the upstream path (`/orders/list`) or its dotted name (`orders.list`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('/').replace('.', "/");
        Self::ALL
            .into_iter()
            .find(|op| op.default_path().trim_start_matches('/') == wanted)
            .ok_or_else(|| format!("unknown reseller operation: {}", s))
    }
}

/// Reseller API client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ResellerClient {
    transport: Arc<Transport>,
    config: Arc<ResellerConfig>,
}

impl ResellerClient {
    pub fn new(transport: Arc<Transport>, config: ResellerConfig) -> Self {
        Self {
            transport,
            config: Arc::new(config),
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Sends `payload` to the operation's path and returns the envelope `data`.
    #[instrument(skip(self, payload, ctx))]
    pub async fn send(
        &self,
        op: ResellerOperation,
        payload: &Value,
        ctx: &RequestContext,
    ) -> Result<Value, ProviderError> {
        let envelope = self
            .transport
            .send(self.config.path_for(op), payload, ctx, true)
            .await?;
        Ok(match envelope.into_data() {
            Value::Null => json!({}),
            data => data,
        })
    }

    /// Returns `{order_id, iccid}` for the assigned bundle.
    pub async fn assign_bundle(
        &self,
        request: &AssignBundle,
        ctx: &RequestContext,
    ) -> Result<Value, ProviderError> {
        let data = self
            .send(ResellerOperation::AssignBundle, &request.to_payload(), ctx)
            .await?;
        Ok(json!({
            "order_id": data.get("order_id").cloned().unwrap_or(Value::Null),
            "iccid": data.get("iccid").cloned().unwrap_or(Value::Null),
        }))
    }

    /// Returns `{orders, orders_count}`.
    pub async fn list_orders(
        &self,
        query: &OrderListQuery,
        ctx: &RequestContext,
    ) -> Result<Value, ProviderError> {
        let data = self
            .send(ResellerOperation::ListOrders, &query.to_payload(), ctx)
            .await?;
        let orders = data.get("orders").cloned().unwrap_or_else(|| json!([]));
        let count = data
            .get("orders_count")
            .and_then(number_like)
            .unwrap_or(0);
        Ok(json!({"orders": orders, "orders_count": count}))
    }

    pub async fn order_detail(
        &self,
        order_reference: &str,
        ctx: &RequestContext,
    ) -> Result<Value, ProviderError> {
        self.send(
            ResellerOperation::OrderDetail,
            &json!({"order_reference": order_reference}),
            ctx,
        )
        .await
    }

    /// Usage for one order: the `order` object inside the envelope data.
    pub async fn order_consumption(
        &self,
        order_reference: &str,
        ctx: &RequestContext,
    ) -> Result<Value, ProviderError> {
        let data = self
            .send(
                ResellerOperation::OrderConsumption,
                &json!({"order_reference": order_reference}),
                ctx,
            )
            .await?;
        Ok(match data.get("order") {
            Some(order) if order.is_object() => order.clone(),
            _ => json!({}),
        })
    }

    /// Looks up usage for many orders with at most `concurrency` calls in flight.
    ///
    /// References are trimmed and de-duplicated, keeping first occurrence order.
    /// A failed lookup yields an empty usage object instead of failing the batch.
    #[instrument(skip(self, references, ctx), fields(count = references.len()))]
    pub async fn consumption_batch(
        &self,
        references: &[String],
        concurrency: usize,
        ctx: &RequestContext,
    ) -> Vec<UsageItem> {
        let mut seen = HashSet::new();
        let references: Vec<String> = references
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty() && seen.insert(r.clone()))
            .collect();
        if references.is_empty() {
            return Vec::new();
        }

        let permits = Arc::new(Semaphore::new(concurrency.clamp(1, references.len())));
        let mut tasks = JoinSet::new();
        for (index, reference) in references.iter().cloned().enumerate() {
            let client = self.clone();
            let ctx = ctx.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let usage = match permits.acquire_owned().await {
                    Ok(_permit) => client.order_consumption(&reference, &ctx).await,
                    Err(e) => Err(ProviderError::Config(e.to_string())),
                };
                (index, reference, usage)
            });
        }

        let mut slots: Vec<Option<UsageItem>> = vec![None; references.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, order_reference, usage)) => {
                    let usage = usage.unwrap_or_else(|e| {
                        warn!(order_reference = %order_reference, error = %e, "usage lookup failed");
                        json!({})
                    });
                    slots[index] = Some(UsageItem {
                        order_reference,
                        usage,
                    });
                }
                Err(e) => warn!(error = %e, "usage lookup task panicked"),
            }
        }

        slots
            .into_iter()
            .zip(references)
            .map(|(slot, order_reference)| {
                slot.unwrap_or(UsageItem {
                    order_reference,
                    usage: json!({}),
                })
            })
            .collect()
    }

    pub async fn countries(&self, ctx: &RequestContext) -> Result<Value, ProviderError> {
        self.send(ResellerOperation::Countries, &json!({}), ctx).await
    }

    pub async fn regions(&self, ctx: &RequestContext) -> Result<Value, ProviderError> {
        self.send(ResellerOperation::Regions, &json!({}), ctx).await
    }

    pub async fn bundle_list(
        &self,
        query: &BundleListQuery,
        ctx: &RequestContext,
    ) -> Result<Value, ProviderError> {
        self.send(ResellerOperation::BundleList, &query.to_payload(), ctx)
            .await
    }

    /// Returns `{networks, networks_count}`, narrowed to `country_code` when given.
    pub async fn bundle_networks(
        &self,
        bundle_code: &str,
        country_code: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<Value, ProviderError> {
        let payload = json!({
            "bundle_code": bundle_code,
            "country_code": country_code.unwrap_or_default(),
        });
        let data = self
            .send(ResellerOperation::BundleNetworks, &payload, ctx)
            .await?;

        let mut networks = data
            .get("networks")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let filtered = match country_code.filter(|c| !c.is_empty()) {
            Some(country) => {
                networks.retain(|n| {
                    n.get("country_code")
                        .and_then(Value::as_str)
                        .is_some_and(|c| c.eq_ignore_ascii_case(country))
                });
                true
            }
            None => false,
        };
        let count = match data.get("networks_count").and_then(number_like) {
            Some(count) if !filtered => count,
            _ => networks.len() as i64,
        };
        Ok(json!({"networks": networks, "networks_count": count}))
    }

    pub async fn agent_account(&self, ctx: &RequestContext) -> Result<Value, ProviderError> {
        self.send(ResellerOperation::AgentAccount, &json!({}), ctx)
            .await
    }

    pub async fn agent_bills(
        &self,
        query: &AgentBillsQuery,
        ctx: &RequestContext,
    ) -> Result<Value, ProviderError> {
        self.send(ResellerOperation::AgentBills, &query.to_payload(), ctx)
            .await
    }
}

// Counts arrive as numbers or numeric strings.
fn number_like(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}
