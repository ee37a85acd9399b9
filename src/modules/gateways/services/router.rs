use crate::core::{AppError, CredentialVault, Currency, Result};
use crate::modules::gateways::adapters::{
    CheckoutFlow, GatewayHttp, GatewaySession, InitializeContext, PaymentProvider, PayuProvider,
    PhonepeProvider, RazorpayProvider, StripeProvider,
};
use crate::modules::gateways::models::{GatewayConfig, GatewayCredentials, GatewayName};
use crate::modules::gateways::repositories::GatewayRegistry;
use crate::modules::gateways::services::stats::ProviderStats;
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingStrategy {
    Priority,
    TrafficSplit,
    Intelligent,
}

impl FromStr for RoutingStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "priority" => Ok(RoutingStrategy::Priority),
            "traffic_split" => Ok(RoutingStrategy::TrafficSplit),
            "intelligent" => Ok(RoutingStrategy::Intelligent),
            other => Err(format!("Unknown routing strategy: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub strategy: RoutingStrategy,
    /// Failure rate above which a provider is tripped unhealthy.
    pub failure_rate_threshold: f64,
    /// Attempts required before the failure rate is trusted.
    pub health_min_attempts: u64,
    /// How long a tripped provider stays out of rotation.
    pub health_cooldown: chrono::Duration,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategy::Priority,
            failure_rate_threshold: 0.30,
            health_min_attempts: 5,
            health_cooldown: chrono::Duration::minutes(10),
        }
    }
}

/// One loaded provider: adapter, registry snapshot and rolling stats.
pub struct ProviderEntry {
    pub adapter: Arc<dyn PaymentProvider>,
    pub config: GatewayConfig,
    pub stats: ProviderStats,
}

/// What a request needs from a gateway for it to be a candidate.
pub struct SelectionCriteria<'a> {
    pub amount: Decimal,
    pub currency: Currency,
    pub country: Option<&'a str>,
    pub payment_method: Option<&'a str>,
    pub exclude: &'a [GatewayName],
}

#[derive(Serialize)]
pub struct FleetHealth {
    pub overall: String,
    pub gateways: Vec<GatewayHealth>,
}

#[derive(Serialize)]
pub struct GatewayHealth {
    pub gateway: GatewayName,
    /// Remote probe result.
    pub reachable: bool,
    /// Whether the router would currently route to it.
    pub in_rotation: bool,
    pub response_time_ms: u64,
    pub stats: ProviderStats,
}

/// Orchestrates gateway selection, ordered fallback and health tracking.
///
/// Constructed once in `main` and injected; owns the provider map behind a
/// `tokio::sync::RwLock` so a reload is never observed half-built. Adapter
/// calls happen outside the lock.
pub struct PaymentRouter {
    registry: Arc<dyn GatewayRegistry>,
    vault: Arc<CredentialVault>,
    http: GatewayHttp,
    providers: RwLock<HashMap<GatewayName, ProviderEntry>>,
    options: RouterOptions,
}

impl PaymentRouter {
    pub fn new(
        registry: Arc<dyn GatewayRegistry>,
        vault: Arc<CredentialVault>,
        http: GatewayHttp,
        options: RouterOptions,
    ) -> Self {
        Self {
            registry,
            vault,
            http,
            providers: RwLock::new(HashMap::new()),
            options,
        }
    }

    /// Rebuild the provider map from registry rows, discarding stats.
    ///
    /// Rows with blank or undecryptable credentials are skipped with a
    /// warning; one bad row degrades one gateway, never the fleet.
    pub async fn reload_providers(&self) -> Result<usize> {
        let rows = self.registry.find_active().await?;

        let mut map = HashMap::new();
        for config in rows {
            match self.build_entry(config) {
                Some(entry) => {
                    map.insert(entry.config.name, entry);
                }
                None => continue,
            }
        }

        let loaded = map.len();
        let mut guard = self.providers.write().await;
        *guard = map;
        drop(guard);

        info!(loaded, "Payment providers reloaded");
        Ok(loaded)
    }

    /// Insert or replace one provider without reloading the fleet, for when
    /// a single gateway's configuration changes in isolation. Its stats start
    /// fresh, as after a full reload.
    pub async fn install_provider(&self, config: GatewayConfig, adapter: Arc<dyn PaymentProvider>) {
        let name = config.name;
        let mut guard = self.providers.write().await;
        guard.insert(
            name,
            ProviderEntry {
                adapter,
                config,
                stats: ProviderStats::default(),
            },
        );
        drop(guard);

        info!(gateway = %name, "Payment provider installed");
    }

    fn build_entry(&self, config: GatewayConfig) -> Option<ProviderEntry> {
        let (public_stored, secret_stored) = config.credential_pair();
        let public_key = self.vault.decrypt(public_stored);
        let secret_key = self.vault.decrypt(secret_stored);

        if public_key.is_empty() || secret_key.is_empty() {
            warn!(gateway = %config.name, "Skipping gateway with blank credentials");
            return None;
        }
        if self.vault.is_encrypted(&public_key) || self.vault.is_encrypted(&secret_key) {
            warn!(gateway = %config.name, "Skipping gateway whose credentials failed to decrypt");
            return None;
        }

        info!(
            gateway = %config.name,
            mode = %config.mode,
            key = %self.vault.mask(&public_key),
            "Loaded payment gateway"
        );

        let credentials = GatewayCredentials {
            public_key,
            secret_key,
        };
        let adapter: Arc<dyn PaymentProvider> = match config.name {
            GatewayName::Razorpay => {
                Arc::new(RazorpayProvider::new(credentials, self.http.clone()))
            }
            GatewayName::Stripe => Arc::new(StripeProvider::new(credentials, self.http.clone())),
            GatewayName::Phonepe => {
                Arc::new(PhonepeProvider::new(credentials, config.mode, self.http.clone()))
            }
            GatewayName::Payu => {
                Arc::new(PayuProvider::new(credentials, config.mode, self.http.clone()))
            }
        };

        Some(ProviderEntry {
            adapter,
            config,
            stats: ProviderStats::default(),
        })
    }

    pub async fn adapter(&self, name: GatewayName) -> Option<Arc<dyn PaymentProvider>> {
        self.providers
            .read()
            .await
            .get(&name)
            .map(|entry| Arc::clone(&entry.adapter))
    }

    pub async fn flow_of(&self, name: GatewayName) -> Option<CheckoutFlow> {
        self.providers
            .read()
            .await
            .get(&name)
            .map(|entry| entry.adapter.flow())
    }

    pub async fn config_of(&self, name: GatewayName) -> Option<GatewayConfig> {
        self.providers
            .read()
            .await
            .get(&name)
            .map(|entry| entry.config.clone())
    }

    /// Eligible candidates in strategy order. Computed once per request.
    pub async fn ranked_candidates(
        &self,
        criteria: &SelectionCriteria<'_>,
        preferred: Option<GatewayName>,
    ) -> Vec<GatewayName> {
        let now = Utc::now();
        let guard = self.providers.read().await;

        let eligible: Vec<(&GatewayConfig, &ProviderStats)> = guard
            .values()
            .filter(|entry| is_eligible(&entry.config, criteria, now))
            .map(|entry| (&entry.config, &entry.stats))
            .collect();

        let mut ranked = match self.options.strategy {
            RoutingStrategy::Priority => priority_order(&eligible),
            RoutingStrategy::TrafficSplit => {
                traffic_split_order(&eligible, &mut rand::thread_rng())
            }
            RoutingStrategy::Intelligent => intelligent_order(&eligible, now),
        };
        drop(guard);

        if let Some(preferred) = preferred {
            if let Some(pos) = ranked.iter().position(|name| *name == preferred) {
                let preferred = ranked.remove(pos);
                ranked.insert(0, preferred);
            } else {
                warn!(gateway = %preferred, "Preferred gateway not eligible, using ranked order");
            }
        }

        ranked
    }

    /// Sequential fallback across the ranked candidates.
    ///
    /// First successful initialization wins; transient failures record stats
    /// and move on to the next candidate. Non-transient errors abort the loop
    /// since no other gateway would fare better.
    pub async fn route_initialize(
        &self,
        ctx: &InitializeContext,
        criteria: &SelectionCriteria<'_>,
        preferred: Option<GatewayName>,
    ) -> Result<(GatewayName, GatewaySession)> {
        let candidates = self.ranked_candidates(criteria, preferred).await;
        if candidates.is_empty() {
            return Err(AppError::gateway_config(
                "No eligible payment gateway for this request",
            ));
        }

        let mut last_error: Option<AppError> = None;
        for name in candidates {
            let Some(adapter) = self.adapter(name).await else {
                continue;
            };

            match adapter.initialize_transaction(ctx).await {
                Ok(session) => {
                    self.record_success(name).await;
                    info!(
                        gateway = %name,
                        order_id = %ctx.order_id,
                        gateway_order_id = %session.gateway_order_id,
                        "Payment session initialized"
                    );
                    return Ok((name, session));
                }
                Err(err) if err.is_gateway_transient() => {
                    warn!(
                        gateway = %name,
                        order_id = %ctx.order_id,
                        error = %err,
                        "Gateway initialization failed, trying next candidate"
                    );
                    self.record_failure(name).await;
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::gateway("All payment gateways failed to initialize")))
    }

    async fn record_success(&self, name: GatewayName) {
        let mut restore = false;
        {
            let mut guard = self.providers.write().await;
            if let Some(entry) = guard.get_mut(&name) {
                entry.stats.record_success();
                if !entry.config.is_healthy {
                    entry.config.is_healthy = true;
                    entry.config.unhealthy_until = None;
                    restore = true;
                }
            }
        }

        if restore {
            if let Err(err) = self.registry.mark_healthy(name).await {
                warn!(gateway = %name, error = %err, "Failed to persist gateway recovery");
            }
        }
    }

    async fn record_failure(&self, name: GatewayName) {
        let mut tripped_until = None;
        {
            let mut guard = self.providers.write().await;
            if let Some(entry) = guard.get_mut(&name) {
                entry.stats.record_failure();
                let trip = entry.stats.should_trip(
                    self.options.failure_rate_threshold,
                    self.options.health_min_attempts,
                ) && entry.config.healthy_at(Utc::now().naive_utc());
                if trip {
                    let until = (Utc::now() + self.options.health_cooldown).naive_utc();
                    entry.config.is_healthy = false;
                    entry.config.unhealthy_until = Some(until);
                    tripped_until = Some(until);
                }
            }
        }

        if let Some(until) = tripped_until {
            warn!(gateway = %name, until = %until, "Gateway tripped unhealthy");
            if let Err(err) = self.registry.mark_unhealthy(name, until).await {
                warn!(gateway = %name, error = %err, "Failed to persist gateway health trip");
            }
        }
    }

    /// Probe every loaded provider and report fleet health.
    pub async fn fleet_health(&self) -> FleetHealth {
        let now = Utc::now().naive_utc();
        let entries: Vec<(GatewayName, Arc<dyn PaymentProvider>, bool, ProviderStats)> = {
            let guard = self.providers.read().await;
            guard
                .values()
                .map(|entry| {
                    (
                        entry.config.name,
                        Arc::clone(&entry.adapter),
                        entry.config.is_active && entry.config.healthy_at(now),
                        entry.stats.clone(),
                    )
                })
                .collect()
        };

        let mut gateways = Vec::with_capacity(entries.len());
        for (name, adapter, in_rotation, stats) in entries {
            let started = std::time::Instant::now();
            let reachable = adapter.health_check().await;
            gateways.push(GatewayHealth {
                gateway: name,
                reachable,
                in_rotation,
                response_time_ms: started.elapsed().as_millis() as u64,
                stats,
            });
        }
        gateways.sort_by_key(|g| g.gateway.as_str());

        let overall = if gateways.iter().any(|g| g.reachable && g.in_rotation) {
            "healthy"
        } else if gateways.is_empty() {
            "no_gateways"
        } else {
            "degraded"
        };

        FleetHealth {
            overall: overall.to_string(),
            gateways,
        }
    }
}

fn is_eligible(
    config: &GatewayConfig,
    criteria: &SelectionCriteria<'_>,
    now: DateTime<Utc>,
) -> bool {
    if !config.is_active || criteria.exclude.contains(&config.name) {
        return false;
    }
    if !config.healthy_at(now.naive_utc()) {
        return false;
    }
    if !config.supports_currency(criteria.currency) {
        return false;
    }
    if let Some(country) = criteria.country {
        if !config.supports_country(country) {
            return false;
        }
    }
    if let Some(method) = criteria.payment_method {
        if !config.supports_method(method) {
            return false;
        }
    }
    config.amount_within_limits(criteria.amount)
}

fn priority_order(eligible: &[(&GatewayConfig, &ProviderStats)]) -> Vec<GatewayName> {
    let mut ordered: Vec<(i32, GatewayName)> = eligible
        .iter()
        .map(|(config, _)| (config.priority, config.name))
        .collect();
    ordered.sort_by_key(|(priority, name)| (*priority, name.as_str()));
    ordered.into_iter().map(|(_, name)| name).collect()
}

/// Weighted random winner first, the rest in priority order for fallback.
fn traffic_split_order(
    eligible: &[(&GatewayConfig, &ProviderStats)],
    rng: &mut impl Rng,
) -> Vec<GatewayName> {
    let mut ordered = priority_order(eligible);
    let weights: HashMap<GatewayName, i64> = eligible
        .iter()
        .map(|(config, _)| (config.name, i64::from(config.traffic_weight.max(0))))
        .collect();

    let total: i64 = weights.values().sum();
    if total == 0 {
        return ordered;
    }

    let mut draw = rng.gen_range(0..total);
    let mut winner = None;
    for name in &ordered {
        let weight = weights.get(name).copied().unwrap_or(0);
        if draw < weight {
            winner = Some(*name);
            break;
        }
        draw -= weight;
    }

    if let Some(winner) = winner {
        if let Some(pos) = ordered.iter().position(|name| *name == winner) {
            let winner = ordered.remove(pos);
            ordered.insert(0, winner);
        }
    }
    ordered
}

/// Composite score: priority bonus + rolling success bonus − consecutive
/// failure penalty − fee penalty + least-recently-used bonus.
fn intelligent_score(config: &GatewayConfig, stats: &ProviderStats, now: DateTime<Utc>) -> f64 {
    let mut score = f64::from((100 - config.priority).max(0));
    score += stats.success_rate() * 50.0;
    score -= f64::from(stats.consecutive_failures) * 15.0;
    score -= config.transaction_rate.to_f64().unwrap_or(0.0) * 10.0;
    score += match stats.last_used_at {
        None => 20.0,
        Some(last) => ((now - last).num_minutes() as f64).clamp(0.0, 20.0),
    };
    score
}

fn intelligent_order(
    eligible: &[(&GatewayConfig, &ProviderStats)],
    now: DateTime<Utc>,
) -> Vec<GatewayName> {
    let mut scored: Vec<(f64, i32, GatewayName)> = eligible
        .iter()
        .map(|(config, stats)| (intelligent_score(config, stats, now), config.priority, config.name))
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
    });
    scored.into_iter().map(|(_, _, name)| name).collect()
}
