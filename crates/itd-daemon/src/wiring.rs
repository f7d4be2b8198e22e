//! Builds a runnable desk from configuration and resolved secrets.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use itd_approval::{ApprovalGate, ApprovalProvider, ChatCompletionsProvider};
use itd_audit::AuditTradeLog;
use itd_broker_kite::{EnvFileRefresher, KiteBroker, SessionToken};
use itd_broker_paper::PaperBroker;
use itd_config::{BrokerKind, DeskConfig, ProviderSettings, ResolvedSecrets};
use itd_execution::{
    ApiCallCounter, BrokerAccount, Executor, ExecutorSettings, NoopRefresher, PositionSource, SessionRefresher,
};
use itd_md::SnapshotFileProvider;
use itd_risk::{RiskGate, RiskPolicy};
use itd_runtime::{
    AlertSink, ExclusionSet, JsonExclusionStore, LogAlertSink, Orchestrator, Pipeline, PipelineParts,
    WebhookAlertSink,
};
use itd_schemas::{AlertHandle, Clock};
use itd_strategy::{DecisionModel, InferenceModel, LinearPolicyModel};
use tracing::{info, warn};

pub struct Desk {
    pub orchestrator: Arc<Orchestrator>,
    pub exclusions: Arc<ExclusionSet>,
}

fn broker_pair(cfg: &DeskConfig, secrets: &ResolvedSecrets) -> Result<(Arc<dyn BrokerAccount>, Arc<dyn SessionRefresher>)> {
    match cfg.broker.kind {
        BrokerKind::Paper => Ok((Arc::new(PaperBroker::new()), Arc::new(NoopRefresher))),
        BrokerKind::Kite => {
            let api_key = secrets
                .broker_api_key
                .clone()
                .context("kite broker selected but no api key resolved")?;
            let token = secrets
                .broker_access_token
                .clone()
                .context("kite broker selected but no access token resolved")?;
            let session = SessionToken::new(token);
            let broker = KiteBroker::new(&cfg.broker, api_key, session.clone());
            let refresher = EnvFileRefresher::new(&cfg.broker.env_file, &cfg.broker.access_token_env, session);
            Ok((Arc::new(broker), Arc::new(refresher)))
        }
    }
}

fn load_model(cfg: &DeskConfig) -> Option<Arc<dyn InferenceModel>> {
    let path = cfg.model.path.as_deref()?;
    match LinearPolicyModel::load(path) {
        Ok(m) => {
            info!(path, "policy model loaded");
            Some(Arc::new(m))
        }
        Err(e) => {
            warn!(path, error = %format!("{e:#}"), "policy model failed to load");
            None
        }
    }
}

fn provider(settings: Option<&ProviderSettings>, key: Option<&String>) -> Option<Arc<dyn ApprovalProvider>> {
    let (settings, key) = settings.zip(key)?;
    Some(Arc::new(ChatCompletionsProvider::new(settings, key.clone())))
}

/// Alert sinks for the dispatcher: always the log, plus the webhook when
/// one is configured.
pub fn alert_sinks(secrets: &ResolvedSecrets) -> Result<Vec<Arc<dyn AlertSink>>> {
    let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogAlertSink)];
    if let Some(url) = &secrets.alert_webhook {
        sinks.push(Arc::new(WebhookAlertSink::new(url.clone(), Duration::from_secs(10))?));
    }
    Ok(sinks)
}

pub fn build_desk(
    cfg: Arc<DeskConfig>,
    secrets: &ResolvedSecrets,
    alerts: AlertHandle,
    clock: Arc<dyn Clock>,
) -> Result<Desk> {
    let (broker, refresher) = broker_pair(&cfg, secrets)?;
    let counter = Arc::new(ApiCallCounter::new(cfg.broker.api_call_warn_every, alerts.clone()));
    let executor = Arc::new(Executor::new(
        broker,
        refresher,
        counter,
        ExecutorSettings {
            lot_size: cfg.broker.lot_size,
            order_timeout: cfg.pipeline.order_timeout(),
            account_timeout: cfg.pipeline.account_timeout(),
        },
    ));

    let positions: Arc<dyn PositionSource> = executor.clone();
    let risk = RiskGate::new(
        RiskPolicy::from_desk(&cfg),
        cfg.risk.historical_high_pnl,
        positions,
        Arc::clone(&clock),
    );

    let decision = DecisionModel::new(load_model(&cfg), cfg.pipeline.inference_timeout(), alerts.clone());

    let approval = ApprovalGate::new(
        provider(cfg.approval.primary.as_ref(), secrets.primary_approval_key.as_ref()),
        provider(cfg.approval.secondary.as_ref(), secrets.secondary_approval_key.as_ref()),
        &cfg.approval,
        alerts.clone(),
    );

    let recorder = Arc::new(
        AuditTradeLog::open(&cfg.audit.path, cfg.audit.hash_chain)
            .with_context(|| format!("open trade log {}", cfg.audit.path))?,
    );

    let exclusions = Arc::new(ExclusionSet::load(
        &cfg.universe,
        Arc::new(JsonExclusionStore::new(&cfg.exclusions.path)),
        alerts.clone(),
    ));

    let market_data = Arc::new(SnapshotFileProvider::new(
        &cfg.market_data.snapshot_path,
        cfg.market_data.top_sectors,
    ));

    info!(
        broker = executor.broker_name(),
        model = decision.has_model(),
        universe = cfg.universe.len(),
        workers = cfg.pipeline.worker_count,
        "desk wired"
    );

    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&cfg),
        PipelineParts {
            market_data,
            decision,
            risk,
            approval,
            executor,
            recorder,
            exclusions: Arc::clone(&exclusions),
            alerts,
        },
    ));

    Ok(Desk {
        orchestrator: Arc::new(Orchestrator::new(pipeline, clock)),
        exclusions,
    })
}
