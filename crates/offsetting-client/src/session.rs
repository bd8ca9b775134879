//! The two offsetting flows, from host input to state update.

use std::sync::Arc;
use std::time::Duration;

use offsetting_network::PubSub;
use offsetting_protocol::{
    codec, Account, ClaimSigner, CompensationStatus, OffsetClaim, OffsetReport, TechnicsDocument,
    UsageReading, CLAIM_ECONOMICS, CLAIM_QUERY_TOPIC, CLAIM_RESPONSE_TOPIC, CLAIM_TIMEOUT_SECS,
    STATUS_QUERY_TOPIC, STATUS_RESPONSE_TOPIC, STATUS_TIMEOUT_SECS,
};
use offsetting_storage::{stage, ContentStore};
use tokio::sync::RwLock;

use crate::engine::{RequestEngine, ResponseFilter};
use crate::notify::{NoticeKind, Notification, Notifier, StateSink};
use crate::state::{ClientState, Quantity, NEVER_COMPENSATED};
use crate::ClientError;

const INTERNAL_ERROR: &str = "Internal error, check logs for more detail.";

/// Per-household settings the flows need.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Home coordinates, "lat, lon".
    pub geo: String,
    pub status_deadline: Duration,
    pub claim_deadline: Duration,
}

impl SessionConfig {
    pub fn new(geo: impl Into<String>) -> Self {
        Self {
            geo: geo.into(),
            status_deadline: Duration::from_secs(STATUS_TIMEOUT_SECS),
            claim_deadline: Duration::from_secs(CLAIM_TIMEOUT_SECS),
        }
    }
}

/// How a flow ended. Every outcome has also been reported to the notifier.
#[derive(Debug)]
pub enum FlowOutcome {
    /// Round trip completed; carries the state after the update.
    Updated(ClientState),
    /// Nothing was sent.
    Skipped,
    /// The agent answered but reported failure.
    AgentFailure,
    TimedOut,
    Failed(ClientError),
}

/// Net energy usage: consumption minus production.
///
/// Readings that are not finite numbers are logged and left out. Fails when
/// the sums overflow.
pub fn net_usage<S: AsRef<str>>(consumption: &[S], production: &[S]) -> Result<f64, ClientError> {
    fn parse(reading: &str) -> Option<f64> {
        match reading.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Some(value),
            _ => {
                tracing::error!(reading, "Skipping unusable energy reading");
                None
            }
        }
    }

    let consumed: f64 = consumption.iter().filter_map(|r| parse(r.as_ref())).sum();
    let produced: f64 = production.iter().filter_map(|r| parse(r.as_ref())).sum();
    let usage = consumed - produced;
    if !usage.is_finite() {
        return Err(ClientError::InvalidUsage(format!(
            "consumed {consumed} kWh, produced {produced} kWh"
        )));
    }
    tracing::debug!(consumed, produced, "Computed net usage");
    Ok(usage)
}

/// One household's offsetting session.
pub struct Session {
    signer: ClaimSigner,
    config: SessionConfig,
    engine: RequestEngine,
    store: Arc<dyn ContentStore>,
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn StateSink>,
    state: Arc<RwLock<ClientState>>,
}

impl Session {
    pub fn new(
        account: Account,
        config: SessionConfig,
        bus: Arc<dyn PubSub>,
        store: Arc<dyn ContentStore>,
        notifier: Arc<dyn Notifier>,
        sink: Arc<dyn StateSink>,
    ) -> Self {
        Self {
            signer: ClaimSigner::new(account),
            config,
            engine: RequestEngine::new(bus),
            store,
            notifier,
            sink,
            state: Arc::new(RwLock::new(ClientState::default())),
        }
    }

    pub fn address(&self) -> &str {
        self.signer.account().address()
    }

    pub async fn state(&self) -> ClientState {
        self.state.read().await.clone()
    }

    /// Overwrite the amount left to compensate, e.g. with a value the host
    /// kept from an earlier run.
    pub async fn set_to_compensate(&self, kwh: Quantity) {
        self.state.write().await.to_compensate = kwh;
    }

    fn notify(&self, kind: NoticeKind, title: &str, message: impl Into<String>) {
        self.notifier.notify(Notification::new(kind, title, message));
    }

    /// Apply `update` under one write lock, then hand the result to the sink.
    async fn commit(&self, update: impl FnOnce(&mut ClientState)) -> ClientState {
        let snapshot = {
            let mut state = self.state.write().await;
            update(&mut state);
            state.clone()
        };
        self.sink.publish(&snapshot);
        snapshot
    }

    /// Ask the agent how much energy is left to compensate.
    pub async fn request_status<S: AsRef<str>>(&self, consumption: &[S], production: &[S]) -> FlowOutcome {
        let usage = match net_usage(consumption, production) {
            Ok(usage) => usage,
            Err(e) => {
                tracing::error!(error = %e, "Failed to get amount of kWh to compensate");
                self.notify(NoticeKind::Error, "Failed to get amount of kWh to compensate!", INTERNAL_ERROR);
                return FlowOutcome::Failed(e);
            }
        };
        tracing::info!(address = %self.address(), usage, "Requesting compensation status");

        match self.fetch_status(usage).await {
            Ok(status) => {
                let last_date = status
                    .last_compensation_date
                    .clone()
                    .unwrap_or_else(|| NEVER_COMPENSATED.to_string());
                self.notify(
                    NoticeKind::Success,
                    "Got amount of kWh to compensate!",
                    format!(
                        "Last compensated: {last_date}, to compensate: {} kWh.",
                        status.kwh_to_compensate
                    ),
                );
                let snapshot = self
                    .commit(|state| {
                        state.to_compensate = Quantity::Kwh(status.kwh_to_compensate);
                        state.total_compensated = Quantity::Kwh(usage - status.kwh_to_compensate);
                        state.last_compensation_date = last_date;
                    })
                    .await;
                FlowOutcome::Updated(snapshot)
            }
            Err(e) if e.is_timeout() => {
                tracing::error!(error = %e, "Failed to get amount of kWh to compensate");
                self.notify(
                    NoticeKind::Warning,
                    "PubSub timeout!",
                    "Failed to get amount of kWh to compensate. PubSub timeout.",
                );
                FlowOutcome::TimedOut
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to get amount of kWh to compensate");
                self.notify(NoticeKind::Error, "Failed to get amount of kWh to compensate!", INTERNAL_ERROR);
                FlowOutcome::Failed(e)
            }
        }
    }

    async fn fetch_status(&self, usage: f64) -> Result<CompensationStatus, ClientError> {
        let reading = UsageReading::new(self.address(), usage);
        let payload = codec::encode(&reading).map_err(ClientError::from);
        self.engine
            .request(
                STATUS_QUERY_TOPIC,
                STATUS_RESPONSE_TOPIC,
                ResponseFilter::for_response::<CompensationStatus>(self.address()),
                self.config.status_deadline,
                std::future::ready(payload),
            )
            .await
    }

    /// Claim compensation for the amount the last status reported.
    pub async fn submit_compensation(&self) -> FlowOutcome {
        let to_compensate = self.state.read().await.to_compensate;
        let kwh = match to_compensate {
            Quantity::Kwh(kwh) if kwh == 0.0 => {
                self.notify(NoticeKind::Info, "Nothing to compensate!", "You have no kWh to compensate.");
                return FlowOutcome::Skipped;
            }
            Quantity::Kwh(kwh) => kwh,
            Quantity::Unknown => {
                self.notify(
                    NoticeKind::Info,
                    "Nothing to compensate!",
                    "Amount of kWh to compensate is unknown. Query the compensation status first.",
                );
                return FlowOutcome::Skipped;
            }
        };
        tracing::info!(address = %self.address(), kwh, geo = %self.config.geo, "Submitting offset claim");

        match self.claim(kwh).await {
            Ok(report) if report.success => {
                let reference = report.report.clone().unwrap_or_default();
                self.notify(
                    NoticeKind::Success,
                    "Successful compensation!",
                    format!(
                        "Successfully compensated carbon footprint. See liability report {reference} for details."
                    ),
                );
                let today = chrono::Local::now().format("%Y-%m-%d").to_string();
                let snapshot = self
                    .commit(|state| {
                        state.to_compensate = Quantity::Unknown;
                        state.total_compensated = Quantity::from(report.total);
                        state.last_compensation_date = today;
                    })
                    .await;
                FlowOutcome::Updated(snapshot)
            }
            Ok(_) => {
                tracing::error!("Offsetting agent reported a failed compensation");
                self.notify(
                    NoticeKind::Error,
                    "Offsetting agent error!",
                    "Failed to burn carbon units. Internal agent error.",
                );
                FlowOutcome::AgentFailure
            }
            Err(e) if e.is_timeout() => {
                tracing::error!(error = %e, "Failed to compensate");
                self.notify(
                    NoticeKind::Warning,
                    "PubSub timeout!",
                    "Failed to get compensation report. PubSub timeout. \
                     Check amount of kWh to compensate in case assets were burned.",
                );
                FlowOutcome::TimedOut
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to compensate");
                self.notify(NoticeKind::Error, "Failed to compensate!", INTERNAL_ERROR);
                FlowOutcome::Failed(e)
            }
        }
    }

    /// Staging and signing run inside the claim deadline.
    async fn claim(&self, kwh: f64) -> Result<OffsetReport, ClientError> {
        self.engine
            .request(
                CLAIM_QUERY_TOPIC,
                CLAIM_RESPONSE_TOPIC,
                ResponseFilter::for_response::<OffsetReport>(self.address()),
                self.config.claim_deadline,
                self.build_claim(kwh),
            )
            .await
    }

    async fn build_claim(&self, kwh: f64) -> Result<Vec<u8>, ClientError> {
        let technics = TechnicsDocument {
            geo: self.config.geo.clone(),
            kwh,
        };
        let content_ref = stage(self.store.as_ref(), &technics).await?;
        let signature = self.signer.sign(&content_ref, CLAIM_ECONOMICS)?;
        let claim = OffsetClaim::new(content_ref, self.address(), signature);
        tracing::debug!(technics = %claim.technics, "Offset claim built");
        Ok(codec::encode(&claim)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_net_usage() {
        assert_eq!(net_usage(&["120.0", "30.0"], &["50.0"]).unwrap(), 100.0);
        assert_eq!(net_usage::<&str>(&[], &[]).unwrap(), 0.0);
    }

    #[test]
    fn test_net_usage_skips_bad_readings() {
        assert_eq!(net_usage(&["10", "unavailable", "inf", " 5.5 "], &["NaN", "1.5"]).unwrap(), 14.0);
    }

    #[test]
    fn test_net_usage_overflow_is_an_error() {
        let err = net_usage(&["1e308", "1e308"], &[]).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUsage(_)));

        assert!(net_usage(&["1e308"], &["-1e308"]).is_err());
        assert_eq!(net_usage(&["1e308"], &["1e308"]).unwrap(), 0.0);
    }
}
