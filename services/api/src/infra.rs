use chrono::NaiveDate;
use grievance_core::lifecycle::signals::SignalWebhookPayload;
use grievance_core::lifecycle::{
    DirectoryError, EventId, HookError, Identity, IdentityDirectory, IntegrationHook,
    NotificationError, NotificationSender, TimelineEvent,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Directory backed by a map of registered people. Unregistered ids fall back to a
/// synthesized mailbox when a domain is configured.
#[derive(Default, Clone)]
pub(crate) struct InMemoryIdentityDirectory {
    people: Arc<Mutex<HashMap<String, Identity>>>,
    fallback_domain: Option<String>,
}

impl InMemoryIdentityDirectory {
    pub(crate) fn with_fallback_domain(domain: impl Into<String>) -> Self {
        Self {
            people: Arc::default(),
            fallback_domain: Some(domain.into()),
        }
    }

    pub(crate) fn register(
        &self,
        user_id: &str,
        display_name: &str,
        email: &str,
    ) -> Result<(), DirectoryError> {
        let mut guard = self
            .people
            .lock()
            .map_err(|_| DirectoryError::Unavailable("directory mutex poisoned".to_string()))?;
        guard.insert(
            user_id.to_string(),
            Identity {
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                email: email.to_string(),
            },
        );
        Ok(())
    }
}

impl IdentityDirectory for InMemoryIdentityDirectory {
    fn resolve(&self, user_id: &str) -> Result<Option<Identity>, DirectoryError> {
        let guard = self
            .people
            .lock()
            .map_err(|_| DirectoryError::Unavailable("directory mutex poisoned".to_string()))?;
        if let Some(identity) = guard.get(user_id) {
            return Ok(Some(identity.clone()));
        }
        Ok(self.fallback_domain.as_ref().map(|domain| Identity {
            user_id: user_id.to_string(),
            display_name: user_id.to_string(),
            email: format!("{user_id}@{domain}"),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutboxMessage {
    pub(crate) recipients: Vec<String>,
    pub(crate) subject: String,
}

/// Notification sender that logs each delivery and keeps a copy for inspection.
#[derive(Default, Clone)]
pub(crate) struct LoggingOutbox {
    messages: Arc<Mutex<Vec<OutboxMessage>>>,
}

impl LoggingOutbox {
    pub(crate) fn messages(&self) -> Vec<OutboxMessage> {
        self.messages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl NotificationSender for LoggingOutbox {
    fn send(
        &self,
        recipients: &[Identity],
        subject: &str,
        _body: &str,
    ) -> Result<(), NotificationError> {
        let emails: Vec<String> = recipients
            .iter()
            .map(|identity| identity.email.clone())
            .collect();
        info!(recipients = ?emails, subject, "notification queued");

        let mut guard = self
            .messages
            .lock()
            .map_err(|_| NotificationError::Transport("outbox mutex poisoned".to_string()))?;
        guard.push(OutboxMessage {
            recipients: emails,
            subject: subject.to_string(),
        });
        Ok(())
    }
}

/// Records timeline pushes and signal payloads, logging the webhook target they are
/// addressed to. Delivery over the wire is left to the platform transport.
#[derive(Default, Clone)]
pub(crate) struct LoggingIntegrationHook {
    webhook_url: Option<String>,
    pushed: Arc<Mutex<Vec<EventId>>>,
    published: Arc<Mutex<Vec<SignalWebhookPayload>>>,
}

impl LoggingIntegrationHook {
    pub(crate) fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            ..Self::default()
        }
    }

    pub(crate) fn published(&self) -> Vec<SignalWebhookPayload> {
        self.published
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl IntegrationHook for LoggingIntegrationHook {
    fn push_timeline(&self, event: &TimelineEvent) -> Result<(), HookError> {
        let mut guard = self
            .pushed
            .lock()
            .map_err(|_| HookError::Transport("integration mutex poisoned".to_string()))?;
        guard.push(event.id.clone());
        Ok(())
    }

    fn publish_signal(&self, payload: &SignalWebhookPayload) -> Result<(), HookError> {
        let Some(url) = &self.webhook_url else {
            return Ok(());
        };
        let body = serde_json::to_string(payload)
            .map_err(|err| HookError::Transport(err.to_string()))?;
        info!(
            url = %url,
            case = %payload.case_ref,
            signal = payload.signal.signal_type.as_str(),
            bytes = body.len(),
            "signal webhook prepared"
        );

        let mut guard = self
            .published
            .lock()
            .map_err(|_| HookError::Transport("integration mutex poisoned".to_string()))?;
        guard.push(payload.clone());
        Ok(())
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
