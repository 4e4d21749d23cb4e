//! Risk-routed notification dispatch.
//!
//! CRITICAL events go out immediately, one message per event. HIGH
//! events are grouped into a single batch message per run. MEDIUM and
//! LOW events queue for the daily digest. Channel failures are isolated:
//! they are counted in the dispatch report and never affect the already
//! committed run.

use crate::config::NotifierConfig;
use crate::error::PipelineError;
use crate::schema::{ChangeEvent, ChangeType, ChannelKind, RiskLevel, Source};

use async_trait::async_trait;
use chrono::SecondsFormat;
use futures::future::join_all;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

/// Rendered, channel-agnostic message. Deterministic given its events.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
    pub risk_level: RiskLevel,
    pub source: Option<Source>,
    pub event_ids: Vec<Uuid>,
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn send(&self, message: &NotificationMessage) -> Result<(), PipelineError>;
}

// ── Channels ────────────────────────────────────────────────────

/// Always-available channel writing through the tracing pipeline.
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Log
    }

    async fn send(&self, message: &NotificationMessage) -> Result<(), PipelineError> {
        info!(
            risk = %message.risk_level,
            title = %message.title,
            events = message.event_ids.len(),
            "{}",
            message.body
        );
        Ok(())
    }
}

/// Generic JSON webhook.
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        WebhookChannel { client, url }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn send(&self, message: &NotificationMessage) -> Result<(), PipelineError> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| PipelineError::Notification {
                channel: ChannelKind::Webhook,
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(PipelineError::Notification {
                channel: ChannelKind::Webhook,
                reason: format!("HTTP {}", response.status()),
            });
        }
        Ok(())
    }
}

/// Slack incoming webhook.
pub struct SlackChannel {
    client: reqwest::Client,
    url: String,
}

impl SlackChannel {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        SlackChannel { client, url }
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    async fn send(&self, message: &NotificationMessage) -> Result<(), PipelineError> {
        let payload = serde_json::json!({
            "text": format!("*{}*\n{}", message.title, message.body),
        });
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::Notification {
                channel: ChannelKind::Slack,
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(PipelineError::Notification {
                channel: ChannelKind::Slack,
                reason: format!("HTTP {}", response.status()),
            });
        }
        Ok(())
    }
}

/// Email delivery via an HTTP relay; the relay owns SMTP concerns.
pub struct EmailChannel {
    client: reqwest::Client,
    relay_url: String,
}

impl EmailChannel {
    pub fn new(client: reqwest::Client, relay_url: String) -> Self {
        EmailChannel { client, relay_url }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, message: &NotificationMessage) -> Result<(), PipelineError> {
        let payload = serde_json::json!({
            "subject": message.title,
            "body": message.body,
            "risk_level": message.risk_level,
        });
        let response = self
            .client
            .post(&self.relay_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::Notification {
                channel: ChannelKind::Email,
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(PipelineError::Notification {
                channel: ChannelKind::Email,
                reason: format!("HTTP {}", response.status()),
            });
        }
        Ok(())
    }
}

// ── Dispatcher ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// CRITICAL messages delivered on at least one channel.
    pub immediate_sent: usize,
    /// Whether the HIGH batch message was delivered.
    pub batch_sent: bool,
    pub queued_for_digest: usize,
    pub channel_errors: Vec<(ChannelKind, String)>,
    /// Events to stamp with `notification_sent_at`.
    pub notified_events: Vec<Uuid>,
    /// Channels that delivered at least one message.
    pub channels: Vec<ChannelKind>,
}

pub struct Notifier {
    channels: Vec<Arc<dyn NotificationChannel>>,
    digest_queue: Mutex<Vec<ChangeEvent>>,
}

impl Notifier {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Notifier {
            channels,
            digest_queue: Mutex::new(Vec::new()),
        }
    }

    /// LOG is always enabled; the HTTP-backed channels join when their
    /// endpoint is configured.
    pub fn from_config(config: &NotifierConfig) -> Self {
        let client = reqwest::Client::new();
        let mut channels: Vec<Arc<dyn NotificationChannel>> = vec![Arc::new(LogChannel)];
        if let Some(url) = &config.webhook_url {
            channels.push(Arc::new(WebhookChannel::new(client.clone(), url.clone())));
        }
        if let Some(url) = &config.slack_webhook_url {
            channels.push(Arc::new(SlackChannel::new(client.clone(), url.clone())));
        }
        if let Some(url) = &config.email_relay_url {
            channels.push(Arc::new(EmailChannel::new(client.clone(), url.clone())));
        }
        Notifier::new(channels)
    }

    pub fn pending_digest_count(&self) -> usize {
        self.digest_queue.lock().unwrap().len()
    }

    /// Route one run's committed change events by risk.
    pub async fn dispatch_run_changes(
        &self,
        source: Source,
        events: &[ChangeEvent],
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        let critical: Vec<&ChangeEvent> = events
            .iter()
            .filter(|e| e.risk_level == RiskLevel::Critical)
            .collect();
        let high: Vec<&ChangeEvent> = events
            .iter()
            .filter(|e| e.risk_level == RiskLevel::High)
            .collect();

        for event in &critical {
            let message = render_event(event);
            let delivered = self.broadcast(&message, &mut report).await;
            if !delivered.is_empty() {
                report.immediate_sent += 1;
                report.notified_events.push(event.event_id);
            }
        }

        if !high.is_empty() {
            let message = render_high_batch(source, &high);
            let delivered = self.broadcast(&message, &mut report).await;
            if !delivered.is_empty() {
                report.batch_sent = true;
                report
                    .notified_events
                    .extend(high.iter().map(|e| e.event_id));
            }
        }

        {
            let mut queue = self.digest_queue.lock().unwrap();
            for event in events
                .iter()
                .filter(|e| matches!(e.risk_level, RiskLevel::Medium | RiskLevel::Low))
            {
                queue.push(event.clone());
                report.queued_for_digest += 1;
            }
        }

        if !report.channel_errors.is_empty() {
            warn!(
                %source,
                errors = report.channel_errors.len(),
                "some notification channels failed"
            );
        }
        report
    }

    /// Assemble and send the daily digest from the queued MEDIUM/LOW
    /// events. Returns `None` when the queue is empty.
    pub async fn send_digest(&self) -> Option<DispatchReport> {
        let mut events: Vec<ChangeEvent> = {
            let mut queue = self.digest_queue.lock().unwrap();
            std::mem::take(&mut *queue)
        };
        if events.is_empty() {
            return None;
        }
        events.sort_by(|a, b| {
            a.detected_at
                .cmp(&b.detected_at)
                .then_with(|| a.entity_uid.cmp(&b.entity_uid))
        });

        let message = render_digest(&events);
        let mut report = DispatchReport::default();
        let delivered = self.broadcast(&message, &mut report).await;
        if !delivered.is_empty() {
            report
                .notified_events
                .extend(events.iter().map(|e| e.event_id));
        }
        Some(report)
    }

    /// Send one message on every channel; failures are collected, not
    /// propagated. Returns the kinds that delivered.
    async fn broadcast(
        &self,
        message: &NotificationMessage,
        report: &mut DispatchReport,
    ) -> Vec<ChannelKind> {
        let sends = self.channels.iter().map(|channel| {
            let channel = Arc::clone(channel);
            async move { (channel.kind(), channel.send(message).await) }
        });

        let mut delivered = Vec::new();
        for (kind, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    delivered.push(kind);
                    if !report.channels.contains(&kind) {
                        report.channels.push(kind);
                    }
                }
                Err(err) => report.channel_errors.push((kind, err.to_string())),
            }
        }
        delivered
    }
}

// ── Templates ───────────────────────────────────────────────────

fn timestamp(event: &ChangeEvent) -> String {
    event
        .detected_at
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn render_event(event: &ChangeEvent) -> NotificationMessage {
    let mut body = format!(
        "Entity: {} ({})\nSource: {}\nChange: {}\nRisk: {}\nDetected: {}",
        event.entity_name,
        event.entity_uid,
        event.source,
        event.change_type,
        event.risk_level,
        timestamp(event),
    );
    if !event.field_changes.is_empty() {
        body.push_str("\nFields:");
        for field in &event.field_changes {
            body.push_str(&format!(
                "\n  - {}: {} -> {}",
                field.field_name, field.old_value, field.new_value
            ));
        }
    }
    NotificationMessage {
        title: format!(
            "{} sanctions change: {}",
            event.risk_level, event.entity_name
        ),
        body,
        risk_level: event.risk_level,
        source: Some(event.source),
        event_ids: vec![event.event_id],
    }
}

fn render_high_batch(source: Source, events: &[&ChangeEvent]) -> NotificationMessage {
    let mut body = format!("{} HIGH risk changes from {}:", events.len(), source);
    for event in events {
        body.push_str(&format!(
            "\n- {} {} ({}) at {}",
            event.change_type,
            event.entity_name,
            event.entity_uid,
            timestamp(event),
        ));
    }
    NotificationMessage {
        title: format!("HIGH risk sanctions changes from {source}"),
        body,
        risk_level: RiskLevel::High,
        source: Some(source),
        event_ids: events.iter().map(|e| e.event_id).collect(),
    }
}

fn render_digest(events: &[ChangeEvent]) -> NotificationMessage {
    let count = |change_type: ChangeType| {
        events
            .iter()
            .filter(|e| e.change_type == change_type)
            .count()
    };
    let mut body = format!(
        "{} queued changes (added: {}, modified: {}, removed: {})",
        events.len(),
        count(ChangeType::Added),
        count(ChangeType::Modified),
        count(ChangeType::Removed),
    );
    for event in events {
        body.push_str(&format!(
            "\n- [{}] {} {} ({}) from {}",
            event.risk_level,
            event.change_type,
            event.entity_name,
            event.entity_uid,
            event.source,
        ));
    }
    NotificationMessage {
        title: format!("Daily sanctions digest ({} changes)", events.len()),
        body,
        risk_level: RiskLevel::Low,
        source: None,
        event_ids: events.iter().map(|e| e.event_id).collect(),
    }
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;

    struct RecordingChannel {
        kind: ChannelKind,
        messages: Mutex<Vec<NotificationMessage>>,
    }

    impl RecordingChannel {
        fn new(kind: ChannelKind) -> Arc<Self> {
            Arc::new(RecordingChannel {
                kind,
                messages: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<NotificationMessage> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        async fn send(&self, message: &NotificationMessage) -> Result<(), PipelineError> {
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct FailingChannel;

    #[async_trait]
    impl NotificationChannel for FailingChannel {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Webhook
        }

        async fn send(&self, _message: &NotificationMessage) -> Result<(), PipelineError> {
            Err(PipelineError::Notification {
                channel: ChannelKind::Webhook,
                reason: "endpoint down".into(),
            })
        }
    }

    fn event(uid: &str, risk: RiskLevel, change_type: ChangeType) -> ChangeEvent {
        ChangeEvent {
            event_id: Uuid::new_v4(),
            entity_uid: uid.into(),
            entity_name: format!("Entity {uid}"),
            source: Source::Ofac,
            change_type,
            risk_level: risk,
            field_changes: Vec::new(),
            change_summary: String::new(),
            old_content_hash: None,
            new_content_hash: None,
            detected_at: Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap(),
            scraper_run_id: "run".into(),
            processing_time_ms: None,
            notification_sent_at: None,
            notification_channels: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_critical_sends_one_message_per_event() {
        let recorder = RecordingChannel::new(ChannelKind::Log);
        let notifier = Notifier::new(vec![recorder.clone()]);

        let events = vec![
            event("1", RiskLevel::Critical, ChangeType::Removed),
            event("2", RiskLevel::Critical, ChangeType::Added),
        ];
        let report = notifier.dispatch_run_changes(Source::Ofac, &events).await;

        assert_eq!(report.immediate_sent, 2);
        assert_eq!(report.notified_events.len(), 2);
        assert_eq!(recorder.sent().len(), 2);
        assert!(report.channel_errors.is_empty());
    }

    #[tokio::test]
    async fn test_high_events_are_batched_into_one_message() {
        let recorder = RecordingChannel::new(ChannelKind::Log);
        let notifier = Notifier::new(vec![recorder.clone()]);

        let events = vec![
            event("1", RiskLevel::High, ChangeType::Modified),
            event("2", RiskLevel::High, ChangeType::Modified),
            event("3", RiskLevel::High, ChangeType::Modified),
        ];
        let report = notifier.dispatch_run_changes(Source::Ofac, &events).await;

        assert!(report.batch_sent);
        assert_eq!(report.notified_events.len(), 3);
        let sent = recorder.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event_ids.len(), 3);
        assert!(sent[0].body.contains("3 HIGH risk changes"));
    }

    #[tokio::test]
    async fn test_medium_and_low_queue_for_digest() {
        let recorder = RecordingChannel::new(ChannelKind::Log);
        let notifier = Notifier::new(vec![recorder.clone()]);

        let events = vec![
            event("1", RiskLevel::Medium, ChangeType::Added),
            event("2", RiskLevel::Low, ChangeType::Modified),
        ];
        let report = notifier.dispatch_run_changes(Source::Ofac, &events).await;

        assert_eq!(report.queued_for_digest, 2);
        assert_eq!(report.immediate_sent, 0);
        assert!(report.notified_events.is_empty());
        assert!(recorder.sent().is_empty());
        assert_eq!(notifier.pending_digest_count(), 2);
    }

    #[tokio::test]
    async fn test_channel_failure_is_isolated() {
        let recorder = RecordingChannel::new(ChannelKind::Log);
        let notifier = Notifier::new(vec![recorder.clone(), Arc::new(FailingChannel)]);

        let events = vec![event("1", RiskLevel::Critical, ChangeType::Removed)];
        let report = notifier.dispatch_run_changes(Source::Ofac, &events).await;

        // the healthy channel still delivered
        assert_eq!(report.immediate_sent, 1);
        assert_eq!(report.channels, vec![ChannelKind::Log]);
        assert_eq!(report.channel_errors.len(), 1);
        assert_eq!(report.channel_errors[0].0, ChannelKind::Webhook);
    }

    #[tokio::test]
    async fn test_all_channels_failing_leaves_events_unnotified() {
        let notifier = Notifier::new(vec![Arc::new(FailingChannel)]);
        let events = vec![event("1", RiskLevel::Critical, ChangeType::Removed)];
        let report = notifier.dispatch_run_changes(Source::Ofac, &events).await;
        assert_eq!(report.immediate_sent, 0);
        assert!(report.notified_events.is_empty());
        assert_eq!(report.channel_errors.len(), 1);
    }

    #[tokio::test]
    async fn test_digest_drains_queue_and_sends() {
        let recorder = RecordingChannel::new(ChannelKind::Log);
        let notifier = Notifier::new(vec![recorder.clone()]);

        notifier
            .dispatch_run_changes(
                Source::Ofac,
                &[
                    event("1", RiskLevel::Medium, ChangeType::Added),
                    event("2", RiskLevel::Low, ChangeType::Modified),
                ],
            )
            .await;

        let report = notifier.send_digest().await.expect("digest sent");
        assert_eq!(report.notified_events.len(), 2);
        assert_eq!(notifier.pending_digest_count(), 0);

        let sent = recorder.sent();
        assert!(sent[0].title.contains("Daily sanctions digest (2 changes)"));

        // queue is empty now
        assert!(notifier.send_digest().await.is_none());
    }

    #[tokio::test]
    async fn test_message_rendering_is_deterministic() {
        let mut e = event("7160", RiskLevel::Critical, ChangeType::Modified);
        e.field_changes.push(crate::schema::FieldChange {
            field_name: "programs".into(),
            old_value: serde_json::json!(["SDGT"]),
            new_value: serde_json::json!(["CYBER", "SDGT"]),
            kind: crate::schema::FieldChangeKind::Modified,
        });

        let a = render_event(&e);
        let b = render_event(&e);
        assert_eq!(a.title, b.title);
        assert_eq!(a.body, b.body);
        assert!(a.body.contains("Detected: 2026-01-15T12:00:00Z"));
        assert!(a.body.contains("programs: [\"SDGT\"] -> [\"CYBER\",\"SDGT\"]"));
    }
}
