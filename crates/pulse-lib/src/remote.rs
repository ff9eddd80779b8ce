//! Remote HRV analysis over a topic-based publish/subscribe transport.

use crate::{
    error::RemoteError, record::MeasurementRecord, signal::PpiSeries, sink::MeasurementSink,
};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub const RRI_REQUEST_TYPE: &str = "RRI";
/// Reply payload the analysis service sends for a request it cannot handle.
pub const INVALID_REQUEST_REPLY: &str = "Invalid request";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub request_topic: String,
    pub response_topic: String,
    pub timeout_ms: u64,
    pub analysis_type: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            request_topic: "pulse/analysis-request".into(),
            response_topic: "pulse/analysis-response".into(),
            timeout_ms: 10_000,
            analysis_type: "readiness".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSpec {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Request body: `{id, type: "RRI", data: [ms...], analysis: {type}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Vec<u64>,
    pub analysis: AnalysisSpec,
}

impl AnalysisRequest {
    pub fn rri(id: u64, intervals: &PpiSeries, analysis_type: &str) -> Self {
        Self {
            id,
            kind: RRI_REQUEST_TYPE.into(),
            data: intervals.as_millis(),
            analysis: AnalysisSpec {
                kind: analysis_type.into(),
            },
        }
    }
}

/// Parse one analysis reply into an extended measurement record.
pub fn parse_response(payload: &str) -> Result<MeasurementRecord, RemoteError> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    if let Some(data) = value.get("data").and_then(|d| d.as_str()) {
        if data == INVALID_REQUEST_REPLY {
            return Err(RemoteError::InvalidRequest(data.to_string()));
        }
    }
    Ok(serde_json::from_value(value)?)
}

/// Topic-addressed message transport.
pub trait Transport {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), RemoteError>;
    fn subscribe(&mut self, topic: &str) -> Result<(), RemoteError>;
    /// Next message on a subscribed topic, waiting at most `timeout`.
    fn recv(&mut self, topic: &str, timeout: Duration) -> Result<String, RemoteError>;
}

type Subscribers = HashMap<String, Vec<Sender<String>>>;

/// In-process topic fan-out. Messages published with no subscriber are
/// dropped.
#[derive(Clone, Default)]
pub struct Broker {
    topics: Arc<Mutex<Subscribers>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self) -> BrokerClient {
        BrokerClient {
            broker: self.clone(),
            subscriptions: HashMap::new(),
        }
    }

    fn attach(&self, topic: &str) -> Receiver<String> {
        let (tx, rx) = unbounded();
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Deliver `payload` to every live subscriber; returns how many got it.
    pub fn publish(&self, topic: &str, payload: &str) -> usize {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = topics.get_mut(topic) else {
            debug!("no subscribers on '{topic}', message dropped");
            return 0;
        };
        subscribers.retain(|tx| tx.send(payload.to_string()).is_ok());
        subscribers.len()
    }
}

/// One participant on a [`Broker`].
pub struct BrokerClient {
    broker: Broker,
    subscriptions: HashMap<String, Receiver<String>>,
}

impl Transport for BrokerClient {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), RemoteError> {
        let delivered = self.broker.publish(topic, payload);
        debug!("published {} bytes on '{topic}' to {delivered}", payload.len());
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), RemoteError> {
        if !self.subscriptions.contains_key(topic) {
            let rx = self.broker.attach(topic);
            self.subscriptions.insert(topic.to_string(), rx);
        }
        Ok(())
    }

    fn recv(&mut self, topic: &str, timeout: Duration) -> Result<String, RemoteError> {
        let rx = self
            .subscriptions
            .get(topic)
            .ok_or_else(|| RemoteError::NotSubscribed(topic.to_string()))?;
        rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => RemoteError::Timeout {
                topic: topic.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            },
            RecvTimeoutError::Disconnected => RemoteError::Disconnected(topic.to_string()),
        })
    }
}

/// Request/response client for the remote analysis service.
pub struct RemoteAnalyzer<T> {
    transport: T,
    config: RemoteConfig,
}

impl<T: Transport> RemoteAnalyzer<T> {
    /// Subscribes to the response topic up front so no reply is missed.
    pub fn new(mut transport: T, config: RemoteConfig) -> Result<Self, RemoteError> {
        transport.subscribe(&config.response_topic)?;
        Ok(Self { transport, config })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Build the RRI request for a session's intervals.
    pub fn request_for(&self, id: u64, intervals: &PpiSeries) -> AnalysisRequest {
        AnalysisRequest::rri(id, intervals, &self.config.analysis_type)
    }

    /// Publish `request` and wait for exactly one reply on the response topic.
    pub fn analyze(&mut self, request: &AnalysisRequest) -> Result<MeasurementRecord, RemoteError> {
        let payload = serde_json::to_string(request)?;
        self.transport.publish(&self.config.request_topic, &payload)?;
        info!(
            "sent {} intervals for '{}' analysis",
            request.data.len(),
            request.analysis.kind
        );
        let reply = self.transport.recv(
            &self.config.response_topic,
            Duration::from_millis(self.config.timeout_ms),
        )?;
        match parse_response(&reply) {
            Ok(record) => Ok(record),
            Err(err) => {
                warn!("remote analysis failed: {err}");
                Err(err)
            }
        }
    }
}

/// Publishes local measurements on a topic.
pub struct TopicPublisher<T> {
    transport: T,
    topic: String,
}

impl<T: Transport> TopicPublisher<T> {
    pub fn new(transport: T, topic: impl Into<String>) -> Self {
        Self {
            transport,
            topic: topic.into(),
        }
    }
}

impl<T: Transport> MeasurementSink for TopicPublisher<T> {
    fn name(&self) -> &str {
        &self.topic
    }

    fn submit(&mut self, record: &MeasurementRecord) -> anyhow::Result<()> {
        let payload = serde_json::to_string(record)?;
        self.transport.publish(&self.topic, &payload)?;
        Ok(())
    }
}
