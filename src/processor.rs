//! Message processors.
//!
//! A processor takes ownership of a message and always hands one back,
//! together with a [`Status`] describing what happened to it. Failures never
//! drop the message: the caller gets the last consistent version.
use std::sync::Arc;

use futures::future::BoxFuture;
use log::Level;
use uuid::Uuid;

use crate::{
    events::{self, ProcessorAction},
    message::Message,
    metrics::{LatencyMetric, MetricsCollection, SuccessCounterMetric},
    operator::OperatorProvider,
    policy::PolicyProvider,
    status::Status,
};

/// Asynchronous message transformation stage
pub trait Processor: Send + Sync {
    /// Name used in events and metric dimensions
    fn name(&self) -> &str;
    /// Transform `message`
    fn process(&self, message: Message) -> BoxFuture<'_, (Status, Message)>;
}

impl<P: Processor + ?Sized> Processor for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn process(&self, message: Message) -> BoxFuture<'_, (Status, Message)> {
        (**self).process(message)
    }
}

impl<P: Processor + ?Sized> Processor for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn process(&self, message: Message) -> BoxFuture<'_, (Status, Message)> {
        (**self).process(message)
    }
}

#[derive(Debug, Clone, Copy, Default)]
/// Passes every message through untouched
pub struct NullProcessor;

impl Processor for NullProcessor {
    fn name(&self) -> &str {
        "NullProcessor"
    }

    fn process(&self, message: Message) -> BoxFuture<'_, (Status, Message)> {
        Box::pin(async move { (Status::ok(), message) })
    }
}

/// Applies the selected operator to messages accepted by the selected policy
pub struct GenericProcessor<P, O> {
    name: String,
    policies: P,
    operators: O,
}

impl<P: PolicyProvider, O: OperatorProvider> GenericProcessor<P, O> {
    /// Processor named `name`
    pub fn new(name: impl Into<String>, policies: P, operators: O) -> Self {
        Self {
            name: name.into(),
            policies,
            operators,
        }
    }

    fn run(&self, message: Message) -> (Status, Message) {
        let policy = match self.policies.get_policy(&message) {
            Ok(policy) => policy,
            Err(e) => return (Status::err(e), message),
        };
        if !policy.qualifies(&message) {
            return (Status::ok(), message);
        }
        match self.operators.get_operator(&message) {
            Ok(operator) => operator.operate(message),
            Err(e) => (Status::err(e), message),
        }
    }
}

impl<P: PolicyProvider, O: OperatorProvider> Processor for GenericProcessor<P, O> {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, message: Message) -> BoxFuture<'_, (Status, Message)> {
        Box::pin(async move { self.run(message) })
    }
}

/// Runs a chain of processors in order, each seeing the previous output.
///
/// A failing stage does not stop the chain: its returned message moves on to
/// the next stage and the first error is reported once the chain completes.
pub struct CompositeProcessor {
    name: String,
    stages: Vec<Box<dyn Processor>>,
}

impl CompositeProcessor {
    /// Chain running `stages` in order
    pub fn new(name: impl Into<String>, stages: Vec<Box<dyn Processor>>) -> Self {
        Self {
            name: name.into(),
            stages,
        }
    }

    /// Number of stages in the chain
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the chain has no stage
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Processor for CompositeProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, message: Message) -> BoxFuture<'_, (Status, Message)> {
        Box::pin(async move {
            let mut message = message;
            let mut first_error = None;
            for stage in &self.stages {
                let (status, output) = stage.process(message).await;
                message = output;
                if let Some(e) = status.error {
                    log::warn!(
                        "{} stage {} failed on {}: {e}",
                        self.name,
                        stage.name(),
                        message.message_id()
                    );
                    first_error.get_or_insert(e);
                }
            }
            let status = match first_error {
                Some(e) => Status::err(e),
                None => Status::ok(),
            };
            (status, message)
        })
    }
}

/// Emits begin and end events around each processed message
pub struct EventLoggingProcessor<P> {
    inner: P,
}

impl<P: Processor> EventLoggingProcessor<P> {
    /// Wrap `inner`
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: Processor> Processor for EventLoggingProcessor<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn process(&self, message: Message) -> BoxFuture<'_, (Status, Message)> {
        Box::pin(async move {
            let activity_id = Uuid::new_v4();
            events::emit(
                Level::Trace,
                "ProcessorAction",
                &ProcessorAction::begin(self.name(), activity_id, &message),
            );
            let (status, message) = self.inner.process(message).await;
            events::emit(
                events::outcome_level(&status),
                "ProcessorAction",
                &ProcessorAction::end(self.name(), activity_id, &status, &message),
            );
            (status, message)
        })
    }
}

/// Counts outcomes and times each processed message
pub struct MetricsProcessor<P> {
    inner: P,
    outcomes: Arc<SuccessCounterMetric>,
    latency: Arc<LatencyMetric>,
}

impl<P: Processor> MetricsProcessor<P> {
    /// Wrap `inner`, registering `{name}_Process` and `{name}_Latency`
    pub fn new(inner: P, metrics: &mut MetricsCollection) -> Self {
        let name = inner.name().to_string();
        Self {
            outcomes: metrics.add(SuccessCounterMetric::new(format!("{name}_Process"), Vec::new())),
            latency: metrics.add(LatencyMetric::new(format!("{name}_Latency"), Vec::new())),
            inner,
        }
    }
}

impl<P: Processor> Processor for MetricsProcessor<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn process(&self, message: Message) -> BoxFuture<'_, (Status, Message)> {
        Box::pin(async move {
            let (status, message) = {
                let _timer = self.latency.time_or_warn();
                self.inner.process(message).await
            };
            self.outcomes.record(status.is_ok());
            (status, message)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        error::{GnssError, OperationError},
        geo::GeoCoordinates,
        message::{ParsedPayload, ProtocolTag},
        nmea::NmeaSentence,
        offset::StaticOffsetProvider,
        operator::OffsetOperatorProvider,
        policy::{ConstPolicyProvider, HasLocation, ProtocolPolicyProvider},
    };
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const GLL: &[u8] = b"$GNGLL,4238.96342,N,07118.97943,W,221515.00,A,D*68\r\n";

    fn gll() -> Message {
        Message::new(
            ProtocolTag::Nmea,
            ParsedPayload::Nmea(NmeaSentence::parse(GLL).unwrap()),
        )
    }

    fn lat(message: &Message) -> String {
        match &message.payload {
            ParsedPayload::Nmea(sentence) => sentence.get("lat").unwrap_or_default().to_string(),
            ParsedPayload::Ubx(msg) => msg.get("lat").unwrap_or_default().to_string(),
        }
    }

    fn offsetting(name: &str, lat: &str) -> GenericProcessor<ConstPolicyProvider, OffsetOperatorProvider> {
        let offset = GeoCoordinates::new(Decimal::from_str(lat).unwrap(), Decimal::ZERO, Decimal::ZERO);
        GenericProcessor::new(
            name,
            ConstPolicyProvider::new(HasLocation::default()),
            OffsetOperatorProvider::new(Arc::new(StaticOffsetProvider(offset))),
        )
    }

    struct Failing;

    impl Processor for Failing {
        fn name(&self) -> &str {
            "Failing"
        }

        fn process(&self, message: Message) -> BoxFuture<'_, (Status, Message)> {
            Box::pin(async move {
                let error = OperationError::InvalidOperation("stage failed".into());
                (Status::err(error.into()), message)
            })
        }
    }

    #[tokio::test]
    async fn null_passes_through() {
        let message = gll();
        let (status, output) = NullProcessor.process(message.clone()).await;
        assert_eq!(status, Status::ok());
        assert_eq!(output, message);
    }

    #[tokio::test]
    async fn generic_applies_operator_to_qualifying_messages() {
        let (status, output) = offsetting("Offset", "1").process(gll()).await;
        assert!(status.is_ok());
        assert_eq!(lat(&output), "4338.96342");
    }

    #[tokio::test]
    async fn generic_skips_non_qualifying_messages() {
        let vtg = Message::new(
            ProtocolTag::Nmea,
            ParsedPayload::Nmea(NmeaSentence::parse(b"$GNVTG,,T,,M,0.046,N,0.086,K,D*34\r\n").unwrap()),
        );
        let (status, output) = offsetting("Offset", "1").process(vtg.clone()).await;
        assert!(status.is_ok());
        assert_eq!(output, vtg);
    }

    #[tokio::test]
    async fn generic_reports_missing_policy() {
        let processor = GenericProcessor::new(
            "Offset",
            ProtocolPolicyProvider::new(),
            OffsetOperatorProvider::new(Arc::new(StaticOffsetProvider(GeoCoordinates::default()))),
        );
        let (status, output) = processor.process(gll()).await;
        assert_eq!(status.error, Some(GnssError::UnsupportedProtocol(ProtocolTag::Nmea)));
        assert_eq!(lat(&output), "4238.96342");
    }

    #[tokio::test]
    async fn composite_chains_stages_in_order() {
        let composite = CompositeProcessor::new(
            "Chain",
            vec![
                Box::new(offsetting("First", "1")),
                Box::new(offsetting("Second", "2")),
            ],
        );
        let (status, output) = composite.process(gll()).await;
        assert!(status.is_ok());
        assert_eq!(lat(&output), "4538.96342");
    }

    #[tokio::test]
    async fn composite_continues_after_failure() {
        let composite = CompositeProcessor::new(
            "Chain",
            vec![
                Box::new(offsetting("Overflow", "100")),
                Box::new(Failing),
                Box::new(offsetting("Shift", "1")),
            ],
        );
        let (status, output) = composite.process(gll()).await;
        assert!(matches!(
            status.error,
            Some(GnssError::Operation(OperationError::Precision(_)))
        ));
        assert_eq!(lat(&output), "4338.96342");
        assert_eq!(composite.len(), 3);
    }

    #[tokio::test]
    async fn decorators_count_outcomes() {
        let mut metrics = MetricsCollection::new();
        let processor = MetricsProcessor::new(
            EventLoggingProcessor::new(CompositeProcessor::new(
                "Chain",
                vec![Box::new(NullProcessor), Box::new(Failing)],
            )),
            &mut metrics,
        );
        assert_eq!(processor.name(), "Chain");
        let message = gll();
        let (status, output) = processor.process(message.clone()).await;
        assert!(!status.is_ok());
        assert_eq!(output.message_id(), message.message_id());
        let (status, _) = MetricsProcessor::new(NullProcessor, &mut metrics)
            .process(message)
            .await;
        assert!(status.is_ok());
        let map = metrics.mappify();
        assert_eq!(map["Chain_Process_Failure"], 1.0);
        assert_eq!(map["Chain_Process_Success"], 0.0);
        assert_eq!(map["NullProcessor_Process_Success"], 1.0);
        assert!(map["Chain_Latency"].is_finite());
    }
}
