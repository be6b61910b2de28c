// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Logs and metrics for cache events.

use std::borrow::Cow;

use crate::{CacheEvent, EventKind, Outcome};

pub(crate) mod attributes {
    #[cfg(any(feature = "metrics", test))]
    pub(crate) const CACHE_NAME: &str = "cache.name";

    #[cfg(any(feature = "metrics", test))]
    pub(crate) const CACHE_EVENT: &str = "cache.event";

    #[cfg(test)]
    pub(crate) const CACHE_KEY: &str = "cache.key";
}

#[cfg(feature = "metrics")]
pub(crate) mod metrics {
    use opentelemetry::{
        InstrumentationScope,
        metrics::{Counter, Meter, MeterProvider},
    };

    const METER_NAME: &str = "larder";
    const VERSION: &str = "v0.1.0";
    const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";
    const EVENT_COUNT_NAME: &str = "larder.event.count";

    pub(crate) fn create_meter(meter_provider: &dyn MeterProvider) -> Meter {
        meter_provider.meter_with_scope(
            InstrumentationScope::builder(METER_NAME)
                .with_version(VERSION)
                .with_schema_url(SCHEMA_URL)
                .build(),
        )
    }

    pub(crate) fn create_event_counter(meter: &Meter) -> Counter<u64> {
        meter
            .u64_counter(EVENT_COUNT_NAME)
            .with_description("Response cache events")
            .with_unit("{event}")
            .build()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Severity {
    Debug,
    Info,
    Warn,
}

fn severity(event: &CacheEvent) -> Severity {
    match event {
        CacheEvent::Hit { .. } | CacheEvent::Miss { .. } => Severity::Debug,
        CacheEvent::Stored { .. } | CacheEvent::NotStored { .. } | CacheEvent::PoolSend { .. } => Severity::Info,
        CacheEvent::Finished { outcome, .. } => match outcome {
            Outcome::TimedOut | Outcome::Failed => Severity::Warn,
            _ => Severity::Debug,
        },
    }
}

/// Emits every cache event as a `tracing` event and, when configured, counts it.
#[derive(Clone, Debug)]
pub(crate) struct Telemetry {
    name: Cow<'static, str>,
    #[cfg(feature = "metrics")]
    event_counter: Option<opentelemetry::metrics::Counter<u64>>,
}

impl Telemetry {
    pub(crate) fn new(name: Cow<'static, str>) -> Self {
        Self {
            name,
            #[cfg(feature = "metrics")]
            event_counter: None,
        }
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn with_meter(mut self, meter: &opentelemetry::metrics::Meter) -> Self {
        self.event_counter = Some(metrics::create_event_counter(meter));
        self
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn record(&self, event: &CacheEvent) {
        let kind = event.kind();

        #[cfg(feature = "metrics")]
        if let Some(counter) = &self.event_counter {
            counter.add(
                1,
                &[
                    opentelemetry::KeyValue::new(attributes::CACHE_NAME, self.name.to_string()),
                    opentelemetry::KeyValue::new(attributes::CACHE_EVENT, kind.as_str()),
                ],
            );
        }

        self.emit(kind, event);
    }

    fn emit(&self, kind: EventKind, event: &CacheEvent) {
        let name: &str = &self.name;
        let key = event.key();
        let kind = kind.as_str();

        // Tracing levels must be constant, so a macro selects the level.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    cache.name = name,
                    cache.key = key,
                    cache.event = kind,
                    cache.details = ?event,
                    "cache.event"
                )
            };
        }

        match severity(event) {
            Severity::Debug => emit_event!(debug),
            Severity::Info => emit_event!(info),
            Severity::Warn => emit_event!(warn),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tracing_test::traced_test;

    use super::*;
    use crate::MissReason;

    #[test]
    fn severities_follow_event_importance() {
        let key = String::from("k");
        assert_eq!(
            severity(&CacheEvent::Miss {
                key: key.clone(),
                reasons: vec![MissReason::NotPresent]
            }),
            Severity::Debug
        );
        assert_eq!(severity(&CacheEvent::Stored { key: key.clone(), ttl: None }), Severity::Info);
        assert_eq!(severity(&CacheEvent::NotStored { key: key.clone(), reason: None }), Severity::Info);
        assert_eq!(
            severity(&CacheEvent::Finished {
                key: key.clone(),
                outcome: Outcome::TimedOut
            }),
            Severity::Warn
        );
        assert_eq!(
            severity(&CacheEvent::Finished {
                key: key.clone(),
                outcome: Outcome::Failed
            }),
            Severity::Warn
        );
        assert_eq!(
            severity(&CacheEvent::Finished {
                key,
                outcome: Outcome::Pooled
            }),
            Severity::Debug
        );
    }

    #[test]
    #[traced_test]
    fn events_are_logged_with_dotted_fields() {
        let telemetry = Telemetry::new(Cow::Borrowed("pages"));

        telemetry.record(&CacheEvent::Stored {
            key: "home".to_owned(),
            ttl: Some(Duration::from_secs(60)),
        });

        assert!(logs_contain(attributes::CACHE_KEY));
        assert!(logs_contain(attributes::CACHE_NAME));
        assert!(logs_contain(attributes::CACHE_EVENT));
        assert!(logs_contain("pages"));
        assert!(logs_contain("stored"));
        assert!(logs_contain("INFO"));
    }
}
