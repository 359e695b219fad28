use crate::migration::Direction;
use once_cell::sync::Lazy;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use std::time::Duration;

pub static METRICS: Lazy<TidemarkMetrics> = Lazy::new(TidemarkMetrics::init);

pub struct TidemarkMetrics {
    pub registry: Registry,
    /// `None` when the Prometheus exporter could not be built; instruments then record to a no-op meter
    pub provider: Option<SdkMeterProvider>,
    pub migrations_applied: Counter<u64>,
    pub migrations_reverted: Counter<u64>,
    pub seeds_run: Counter<u64>,
    pub migration_duration: Histogram<f64>,
}

impl TidemarkMetrics {
    pub fn init() -> Self {
        let registry = Registry::new();
        let provider = match opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
        {
            Ok(exporter) => Some(SdkMeterProvider::builder().with_reader(exporter).build()),
            Err(e) => {
                log::warn!("Prometheus exporter unavailable: {e}");
                None
            }
        };
        let meter = match &provider {
            Some(provider) => provider.meter("tidemark"),
            None => global::meter("tidemark"),
        };

        let migrations_applied = meter.u64_counter("tidemark_migrations_applied_total")
            .with_description("Migrations applied (up)").build();

        let migrations_reverted = meter.u64_counter("tidemark_migrations_reverted_total")
            .with_description("Migrations reverted (down)").build();

        let seeds_run = meter.u64_counter("tidemark_seeds_run_total")
            .with_description("Seeds executed").build();

        let migration_duration = meter.f64_histogram("tidemark_migration_duration_seconds")
            .with_description("Duration of migration and seed units").build();

        Self {
            registry,
            provider,
            migrations_applied,
            migrations_reverted,
            seeds_run,
            migration_duration,
        }
    }

    pub fn record_migration(&self, direction: Direction, elapsed: Duration) {
        let attrs = [KeyValue::new("direction", direction.as_str())];
        match direction {
            Direction::Up => self.migrations_applied.add(1, &[]),
            Direction::Down => self.migrations_reverted.add(1, &[]),
        }
        self.migration_duration.record(elapsed.as_secs_f64(), &attrs);
    }

    pub fn record_seed(&self, elapsed: Duration) {
        self.seeds_run.add(1, &[]);
        self.migration_duration
            .record(elapsed.as_secs_f64(), &[KeyValue::new("direction", "seed")]);
    }

    /// Current metric families in the Prometheus text exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            log::warn!("Failed to encode metrics: {e}");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
