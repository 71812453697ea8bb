use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Central registry for all Prometheus metrics.
pub struct MetricsRegistry {
	registry: Registry,

	// Request metrics, labeled by route
	pub requests_total: IntCounterVec,

	// Branch lifecycle
	pub branch_copies_total: IntCounter,
	pub branch_copy_duration_seconds: Histogram,
	pub branch_deletes_total: IntCounter,

	// Merge engine
	pub merge_previews_total: IntCounter,
	pub merge_conflicts_detected_total: IntCounter,
	pub merge_executes_total: IntCounterVec,
	pub merge_execute_duration_seconds: Histogram,
}

impl MetricsRegistry {
	pub fn new() -> Self {
		let registry = Registry::new();

		let requests_total = IntCounterVec::new(
			Opts::new("tabulon_requests_total", "Total HTTP requests received").namespace("tabulon"),
			&["route"],
		)
		.unwrap();

		let branch_copies_total = IntCounter::with_opts(
			Opts::new("tabulon_branch_copies_total", "Total branch copy-on-write operations").namespace("tabulon"),
		)
		.unwrap();

		let branch_copy_duration_seconds = Histogram::with_opts(
			HistogramOpts::new(
				"tabulon_branch_copy_duration_seconds",
				"Duration of branch copy operations in seconds",
			)
			.namespace("tabulon")
			.buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
		)
		.unwrap();

		let branch_deletes_total = IntCounter::with_opts(
			Opts::new("tabulon_branch_deletes_total", "Total branches deleted").namespace("tabulon"),
		)
		.unwrap();

		let merge_previews_total = IntCounter::with_opts(
			Opts::new("tabulon_merge_previews_total", "Total merge preview requests").namespace("tabulon"),
		)
		.unwrap();

		let merge_conflicts_detected_total = IntCounter::with_opts(
			Opts::new(
				"tabulon_merge_conflicts_detected_total",
				"Total merge conflicts detected across all previews",
			)
			.namespace("tabulon"),
		)
		.unwrap();

		let merge_executes_total = IntCounterVec::new(
			Opts::new("tabulon_merge_executes_total", "Total merge execute attempts").namespace("tabulon"),
			&["outcome"],
		)
		.unwrap();

		let merge_execute_duration_seconds = Histogram::with_opts(
			HistogramOpts::new(
				"tabulon_merge_execute_duration_seconds",
				"Duration of merge execute operations in seconds",
			)
			.namespace("tabulon")
			.buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]),
		)
		.unwrap();

		registry.register(Box::new(requests_total.clone())).unwrap();
		registry.register(Box::new(branch_copies_total.clone())).unwrap();
		registry
			.register(Box::new(branch_copy_duration_seconds.clone()))
			.unwrap();
		registry.register(Box::new(branch_deletes_total.clone())).unwrap();
		registry.register(Box::new(merge_previews_total.clone())).unwrap();
		registry
			.register(Box::new(merge_conflicts_detected_total.clone()))
			.unwrap();
		registry.register(Box::new(merge_executes_total.clone())).unwrap();
		registry
			.register(Box::new(merge_execute_duration_seconds.clone()))
			.unwrap();

		Self {
			registry,
			requests_total,
			branch_copies_total,
			branch_copy_duration_seconds,
			branch_deletes_total,
			merge_previews_total,
			merge_conflicts_detected_total,
			merge_executes_total,
			merge_execute_duration_seconds,
		}
	}

	/// Encode metrics in Prometheus text format.
	pub fn encode(&self) -> String {
		let encoder = TextEncoder::new();
		let metric_families = self.registry.gather();
		match encoder.encode_to_string(&metric_families) {
			Ok(s) => s,
			Err(e) => {
				eprintln!("failed to encode metrics: {}", e);
				String::new()
			}
		}
	}
}

impl Default for MetricsRegistry {
	fn default() -> Self {
		Self::new()
	}
}

/// Initialize the global metrics registry.
pub fn init_metrics() -> anyhow::Result<Arc<MetricsRegistry>> {
	Ok(Arc::new(MetricsRegistry::new()))
}

#[cfg(feature = "unit-tests")]
mod tests {
	#[test]
	fn metrics_registry_creation() {
		let registry = super::MetricsRegistry::new();
		assert!(!registry.encode().is_empty());
	}

	#[test]
	fn metrics_increment() {
		let registry = super::MetricsRegistry::new();
		registry.requests_total.with_label_values(&["/branch/create"]).inc();
		registry.merge_conflicts_detected_total.inc_by(3);
		assert!(!registry.encode().is_empty());
	}
}
