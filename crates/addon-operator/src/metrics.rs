use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts};

lazy_static::lazy_static! {
    pub static ref RECONCILE_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        Opts::new(
            "addon_operator_reconcile_total",
            "Total number of config reconciliations"
        ),
        &["result"]
    )
    .unwrap();

    pub static ref RECONCILE_DURATION: HistogramVec = prometheus::register_histogram_vec!(
        HistogramOpts::new(
            "addon_operator_reconcile_duration_seconds",
            "Duration of config reconciliations in seconds"
        ),
        &[]
    )
    .unwrap();

    pub static ref WORK_APPLIES_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        Opts::new(
            "addon_operator_work_applies_total",
            "Total number of manifest-work create/update writes"
        ),
        &["tier"]
    )
    .unwrap();

    pub static ref MANAGED_CONFIGS: IntGaugeVec = prometheus::register_int_gauge_vec!(
        Opts::new(
            "addon_operator_managed_configs",
            "Number of managed addon configs per namespace"
        ),
        &["namespace"]
    )
    .unwrap();

    pub static ref CSR_RECONCILE_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        Opts::new(
            "addon_operator_csr_reconcile_total",
            "Total number of certificate-request reconciliations"
        ),
        &["result"]
    )
    .unwrap();
}

pub fn increment_reconcile_total(result: &str) {
    RECONCILE_TOTAL.with_label_values(&[result]).inc();
}

pub fn observe_reconcile_duration(duration_secs: f64) {
    RECONCILE_DURATION
        .with_label_values(&[] as &[&str])
        .observe(duration_secs);
}

pub fn increment_work_applies(tier: &str) {
    WORK_APPLIES_TOTAL.with_label_values(&[tier]).inc();
}

pub fn set_managed_configs(namespace: &str, count: i64) {
    MANAGED_CONFIGS.with_label_values(&[namespace]).set(count);
}

pub fn increment_csr_reconcile_total(result: &str) {
    CSR_RECONCILE_TOTAL.with_label_values(&[result]).inc();
}
