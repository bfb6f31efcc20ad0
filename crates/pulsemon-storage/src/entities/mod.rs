pub mod counter_metric;
pub mod gauge_metric;
