use crate::proto;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of a metric series.
///
/// # Examples
///
/// ```
/// use pulsemon_common::types::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!("Counter".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Additive series: a write adds its delta to the stored value.
    Counter,
    /// Last-write-wins series.
    Gauge,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Gauge => write!(f, "gauge"),
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            _ => Err(MetricError::UnknownKind(s.to_string())),
        }
    }
}

/// Validation failures for incoming metrics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricError {
    #[error("unknown metric type: {0}")]
    UnknownKind(String),

    #[error("metric name is required")]
    MissingName,

    #[error("invalid {kind} value: {raw:?}")]
    InvalidValue { kind: MetricKind, raw: String },

    /// Counter without a delta, gauge without a value, or both fields set.
    #[error("metric {0} must have exactly one of delta or value")]
    ValueMismatch(String),

    #[error("counter {0} would overflow")]
    CounterOverflow(String),
}

/// A single named metric as it travels over the wire.
///
/// Counters carry `delta`, gauges carry `value`; the other field is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    /// Builds a metric from the `/update/{type}/{name}/{value}` path segments.
    ///
    /// # Examples
    ///
    /// ```
    /// use pulsemon_common::types::{Metric, MetricKind};
    ///
    /// let m = Metric::parse_path(MetricKind::Counter, "requests", "10").unwrap();
    /// assert_eq!(m.delta, Some(10));
    /// assert!(Metric::parse_path(MetricKind::Counter, "requests", "1.5").is_err());
    /// ```
    pub fn parse_path(kind: MetricKind, name: &str, raw: &str) -> Result<Self, MetricError> {
        if name.is_empty() {
            return Err(MetricError::MissingName);
        }
        let invalid = || MetricError::InvalidValue {
            kind,
            raw: raw.to_string(),
        };
        match kind {
            MetricKind::Counter => raw
                .parse::<i64>()
                .map(|delta| Metric::counter(name, delta))
                .map_err(|_| invalid()),
            MetricKind::Gauge => raw
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(|value| Metric::gauge(name, value))
                .ok_or_else(invalid),
        }
    }

    /// Checks the delta/value invariant for the metric's kind.
    pub fn validate(&self) -> Result<(), MetricError> {
        if self.id.is_empty() {
            return Err(MetricError::MissingName);
        }
        let ok = match self.kind {
            MetricKind::Counter => self.delta.is_some() && self.value.is_none(),
            MetricKind::Gauge => self.value.is_some() && self.delta.is_none(),
        };
        if !ok {
            return Err(MetricError::ValueMismatch(self.id.clone()));
        }
        match self.value {
            // NaN and infinities have no JSON form and could not be restored
            Some(value) if !value.is_finite() => Err(MetricError::InvalidValue {
                kind: self.kind,
                raw: value.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Text form of the carried number: base-10 for counters, shortest
    /// round-trip decimal for gauges.
    ///
    /// # Examples
    ///
    /// ```
    /// use pulsemon_common::types::Metric;
    ///
    /// assert_eq!(Metric::counter("c", 15).value_text(), "15");
    /// assert_eq!(Metric::gauge("g", 0.4).value_text(), "0.4");
    /// assert_eq!(Metric::gauge("g", 3.0).value_text(), "3");
    /// ```
    pub fn value_text(&self) -> String {
        match self.kind {
            MetricKind::Counter => self.delta.unwrap_or_default().to_string(),
            MetricKind::Gauge => self.value.unwrap_or_default().to_string(),
        }
    }
}

/// Point-in-time copy of every stored metric, grouped by kind.
///
/// This is also the on-disk format of the file-backed storage:
/// `{"Counter": {name: int}, "Gauge": {name: float}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(rename = "Counter", default)]
    pub counters: HashMap<String, i64>,
    #[serde(rename = "Gauge", default)]
    pub gauges: HashMap<String, f64>,
}

impl MetricsSnapshot {
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.gauges.is_empty()
    }

    /// Applies a validated metric: counters accumulate, gauges are replaced.
    /// Returns the metric as stored.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::CounterOverflow`] when the new counter sum does
    /// not fit in an `i64`; the snapshot is left unchanged.
    pub fn apply(&mut self, metric: &Metric) -> Result<Metric, MetricError> {
        match metric.kind {
            MetricKind::Counter => {
                let stored = self.counters.entry(metric.id.clone()).or_insert(0);
                *stored = stored
                    .checked_add(metric.delta.unwrap_or_default())
                    .ok_or_else(|| MetricError::CounterOverflow(metric.id.clone()))?;
                Ok(Metric::counter(&metric.id, *stored))
            }
            MetricKind::Gauge => {
                let value = metric.value.unwrap_or_default();
                self.gauges.insert(metric.id.clone(), value);
                Ok(Metric::gauge(&metric.id, value))
            }
        }
    }

    pub fn get(&self, name: &str, kind: MetricKind) -> Option<Metric> {
        match kind {
            MetricKind::Counter => self.counters.get(name).map(|v| Metric::counter(name, *v)),
            MetricKind::Gauge => self.gauges.get(name).map(|v| Metric::gauge(name, *v)),
        }
    }

    /// Every metric of one kind, keyed by name.
    pub fn by_kind(&self, kind: MetricKind) -> HashMap<String, Metric> {
        match kind {
            MetricKind::Counter => self
                .counters
                .iter()
                .map(|(k, v)| (k.clone(), Metric::counter(k, *v)))
                .collect(),
            MetricKind::Gauge => self
                .gauges
                .iter()
                .map(|(k, v)| (k.clone(), Metric::gauge(k, *v)))
                .collect(),
        }
    }

    /// Flattens the snapshot into metrics sorted by kind then name.
    pub fn to_metrics(&self) -> Vec<Metric> {
        let mut counters: Vec<Metric> = self.by_kind(MetricKind::Counter).into_values().collect();
        counters.sort_by(|a, b| a.id.cmp(&b.id));
        let mut gauges: Vec<Metric> = self.by_kind(MetricKind::Gauge).into_values().collect();
        gauges.sort_by(|a, b| a.id.cmp(&b.id));
        counters.extend(gauges);
        counters
    }
}

impl From<MetricKind> for proto::MetricType {
    fn from(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => proto::MetricType::Counter,
            MetricKind::Gauge => proto::MetricType::Gauge,
        }
    }
}

impl TryFrom<i32> for MetricKind {
    type Error = MetricError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match proto::MetricType::try_from(raw) {
            Ok(proto::MetricType::Counter) => Ok(MetricKind::Counter),
            Ok(proto::MetricType::Gauge) => Ok(MetricKind::Gauge),
            _ => Err(MetricError::UnknownKind(raw.to_string())),
        }
    }
}

impl From<&Metric> for proto::Metric {
    fn from(m: &Metric) -> Self {
        proto::Metric {
            id: m.id.clone(),
            r#type: proto::MetricType::from(m.kind) as i32,
            delta: m.delta,
            value: m.value,
        }
    }
}

impl TryFrom<proto::Metric> for Metric {
    type Error = MetricError;

    fn try_from(p: proto::Metric) -> Result<Self, Self::Error> {
        let metric = Metric {
            id: p.id,
            kind: MetricKind::try_from(p.r#type)?,
            delta: p.delta,
            value: p.value,
        };
        metric.validate()?;
        Ok(metric)
    }
}
