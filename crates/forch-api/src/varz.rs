// Prometheus varz scraping
//
// Fetches the controller's text exposition over HTTP and keeps only the
// metric families the caller asks for. Used to rebuild state after a
// restart and to sample per-VLAN packet counters.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::error::Error;

/// One labeled sample of a metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl Sample {
    pub fn new<K, V>(labels: impl IntoIterator<Item = (K, V)>, value: f64) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            value,
        }
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

/// Metric name to samples, as scraped at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSnapshot(HashMap<String, Vec<Sample>>);

impl MetricSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, metric: &str) -> Option<&[Sample]> {
        self.0.get(metric).map(Vec::as_slice)
    }

    pub fn insert(&mut self, metric: impl Into<String>, samples: Vec<Sample>) {
        self.0.insert(metric.into(), samples);
    }

    /// Append one sample, creating the family if needed.
    pub fn push(&mut self, metric: impl Into<String>, sample: Sample) {
        self.0.entry(metric.into()).or_default().push(sample);
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.0.contains_key(metric)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

// ── Text exposition parsing ─────────────────────────────────────────

/// Parse the Prometheus text format, keeping only `targets`.
///
/// An empty `targets` keeps every family. Malformed sample lines are
/// logged and skipped.
pub fn parse_text(text: &str, targets: &[&str]) -> MetricSnapshot {
    let mut snapshot = MetricSnapshot::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_sample_line(line) {
            Some((name, sample)) => {
                if targets.is_empty() || targets.contains(&name) {
                    snapshot.push(name, sample);
                }
            }
            None => warn!(line = lineno + 1, text = line, "skipping malformed metric line"),
        }
    }
    snapshot
}

/// `name{label="value",...} value [timestamp]`
fn parse_sample_line(line: &str) -> Option<(&str, Sample)> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if name.is_empty() {
        return None;
    }

    let mut rest = &line[name_end..];
    let mut labels = BTreeMap::new();
    if let Some(body) = rest.strip_prefix('{') {
        let (parsed, after) = parse_labels(body)?;
        labels = parsed;
        rest = after;
    }

    let value = rest.split_whitespace().next()?;
    let value = match value {
        "+Inf" => f64::INFINITY,
        "-Inf" => f64::NEG_INFINITY,
        "NaN" => f64::NAN,
        other => other.parse().ok()?,
    };
    Some((name, Sample { labels, value }))
}

/// Parse label pairs up to the closing `}`; returns the remainder.
fn parse_labels(mut body: &str) -> Option<(BTreeMap<String, String>, &str)> {
    let mut labels = BTreeMap::new();
    loop {
        body = body.trim_start_matches([' ', ',']);
        if let Some(after) = body.strip_prefix('}') {
            return Some((labels, after));
        }

        let eq = body.find('=')?;
        let key = body[..eq].trim().to_owned();
        body = body[eq + 1..].trim_start().strip_prefix('"')?;

        let mut value = String::new();
        let mut chars = body.char_indices();
        let close = loop {
            let (idx, c) = chars.next()?;
            match c {
                '"' => break idx,
                '\\' => match chars.next()?.1 {
                    'n' => value.push('\n'),
                    escaped => value.push(escaped),
                },
                other => value.push(other),
            }
        };
        labels.insert(key, value);
        body = &body[close + 1..];
    }
}

// ── HTTP client ─────────────────────────────────────────────────────

/// Scrapes one varz endpoint.
#[derive(Debug, Clone)]
pub struct VarzClient {
    http: reqwest::Client,
    endpoint: Url,
    retries: u32,
    retry_delay: Duration,
}

impl VarzClient {
    pub fn new(endpoint: Url) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    /// Use a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, endpoint: Url) -> Self {
        Self {
            http,
            endpoint,
            retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_retries(mut self, retries: u32, retry_delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Fetch once and keep the `targets` families.
    pub async fn get_metrics(&self, targets: &[&str]) -> Result<MetricSnapshot, Error> {
        debug!(url = %self.endpoint, "scraping varz");
        let resp = self.http.get(self.endpoint.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::VarzStatus {
                status: status.as_u16(),
            });
        }
        let body = resp.text().await?;
        Ok(parse_text(&body, targets))
    }

    /// [`get_metrics`](Self::get_metrics) with bounded retries. An empty
    /// result counts as a failed attempt. Non-transient errors are returned
    /// immediately.
    pub async fn retry_get_metrics(&self, targets: &[&str]) -> Result<MetricSnapshot, Error> {
        for attempt in 0..self.retries {
            match self.get_metrics(targets).await {
                Ok(snapshot) if !snapshot.is_empty() => return Ok(snapshot),
                Ok(_) => warn!(attempt, "varz metrics are empty"),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    warn!(error = %e, attempt, "cannot retrieve varz metrics");
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
        Err(Error::MetricsUnavailable {
            retries: self.retries,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const VARZ: &str = r#"
# HELP port_status status of switch ports
# TYPE port_status gauge
port_status{dp_id="0x1",dp_name="sw1",port="1"} 1.0
port_status{dp_id="0x1",dp_name="sw1",port="2"} 0.0
# HELP faucet_event_id highest/most recent event ID to be sent
faucet_event_id 57.0
learned_l2_port{dp_name="sw1",eth_src="00:11:22:33:44:55",vid="10"} 3
unrelated_metric 9
"#;

    #[test]
    fn parses_only_target_families() {
        let snapshot = parse_text(VARZ, &["port_status", "faucet_event_id", "learned_l2_port"]);

        assert_eq!(snapshot.len(), 3);
        assert!(!snapshot.contains("unrelated_metric"));

        let ports = snapshot.get("port_status").unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].label("dp_name"), Some("sw1"));
        assert_eq!(ports[1].label("port"), Some("2"));
        assert!(ports[1].value.abs() < f64::EPSILON);

        let event_id = snapshot.get("faucet_event_id").unwrap();
        assert!(event_id[0].labels.is_empty());
        assert!((event_id[0].value - 57.0).abs() < f64::EPSILON);
    }

    #[test]
    fn label_values_unescape() {
        let (name, sample) =
            parse_sample_line(r#"desc{text="a \"quoted\" \\ value",x="1"} 2 1700000000"#).unwrap();
        assert_eq!(name, "desc");
        assert_eq!(sample.label("text"), Some(r#"a "quoted" \ value"#));
        assert_eq!(sample.label("x"), Some("1"));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let snapshot = parse_text("port_status{dp_name=\"sw1\" 1\nfaucet_event_id abc\nok 1\n", &[]);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("ok"));
    }
}
