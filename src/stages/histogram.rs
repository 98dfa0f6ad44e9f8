// src/stages/histogram.rs

//! Reader for "histogram set" result files.
//!
//! A histogram set is a JSON array mixing histograms and shared diagnostics.
//! Shared diagnostics (`"type": "GenericSet"`) are referenced from a
//! histogram's `diagnostics` map by guid; everything else without a `type`
//! is a histogram.
//!
//! Histograms are addressed by a test path:
//! `name[/grouping_label][/escaped_story]`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::graph::{HistogramOptions, TraceUrl};
use crate::stages::read_value::ReadValueError;
use crate::types::Statistic;

pub const STORIES: &str = "stories";
pub const STORY_TAGS: &str = "storyTags";
pub const SUMMARY_KEYS: &str = "summaryKeys";
pub const TRACE_URLS: &str = "traceUrls";

static ESCAPE_RE: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"[:|=/#&,]"));

/// Running statistics as serialized by the harness:
/// `[count, max, meanlogs, mean, min, sum, variance]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunningStatistics {
    pub count: u64,
    pub max: f64,
    pub meanlogs: Option<f64>,
    pub mean: f64,
    pub min: f64,
    pub sum: f64,
    /// Sum of squared deviations (not yet divided by `count - 1`).
    pub variance: Option<f64>,
}

impl RunningStatistics {
    fn from_json(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        if items.len() != 7 {
            return None;
        }
        let float = |i: usize| items[i].as_f64();
        Some(Self {
            count: items[0].as_f64().map(|c| c as u64)?,
            max: float(1)?,
            meanlogs: float(2),
            mean: float(3)?,
            min: float(4)?,
            sum: float(5)?,
            variance: float(6),
        })
    }

    /// Sample standard deviation (Bessel-corrected).
    pub fn stddev(&self) -> Option<f64> {
        match self.count {
            0 => None,
            1 => Some(0.0),
            n => self.variance.map(|v| (v / (n - 1) as f64).sqrt()),
        }
    }

    pub fn statistic(&self, statistic: Statistic) -> Option<f64> {
        match statistic {
            Statistic::Avg => Some(self.mean),
            Statistic::Min => Some(self.min),
            Statistic::Max => Some(self.max),
            Statistic::Sum => Some(self.sum),
            Statistic::Std => self.stddev(),
            Statistic::Count => Some(self.count as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub name: String,
    pub diagnostics: BTreeMap<String, Vec<String>>,
    pub running: Option<RunningStatistics>,
    pub sample_values: Vec<f64>,
}

impl Histogram {
    fn diagnostic(&self, name: &str) -> &[String] {
        self.diagnostics
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Raw samples, or the requested statistic of them.
    pub fn values(&self, statistic: Option<Statistic>) -> Vec<f64> {
        let Some(statistic) = statistic else {
            return self.sample_values.clone();
        };
        if self.sample_values.is_empty() {
            return Vec::new();
        }
        self.running
            .as_ref()
            .and_then(|r| r.statistic(statistic))
            .into_iter()
            .collect()
    }

    /// Grouping label derived from `key:value` story tags: values sorted by
    /// key and joined with `_`.
    pub fn grouping_label(&self) -> Option<String> {
        let mut tags: Vec<(&str, &str)> = self
            .diagnostic(STORY_TAGS)
            .iter()
            .filter_map(|t| t.split_once(':'))
            .collect();
        if tags.is_empty() {
            return None;
        }
        tags.sort();
        Some(tags.iter().map(|(_, v)| *v).collect::<Vec<_>>().join("_"))
    }

    /// The story, when exactly one is recorded.
    pub fn story(&self) -> Option<&str> {
        match self.diagnostic(STORIES) {
            [story] => Some(story.as_str()),
            _ => None,
        }
    }

    pub fn test_path(&self, ignore_grouping_label: bool) -> String {
        let grouping_label = if ignore_grouping_label {
            None
        } else {
            self.grouping_label()
        };
        test_path_from_components(
            &self.name,
            grouping_label.as_deref(),
            self.story(),
            self.diagnostic(SUMMARY_KEYS),
            true,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramSet {
    histograms: Vec<Histogram>,
}

impl HistogramSet {
    pub fn from_json(value: &Value) -> Result<Self, ReadValueError> {
        let dicts = value.as_array().ok_or_else(|| {
            ReadValueError::InvalidJson("histogram set must be a JSON array".to_string())
        })?;

        let shared: HashMap<&str, Vec<String>> = dicts
            .iter()
            .filter(|d| d.get("type").and_then(Value::as_str) == Some("GenericSet"))
            .filter_map(|d| {
                let guid = d.get("guid")?.as_str()?;
                Some((guid, string_values(d.get("values"))))
            })
            .collect();

        let mut histograms = Vec::new();
        for dict in dicts.iter().filter(|d| d.get("type").is_none()) {
            histograms.push(parse_histogram(dict, &shared)?);
        }
        debug!(histograms = histograms.len(), shared = shared.len(), "parsed histogram set");
        Ok(Self { histograms })
    }

    pub fn len(&self) -> usize {
        self.histograms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histograms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Histogram> {
        self.histograms.iter()
    }

    /// Unique trace links, sorted by url.
    pub fn trace_urls(&self) -> Vec<TraceUrl> {
        let urls: BTreeSet<&str> = self
            .histograms
            .iter()
            .flat_map(|h| h.diagnostic(TRACE_URLS).iter().map(String::as_str))
            .collect();
        urls.into_iter()
            .map(|url| TraceUrl {
                name: url.rsplit('/').next().unwrap_or(url).to_string(),
                url: url.to_string(),
            })
            .collect()
    }

    fn by_test_path(&self, ignore_grouping_label: bool) -> BTreeMap<String, Vec<&Histogram>> {
        let mut out: BTreeMap<String, Vec<&Histogram>> = BTreeMap::new();
        for h in &self.histograms {
            out.entry(h.test_path(ignore_grouping_label)).or_default().push(h);
        }
        out
    }
}

fn parse_histogram(dict: &Value, shared: &HashMap<&str, Vec<String>>) -> Result<Histogram, ReadValueError> {
    let name = dict
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ReadValueError::InvalidJson("histogram without a name".to_string()))?;

    let mut diagnostics = BTreeMap::new();
    if let Some(map) = dict.get("diagnostics").and_then(Value::as_object) {
        for (key, value) in map {
            if key == "tagmap" {
                continue;
            }
            let values = match value {
                Value::String(guid) => match shared.get(guid.as_str()) {
                    Some(v) => v.clone(),
                    None => continue,
                },
                other => string_values(other.get("values")),
            };
            diagnostics.insert(key.clone(), values);
        }
    }

    let sample_values = dict
        .get("sampleValues")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();

    Ok(Histogram {
        name: name.to_string(),
        diagnostics,
        running: dict.get("running").and_then(RunningStatistics::from_json),
        sample_values,
    })
}

fn string_values(values: Option<&Value>) -> Vec<String> {
    values
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .map(|v| match v.as_str() {
                    Some(s) => s.to_string(),
                    None => v.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Replace characters that cannot appear in a test path segment with `_`.
pub fn escape_name(name: &str) -> String {
    match ESCAPE_RE.as_ref() {
        Ok(re) => re.replace_all(name, "_").into_owned(),
        Err(_) => name
            .chars()
            .map(|c| if ":|=/#&,".contains(c) { '_' } else { c })
            .collect(),
    }
}

pub fn test_path_from_components(
    name: &str,
    grouping_label: Option<&str>,
    story: Option<&str>,
    summary_keys: &[String],
    escape: bool,
) -> String {
    let mut path = name.to_string();
    let is_summary = !summary_keys.is_empty();

    if let Some(label) = grouping_label.filter(|l| !l.is_empty()) {
        if !is_summary || summary_keys.iter().any(|k| k == STORY_TAGS) {
            path.push('/');
            path.push_str(label);
        }
    }

    if let Some(story) = story.filter(|s| !s.is_empty()) {
        if !is_summary {
            path.push('/');
            if escape {
                path.push_str(&escape_name(story));
            } else {
                path.push_str(story);
            }
        }
    }

    path
}

/// Pull the values selected by `options` out of a histogram set.
///
/// Looks for exact test-path matches first. When nothing matches, the
/// lookup is retried with grouping labels left out of every path, whether
/// or not one was requested. With no exact match, histograms whose path starts with the
/// requested one are summed into a single summary value.
pub fn extract_values(set: &HistogramSet, options: &HistogramOptions) -> Result<Vec<f64>, ReadValueError> {
    let with_label = extract_with(set, options, options.grouping_label.as_deref(), false);
    match with_label {
        Err(ReadValueError::NotFound(_)) => {
            debug!("no histogram matched, retrying without grouping labels");
            extract_with(set, options, None, true).map_err(|e| match e {
                ReadValueError::NotFound(_) => ReadValueError::NotFound(conditions(options)),
                other => other,
            })
        }
        other => other,
    }
}

fn extract_with(
    set: &HistogramSet,
    options: &HistogramOptions,
    grouping_label: Option<&str>,
    ignore_grouping_label: bool,
) -> Result<Vec<f64>, ReadValueError> {
    let name = options.histogram_name.as_deref().unwrap_or_default();
    let story = options.story.as_deref();
    let by_path = set.by_test_path(ignore_grouping_label);

    let mut paths_to_match = vec![test_path_from_components(name, grouping_label, story, &[], true)];
    let unescaped = test_path_from_components(name, grouping_label, story, &[], false);
    if !paths_to_match.contains(&unescaped) {
        paths_to_match.push(unescaped);
    }

    let mut values = Vec::new();
    let mut matched = 0usize;

    let exact: Vec<&Histogram> = paths_to_match
        .iter()
        .filter_map(|p| by_path.get(p))
        .flatten()
        .copied()
        .collect();

    if !exact.is_empty() {
        matched = exact.len();
        for h in exact {
            values.extend(h.values(options.statistic));
        }
    } else if !name.is_empty() {
        let mut summary = Vec::new();
        for (path, histograms) in &by_path {
            if paths_to_match.iter().any(|p| path.starts_with(p.as_str())) {
                for h in histograms {
                    summary.extend(h.values(options.statistic));
                    matched += 1;
                }
            }
        }
        if !summary.is_empty() {
            values.push(summary.iter().sum());
        }
    }

    if values.is_empty() && !name.is_empty() {
        if matched > 0 {
            return Err(ReadValueError::NoValues);
        }
        return Err(ReadValueError::NotFound(conditions(options)));
    }
    Ok(values)
}

fn conditions(options: &HistogramOptions) -> String {
    let mut parts = Vec::new();
    if let Some(name) = &options.histogram_name {
        parts.push(format!("histogram:{name}"));
    }
    if let Some(label) = &options.grouping_label {
        parts.push(format!("grouping_label:{label}"));
    }
    if let Some(story) = &options.story {
        parts.push(format!("story:{story}"));
    }
    parts.join(", ")
}
