use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::error::{PublisherError, Result};

/// Visual features reported for one image, keyed by category
pub type ImageFeatures = BTreeMap<String, Vec<String>>;

/// A feature shared by enough posts in a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonFeature {
    /// Normalised feature text
    pub feature: String,
    /// Number of occurrences across the group
    pub frequency: usize,
    /// `frequency / total_posts * 100`, one decimal
    pub percentage: f64,
}

/// Common features of a group, keyed by category
pub type CommonFeatures = BTreeMap<String, Vec<CommonFeature>>;

/// Parses the model's JSON feature reply, tolerating a markdown fence
///
/// Non-string items are kept as their JSON text and `null` items are dropped;
/// blank items are discarded later by [`find_common_features`].
pub fn parse_feature_response(text: &str) -> Result<ImageFeatures> {
    let body = strip_json_fence(text);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| PublisherError::Parse(format!("Feature response is not valid JSON: {}", e)))?;

    let object = match value {
        Value::Object(map) => map,
        other => {
            return Err(PublisherError::Parse(format!(
                "Feature response must be a JSON object, got {}",
                json_kind(&other)
            )))
        }
    };

    Ok(object
        .into_iter()
        .map(|(category, value)| (category, feature_items(value)))
        .collect())
}

fn strip_json_fence(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

fn feature_items(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.into_iter().filter_map(item_text).collect(),
        other => item_text(other).into_iter().collect(),
    }
}

fn item_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Finds features that appear in at least `threshold` of the analysed posts
///
/// Items are compared lowercased and trimmed. Every category seen in the
/// input is present in the result, possibly with an empty list.
pub fn find_common_features(analyzed: &[ImageFeatures], threshold: f64) -> CommonFeatures {
    let total_posts = analyzed.len();
    if total_posts == 0 {
        return CommonFeatures::new();
    }

    // Per category: first-seen order of features plus their counts
    let mut counts: BTreeMap<&str, (Vec<String>, HashMap<String, usize>)> = BTreeMap::new();
    for features in analyzed {
        for (category, items) in features {
            let (order, tally) = counts.entry(category.as_str()).or_default();
            for item in items {
                let normalized = item.trim().to_lowercase();
                if normalized.is_empty() {
                    continue;
                }
                let count = tally.entry(normalized.clone()).or_insert(0);
                if *count == 0 {
                    order.push(normalized);
                }
                *count += 1;
            }
        }
    }

    counts
        .into_iter()
        .map(|(category, (order, tally))| {
            let mut common: Vec<CommonFeature> = order
                .into_iter()
                .filter_map(|feature| {
                    let frequency = tally.get(&feature).copied().unwrap_or(0);
                    let share = frequency as f64 / total_posts as f64;
                    (share >= threshold).then(|| CommonFeature {
                        percentage: (share * 1000.0).round() / 10.0,
                        frequency,
                        feature,
                    })
                })
                .collect();
            common.sort_by(|a, b| b.frequency.cmp(&a.frequency));
            (category.to_string(), common)
        })
        .collect()
}

/// Feature names of a category, most frequent first
pub fn top_feature_names(common: &CommonFeatures, category: &str, limit: usize) -> Vec<String> {
    common
        .get(category)
        .map(|items| items.iter().take(limit).map(|f| f.feature.clone()).collect())
        .unwrap_or_default()
}
