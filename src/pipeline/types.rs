use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A single collected news item. Its shape is owned by the collection workflow,
/// so it is carried through untouched.
pub type NewsItem = Value;

/// Placeholder written into the headline fields when analysis is unavailable.
pub const ANALYSIS_UNAVAILABLE: &str = "Analysis is temporarily unavailable; please refresh later.";

/// Canonical event name plus the ordered news list returned by collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewsCollection {
    pub event_name: String,
    pub news_list: Vec<NewsItem>,
}

/// Structured summary of an event. Every field except `event_name` may be absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub event_name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub key_men: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub event_overview: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub key_point: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub latest: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub event_cause: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub event_process: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub event_result: Option<String>,
    #[serde(default)]
    pub timeline: Option<Value>,
    #[serde(default)]
    pub news_list: Vec<NewsItem>,
}

impl AnalysisResult {
    /// Builds a result from an analysis payload. Only `event_name` is required;
    /// missing summary fields stay `None`.
    pub fn from_payload(payload: &Map<String, Value>) -> Option<Self> {
        let event_name = payload
            .get("event_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())?
            .to_string();

        let news_list = match payload.get("news_list") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };

        Some(AnalysisResult {
            event_name,
            key_men: text_field(payload, "key_men"),
            event_overview: text_field(payload, "event_overview"),
            key_point: text_field(payload, "key_point"),
            latest: text_field(payload, "latest"),
            event_cause: text_field(payload, "event_cause"),
            event_process: text_field(payload, "event_process"),
            event_result: text_field(payload, "event_result"),
            timeline: payload.get("timeline").filter(|v| !v.is_null()).cloned(),
            news_list,
        })
    }

    /// The partial result returned when the analysis workflow could not be used.
    pub fn degraded(event_name: &str, news_list: Vec<NewsItem>) -> Self {
        AnalysisResult {
            event_name: event_name.to_string(),
            event_overview: Some(ANALYSIS_UNAVAILABLE.to_string()),
            key_point: Some(ANALYSIS_UNAVAILABLE.to_string()),
            news_list,
            ..Default::default()
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.event_overview.as_deref() == Some(ANALYSIS_UNAVAILABLE)
            && self.key_point.as_deref() == Some(ANALYSIS_UNAVAILABLE)
    }
}

/// Summary fields are nominally text, but workflows sometimes emit arrays or
/// objects (e.g. a list of key people). Those are kept as their JSON text.
fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn text_field(payload: &Map<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(value_to_text)
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn payload_with_only_event_name_is_accepted() {
        let result = AnalysisResult::from_payload(&as_map(json!({"event_name": "北京暴雨"})))
            .expect("event_name alone is enough");
        assert_eq!(result.event_name, "北京暴雨");
        assert!(result.event_overview.is_none());
        assert!(result.timeline.is_none());
        assert!(result.news_list.is_empty());
    }

    #[test]
    fn payload_without_event_name_is_rejected() {
        assert!(AnalysisResult::from_payload(&as_map(json!({"event_overview": "x"}))).is_none());
        assert!(AnalysisResult::from_payload(&as_map(json!({"event_name": "  "}))).is_none());
    }

    #[test]
    fn non_text_summary_fields_keep_their_json() {
        let result = AnalysisResult::from_payload(&as_map(json!({
            "event_name": "台风",
            "key_men": ["甲", "乙"],
            "latest": null,
            "timeline": [{"time": "2024-07-01", "event": "登陆"}]
        })))
        .unwrap();
        assert_eq!(result.key_men.as_deref(), Some(r#"["甲","乙"]"#));
        assert!(result.latest.is_none());
        assert_eq!(
            result.timeline,
            Some(json!([{"time": "2024-07-01", "event": "登陆"}]))
        );
    }

    #[test]
    fn degraded_result_is_marked() {
        let result = AnalysisResult::degraded("地震", vec![json!("news a")]);
        assert!(result.is_degraded());
        assert_eq!(result.event_name, "地震");
        assert_eq!(result.news_list, vec![json!("news a")]);
        assert!(result.key_men.is_none());
    }

    #[test]
    fn stored_json_deserializes_leniently() {
        let result: AnalysisResult = serde_json::from_value(json!({
            "event_name": "e",
            "key_men": {"name": "x"},
            "news_list": ["a"]
        }))
        .unwrap();
        assert_eq!(result.key_men.as_deref(), Some(r#"{"name":"x"}"#));
        assert_eq!(result.event_overview, None);
    }
}
