use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Recognised insight keys, in summary order.
pub const EXPECTED_KEYS: [&str; 4] = ["trends", "averages", "anomalies", "comparisons"];

/// Computed insights as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InsightsBundle {
    /// A JSON object. Empty when no insights were given.
    Structured(Map<String, Value>),
    /// Text that is not JSON, or JSON that is not an object.
    Raw(String),
}

impl InsightsBundle {
    /// Case-insensitive key lookup. Raw bundles have no keys.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            InsightsBundle::Structured(map) => map
                .get(key)
                .or_else(|| {
                    map.iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(key))
                        .map(|(_, v)| v)
                }),
            InsightsBundle::Raw(_) => None,
        }
    }

    pub fn missing_expected_keys(&self) -> Vec<&'static str> {
        let mut missing: Vec<&'static str> = EXPECTED_KEYS
            .iter()
            .copied()
            .filter(|k| self.get(k).is_none())
            .collect();
        missing.sort_unstable();
        missing
    }

    pub fn has_all_expected_keys(&self) -> bool {
        matches!(self, InsightsBundle::Structured(_)) && self.missing_expected_keys().is_empty()
    }

    /// True only for an empty structured mapping.
    pub fn is_empty(&self) -> bool {
        matches!(self, InsightsBundle::Structured(map) if map.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInsights {
    pub bundle: InsightsBundle,
    /// Human-readable parse notes, repeated in the summary and limitations sections.
    pub notes: Vec<String>,
}

/// Never fails: anything that is not a JSON object is kept as raw text.
pub fn parse_insights(text: &str) -> ParsedInsights {
    let mut notes = Vec::new();
    if text.trim().is_empty() {
        notes.push("No computed insights provided.".to_string());
        return ParsedInsights {
            bundle: InsightsBundle::Structured(Map::new()),
            notes,
        };
    }

    let bundle = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => {
            let bundle = InsightsBundle::Structured(map);
            let missing = bundle.missing_expected_keys();
            if !missing.is_empty() {
                let quoted: Vec<String> = missing.iter().map(|k| format!("'{k}'")).collect();
                notes.push(format!(
                    "Parsed insights missing expected fields: [{}]",
                    quoted.join(", ")
                ));
            }
            bundle
        }
        Ok(_) => {
            notes.push("Insights JSON must be an object/dictionary.".to_string());
            InsightsBundle::Raw(text.to_string())
        }
        Err(_) => InsightsBundle::Raw(text.to_string()),
    };

    ParsedInsights { bundle, notes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn blank_text_is_an_empty_mapping_with_note() {
        let p = parse_insights("   ");
        assert!(p.bundle.is_empty());
        assert_eq!(p.notes, vec!["No computed insights provided.".to_string()]);
    }

    #[test]
    fn non_json_is_raw_without_note() {
        let p = parse_insights("revenue is up");
        assert_eq!(p.bundle, InsightsBundle::Raw("revenue is up".to_string()));
        assert!(p.notes.is_empty());
    }

    #[test]
    fn json_array_is_raw_with_note() {
        let p = parse_insights("[1, 2]");
        assert_eq!(p.bundle, InsightsBundle::Raw("[1, 2]".to_string()));
        assert_eq!(p.notes, vec!["Insights JSON must be an object/dictionary.".to_string()]);
    }

    #[test]
    fn missing_keys_are_listed_sorted() {
        let p = parse_insights(r#"{"trends": "up", "Averages": {"AOV": 45.2}}"#);
        assert_eq!(
            p.notes,
            vec!["Parsed insights missing expected fields: ['anomalies', 'comparisons']".to_string()]
        );
        assert!(p.bundle.get("averages").is_some());
        assert!(!p.bundle.has_all_expected_keys());
    }

    #[test]
    fn complete_object_has_no_notes() {
        let p = parse_insights(
            r#"{"trends":"Revenue up 5%","averages":{"AOV":45.2},"anomalies":["spike"],"comparisons":{"region":"A>B"}}"#,
        );
        assert!(p.notes.is_empty());
        assert!(p.bundle.has_all_expected_keys());
    }
}
