//! Cell Values
//! The shapes a table cell can hold, as delivered by the host table API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Plain cell content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(Number),
    Bool(bool),
}

impl Scalar {
    pub fn text(s: impl Into<String>) -> Self {
        Scalar::Text(s.into())
    }

    /// Renders the scalar the way it is written into a text cell.
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Text(s) => s.clone(),
            Scalar::Number(n) => n.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

impl From<Value> for Scalar {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Scalar::Text(s),
            Value::Number(n) => Scalar::Number(n),
            Value::Bool(b) => Scalar::Bool(b),
            other => Scalar::Text(other.to_string()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Number::from_f64(value)
            .map(Scalar::Number)
            .unwrap_or_else(|| Scalar::Text(value.to_string()))
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(Number::from(value))
    }
}

/// One piece of a rich-text cell. Only `text`, `value` and `content` carry text;
/// everything else (`type`, `link`, mention metadata, ...) lands in `attributes`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "FragmentRepr")]
pub struct Fragment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// First non-empty of `text`, `value`, `content`.
    pub fn textual_payload(&self) -> Option<&str> {
        [&self.text, &self.value, &self.content]
            .into_iter()
            .filter_map(|candidate| candidate.as_deref())
            .find(|s| !s.is_empty())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FragmentRepr {
    Scalar(Scalar),
    Object(Map<String, Value>),
}

impl From<FragmentRepr> for Fragment {
    fn from(repr: FragmentRepr) -> Self {
        match repr {
            FragmentRepr::Scalar(scalar) => Fragment::text(scalar.to_text()),
            FragmentRepr::Object(mut map) => {
                let mut take = |key: &str| match map.remove(key) {
                    Some(Value::Null) | None => None,
                    Some(Value::String(s)) => Some(s),
                    Some(other) => Some(Scalar::from(other).to_text()),
                };
                let text = take("text");
                let value = take("value");
                let content = take("content");
                Fragment {
                    text,
                    value,
                    content,
                    attributes: map,
                }
            }
        }
    }
}

/// Tagged union over every representation a cell may hold.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Scalar(Scalar),
    RichTextSequence(Vec<Fragment>),
    SingleObject(Fragment),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Scalar(Scalar::Text(s.into()))
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::text(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::text(value)
    }
}
