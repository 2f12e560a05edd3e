//! Render props.

use serde::Serialize;
use serde_json::Value;

use prerender_common::RenderError;

/// Props passed to a component render.
///
/// Text is handed to the wrapper verbatim; structured values are serialized
/// as JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Props {
    /// Already serialized props.
    Text(String),
    /// Structured props.
    Json(Value),
}

impl Props {
    /// Convert any serializable value into props.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Props`] if the value cannot be represented as JSON.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, RenderError> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// The props text inserted into the wrapper script.
    pub fn into_text(self) -> Result<String, RenderError> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Json(value) => Ok(serde_json::to_string(&value)?),
        }
    }
}

impl Default for Props {
    fn default() -> Self {
        Self::Text("{}".to_string())
    }
}

impl From<&str> for Props {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Props {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for Props {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_is_verbatim() {
        let props = Props::from("{ not: 'json' }");
        assert_eq!(props.into_text().unwrap(), "{ not: 'json' }");
    }

    #[test]
    fn test_json_is_serialized() {
        let props = Props::from(json!({"name": "world", "count": 2}));
        let text = props.into_text().unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, json!({"name": "world", "count": 2}));
    }

    #[test]
    fn test_from_serialize() {
        #[derive(Serialize)]
        struct Greeting {
            name: &'static str,
        }

        let props = Props::from_serialize(&Greeting { name: "Ada" }).unwrap();
        assert_eq!(props, Props::Json(json!({"name": "Ada"})));
    }

    #[test]
    fn test_from_serialize_rejects_non_string_keys() {
        let map = std::collections::HashMap::from([((1, 2), "x")]);
        let err = Props::from_serialize(&map).unwrap_err();
        assert!(matches!(err, RenderError::Props(_)));
    }

    #[test]
    fn test_default() {
        assert_eq!(Props::default().into_text().unwrap(), "{}");
    }
}
