//! Lazy splitting of a YAML or JSON manifest stream.
use super::{DecodedResource, GroupVersionKind};
use serde::Deserialize;
use serde_json::de::StrRead;
use serde_json::{StreamDeserializer, Value};
use thiserror::Error;

/// A document that could not be turned into a resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("document {index}: {message}")]
pub struct DecodeError {
    /// Zero-based position of the document in the stream.
    pub index: usize,
    pub message: String,
}

enum Source<'a> {
    Yaml(serde_yaml::Deserializer<'a>),
    Json(StreamDeserializer<'a, StrRead<'a>, Value>),
}

/// Forward-only iterator over the documents of one manifest stream.
///
/// Null and empty documents are skipped. After the first error the iterator
/// is exhausted.
pub struct Documents<'a> {
    source: Source<'a>,
    position: usize,
    done: bool,
}

/// Decode `text` lazily. Streams whose first non-whitespace character is `{`
/// are read as concatenated JSON values; everything else as YAML split on
/// `---`.
pub fn decode_documents(text: &str) -> Documents<'_> {
    let source = if text.trim_start().starts_with('{') {
        Source::Json(serde_json::Deserializer::from_str(text).into_iter::<Value>())
    } else {
        Source::Yaml(serde_yaml::Deserializer::from_str(text))
    };
    Documents {
        source,
        position: 0,
        done: false,
    }
}

impl Documents<'_> {
    fn next_value(&mut self) -> Option<Result<Value, String>> {
        match &mut self.source {
            Source::Yaml(documents) => {
                let document = documents.next()?;
                Some(Value::deserialize(document).map_err(|err| err.to_string()))
            }
            Source::Json(values) => Some(values.next()?.map_err(|err| err.to_string())),
        }
    }
}

impl Iterator for Documents<'_> {
    type Item = Result<DecodedResource, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let Some(value) = self.next_value() else {
                self.done = true;
                return None;
            };
            let index = self.position;
            self.position += 1;
            let result = match value {
                Ok(Value::Null) => continue,
                Ok(value) => to_resource(index, value),
                Err(message) => Err(DecodeError { index, message }),
            };
            if result.is_err() {
                self.done = true;
            }
            return Some(result);
        }
    }
}

fn to_resource(index: usize, value: Value) -> Result<DecodedResource, DecodeError> {
    let fail = |message: String| DecodeError { index, message };
    let Value::Object(object) = value else {
        return Err(fail(format!(
            "expected a mapping, found {}",
            value_kind(&value)
        )));
    };
    let field = |name: &str| {
        object
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let api_version = field("apiVersion").ok_or_else(|| fail("missing apiVersion".to_string()))?;
    let kind = field("kind").ok_or_else(|| fail("missing kind".to_string()))?;
    let gvk = GroupVersionKind::from_api_version(&api_version, &kind);
    if gvk.version.is_empty() {
        return Err(fail(format!("invalid apiVersion {api_version:?}")));
    }
    Ok(DecodedResource { index, gvk, object })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
