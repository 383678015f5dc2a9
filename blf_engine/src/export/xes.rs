//! Process-mining event logs in the XES format.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use num_traits::ToPrimitive;

use super::{write_artifact, Artifact, ExportMode, Sink};
use crate::error::{ExecutionError, ExecutionResult};
use crate::value::Value;

/// The attribute types of the XES standard supported by the exporter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum XesType {
    Boolean,
    Date,
    Float,
    Int,
    String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum XesValue {
    Boolean(bool),
    Date(DateTime<Utc>),
    Float(f64),
    Int(i64),
    String(String),
    List(Vec<XesValue>),
}

impl XesValue {
    /// Converts an engine value to an attribute of type `ty`. Lists are
    /// converted element-wise. Dates are read as unix timestamps in seconds.
    pub fn from_value(ty: XesType, value: &Value) -> ExecutionResult<Self> {
        if let Value::List(values) = value {
            return values
                .iter()
                .map(|value| Self::from_value(ty, value))
                .collect::<ExecutionResult<Vec<_>>>()
                .map(Self::List);
        }

        let mismatch = || {
            ExecutionError::invalid_parameters(
                "xes attribute",
                format!("cannot export {value} as {ty:?}"),
            )
        };
        let value = match (ty, value) {
            (XesType::Boolean, Value::Boolean(value)) => Self::Boolean(*value),
            (XesType::Date, Value::Integer(seconds)) => seconds
                .to_i64()
                .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
                .map(Self::Date)
                .ok_or_else(mismatch)?,
            (XesType::Float, Value::Integer(value)) => {
                Self::Float(value.to_f64().ok_or_else(mismatch)?)
            }
            (XesType::Float, Value::String(value)) => {
                Self::Float(value.parse().map_err(|_| mismatch())?)
            }
            (XesType::Int, Value::Integer(value)) => Self::Int(value.to_i64().ok_or_else(mismatch)?),
            (XesType::String, value) => Self::String(value.to_string()),
            _ => return Err(mismatch()),
        };
        Ok(value)
    }

    fn tag(&self) -> &'static str {
        match self {
            XesValue::Boolean(_) => "boolean",
            XesValue::Date(_) => "date",
            XesValue::Float(_) => "float",
            XesValue::Int(_) => "int",
            XesValue::String(_) => "string",
            XesValue::List(_) => "list",
        }
    }

    fn render(&self) -> String {
        match self {
            XesValue::Boolean(value) => value.to_string(),
            XesValue::Date(value) => value.to_rfc3339_opts(SecondsFormat::Millis, true),
            XesValue::Float(value) => value.to_string(),
            XesValue::Int(value) => value.to_string(),
            XesValue::String(value) => value.clone(),
            XesValue::List(_) => String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct XesAttribute {
    pub key: String,
    pub value: XesValue,
}

/// Attributes to attach to the event `event` of the trace `trace`.
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    pub trace: String,
    pub event: String,
    pub attributes: Vec<XesAttribute>,
}

type Events = IndexMap<String, IndexMap<String, XesValue>>;

/// Groups events by trace id and writes them as an XES log.
///
/// Records naming an event that already exists add to its attributes; an
/// attribute set twice keeps the last value.
#[derive(Debug, Default)]
pub struct XesExporter {
    mode: ExportMode,
    traces: IndexMap<String, Events>,
}

impl XesExporter {
    pub fn new(mode: ExportMode) -> Self {
        Self {
            mode,
            traces: IndexMap::new(),
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n");
        out.push_str("<log xes.version=\"1.0\" xes.features=\"nested-attributes\" xmlns=\"http://www.xes-standard.org/\">\n");
        out.push_str("  <extension name=\"Concept\" prefix=\"concept\" uri=\"http://www.xes-standard.org/concept.xesext\"/>\n");
        out.push_str("  <extension name=\"Identity\" prefix=\"identity\" uri=\"http://www.xes-standard.org/identity.xesext\"/>\n");
        for (trace, events) in &self.traces {
            out.push_str("  <trace>\n");
            write_attribute(&mut out, 2, "concept:name", &XesValue::String(trace.clone()));
            for (event, attributes) in events {
                out.push_str("    <event>\n");
                write_attribute(&mut out, 3, "identity:id", &XesValue::String(event.clone()));
                for (key, value) in attributes {
                    write_attribute(&mut out, 3, key, value);
                }
                out.push_str("    </event>\n");
            }
            out.push_str("  </trace>\n");
        }
        out.push_str("</log>\n");
        out
    }
}

fn write_attribute(out: &mut String, depth: usize, key: &str, value: &XesValue) {
    let indent = "  ".repeat(depth);
    let escaped_key = escape(key);
    // Writing into a `String` cannot fail.
    match value {
        XesValue::List(values) => {
            let _ = writeln!(out, "{indent}<list key=\"{escaped_key}\">");
            let _ = writeln!(out, "{indent}  <values>");
            for value in values {
                write_attribute(out, depth + 2, key, value);
            }
            let _ = writeln!(out, "{indent}  </values>");
            let _ = writeln!(out, "{indent}</list>");
        }
        value => {
            let _ = writeln!(
                out,
                "{indent}<{} key=\"{escaped_key}\" value=\"{}\"/>",
                value.tag(),
                escape(&value.render())
            );
        }
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

impl Sink for XesExporter {
    fn mode(&self) -> ExportMode {
        self.mode
    }

    fn add_event(&mut self, record: &EventRecord) {
        let attributes = self
            .traces
            .entry(record.trace.clone())
            .or_default()
            .entry(record.event.clone())
            .or_default();
        for attribute in &record.attributes {
            attributes.insert(attribute.key.clone(), attribute.value.clone());
        }
    }

    fn flush(&mut self, folder: &Path, artifact: Artifact<'_>) -> ExecutionResult<()> {
        if self.traces.is_empty() {
            return Ok(());
        }
        let contents = self.render();
        self.traces.clear();
        write_artifact(folder.join(format!("{}.xes", artifact.prefix())), &contents)
    }
}
