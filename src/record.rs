use crate::config::LogFormat;
use crate::value::LogValue;

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::field::MakeExt;
use tracing_subscriber::fmt::format::{self, Writer};
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Name of the event field carrying a record's attributes.
pub(crate) const ATTRS_FIELD: &str = "attrs";

/// A key/value pair attached to a record, e.g. `("unit", 3.into())`.
pub type Attr<'a> = (&'a str, LogValue);

/// An attribute stored on a `Logger`, with the groups that were open when it was added.
#[derive(Debug, Clone)]
pub(crate) struct Attribute {
  pub(crate) groups: Arc<[Arc<str>]>,
  pub(crate) key: String,
  pub(crate) value: LogValue,
}

/// A record's attributes, rendered as `group.key=value` pairs for text output and as
/// a JSON object with one nested object per group for JSON output.
pub(crate) struct RecordAttrs<'a> {
  pub(crate) format: LogFormat,
  pub(crate) groups: &'a [Arc<str>],
  pub(crate) attrs: &'a [Attribute],
  pub(crate) args: &'a [Attr<'a>],
}

impl<'a> RecordAttrs<'a> {
  pub(crate) fn is_empty(&self) -> bool {
    self.attrs.is_empty() && self.args.is_empty()
  }

  fn entries(&self) -> impl Iterator<Item = (&'a [Arc<str>], &'a str, &'a LogValue)> + 'a {
    let stored = self.attrs.iter().map(|attr| (&*attr.groups, attr.key.as_str(), &attr.value));
    let groups = self.groups;
    let args = self.args.iter().map(move |(key, value)| (groups, *key, value));
    stored.chain(args)
  }

  fn to_json(&self) -> Map<String, Value> {
    let mut object = Map::new();
    for (groups, key, value) in self.entries() {
      insert_nested(&mut object, groups, key, value.to_json());
    }
    object
  }
}

impl fmt::Display for RecordAttrs<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.format == LogFormat::Json {
      return write!(f, "{}", Value::Object(self.to_json()));
    }

    for (index, (groups, key, value)) in self.entries().enumerate() {
      if index > 0 {
        f.write_str(" ")?;
      }
      for group in groups {
        write!(f, "{}.", group)?;
      }
      write!(f, "{}=", key)?;
      write_text_value(f, &value.to_string())?;
    }
    Ok(())
  }
}

fn write_text_value(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
  let needs_quotes = value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '=' || c == '"');
  if needs_quotes {
    write!(f, "{:?}", value)
  } else {
    f.write_str(value)
  }
}

fn insert_nested(object: &mut Map<String, Value>, groups: &[Arc<str>], key: &str, value: Value) {
  match groups.split_first() {
    None => {
      object.insert(key.to_string(), value);
    }
    Some((group, rest)) => {
      let slot = object
        .entry(group.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
      if !slot.is_object() {
        *slot = Value::Object(Map::new());
      }
      if let Value::Object(inner) = slot {
        insert_nested(inner, rest, key, value);
      }
    }
  }
}

/// Field layout for text output: the message and the attributes are written bare,
/// any other field as `name=value`.
pub(crate) fn text_fields() -> impl for<'writer> FormatFields<'writer> + 'static {
  format::debug_fn(|writer, field, value| match field.name() {
    "message" | ATTRS_FIELD => write!(writer, "{:?}", value),
    name => write!(writer, "{}={:?}", name, value),
  })
  .delimited(" ")
}

/// JSON event layout: `time`, `level`, `msg`, optional `source`, then the attributes
/// as top-level keys (groups as nested objects).
pub(crate) struct JsonRecord<T> {
  timer: T,
}

impl<T> JsonRecord<T> {
  pub(crate) fn new(timer: T) -> Self {
    Self { timer }
  }
}

impl<S, N, T> FormatEvent<S, N> for JsonRecord<T>
where
  S: Subscriber + for<'a> LookupSpan<'a>,
  N: for<'a> FormatFields<'a> + 'static,
  T: FormatTime,
{
  fn format_event(&self, _ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
    let mut time = String::new();
    self.timer.format_time(&mut Writer::new(&mut time))?;

    let mut visitor = JsonVisitor::default();
    event.record(&mut visitor);

    let mut object = Map::new();
    object.insert("time".to_string(), Value::String(time.trim().to_string()));
    object.insert("level".to_string(), Value::String(event.metadata().level().to_string()));
    object.insert("msg".to_string(), Value::String(visitor.message.unwrap_or_default()));
    if let Some(source) = visitor.source {
      object.insert("source".to_string(), Value::String(source));
    }
    for (key, value) in visitor.fields {
      object.entry(key).or_insert(value);
    }

    writeln!(writer, "{}", Value::Object(object))
  }
}

#[derive(Default)]
struct JsonVisitor {
  message: Option<String>,
  source: Option<String>,
  fields: Map<String, Value>,
}

impl JsonVisitor {
  fn record_text(&mut self, field: &Field, text: String) {
    match field.name() {
      "message" => self.message = Some(text),
      "source" => self.source = Some(text),
      ATTRS_FIELD => match serde_json::from_str::<Map<String, Value>>(&text) {
        Ok(attrs) => self.fields.extend(attrs),
        Err(_) => {
          self.fields.insert(ATTRS_FIELD.to_string(), Value::String(text));
        }
      },
      name => {
        self.fields.insert(name.to_string(), Value::String(text));
      }
    }
  }
}

impl Visit for JsonVisitor {
  fn record_str(&mut self, field: &Field, value: &str) {
    self.record_text(field, value.to_string());
  }

  fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
    self.record_text(field, format!("{:?}", value));
  }

  fn record_i64(&mut self, field: &Field, value: i64) {
    self.fields.insert(field.name().to_string(), Value::from(value));
  }

  fn record_u64(&mut self, field: &Field, value: u64) {
    self.fields.insert(field.name().to_string(), Value::from(value));
  }

  fn record_f64(&mut self, field: &Field, value: f64) {
    self.fields.insert(field.name().to_string(), LogValue::F64(value).to_json());
  }

  fn record_bool(&mut self, field: &Field, value: bool) {
    self.fields.insert(field.name().to_string(), Value::Bool(value));
  }
}
