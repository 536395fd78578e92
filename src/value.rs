use std::fmt;

/// A typed attribute value. JSON output keeps numbers and booleans as such;
/// anything else is rendered through `Display` with `LogValue::display`.
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
  Str(String),
  I64(i64),
  U64(u64),
  F64(f64),
  Bool(bool),
}

impl LogValue {
  pub fn display(value: impl fmt::Display) -> Self {
    LogValue::Str(value.to_string())
  }

  pub(crate) fn to_json(&self) -> serde_json::Value {
    match self {
      LogValue::Str(s) => serde_json::Value::String(s.clone()),
      LogValue::I64(n) => serde_json::Value::from(*n),
      LogValue::U64(n) => serde_json::Value::from(*n),
      LogValue::F64(n) => serde_json::Number::from_f64(*n)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| serde_json::Value::String(n.to_string())),
      LogValue::Bool(b) => serde_json::Value::Bool(*b),
    }
  }
}

impl fmt::Display for LogValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LogValue::Str(s) => f.write_str(s),
      LogValue::I64(n) => write!(f, "{}", n),
      LogValue::U64(n) => write!(f, "{}", n),
      LogValue::F64(n) => write!(f, "{}", n),
      LogValue::Bool(b) => write!(f, "{}", b),
    }
  }
}

macro_rules! log_value_from {
  ($variant:ident as $target:ty: $($source:ty),+) => {
    $(
      impl From<$source> for LogValue {
        fn from(value: $source) -> Self {
          LogValue::$variant(value as $target)
        }
      }
    )+
  };
}

log_value_from!(I64 as i64: i8, i16, i32, i64, isize);
log_value_from!(U64 as u64: u8, u16, u32, u64, usize);
log_value_from!(F64 as f64: f32, f64);

impl From<bool> for LogValue {
  fn from(value: bool) -> Self {
    LogValue::Bool(value)
  }
}

impl From<&str> for LogValue {
  fn from(value: &str) -> Self {
    LogValue::Str(value.to_string())
  }
}

impl From<String> for LogValue {
  fn from(value: String) -> Self {
    LogValue::Str(value)
  }
}

impl From<&String> for LogValue {
  fn from(value: &String) -> Self {
    LogValue::Str(value.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn numbers_stay_numbers_in_json() {
    assert_eq!(LogValue::from(7_i32).to_json(), serde_json::json!(7));
    assert_eq!(LogValue::from(3_usize).to_json(), serde_json::json!(3));
    assert_eq!(LogValue::from(true).to_json(), serde_json::json!(true));
    assert_eq!(LogValue::from("a b").to_json(), serde_json::json!("a b"));
  }

  #[test]
  fn non_finite_floats_fall_back_to_strings() {
    assert_eq!(LogValue::from(f64::NAN).to_json(), serde_json::json!("NaN"));
    assert_eq!(LogValue::from(1.5_f32).to_json(), serde_json::json!(1.5));
  }

  #[test]
  fn display_helper_renders_through_display() {
    let err = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
    assert_eq!(LogValue::display(&err), LogValue::Str("socket closed".to_string()));
  }
}
