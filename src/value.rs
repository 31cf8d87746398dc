use chrono::NaiveDateTime;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use yaml_rust::Yaml;

/// A single field value of a [Record].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Datetime(NaiveDateTime),
    List(Vec<Value>),
    Record(Record),
}

/// An entity, a draft or a set of matching criteria: fields in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

/// Builds a [Record] from `field => value` pairs.
///
/// ```
/// use ormfixtures::{record, Value};
///
/// let user = record! { "id" => 1, "name" => "fizz" };
/// assert_eq!(user.get("name"), Some(&Value::from("fizz")));
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::Record::new() };
    ($($field:expr => $value:expr),+ $(,)?) => {
        $crate::Record::new()$(.with($field, $value))+
    };
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [Record::set].
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Sets `field`, replacing an existing value in place.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((field, value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        let index = self.fields.iter().position(|(name, _)| name == field)?;
        Some(self.fields.remove(index).1)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Partial deep equality: every field of `criteria` is present here and
    /// matches. Fields absent from `criteria` are ignored.
    pub fn matches(&self, criteria: &Record) -> bool {
        criteria.fields().all(|(field, expected)| {
            self.get(field)
                .map_or(false, |actual| actual.matches(expected))
        })
    }
}

impl Value {
    /// Scalars compare by equality, records match partially and every item
    /// of an expected list must match some item of the actual list.
    pub fn matches(&self, expected: &Value) -> bool {
        match (self, expected) {
            (Value::Record(actual), Value::Record(expected)) => actual.matches(expected),
            (Value::List(actual), Value::List(expected)) => expected
                .iter()
                .all(|item| actual.iter().any(|candidate| candidate.matches(item))),
            (actual, expected) => actual == expected,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(v) => Some(v),
            _ => None,
        }
    }

    /// Converts a YAML node from a fixture file. Strings shaped like
    /// `2020/01/01 01:01:01` become datetimes.
    pub fn from_yaml(yaml: &Yaml) -> Value {
        match yaml {
            Yaml::Integer(v) => Value::Integer(*v),
            Yaml::Real(v) => v.parse().map_or_else(|_| Value::String(v.clone()), Value::Float),
            Yaml::Boolean(v) => Value::Boolean(*v),
            Yaml::String(v) => parse_datetime(v).map_or_else(|| Value::String(v.clone()), Value::Datetime),
            Yaml::Array(items) => Value::List(items.iter().map(Value::from_yaml).collect()),
            Yaml::Hash(_) => Value::Record(Record::from_yaml(yaml).unwrap_or_default()),
            Yaml::Null | Yaml::BadValue | Yaml::Alias(_) => Value::Null,
        }
    }
}

impl Record {
    /// Converts a YAML mapping; anything else yields `None`.
    pub fn from_yaml(yaml: &Yaml) -> Option<Record> {
        let hash = match yaml {
            Yaml::Hash(hash) => hash,
            _ => return None,
        };
        let mut record = Record::new();
        for (key, value) in hash {
            let key = match key {
                Yaml::String(k) => k.to_string(),
                Yaml::Integer(k) => k.to_string(),
                _ => continue,
            };
            record.set(key, Value::from_yaml(value));
        }
        Some(record)
    }
}

fn datetime_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{4}[/-]\d{2}[/-]\d{2}[ T]\d{2}:\d{2}:\d{2}$").expect("valid datetime pattern")
    })
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    if !datetime_pattern().is_match(value) {
        return None;
    }
    ["%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{:?}", v),
            Value::Datetime(v) => write!(f, "{}", v),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Record(record) => write!(f, "{}", record),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (field, value)) in self.fields().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field, value)?;
        }
        write!(f, "}}")
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Datetime(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}

impl From<Vec<Record>> for Value {
    fn from(v: Vec<Record>) -> Self {
        Value::List(v.into_iter().map(Value::Record).collect())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}
