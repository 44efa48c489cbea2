// src/health/status.rs
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::checker::CheckError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    Up,
    #[default]
    Down,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Up => write!(f, "UP"),
            Status::Down => write!(f, "DOWN"),
        }
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A single metadata entry: either a nested check result or an arbitrary value.
#[derive(Debug, Clone, PartialEq)]
pub enum Info {
    Health(HealthStatus),
    Value(Value),
}

impl Info {
    pub fn as_health(&self) -> Option<&HealthStatus> {
        match self {
            Info::Health(health) => Some(health),
            Info::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Info::Value(value) => Some(value),
            Info::Health(_) => None,
        }
    }
}

impl Serialize for Info {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Info::Health(health) => health.serialize(serializer),
            Info::Value(value) => value.serialize(serializer),
        }
    }
}

impl From<HealthStatus> for Info {
    fn from(health: HealthStatus) -> Self {
        Info::Health(health)
    }
}

impl From<Value> for Info {
    fn from(value: Value) -> Self {
        Info::Value(value)
    }
}

macro_rules! info_from_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Info {
                fn from(value: $ty) -> Self {
                    Info::Value(Value::from(value))
                }
            }
        )*
    };
}

info_from_scalar!(&str, String, bool, i32, i64, u32, u64, f64);

/// Outcome of one check: binary status plus open-ended metadata.
///
/// Serializes as a flat object, `{"status": "UP", "<key>": <info>, ...}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HealthStatus {
    status: Status,
    info: BTreeMap<String, Info>,
}

impl HealthStatus {
    /// A fresh result is down until something marks it up.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn healthy() -> Self {
        Self {
            status: Status::Up,
            info: BTreeMap::new(),
        }
    }

    pub fn unhealthy() -> Self {
        Self::new()
    }

    /// Down result describing a fault the checker itself could not report.
    pub fn from_error(error: &CheckError) -> Self {
        Self::unhealthy()
            .with_info("error", error.to_string())
            .with_info("error_kind", error.kind())
    }

    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<Info>) -> Self {
        self.add_info(key, value);
        self
    }

    pub fn up(&mut self) {
        self.status = Status::Up;
    }

    pub fn down(&mut self) {
        self.status = Status::Down;
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_up(&self) -> bool {
        self.status == Status::Up
    }

    pub fn is_down(&self) -> bool {
        self.status == Status::Down
    }

    pub fn add_info(&mut self, key: impl Into<String>, value: impl Into<Info>) -> &mut Self {
        self.info.insert(key.into(), value.into());
        self
    }

    pub fn info(&self) -> &BTreeMap<String, Info> {
        &self.info
    }

    pub fn get(&self, key: &str) -> Option<&Info> {
        self.info.get(key)
    }
}

impl Serialize for HealthStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let shadowed = usize::from(self.info.contains_key("status"));
        let mut map = serializer.serialize_map(Some(self.info.len() + 1 - shadowed))?;
        map.serialize_entry("status", &self.status)?;
        for (key, value) in self.info.iter().filter(|(key, _)| key.as_str() != "status") {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
