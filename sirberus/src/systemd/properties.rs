//! Typed unit properties.
//!
//! `systemctl show` prints every property as `Name=value` text. Values are
//! decoded once into [`PropertyValue`] variants according to the property
//! name, and read back through accessors that fall back to a zero or empty
//! default when a property is missing or has another type.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Properties holding byte or count values.
const U64_PROPERTIES: &[&str] = &[
    "MemoryCurrent",
    "MemoryPeak",
    "MemoryHigh",
    "MemoryMax",
    "CPUUsageNSec",
    "IPIngressBytes",
    "IPEgressBytes",
    "IOReadBytes",
    "IOWriteBytes",
    "TasksCurrent",
    "TasksMax",
];

const U32_PROPERTIES: &[&str] = &["MainPID", "ExecMainPID", "ControlPID", "NRestarts"];

/// Timestamps, stored as microseconds since the epoch.
const TIMESTAMP_PROPERTIES: &[&str] = &[
    "ActiveEnterTimestamp",
    "ActiveExitTimestamp",
    "InactiveEnterTimestamp",
    "InactiveExitTimestamp",
    "StateChangeTimestamp",
    "ExecMainStartTimestamp",
];

const ARRAY_PROPERTIES: &[&str] = &["DropInPaths", "TriggeredBy", "Documentation", "Names"];

const BYTES_PROPERTIES: &[&str] = &["InvocationID"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Str(String),
    U32(u32),
    U64(u64),
    StrArray(Vec<String>),
    Bytes(Vec<u8>),
}

/// Decoded property bag of one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitProperties {
    values: HashMap<String, PropertyValue>,
}

impl UnitProperties {
    /// Parse `systemctl show` output.
    pub fn parse(output: &str) -> Self {
        let mut values = HashMap::new();
        for line in output.lines() {
            let Some((name, raw)) = line.split_once('=') else {
                continue;
            };
            if let Some(value) = decode(name, raw) {
                values.insert(name.to_string(), value);
            }
        }
        Self { values }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    pub fn get_string(&self, name: &str) -> String {
        match self.values.get(name) {
            Some(PropertyValue::Str(s)) => s.clone(),
            _ => String::new(),
        }
    }

    /// 32-bit value. A 64-bit value is accepted and truncated.
    pub fn get_u32(&self, name: &str) -> u32 {
        match self.values.get(name) {
            Some(PropertyValue::U32(v)) => *v,
            Some(PropertyValue::U64(v)) => *v as u32,
            _ => 0,
        }
    }

    pub fn get_u64(&self, name: &str) -> u64 {
        match self.values.get(name) {
            Some(PropertyValue::U64(v)) => *v,
            _ => 0,
        }
    }

    pub fn get_string_array(&self, name: &str) -> Vec<String> {
        match self.values.get(name) {
            Some(PropertyValue::StrArray(v)) => v.clone(),
            _ => Vec::new(),
        }
    }

    pub fn get_bytes(&self, name: &str) -> &[u8] {
        match self.values.get(name) {
            Some(PropertyValue::Bytes(v)) => v,
            _ => &[],
        }
    }

    /// Timestamp property, `None` when unset or zero.
    pub fn get_timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        let usec = self.get_u64(name);
        if usec == 0 {
            return None;
        }
        DateTime::<Utc>::from_timestamp_micros(usec as i64)
    }

    /// Binary path of the first `ExecStart` command.
    pub fn exec_start_path(&self) -> Option<String> {
        let exec = self.get_string("ExecStart");
        exec.split(';')
            .map(str::trim)
            .find_map(|field| field.trim_start_matches('{').trim().strip_prefix("path="))
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
    }
}

fn decode(name: &str, raw: &str) -> Option<PropertyValue> {
    let raw = raw.trim();

    if U64_PROPERTIES.contains(&name) {
        return parse_number(raw).map(PropertyValue::U64);
    }
    if U32_PROPERTIES.contains(&name) {
        return match raw.parse::<u32>() {
            Ok(v) => Some(PropertyValue::U32(v)),
            Err(_) if raw.is_empty() => None,
            Err(_) => Some(PropertyValue::Str(raw.to_string())),
        };
    }
    if TIMESTAMP_PROPERTIES.contains(&name) {
        return parse_timestamp_usec(raw).map(PropertyValue::U64);
    }
    if ARRAY_PROPERTIES.contains(&name) {
        return Some(PropertyValue::StrArray(
            raw.split_whitespace().map(str::to_string).collect(),
        ));
    }
    if BYTES_PROPERTIES.contains(&name) {
        return hex::decode(raw).ok().map(PropertyValue::Bytes);
    }
    Some(PropertyValue::Str(raw.to_string()))
}

fn parse_number(raw: &str) -> Option<u64> {
    match raw {
        "" | "[not set]" => None,
        "infinity" => Some(u64::MAX),
        _ => raw.parse().ok(),
    }
}

/// `--timestamp=unix` renders timestamps as `@<seconds>`.
fn parse_timestamp_usec(raw: &str) -> Option<u64> {
    let secs = raw.strip_prefix('@')?;
    if let Some((whole, frac)) = secs.split_once('.') {
        let whole: u64 = whole.parse().ok()?;
        let digits: String = frac.chars().take(6).collect();
        let scale = 10u64.pow(6 - digits.len() as u32);
        let frac: u64 = if digits.is_empty() { 0 } else { digits.parse().ok()? };
        return whole.checked_mul(1_000_000)?.checked_add(frac * scale);
    }
    secs.parse::<u64>().ok()?.checked_mul(1_000_000)
}

/// Render a 16-byte id as `8-4-4-4-12` lowercase hex; anything else is empty.
pub fn format_uuid(bytes: &[u8]) -> String {
    if bytes.len() != 16 {
        return String::new();
    }
    let hex = hex::encode(bytes);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}
