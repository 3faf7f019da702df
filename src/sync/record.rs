//! Sync records and the last-write-wins merge.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Modification timestamp as found on the wire: epoch milliseconds or a
/// date string. The wire representation is kept on re-serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
  Number(Number),
  Text(String),
}

impl Timestamp {
  /// Milliseconds since the epoch, when the value can be interpreted as a date.
  pub fn as_millis(&self) -> Option<i64> {
    match self {
      Timestamp::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
      Timestamp::Text(s) => DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp_millis())
        .or_else(|_| {
          NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .map(|dt| dt.and_utc().timestamp_millis())
        })
        .ok(),
    }
  }

  /// Compare two timestamps. Numbers compare exactly when both are integral
  /// and as floats otherwise, so fractional epoch values keep their order.
  /// Values that are both dates compare chronologically, two strings that
  /// are not dates compare as text, and anything else is incomparable.
  pub fn compare(&self, other: &Timestamp) -> Option<Ordering> {
    if let (Timestamp::Number(a), Timestamp::Number(b)) = (self, other) {
      return match (a.as_i64(), b.as_i64()) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
      };
    }

    match (self.as_f64(), other.as_f64()) {
      (Some(a), Some(b)) => a.partial_cmp(&b),
      _ => match (self, other) {
        (Timestamp::Text(a), Timestamp::Text(b)) => Some(a.cmp(b)),
        _ => None,
      },
    }
  }

  fn as_f64(&self) -> Option<f64> {
    match self {
      Timestamp::Number(n) => n.as_f64(),
      Timestamp::Text(_) => self.as_millis().map(|ms| ms as f64),
    }
  }
}

impl From<i64> for Timestamp {
  fn from(millis: i64) -> Self {
    Timestamp::Number(millis.into())
  }
}

impl From<&str> for Timestamp {
  fn from(s: &str) -> Self {
    Timestamp::Text(s.to_string())
  }
}

/// Which side of a merge a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
  Local,
  Remote,
}

/// Any domain entity (resident, payment, ...) with its sync metadata.
///
/// `_source` is only meaningful after a merge and is stripped before a record
/// is sent back to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
  pub id: String,
  #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<Timestamp>,
  #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
  pub source: Option<RecordSource>,
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

impl SyncRecord {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      updated_at: None,
      source: None,
      fields: Map::new(),
    }
  }

  pub fn updated(mut self, at: impl Into<Timestamp>) -> Self {
    self.updated_at = Some(at.into());
    self
  }

  pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.fields.insert(key.into(), value.into());
    self
  }

  fn tagged(mut self, source: RecordSource) -> Self {
    self.source = Some(source);
    self
  }

  /// Copy of the record without the merge tag, as uploaded to the server.
  pub fn without_source(&self) -> Self {
    Self {
      source: None,
      ..self.clone()
    }
  }

  pub fn is_local(&self) -> bool {
    self.source == Some(RecordSource::Local)
  }

  /// Strictly newer than `other`. A missing or incomparable timestamp on
  /// either side never wins.
  pub fn is_newer_than(&self, other: &SyncRecord) -> bool {
    match (&self.updated_at, &other.updated_at) {
      (Some(mine), Some(theirs)) => mine.compare(theirs) == Some(Ordering::Greater),
      _ => false,
    }
  }
}

/// Last-write-wins merge keyed by record id.
///
/// Every local record is kept and tagged `local`. A remote record replaces
/// the entry with the same id only if there is none, or if its `updatedAt`
/// is strictly greater; replacements are tagged `remote`. First-seen order
/// is preserved and replacements keep the position of the entry they replace.
pub fn merge(local: Vec<SyncRecord>, remote: Vec<SyncRecord>) -> Vec<SyncRecord> {
  let mut merged: Vec<SyncRecord> = Vec::with_capacity(local.len() + remote.len());
  let mut positions: HashMap<String, usize> = HashMap::new();

  fn upsert(
    merged: &mut Vec<SyncRecord>,
    positions: &mut HashMap<String, usize>,
    record: SyncRecord,
  ) {
    match positions.get(&record.id) {
      Some(&i) => merged[i] = record,
      None => {
        positions.insert(record.id.clone(), merged.len());
        merged.push(record);
      }
    }
  }

  for record in local {
    upsert(&mut merged, &mut positions, record.tagged(RecordSource::Local));
  }

  for record in remote {
    let wins = match positions.get(&record.id) {
      None => true,
      Some(&i) => record.is_newer_than(&merged[i]),
    };
    if wins {
      upsert(&mut merged, &mut positions, record.tagged(RecordSource::Remote));
    }
  }

  merged
}
