use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FlagError;

/// A flag as exposed to consumers. `active` is the snapshot of the last resolution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Flag {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub active: bool,
}

impl Flag {
    /// Display label: the name when there is one, otherwise the key.
    pub fn label(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.key,
        }
    }
}

/// One `{key, active}` record as declared by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerFlagRecord {
    pub key: String,
    pub active: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
enum PayloadEntry {
    Record(ServerFlagRecord),
    Raw(Value),
}

// The server sends either a bare list or a `{"data": [...]}` envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPayload {
    List(Vec<Value>),
    Envelope { data: Vec<Value> },
}

impl From<RawPayload> for ServerPayload {
    fn from(raw: RawPayload) -> Self {
        let values = match raw {
            RawPayload::List(values) => values,
            RawPayload::Envelope { data } => data,
        };
        ServerPayload {
            entries: values.into_iter().map(PayloadEntry::Raw).collect(),
        }
    }
}

/// A server flag list. Entries coming off the wire stay unvalidated until
/// [`ServerPayload::into_records`], so one bad record cannot sink the whole list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawPayload")]
pub struct ServerPayload {
    entries: Vec<PayloadEntry>,
}

impl ServerPayload {
    pub fn from_json(json: &str) -> Result<ServerPayload, FlagError> {
        let payload = serde_json::from_str::<ServerPayload>(json).map_err(|e| {
            tracing::error!("failed to parse flag payload: {}", e);
            FlagError::MalformedPayload(e.to_string())
        })?;
        Ok(payload)
    }

    pub fn from_value(value: Value) -> Result<ServerPayload, FlagError> {
        Ok(serde_json::from_value::<ServerPayload>(value)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Splits the payload into valid records, in input order, and one error per record that
    /// was skipped.
    pub fn into_records(self) -> (Vec<ServerFlagRecord>, Vec<FlagError>) {
        let mut records = Vec::with_capacity(self.entries.len());
        let mut errors = Vec::new();

        for (index, entry) in self.entries.into_iter().enumerate() {
            let record = match entry {
                PayloadEntry::Record(record) => record,
                PayloadEntry::Raw(value) => match serde_json::from_value::<ServerFlagRecord>(value)
                {
                    Ok(record) => record,
                    Err(e) => {
                        errors.push(FlagError::MalformedRecord {
                            index,
                            reason: e.to_string(),
                        });
                        continue;
                    }
                },
            };

            if record.key.trim().is_empty() {
                errors.push(FlagError::MalformedRecord {
                    index,
                    reason: "empty flag key".to_string(),
                });
                continue;
            }
            records.push(record);
        }

        (records, errors)
    }
}

impl From<Vec<ServerFlagRecord>> for ServerPayload {
    fn from(records: Vec<ServerFlagRecord>) -> Self {
        ServerPayload {
            entries: records.into_iter().map(PayloadEntry::Record).collect(),
        }
    }
}

/// Result of a server refresh: the new flag sequence and the records that were skipped.
#[derive(Debug, Default)]
pub struct RefreshOutcome {
    pub flags: Vec<Flag>,
    pub skipped: Vec<FlagError>,
}

impl RefreshOutcome {
    pub fn had_errors(&self) -> bool {
        !self.skipped.is_empty()
    }
}
