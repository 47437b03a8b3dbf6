//! Server load telemetry: record parsing and per-server aggregation.
//!
//! Peers publish two kinds of text records on the telemetry channel:
//!
//! - `svr:` a full descriptor of a server's identity (name, machine, os,
//!   version, startup time, ...). Overwrites all descriptor fields.
//! - `svrres:` current load metrics as `key=value` pairs. Merged into the
//!   server's load map; the only record kind that notifies observers.
//!
//! Both carry a `;`/`,`/`|`-delimited `key=value` body whose `id` attributes
//! the record to a logical server. A record is validated in full before any
//! field is applied, so a malformed value leaves the server's prior state
//! untouched.

use crate::config::TelemetryConfig;
use crate::error::{BusError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Accumulated telemetry for one logical server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server identifier, the aggregation key.
    pub id: String,
    /// Server name.
    pub name: Option<String>,
    /// Numeric server type code.
    pub server_type: Option<i32>,
    /// Host machine name.
    pub machine_name: Option<String>,
    /// Operating system string.
    pub os: Option<String>,
    /// Numeric run-mode code.
    pub mode: Option<i32>,
    /// Project tag.
    pub project: Option<String>,
    /// Process id on the host machine.
    pub pid: Option<i64>,
    /// Software version string.
    pub version: Option<String>,
    /// Server startup timestamp.
    pub startup_time: Option<NaiveDateTime>,
    /// Watchdog status code.
    pub watchdog_status: Option<i32>,
    /// Scalar load level.
    pub load_level: Option<i32>,
    /// Named load metrics. A metric published with an empty value is kept as
    /// None.
    pub loads: HashMap<String, Option<i64>>,
}

impl ServerInfo {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            server_type: None,
            machine_name: None,
            os: None,
            mode: None,
            project: None,
            pid: None,
            version: None,
            startup_time: None,
            watchdog_status: None,
            load_level: None,
            loads: HashMap::new(),
        }
    }
}

enum RecordKind {
    Descriptor,
    LoadValues,
}

fn record_kind(tag: &str) -> Option<RecordKind> {
    let tag = tag.to_ascii_lowercase();
    if tag == TelemetryConfig::DESCRIPTOR_TAG {
        Some(RecordKind::Descriptor)
    } else if tag == TelemetryConfig::LOAD_VALUES_TAG {
        Some(RecordKind::LoadValues)
    } else {
        None
    }
}

/// Split a `key=value` body on `,` `;` `|`. A key without `=` maps to None.
fn parse_body(body: &str) -> HashMap<String, Option<String>> {
    let mut result = HashMap::new();
    for item in body.split(|c| matches!(c, ',' | ';' | '|')) {
        let (key, value) = match item.split_once('=') {
            Some((k, v)) => (k, Some(v.trim().to_string())),
            None => (item, None),
        };
        if !key.is_empty() {
            result.insert(key.to_string(), value);
        }
    }
    result
}

fn field<'a>(kvs: &'a HashMap<String, Option<String>>, key: &str) -> Option<&'a str> {
    kvs.get(key).and_then(|v| v.as_deref())
}

fn parse_int<T: std::str::FromStr>(
    kvs: &HashMap<String, Option<String>>,
    key: &str,
) -> Result<Option<T>> {
    match field(kvs, key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| BusError::MalformedTelemetry {
                message: format!("field {} is not an integer: {:?}", key, raw),
            }),
        None => Ok(None),
    }
}

/// All descriptor fields of one `svr:` record, validated before application.
struct Descriptor {
    name: Option<String>,
    server_type: Option<i32>,
    machine_name: Option<String>,
    os: Option<String>,
    mode: Option<i32>,
    project: Option<String>,
    pid: Option<i64>,
    version: Option<String>,
    startup_time: Option<NaiveDateTime>,
    watchdog_status: Option<i32>,
    load_level: Option<i32>,
}

fn parse_descriptor(kvs: &HashMap<String, Option<String>>) -> Result<Descriptor> {
    let startup_time = match field(kvs, "startup_time") {
        Some(raw) => Some(
            NaiveDateTime::parse_from_str(raw, TelemetryConfig::STARTUP_TIME_FORMAT).map_err(
                |_| BusError::MalformedTelemetry {
                    message: format!("field startup_time is not a timestamp: {:?}", raw),
                },
            )?,
        ),
        None => None,
    };
    Ok(Descriptor {
        name: field(kvs, "name").map(str::to_string),
        server_type: parse_int(kvs, "type")?,
        machine_name: field(kvs, "machinename").map(str::to_string),
        os: field(kvs, "os").map(str::to_string),
        mode: parse_int(kvs, "mode")?,
        project: field(kvs, "prj").map(str::to_string),
        pid: parse_int(kvs, "pi")?,
        version: field(kvs, "version").map(str::to_string),
        startup_time,
        watchdog_status: parse_int(kvs, "dog_status")?,
        load_level: parse_int(kvs, "loadlevel")?,
    })
}

fn parse_load_values(
    kvs: &HashMap<String, Option<String>>,
) -> Result<Vec<(String, Option<i64>)>> {
    let mut updates = Vec::with_capacity(kvs.len());
    for (key, value) in kvs {
        let parsed = match value.as_deref() {
            Some(raw) if !raw.is_empty() => {
                Some(raw.parse::<i64>().map_err(|_| BusError::MalformedTelemetry {
                    message: format!("load metric {} is not an integer: {:?}", key, raw),
                })?)
            }
            _ => None,
        };
        updates.push((key.clone(), parsed));
    }
    Ok(updates)
}

/// Apply one telemetry record to the server table.
///
/// Returns a snapshot of the updated [`ServerInfo`] when the record was a
/// load-values record (the only kind observers are notified of), or None for
/// descriptor records and records that are ignored (unknown kind, missing
/// id). Malformed records error without touching the table.
pub(crate) fn ingest_record(
    servers: &mut HashMap<String, ServerInfo>,
    text: &str,
) -> Result<Option<ServerInfo>> {
    let Some((tag, body)) = text.split_once(':') else {
        debug!("telemetry record without a kind tag, ignoring");
        return Ok(None);
    };
    let Some(kind) = record_kind(tag) else {
        return Ok(None);
    };

    let mut kvs = parse_body(body);
    let Some(id) = kvs.remove("id").flatten().filter(|id| !id.is_empty()) else {
        debug!("telemetry record without an id, dropping");
        return Ok(None);
    };

    match kind {
        RecordKind::Descriptor => {
            let descriptor = parse_descriptor(&kvs)?;
            let info = servers
                .entry(id.clone())
                .or_insert_with(|| ServerInfo::new(&id));
            info.name = descriptor.name;
            info.server_type = descriptor.server_type;
            info.machine_name = descriptor.machine_name;
            info.os = descriptor.os;
            info.mode = descriptor.mode;
            info.project = descriptor.project;
            info.pid = descriptor.pid;
            info.version = descriptor.version;
            info.startup_time = descriptor.startup_time;
            info.watchdog_status = descriptor.watchdog_status;
            info.load_level = descriptor.load_level;
            Ok(None)
        }
        RecordKind::LoadValues => {
            let updates = parse_load_values(&kvs)?;
            let info = servers
                .entry(id.clone())
                .or_insert_with(|| ServerInfo::new(&id));
            for (key, value) in updates {
                info.loads.insert(key, value);
            }
            Ok(Some(info.clone()))
        }
    }
}
