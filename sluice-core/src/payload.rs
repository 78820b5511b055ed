//! Raw payload mapping
//!
//! Narrow, hand-written mapping from the JSON payloads of the two dataflow
//! API representations onto [`Dataflow`]. Only the fields named here are
//! read; everything else in the payload is dropped.
//!
//! A payload without a usable `id` is rejected. Any other field that has an
//! unexpected shape is treated as absent and logged.

use crate::{
    DatasetRef, Dataflow, EntityId, Execution, GraphLayout, LayoutNode, SearchPage, Timestamp,
    TransformAction, Trigger, TriggerEvent, TriggerSettings,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Why a payload could not be mapped at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    NotAnObject,
    MissingId,
}

impl std::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadError::NotAnObject => f.write_str("payload is not a JSON object"),
            PayloadError::MissingId => f.write_str("payload has no usable id"),
        }
    }
}

impl std::error::Error for PayloadError {}

// ============================================================================
// DATAFLOW MAPPING
// ============================================================================

/// Map a standard-endpoint (primary) dataflow payload.
pub fn dataflow_from_primary(payload: &Value) -> Result<Dataflow, PayloadError> {
    let obj = payload.as_object().ok_or(PayloadError::NotAnObject)?;
    let mut dataflow = common_fields(obj)?;

    let last_execution = obj.get("lastExecution").and_then(Value::as_object);

    dataflow.owner = string_field(obj, "owner").or_else(|| id_value(obj.get("responsibleUserId")));
    dataflow.status = string_field(obj, "status")
        .or_else(|| last_execution.and_then(|exec| string_field(exec, "state")));
    dataflow.enabled = bool_field(obj, "enabled");
    dataflow.database_type = string_field(obj, "databaseType");
    dataflow.run_count = count_field(obj, "runCount").or_else(|| count_field(obj, "executionCount"));
    dataflow.last_run = timestamp_field(obj, "lastRun")
        .or_else(|| last_execution.and_then(|exec| timestamp_field(exec, "beginTime")));
    dataflow.created_at = timestamp_field(obj, "created");
    dataflow.modified_at = timestamp_field(obj, "modified");

    Ok(dataflow)
}

/// Map an enhanced-endpoint (secondary) dataflow payload.
///
/// Malformed secondary-only sections are dropped individually so a single
/// odd field never costs the rest of the record.
pub fn dataflow_from_secondary(payload: &Value) -> Result<Dataflow, PayloadError> {
    let obj = payload.as_object().ok_or(PayloadError::NotAnObject)?;
    let mut dataflow = common_fields(obj)?;

    dataflow.trigger_settings = section(obj, &dataflow.id, "triggerSettings", trigger_settings);
    dataflow.engine_properties =
        section(obj, &dataflow.id, "engineProperties", engine_properties).unwrap_or_default();
    dataflow.graph = section(obj, &dataflow.id, "graph", graph_layout);
    dataflow.actions = section(obj, &dataflow.id, "actions", actions).unwrap_or_default();

    Ok(dataflow)
}

/// Map a raw search page. Accepts either a bare array of dataflows or an
/// object carrying them under `dataFlows` with an optional `totalCount`.
/// Records that cannot be mapped are skipped.
pub fn search_page_from_payload(payload: &Value) -> SearchPage {
    let (records, total) = match payload {
        Value::Array(items) => (items.as_slice(), None),
        Value::Object(obj) => (
            obj.get("dataFlows")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            count_field(obj, "totalCount"),
        ),
        _ => {
            tracing::warn!("search payload is neither an array nor an object; treating as empty");
            (&[][..], None)
        }
    };

    let items = records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| match dataflow_from_primary(record) {
            Ok(dataflow) => Some(dataflow),
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping malformed search record");
                None
            }
        })
        .collect();

    SearchPage {
        items,
        total,
        fetched: records.len(),
    }
}

/// Map the payload returned when a run is started.
pub fn execution_from_payload(
    dataflow_id: &str,
    payload: &Value,
) -> Result<Execution, PayloadError> {
    let obj = payload.as_object().ok_or(PayloadError::NotAnObject)?;
    let id = id_value(obj.get("id")).ok_or(PayloadError::MissingId)?;
    Ok(Execution {
        id,
        dataflow_id: id_value(obj.get("onboardFlowId")).unwrap_or_else(|| dataflow_id.to_string()),
        state: string_field(obj, "state").unwrap_or_else(|| "CREATED".to_string()),
        started_at: timestamp_field(obj, "beginTime"),
        ended_at: timestamp_field(obj, "endTime"),
    })
}

fn common_fields(obj: &Map<String, Value>) -> Result<Dataflow, PayloadError> {
    let id = id_value(obj.get("id")).ok_or(PayloadError::MissingId)?;
    Ok(Dataflow {
        name: string_field(obj, "name").unwrap_or_default(),
        description: string_field(obj, "description"),
        inputs: dataset_refs(obj, &id, "inputs"),
        outputs: dataset_refs(obj, &id, "outputs"),
        id,
        ..Default::default()
    })
}

// ============================================================================
// SECONDARY-ONLY SECTIONS
// ============================================================================

/// Extract one optional section, logging and dropping it when malformed.
fn section<T>(
    obj: &Map<String, Value>,
    entity_id: &str,
    field: &'static str,
    parse: fn(&Value) -> Option<T>,
) -> Option<T> {
    let raw = obj.get(field).filter(|v| !v.is_null())?;
    let parsed = parse(raw);
    if parsed.is_none() {
        tracing::warn!(entity_id, field, "malformed enhanced field; treating as absent");
    }
    parsed
}

fn trigger_settings(value: &Value) -> Option<TriggerSettings> {
    let obj = value.as_object()?;
    let triggers = match obj.get("triggers") {
        None | Some(Value::Null) => Vec::new(),
        Some(raw) => raw
            .as_array()?
            .iter()
            .map(trigger)
            .collect::<Option<Vec<_>>>()?,
    };
    Some(TriggerSettings {
        triggers,
        zone_id: string_field(obj, "zoneId"),
        locale: string_field(obj, "locale"),
    })
}

fn trigger(value: &Value) -> Option<Trigger> {
    let obj = value.as_object()?;
    let events = obj
        .get("triggerEvents")
        .and_then(Value::as_array)
        .map(|events| events.iter().filter_map(trigger_event).collect())
        .unwrap_or_default();
    let conditions = obj
        .get("triggerConditions")
        .and_then(Value::as_array)
        .map(|conds| {
            conds
                .iter()
                .filter_map(|c| c.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    Some(Trigger {
        title: string_field(obj, "title"),
        events,
        conditions,
    })
}

fn trigger_event(value: &Value) -> Option<TriggerEvent> {
    let obj = value.as_object()?;
    Some(TriggerEvent {
        kind: string_field(obj, "type")?,
        dataset_id: id_value(obj.get("datasetId")),
        schedule: string_field(obj, "schedule"),
    })
}

fn engine_properties(value: &Value) -> Option<BTreeMap<String, String>> {
    let obj = value.as_object()?;
    let props = obj
        .iter()
        .filter_map(|(key, v)| {
            let rendered = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), rendered))
        })
        .collect();
    Some(props)
}

fn graph_layout(value: &Value) -> Option<GraphLayout> {
    let nodes = value
        .as_object()?
        .get("nodes")?
        .as_array()?
        .iter()
        .filter_map(|node| {
            let obj = node.as_object()?;
            Some(LayoutNode {
                id: id_value(obj.get("id"))?,
                x: obj.get("x").and_then(Value::as_f64).unwrap_or(0.0),
                y: obj.get("y").and_then(Value::as_f64).unwrap_or(0.0),
            })
        })
        .collect();
    Some(GraphLayout { nodes })
}

fn actions(value: &Value) -> Option<Vec<TransformAction>> {
    let actions = value
        .as_array()?
        .iter()
        .filter_map(|action| {
            let obj = action.as_object()?;
            Some(TransformAction {
                id: id_value(obj.get("id"))?,
                kind: string_field(obj, "type").unwrap_or_else(|| "Unknown".to_string()),
                name: string_field(obj, "name"),
                depends_on: obj
                    .get("dependsOn")
                    .and_then(Value::as_array)
                    .map(|deps| deps.iter().filter_map(|d| id_value(Some(d))).collect())
                    .unwrap_or_default(),
            })
        })
        .collect();
    Some(actions)
}

// ============================================================================
// FIELD HELPERS
// ============================================================================

/// Ids arrive as strings or numbers depending on the endpoint.
fn id_value(value: Option<&Value>) -> Option<EntityId> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> Option<bool> {
    obj.get(key).and_then(Value::as_bool)
}

fn count_field(obj: &Map<String, Value>, key: &str) -> Option<u64> {
    obj.get(key).and_then(Value::as_u64)
}

/// Timestamps arrive as epoch milliseconds or RFC 3339 strings.
fn timestamp_field(obj: &Map<String, Value>, key: &str) -> Option<Timestamp> {
    match obj.get(key)? {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

fn dataset_refs(obj: &Map<String, Value>, entity_id: &str, key: &'static str) -> Vec<DatasetRef> {
    let Some(items) = obj.get(key).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let entry = item.as_object()?;
            let id = id_value(entry.get("dataSourceId")).or_else(|| id_value(entry.get("id")));
            match id {
                Some(id) => Some(DatasetRef {
                    id,
                    name: string_field(entry, "dataSourceName")
                        .or_else(|| string_field(entry, "name")),
                }),
                None => {
                    tracing::warn!(entity_id, field = key, "dataset reference without id dropped");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primary_mapping_reads_named_fields_only() {
        let payload = json!({
            "id": 42,
            "name": "Sales rollup",
            "responsibleUserId": 1001,
            "lastExecution": { "state": "SUCCESS", "beginTime": 1_700_000_000_000i64 },
            "executionCount": 17,
            "inputs": [{ "dataSourceId": "ds-a", "dataSourceName": "Raw" }],
            "outputs": [{ "dataSourceId": "ds-b" }],
            "somethingUnknown": { "deep": true }
        });
        let df = dataflow_from_primary(&payload).unwrap();
        assert_eq!(df.id, "42");
        assert_eq!(df.owner.as_deref(), Some("1001"));
        assert_eq!(df.status.as_deref(), Some("SUCCESS"));
        assert_eq!(df.run_count, Some(17));
        assert!(df.last_run.is_some());
        assert_eq!(df.inputs, vec![DatasetRef::named("ds-a", "Raw")]);
        assert_eq!(df.outputs, vec![DatasetRef::new("ds-b")]);
    }

    #[test]
    fn test_missing_id_is_rejected() {
        assert_eq!(
            dataflow_from_primary(&json!({ "name": "no id" })),
            Err(PayloadError::MissingId)
        );
        assert_eq!(
            dataflow_from_secondary(&json!("string")),
            Err(PayloadError::NotAnObject)
        );
    }

    #[test]
    fn test_secondary_malformed_section_is_dropped() {
        let payload = json!({
            "id": "7",
            "name": "Flow",
            "triggerSettings": "not an object",
            "engineProperties": { "kettle.memory": "2g", "threads": 4 },
            "actions": [{ "id": "a1", "type": "Filter", "dependsOn": ["a0"] }]
        });
        let df = dataflow_from_secondary(&payload).unwrap();
        assert!(df.trigger_settings.is_none());
        assert_eq!(df.engine_properties.get("threads").map(String::as_str), Some("4"));
        assert_eq!(df.actions.len(), 1);
        assert_eq!(df.actions[0].depends_on, vec!["a0".to_string()]);
    }

    #[test]
    fn test_secondary_trigger_settings_parsed() {
        let payload = json!({
            "id": "7",
            "triggerSettings": {
                "zoneId": "UTC",
                "triggers": [{
                    "title": "On input update",
                    "triggerEvents": [{ "type": "DATASET_UPDATED", "datasetId": "ds-a" }],
                    "triggerConditions": []
                }]
            }
        });
        let df = dataflow_from_secondary(&payload).unwrap();
        let settings = df.trigger_settings.unwrap();
        assert_eq!(settings.zone_id.as_deref(), Some("UTC"));
        assert_eq!(settings.triggers[0].events[0].dataset_id.as_deref(), Some("ds-a"));
    }

    #[test]
    fn test_search_page_skips_bad_records() {
        let payload = json!({
            "dataFlows": [{ "id": 1, "name": "a" }, { "name": "broken" }, { "id": "3" }],
            "totalCount": 3
        });
        let page = search_page_from_payload(&payload);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, Some(3));
        assert_eq!(page.fetched, 3);
    }

    #[test]
    fn test_rfc3339_timestamp_accepted() {
        let payload = json!({ "id": "1", "modified": "2024-05-01T10:00:00Z" });
        let df = dataflow_from_primary(&payload).unwrap();
        assert_eq!(
            df.modified_at.map(|t| t.timestamp()),
            Some(1_714_557_600)
        );
    }

    #[test]
    fn test_execution_mapping_defaults_dataflow_id() {
        let exec = execution_from_payload("42", &json!({ "id": 9, "state": "RUNNING" })).unwrap();
        assert_eq!(exec.id, "9");
        assert_eq!(exec.dataflow_id, "42");
        assert_eq!(exec.state, "RUNNING");
    }
}
