//! `queryWeather`: the store lookup exposed as a tool.
//!
//! The tool route and the chat service both call [`query_weather`], so the
//! model sees exactly what an HTTP caller of the tool would.

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use utoipa::ToSchema;

use crate::entity::readings;
use crate::error::{AppError, AppResult};
use crate::store;
use crate::weather::{self, Field, fields::round1};

pub const TOOL_NAME: &str = "queryWeather";
pub const TIMESTAMP_FIELD: &str = "timestamp_UTC";

/// Range keywords accepted by the tool, as a JSON-schema pattern.
const RANGE_PATTERN: &str = r"^((latest|first|all|today|yesterday|last24h|last7days|week|month|year)|day=\d{1,3}|week=\d{1,2}|month=\d{1,2}|year=\d{4}|[^/]+/[^/]+)$";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    #[default]
    Raw,
    Max,
    Min,
    Mean,
    Sum,
    Count,
}

impl Operation {
    pub const ALL: [Self; 6] = [
        Self::Raw,
        Self::Max,
        Self::Min,
        Self::Mean,
        Self::Sum,
        Self::Count,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Max => "max",
            Self::Min => "min",
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Count => "count",
        }
    }

    fn aggregate(self, values: &[f64]) -> Option<f64> {
        match self {
            Self::Max => weather::stats::max(values),
            Self::Min => weather::stats::min(values),
            Self::Mean => weather::stats::mean(values),
            Self::Sum => weather::stats::sum(values),
            Self::Raw | Self::Count => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct QueryArguments {
    /// Range keyword, e.g. `today`, `week=12`, or `start/end`.
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    /// Subset of reading fields plus `timestamp_UTC`. All when omitted.
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub operation: Option<Operation>,
    /// Restrict to one device.
    #[serde(default)]
    pub device: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: QueryArguments,
}

/// Fields a query may ask for, in output order.
#[derive(Debug, Clone, PartialEq)]
struct FieldSelection {
    timestamp: bool,
    numeric: Vec<Field>,
}

impl FieldSelection {
    fn parse(requested: Option<&[String]>) -> AppResult<Self> {
        let Some(requested) = requested.filter(|r| !r.is_empty()) else {
            return Ok(Self {
                timestamp: true,
                numeric: Field::ALL.to_vec(),
            });
        };

        let mut selection = Self {
            timestamp: false,
            numeric: Vec::new(),
        };
        let mut unknown = Vec::new();
        for name in requested {
            let name = name.trim();
            if name == TIMESTAMP_FIELD {
                selection.timestamp = true;
            } else if let Some(field) = Field::parse(name) {
                if !selection.numeric.contains(&field) {
                    selection.numeric.push(field);
                }
            } else {
                unknown.push(name.to_string());
            }
        }
        if !unknown.is_empty() {
            return Err(AppError::BadRequest(format!(
                "Unknown fields: {}",
                unknown.join(", ")
            )));
        }
        Ok(selection)
    }
}

/// Run a tool query against the store.
///
/// `max_rows` bounds the raw rows returned; larger selections are evenly
/// sampled and flagged in `_metadata`.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for invalid ranges or fields and
/// `AppError::Database` on store failure.
pub async fn query_weather(
    db: &DatabaseConnection,
    args: &QueryArguments,
    now: DateTime<Utc>,
    tz: Tz,
    max_rows: Option<usize>,
) -> AppResult<Value> {
    let fields = FieldSelection::parse(args.fields.as_deref())?;
    let operation = args.operation.unwrap_or_default();
    let selection = weather::resolve(
        args.range.as_deref(),
        args.start.as_deref(),
        args.end.as_deref(),
        now,
        tz,
    )?;

    let rows = store::readings::select(db, selection, args.device.as_deref()).await?;
    shape(&rows, &fields, operation, max_rows)
}

fn shape(
    rows: &[readings::Model],
    fields: &FieldSelection,
    operation: Operation,
    max_rows: Option<usize>,
) -> AppResult<Value> {
    let mut metadata = json!({
        "operation": operation.name(),
        "record_count": rows.len(),
        "time_range": time_range(rows),
        "units": units(&fields.numeric),
    });

    let mut result = Map::new();
    match operation {
        Operation::Raw => {
            let sampled = sample(rows, max_rows);
            if sampled.len() < rows.len() {
                metadata["sampled"] = json!(true);
                metadata["returned_count"] = json!(sampled.len());
            }
            let data: Vec<Value> = sampled.into_iter().map(|r| raw_record(r, fields)).collect();
            result.insert("data".to_string(), Value::Array(data));
        }
        Operation::Count => {
            result.insert("count".to_string(), json!(rows.len()));
        }
        _ => {
            if fields.numeric.is_empty() {
                return Err(AppError::BadRequest(
                    "No numeric fields requested for aggregation".to_string(),
                ));
            }
            for field in &fields.numeric {
                let values: Vec<f64> = rows.iter().filter_map(|r| field.display_value(r)).collect();
                result.insert(
                    field.name().to_string(),
                    json!(operation.aggregate(&values).map(round1)),
                );
            }
        }
    }
    result.insert("_metadata".to_string(), metadata);
    Ok(Value::Object(result))
}

fn raw_record(reading: &readings::Model, fields: &FieldSelection) -> Value {
    let mut record = Map::new();
    record.insert("device_id".to_string(), json!(reading.device_id));
    if fields.timestamp {
        record.insert(TIMESTAMP_FIELD.to_string(), json!(format_utc(reading.timestamp)));
    }
    for field in &fields.numeric {
        let value = match field {
            Field::RainRate | Field::WindSpeed => field.display_value(reading).map(round1),
            _ => field.value(reading),
        };
        record.insert(field.name().to_string(), json!(value));
    }
    Value::Object(record)
}

/// Evenly spaced rows, at most `max_rows` of them, first row always kept.
fn sample(rows: &[readings::Model], max_rows: Option<usize>) -> Vec<&readings::Model> {
    match max_rows {
        Some(limit) if limit > 0 && rows.len() > limit => (0..limit)
            .map(|i| &rows[i * rows.len() / limit])
            .collect(),
        _ => rows.iter().collect(),
    }
}

fn format_utc(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn time_range(rows: &[readings::Model]) -> String {
    match (rows.first(), rows.last()) {
        (Some(first), Some(last)) => format!(
            "{} to {}",
            format_utc(first.timestamp),
            format_utc(last.timestamp)
        ),
        _ => "unknown".to_string(),
    }
}

fn units(fields: &[Field]) -> Value {
    let units: Map<String, Value> = fields
        .iter()
        .map(|f| (f.name().to_string(), json!(f.display_unit())))
        .collect();
    Value::Object(units)
}

/// JSON schema of the tool arguments.
#[must_use]
pub fn argument_schema() -> Value {
    let mut field_names = vec![TIMESTAMP_FIELD];
    field_names.extend(Field::ALL.iter().map(|f| f.name()));
    let operations: Vec<&str> = Operation::ALL.iter().map(|o| o.name()).collect();

    json!({
        "type": "object",
        "properties": {
            "range": {"type": "string", "pattern": RANGE_PATTERN},
            "start": {"type": "string"},
            "end": {"type": "string"},
            "fields": {
                "type": "array",
                "items": {"type": "string", "enum": field_names},
            },
            "operation": {
                "type": "string",
                "enum": operations,
                "default": "raw",
                "description": "Aggregation operation: raw (no aggregation), max, min, mean, sum, count",
            },
            "device": {"type": "string"},
        },
        "additionalProperties": false,
    })
}

/// Self-description served on `GET`.
#[must_use]
pub fn describe() -> Value {
    json!({
        "name": "weatherstation",
        "version": "2",
        "actions": {
            TOOL_NAME: {
                "description": "Return weather station readings with optional aggregation.",
                "parameters": argument_schema(),
            }
        }
    })
}
