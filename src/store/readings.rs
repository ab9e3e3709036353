use chrono::Utc;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, TransactionTrait, sea_query::OnConflict,
};

use crate::entity::readings;
use crate::error::{AppError, AppResult};
use crate::weather::{NewReading, TimeSelection};

#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub reading: readings::Model,
    /// A reading with the same device and timestamp was replaced.
    pub overwritten: bool,
}

/// Write one reading, replacing any reading with the same (device, timestamp).
///
/// # Errors
///
/// Returns `AppError::Conflict` if the device already has a strictly newer
/// reading; nothing is written in that case.
pub async fn upsert(db: &DatabaseConnection, reading: NewReading) -> AppResult<WriteOutcome> {
    let txn = db.begin().await?;

    let newest = latest(&txn, Some(&reading.device_id)).await?;
    let overwritten = match &newest {
        Some(existing) if existing.timestamp > reading.timestamp => {
            return Err(AppError::Conflict(format!(
                "Reading at {} is older than the latest stored reading for device {} ({})",
                reading.timestamp.to_rfc3339(),
                reading.device_id,
                existing.timestamp.to_rfc3339()
            )));
        }
        Some(existing) => existing.timestamp == reading.timestamp,
        None => false,
    };

    let model = readings::ActiveModel {
        device_id: Set(reading.device_id.clone()),
        timestamp: Set(reading.timestamp),
        temperature: Set(reading.temperature),
        humidity: Set(reading.humidity),
        pressure: Set(reading.pressure),
        rain: Set(reading.rain),
        rain_rate: Set(reading.rain_rate),
        luminance: Set(reading.luminance),
        wind_speed: Set(reading.wind_speed),
        wind_direction: Set(reading.wind_direction),
        received_at: Set(Utc::now()),
    };

    readings::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([readings::Column::DeviceId, readings::Column::Timestamp])
                .update_columns([
                    readings::Column::Temperature,
                    readings::Column::Humidity,
                    readings::Column::Pressure,
                    readings::Column::Rain,
                    readings::Column::RainRate,
                    readings::Column::Luminance,
                    readings::Column::WindSpeed,
                    readings::Column::WindDirection,
                    readings::Column::ReceivedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

    let stored = readings::Entity::find_by_id((reading.device_id.clone(), reading.timestamp))
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::Internal("Reading vanished after write".to_string()))?;

    txn.commit().await?;

    Ok(WriteOutcome {
        reading: stored,
        overwritten,
    })
}

fn scoped(device: Option<&str>) -> Select<readings::Entity> {
    let query = readings::Entity::find();
    match device {
        Some(device) => query.filter(readings::Column::DeviceId.eq(device)),
        None => query,
    }
}

/// Most recent reading, for one device or across all of them.
///
/// # Errors
///
/// Returns `AppError::Database` on query failure.
pub async fn latest<C: ConnectionTrait>(
    db: &C,
    device: Option<&str>,
) -> AppResult<Option<readings::Model>> {
    Ok(scoped(device)
        .order_by_desc(readings::Column::Timestamp)
        .order_by_desc(readings::Column::DeviceId)
        .limit(1)
        .one(db)
        .await?)
}

/// Readings matching a selection, oldest first.
///
/// `Latest` and `First` yield at most one row. A range with no readings
/// yields an empty vector.
///
/// # Errors
///
/// Returns `AppError::Database` on query failure.
pub async fn select<C: ConnectionTrait>(
    db: &C,
    selection: TimeSelection,
    device: Option<&str>,
) -> AppResult<Vec<readings::Model>> {
    let rows = match selection {
        TimeSelection::Latest => latest(db, device).await?.into_iter().collect(),
        TimeSelection::First => scoped(device)
            .order_by_asc(readings::Column::Timestamp)
            .order_by_asc(readings::Column::DeviceId)
            .limit(1)
            .all(db)
            .await?,
        TimeSelection::All | TimeSelection::Between { .. } => {
            let (start, end) = selection.bounds();
            let mut query = scoped(device);
            if let Some(start) = start {
                query = query.filter(readings::Column::Timestamp.gte(start));
            }
            if let Some(end) = end {
                query = query.filter(readings::Column::Timestamp.lte(end));
            }
            query
                .order_by_asc(readings::Column::Timestamp)
                .order_by_asc(readings::Column::DeviceId)
                .all(db)
                .await?
        }
    };
    Ok(rows)
}
