use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    sea_query::OnConflict,
};

use crate::entity::forecast_hours;
use crate::error::AppResult;
use crate::weather::TimeSelection;

/// Write forecast hours, replacing hours already stored.
///
/// # Errors
///
/// Returns `AppError::Database` on write failure.
pub async fn upsert_hours(
    db: &DatabaseConnection,
    hours: Vec<forecast_hours::Model>,
) -> AppResult<usize> {
    let count = hours.len();
    if count == 0 {
        return Ok(0);
    }

    forecast_hours::Entity::insert_many(hours.into_iter().map(forecast_hours::ActiveModel::from))
        .on_conflict(
            OnConflict::column(forecast_hours::Column::Time)
                .update_columns([
                    forecast_hours::Column::ForecastId,
                    forecast_hours::Column::Temperature,
                    forecast_hours::Column::Humidity,
                    forecast_hours::Column::Pressure,
                    forecast_hours::Column::RainTotal,
                    forecast_hours::Column::ProbOfRain,
                    forecast_hours::Column::WindSpeed,
                    forecast_hours::Column::FetchedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    Ok(count)
}

/// Forecast hours matching a selection, earliest first.
///
/// # Errors
///
/// Returns `AppError::Database` on query failure.
pub async fn select(
    db: &DatabaseConnection,
    selection: TimeSelection,
) -> AppResult<Vec<forecast_hours::Model>> {
    let query = forecast_hours::Entity::find();
    let rows = match selection {
        TimeSelection::Latest => {
            query
                .order_by_desc(forecast_hours::Column::Time)
                .limit(1)
                .all(db)
                .await?
        }
        TimeSelection::First => {
            query
                .order_by_asc(forecast_hours::Column::Time)
                .limit(1)
                .all(db)
                .await?
        }
        TimeSelection::All | TimeSelection::Between { .. } => {
            let (start, end) = selection.bounds();
            let mut query = query;
            if let Some(start) = start {
                query = query.filter(forecast_hours::Column::Time.gte(start));
            }
            if let Some(end) = end {
                query = query.filter(forecast_hours::Column::Time.lte(end));
            }
            query
                .order_by_asc(forecast_hours::Column::Time)
                .all(db)
                .await?
        }
    };
    Ok(rows)
}
