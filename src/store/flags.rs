use chrono::Utc;
use sea_orm::{
    ActiveValue::Set, DatabaseConnection, EntityTrait, QueryOrder, sea_query::OnConflict,
};

use crate::entity::service_flags;
use crate::error::AppResult;
use crate::killswitch::Service;

/// Stored flag for a service. No row means the service is enabled.
///
/// # Errors
///
/// Returns `AppError::Database` on query failure.
pub async fn get(
    db: &DatabaseConnection,
    service: Service,
) -> AppResult<Option<service_flags::Model>> {
    Ok(service_flags::Entity::find_by_id(service.name().to_string())
        .one(db)
        .await?)
}

/// All stored flags.
///
/// # Errors
///
/// Returns `AppError::Database` on query failure.
pub async fn list(db: &DatabaseConnection) -> AppResult<Vec<service_flags::Model>> {
    Ok(service_flags::Entity::find()
        .order_by_asc(service_flags::Column::Service)
        .all(db)
        .await?)
}

/// Enable or disable services, overwriting any previous flag.
///
/// # Errors
///
/// Returns `AppError::Database` on write failure.
pub async fn set(
    db: &DatabaseConnection,
    services: &[Service],
    enabled: bool,
    reason: Option<String>,
) -> AppResult<()> {
    if services.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    let models = services.iter().map(|service| service_flags::ActiveModel {
        service: Set(service.name().to_string()),
        enabled: Set(enabled),
        reason: Set(reason.clone()),
        updated_at: Set(now),
    });

    service_flags::Entity::insert_many(models)
        .on_conflict(
            OnConflict::column(service_flags::Column::Service)
                .update_columns([
                    service_flags::Column::Enabled,
                    service_flags::Column::Reason,
                    service_flags::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}
