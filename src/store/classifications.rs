use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait, IntoActiveModel,
    QueryOrder,
};
use uuid::Uuid;

use crate::entity::classifications;
use crate::error::AppResult;

/// Persist a classification result.
///
/// # Errors
///
/// Returns `AppError::Database` on write failure.
pub async fn insert(
    db: &DatabaseConnection,
    result: classifications::Model,
) -> AppResult<classifications::Model> {
    Ok(result.into_active_model().insert(db).await?)
}

/// Record where the classified image was published.
///
/// # Errors
///
/// Returns `AppError::Database` on write failure.
pub async fn set_image_uri(db: &DatabaseConnection, id: Uuid, image_uri: &str) -> AppResult<()> {
    let update = classifications::ActiveModel {
        id: Set(id),
        image_uri: Set(Some(image_uri.to_string())),
        ..Default::default()
    };
    update.update(db).await?;
    Ok(())
}

/// Most recent classification, if any.
///
/// # Errors
///
/// Returns `AppError::Database` on query failure.
pub async fn latest(db: &DatabaseConnection) -> AppResult<Option<classifications::Model>> {
    Ok(classifications::Entity::find()
        .order_by_desc(classifications::Column::CreatedAt)
        .one(db)
        .await?)
}
