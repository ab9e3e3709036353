use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ========== READINGS ==========
        // One row per (device, timestamp); writes upsert on this key.
        manager
            .create_table(
                Table::create()
                    .table(Readings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Readings::DeviceId).string_len(64).not_null())
                    .col(
                        ColumnDef::new(Readings::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Readings::Temperature).double().not_null())
                    .col(ColumnDef::new(Readings::Humidity).double().not_null())
                    .col(ColumnDef::new(Readings::Pressure).double())
                    .col(ColumnDef::new(Readings::Rain).double())
                    .col(ColumnDef::new(Readings::RainRate).double())
                    .col(ColumnDef::new(Readings::Luminance).double())
                    .col(ColumnDef::new(Readings::WindSpeed).double())
                    .col(ColumnDef::new(Readings::WindDirection).double())
                    .col(
                        ColumnDef::new(Readings::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_readings")
                            .col(Readings::DeviceId)
                            .col(Readings::Timestamp),
                    )
                    .to_owned(),
            )
            .await?;

        // Cross-device range scans order by time
        manager
            .create_index(
                Index::create()
                    .name("idx_readings_timestamp")
                    .table(Readings::Table)
                    .col(Readings::Timestamp)
                    .to_owned(),
            )
            .await?;

        // ========== CLASSIFICATIONS ==========
        manager
            .create_table(
                Table::create()
                    .table(Classifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Classifications::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Classifications::Label).string_len(32).not_null())
                    .col(ColumnDef::new(Classifications::RawOutput).text().not_null())
                    .col(ColumnDef::new(Classifications::Confidence).double())
                    .col(ColumnDef::new(Classifications::ImageUri).string_len(512))
                    .col(ColumnDef::new(Classifications::ContentType).string_len(128))
                    .col(ColumnDef::new(Classifications::ImageBytes).big_integer().not_null())
                    .col(
                        ColumnDef::new(Classifications::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_classifications_created_at")
                    .table(Classifications::Table)
                    .col(Classifications::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // ========== FORECAST HOURS ==========
        // Keyed by forecast hour; a later fetch overwrites the hours it covers.
        manager
            .create_table(
                Table::create()
                    .table(ForecastHours::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ForecastHours::Time)
                            .timestamp_with_time_zone()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ForecastHours::ForecastId).string_len(32).not_null())
                    .col(ColumnDef::new(ForecastHours::Temperature).double())
                    .col(ColumnDef::new(ForecastHours::Humidity).double())
                    .col(ColumnDef::new(ForecastHours::Pressure).double())
                    .col(ColumnDef::new(ForecastHours::RainTotal).double())
                    .col(ColumnDef::new(ForecastHours::ProbOfRain).double())
                    .col(ColumnDef::new(ForecastHours::WindSpeed).double())
                    .col(
                        ColumnDef::new(ForecastHours::FetchedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // ========== SERVICE FLAGS ==========
        // Kill switch. A missing row means the service is enabled.
        manager
            .create_table(
                Table::create()
                    .table(ServiceFlags::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ServiceFlags::Service)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ServiceFlags::Enabled).boolean().not_null())
                    .col(ColumnDef::new(ServiceFlags::Reason).text())
                    .col(
                        ColumnDef::new(ServiceFlags::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ServiceFlags::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ForecastHours::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Classifications::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Readings::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Readings {
    Table,
    DeviceId,
    Timestamp,
    Temperature,
    Humidity,
    Pressure,
    Rain,
    RainRate,
    Luminance,
    WindSpeed,
    WindDirection,
    ReceivedAt,
}

#[derive(DeriveIden)]
enum Classifications {
    Table,
    Id,
    Label,
    RawOutput,
    Confidence,
    ImageUri,
    ContentType,
    ImageBytes,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ForecastHours {
    Table,
    Time,
    ForecastId,
    Temperature,
    Humidity,
    Pressure,
    RainTotal,
    ProbOfRain,
    WindSpeed,
    FetchedAt,
}

#[derive(DeriveIden)]
enum ServiceFlags {
    Table,
    Service,
    Enabled,
    Reason,
    UpdatedAt,
}
