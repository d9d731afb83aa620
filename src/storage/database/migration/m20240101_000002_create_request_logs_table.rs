use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RequestLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RequestLogs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RequestLogs::RequestId).string_len(64).not_null())
                    .col(ColumnDef::new(RequestLogs::ApiKeyId).string_len(64).not_null())
                    .col(ColumnDef::new(RequestLogs::Model).string_len(128).not_null())
                    .col(ColumnDef::new(RequestLogs::Provider).string_len(64).not_null())
                    .col(ColumnDef::new(RequestLogs::PromptTokens).integer().not_null())
                    .col(ColumnDef::new(RequestLogs::CompletionTokens).integer().not_null())
                    .col(ColumnDef::new(RequestLogs::CostUsd).double().not_null())
                    .col(ColumnDef::new(RequestLogs::LatencyMs).big_integer().not_null())
                    .col(ColumnDef::new(RequestLogs::CacheHit).boolean().not_null())
                    .col(ColumnDef::new(RequestLogs::FallbackUsed).boolean().not_null())
                    .col(ColumnDef::new(RequestLogs::Status).string_len(32).not_null())
                    .col(ColumnDef::new(RequestLogs::PromptPreview).text().not_null())
                    .col(
                        ColumnDef::new(RequestLogs::InsertedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_request_logs_api_key_id")
                    .table(RequestLogs::Table)
                    .col(RequestLogs::ApiKeyId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RequestLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RequestLogs {
    Table,
    Id,
    RequestId,
    ApiKeyId,
    Model,
    Provider,
    PromptTokens,
    CompletionTokens,
    CostUsd,
    LatencyMs,
    CacheHit,
    FallbackUsed,
    Status,
    PromptPreview,
    InsertedAt,
}
