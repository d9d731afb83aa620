use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ApiKeys::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ApiKeys::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ApiKeys::KeyId).string_len(64).not_null())
                    .col(
                        ColumnDef::new(ApiKeys::Key)
                            .string_len(128)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(ApiKeys::Name).string_len(255).not_null())
                    .col(ColumnDef::new(ApiKeys::Enabled).boolean().not_null())
                    .col(ColumnDef::new(ApiKeys::MonthlyTokenBudget).big_integer().null())
                    .col(ColumnDef::new(ApiKeys::MonthlyCostBudgetUsd).double().null())
                    .col(ColumnDef::new(ApiKeys::RateLimitRpm).integer().not_null())
                    .col(ColumnDef::new(ApiKeys::RateLimitTpm).integer().not_null())
                    .col(ColumnDef::new(ApiKeys::YearMonth).integer().not_null())
                    .col(
                        ColumnDef::new(ApiKeys::TokensUsedThisMonth)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ApiKeys::CostUsedThisMonthUsd)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(ApiKeys::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ApiKeys::UpdatedAt)
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
                    .name("idx_api_keys_key_id_year_month")
                    .table(ApiKeys::Table)
                    .col(ApiKeys::KeyId)
                    .col(ApiKeys::YearMonth)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_api_keys_key")
                    .table(ApiKeys::Table)
                    .col(ApiKeys::Key)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ApiKeys::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ApiKeys {
    Table,
    Id,
    KeyId,
    Key,
    Name,
    Enabled,
    MonthlyTokenBudget,
    MonthlyCostBudgetUsd,
    RateLimitRpm,
    RateLimitTpm,
    YearMonth,
    TokensUsedThisMonth,
    CostUsedThisMonthUsd,
    CreatedAt,
    UpdatedAt,
}
