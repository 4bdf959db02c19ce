use sea_orm_migration::prelude::extension::postgres::Type;
use sea_orm_migration::prelude::*;

use crate::m20260105_000001_create_catalog::{Categories, Products};

#[derive(DeriveIden)]
enum Coupons {
    Table,
    Id,
    Code,
    Description,
    DiscountType,
    DiscountValue,
    MaxUses,
    UsedCount,
    ExpiresAt,
    UsableInCart,
    Active,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CouponProducts {
    Table,
    CouponId,
    ProductId,
}

#[derive(DeriveIden)]
enum Bundles {
    Table,
    Id,
    Name,
    Description,
    DiscountType,
    DiscountValue,
    ApplyTo,
    CategoryId,
    ExpiresAt,
    Active,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum BundleProducts {
    Table,
    BundleId,
    ProductId,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // enums
        manager
            .create_type(
                Type::create()
                    .as_enum(Alias::new("discount_type"))
                    .values(vec![Alias::new("percentage"), Alias::new("fixed")])
                    .to_owned(),
            )
            .await?;
        manager
            .create_type(
                Type::create()
                    .as_enum(Alias::new("bundle_apply_to"))
                    .values(vec![Alias::new("products"), Alias::new("category")])
                    .to_owned(),
            )
            .await?;

        // 优惠券
        manager
            .create_table(
                Table::create()
                    .table(Coupons::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Coupons::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Coupons::Code).string_len(64).not_null())
                    .col(ColumnDef::new(Coupons::Description).text().null())
                    .col(
                        ColumnDef::new(Coupons::DiscountType)
                            .custom(Alias::new("discount_type"))
                            .not_null(),
                    )
                    .col(ColumnDef::new(Coupons::DiscountValue).double().not_null())
                    .col(ColumnDef::new(Coupons::MaxUses).big_integer().null())
                    .col(
                        ColumnDef::new(Coupons::UsedCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Coupons::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Coupons::UsableInCart)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Coupons::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Coupons::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Coupons::UpdatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 优惠码统一大写存储，唯一索引即可保证大小写不敏感的唯一性
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_coupons_code_unique")
                    .table(Coupons::Table)
                    .col(Coupons::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CouponProducts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CouponProducts::CouponId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CouponProducts::ProductId)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(CouponProducts::CouponId)
                            .col(CouponProducts::ProductId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_coupon_products_coupon")
                            .from(CouponProducts::Table, CouponProducts::CouponId)
                            .to(Coupons::Table, Coupons::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_coupon_products_product")
                            .from(CouponProducts::Table, CouponProducts::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 捆绑折扣
        manager
            .create_table(
                Table::create()
                    .table(Bundles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Bundles::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Bundles::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Bundles::Description).text().null())
                    .col(
                        ColumnDef::new(Bundles::DiscountType)
                            .custom(Alias::new("discount_type"))
                            .not_null(),
                    )
                    .col(ColumnDef::new(Bundles::DiscountValue).double().not_null())
                    .col(
                        ColumnDef::new(Bundles::ApplyTo)
                            .custom(Alias::new("bundle_apply_to"))
                            .not_null()
                            .default(Expr::cust("'products'::bundle_apply_to")),
                    )
                    .col(ColumnDef::new(Bundles::CategoryId).big_integer().null())
                    .col(
                        ColumnDef::new(Bundles::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Bundles::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Bundles::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Bundles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bundles_category")
                            .from(Bundles::Table, Bundles::CategoryId)
                            .to(Categories::Table, Categories::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BundleProducts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BundleProducts::BundleId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BundleProducts::ProductId)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(BundleProducts::BundleId)
                            .col(BundleProducts::ProductId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bundle_products_bundle")
                            .from(BundleProducts::Table, BundleProducts::BundleId)
                            .to(Bundles::Table, Bundles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bundle_products_product")
                            .from(BundleProducts::Table, BundleProducts::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_bundle_products_product")
                    .table(BundleProducts::Table)
                    .col(BundleProducts::ProductId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 删除顺序：关联表 -> 主表 -> 枚举
        manager
            .drop_table(Table::drop().if_exists().table(BundleProducts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Bundles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(CouponProducts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Coupons::Table).to_owned())
            .await?;
        manager
            .drop_type(Type::drop().name(Alias::new("bundle_apply_to")).to_owned())
            .await?;
        manager
            .drop_type(Type::drop().name(Alias::new("discount_type")).to_owned())
            .await?;
        Ok(())
    }
}
