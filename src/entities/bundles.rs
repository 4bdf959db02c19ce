use super::coupons::DiscountType;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 捆绑折扣的适用范围
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "bundle_apply_to")]
#[serde(rename_all = "snake_case")]
pub enum BundleApplyTo {
    /// 仅限 bundle_products 中列出的商品
    #[sea_orm(string_value = "products")]
    Products,
    /// 仅限 category_id 分类下的商品
    #[sea_orm(string_value = "category")]
    Category,
}

impl std::fmt::Display for BundleApplyTo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleApplyTo::Products => write!(f, "products"),
            BundleApplyTo::Category => write!(f, "category"),
        }
    }
}

/// 捆绑折扣实体（无使用次数上限）
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "bundles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub apply_to: BundleApplyTo,
    pub category_id: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::bundle_products::Entity")]
    BundleProducts,
    #[sea_orm(
        belongs_to = "super::categories::Entity",
        from = "Column::CategoryId",
        to = "super::categories::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    Category,
}

impl Related<super::bundle_products::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BundleProducts.def()
    }
}

impl Related<super::categories::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
