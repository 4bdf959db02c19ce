use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::{BundleApplyTo, DiscountType, bundle_entity};
use crate::models::{double_option, is_expired};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateBundleRequest {
    pub name: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub apply_to: BundleApplyTo,
    /// apply_to = category 时必填
    pub category_id: Option<i64>,
    /// apply_to = products 时必填且不能为空
    #[serde(default)]
    pub product_ids: Vec<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateBundleRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<f64>,
    pub apply_to: Option<BundleApplyTo>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i64>)]
    pub category_id: Option<Option<i64>>,
    pub product_ids: Option<Vec<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BundleQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// 仅管理员可用：包含停用和已过期的记录
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BundleResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub apply_to: BundleApplyTo,
    pub category_id: Option<i64>,
    pub product_ids: Vec<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BundleResponse {
    pub fn new(m: bundle_entity::Model, product_ids: Vec<i64>) -> Self {
        Self {
            id: m.id,
            expired: is_expired(Utc::now(), m.expires_at),
            name: m.name,
            description: m.description,
            discount_type: m.discount_type,
            discount_value: m.discount_value,
            apply_to: m.apply_to,
            category_id: m.category_id,
            product_ids,
            expires_at: m.expires_at,
            active: m.active,
            created_at: m.created_at.unwrap_or_else(Utc::now),
            updated_at: m.updated_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CalculateBundleDiscountRequest {
    pub bundle_id: i64,
    pub product_id: i64,
    pub amount: f64,
}
