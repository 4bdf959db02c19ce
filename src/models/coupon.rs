use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::{DiscountType, coupon_entity};
use crate::models::{double_option, is_expired};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateCouponRequest {
    /// 优惠码，保存时统一转为大写
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    /// 最大使用次数，不传表示不限
    pub max_uses: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub usable_in_cart: bool,
    #[serde(default = "default_true")]
    pub active: bool,
    /// 限定可用的商品
    #[serde(default)]
    pub product_ids: Vec<i64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateCouponRequest {
    pub code: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<f64>,
    /// null 表示取消次数上限
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i64>)]
    pub max_uses: Option<Option<i64>>,
    /// null 表示永不过期
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub usable_in_cart: Option<bool>,
    pub active: Option<bool>,
    /// 传入时整体替换关联商品
    pub product_ids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CouponQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CouponResponse {
    pub id: i64,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub max_uses: Option<i64>,
    pub used_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
    /// 根据当前时间计算，不落库
    pub expired: bool,
    pub usable_in_cart: bool,
    pub active: bool,
    pub product_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CouponResponse {
    pub fn new(m: coupon_entity::Model, product_ids: Vec<i64>) -> Self {
        Self {
            id: m.id,
            expired: is_expired(Utc::now(), m.expires_at),
            code: m.code,
            description: m.description,
            discount_type: m.discount_type,
            discount_value: m.discount_value,
            max_uses: m.max_uses,
            used_count: m.used_count,
            expires_at: m.expires_at,
            usable_in_cart: m.usable_in_cart,
            active: m.active,
            product_ids,
            created_at: m.created_at.unwrap_or_else(Utc::now),
            updated_at: m.updated_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CalculateCouponDiscountRequest {
    pub coupon_code: String,
    /// 不传表示整单使用
    pub product_id: Option<i64>,
    pub amount: f64,
}
