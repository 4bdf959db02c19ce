use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use chrono::{DateTime, Utc};

use crate::entities::DiscountType;
use crate::models::{BundleScope, DiscountBreakdown, Promotion, PromotionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PromotionType {
    Coupon,
    Bundle,
}

/// 折扣计算结果
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DiscountCalculationResponse {
    pub promotion_id: i64,
    pub promotion_type: PromotionType,
    /// 优惠券的优惠码
    pub code: Option<String>,
    /// 捆绑折扣名称
    pub name: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub amount: f64,
    /// 原始折扣额，可能大于 amount
    pub discount_amount: f64,
    /// 折后金额，不小于 0
    pub final_amount: f64,
}

impl DiscountCalculationResponse {
    pub fn new(promotion: &Promotion, amount: f64, breakdown: DiscountBreakdown) -> Self {
        let (promotion_type, code, name) = match &promotion.kind {
            PromotionKind::Coupon { code, .. } => (PromotionType::Coupon, Some(code.clone()), None),
            PromotionKind::Bundle { name, .. } => (PromotionType::Bundle, None, Some(name.clone())),
        };
        Self {
            promotion_id: promotion.id,
            promotion_type,
            code,
            name,
            discount_type: promotion.discount_type,
            discount_value: promotion.discount_value,
            amount,
            discount_amount: breakdown.discount_amount,
            final_amount: breakdown.final_amount,
        }
    }
}

/// 校验通过的促销视图
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidatedPromotionResponse {
    pub promotion_id: i64,
    pub promotion_type: PromotionType,
    pub code: Option<String>,
    pub name: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub expires_at: Option<DateTime<Utc>>,
    /// 仅优惠券：是否可整单使用
    pub usable_in_cart: Option<bool>,
    /// 仅优惠券：剩余可用次数，不限次数时为 None
    pub remaining_uses: Option<i64>,
    pub category_id: Option<i64>,
    pub product_ids: Vec<i64>,
}

impl From<Promotion> for ValidatedPromotionResponse {
    fn from(p: Promotion) -> Self {
        let mut view = Self {
            promotion_id: p.id,
            promotion_type: PromotionType::Coupon,
            code: None,
            name: None,
            discount_type: p.discount_type,
            discount_value: p.discount_value,
            expires_at: p.expires_at,
            usable_in_cart: None,
            remaining_uses: None,
            category_id: None,
            product_ids: vec![],
        };
        match p.kind {
            PromotionKind::Coupon {
                code,
                max_uses,
                used_count,
                usable_in_cart,
                product_ids,
            } => {
                view.code = Some(code);
                view.usable_in_cart = Some(usable_in_cart);
                view.remaining_uses = max_uses.map(|max| (max - used_count).max(0));
                view.product_ids = product_ids;
            }
            PromotionKind::Bundle { name, scope } => {
                view.promotion_type = PromotionType::Bundle;
                view.name = Some(name);
                match scope {
                    BundleScope::Products { product_ids } => view.product_ids = product_ids,
                    BundleScope::Category { category_id } => view.category_id = category_id,
                }
            }
        }
        view
    }
}
