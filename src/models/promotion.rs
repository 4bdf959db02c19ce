//! 促销（优惠券 / 捆绑折扣）的统一领域模型。
//!
//! 这里只包含纯函数逻辑：有效性校验、适用范围判断与折扣计算。
//! 数据库读写由 `services::DiscountResolver` 负责。

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::entities::{BundleApplyTo, DiscountType, bundle_entity, coupon_entity};

/// 促销校验失败的原因，全部属于用户可纠正的输入问题
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionError {
    #[error("Invalid coupon code")]
    InvalidCode,

    #[error("Bundle not found")]
    NotFound,

    #[error("Promotion is not active")]
    Inactive,

    #[error("Promotion has expired")]
    Expired,

    #[error("Coupon usage limit reached")]
    UsageExceeded,

    #[error("Promotion is not applicable to this product")]
    NotApplicable,

    #[error("Coupon cannot be used on the whole cart")]
    NotCartEligible,
}

impl PromotionError {
    pub fn code(&self) -> &'static str {
        match self {
            PromotionError::InvalidCode => "INVALID_CODE",
            PromotionError::NotFound => "NOT_FOUND",
            PromotionError::Inactive => "INACTIVE",
            PromotionError::Expired => "EXPIRED",
            PromotionError::UsageExceeded => "USAGE_EXCEEDED",
            PromotionError::NotApplicable => "NOT_APPLICABLE",
            PromotionError::NotCartEligible => "NOT_CART_ELIGIBLE",
        }
    }
}

/// 查找促销的标识：优惠码（大小写不敏感）或捆绑折扣 ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionRef {
    CouponCode(String),
    BundleId(i64),
}

/// 折扣计算的目标：整单，或某个具体商品
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Cart,
    Product {
        id: i64,
        /// 商品不存在或未归类时为 None
        category_id: Option<i64>,
    },
}

/// 捆绑折扣的适用范围及其关联数据
#[derive(Debug, Clone, PartialEq)]
pub enum BundleScope {
    Products { product_ids: Vec<i64> },
    Category { category_id: Option<i64> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromotionKind {
    Coupon {
        code: String,
        max_uses: Option<i64>,
        used_count: i64,
        usable_in_cart: bool,
        product_ids: Vec<i64>,
    },
    Bundle {
        name: String,
        scope: BundleScope,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Promotion {
    pub id: i64,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub kind: PromotionKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscountBreakdown {
    /// 原始折扣额，固定金额折扣可能大于订单金额
    pub discount_amount: f64,
    /// 折后金额，最低为 0
    pub final_amount: f64,
}

/// 过期是读取时根据当前时间推导的状态，不落库
pub fn is_expired(now: DateTime<Utc>, expires_at: Option<DateTime<Utc>>) -> bool {
    expires_at.is_some_and(|t| now > t)
}

pub fn compute_discount(
    discount_type: DiscountType,
    discount_value: f64,
    amount: f64,
) -> DiscountBreakdown {
    let discount_amount = match discount_type {
        DiscountType::Percentage => amount * discount_value / 100.0,
        DiscountType::Fixed => discount_value,
    };
    DiscountBreakdown {
        discount_amount,
        final_amount: (amount - discount_amount).max(0.0),
    }
}

impl Promotion {
    pub fn from_coupon(model: coupon_entity::Model, product_ids: Vec<i64>) -> Self {
        Self {
            id: model.id,
            discount_type: model.discount_type,
            discount_value: model.discount_value,
            active: model.active,
            expires_at: model.expires_at,
            kind: PromotionKind::Coupon {
                code: model.code,
                max_uses: model.max_uses,
                used_count: model.used_count,
                usable_in_cart: model.usable_in_cart,
                product_ids,
            },
        }
    }

    pub fn from_bundle(model: bundle_entity::Model, product_ids: Vec<i64>) -> Self {
        let scope = match model.apply_to {
            BundleApplyTo::Products => BundleScope::Products { product_ids },
            BundleApplyTo::Category => BundleScope::Category {
                category_id: model.category_id,
            },
        };
        Self {
            id: model.id,
            discount_type: model.discount_type,
            discount_value: model.discount_value,
            active: model.active,
            expires_at: model.expires_at,
            kind: PromotionKind::Bundle {
                name: model.name,
                scope,
            },
        }
    }

    /// 只有按分类生效的捆绑折扣需要知道目标商品的分类
    pub fn needs_target_category(&self) -> bool {
        matches!(
            self.kind,
            PromotionKind::Bundle {
                scope: BundleScope::Category { .. },
                ..
            }
        )
    }

    /// 校验顺序：过期 -> 停用 -> 次数上限（仅优惠券）
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), PromotionError> {
        if is_expired(now, self.expires_at) {
            return Err(PromotionError::Expired);
        }
        if !self.active {
            return Err(PromotionError::Inactive);
        }
        if let PromotionKind::Coupon {
            max_uses: Some(max),
            used_count,
            ..
        } = &self.kind
            && used_count >= max
        {
            return Err(PromotionError::UsageExceeded);
        }
        Ok(())
    }

    pub fn ensure_applicable(&self, target: &Target) -> Result<(), PromotionError> {
        match (&self.kind, target) {
            (PromotionKind::Coupon { usable_in_cart, .. }, Target::Cart) => {
                if *usable_in_cart {
                    Ok(())
                } else {
                    Err(PromotionError::NotCartEligible)
                }
            }
            (PromotionKind::Coupon { product_ids, .. }, Target::Product { id, .. }) => {
                if product_ids.contains(id) {
                    Ok(())
                } else {
                    Err(PromotionError::NotApplicable)
                }
            }
            (PromotionKind::Bundle { .. }, Target::Cart) => Err(PromotionError::NotApplicable),
            (
                PromotionKind::Bundle {
                    scope: BundleScope::Products { product_ids },
                    ..
                },
                Target::Product { id, .. },
            ) => {
                if product_ids.contains(id) {
                    Ok(())
                } else {
                    Err(PromotionError::NotApplicable)
                }
            }
            (
                PromotionKind::Bundle {
                    scope: BundleScope::Category { category_id },
                    ..
                },
                Target::Product {
                    category_id: product_category,
                    ..
                },
            ) => match (category_id, product_category) {
                (Some(expected), Some(actual)) if expected == actual => Ok(()),
                _ => Err(PromotionError::NotApplicable),
            },
        }
    }

    pub fn compute(&self, amount: f64) -> DiscountBreakdown {
        compute_discount(self.discount_type, self.discount_value, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(code: &str, discount_type: DiscountType, value: f64) -> coupon_entity::Model {
        coupon_entity::Model {
            id: 1,
            code: code.to_string(),
            description: None,
            discount_type,
            discount_value: value,
            max_uses: None,
            used_count: 0,
            expires_at: None,
            usable_in_cart: false,
            active: true,
            created_at: None,
            updated_at: None,
        }
    }

    fn bundle(apply_to: BundleApplyTo, category_id: Option<i64>) -> bundle_entity::Model {
        bundle_entity::Model {
            id: 5,
            name: "Starter pack".to_string(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: 25.0,
            apply_to,
            category_id,
            expires_at: None,
            active: true,
            created_at: None,
            updated_at: None,
        }
    }

    fn product(id: i64, category_id: Option<i64>) -> Target {
        Target::Product { id, category_id }
    }

    #[test]
    fn test_percentage_discount() {
        let d = compute_discount(DiscountType::Percentage, 10.0, 200.0);
        assert_eq!(d.discount_amount, 20.0);
        assert_eq!(d.final_amount, 180.0);
    }

    #[test]
    fn test_fixed_discount_floors_at_zero() {
        let d = compute_discount(DiscountType::Fixed, 50.0, 30.0);
        assert_eq!(d.discount_amount, 50.0);
        assert_eq!(d.final_amount, 0.0);

        let d = compute_discount(DiscountType::Fixed, 5.0, 30.0);
        assert_eq!(d.final_amount, 25.0);
    }

    #[test]
    fn test_is_expired_is_strict() {
        let now = Utc::now();
        assert!(!is_expired(now, None));
        assert!(!is_expired(now, Some(now)));
        assert!(is_expired(now, Some(now - Duration::seconds(1))));
        assert!(!is_expired(now, Some(now + Duration::days(1))));
    }

    #[test]
    fn test_expired_wins_over_other_fields() {
        let now = Utc::now();
        let mut model = coupon("OLD", DiscountType::Fixed, 5.0);
        model.expires_at = Some(now - Duration::hours(1));
        model.active = false;
        model.max_uses = Some(1);
        model.used_count = 3;
        let promo = Promotion::from_coupon(model, vec![]);
        assert_eq!(promo.validate(now), Err(PromotionError::Expired));
    }

    #[test]
    fn test_inactive_coupon() {
        let mut model = coupon("OFF", DiscountType::Fixed, 5.0);
        model.active = false;
        let promo = Promotion::from_coupon(model, vec![]);
        assert_eq!(promo.validate(Utc::now()), Err(PromotionError::Inactive));
    }

    #[test]
    fn test_usage_cap() {
        let mut model = coupon("ONCE", DiscountType::Percentage, 10.0);
        model.max_uses = Some(1);
        model.used_count = 1;
        let promo = Promotion::from_coupon(model.clone(), vec![]);
        assert_eq!(promo.validate(Utc::now()), Err(PromotionError::UsageExceeded));

        model.used_count = 0;
        let promo = Promotion::from_coupon(model, vec![]);
        assert!(promo.validate(Utc::now()).is_ok());
    }

    #[test]
    fn test_bundle_has_no_usage_cap() {
        let promo = Promotion::from_bundle(bundle(BundleApplyTo::Products, None), vec![1]);
        assert!(promo.validate(Utc::now()).is_ok());
    }

    #[test]
    fn test_coupon_cart_eligibility() {
        let mut model = coupon("SAVE10", DiscountType::Percentage, 10.0);
        let promo = Promotion::from_coupon(model.clone(), vec![]);
        assert_eq!(
            promo.ensure_applicable(&Target::Cart),
            Err(PromotionError::NotCartEligible)
        );

        model.usable_in_cart = true;
        let promo = Promotion::from_coupon(model, vec![]);
        assert!(promo.ensure_applicable(&Target::Cart).is_ok());
        let d = promo.compute(200.0);
        assert_eq!(d.discount_amount, 20.0);
        assert_eq!(d.final_amount, 180.0);
    }

    #[test]
    fn test_coupon_product_restriction() {
        let promo = Promotion::from_coupon(coupon("FLAT50", DiscountType::Fixed, 50.0), vec![7]);
        assert!(promo.ensure_applicable(&product(7, None)).is_ok());
        assert_eq!(
            promo.ensure_applicable(&product(8, None)),
            Err(PromotionError::NotApplicable)
        );
        // 限定商品的优惠券不会因为 usable_in_cart=false 而影响单品使用
        let d = promo.compute(30.0);
        assert_eq!(d.discount_amount, 50.0);
        assert_eq!(d.final_amount, 0.0);
    }

    #[test]
    fn test_bundle_product_set() {
        let promo = Promotion::from_bundle(bundle(BundleApplyTo::Products, None), vec![1, 2]);
        assert!(promo.ensure_applicable(&product(2, Some(9))).is_ok());
        assert_eq!(
            promo.ensure_applicable(&product(3, Some(9))),
            Err(PromotionError::NotApplicable)
        );
        assert_eq!(
            promo.ensure_applicable(&Target::Cart),
            Err(PromotionError::NotApplicable)
        );
    }

    #[test]
    fn test_bundle_category_match() {
        let promo = Promotion::from_bundle(bundle(BundleApplyTo::Category, Some(3)), vec![]);
        assert!(promo.needs_target_category());
        assert!(promo.ensure_applicable(&product(99, Some(3))).is_ok());
        assert_eq!(
            promo.ensure_applicable(&product(99, Some(4))),
            Err(PromotionError::NotApplicable)
        );
        assert_eq!(
            promo.ensure_applicable(&product(99, None)),
            Err(PromotionError::NotApplicable)
        );
    }

    #[test]
    fn test_bundle_without_category_matches_nothing() {
        let promo = Promotion::from_bundle(bundle(BundleApplyTo::Category, None), vec![]);
        assert_eq!(
            promo.ensure_applicable(&product(1, None)),
            Err(PromotionError::NotApplicable)
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(PromotionError::UsageExceeded.code(), "USAGE_EXCEEDED");
        assert_eq!(PromotionError::NotCartEligible.code(), "NOT_CART_ELIGIBLE");
    }
}
