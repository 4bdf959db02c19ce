use crate::entities::{
    bundle_entity as bundles, coupon_entity as coupons, product_entity as products,
};
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::bundle_service::load_bundle_product_ids;
use crate::services::coupon_service::{load_coupon_product_ids, normalize_code};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, UpdateResult};
use std::sync::Arc;

/// 促销解析器：校验 -> 适用性判断 -> 折扣计算，以及优惠券核销计数
pub struct DiscountResolver {
    pool: Arc<DatabaseConnection>,
}

impl DiscountResolver {
    pub fn new(pool: Arc<DatabaseConnection>) -> Self {
        Self { pool }
    }

    /// 读取并校验促销；任何计算都必须先经过这里
    pub async fn validate(&self, identifier: &PromotionRef) -> AppResult<Promotion> {
        let promotion = match identifier {
            PromotionRef::CouponCode(code) => {
                let code = normalize_code(code);
                let model = coupons::Entity::find()
                    .filter(coupons::Column::Code.eq(code))
                    .one(self.pool.as_ref())
                    .await?
                    .ok_or(PromotionError::InvalidCode)?;
                let product_ids = load_coupon_product_ids(self.pool.as_ref(), model.id).await?;
                Promotion::from_coupon(model, product_ids)
            }
            PromotionRef::BundleId(id) => {
                let model = bundles::Entity::find_by_id(*id)
                    .one(self.pool.as_ref())
                    .await?
                    .ok_or(PromotionError::NotFound)?;
                let product_ids = load_bundle_product_ids(self.pool.as_ref(), model.id).await?;
                Promotion::from_bundle(model, product_ids)
            }
        };

        promotion.validate(Utc::now())?;
        Ok(promotion)
    }

    pub async fn calculate_discount(
        &self,
        identifier: &PromotionRef,
        target_product_id: Option<i64>,
        amount: f64,
    ) -> AppResult<(Promotion, DiscountBreakdown)> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(AppError::ValidationError(
                "Amount must be a non-negative number".to_string(),
            ));
        }

        let promotion = self.validate(identifier).await?;
        let target = self.resolve_target(&promotion, target_product_id).await?;
        promotion.ensure_applicable(&target)?;

        let breakdown = promotion.compute(amount);
        log::debug!(
            "Promotion {} applied to {:?}: amount={amount}, discount={}, final={}",
            promotion.id,
            target,
            breakdown.discount_amount,
            breakdown.final_amount
        );
        Ok((promotion, breakdown))
    }

    /// 核销一次优惠券：条件更新保证并发下不会超过 max_uses
    pub async fn record_redemption(&self, coupon_id: i64) -> AppResult<coupons::Model> {
        let update_result: UpdateResult = coupons::Entity::update_many()
            .col_expr(
                coupons::Column::UsedCount,
                Expr::col(coupons::Column::UsedCount).add(1),
            )
            .col_expr(coupons::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupons::Column::Id.eq(coupon_id))
            .filter(
                Condition::any()
                    .add(coupons::Column::MaxUses.is_null())
                    .add(Expr::col(coupons::Column::UsedCount).lt(Expr::col(coupons::Column::MaxUses))),
            )
            .exec(self.pool.as_ref())
            .await?;

        let current = coupons::Entity::find_by_id(coupon_id)
            .one(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("Coupon not found".to_string()))?;

        if update_result.rows_affected == 0 {
            log::warn!(
                "Coupon {} redemption rejected: {}/{:?} used",
                current.code,
                current.used_count,
                current.max_uses
            );
            return Err(PromotionError::UsageExceeded.into());
        }

        log::info!(
            "Coupon {} redeemed ({} used)",
            current.code,
            current.used_count
        );
        Ok(current)
    }

    async fn resolve_target(
        &self,
        promotion: &Promotion,
        target_product_id: Option<i64>,
    ) -> AppResult<Target> {
        let Some(id) = target_product_id else {
            return Ok(Target::Cart);
        };
        // 只有按分类生效的捆绑折扣才需要查询商品
        let category_id = if promotion.needs_target_category() {
            products::Entity::find_by_id(id)
                .one(self.pool.as_ref())
                .await?
                .and_then(|p| p.category_id)
        } else {
            None
        };
        Ok(Target::Product { id, category_id })
    }
}
