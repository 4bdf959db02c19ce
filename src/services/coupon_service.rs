use crate::entities::{DiscountType, coupon_entity as coupons, coupon_product_entity as coupon_products};
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::catalog_service::ensure_products_exist;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;

const MAX_CODE_LEN: usize = 64;

/// 优惠码大小写不敏感：统一去空格并转大写
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// 折扣值必须为正；百分比折扣不超过 100
pub(crate) fn validate_discount(discount_type: DiscountType, discount_value: f64) -> AppResult<()> {
    if !discount_value.is_finite() || discount_value <= 0.0 {
        return Err(AppError::ValidationError(
            "Discount value must be a positive number".to_string(),
        ));
    }
    if discount_type == DiscountType::Percentage && discount_value > 100.0 {
        return Err(AppError::ValidationError(
            "Percentage discount cannot exceed 100".to_string(),
        ));
    }
    Ok(())
}

fn validate_code(code: &str) -> AppResult<()> {
    if code.is_empty() || code.chars().count() > MAX_CODE_LEN {
        return Err(AppError::ValidationError(format!(
            "Coupon code must be between 1 and {MAX_CODE_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_max_uses(max_uses: Option<i64>) -> AppResult<()> {
    if let Some(max) = max_uses
        && max < 1
    {
        return Err(AppError::ValidationError(
            "max_uses must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// 读取优惠券关联的商品 id（升序）
pub(crate) async fn load_coupon_product_ids<C: ConnectionTrait>(
    db: &C,
    coupon_id: i64,
) -> AppResult<Vec<i64>> {
    let rows = coupon_products::Entity::find()
        .filter(coupon_products::Column::CouponId.eq(coupon_id))
        .order_by_asc(coupon_products::Column::ProductId)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|r| r.product_id).collect())
}

async fn replace_coupon_products<C: ConnectionTrait>(
    db: &C,
    coupon_id: i64,
    product_ids: &[i64],
) -> AppResult<()> {
    coupon_products::Entity::delete_many()
        .filter(coupon_products::Column::CouponId.eq(coupon_id))
        .exec(db)
        .await?;
    if product_ids.is_empty() {
        return Ok(());
    }
    coupon_products::Entity::insert_many(product_ids.iter().map(|&product_id| {
        coupon_products::ActiveModel {
            coupon_id: Set(coupon_id),
            product_id: Set(product_id),
        }
    }))
    .exec_without_returning(db)
    .await?;
    Ok(())
}

pub struct CouponService {
    pool: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(pool: Arc<DatabaseConnection>) -> Self {
        Self { pool }
    }

    pub async fn list_coupons(
        &self,
        query: &CouponQuery,
    ) -> AppResult<PaginatedResponse<CouponResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let mut base_query = coupons::Entity::find();
        if let Some(active) = query.active {
            base_query = base_query.filter(coupons::Column::Active.eq(active));
        }

        let total = base_query.clone().count(self.pool.as_ref()).await?;
        let models = base_query
            .order_by_desc(coupons::Column::CreatedAt)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(self.pool.as_ref())
            .await?;

        // 一次性取出本页所有优惠券的关联商品
        let ids: Vec<i64> = models.iter().map(|m| m.id).collect();
        let mut links: HashMap<i64, Vec<i64>> = HashMap::new();
        if !ids.is_empty() {
            let rows = coupon_products::Entity::find()
                .filter(coupon_products::Column::CouponId.is_in(ids))
                .order_by_asc(coupon_products::Column::ProductId)
                .all(self.pool.as_ref())
                .await?;
            for row in rows {
                links.entry(row.coupon_id).or_default().push(row.product_id);
            }
        }

        let items = models
            .into_iter()
            .map(|m| {
                let product_ids = links.remove(&m.id).unwrap_or_default();
                CouponResponse::new(m, product_ids)
            })
            .collect();

        Ok(PaginatedResponse::new(items, &params, total))
    }

    pub async fn get_coupon(&self, id: i64) -> AppResult<CouponResponse> {
        let model = self.find_coupon(id).await?;
        self.to_response(model).await
    }

    /// 为已取得的优惠券补齐关联商品，不再重新读取优惠券本身
    pub async fn to_response(&self, model: coupons::Model) -> AppResult<CouponResponse> {
        let product_ids = load_coupon_product_ids(self.pool.as_ref(), model.id).await?;
        Ok(CouponResponse::new(model, product_ids))
    }

    pub async fn create_coupon(&self, req: CreateCouponRequest) -> AppResult<CouponResponse> {
        let code = normalize_code(&req.code);
        validate_code(&code)?;
        validate_discount(req.discount_type, req.discount_value)?;
        validate_max_uses(req.max_uses)?;

        self.ensure_code_available(&code).await?;
        let product_ids = ensure_products_exist(self.pool.as_ref(), &req.product_ids).await?;

        let txn = self.pool.begin().await?;
        let model = coupons::ActiveModel {
            code: Set(code),
            description: Set(req.description),
            discount_type: Set(req.discount_type),
            discount_value: Set(req.discount_value),
            max_uses: Set(req.max_uses),
            used_count: Set(0),
            expires_at: Set(req.expires_at),
            usable_in_cart: Set(req.usable_in_cart),
            active: Set(req.active),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        replace_coupon_products(&txn, model.id, &product_ids).await?;
        txn.commit().await?;

        log::info!("Coupon {} ({}) created", model.id, model.code);
        Ok(CouponResponse::new(model, product_ids))
    }

    pub async fn update_coupon(
        &self,
        id: i64,
        req: UpdateCouponRequest,
    ) -> AppResult<CouponResponse> {
        let existing = self.find_coupon(id).await?;

        let discount_type = req.discount_type.unwrap_or(existing.discount_type);
        let discount_value = req.discount_value.unwrap_or(existing.discount_value);
        validate_discount(discount_type, discount_value)?;
        validate_max_uses(req.max_uses.flatten())?;

        let code = match &req.code {
            Some(code) => {
                let code = normalize_code(code);
                validate_code(&code)?;
                if code != existing.code {
                    self.ensure_code_available(&code).await?;
                }
                Some(code)
            }
            None => None,
        };

        let product_ids = match &req.product_ids {
            Some(ids) => Some(ensure_products_exist(self.pool.as_ref(), ids).await?),
            None => None,
        };

        let txn = self.pool.begin().await?;
        let mut am = existing.into_active_model();
        if let Some(code) = code {
            am.code = Set(code);
        }
        if let Some(description) = req.description {
            am.description = Set(description);
        }
        am.discount_type = Set(discount_type);
        am.discount_value = Set(discount_value);
        if let Some(max_uses) = req.max_uses {
            am.max_uses = Set(max_uses);
        }
        if let Some(expires_at) = req.expires_at {
            am.expires_at = Set(expires_at);
        }
        if let Some(usable_in_cart) = req.usable_in_cart {
            am.usable_in_cart = Set(usable_in_cart);
        }
        if let Some(active) = req.active {
            am.active = Set(active);
        }
        am.updated_at = Set(Some(Utc::now()));
        let updated = am.update(&txn).await?;

        if let Some(ids) = &product_ids {
            replace_coupon_products(&txn, id, ids).await?;
        }
        txn.commit().await?;

        let product_ids = match product_ids {
            Some(ids) => ids,
            None => load_coupon_product_ids(self.pool.as_ref(), id).await?,
        };
        log::info!("Coupon {id} updated");
        Ok(CouponResponse::new(updated, product_ids))
    }

    /// 硬删除，关联商品由外键级联删除
    pub async fn delete_coupon(&self, id: i64) -> AppResult<()> {
        let res = coupons::Entity::delete_by_id(id).exec(self.pool.as_ref()).await?;
        if res.rows_affected == 0 {
            return Err(AppError::NotFound("Coupon not found".to_string()));
        }
        log::info!("Coupon {id} deleted");
        Ok(())
    }

    async fn find_coupon(&self, id: i64) -> AppResult<coupons::Model> {
        coupons::Entity::find_by_id(id)
            .one(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("Coupon not found".to_string()))
    }

    async fn ensure_code_available(&self, code: &str) -> AppResult<()> {
        let taken = coupons::Entity::find()
            .filter(coupons::Column::Code.eq(code))
            .one(self.pool.as_ref())
            .await?
            .is_some();
        if taken {
            return Err(AppError::ValidationError(
                "Coupon code already exists".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn coupon(id: i64, code: &str) -> coupons::Model {
        coupons::Model {
            id,
            code: code.to_string(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: 10.0,
            max_uses: None,
            used_count: 0,
            expires_at: None,
            usable_in_cart: true,
            active: true,
            created_at: None,
            updated_at: None,
        }
    }

    fn create_request(code: &str) -> CreateCouponRequest {
        CreateCouponRequest {
            code: code.to_string(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: 10.0,
            max_uses: None,
            expires_at: None,
            usable_in_cart: true,
            active: true,
            product_ids: vec![],
        }
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  save10 "), "SAVE10");
        assert_eq!(normalize_code("Flat50"), "FLAT50");
    }

    #[test]
    fn test_validate_discount() {
        assert!(validate_discount(DiscountType::Percentage, 100.0).is_ok());
        assert!(validate_discount(DiscountType::Percentage, 100.5).is_err());
        assert!(validate_discount(DiscountType::Fixed, 250.0).is_ok());
        assert!(validate_discount(DiscountType::Fixed, 0.0).is_err());
        assert!(validate_discount(DiscountType::Fixed, f64::NAN).is_err());
    }

    #[tokio::test]
    async fn test_create_coupon_uppercases_code() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            // 重复检查
            .append_query_results([Vec::<coupons::Model>::new()])
            // INSERT ... RETURNING
            .append_query_results([vec![coupon(1, "SAVE10")]])
            // 清空关联商品
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let service = CouponService::new(Arc::new(db));

        let created = service.create_coupon(create_request("save10")).await.unwrap();
        assert_eq!(created.code, "SAVE10");
        assert_eq!(created.used_count, 0);
        assert!(created.product_ids.is_empty());
    }

    #[tokio::test]
    async fn test_create_coupon_rejects_duplicate_code() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![coupon(1, "SAVE10")]])
            .into_connection();
        let service = CouponService::new(Arc::new(db));

        let err = service
            .create_coupon(create_request("Save10"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(msg) if msg.contains("already exists")));
    }

    #[tokio::test]
    async fn test_create_coupon_rejects_zero_max_uses() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let service = CouponService::new(Arc::new(db));
        let mut req = create_request("ZERO");
        req.max_uses = Some(0);
        assert!(service.create_coupon(req).await.is_err());
    }

    #[tokio::test]
    async fn test_update_coupon_clears_max_uses() {
        let mut capped = coupon(1, "SAVE10");
        capped.max_uses = Some(5);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![capped]])
            // UPDATE ... RETURNING
            .append_query_results([vec![coupon(1, "SAVE10")]])
            .append_query_results([Vec::<coupon_products::Model>::new()])
            .into_connection();
        let pool = Arc::new(db);
        let service = CouponService::new(pool.clone());

        let req: UpdateCouponRequest = serde_json::from_str(r#"{"max_uses": null}"#).unwrap();
        assert_eq!(req.max_uses, Some(None));
        let updated = service.update_coupon(1, req).await.unwrap();
        assert_eq!(updated.max_uses, None);

        drop(service);
        let Ok(db) = Arc::try_unwrap(pool) else {
            panic!("connection still shared");
        };
        // 显式 null 必须出现在 UPDATE 的 SET 中
        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains(r#"UPDATE \"coupons\" SET"#));
        assert!(log.contains(r#"\"max_uses\" = "#));
    }

    #[tokio::test]
    async fn test_update_coupon_keeps_omitted_max_uses() {
        let mut capped = coupon(1, "SAVE10");
        capped.max_uses = Some(5);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![capped.clone()]])
            .append_query_results([vec![capped]])
            .append_query_results([Vec::<coupon_products::Model>::new()])
            .into_connection();
        let service = CouponService::new(Arc::new(db));

        let req: UpdateCouponRequest = serde_json::from_str(r#"{"active": true}"#).unwrap();
        assert_eq!(req.max_uses, None);
        let updated = service.update_coupon(1, req).await.unwrap();
        assert_eq!(updated.max_uses, Some(5));
    }

    #[tokio::test]
    async fn test_update_coupon_rejects_zero_max_uses() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![coupon(1, "SAVE10")]])
            .into_connection();
        let service = CouponService::new(Arc::new(db));
        let req = UpdateCouponRequest {
            max_uses: Some(Some(0)),
            ..Default::default()
        };
        let err = service.update_coupon(1, req).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(msg) if msg.contains("max_uses")));
    }

    #[tokio::test]
    async fn test_to_response_loads_links_for_given_model() {
        let mut redeemed = coupon(3, "FLAT50");
        redeemed.used_count = 2;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                coupon_products::Model {
                    coupon_id: 3,
                    product_id: 7,
                },
                coupon_products::Model {
                    coupon_id: 3,
                    product_id: 8,
                },
            ]])
            .into_connection();
        let service = CouponService::new(Arc::new(db));

        let view = service.to_response(redeemed).await.unwrap();
        assert_eq!(view.used_count, 2);
        assert_eq!(view.product_ids, vec![7, 8]);
    }

    #[tokio::test]
    async fn test_get_missing_coupon() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<coupons::Model>::new()])
            .into_connection();
        let service = CouponService::new(Arc::new(db));
        let err = service.get_coupon(404).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
