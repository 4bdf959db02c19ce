use crate::entities::{
    BundleApplyTo, bundle_entity as bundles, bundle_product_entity as bundle_products,
    product_entity as products,
};
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::catalog_service::{ensure_category_exists, ensure_products_exist};
use crate::services::coupon_service::validate_discount;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set,
    TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) async fn load_bundle_product_ids<C: ConnectionTrait>(
    db: &C,
    bundle_id: i64,
) -> AppResult<Vec<i64>> {
    let rows = bundle_products::Entity::find()
        .filter(bundle_products::Column::BundleId.eq(bundle_id))
        .order_by_asc(bundle_products::Column::ProductId)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|r| r.product_id).collect())
}

async fn load_links<C: ConnectionTrait>(
    db: &C,
    bundle_ids: Vec<i64>,
) -> AppResult<HashMap<i64, Vec<i64>>> {
    let mut links: HashMap<i64, Vec<i64>> = HashMap::new();
    if bundle_ids.is_empty() {
        return Ok(links);
    }
    let rows = bundle_products::Entity::find()
        .filter(bundle_products::Column::BundleId.is_in(bundle_ids))
        .order_by_asc(bundle_products::Column::ProductId)
        .all(db)
        .await?;
    for row in rows {
        links.entry(row.bundle_id).or_default().push(row.product_id);
    }
    Ok(links)
}

async fn replace_bundle_products<C: ConnectionTrait>(
    db: &C,
    bundle_id: i64,
    product_ids: &[i64],
) -> AppResult<()> {
    bundle_products::Entity::delete_many()
        .filter(bundle_products::Column::BundleId.eq(bundle_id))
        .exec(db)
        .await?;
    if product_ids.is_empty() {
        return Ok(());
    }
    bundle_products::Entity::insert_many(product_ids.iter().map(|&product_id| {
        bundle_products::ActiveModel {
            bundle_id: Set(bundle_id),
            product_id: Set(product_id),
        }
    }))
    .exec_without_returning(db)
    .await?;
    Ok(())
}

/// 启用且未过期
fn available() -> Condition {
    Condition::all()
        .add(bundles::Column::Active.eq(true))
        .add(
            Condition::any()
                .add(bundles::Column::ExpiresAt.is_null())
                .add(bundles::Column::ExpiresAt.gte(Utc::now())),
        )
}

fn validate_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 255 {
        return Err(AppError::ValidationError(
            "Bundle name must be between 1 and 255 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

/// 适用范围归一化：按商品生效时不保留分类，按分类生效时不保留商品
struct Scope {
    apply_to: BundleApplyTo,
    category_id: Option<i64>,
    product_ids: Vec<i64>,
}

pub struct BundleService {
    pool: Arc<DatabaseConnection>,
}

impl BundleService {
    pub fn new(pool: Arc<DatabaseConnection>) -> Self {
        Self { pool }
    }

    /// 前台列表：仅返回启用且未过期的捆绑折扣
    pub async fn list_active(
        &self,
        query: &BundleQuery,
    ) -> AppResult<PaginatedResponse<BundleResponse>> {
        self.paginate(bundles::Entity::find().filter(available()), query)
            .await
    }

    /// 后台列表：包含停用和已过期的记录
    pub async fn list_all(
        &self,
        query: &BundleQuery,
    ) -> AppResult<PaginatedResponse<BundleResponse>> {
        self.paginate(bundles::Entity::find(), query).await
    }

    pub async fn get_bundle(&self, id: i64) -> AppResult<BundleResponse> {
        let model = self.find_bundle(id).await?;
        let product_ids = load_bundle_product_ids(self.pool.as_ref(), id).await?;
        Ok(BundleResponse::new(model, product_ids))
    }

    /// 商品详情页可用的捆绑折扣：显式关联该商品，或按该商品所属分类生效
    pub async fn list_for_product(&self, product_id: i64) -> AppResult<Vec<BundleResponse>> {
        let product = products::Entity::find_by_id(product_id)
            .one(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

        let linked: Vec<i64> = bundle_products::Entity::find()
            .filter(bundle_products::Column::ProductId.eq(product_id))
            .all(self.pool.as_ref())
            .await?
            .into_iter()
            .map(|r| r.bundle_id)
            .collect();

        let mut scope = Condition::any().add(
            Condition::all()
                .add(bundles::Column::ApplyTo.eq(BundleApplyTo::Products))
                .add(bundles::Column::Id.is_in(linked)),
        );
        if let Some(category_id) = product.category_id {
            scope = scope.add(
                Condition::all()
                    .add(bundles::Column::ApplyTo.eq(BundleApplyTo::Category))
                    .add(bundles::Column::CategoryId.eq(category_id)),
            );
        }

        let models = bundles::Entity::find()
            .filter(available())
            .filter(scope)
            .order_by_asc(bundles::Column::Id)
            .all(self.pool.as_ref())
            .await?;

        let mut links = load_links(self.pool.as_ref(), models.iter().map(|m| m.id).collect()).await?;
        Ok(models
            .into_iter()
            .map(|m| {
                let product_ids = links.remove(&m.id).unwrap_or_default();
                BundleResponse::new(m, product_ids)
            })
            .collect())
    }

    pub async fn create_bundle(&self, req: CreateBundleRequest) -> AppResult<BundleResponse> {
        let name = validate_name(&req.name)?;
        validate_discount(req.discount_type, req.discount_value)?;
        let scope = self
            .check_scope(req.apply_to, req.category_id, &req.product_ids)
            .await?;

        let txn = self.pool.begin().await?;
        let model = bundles::ActiveModel {
            name: Set(name),
            description: Set(req.description),
            discount_type: Set(req.discount_type),
            discount_value: Set(req.discount_value),
            apply_to: Set(scope.apply_to),
            category_id: Set(scope.category_id),
            expires_at: Set(req.expires_at),
            active: Set(req.active),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        replace_bundle_products(&txn, model.id, &scope.product_ids).await?;
        txn.commit().await?;

        log::info!("Bundle {} ({}) created", model.id, model.apply_to);
        Ok(BundleResponse::new(model, scope.product_ids))
    }

    pub async fn update_bundle(
        &self,
        id: i64,
        req: UpdateBundleRequest,
    ) -> AppResult<BundleResponse> {
        let existing = self.find_bundle(id).await?;

        let discount_type = req.discount_type.unwrap_or(existing.discount_type);
        let discount_value = req.discount_value.unwrap_or(existing.discount_value);
        validate_discount(discount_type, discount_value)?;

        // 未修改范围相关字段时沿用现有配置
        let scope_changed =
            req.apply_to.is_some() || req.category_id.is_some() || req.product_ids.is_some();
        let scope = if scope_changed {
            let apply_to = req.apply_to.unwrap_or(existing.apply_to);
            let category_id = req.category_id.unwrap_or(existing.category_id);
            let product_ids = match req.product_ids {
                Some(ids) => ids,
                None => load_bundle_product_ids(self.pool.as_ref(), id).await?,
            };
            Some(self.check_scope(apply_to, category_id, &product_ids).await?)
        } else {
            None
        };

        let txn = self.pool.begin().await?;
        let mut am = existing.into_active_model();
        if let Some(name) = &req.name {
            am.name = Set(validate_name(name)?);
        }
        if let Some(description) = req.description {
            am.description = Set(description);
        }
        am.discount_type = Set(discount_type);
        am.discount_value = Set(discount_value);
        if let Some(scope) = &scope {
            am.apply_to = Set(scope.apply_to);
            am.category_id = Set(scope.category_id);
        }
        if let Some(expires_at) = req.expires_at {
            am.expires_at = Set(expires_at);
        }
        if let Some(active) = req.active {
            am.active = Set(active);
        }
        am.updated_at = Set(Some(Utc::now()));
        let updated = am.update(&txn).await?;

        if let Some(scope) = &scope {
            replace_bundle_products(&txn, id, &scope.product_ids).await?;
        }
        txn.commit().await?;

        let product_ids = match scope {
            Some(scope) => scope.product_ids,
            None => load_bundle_product_ids(self.pool.as_ref(), id).await?,
        };
        log::info!("Bundle {id} updated");
        Ok(BundleResponse::new(updated, product_ids))
    }

    pub async fn delete_bundle(&self, id: i64) -> AppResult<()> {
        let res = bundles::Entity::delete_by_id(id).exec(self.pool.as_ref()).await?;
        if res.rows_affected == 0 {
            return Err(AppError::NotFound("Bundle not found".to_string()));
        }
        log::info!("Bundle {id} deleted");
        Ok(())
    }

    async fn check_scope(
        &self,
        apply_to: BundleApplyTo,
        category_id: Option<i64>,
        product_ids: &[i64],
    ) -> AppResult<Scope> {
        match apply_to {
            BundleApplyTo::Products => {
                let product_ids = ensure_products_exist(self.pool.as_ref(), product_ids).await?;
                if product_ids.is_empty() {
                    return Err(AppError::ValidationError(
                        "product_ids is required when apply_to is products".to_string(),
                    ));
                }
                Ok(Scope {
                    apply_to,
                    category_id: None,
                    product_ids,
                })
            }
            BundleApplyTo::Category => {
                let category_id = category_id.ok_or_else(|| {
                    AppError::ValidationError(
                        "category_id is required when apply_to is category".to_string(),
                    )
                })?;
                ensure_category_exists(self.pool.as_ref(), category_id).await?;
                Ok(Scope {
                    apply_to,
                    category_id: Some(category_id),
                    product_ids: vec![],
                })
            }
        }
    }

    async fn paginate(
        &self,
        select: Select<bundles::Entity>,
        query: &BundleQuery,
    ) -> AppResult<PaginatedResponse<BundleResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);
        let total = select.clone().count(self.pool.as_ref()).await?;
        let models = select
            .order_by_desc(bundles::Column::CreatedAt)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(self.pool.as_ref())
            .await?;

        let mut links = load_links(self.pool.as_ref(), models.iter().map(|m| m.id).collect()).await?;
        let items = models
            .into_iter()
            .map(|m| {
                let product_ids = links.remove(&m.id).unwrap_or_default();
                BundleResponse::new(m, product_ids)
            })
            .collect();
        Ok(PaginatedResponse::new(items, &params, total))
    }

    async fn find_bundle(&self, id: i64) -> AppResult<bundles::Model> {
        bundles::Entity::find_by_id(id)
            .one(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("Bundle not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{DiscountType, category_entity as categories};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn bundle(id: i64, apply_to: BundleApplyTo, category_id: Option<i64>) -> bundles::Model {
        bundles::Model {
            id,
            name: format!("Bundle {id}"),
            description: None,
            discount_type: DiscountType::Fixed,
            discount_value: 5.0,
            apply_to,
            category_id,
            expires_at: None,
            active: true,
            created_at: None,
            updated_at: None,
        }
    }

    fn request(apply_to: BundleApplyTo) -> CreateBundleRequest {
        CreateBundleRequest {
            name: "Weekend deal".to_string(),
            description: None,
            discount_type: DiscountType::Fixed,
            discount_value: 5.0,
            apply_to,
            category_id: None,
            product_ids: vec![],
            expires_at: None,
            active: true,
        }
    }

    #[tokio::test]
    async fn test_category_bundle_requires_category() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let service = BundleService::new(Arc::new(db));
        let err = service
            .create_bundle(request(BundleApplyTo::Category))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(msg) if msg.contains("category_id")));
    }

    #[tokio::test]
    async fn test_product_bundle_requires_products() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let service = BundleService::new(Arc::new(db));
        let err = service
            .create_bundle(request(BundleApplyTo::Products))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(msg) if msg.contains("product_ids")));
    }

    #[tokio::test]
    async fn test_create_category_bundle_drops_product_links() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![categories::Model {
                id: 3,
                name: "Ranks".to_string(),
                description: None,
                created_at: None,
                updated_at: None,
            }]])
            .append_query_results([vec![bundle(1, BundleApplyTo::Category, Some(3))]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let service = BundleService::new(Arc::new(db));

        let mut req = request(BundleApplyTo::Category);
        req.category_id = Some(3);
        req.product_ids = vec![1, 2];
        let created = service.create_bundle(req).await.unwrap();
        assert_eq!(created.category_id, Some(3));
        assert!(created.product_ids.is_empty());
    }

    #[tokio::test]
    async fn test_clearing_category_of_category_bundle_is_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![bundle(1, BundleApplyTo::Category, Some(3))]])
            .append_query_results([Vec::<bundle_products::Model>::new()])
            .into_connection();
        let service = BundleService::new(Arc::new(db));

        let req: UpdateBundleRequest = serde_json::from_str(r#"{"category_id": null}"#).unwrap();
        let err = service.update_bundle(1, req).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(msg) if msg.contains("category_id")));
    }

    #[tokio::test]
    async fn test_list_for_missing_product() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<products::Model>::new()])
            .into_connection();
        let service = BundleService::new(Arc::new(db));
        let err = service.list_for_product(5).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_bundle_with_links() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![bundle(2, BundleApplyTo::Products, None)]])
            .append_query_results([vec![
                bundle_products::Model {
                    bundle_id: 2,
                    product_id: 4,
                },
                bundle_products::Model {
                    bundle_id: 2,
                    product_id: 9,
                },
            ]])
            .into_connection();
        let service = BundleService::new(Arc::new(db));
        let found = service.get_bundle(2).await.unwrap();
        assert_eq!(found.product_ids, vec![4, 9]);
        assert!(!found.expired);
    }
}
