use crate::entities::{category_entity as categories, product_entity as products};
use crate::error::{AppError, AppResult};
use crate::models::*;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;

/// 商品与分类的基础维护，促销规则只依赖其中的 id / category_id
pub struct CatalogService {
    pool: Arc<DatabaseConnection>,
}

/// 校验关联商品全部存在，返回去重排序后的 id 列表
pub(crate) async fn ensure_products_exist<C: ConnectionTrait>(
    db: &C,
    product_ids: &[i64],
) -> AppResult<Vec<i64>> {
    let mut ids = product_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(ids);
    }

    let found = products::Entity::find()
        .filter(products::Column::Id.is_in(ids.clone()))
        .all(db)
        .await?;
    if found.len() != ids.len() {
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !found.iter().any(|p| p.id == **id))
            .map(|id| id.to_string())
            .collect();
        return Err(AppError::ValidationError(format!(
            "Unknown product ids: {}",
            missing.join(", ")
        )));
    }
    Ok(ids)
}

pub(crate) async fn ensure_category_exists<C: ConnectionTrait>(
    db: &C,
    category_id: i64,
) -> AppResult<()> {
    categories::Entity::find_by_id(category_id)
        .one(db)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::ValidationError(format!("Unknown category id: {category_id}")))
}

fn validate_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 255 {
        return Err(AppError::ValidationError(
            "Name must be between 1 and 255 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

fn validate_price(price: f64) -> AppResult<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::ValidationError(
            "Price must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

impl CatalogService {
    pub fn new(pool: Arc<DatabaseConnection>) -> Self {
        Self { pool }
    }

    // -----------------------------
    // 分类
    // -----------------------------

    pub async fn list_categories(&self) -> AppResult<Vec<CategoryResponse>> {
        let list = categories::Entity::find()
            .order_by_asc(categories::Column::Name)
            .all(self.pool.as_ref())
            .await?;
        Ok(list.into_iter().map(Into::into).collect())
    }

    pub async fn get_category(&self, id: i64) -> AppResult<CategoryResponse> {
        categories::Entity::find_by_id(id)
            .one(self.pool.as_ref())
            .await?
            .map(Into::into)
            .ok_or_else(|| AppError::NotFound("Category not found".to_string()))
    }

    pub async fn create_category(&self, req: CreateCategoryRequest) -> AppResult<CategoryResponse> {
        let name = validate_name(&req.name)?;
        let model = categories::ActiveModel {
            name: Set(name),
            description: Set(req.description),
            ..Default::default()
        }
        .insert(self.pool.as_ref())
        .await?;
        log::info!("Category {} created", model.id);
        Ok(model.into())
    }

    pub async fn update_category(
        &self,
        id: i64,
        req: UpdateCategoryRequest,
    ) -> AppResult<CategoryResponse> {
        if req.name.is_none() && req.description.is_none() {
            return Err(AppError::ValidationError("No fields to update".to_string()));
        }
        let mut am = categories::Entity::find_by_id(id)
            .one(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("Category not found".to_string()))?
            .into_active_model();
        if let Some(name) = &req.name {
            am.name = Set(validate_name(name)?);
        }
        if let Some(description) = req.description {
            am.description = Set(description);
        }
        am.updated_at = Set(Some(Utc::now()));
        let updated = am.update(self.pool.as_ref()).await?;
        Ok(updated.into())
    }

    /// 删除分类：商品与捆绑折扣上的 category_id 由外键置空
    pub async fn delete_category(&self, id: i64) -> AppResult<()> {
        let res = categories::Entity::delete_by_id(id).exec(self.pool.as_ref()).await?;
        if res.rows_affected == 0 {
            return Err(AppError::NotFound("Category not found".to_string()));
        }
        log::info!("Category {id} deleted");
        Ok(())
    }

    // -----------------------------
    // 商品
    // -----------------------------

    pub async fn list_products(
        &self,
        query: &ProductQuery,
    ) -> AppResult<PaginatedResponse<ProductResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let mut base_query = products::Entity::find();
        if let Some(category_id) = query.category_id {
            base_query = base_query.filter(products::Column::CategoryId.eq(category_id));
        }

        let total = base_query.clone().count(self.pool.as_ref()).await?;
        let models = base_query
            .order_by_desc(products::Column::CreatedAt)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(self.pool.as_ref())
            .await?;

        Ok(PaginatedResponse::new(
            models.into_iter().map(Into::into).collect(),
            &params,
            total,
        ))
    }

    pub async fn get_product(&self, id: i64) -> AppResult<ProductResponse> {
        products::Entity::find_by_id(id)
            .one(self.pool.as_ref())
            .await?
            .map(Into::into)
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))
    }

    pub async fn create_product(&self, req: CreateProductRequest) -> AppResult<ProductResponse> {
        let name = validate_name(&req.name)?;
        validate_price(req.price)?;
        if let Some(category_id) = req.category_id {
            ensure_category_exists(self.pool.as_ref(), category_id).await?;
        }

        let model = products::ActiveModel {
            name: Set(name),
            description: Set(req.description),
            price: Set(req.price),
            category_id: Set(req.category_id),
            active: Set(req.active),
            ..Default::default()
        }
        .insert(self.pool.as_ref())
        .await?;
        log::info!("Product {} created", model.id);
        Ok(model.into())
    }

    /// 修改 category_id 会立即影响按分类生效的捆绑折扣
    pub async fn update_product(
        &self,
        id: i64,
        req: UpdateProductRequest,
    ) -> AppResult<ProductResponse> {
        let mut am = products::Entity::find_by_id(id)
            .one(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?
            .into_active_model();

        if let Some(name) = &req.name {
            am.name = Set(validate_name(name)?);
        }
        if let Some(description) = req.description {
            am.description = Set(description);
        }
        if let Some(price) = req.price {
            validate_price(price)?;
            am.price = Set(price);
        }
        if let Some(category_id) = req.category_id {
            if let Some(id) = category_id {
                ensure_category_exists(self.pool.as_ref(), id).await?;
            }
            am.category_id = Set(category_id);
        }
        if let Some(active) = req.active {
            am.active = Set(active);
        }
        am.updated_at = Set(Some(Utc::now()));

        let updated = am.update(self.pool.as_ref()).await?;
        Ok(updated.into())
    }

    pub async fn delete_product(&self, id: i64) -> AppResult<()> {
        let res = products::Entity::delete_by_id(id).exec(self.pool.as_ref()).await?;
        if res.rows_affected == 0 {
            return Err(AppError::NotFound("Product not found".to_string()));
        }
        log::info!("Product {id} deleted");
        Ok(())
    }
}
