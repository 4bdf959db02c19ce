use crate::middlewares::require_admin;
use crate::models::*;
use crate::services::CatalogService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    get,
    path = "/catalog/categories",
    tag = "catalog",
    responses(
        (status = 200, description = "获取分类列表成功")
    )
)]
pub async fn list_categories(catalog_service: web::Data<CatalogService>) -> Result<HttpResponse> {
    match catalog_service.list_categories().await {
        Ok(list) => Ok(HttpResponse::Ok().json(ApiResponse::success(list))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/catalog/categories/{id}",
    tag = "catalog",
    params(("id" = i64, Path, description = "分类ID")),
    responses(
        (status = 200, description = "获取分类成功", body = CategoryResponse),
        (status = 404, description = "分类不存在")
    )
)]
pub async fn get_category(
    catalog_service: web::Data<CatalogService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match catalog_service.get_category(path.into_inner()).await {
        Ok(category) => Ok(HttpResponse::Ok().json(ApiResponse::success(category))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/catalog/categories",
    tag = "catalog",
    request_body = CreateCategoryRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 201, description = "创建分类成功", body = CategoryResponse),
        (status = 403, description = "需要管理员权限")
    )
)]
pub async fn create_category(
    catalog_service: web::Data<CatalogService>,
    req: HttpRequest,
    request: web::Json<CreateCategoryRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match catalog_service.create_category(request.into_inner()).await {
        Ok(category) => Ok(HttpResponse::Created().json(ApiResponse::success(category))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/catalog/categories/{id}",
    tag = "catalog",
    params(("id" = i64, Path, description = "分类ID")),
    request_body = UpdateCategoryRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "更新分类成功", body = CategoryResponse),
        (status = 404, description = "分类不存在")
    )
)]
pub async fn update_category(
    catalog_service: web::Data<CatalogService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateCategoryRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match catalog_service
        .update_category(path.into_inner(), request.into_inner())
        .await
    {
        Ok(category) => Ok(HttpResponse::Ok().json(ApiResponse::success(category))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/catalog/categories/{id}",
    tag = "catalog",
    params(("id" = i64, Path, description = "分类ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 204, description = "删除分类成功"),
        (status = 404, description = "分类不存在")
    )
)]
pub async fn delete_category(
    catalog_service: web::Data<CatalogService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match catalog_service.delete_category(path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/catalog/products",
    tag = "catalog",
    params(
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量"),
        ("category_id" = Option<i64>, Query, description = "按分类过滤")
    ),
    responses(
        (status = 200, description = "获取商品列表成功")
    )
)]
pub async fn list_products(
    catalog_service: web::Data<CatalogService>,
    query: web::Query<ProductQuery>,
) -> Result<HttpResponse> {
    match catalog_service.list_products(&query).await {
        Ok(page) => Ok(HttpResponse::Ok().json(ApiResponse::success(page))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/catalog/products/{id}",
    tag = "catalog",
    params(("id" = i64, Path, description = "商品ID")),
    responses(
        (status = 200, description = "获取商品成功", body = ProductResponse),
        (status = 404, description = "商品不存在")
    )
)]
pub async fn get_product(
    catalog_service: web::Data<CatalogService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match catalog_service.get_product(path.into_inner()).await {
        Ok(product) => Ok(HttpResponse::Ok().json(ApiResponse::success(product))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/catalog/products",
    tag = "catalog",
    request_body = CreateProductRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 201, description = "创建商品成功", body = ProductResponse),
        (status = 400, description = "请求参数错误"),
        (status = 403, description = "需要管理员权限")
    )
)]
pub async fn create_product(
    catalog_service: web::Data<CatalogService>,
    req: HttpRequest,
    request: web::Json<CreateProductRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match catalog_service.create_product(request.into_inner()).await {
        Ok(product) => Ok(HttpResponse::Created().json(ApiResponse::success(product))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/catalog/products/{id}",
    tag = "catalog",
    params(("id" = i64, Path, description = "商品ID")),
    request_body = UpdateProductRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "更新商品成功", body = ProductResponse),
        (status = 400, description = "请求参数错误"),
        (status = 404, description = "商品不存在")
    )
)]
pub async fn update_product(
    catalog_service: web::Data<CatalogService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateProductRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match catalog_service
        .update_product(path.into_inner(), request.into_inner())
        .await
    {
        Ok(product) => Ok(HttpResponse::Ok().json(ApiResponse::success(product))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/catalog/products/{id}",
    tag = "catalog",
    params(("id" = i64, Path, description = "商品ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 204, description = "删除商品成功"),
        (status = 404, description = "商品不存在")
    )
)]
pub async fn delete_product(
    catalog_service: web::Data<CatalogService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match catalog_service.delete_product(path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn catalog_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/catalog")
            .route("/categories", web::get().to(list_categories))
            .route("/categories", web::post().to(create_category))
            .route("/categories/{id}", web::get().to(get_category))
            .route("/categories/{id}", web::put().to(update_category))
            .route("/categories/{id}", web::delete().to(delete_category))
            .route("/products", web::get().to(list_products))
            .route("/products", web::post().to(create_product))
            .route("/products/{id}", web::get().to(get_product))
            .route("/products/{id}", web::put().to(update_product))
            .route("/products/{id}", web::delete().to(delete_product)),
    );
}
