use crate::middlewares::require_admin;
use crate::models::*;
use crate::services::{BundleService, DiscountResolver};
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    get,
    path = "/bundles",
    tag = "bundle",
    params(
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量"),
        ("include_inactive" = Option<bool>, Query, description = "包含停用与过期记录（仅管理员）")
    ),
    responses(
        (status = 200, description = "获取捆绑折扣列表成功"),
        (status = 403, description = "include_inactive 需要管理员权限")
    )
)]
pub async fn list_bundles(
    bundle_service: web::Data<BundleService>,
    req: HttpRequest,
    query: web::Query<BundleQuery>,
) -> Result<HttpResponse> {
    let result = if query.include_inactive.unwrap_or(false) {
        if let Err(e) = require_admin(&req) {
            return Ok(e.error_response());
        }
        bundle_service.list_all(&query).await
    } else {
        bundle_service.list_active(&query).await
    };

    match result {
        Ok(page) => Ok(HttpResponse::Ok().json(ApiResponse::success(page))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/bundles/{id}",
    tag = "bundle",
    params(("id" = i64, Path, description = "捆绑折扣ID")),
    responses(
        (status = 200, description = "获取捆绑折扣成功", body = BundleResponse),
        (status = 404, description = "捆绑折扣不存在")
    )
)]
pub async fn get_bundle(
    bundle_service: web::Data<BundleService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match bundle_service.get_bundle(path.into_inner()).await {
        Ok(bundle) => Ok(HttpResponse::Ok().json(ApiResponse::success(bundle))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/bundles/product/{product_id}",
    tag = "bundle",
    params(("product_id" = i64, Path, description = "商品ID")),
    responses(
        (status = 200, description = "获取商品可用的捆绑折扣成功"),
        (status = 404, description = "商品不存在")
    )
)]
pub async fn get_bundles_for_product(
    bundle_service: web::Data<BundleService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match bundle_service.list_for_product(path.into_inner()).await {
        Ok(list) => Ok(HttpResponse::Ok().json(ApiResponse::success(list))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/bundles",
    tag = "bundle",
    request_body = CreateBundleRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 201, description = "创建捆绑折扣成功", body = BundleResponse),
        (status = 400, description = "请求参数错误"),
        (status = 403, description = "需要管理员权限")
    )
)]
pub async fn create_bundle(
    bundle_service: web::Data<BundleService>,
    req: HttpRequest,
    request: web::Json<CreateBundleRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match bundle_service.create_bundle(request.into_inner()).await {
        Ok(bundle) => Ok(HttpResponse::Created().json(ApiResponse::success(bundle))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/bundles/{id}",
    tag = "bundle",
    params(("id" = i64, Path, description = "捆绑折扣ID")),
    request_body = UpdateBundleRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "更新捆绑折扣成功", body = BundleResponse),
        (status = 400, description = "请求参数错误"),
        (status = 404, description = "捆绑折扣不存在")
    )
)]
pub async fn update_bundle(
    bundle_service: web::Data<BundleService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateBundleRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match bundle_service
        .update_bundle(path.into_inner(), request.into_inner())
        .await
    {
        Ok(bundle) => Ok(HttpResponse::Ok().json(ApiResponse::success(bundle))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/bundles/{id}",
    tag = "bundle",
    params(("id" = i64, Path, description = "捆绑折扣ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 204, description = "删除捆绑折扣成功"),
        (status = 404, description = "捆绑折扣不存在")
    )
)]
pub async fn delete_bundle(
    bundle_service: web::Data<BundleService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match bundle_service.delete_bundle(path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/bundles/calculate-discount",
    tag = "bundle",
    request_body = CalculateBundleDiscountRequest,
    responses(
        (status = 200, description = "计算折扣成功", body = DiscountCalculationResponse),
        (status = 400, description = "捆绑折扣不适用于该商品"),
        (status = 404, description = "捆绑折扣不存在")
    )
)]
pub async fn calculate_bundle_discount(
    resolver: web::Data<DiscountResolver>,
    request: web::Json<CalculateBundleDiscountRequest>,
) -> Result<HttpResponse> {
    let request = request.into_inner();
    let identifier = PromotionRef::BundleId(request.bundle_id);

    match resolver
        .calculate_discount(&identifier, Some(request.product_id), request.amount)
        .await
    {
        Ok((promotion, breakdown)) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            DiscountCalculationResponse::new(&promotion, request.amount, breakdown),
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn bundle_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/bundles")
            .route("", web::get().to(list_bundles))
            .route("", web::post().to(create_bundle))
            .route("/calculate-discount", web::post().to(calculate_bundle_discount))
            .route("/product/{product_id}", web::get().to(get_bundles_for_product))
            .route("/{id}", web::get().to(get_bundle))
            .route("/{id}", web::put().to(update_bundle))
            .route("/{id}", web::delete().to(delete_bundle)),
    );
}
