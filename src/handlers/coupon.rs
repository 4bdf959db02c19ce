use crate::middlewares::{current_user, require_admin};
use crate::models::*;
use crate::services::{CouponService, DiscountResolver};
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    get,
    path = "/coupons",
    tag = "coupon",
    params(
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量"),
        ("active" = Option<bool>, Query, description = "按启用状态过滤")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取优惠券列表成功"),
        (status = 401, description = "未授权"),
        (status = 403, description = "需要管理员权限")
    )
)]
pub async fn list_coupons(
    coupon_service: web::Data<CouponService>,
    req: HttpRequest,
    query: web::Query<CouponQuery>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match coupon_service.list_coupons(&query).await {
        Ok(page) => Ok(HttpResponse::Ok().json(ApiResponse::success(page))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/coupons",
    tag = "coupon",
    request_body = CreateCouponRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 201, description = "创建优惠券成功", body = CouponResponse),
        (status = 400, description = "请求参数错误"),
        (status = 403, description = "需要管理员权限")
    )
)]
pub async fn create_coupon(
    coupon_service: web::Data<CouponService>,
    req: HttpRequest,
    request: web::Json<CreateCouponRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match coupon_service.create_coupon(request.into_inner()).await {
        Ok(coupon) => Ok(HttpResponse::Created().json(ApiResponse::success(coupon))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/coupons/{id}",
    tag = "coupon",
    params(("id" = i64, Path, description = "优惠券ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取优惠券成功", body = CouponResponse),
        (status = 404, description = "优惠券不存在")
    )
)]
pub async fn get_coupon(
    coupon_service: web::Data<CouponService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match coupon_service.get_coupon(path.into_inner()).await {
        Ok(coupon) => Ok(HttpResponse::Ok().json(ApiResponse::success(coupon))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/coupons/{id}",
    tag = "coupon",
    params(("id" = i64, Path, description = "优惠券ID")),
    request_body = UpdateCouponRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "更新优惠券成功", body = CouponResponse),
        (status = 400, description = "请求参数错误"),
        (status = 404, description = "优惠券不存在")
    )
)]
pub async fn update_coupon(
    coupon_service: web::Data<CouponService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateCouponRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match coupon_service
        .update_coupon(path.into_inner(), request.into_inner())
        .await
    {
        Ok(coupon) => Ok(HttpResponse::Ok().json(ApiResponse::success(coupon))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/coupons/{id}",
    tag = "coupon",
    params(("id" = i64, Path, description = "优惠券ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 204, description = "删除优惠券成功"),
        (status = 404, description = "优惠券不存在")
    )
)]
pub async fn delete_coupon(
    coupon_service: web::Data<CouponService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match coupon_service.delete_coupon(path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/coupons/validate/{code}",
    tag = "coupon",
    params(("code" = String, Path, description = "优惠码（大小写不敏感）")),
    responses(
        (status = 200, description = "优惠码有效", body = ValidatedPromotionResponse),
        (status = 400, description = "优惠码无效、已停用、已过期或次数已用完")
    )
)]
pub async fn validate_coupon(
    resolver: web::Data<DiscountResolver>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let identifier = PromotionRef::CouponCode(path.into_inner());

    match resolver.validate(&identifier).await {
        Ok(promotion) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            ValidatedPromotionResponse::from(promotion),
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/coupons/calculate-discount",
    tag = "coupon",
    request_body = CalculateCouponDiscountRequest,
    responses(
        (status = 200, description = "计算折扣成功", body = DiscountCalculationResponse),
        (status = 400, description = "优惠码不可用于该商品或整单")
    )
)]
pub async fn calculate_coupon_discount(
    resolver: web::Data<DiscountResolver>,
    request: web::Json<CalculateCouponDiscountRequest>,
) -> Result<HttpResponse> {
    let request = request.into_inner();
    let identifier = PromotionRef::CouponCode(request.coupon_code);

    match resolver
        .calculate_discount(&identifier, request.product_id, request.amount)
        .await
    {
        Ok((promotion, breakdown)) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            DiscountCalculationResponse::new(&promotion, request.amount, breakdown),
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/coupons/{id}/use",
    tag = "coupon",
    params(("id" = i64, Path, description = "优惠券ID")),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "核销成功", body = CouponResponse),
        (status = 400, description = "使用次数已达上限"),
        (status = 401, description = "未授权"),
        (status = 404, description = "优惠券不存在")
    )
)]
pub async fn use_coupon(
    resolver: web::Data<DiscountResolver>,
    coupon_service: web::Data<CouponService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let coupon_id = path.into_inner();
    if let Some(user) = current_user(&req) {
        log::info!("User {} redeeming coupon {coupon_id}", user.user_id);
    }

    let redeemed = match resolver.record_redemption(coupon_id).await {
        Ok(model) => model,
        Err(e) => return Ok(e.error_response()),
    };
    match coupon_service.to_response(redeemed).await {
        Ok(coupon) => Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            coupon,
            "Coupon redeemed".to_string(),
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn coupon_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/coupons")
            .route("", web::get().to(list_coupons))
            .route("", web::post().to(create_coupon))
            .route("/calculate-discount", web::post().to(calculate_coupon_discount))
            .route("/validate/{code}", web::post().to(validate_coupon))
            .route("/{id}", web::get().to(get_coupon))
            .route("/{id}", web::put().to(update_coupon))
            .route("/{id}", web::delete().to(delete_coupon))
            .route("/{id}/use", web::post().to(use_coupon)),
    );
}
