use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{BundleApplyTo, DiscountType};
use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::coupon::list_coupons,
        handlers::coupon::create_coupon,
        handlers::coupon::get_coupon,
        handlers::coupon::update_coupon,
        handlers::coupon::delete_coupon,
        handlers::coupon::validate_coupon,
        handlers::coupon::calculate_coupon_discount,
        handlers::coupon::use_coupon,
        handlers::bundle::list_bundles,
        handlers::bundle::get_bundle,
        handlers::bundle::get_bundles_for_product,
        handlers::bundle::create_bundle,
        handlers::bundle::update_bundle,
        handlers::bundle::delete_bundle,
        handlers::bundle::calculate_bundle_discount,
        handlers::catalog::list_categories,
        handlers::catalog::get_category,
        handlers::catalog::create_category,
        handlers::catalog::update_category,
        handlers::catalog::delete_category,
        handlers::catalog::list_products,
        handlers::catalog::get_product,
        handlers::catalog::create_product,
        handlers::catalog::update_product,
        handlers::catalog::delete_product,
    ),
    components(
        schemas(
            DiscountType,
            BundleApplyTo,
            CreateCouponRequest,
            UpdateCouponRequest,
            CouponQuery,
            CouponResponse,
            CalculateCouponDiscountRequest,
            CreateBundleRequest,
            UpdateBundleRequest,
            BundleQuery,
            BundleResponse,
            CalculateBundleDiscountRequest,
            PromotionType,
            DiscountCalculationResponse,
            ValidatedPromotionResponse,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryResponse,
            CreateProductRequest,
            UpdateProductRequest,
            ProductQuery,
            ProductResponse,
            ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "coupon", description = "Coupon administration and redemption API"),
        (name = "bundle", description = "Bundle discount API"),
        (name = "catalog", description = "Product and category API"),
    ),
    info(
        title = "Storefront Promotions API",
        version = "1.0.0",
        description = "Coupon and bundle discount REST API documentation"
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_promotion_routes() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/coupons/calculate-discount"));
        assert!(paths.contains_key("/coupons/{id}/use"));
        assert!(paths.contains_key("/bundles/product/{product_id}"));
        assert!(paths.contains_key("/catalog/products/{id}"));
    }
}
