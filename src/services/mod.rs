pub mod bundle_service;
pub mod catalog_service;
pub mod coupon_service;
pub mod discount_resolver;

pub use bundle_service::BundleService;
pub use catalog_service::CatalogService;
pub use coupon_service::CouponService;
pub use discount_resolver::DiscountResolver;
