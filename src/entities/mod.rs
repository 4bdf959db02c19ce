pub mod bundle_products;
pub mod bundles;
pub mod categories;
pub mod coupon_products;
pub mod coupons;
pub mod products;

pub use bundle_products as bundle_product_entity;
pub use bundles as bundle_entity;
pub use categories as category_entity;
pub use coupon_products as coupon_product_entity;
pub use coupons as coupon_entity;
pub use products as product_entity;

pub use bundles::BundleApplyTo;
pub use coupons::DiscountType;
