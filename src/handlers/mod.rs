pub mod bundle;
pub mod catalog;
pub mod coupon;

pub use bundle::bundle_config;
pub use catalog::catalog_config;
pub use coupon::coupon_config;
