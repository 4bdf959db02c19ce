pub mod bundle;
pub mod catalog;
pub mod common;
pub mod coupon;
pub mod discount;
pub mod pagination;
pub mod promotion;

pub use bundle::*;
pub use catalog::*;
pub use common::*;
pub use coupon::*;
pub use discount::*;
pub use pagination::*;
pub use promotion::*;
