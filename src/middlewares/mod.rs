pub mod auth;
pub mod cors;

pub use auth::{AuthMiddleware, current_user, require_admin};
pub use cors::create_cors;
