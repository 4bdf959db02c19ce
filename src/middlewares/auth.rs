use crate::error::{AppError, AppResult};
use crate::utils::{CurrentUser, JwtService};
use actix_web::http::Method;
use actix_web::{
    Error, HttpMessage, HttpRequest,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use futures_util::future::LocalBoxFuture;
use std::future::{Ready, ready};

// 公开路径配置
struct PublicPaths {
    exact_paths: Vec<&'static str>,
    prefix_paths: Vec<&'static str>,
    // 仅对指定方法公开的路径（前缀匹配）
    method_prefix_paths: Vec<(Method, &'static str)>,
}

impl PublicPaths {
    fn new() -> Self {
        Self {
            // 完全匹配的公开路径
            exact_paths: vec![
                "/swagger-ui",
                "/swagger-ui/",
                "/api-docs/openapi.json",
                "/api/v1/coupons/calculate-discount",
                "/api/v1/bundles/calculate-discount",
            ],
            // 前缀匹配的公开路径
            prefix_paths: vec!["/swagger-ui/", "/api-docs/", "/api/v1/coupons/validate/"],
            // 店铺前台只读接口
            method_prefix_paths: vec![
                (Method::GET, "/api/v1/bundles"),
                (Method::GET, "/api/v1/catalog/"),
            ],
        }
    }

    fn is_public_path(&self, method: &Method, path: &str) -> bool {
        // 检查完全匹配
        if self.exact_paths.contains(&path) {
            return true;
        }

        // 检查前缀匹配
        if self
            .prefix_paths
            .iter()
            .any(|&prefix| path.starts_with(prefix))
        {
            return true;
        }

        self.method_prefix_paths
            .iter()
            .any(|(m, prefix)| m == method && path.starts_with(prefix))
    }
}

pub struct AuthMiddleware {
    jwt_service: JwtService,
}

impl AuthMiddleware {
    pub fn new(jwt_service: JwtService) -> Self {
        Self { jwt_service }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service,
            jwt_service: self.jwt_service.clone(),
            public_paths: PublicPaths::new(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
    jwt_service: JwtService,
    public_paths: PublicPaths,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // 放行所有 CORS 预检请求
        if req.method() == Method::OPTIONS {
            let fut = self.service.call(req);
            return Box::pin(fut);
        }

        // 提取Authorization header
        let token = req
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(str::to_string);

        // 公开路径：带有效 token 时同样识别用户，无效 token 直接忽略
        if self.public_paths.is_public_path(req.method(), req.path()) {
            if let Some(user) = token
                .as_deref()
                .and_then(|t| self.jwt_service.verify_access_token(t).ok())
            {
                req.extensions_mut().insert(user);
            }
            let fut = self.service.call(req);
            return Box::pin(fut);
        }

        let Some(token) = token else {
            let error = AppError::AuthError("Missing access token".to_string());
            return Box::pin(async move { Err(error.into()) });
        };

        match self.jwt_service.verify_access_token(&token) {
            Ok(user) => {
                // 将当前用户写入请求扩展
                req.extensions_mut().insert(user);
                let fut = self.service.call(req);
                Box::pin(fut)
            }
            Err(_) => {
                let error = AppError::AuthError("Invalid access token".to_string());
                Box::pin(async move { Err(error.into()) })
            }
        }
    }
}

/// 获取当前登录用户（公开路径上为 None）
pub fn current_user(req: &HttpRequest) -> Option<CurrentUser> {
    req.extensions().get::<CurrentUser>().copied()
}

/// 管理员接口的权限校验
pub fn require_admin(req: &HttpRequest) -> AppResult<CurrentUser> {
    match current_user(req) {
        Some(user) if user.is_admin() => Ok(user),
        Some(_) => Err(AppError::Forbidden),
        None => Err(AppError::AuthError("Missing access token".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Role;
    use crate::utils::jwt::issue_access_token;
    use actix_web::{App, HttpResponse, http::StatusCode, test as actix_test, web};

    #[test]
    fn test_public_paths() {
        let paths = PublicPaths::new();
        assert!(paths.is_public_path(&Method::POST, "/api/v1/coupons/validate/SAVE10"));
        assert!(paths.is_public_path(&Method::POST, "/api/v1/coupons/calculate-discount"));
        assert!(paths.is_public_path(&Method::GET, "/api/v1/bundles/product/3"));
        assert!(paths.is_public_path(&Method::GET, "/api/v1/catalog/products"));
        assert!(!paths.is_public_path(&Method::POST, "/api/v1/bundles"));
        assert!(!paths.is_public_path(&Method::GET, "/api/v1/coupons"));
        assert!(!paths.is_public_path(&Method::POST, "/api/v1/coupons/1/use"));
        assert!(!paths.is_public_path(&Method::DELETE, "/api/v1/catalog/products/1"));
    }

    async fn admin_only(req: HttpRequest) -> actix_web::Result<HttpResponse> {
        require_admin(&req)?;
        Ok(HttpResponse::Ok().finish())
    }

    #[actix_web::test]
    async fn test_admin_route_requires_admin_role() {
        let jwt = JwtService::new("test-secret");
        let app = actix_test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(jwt.clone()))
                .route("/api/v1/coupons", web::post().to(admin_only)),
        )
        .await;

        let customer = issue_access_token("test-secret", 7, Role::Customer, 60);
        let req = actix_test::TestRequest::post()
            .uri("/api/v1/coupons")
            .insert_header(("Authorization", format!("Bearer {customer}")))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let admin = issue_access_token("test-secret", 1, Role::Admin, 60);
        let req = actix_test::TestRequest::post()
            .uri("/api/v1/coupons")
            .insert_header(("Authorization", format!("Bearer {admin}")))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_missing_token_is_rejected() {
        let jwt = JwtService::new("test-secret");
        let app = actix_test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(jwt))
                .route("/api/v1/coupons", web::post().to(admin_only)),
        )
        .await;

        let req = actix_test::TestRequest::post().uri("/api/v1/coupons").to_request();
        let err = actix_test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(
            err.as_response_error().status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn test_public_path_still_identifies_admin() {
        let jwt = JwtService::new("test-secret");
        let app = actix_test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(jwt.clone()))
                .route("/api/v1/bundles", web::get().to(admin_only)),
        )
        .await;

        let admin = issue_access_token("test-secret", 1, Role::Admin, 60);
        let req = actix_test::TestRequest::get()
            .uri("/api/v1/bundles")
            .insert_header(("Authorization", format!("Bearer {admin}")))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // 公开路径上无效 token 不会被拒绝，只是没有用户身份
        let req = actix_test::TestRequest::get()
            .uri("/api/v1/bundles")
            .insert_header(("Authorization", "Bearer garbage"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
