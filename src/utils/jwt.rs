use crate::error::{AppError, AppResult};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Customer,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
    pub token_type: String, // "access"
}

/// 鉴权通过后写入请求扩展的当前用户
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: i64,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// 只负责校验访问令牌，签发由外部会话服务完成
#[derive(Clone)]
pub struct JwtService {
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn verify_token(&self, token: &str) -> AppResult<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(AppError::JwtError)
    }

    pub fn verify_access_token(&self, token: &str) -> AppResult<CurrentUser> {
        let claims = self.verify_token(token)?;

        if claims.token_type != "access" {
            return Err(AppError::AuthError("Invalid access token type".to_string()));
        }

        let user_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))?;

        Ok(CurrentUser {
            user_id,
            role: claims.role,
        })
    }
}

/// 测试中签发访问令牌
#[cfg(test)]
pub(crate) fn issue_access_token(secret: &str, user_id: i64, role: Role, expires_in: i64) -> String {
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header, encode};

    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: (now + Duration::seconds(expires_in)).timestamp(),
        iat: now.timestamp(),
        token_type: "access".to_string(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_roundtrip_keeps_role() {
        let jwt = JwtService::new("test-secret");
        let token = issue_access_token("test-secret", 42, Role::Admin, 60);
        let user = jwt.verify_access_token(&token).unwrap();
        assert_eq!(user.user_id, 42);
        assert!(user.is_admin());
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let verifier = JwtService::new("secret-b");
        let token = issue_access_token("secret-a", 1, Role::Customer, 60);
        assert!(verifier.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        // 过期超过 jsonwebtoken 默认 60 秒的容差
        let jwt = JwtService::new("test-secret");
        let token = issue_access_token("test-secret", 1, Role::Customer, -120);
        assert!(jwt.verify_access_token(&token).is_err());
    }
}
