//! 认证与授权模块
//! 令牌签发/校验、密码哈希、请求身份解析与路由访问策略

pub mod clock;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod policy;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::AuthError;
pub use jwt::{Claims, TokenCodec, VerifiedToken};
pub use middleware::{extract_token, AuthContext, Principal, RequestAuthenticator};
pub use password::{PasswordHasher, PasswordVerifier};
pub use policy::{AccessDecision, AccessPolicy, Requirement};
