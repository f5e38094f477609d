//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息

use config::{Config, ConfigError, Environment};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

/// 曾出现在示例配置中的密钥，不允许用于签名
const PUBLISHED_SECRETS: &[&str] = &["change-this-secret-in-production-min-32-chars!"];

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址，例如 "0.0.0.0:3000"
    pub addr: String,
    /// 优雅关闭超时时间（秒）
    pub graceful_shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库连接 URL；未配置时使用内存存储
    #[serde(default)]
    pub url: Option<Secret<String>>,
    /// 最大连接数
    pub max_connections: u32,
    /// 最小连接数
    pub min_connections: u32,
    /// 获取连接超时时间（秒）
    pub acquire_timeout_secs: u64,
    /// 空闲连接超时时间（秒）
    pub idle_timeout_secs: u64,
    /// 连接最大生命周期（秒）
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// JWT 签名密钥（HS256，至少 32 字节）
    pub jwt_secret: Secret<String>,
    /// 令牌有效期（秒），默认 50 分钟
    pub token_ttl_secs: u64,
    /// 密码最小长度
    pub password_min_length: usize,
    /// 密码必须包含大写字母
    pub password_require_uppercase: bool,
    /// 密码必须包含数字
    pub password_require_digit: bool,
    /// 密码必须包含特殊字符
    pub password_require_special: bool,
    /// 登录时是否区分"用户不存在"与"密码错误"
    pub reveal_unknown_subject: bool,
    /// 凭据存储调用超时（毫秒）
    pub store_timeout_ms: u64,
}

/// 角色名称（封闭集合，大小写敏感）
#[derive(Debug, Clone, Deserialize)]
pub struct RolesConfig {
    pub user: String,
    pub moderator: String,
    pub admin: String,
}

impl RolesConfig {
    /// 所有已知角色
    pub fn known(&self) -> [&str; 3] {
        [&self.user, &self.moderator, &self.admin]
    }

    pub fn is_known(&self, role: &str) -> bool {
        self.known().contains(&role)
    }
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            user: "USER".to_string(),
            moderator: "MODERATOR".to_string(),
            admin: "ADMIN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub roles: RolesConfig,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("server.addr", "0.0.0.0:3000")?
            .set_default("server.graceful_shutdown_timeout_secs", 30)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.idle_timeout_secs", 600)?
            .set_default("database.max_lifetime_secs", 1800)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("security.token_ttl_secs", 3000)?
            .set_default("security.password_min_length", 8)?
            .set_default("security.password_require_uppercase", false)?
            .set_default("security.password_require_digit", false)?
            .set_default("security.password_require_special", false)?
            .set_default("security.reveal_unknown_subject", false)?
            .set_default("security.store_timeout_ms", 2000)?
            .set_default("roles.user", "USER")?
            .set_default("roles.moderator", "MODERATOR")?
            .set_default("roles.admin", "ADMIN")?;

        // 从环境变量加载配置（前缀为 RBAC_）
        settings = settings.add_source(
            Environment::with_prefix("RBAC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        // 验证数据库连接池配置
        if self.database.max_connections < self.database.min_connections {
            return Err(ConfigError::Message(
                "max_connections must be >= min_connections".to_string(),
            ));
        }

        // 验证 JWT 密钥长度（至少 32 字符）
        let secret = self.security.jwt_secret.expose_secret();
        if secret.len() < 32 {
            return Err(ConfigError::Message(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }
        if PUBLISHED_SECRETS.contains(&secret.as_str()) {
            return Err(ConfigError::Message(
                "JWT secret is a published placeholder, generate a random one".to_string(),
            ));
        }

        // 验证令牌有效期
        if self.security.token_ttl_secs < 60 || self.security.token_ttl_secs > 86400 {
            return Err(ConfigError::Message(
                "token_ttl_secs must be between 60 and 86400 (1 minute to 24 hours)".to_string(),
            ));
        }

        // 验证密码策略
        if self.security.password_min_length < 6 || self.security.password_min_length > 128 {
            return Err(ConfigError::Message(
                "password_min_length must be between 6 and 128".to_string(),
            ));
        }

        if self.security.store_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "store_timeout_ms must be greater than 0".to_string(),
            ));
        }

        // 角色名称不能为空且不能重复
        let known = self.roles.known();
        if known.iter().any(|r| r.trim().is_empty()) {
            return Err(ConfigError::Message("Role names must not be empty".to_string()));
        }
        if known[0] == known[1] || known[0] == known[2] || known[1] == known[2] {
            return Err(ConfigError::Message("Role names must be distinct".to_string()));
        }

        Ok(())
    }
}
