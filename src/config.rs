/// Configuration management for the worksheet market
use crate::error::{MarketError, MarketResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub points: PointsPolicy,
    pub assistant: AssistantConfig,
    pub email: Option<EmailConfig>,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub public_url: String,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
    pub files_directory: PathBuf,
    pub max_listing_file_size: usize,
    pub max_preview_size: usize,
    /// Lifetime of signed download URLs, in seconds
    pub signed_url_ttl: i64,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Access token lifetime in seconds
    pub access_token_ttl: i64,
    /// Refresh token lifetime in days
    pub refresh_token_ttl_days: i64,
}

/// Point amounts and reward rules used by the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsPolicy {
    pub signup_bonus: i64,
    pub feedback_refund: i64,
    pub min_price: i64,
    pub max_price: i64,
    pub attendance_base: i64,
    /// (streak length, bonus) pairs
    pub attendance_milestones: Vec<(i64, i64)>,
    pub roulette_prizes: Vec<i64>,
    /// Offset from UTC (hours) that defines the calendar day
    pub timezone_offset_hours: i32,
}

impl Default for PointsPolicy {
    fn default() -> Self {
        Self {
            signup_bonus: 1000,
            feedback_refund: 30,
            min_price: 100,
            max_price: 500,
            attendance_base: 10,
            attendance_milestones: vec![(7, 50), (14, 100), (30, 300)],
            roulette_prizes: vec![5, 10, 15, 20, 30, 50],
            timezone_offset_hours: 9,
        }
    }
}

/// AI quiz assistant configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub anonymous_rps: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse "7:50,14:100" into milestone pairs
fn parse_milestones(raw: &str) -> MarketResult<Vec<(i64, i64)>> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (streak, bonus) = pair
                .split_once(':')
                .ok_or_else(|| MarketError::Validation(format!("Invalid milestone: {}", pair)))?;
            let streak = streak
                .trim()
                .parse()
                .map_err(|_| MarketError::Validation(format!("Invalid milestone: {}", pair)))?;
            let bonus = bonus
                .trim()
                .parse()
                .map_err(|_| MarketError::Validation(format!("Invalid milestone: {}", pair)))?;
            Ok((streak, bonus))
        })
        .collect()
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> MarketResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("MARKET_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("MARKET_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| MarketError::Validation("Invalid port number".to_string()))?;
        let public_url = env::var("MARKET_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port));
        let version = env::var("MARKET_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let data_directory: PathBuf = env::var("MARKET_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("MARKET_DATABASE_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("market.sqlite"));
        let files_directory = env::var("MARKET_FILES_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("files"));

        let jwt_secret = env::var("MARKET_JWT_SECRET")
            .map_err(|_| MarketError::Validation("JWT secret required".to_string()))?;

        let defaults = PointsPolicy::default();
        let attendance_milestones = match env::var("MARKET_ATTENDANCE_MILESTONES") {
            Ok(raw) => parse_milestones(&raw)?,
            Err(_) => defaults.attendance_milestones.clone(),
        };
        let roulette_prizes = match env::var("MARKET_ROULETTE_PRIZES") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().parse::<i64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| MarketError::Validation("Invalid roulette prize list".to_string()))?,
            Err(_) => defaults.roulette_prizes.clone(),
        };

        let email = if let Ok(smtp_url) = env::var("MARKET_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("MARKET_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let log_json = env::var("MARKET_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
                files_directory,
                max_listing_file_size: env_or("MARKET_MAX_LISTING_FILE_SIZE", 50 * 1024 * 1024),
                max_preview_size: env_or("MARKET_MAX_PREVIEW_SIZE", 5 * 1024 * 1024),
                signed_url_ttl: env_or("MARKET_SIGNED_URL_TTL", 300),
            },
            authentication: AuthConfig {
                jwt_secret,
                access_token_ttl: env_or("MARKET_ACCESS_TOKEN_TTL", 3600),
                refresh_token_ttl_days: env_or("MARKET_REFRESH_TOKEN_TTL_DAYS", 30),
            },
            points: PointsPolicy {
                signup_bonus: env_or("MARKET_SIGNUP_BONUS", defaults.signup_bonus),
                feedback_refund: env_or("MARKET_FEEDBACK_REFUND", defaults.feedback_refund),
                min_price: env_or("MARKET_MIN_PRICE", defaults.min_price),
                max_price: env_or("MARKET_MAX_PRICE", defaults.max_price),
                attendance_base: env_or("MARKET_ATTENDANCE_BASE", defaults.attendance_base),
                attendance_milestones,
                roulette_prizes,
                timezone_offset_hours: env_or(
                    "MARKET_TIMEZONE_OFFSET_HOURS",
                    defaults.timezone_offset_hours,
                ),
            },
            assistant: AssistantConfig {
                endpoint: env::var("MARKET_ASSISTANT_ENDPOINT").ok(),
                api_key: env::var("MARKET_ASSISTANT_API_KEY").ok(),
                timeout_secs: env_or("MARKET_ASSISTANT_TIMEOUT_SECS", 60),
            },
            email,
            rate_limit: RateLimitConfig {
                enabled: env_or("MARKET_RATE_LIMITS_ENABLED", true),
                authenticated_rps: env_or("MARKET_RATE_LIMIT_AUTHENTICATED_RPS", 50),
                anonymous_rps: env_or("MARKET_RATE_LIMIT_ANONYMOUS_RPS", 10),
            },
            logging: LoggingConfig {
                level: log_level,
                json: log_json,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> MarketResult<()> {
        if self.service.hostname.is_empty() {
            return Err(MarketError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(MarketError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.points.roulette_prizes.is_empty() {
            return Err(MarketError::Validation(
                "Roulette prize table cannot be empty".to_string(),
            ));
        }

        if self.points.min_price > self.points.max_price {
            return Err(MarketError::Validation(
                "Minimum price cannot exceed maximum price".to_string(),
            ));
        }

        if self.points.timezone_offset_hours.abs() > 14 {
            return Err(MarketError::Validation("Invalid timezone offset".to_string()));
        }

        Ok(())
    }

    /// Configuration for tests and local tooling
    pub fn for_tests(data_directory: PathBuf) -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8080,
                public_url: "http://localhost:8080".to_string(),
                version: "0.1.0".to_string(),
            },
            storage: StorageConfig {
                database: data_directory.join("market.sqlite"),
                files_directory: data_directory.join("files"),
                data_directory,
                max_listing_file_size: 50 * 1024 * 1024,
                max_preview_size: 5 * 1024 * 1024,
                signed_url_ttl: 300,
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-key-for-testing-only-0123456789".to_string(),
                access_token_ttl: 3600,
                refresh_token_ttl_days: 30,
            },
            points: PointsPolicy::default(),
            assistant: AssistantConfig {
                endpoint: None,
                api_key: None,
                timeout_secs: 5,
            },
            email: None,
            rate_limit: RateLimitConfig {
                enabled: false,
                authenticated_rps: 50,
                anonymous_rps: 10,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }
}
