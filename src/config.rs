use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-lite";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_SERPAPI_BASE_URL: &str = "https://serpapi.com";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub vision: VisionConfig,
    pub search: SearchConfig,
    pub limits: LimitsConfig,
    pub connect_timeout: Duration,
    pub port: u16,
    pub metrics_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct LimitsConfig {
    pub max_images: usize,
    pub max_image_dimension: u32,
    pub request_max_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_images: 6,
            max_image_dimension: 1536,
            request_max_bytes: 20 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    /// Reads the process environment; load `.env` beforehand if wanted.
    pub fn from_env() -> Self {
        let config = Self::from_lookup(|key| std::env::var(key).ok());
        if config.vision.api_key.is_none() {
            warn!(
                target: "itemlens.api",
                "GEMINI_API_KEY is not set; identification requests will fail until it is configured"
            );
        }
        if config.search.api_key.is_none() {
            info!(
                target: "itemlens.api",
                "SERPAPI_API_KEY is not set; price enrichment disabled"
            );
        }
        config
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let text = |key: &str, default: &str| secret(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };
        let defaults = LimitsConfig::default();

        Self {
            vision: VisionConfig {
                api_key: secret("GEMINI_API_KEY"),
                model: text("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
                base_url: text("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL)
                    .trim_end_matches('/')
                    .to_string(),
                timeout: Duration::from_secs(number("VISION_TIMEOUT_SECS", 30)),
            },
            search: SearchConfig {
                api_key: secret("SERPAPI_API_KEY"),
                base_url: text("SERPAPI_BASE_URL", DEFAULT_SERPAPI_BASE_URL)
                    .trim_end_matches('/')
                    .to_string(),
                timeout: Duration::from_secs(number("SEARCH_TIMEOUT_SECS", 10)),
            },
            limits: LimitsConfig {
                max_images: number("MAX_IMAGES", defaults.max_images as u64) as usize,
                max_image_dimension: number(
                    "MAX_IMAGE_DIMENSION",
                    defaults.max_image_dimension as u64,
                )
                .min(u32::MAX as u64) as u32,
                request_max_bytes: number(
                    "REQUEST_MAX_BYTES",
                    defaults.request_max_bytes as u64,
                ) as usize,
            },
            connect_timeout: Duration::from_secs(number("HTTP_CONNECT_TIMEOUT_SECS", 5)),
            port: lookup("PORT")
                .and_then(|v| v.trim().parse::<u16>().ok())
                .unwrap_or(8000),
            metrics_key: secret("METRICS_KEY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = config_from(&[]);
        assert!(config.vision.api_key.is_none());
        assert!(config.search.api_key.is_none());
        assert_eq!(config.vision.model, "gemini-2.5-flash-lite");
        assert_eq!(config.vision.timeout, Duration::from_secs(30));
        assert_eq!(config.search.timeout, Duration::from_secs(10));
        assert_eq!(config.limits.max_images, 6);
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn blank_credentials_count_as_absent() {
        let config = config_from(&[("GEMINI_API_KEY", "   "), ("SERPAPI_API_KEY", "")]);
        assert!(config.vision.api_key.is_none());
        assert!(config.search.api_key.is_none());
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("SEARCH_TIMEOUT_SECS", "soon"),
            ("VISION_TIMEOUT_SECS", "0"),
            ("MAX_IMAGES", "3"),
        ]);
        assert_eq!(config.search.timeout, Duration::from_secs(10));
        assert_eq!(config.vision.timeout, Duration::from_secs(30));
        assert_eq!(config.limits.max_images, 3);
    }

    #[test]
    fn base_urls_lose_trailing_slash() {
        let config = config_from(&[
            ("GEMINI_API_KEY", "g-key"),
            ("SERPAPI_BASE_URL", "http://localhost:9000/"),
        ]);
        assert_eq!(config.vision.api_key.as_deref(), Some("g-key"));
        assert_eq!(config.search.base_url, "http://localhost:9000");
    }
}
