use std::{env, net::SocketAddr, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
    #[error(transparent)]
    DotEnvError(#[from] dotenvy::Error),
}

/// Where caption and image rows live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    DynamoDb,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dynamodb" => Ok(StoreBackend::DynamoDb),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// Which identity provider backs sign-in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityBackend {
    Hosted { auth_url: String, api_key: String },
    Memory { demo_user_email: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub store_backend: StoreBackend,
    pub captions_table: String,
    pub images_table: String,
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub endpoint_url: Option<String>,
    pub page_size: u32,
    pub identity_backend: IdentityBackend,
    pub oauth_provider: String,
    pub public_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors, relies on env vars otherwise)
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let bind_address_str = or_default("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = SocketAddr::from_str(&bind_address_str)
            .map_err(|e| ConfigError::InvalidVar("BIND_ADDRESS".into(), e.to_string()))?;

        let store_backend = or_default("STORE_BACKEND", "dynamodb")
            .parse::<StoreBackend>()
            .map_err(|e| ConfigError::InvalidVar("STORE_BACKEND".into(), e))?;

        let page_size = or_default("GALLERY_PAGE_SIZE", "36")
            .parse::<u32>()
            .map_err(|e| ConfigError::InvalidVar("GALLERY_PAGE_SIZE".into(), e.to_string()))?;
        if page_size == 0 {
            return Err(ConfigError::InvalidVar(
                "GALLERY_PAGE_SIZE".into(),
                "page size must be at least 1".into(),
            ));
        }

        let identity_backend = match or_default("AUTH_BACKEND", "hosted").to_ascii_lowercase().as_str() {
            "hosted" => IdentityBackend::Hosted {
                auth_url: lookup("AUTH_URL").ok_or_else(|| ConfigError::MissingVar("AUTH_URL".into()))?,
                api_key: lookup("AUTH_API_KEY").ok_or_else(|| ConfigError::MissingVar("AUTH_API_KEY".into()))?,
            },
            "memory" => IdentityBackend::Memory {
                demo_user_email: or_default("DEMO_USER_EMAIL", "demo@example.com"),
            },
            other => {
                return Err(ConfigError::InvalidVar(
                    "AUTH_BACKEND".into(),
                    format!("unknown identity backend '{}'", other),
                ));
            }
        };

        Ok(Config {
            bind_address,
            store_backend,
            captions_table: or_default("CAPTIONS_TABLE", "captions"),
            images_table: or_default("IMAGES_TABLE", "images"),
            aws_region: or_default("AWS_DEFAULT_REGION", "ca-central-1"),
            endpoint_url: lookup("AWS_ENDPOINT_URL"),
            page_size,
            identity_backend,
            oauth_provider: or_default("OAUTH_PROVIDER", "google"),
            public_origin: or_default("PUBLIC_ORIGIN", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_with_hosted_auth() {
        let config = Config::from_lookup(lookup_from(&[
            ("AUTH_URL", "https://auth.example.com/auth/v1"),
            ("AUTH_API_KEY", "anon"),
        ]))
        .unwrap();

        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.store_backend, StoreBackend::DynamoDb);
        assert_eq!(config.page_size, 36);
        assert_eq!(config.captions_table, "captions");
        assert_eq!(config.oauth_provider, "google");
        assert!(config.endpoint_url.is_none());
    }

    #[test]
    fn hosted_auth_requires_url() {
        let err = Config::from_lookup(lookup_from(&[("AUTH_API_KEY", "anon")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref v) if v == "AUTH_URL"));
    }

    #[test]
    fn memory_backends_and_trailing_slash() {
        let config = Config::from_lookup(lookup_from(&[
            ("STORE_BACKEND", "memory"),
            ("AUTH_BACKEND", "memory"),
            ("PUBLIC_ORIGIN", "https://gallery.example.com/"),
            ("GALLERY_PAGE_SIZE", "12"),
        ]))
        .unwrap();

        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(
            config.identity_backend,
            IdentityBackend::Memory { demo_user_email: "demo@example.com".into() }
        );
        assert_eq!(config.public_origin, "https://gallery.example.com");
        assert_eq!(config.page_size, 12);
    }

    #[test]
    fn zero_page_size_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("AUTH_BACKEND", "memory"),
            ("GALLERY_PAGE_SIZE", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar(ref v, _) if v == "GALLERY_PAGE_SIZE"));
    }
}
