use std::path::PathBuf;

use super::parsing::{
    env_optional, env_or_default, parse_backend, parse_bool, parse_cors_origins,
    parse_environment, parse_u16, parse_u32, parse_u64, parse_usize,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, PersistenceBackend,
    PersistenceSettings, RedisSettings, RuntimeSettings, ScoringSettings, SecuritySettings,
    ServerHost, ServerPort, ServerSettings, SessionSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAMHALL_HOST", "0.0.0.0");
        let port = env_or_default("EXAMHALL_PORT", "8000");

        let environment = parse_environment(
            env_optional("EXAMHALL_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("EXAMHALL_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Examhall API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let (secret_key, secret_from_env) = match env_optional("SECRET_KEY") {
            Some(value) => (value, true),
            None => (load_or_create_secret_key(), false),
        };
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "examhall");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "examhall");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_u32("DATABASE_MAX_CONNECTIONS", env_or_default("DATABASE_MAX_CONNECTIONS", "20"))?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let backend = parse_backend(env_optional("PERSISTENCE_BACKEND"))?;
        let seed_path = env_optional("MEMORY_SEED_PATH").map(PathBuf::from);

        let sweep_interval_seconds =
            parse_u64("SWEEP_INTERVAL_SECONDS", env_or_default("SWEEP_INTERVAL_SECONDS", "30"))?;
        let sweep_batch_size =
            parse_u64("SWEEP_BATCH_SIZE", env_or_default("SWEEP_BATCH_SIZE", "500"))?;
        let answer_rate_limit_per_minute = parse_u64(
            "ANSWER_RATE_LIMIT_PER_MINUTE",
            env_or_default("ANSWER_RATE_LIMIT_PER_MINUTE", "120"),
        )?;
        let max_text_answer_chars =
            parse_usize("MAX_TEXT_ANSWER_CHARS", env_or_default("MAX_TEXT_ANSWER_CHARS", "20000"))?;

        let webhook_url = env_or_default("SCORING_WEBHOOK_URL", "");
        let webhook_token = env_or_default("SCORING_WEBHOOK_TOKEN", "");
        let scoring_timeout_seconds =
            parse_u64("SCORING_TIMEOUT_SECONDS", env_or_default("SCORING_TIMEOUT_SECONDS", "30"))?;

        let log_level = env_or_default("EXAMHALL_LOG_LEVEL", "info");
        let json = env_optional("EXAMHALL_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings {
                secret_key,
                algorithm,
                secret_from_env,
            },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            persistence: PersistenceSettings { backend, seed_path },
            sessions: SessionSettings {
                sweep_interval_seconds,
                sweep_batch_size,
                answer_rate_limit_per_minute,
                max_text_answer_chars,
            },
            scoring: ScoringSettings {
                webhook_url,
                webhook_token,
                timeout_seconds: scoring_timeout_seconds,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn persistence(&self) -> &PersistenceSettings {
        &self.persistence
    }

    pub(crate) fn sessions(&self) -> &SessionSettings {
        &self.sessions
    }

    pub(crate) fn scoring(&self) -> &ScoringSettings {
        &self.scoring
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sessions.sweep_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SWEEP_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.sessions.sweep_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SWEEP_BATCH_SIZE",
                value: "0".to_string(),
            });
        }

        if self.sessions.max_text_answer_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_TEXT_ANSWER_CHARS",
                value: "0".to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATABASE_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if !self.security.secret_from_env {
            return Err(ConfigError::MissingSecret("SECRET_KEY"));
        }
        if self.persistence.backend == PersistenceBackend::Memory {
            return Err(ConfigError::InvalidValue {
                field: "PERSISTENCE_BACKEND",
                value: PersistenceBackend::Memory.as_str().to_string(),
            });
        }
        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}
