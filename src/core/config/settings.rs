use super::parsing::{
    env_optional, env_or_default, is_supported_image_extension, parse_bool, parse_cors_origins,
    parse_delays, parse_environment, parse_f64, parse_string_list, parse_u16, parse_u32, parse_u64,
    parse_usize,
};
use super::types::{
    AiSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings, OcrSettings,
    PipelineSettings, RedisSettings, RuntimeSettings, S3Settings, ServerHost, ServerPort,
    ServerSettings, Settings, StorageSettings, TelemetrySettings,
};

const KNOWLEDGE_CACHE_TTL_SECONDS: &str = "604800";

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("PIPELINE_HOST", "0.0.0.0");
        let port = env_or_default("PIPELINE_PORT", "8000");

        let environment =
            parse_environment(env_optional("PIPELINE_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("PIPELINE_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Exam Assessment API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "exam_pipeline");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "exam_pipeline");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let openai_api_key = env_or_default("OPENAI_API_KEY", "");
        let openai_base_url = env_or_default("OPENAI_BASE_URL", "");
        let ai_model = env_or_default("AI_MODEL", "gpt-4o");
        let ai_max_tokens = parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "4000"))?;
        let ai_temperature = parse_f64("AI_TEMPERATURE", env_or_default("AI_TEMPERATURE", "0.2"))?;
        let ai_request_timeout =
            parse_u64("AI_REQUEST_TIMEOUT", env_or_default("AI_REQUEST_TIMEOUT", "60"))?;

        let ocr_api_key = env_or_default("OCR_API_KEY", "");
        let ocr_base_url = env_or_default("OCR_BASE_URL", "");
        let ocr_timeout_seconds =
            parse_u64("OCR_TIMEOUT_SECONDS", env_or_default("OCR_TIMEOUT_SECONDS", "60"))?;

        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "10"))?;
        let allowed_image_extensions =
            parse_string_list(env_optional("ALLOWED_IMAGE_EXTENSIONS"), &["jpg", "jpeg", "png"]);

        let s3_endpoint = env_or_default("S3_ENDPOINT", "");
        let s3_access_key = env_or_default("S3_ACCESS_KEY", "");
        let s3_secret_key = env_or_default("S3_SECRET_KEY", "");
        let s3_bucket = env_or_default("S3_BUCKET", "exam-assessment");
        let s3_region = env_or_default("S3_REGION", "us-east-1");

        let worker_concurrency =
            parse_usize("WORKER_CONCURRENCY", env_or_default("WORKER_CONCURRENCY", "4"))?;
        let poll_interval_ms = parse_u64(
            "WORKER_POLL_INTERVAL_MS",
            env_or_default("WORKER_POLL_INTERVAL_MS", "1000"),
        )?;
        let stage_hard_limit_seconds = parse_u64(
            "STAGE_HARD_LIMIT_SECONDS",
            env_or_default("STAGE_HARD_LIMIT_SECONDS", "300"),
        )?;
        let stage_soft_limit_seconds = parse_u64(
            "STAGE_SOFT_LIMIT_SECONDS",
            env_or_default("STAGE_SOFT_LIMIT_SECONDS", "240"),
        )?;
        let cancel_poll_interval_ms = parse_u64(
            "CANCEL_POLL_INTERVAL_MS",
            env_or_default("CANCEL_POLL_INTERVAL_MS", "1000"),
        )?;
        let retry_delays_seconds =
            parse_delays("AI_RETRY_DELAYS", env_or_default("AI_RETRY_DELAYS", "1,2,4"))?;
        let retry_attempts =
            parse_u32("AI_RETRY_ATTEMPTS", env_or_default("AI_RETRY_ATTEMPTS", "3"))?;
        let regenerate_after_review = env_optional("PIPELINE_AUTO_REGENERATE")
            .map(|value| parse_bool(&value))
            .unwrap_or(true);
        let use_mock_services =
            env_optional("USE_MOCK_SERVICES").map(|value| parse_bool(&value)).unwrap_or(false);
        let knowledge_cache_ttl_seconds = parse_u64(
            "KNOWLEDGE_CACHE_TTL_SECONDS",
            env_or_default("KNOWLEDGE_CACHE_TTL_SECONDS", KNOWLEDGE_CACHE_TTL_SECONDS),
        )?;
        let maintenance_interval_seconds = parse_u64(
            "MAINTENANCE_INTERVAL_SECONDS",
            env_or_default("MAINTENANCE_INTERVAL_SECONDS", "60"),
        )?;

        let log_level = env_or_default("PIPELINE_LOG_LEVEL", "info");
        let json =
            env_optional("PIPELINE_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            ai: AiSettings {
                openai_api_key,
                openai_base_url,
                ai_model,
                ai_max_tokens,
                ai_temperature,
                ai_request_timeout,
            },
            ocr: OcrSettings {
                api_key: ocr_api_key,
                base_url: ocr_base_url,
                timeout_seconds: ocr_timeout_seconds,
            },
            storage: StorageSettings { max_upload_size_mb, allowed_image_extensions },
            s3: S3Settings {
                endpoint: s3_endpoint,
                access_key: s3_access_key,
                secret_key: s3_secret_key,
                bucket: s3_bucket,
                region: s3_region,
            },
            pipeline: PipelineSettings {
                worker_concurrency,
                poll_interval_ms,
                stage_hard_limit_seconds,
                stage_soft_limit_seconds,
                cancel_poll_interval_ms,
                retry_delays_seconds,
                retry_attempts,
                regenerate_after_review,
                use_mock_services,
                knowledge_cache_ttl_seconds,
                maintenance_interval_seconds,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
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

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn ocr(&self) -> &OcrSettings {
        &self.ocr
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub(crate) fn pipeline(&self) -> &PipelineSettings {
        &self.pipeline
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.allowed_image_extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ALLOWED_IMAGE_EXTENSIONS",
                value: String::from("<empty>"),
            });
        }

        for extension in &self.storage.allowed_image_extensions {
            if !is_supported_image_extension(extension) {
                return Err(ConfigError::InvalidValue {
                    field: "ALLOWED_IMAGE_EXTENSIONS",
                    value: extension.clone(),
                });
            }
        }

        let pipeline = &self.pipeline;
        if pipeline.worker_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "WORKER_CONCURRENCY",
                value: "0".to_string(),
            });
        }

        if pipeline.stage_hard_limit_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "STAGE_HARD_LIMIT_SECONDS",
                value: "0".to_string(),
            });
        }

        if pipeline.stage_soft_limit_seconds >= pipeline.stage_hard_limit_seconds {
            return Err(ConfigError::InvalidValue {
                field: "STAGE_SOFT_LIMIT_SECONDS",
                value: pipeline.stage_soft_limit_seconds.to_string(),
            });
        }

        if pipeline.retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "AI_RETRY_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if !(0.0..=2.0).contains(&self.ai.ai_temperature) {
            return Err(ConfigError::InvalidValue {
                field: "AI_TEMPERATURE",
                value: self.ai.ai_temperature.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.s3.access_key.is_empty() || self.s3.secret_key.is_empty() {
            return Err(ConfigError::MissingSecret("S3_ACCESS_KEY/S3_SECRET_KEY"));
        }
        if pipeline.use_mock_services {
            return Ok(());
        }
        if self.ai.openai_api_key.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
        }
        if self.ai.openai_base_url.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_BASE_URL"));
        }
        if self.ocr.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("OCR_API_KEY"));
        }
        if self.ocr.base_url.is_empty() {
            return Err(ConfigError::MissingSecret("OCR_BASE_URL"));
        }

        Ok(())
    }
}
