use std::path::PathBuf;

use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_extension_list, parse_model_backend, parse_u32, parse_u64,
};
use super::secret::load_secret;
use super::types::{
    ApiSettings, ConfigError, CorsSettings, HostedSettings, LocalSettings, ModelBackend,
    ModelSettings, RuntimeSettings, ServerHost, ServerPort, ServerSettings, Settings,
    StorageSettings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("GRADER_HOST", "0.0.0.0");
        let port = env_or_default("GRADER_PORT", "8000");

        let environment =
            parse_environment(env_optional("GRADER_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("GRADER_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Grading Assistant");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let backend = parse_model_backend(env_optional("MODEL_BACKEND"))?;
        let request_timeout_seconds =
            parse_u64("MODEL_REQUEST_TIMEOUT", env_or_default("MODEL_REQUEST_TIMEOUT", "120"))?;

        let openai_api_key = load_secret("OPENAI_API_KEY")?;
        let openai_base_url = env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1");
        let completion_engine = env_or_default("COMPLETION_ENGINE", "davinci-002");
        let max_tokens = parse_u32("MODEL_MAX_TOKENS", env_or_default("MODEL_MAX_TOKENS", "150"))?;
        let connect_timeout_seconds =
            parse_u64("MODEL_CONNECT_TIMEOUT", env_or_default("MODEL_CONNECT_TIMEOUT", "30"))?;

        let local_checkpoint = env_or_default("LOCAL_MODEL", "meta-llama/Meta-Llama-3-8B");
        let local_revision = env_or_default("LOCAL_MODEL_REVISION", "main");
        let tokenizer_fallback =
            env_or_default("LOCAL_TOKENIZER_FALLBACK", "meta-llama/Meta-Llama-3-8B");
        let hf_token = load_secret("HF_TOKEN")?;
        let local_max_length =
            parse_u32("LOCAL_MAX_LENGTH", env_or_default("LOCAL_MAX_LENGTH", "2048"))?;

        let upload_dir = PathBuf::from(env_or_default("UPLOAD_DIR", "uploads"));
        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "1"))?;
        let max_files_per_batch =
            parse_u64("MAX_FILES_PER_BATCH", env_or_default("MAX_FILES_PER_BATCH", "200"))?;
        let allowed_extensions =
            parse_extension_list(env_optional("ALLOWED_SUBMISSION_EXTENSIONS"));

        let log_level = env_or_default("GRADER_LOG_LEVEL", "info");
        let json = env_optional("GRADER_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
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
            model: ModelSettings { backend, request_timeout_seconds },
            hosted: HostedSettings {
                api_key: openai_api_key,
                base_url: openai_base_url,
                engine: completion_engine,
                max_tokens,
                connect_timeout_seconds,
            },
            local: LocalSettings {
                checkpoint: local_checkpoint,
                revision: local_revision,
                tokenizer_fallback,
                access_token: Some(hf_token).filter(|token| !token.is_empty()),
                max_length: local_max_length,
            },
            storage: StorageSettings {
                upload_dir,
                max_upload_size_mb,
                max_files_per_batch,
                allowed_extensions,
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

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn model(&self) -> &ModelSettings {
        &self.model
    }

    pub(crate) fn hosted(&self) -> &HostedSettings {
        &self.hosted
    }

    #[cfg_attr(not(feature = "local"), allow(dead_code))]
    pub(crate) fn local(&self) -> &LocalSettings {
        &self.local
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    /// Generation budget handed to the selected backend: completion tokens for the
    /// hosted endpoint, total sequence length for local generation.
    pub(crate) fn token_budget(&self) -> u32 {
        match self.model.backend {
            ModelBackend::Hosted => self.hosted.max_tokens,
            ModelBackend::Local => self.local.max_length,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MODEL_REQUEST_TIMEOUT",
                value: "0".to_string(),
            });
        }

        if self.hosted.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MODEL_MAX_TOKENS",
                value: "0".to_string(),
            });
        }

        if self.local.max_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "LOCAL_MAX_LENGTH",
                value: "0".to_string(),
            });
        }

        if self.storage.max_files_per_batch == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_FILES_PER_BATCH",
                value: "0".to_string(),
            });
        }

        if self.storage.upload_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "UPLOAD_DIR",
                value: String::from("<empty>"),
            });
        }

        match self.model.backend {
            ModelBackend::Hosted => {
                if self.hosted.api_key.is_empty() {
                    return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
                }
                if self.hosted.base_url.is_empty() {
                    return Err(ConfigError::MissingSecret("OPENAI_BASE_URL"));
                }
            }
            ModelBackend::Local => {
                if self.local.checkpoint.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "LOCAL_MODEL",
                        value: String::from("<empty>"),
                    });
                }
                if (self.runtime.strict_config || self.runtime.environment.is_production())
                    && self.local.access_token.is_none()
                {
                    return Err(ConfigError::MissingSecret("HF_TOKEN"));
                }
            }
        }

        Ok(())
    }
}
