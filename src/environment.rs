use anyhow::{anyhow, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_WORKFLOW_BASE_URL: &str = "https://api.coze.cn/v1/workflow/run";
pub const DEFAULT_IDENTIFY_WORKFLOW_ID: &str = "7534025846535258151";
pub const DEFAULT_COLLECT_WORKFLOW_ID: &str = "7529567713032601643";
pub const DEFAULT_ANALYZE_WORKFLOW_ID: &str = "7527334340147150857";

/// Retrieves an environment variable and splits it into a vector of strings based on a delimiter.
///
/// Empty segments are dropped.
pub fn get_env_var_as_vec(var: &str, delimiter: char) -> Vec<String> {
    env::var(var)
        .unwrap_or_default()
        .split(delimiter)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Reads and parses an environment variable, falling back to `default` when unset.
fn env_or<T>(var: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("invalid value for {}: {}", var, e)),
        _ => Ok(default),
    }
}

fn env_string_or(var: &str, default: &str) -> String {
    env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Workflow ids for the three pipeline stages.
#[derive(Clone, Debug)]
pub struct WorkflowIds {
    pub identify: String,
    pub collect: String,
    pub analyze: String,
}

#[derive(Clone, Debug)]
pub struct WorkflowSettings {
    pub base_url: String,
    pub token: String,
    pub ids: WorkflowIds,
    /// Used for identification and collection.
    pub stage_timeout: Duration,
    /// Used for analysis, the heaviest stage.
    pub analysis_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct VerificationSettings {
    pub code_length: usize,
    pub expire_minutes: i64,
    pub rate_limit_secs: i64,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            code_length: 6,
            expire_minutes: 5,
            rate_limit_secs: 60,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RefreshSettings {
    pub hour: u32,
    pub minute: u32,
    pub utc_offset_hours: i32,
}

/// Process-wide settings, loaded once at startup.
#[derive(Clone, Debug)]
pub struct Settings {
    pub database_path: String,
    pub port: u16,
    pub workflow: WorkflowSettings,
    pub analysis_workers: usize,
    pub secret_key: String,
    pub session_hours: i64,
    pub verification: VerificationSettings,
    pub refresh: RefreshSettings,
    pub cors_origins: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let token = env::var("WORKFLOW_TOKEN")
            .context("WORKFLOW_TOKEN environment variable required")?;

        let workflow = WorkflowSettings {
            base_url: env_string_or("WORKFLOW_BASE_URL", DEFAULT_WORKFLOW_BASE_URL),
            token,
            ids: WorkflowIds {
                identify: env_string_or("WORKFLOW_ID_IDENTIFY", DEFAULT_IDENTIFY_WORKFLOW_ID),
                collect: env_string_or("WORKFLOW_ID_COLLECT", DEFAULT_COLLECT_WORKFLOW_ID),
                analyze: env_string_or("WORKFLOW_ID_ANALYZE", DEFAULT_ANALYZE_WORKFLOW_ID),
            },
            stage_timeout: Duration::from_secs(env_or("WORKFLOW_TIMEOUT_SECS", 30u64)?),
            analysis_timeout: Duration::from_secs(env_or("ANALYSIS_TIMEOUT_SECS", 120u64)?),
        };

        let verification = VerificationSettings {
            code_length: env_or("SMS_CODE_LENGTH", 6usize)?,
            expire_minutes: env_or("SMS_CODE_EXPIRE_MINUTES", 5i64)?,
            rate_limit_secs: env_or("SMS_RATE_LIMIT_SECS", 60i64)?,
        };

        let refresh = RefreshSettings {
            hour: env_or("REFRESH_HOUR", 6u32)?,
            minute: env_or("REFRESH_MINUTE", 0u32)?,
            utc_offset_hours: env_or("REFRESH_UTC_OFFSET_HOURS", 8i32)?,
        };
        if refresh.hour > 23 || refresh.minute > 59 {
            return Err(anyhow!(
                "invalid refresh time {:02}:{:02}",
                refresh.hour,
                refresh.minute
            ));
        }

        let mut cors_origins = get_env_var_as_vec("CORS_ORIGINS", ';');
        if cors_origins.is_empty() {
            cors_origins = vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ];
        }

        Ok(Settings {
            database_path: env_string_or("DATABASE_PATH", "eventtrail.db"),
            port: env_or("PORT", 5000u16)?,
            workflow,
            analysis_workers: env_or("ANALYSIS_WORKERS", 4usize)?.max(1),
            secret_key: env_string_or("SECRET_KEY", "dev-secret-key-change-in-production"),
            session_hours: env_or("SESSION_HOURS", 24 * 7i64)?,
            verification,
            refresh,
            cors_origins,
        })
    }
}
