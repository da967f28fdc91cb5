use std::fs;

use serde::Deserialize;
use tracing::warn;

const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "change-me";

pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub admin_username: String,
    pub admin_password: String,
    pub session_ttl_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8501".into(),
            database_url: storage::DEFAULT_DATABASE_URL.into(),
            admin_username: DEFAULT_ADMIN_USERNAME.into(),
            admin_password: DEFAULT_ADMIN_PASSWORD.into(),
            session_ttl_seconds: 3600,
        }
    }
}

/// Keys accepted in `server.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    database_url: Option<String>,
    admin_username: Option<String>,
    admin_password: Option<String>,
    session_ttl_seconds: Option<TtlSetting>,
}

/// The TTL may be written as a TOML integer or as a quoted number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TtlSetting {
    Seconds(i64),
    Text(String),
}

impl Settings {
    pub fn uses_default_admin(&self) -> bool {
        self.admin_username == DEFAULT_ADMIN_USERNAME
            && self.admin_password == DEFAULT_ADMIN_PASSWORD
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string("server.toml").ok();
    let settings = settings_from(file.as_deref(), |key| std::env::var(key).ok());
    if settings.uses_default_admin() {
        warn!("using built-in admin credentials; set ADMIN_USERNAME and ADMIN_PASSWORD");
    }
    settings
}

/// Defaults, then `server.toml` keys, then environment variables.
pub(crate) fn settings_from(
    file_contents: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file_contents {
        match toml::from_str::<FileSettings>(raw) {
            Ok(file_cfg) => apply_file(&mut settings, file_cfg),
            Err(error) => warn!(%error, "ignoring unreadable server.toml"),
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = env("ADMIN_USERNAME") {
        settings.admin_username = v;
    }
    if let Some(v) = env("APP__ADMIN_USERNAME") {
        settings.admin_username = v;
    }

    if let Some(v) = env("ADMIN_PASSWORD") {
        settings.admin_password = v;
    }
    if let Some(v) = env("APP__ADMIN_PASSWORD") {
        settings.admin_password = v;
    }

    if let Some(v) = env("APP__SESSION_TTL_SECONDS") {
        apply_ttl(&mut settings, &v);
    }

    settings
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.bind_addr {
        settings.server_bind = v;
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.admin_username {
        settings.admin_username = v;
    }
    if let Some(v) = file_cfg.admin_password {
        settings.admin_password = v;
    }
    match file_cfg.session_ttl_seconds {
        Some(TtlSetting::Seconds(seconds)) => apply_ttl(settings, &seconds.to_string()),
        Some(TtlSetting::Text(raw)) => apply_ttl(settings, &raw),
        None => {}
    }
}

fn apply_ttl(settings: &mut Settings, raw: &str) {
    match raw.trim().parse::<u64>() {
        Ok(parsed) if parsed > 0 => settings.session_ttl_seconds = parsed,
        _ => warn!(value = raw, "ignoring invalid session ttl"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
