use std::env;

use chrono::NaiveTime;

use crate::scheduling::ClinicHours;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub session_ttl_hours: i64,
    pub clinic_hours: ClinicHours,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let session_ttl_hours = env::var("SESSION_TTL_HOURS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(24);

        let defaults = ClinicHours::default();
        let clinic_hours = ClinicHours {
            open: time_from_env("CLINIC_OPEN", defaults.open)?,
            close: time_from_env("CLINIC_CLOSE", defaults.close)?,
            default_slot_minutes: env::var("DEFAULT_SLOT_MINUTES")
                .ok()
                .and_then(|s| s.parse::<i32>().ok())
                .unwrap_or(defaults.default_slot_minutes),
        };
        if clinic_hours.close <= clinic_hours.open {
            anyhow::bail!("CLINIC_CLOSE must be after CLINIC_OPEN");
        }

        Ok(Self {
            database_url,
            bind_addr,
            session_ttl_hours,
            clinic_hours,
        })
    }
}

fn time_from_env(var: &str, default: NaiveTime) -> anyhow::Result<NaiveTime> {
    match env::var(var) {
        Ok(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map_err(|e| anyhow::anyhow!("{var} must be HH:MM: {e}")),
        Err(_) => Ok(default),
    }
}
