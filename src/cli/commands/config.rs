//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{FidxError, FidxResult};
use crate::ui::{self, UiContext};
use std::path::PathBuf;
use std::str::FromStr;

/// Keys accepted by `config set`
const VALID_KEYS: &[&str] = &[
    "general.log_format",
    "general.event_log",
    "general.manager_name",
    "index.memory_hint_mb",
    "index.clock_skew_tolerance_ms",
    "index.disk_margin_mb",
    "cache.generated_dir",
    "cache.legacy_dir",
    "cache.offline",
    "cache.bucket_size",
    "cache.purge_interval_hours",
    "lock.stale_minutes",
    "lock.max_wait_hours",
    "lock.poll_interval_secs",
    "tool.java_path",
    "tool.jar_path",
    "tool.build_entry_point",
    "tool.search_memory_mb",
    "supervisor.poll_interval_secs",
    "supervisor.frozen_min_wait_minutes",
    "supervisor.task_repoll_interval_secs",
    "supervisor.task_repoll_max_secs",
    "supervisor.max_skipped_fraction",
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> FidxResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config),
        Some(ConfigAction::Path) => show_path(manager),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => set_value(manager, config, &key, &value).await?,
    }

    Ok(())
}

fn show_config(config: &Config) {
    let toml =
        toml::to_string_pretty(config).unwrap_or_else(|_| "Error serializing config".to_string());
    println!("{}", toml);
}

fn show_path(manager: &ConfigManager) {
    println!("{}", manager.path().display());
}

async fn init_config(manager: &ConfigManager, force: bool) -> FidxResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());

    Ok(())
}

async fn set_value(
    manager: &ConfigManager,
    config: &Config,
    key: &str,
    value: &str,
) -> FidxResult<()> {
    let ctx = UiContext::detect();
    let mut config = config.clone();

    if let Err(reason) = apply_setting(&mut config, key, value).and_then(|()| config.check()) {
        if !VALID_KEYS.contains(&key) {
            ui::step_error_detail(&ctx, "Unknown config key", key);
            ui::remark(&ctx, "Valid keys:");
            for key in VALID_KEYS {
                eprintln!("  {}", key);
            }
        }
        return Err(FidxError::ConfigInvalid {
            path: manager.path().to_path_buf(),
            reason,
        });
    }

    manager.save(&config).await?;
    ui::step_ok(&ctx, &format!("Set {} = {}", key, value));

    Ok(())
}

/// Apply one dot-separated setting to `config`
fn apply_setting(config: &mut Config, key: &str, value: &str) -> Result<(), String> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => match value {
            "text" | "json" => config.general.log_format = value.to_string(),
            _ => return Err(format!("log_format must be text or json, got {}", value)),
        },
        ["general", "event_log"] => config.general.event_log = parse_bool(value)?,
        ["general", "manager_name"] => config.general.manager_name = optional(value),

        ["index", "memory_hint_mb"] => config.index.memory_hint_mb = parse(key, value)?,
        ["index", "clock_skew_tolerance_ms"] => {
            config.index.clock_skew_tolerance_ms = parse(key, value)?
        }
        ["index", "disk_margin_mb"] => config.index.disk_margin_mb = parse(key, value)?,

        ["cache", "generated_dir"] => {
            config.cache.generated_dir = optional(value).map(PathBuf::from)
        }
        ["cache", "legacy_dir"] => config.cache.legacy_dir = optional(value).map(PathBuf::from),
        ["cache", "offline"] => config.cache.offline = parse_bool(value)?,
        ["cache", "bucket_size"] => match parse::<u64>(key, value)? {
            0 => return Err("bucket_size must be positive".to_string()),
            size => config.cache.bucket_size = size,
        },
        ["cache", "purge_interval_hours"] => {
            config.cache.purge_interval_hours = parse(key, value)?
        }

        ["lock", "stale_minutes"] => config.lock.stale_minutes = parse(key, value)?,
        ["lock", "max_wait_hours"] => {
            let hours: f64 = parse(key, value)?;
            if !hours.is_finite() || hours < 0.0 {
                return Err(format!("max_wait_hours must be a non-negative number, got {}", value));
            }
            config.lock.max_wait_hours = hours;
        }
        ["lock", "poll_interval_secs"] => config.lock.poll_interval_secs = parse(key, value)?,

        ["tool", "java_path"] => config.tool.java_path = PathBuf::from(value),
        ["tool", "jar_path"] => config.tool.jar_path = optional(value).map(PathBuf::from),
        ["tool", "build_entry_point"] => config.tool.build_entry_point = value.to_string(),
        ["tool", "search_memory_mb"] => config.tool.search_memory_mb = parse(key, value)?,

        ["supervisor", "poll_interval_secs"] => {
            config.supervisor.poll_interval_secs = parse(key, value)?
        }
        ["supervisor", "frozen_min_wait_minutes"] => {
            config.supervisor.frozen_min_wait_minutes = parse(key, value)?
        }
        ["supervisor", "task_repoll_interval_secs"] => {
            config.supervisor.task_repoll_interval_secs = parse(key, value)?
        }
        ["supervisor", "task_repoll_max_secs"] => {
            config.supervisor.task_repoll_max_secs = parse(key, value)?
        }
        ["supervisor", "max_skipped_fraction"] => {
            let fraction: f64 = parse(key, value)?;
            if !(0.0..=1.0).contains(&fraction) {
                return Err(format!("max_skipped_fraction must be within 0..1, got {}", value));
            }
            config.supervisor.max_skipped_fraction = fraction;
        }

        _ => return Err(format!("Unknown config key: {}", key)),
    }

    Ok(())
}

/// Empty string clears an optional setting
fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("Invalid value for {}: {}", key, value))
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(format!("Invalid boolean value: {}. Use true/false", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_key_is_settable() {
        let samples = |key: &str| match key {
            "general.log_format" => "json",
            "general.event_log" | "cache.offline" => "false",
            "lock.max_wait_hours" | "supervisor.max_skipped_fraction" => "0.5",
            k if k.ends_with("_dir") || k.ends_with("_path") || k.ends_with("_name") => "/x",
            "tool.build_entry_point" => "Main",
            _ => "7",
        };
        for key in VALID_KEYS {
            let mut config = Config::default();
            assert!(
                apply_setting(&mut config, key, samples(key)).is_ok(),
                "{key} rejected"
            );
        }
    }

    #[test]
    fn set_updates_values() {
        let mut config = Config::default();
        apply_setting(&mut config, "cache.generated_dir", "/shared/generated").unwrap();
        apply_setting(&mut config, "lock.max_wait_hours", "1.5").unwrap();
        apply_setting(&mut config, "tool.jar_path", "/opt/MSGFPlus.jar").unwrap();

        assert_eq!(config.cache.generated_dir, Some(PathBuf::from("/shared/generated")));
        assert_eq!(config.lock.max_wait_hours, 1.5);
        assert_eq!(config.tool.jar_path, Some(PathBuf::from("/opt/MSGFPlus.jar")));
    }

    #[test]
    fn empty_value_clears_optional() {
        let mut config = Config::default();
        config.general.manager_name = Some("worker".to_string());
        apply_setting(&mut config, "general.manager_name", "").unwrap();
        assert_eq!(config.general.manager_name, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = Config::default();
        assert!(apply_setting(&mut config, "cache.bucket_size", "0").is_err());
        assert!(apply_setting(&mut config, "lock.stale_minutes", "soon").is_err());
        assert!(apply_setting(&mut config, "general.log_format", "xml").is_err());
        assert!(apply_setting(&mut config, "supervisor.max_skipped_fraction", "2").is_err());
        assert!(apply_setting(&mut config, "vm.name", "x").is_err());
    }

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool("yes"), Ok(true));
        assert_eq!(parse_bool("0"), Ok(false));
        assert!(parse_bool("maybe").is_err());
    }
}
