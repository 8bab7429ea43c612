use anyhow::{Result, bail};
use std::collections::HashSet;

use crate::config::{HivemindConfig, ProviderKind};

/// Validate a loaded configuration.
///
/// Called once at startup, before the scheduling loop is entered. An empty
/// provider list is fatal: the process must refuse to run with no usable
/// backend rather than fail every generation task forever.
pub fn validate_config(config: &HivemindConfig) -> Result<()> {
    validate_schedule(config)?;
    validate_providers(config)?;
    validate_fallback(config)?;
    validate_reflection(config)?;
    Ok(())
}

fn validate_schedule(config: &HivemindConfig) -> Result<()> {
    let sched = &config.schedule;
    if sched.tick_secs == 0 {
        bail!("schedule.tick_secs must be > 0 (got 0)");
    }
    if sched.heartbeat_secs == 0 {
        bail!("schedule.heartbeat_secs must be > 0 (got 0)");
    }
    if sched.persist_secs == 0 {
        bail!("schedule.persist_secs must be > 0 (got 0)");
    }
    for (id, task) in &sched.tasks {
        if id.is_empty() {
            bail!("task ids cannot be empty");
        }
        if task.interval_secs == 0 {
            bail!("schedule.tasks.{}.interval_secs must be > 0 (got 0)", id);
        }
    }
    Ok(())
}

fn validate_providers(config: &HivemindConfig) -> Result<()> {
    if config.providers.is_empty() {
        bail!(
            "no providers configured: at least one [[providers]] entry is \
             required to run"
        );
    }

    let mut seen = HashSet::new();
    for provider in &config.providers {
        if provider.id.is_empty() {
            bail!("provider ids cannot be empty");
        }
        if !seen.insert(provider.id.as_str()) {
            bail!("duplicate provider id '{}'", provider.id);
        }
        if provider.model.is_empty() {
            bail!("providers.{}.model cannot be empty", provider.id);
        }
        if provider.api_key_env.is_empty() {
            bail!("providers.{}.api_key_env cannot be empty", provider.id);
        }
        if provider.timeout_secs == 0 {
            bail!("providers.{}.timeout_secs must be > 0 (got 0)", provider.id);
        }
        if provider.kind == ProviderKind::OpenaiCompat && provider.base_url.is_none() {
            bail!(
                "providers.{}: base_url is required for kind = \"openai-compat\"",
                provider.id
            );
        }
    }
    Ok(())
}

fn validate_fallback(config: &HivemindConfig) -> Result<()> {
    let fb = &config.fallback;
    if fb.degraded_threshold == 0 {
        bail!("fallback.degraded_threshold must be > 0 (got 0)");
    }
    if fb.unavailable_threshold <= fb.degraded_threshold {
        bail!(
            "fallback.unavailable_threshold ({}) must be greater than \
             degraded_threshold ({})",
            fb.unavailable_threshold,
            fb.degraded_threshold
        );
    }
    if fb.cooldown_base_secs == 0 {
        bail!("fallback.cooldown_base_secs must be > 0 (got 0)");
    }
    if fb.cooldown_max_secs < fb.cooldown_base_secs {
        bail!(
            "fallback.cooldown_max_secs ({}) must be >= cooldown_base_secs ({})",
            fb.cooldown_max_secs,
            fb.cooldown_base_secs
        );
    }
    Ok(())
}

fn validate_reflection(config: &HivemindConfig) -> Result<()> {
    let refl = &config.reflection;
    if refl.interval_secs == 0 {
        bail!("reflection.interval_secs must be > 0 (got 0)");
    }
    if refl.window == 0 {
        bail!("reflection.window must be > 0 (got 0)");
    }
    if !(0.0..=1.0).contains(&refl.low_water) {
        bail!("reflection.low_water must be within [0, 1]");
    }
    if !(0.0..=1.0).contains(&refl.high_water) {
        bail!("reflection.high_water must be within [0, 1]");
    }
    if refl.low_water >= refl.high_water {
        bail!(
            "reflection.low_water ({}) must be below high_water ({})",
            refl.low_water,
            refl.high_water
        );
    }
    if refl.max_slowdown < 1.0 {
        bail!("reflection.max_slowdown must be >= 1.0 (intervals never shrink below base via slowdown)");
    }
    if refl.max_speedup < 1.0 {
        bail!("reflection.max_speedup must be >= 1.0");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderConfig, TaskConfig};

    fn valid_config() -> HivemindConfig {
        let mut config = HivemindConfig::default();
        config.providers.push(ProviderConfig {
            id: "groq".into(),
            kind: ProviderKind::OpenaiCompat,
            base_url: Some("https://api.groq.com/openai/v1".into()),
            model: "llama-3.3-70b-versatile".into(),
            api_key_env: "GROQ_API_KEY".into(),
            timeout_secs: 30,
        });
        config.schedule.tasks.insert(
            "publish-paper".into(),
            TaskConfig {
                interval_secs: 14400,
                priority: 0,
                enabled: true,
                prompt: None,
            },
        );
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_no_providers_is_fatal() {
        let mut config = valid_config();
        config.providers.clear();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("no providers configured"));
    }

    #[test]
    fn test_duplicate_provider_id_rejected() {
        let mut config = valid_config();
        let dup = config.providers[0].clone();
        config.providers.push(dup);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate provider id"));
    }

    #[test]
    fn test_openai_compat_requires_base_url() {
        let mut config = valid_config();
        config.providers[0].base_url = None;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("base_url is required"));
    }

    #[test]
    fn test_zero_task_interval_rejected() {
        let mut config = valid_config();
        config
            .schedule
            .tasks
            .get_mut("publish-paper")
            .unwrap()
            .interval_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("interval_secs must be > 0"));
    }

    #[test]
    fn test_threshold_ordering_enforced() {
        let mut config = valid_config();
        config.fallback.unavailable_threshold = config.fallback.degraded_threshold;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("unavailable_threshold"));
    }

    #[test]
    fn test_cooldown_cap_must_cover_base() {
        let mut config = valid_config();
        config.fallback.cooldown_base_secs = 120;
        config.fallback.cooldown_max_secs = 60;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_reflection_bounds_sanity() {
        let mut config = valid_config();
        config.reflection.max_slowdown = 0.5;
        assert!(validate_config(&config).is_err());

        let mut config = valid_config();
        config.reflection.max_speedup = 0.0;
        assert!(validate_config(&config).is_err());

        let mut config = valid_config();
        config.reflection.low_water = 0.9;
        config.reflection.high_water = 0.8;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_tick_rejected() {
        let mut config = valid_config();
        config.schedule.tick_secs = 0;
        assert!(validate_config(&config).is_err());
    }
}
