use std::path::Path;

use memo_core::config::{ClientConfig, ProviderKind};
use memo_core::util::normalize_text_option;

use crate::cli::ConfigCommands;
use crate::commands::common::{config_path, load_config};
use crate::error::CliError;

/// Values passed to `memo config init`; `None` keeps what the file has.
#[derive(Debug, Default)]
pub struct ConfigInit {
    pub provider: Option<ProviderKind>,
    pub d1_url: Option<String>,
    pub d1_fallback_url: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
}

pub fn run_config(command: ConfigCommands, explicit_path: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            provider,
            d1_url,
            d1_fallback_url,
            supabase_url,
            supabase_anon_key,
        } => run_config_init(
            explicit_path,
            ConfigInit {
                provider,
                d1_url,
                d1_fallback_url,
                supabase_url,
                supabase_anon_key,
            },
        ),
        ConfigCommands::Show => {
            let config = load_config(explicit_path)?;
            for line in format_config_lines(&config) {
                println!("{line}");
            }
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", config_path(explicit_path)?.display());
            Ok(())
        }
    }
}

pub fn run_config_init(explicit_path: Option<&Path>, init: ConfigInit) -> Result<(), CliError> {
    let path = config_path(explicit_path)?;
    let existing = ClientConfig::load_from(&path)?;
    let config = apply_config_init(existing, init)?;
    config.save_to(&path)?;
    println!("Config written to {}", path.display());

    let missing = missing_provider_fields(&config, config.provider);
    if missing.is_empty() {
        println!(
            "Provider '{}' is ready. Set MEMO_ACCESS_TOKEN and run `memo cloud-sync on`.",
            config.provider
        );
    } else {
        println!(
            "Provider '{}' is missing: {}",
            config.provider,
            missing.join(", ")
        );
    }
    Ok(())
}

pub fn apply_config_init(
    mut config: ClientConfig,
    init: ConfigInit,
) -> Result<ClientConfig, CliError> {
    if let Some(provider) = init.provider {
        config.provider = provider;
    }
    if let Some(url) = normalize_text_option(init.d1_url) {
        config.d1.base_url = Some(url);
    }
    if let Some(url) = normalize_text_option(init.d1_fallback_url) {
        config.d1.fallback_base_url = Some(url);
    }
    if let Some(url) = normalize_text_option(init.supabase_url) {
        config.supabase.url = Some(url);
    }
    if let Some(key) = normalize_text_option(init.supabase_anon_key) {
        config.supabase.anon_key = Some(key);
    }
    Ok(config.normalized()?)
}

pub fn missing_provider_fields(config: &ClientConfig, kind: ProviderKind) -> Vec<&'static str> {
    let mut missing = Vec::new();
    match kind {
        ProviderKind::D1 => {
            if config.d1.base_url.is_none() {
                missing.push("d1_url");
            }
        }
        ProviderKind::Supabase => {
            if config.supabase.url.is_none() {
                missing.push("supabase_url");
            }
            if config.supabase.anon_key.is_none() {
                missing.push("supabase_anon_key");
            }
        }
    }
    missing
}

pub fn format_config_lines(config: &ClientConfig) -> Vec<String> {
    let show = |value: Option<&str>| value.unwrap_or("-").to_string();
    vec![
        format!("provider            {}", config.provider),
        format!("d1.base_url         {}", show(config.d1.base_url.as_deref())),
        format!(
            "d1.fallback_url     {}",
            show(config.d1.fallback_base_url.as_deref())
        ),
        format!("supabase.url        {}", show(config.supabase.url.as_deref())),
        format!(
            "supabase.anon_key   {}",
            if config.supabase.anon_key.is_some() { "[set]" } else { "-" }
        ),
        format!(
            "access_token        {}",
            if config.is_authenticated() { "[set]" } else { "-" }
        ),
        format!("cloud_sync_enabled  {}", config.cloud_sync_enabled),
        format!(
            "db_path             {}",
            config
                .db_path
                .as_ref()
                .map_or_else(|| "(default)".to_string(), |path| path.display().to_string())
        ),
    ]
}
