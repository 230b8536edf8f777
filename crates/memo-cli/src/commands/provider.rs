use memo_core::config::ProviderKind;
use memo_core::remote::{RemoteAdapter, RemoteProvider};
use memo_core::store::SyncStateStore;
use serde::Serialize;

use crate::commands::common::{format_sync_timestamp, Session};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct ProviderStatusItem {
    pub provider: ProviderKind,
    pub endpoint: Option<String>,
    pub configured: bool,
    pub active: bool,
    pub healthy: bool,
    /// Unix millis of the last clean sync, 0 if never
    pub last_sync_at: i64,
}

pub async fn run_provider_status(session: &Session, as_json: bool) -> Result<(), CliError> {
    let remotes = RemoteProvider::all_configured(&session.config)?;
    let active = if remotes.is_empty() {
        None
    } else {
        Some(session.reconciler()?.active_provider())
    };

    let sync_state = SyncStateStore::new(session.store.clone());
    let mut items = Vec::new();
    for kind in ProviderKind::ALL {
        let remote = remotes.iter().find(|remote| remote.kind() == kind);
        let healthy = match remote {
            Some(remote) => remote.health().await,
            None => false,
        };
        items.push(ProviderStatusItem {
            provider: kind,
            endpoint: remote.map(|remote| remote.endpoint().to_string()),
            configured: remote.is_some(),
            active: active == Some(kind),
            healthy,
            last_sync_at: sync_state.last_sync_at(kind)?,
        });
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    for line in format_provider_lines(&items) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_provider_lines(items: &[ProviderStatusItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let marker = if item.active { '*' } else { ' ' };
            let state = match (item.configured, item.healthy) {
                (false, _) => "not configured",
                (true, true) => "reachable",
                (true, false) => "unreachable",
            };
            let endpoint = item.endpoint.as_deref().unwrap_or("-");
            let last_sync = if item.last_sync_at > 0 {
                format_sync_timestamp(item.last_sync_at)
            } else {
                "never synced".to_string()
            };
            format!(
                "{marker}{:<9} {state:<15} {last_sync:<24} {endpoint}",
                item.provider.as_str()
            )
        })
        .collect()
}

pub async fn run_provider_switch(session: &Session, target: ProviderKind) -> Result<(), CliError> {
    let reconciler = session.reconciler()?;
    let report = reconciler.switch_provider(target).await?;

    if !report.changed {
        println!("{target} is already the active provider");
        return Ok(());
    }
    println!(
        "Switched {} -> {}: {} memos on both providers ({} push failures)",
        report.from, report.to, report.merged, report.push_failures
    );
    if let Some(warning) = report.warning {
        println!("warning: {warning}");
    }
    Ok(())
}
