use memo_core::store::NoteDraft;
use memo_core::sync::{RestoreOutcome, Scheduler, Trigger};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::Toggle;
use crate::commands::common::{format_sync_report, normalize_content, Session};
use crate::error::CliError;

pub async fn run_sync(session: &Session, as_json: bool) -> Result<(), CliError> {
    let reconciler = session.reconciler()?;
    let report = reconciler.sync().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_sync_report(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_restore(session: &Session) -> Result<(), CliError> {
    let reconciler = session.reconciler()?;
    match reconciler.restore_if_empty().await? {
        RestoreOutcome::Restored { count, needs_sync } => {
            println!("Restored {count} memos from {}", reconciler.active_provider());
            if needs_sync {
                let report = reconciler.sync().await?;
                for line in format_sync_report(&report) {
                    println!("{line}");
                }
            }
        }
        RestoreOutcome::NeedsMerge => {
            let report = reconciler.sync().await?;
            for line in format_sync_report(&report) {
                println!("{line}");
            }
        }
        RestoreOutcome::KeptLocal => println!("Local memos present; nothing restored"),
        RestoreOutcome::Unavailable => {
            println!("{} is unreachable; nothing restored", reconciler.active_provider());
        }
    }
    Ok(())
}

pub fn run_cloud_sync(session: &Session, state: Toggle) -> Result<(), CliError> {
    let reconciler = session.reconciler()?;
    reconciler.set_sync_enabled(state == Toggle::On)?;
    println!(
        "Cloud sync {}",
        if reconciler.is_sync_enabled() { "on" } else { "off" }
    );
    Ok(())
}

/// Run the scheduler until Ctrl-C. Each non-empty stdin line becomes a memo,
/// which the scheduler picks up like any other local change.
pub async fn run_watch(session: &Session) -> Result<(), CliError> {
    let reconciler = session.reconciler()?;
    let notes = session.notes();

    match reconciler.restore_if_empty().await {
        Ok(RestoreOutcome::Restored { count, .. }) => println!("Restored {count} memos"),
        Ok(_) => {}
        Err(error) => tracing::warn!("Startup restore failed: {}", error),
    }

    let scheduler = Scheduler::new(&reconciler, &session.changes, session.config.schedule);
    let trigger = scheduler.trigger();
    trigger.send(Trigger::Lifecycle);

    println!(
        "Watching ({}, sync {}). Type a memo and press Enter; Ctrl-C to stop.",
        reconciler.active_provider(),
        if reconciler.can_sync() { "on" } else { "off" }
    );

    let capture = async {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let Some(content) = normalize_content(&line) else {
                            continue;
                        };
                        match notes.create(content, NoteDraft::default()) {
                            Ok(note) => println!("{}", note.id),
                            Err(error) => eprintln!("Error: {error}"),
                        }
                    }
                    Ok(None) => {
                        // stdin closed; keep syncing until interrupted
                        let _ = tokio::signal::ctrl_c().await;
                        break;
                    }
                    Err(error) => {
                        tracing::warn!("Failed to read stdin: {}", error);
                        let _ = tokio::signal::ctrl_c().await;
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        trigger.shutdown();
    };

    let (stats, ()) = tokio::join!(scheduler.run(), capture);

    if reconciler.can_sync() {
        let report = reconciler.sync().await?;
        for line in format_sync_report(&report) {
            println!("{line}");
        }
    }
    println!(
        "Stopped after {} scheduled runs ({} failed)",
        stats.runs, stats.failures
    );
    Ok(())
}
