//! `skein tail`

use std::io::Write;

use anyhow::{bail, Result};
use skein_client::{Client, ContextId, Event, EventEnvelope, EventKey, LoopExit};
use tokio::sync::mpsc;
use tracing::info;

pub async fn execute(
    client: &Client,
    account: Option<u32>,
    kind: Option<String>,
    count: Option<usize>,
) -> Result<()> {
    follow(client, account, kind, count, &mut std::io::stdout()).await
}

/// Print matching events as JSON lines until `count` is reached, the loop
/// stops or the user interrupts.
///
/// The listener is registered before the event loop starts, so no event is
/// dispatched to an empty listener set.
async fn follow(
    client: &Client,
    account: Option<u32>,
    kind: Option<String>,
    count: Option<usize>,
    out: &mut impl Write,
) -> Result<()> {
    let key = kind.map(EventKey::Kind).unwrap_or(EventKey::All);
    let (tx, mut rx) = mpsc::unbounded_channel::<EventEnvelope>();

    match account {
        Some(id) => {
            let context_id = ContextId(id);
            client
                .get_context_events(context_id)
                .on(key, move |event: &Event| {
                    let _ = tx.send(EventEnvelope::new(context_id, event.clone()));
                });
        }
        None => {
            client.events().on(key, move |context_id, event: &Event| {
                let _ = tx.send(EventEnvelope::new(context_id, event.clone()));
            });
        }
    }

    let handle = client.start_event_loop()?;

    let mut remaining = count;
    loop {
        if remaining == Some(0) {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
            Some(envelope) = rx.recv() => {
                print(out, &envelope)?;
                remaining = remaining.map(|n| n - 1);
            }
            exit = handle.wait() => {
                // Print whatever was delivered before the loop stopped.
                while remaining != Some(0) {
                    let Ok(envelope) = rx.try_recv() else {
                        break;
                    };
                    print(out, &envelope)?;
                    remaining = remaining.map(|n| n - 1);
                }
                return match exit {
                    LoopExit::Closed(reason) => {
                        info!(reason = %reason, "Backend closed the connection");
                        Ok(())
                    }
                    LoopExit::Failed(err) => bail!("Event loop failed: {}", err),
                };
            }
        }
    }
}

fn print(out: &mut impl Write, envelope: &EventEnvelope) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string(envelope)?)?;
    out.flush()?;
    Ok(())
}
