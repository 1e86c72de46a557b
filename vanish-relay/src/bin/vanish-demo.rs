//! Runs two in-process clients, alice and bob, against one relay.
//!
//! Usage: `vanish-demo [config.json]`

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use vanish_relay::{
    init_tracing, ChatSession, Conversation, DeliveryChannel, RelayHub, VanishConfig,
};
use vanish_store::{EphemeralStore, EnvelopeStore, ExpirySweeper};
use vanish_types::Identity;
use vanish_vault::{KeyVault, MemoryDirectory, MemorySecretStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => VanishConfig::from_json_file(&PathBuf::from(path))
            .context("failed to load config")?,
        None => VanishConfig::default(),
    };
    config.validate()?;

    let store: Arc<dyn EnvelopeStore> = Arc::new(EphemeralStore::open_in_memory()?);
    let (sweeper, sweeper_task) = ExpirySweeper::spawn(store.clone(), config.sweep_interval());
    let hub = Arc::new(RelayHub::new(store.clone(), &config));
    let directory = Arc::new(MemoryDirectory::new());

    let session = |name: &str| -> anyhow::Result<ChatSession> {
        let vault = Arc::new(KeyVault::new(
            Arc::new(MemorySecretStore::new()),
            directory.clone(),
        ));
        Ok(ChatSession::new(
            Identity::new(name)?,
            vault,
            directory.clone(),
            DeliveryChannel::new(hub.clone(), &config),
            &config,
        ))
    };
    let alice = session("alice")?;
    let bob = session("bob")?;
    alice.start().await?;
    bob.start().await?;

    let (inbox_tx, mut inbox_rx) = mpsc::unbounded_channel();
    let subscription = bob
        .channel()
        .subscribe(bob.identity(), move |envelope| {
            let _ = inbox_tx.send(envelope);
        })
        .await?;

    let sent = alice.send_text(bob.identity(), "hello").await?;
    info!(expires_at = %sent.expires_at(), "alice sent a message");

    let mut conversation = Conversation::new(alice.identity().clone(), bob.identity().clone());
    if let Some(envelope) = inbox_rx.recv().await {
        bob.ingest_pushed(&mut conversation, &envelope).await?;
    }
    for message in conversation.messages() {
        println!("{} -> {}: {}", message.sender, message.receiver, message.body);
    }

    let report = bob
        .channel()
        .reconcile(bob.identity(), alice.identity(), |_| {})
        .await?;
    println!("history holds {} envelope(s)", report.len());

    // Short lifetimes are waited out to show the message vanishing.
    if config.ttl_seconds <= 10 {
        let wait = std::time::Duration::from_secs(config.ttl_seconds) + config.sweep_interval();
        info!(?wait, "waiting for the message to expire");
        tokio::time::sleep(wait).await;

        let report = bob
            .channel()
            .reconcile(bob.identity(), alice.identity(), |_| {})
            .await?;
        conversation.apply_snapshot(&report);
        println!(
            "after expiry: history holds {} envelope(s), conversation shows {}",
            report.len(),
            conversation.len()
        );
    }

    subscription.cancel().await;
    sweeper.stop().await?;
    sweeper_task.await?;
    Ok(())
}
