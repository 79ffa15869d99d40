//! Two users on one in-memory store exchange a few messages.
//!
//! Run with `RUST_LOG=parley_client=debug` to follow the session reducers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parley_client::roster::format_relative_time;
use parley_client::{App, AuthProvider, ChatState, ClientConfig, LocalAuth, StoreLocation};
use parley_shared::{Clock, SystemClock};
use parley_store::SqliteStore;

const SETTLE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    parley_client::init_tracing();

    let config = ClientConfig {
        store: StoreLocation::InMemory,
        ..ClientConfig::from_env()
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(
        config
            .open_store(clock.clone())
            .context("failed to open document store")?,
    );

    let mut ada = App::new(store.clone(), LocalAuth::new(), config.clone(), clock.clone());
    let mut lin = App::new(store.clone(), LocalAuth::new(), config, clock.clone());

    ada.sign_up("ada@example.com", "correct horse", Some("Ada"))
        .await
        .context("sign-up failed for ada")?;
    lin.sign_up("lin@example.com", "battery staple", None)
        .await
        .context("sign-up failed for lin")?;

    let ada_session = ada.require_session()?;
    let lin_session = lin.require_session()?;
    let ada_id = ada_session.user().uid.clone();
    let lin_id = lin_session.user().uid.clone();

    ada_session.select_user(&lin_id);
    settle(ada_session.wait_until(|s| s.blocks().is_resolved(&lin_id))).await?;
    ada_session.send_message("Hello Lin!").await?;

    lin_session.select_user(&ada_id);
    settle(lin_session.wait_until(|s| !s.messages().messages().is_empty())).await?;
    lin_session.send_message("Hi Ada, good to see you online.").await?;

    let state = settle(ada_session.wait_until(|s| s.messages().messages().len() == 2)).await?;
    print_state("ada", &state, clock.now_millis());

    let state = lin_session.state();
    print_state("lin", &state, clock.now_millis());

    lin.sign_out().await?;
    ada.sign_out().await?;
    println!(
        "signed out; ada's provider session: {:?}",
        ada.auth().current_user().map(|u| u.email)
    );

    Ok(())
}

async fn settle(
    wait: impl std::future::Future<Output = parley_client::Result<ChatState>>,
) -> Result<ChatState> {
    let state = tokio::time::timeout(SETTLE, wait)
        .await
        .context("timed out waiting for the session")??;
    Ok(state)
}

fn print_state(who: &str, state: &ChatState, now: i64) {
    println!("== {who} ==");
    for entry in state.roster().entries() {
        let online = if state.is_online(&entry.user.uid) {
            "online"
        } else {
            "offline"
        };
        println!(
            "  {} [{online}] {} {}",
            entry.user.display_name(),
            entry.preview_text(),
            format_relative_time(entry.last_activity(), now),
        );
    }
    for message in state.messages().messages() {
        let from = if message.is_from(&state.local_user().uid) {
            "me"
        } else {
            "them"
        };
        println!("  <{from}> {}", message.text);
    }
}
