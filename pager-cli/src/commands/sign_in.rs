//! Sign in and keep the session alive.

use anyhow::{Context, Result};
use beep_pager_client::{SessionConfig, SessionManager, SessionPhase, Transport};
use std::future::Future;

/// Run the sign-in command until `shutdown` completes or the connection drops.
pub async fn run<T, F>(
    config: SessionConfig,
    transport: T,
    user_token: &str,
    secret_key: &str,
    shutdown: F,
) -> Result<()>
where
    T: Transport + 'static,
    F: Future<Output = ()>,
{
    println!("Connecting to {}", config.endpoint);
    let session = SessionManager::spawn(config, transport);
    let mut phases = session.watch_phase();

    session
        .sign_in(user_token, secret_key)
        .await
        .context("Sign-in failed")?;
    phases.borrow_and_update();
    println!("Signed in as {user_token}");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => {
                tracing::info!("shutting down");
                return Ok(());
            }
            changed = phases.changed() => {
                changed.context("Session stopped")?;
                let phase = *phases.borrow_and_update();
                println!("Session {phase}");
                if phase == SessionPhase::Idle {
                    anyhow::bail!("Connection lost");
                }
            }
        }
    }
}
