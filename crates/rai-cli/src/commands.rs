//! Command handlers

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use rai_core::auth::{AvatarUpload, ProfileUpdate};
use rai_core::push::{SimulatedPushPlatform, TestNotification};
use rai_core::worker::SimulatedHost;
use rai_core::{
    AuthService, AuthenticatedClient, BackgroundWorkerRuntime, ClientConfig, ForegroundNotifier,
    PushBroadcaster, PushSubscriptionManager, SessionStore,
};

use crate::Commands;

pub async fn run(command: Commands, config: ClientConfig) -> Result<()> {
    let session = SessionStore::open(config.session_path());
    let client = AuthenticatedClient::new(&config, session.clone())?;
    let auth = AuthService::new(client.clone());

    match command {
        Commands::Login { username, password } => {
            let password = password_or_prompt(password)?;
            let user = auth.login(&username, &password).await?;
            println!("Signed in as {}", user.username);
        }
        Commands::Register {
            username,
            email,
            password,
        } => {
            let password = password_or_prompt(password)?;
            let user = auth.register(&username, &email, &password).await?;
            println!("Registered and signed in as {}", user.username);
        }
        Commands::Logout => {
            auth.logout()?;
            println!("Signed out");
        }
        Commands::Whoami => {
            if !auth.is_authenticated() {
                bail!("Not signed in");
            }
            let profile = auth.sync_profile().await?;
            println!("username:  {}", profile.username.unwrap_or_default());
            println!("email:     {}", profile.email.unwrap_or_default());
            println!("avatar:    {}", profile.avatar_url.unwrap_or_else(|| "-".into()));
            println!("moderator: {}", profile.is_moderator);
        }
        Commands::Status => {
            let snapshot = session.snapshot();
            println!("server:        {}", config.base_url());
            println!("session file:  {}", config.session_path().display());
            println!("signed in:     {}", snapshot.is_authenticated());
            if let Some(username) = snapshot.username {
                println!("username:      {}", username);
            }
            println!("moderator:     {}", snapshot.is_moderator);
            println!("unread:        {}", snapshot.has_unread_notifications);
            println!("refresh mode:  {:?}", client.refresh_mode());
        }
        Commands::UpdateProfile {
            username,
            email,
            password,
            avatar,
            remove_avatar,
        } => {
            let avatar = avatar.as_deref().map(read_avatar).transpose()?;
            let update = ProfileUpdate {
                username,
                email,
                password,
                remove_avatar,
                avatar,
            };
            let user = auth.update_profile(&update).await?;
            println!("Profile updated for {}", user.username);
        }
        Commands::Subscriptions => {
            let manager = PushSubscriptionManager::new(
                client,
                Arc::new(SimulatedPushPlatform::new()),
                config.worker_script.clone(),
            );
            let items = manager.list_subscriptions().await?;
            if items.is_empty() {
                println!("No push subscriptions");
            }
            for item in items {
                println!(
                    "#{:<5} {}  (updated {})",
                    item.id,
                    item.endpoint,
                    item.updated_at.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Notify {
            kind,
            title,
            body,
            url,
        } => {
            let manager = PushSubscriptionManager::new(
                client,
                Arc::new(SimulatedPushPlatform::new()),
                config.worker_script.clone(),
            );
            let notification = TestNotification::new(kind, title, body).with_url(url);
            let report = manager.send_test_notification(&notification).await?;
            println!(
                "Sent {} / failed {} / removed {}",
                report.delivery.sent, report.delivery.failed, report.delivery.removed
            );
            for error in report.delivery.errors {
                println!("  {}", error);
            }
        }
        Commands::PushCheck { payload } => {
            push_check(client, session, &config, payload.into_bytes()).await?;
        }
        Commands::MarkRead => {
            ForegroundNotifier::new(session).mark_read()?;
            println!("Notifications marked as read");
        }
    }

    Ok(())
}

/// Run the whole push pipeline in-process against the configured backend.
async fn push_check(
    client: AuthenticatedClient,
    session: SessionStore,
    config: &ClientConfig,
    payload: Vec<u8>,
) -> Result<()> {
    let host = Arc::new(SimulatedHost::new());
    host.add_window("/", true, false);
    let broadcaster = PushBroadcaster::new();
    let (worker, worker_task) =
        BackgroundWorkerRuntime::spawn(host.clone(), host.clone(), broadcaster.clone());

    let notifier = Arc::new(ForegroundNotifier::new(session));
    let listener = notifier.clone().listen(broadcaster.subscribe());
    let mut badge = notifier.badge();

    let platform = Arc::new(SimulatedPushPlatform::new().with_worker(worker.clone()));
    let manager =
        PushSubscriptionManager::new(client, platform.clone(), config.worker_script.clone());

    let subscription = manager.subscribe().await?;
    println!("Subscribed: {}", subscription.endpoint);

    let delivered = platform.deliver(Some(payload)).await?;
    if delivered {
        badge
            .wait_for(|unread| *unread)
            .await
            .context("Foreground listener stopped")?;
    }
    for shown in host.notifications() {
        println!(
            "Notification: {} - {} ({})",
            shown.title, shown.options.body, shown.options.data.url
        );
    }
    println!("Unread indicator: {}", *badge.borrow());

    manager.unsubscribe().await?;
    println!("Unsubscribed");

    drop(platform);
    drop(manager);
    drop(worker);
    drop(broadcaster);
    worker_task.await.context("Worker task failed")?;
    listener.await.context("Listener task failed")?;
    Ok(())
}

fn password_or_prompt(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    eprint!("Password: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("Password is required");
    }
    Ok(password)
}

fn read_avatar(path: &Path) -> Result<AvatarUpload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "avatar".to_string());
    Ok(AvatarUpload {
        file_name,
        bytes,
        mime: mime_guess::from_path(path).first().map(|mime| mime.to_string()),
    })
}
