use anyhow::{Context, Result};
use plaza_client::logging;
use plaza_client::models::Post;
use plaza_client::realtime::ConnectionState;
use plaza_client::{ClientConfig, PlazaClient};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var("PLAZA_CONFIG").ok().map(PathBuf::from);
    let config = ClientConfig::load(config_path.as_deref()).context("load configuration")?;
    logging::init_tracing(config.log_format);

    let client = PlazaClient::new(config).context("build client")?;

    if !client.session().is_authenticated() {
        let email = std::env::var("PLAZA_EMAIL").context("PLAZA_EMAIL is required to sign in")?;
        let password = std::env::var("PLAZA_PASSWORD").context("PLAZA_PASSWORD is required to sign in")?;
        client.login(&email, &password).await.context("sign in")?;
    }

    if let Some(profile) = client.profile().ensure_loaded().await.context("load profile")? {
        tracing::info!(
            profile_id = %profile.id,
            name = profile.full_name.as_deref().unwrap_or(""),
            "Signed in"
        );
    }

    let feed = client.home_feed();
    feed.ensure_initialized().await.context("load home feed")?;
    for post in feed.posts() {
        print_post(&post);
    }

    let Ok(peer) = std::env::var("PLAZA_CHAT_PEER") else {
        return Ok(());
    };
    let peer: Uuid = peer.parse().context("PLAZA_CHAT_PEER must be a UUID")?;
    stream_conversation(&client, peer).await
}

fn print_post(post: &Post) {
    let author = post
        .author
        .as_ref()
        .map(|a| a.display_name().to_string())
        .unwrap_or_else(|| "Anonymous".to_string());
    println!(
        "{author}: {} [{} likes, {} comments]",
        post.content,
        post.like_count(),
        post.comments.len()
    );
}

async fn stream_conversation(client: &PlazaClient, peer: Uuid) -> Result<()> {
    let channel = client.channel();
    channel.connect();

    let conversation = channel.select_conversation(peer).await.context("open conversation")?;
    tracing::info!(conversation_id = ?conversation.id, %peer, "Streaming conversation, ctrl-c to stop");
    for message in channel.messages() {
        println!("[{}] {}", message.timestamp.format("%H:%M"), message.content);
    }

    let mut incoming = channel.incoming();
    let mut connection = channel.watch_connection();
    loop {
        tokio::select! {
            received = incoming.recv() => match received {
                Ok(message) => println!("[{}] {}", message.timestamp.format("%H:%M"), message.content),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Fell behind the conversation"),
                Err(RecvError::Closed) => break,
            },
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                if *connection.borrow_and_update() == ConnectionState::Connecting {
                    tracing::info!("Connecting to chat...");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    channel.teardown();
    Ok(())
}
