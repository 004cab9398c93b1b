use std::sync::Arc;

use anyhow::Context;

use onboarding_story::attachments::LocalAttachmentProcessor;
use onboarding_story::config::StoryConfig;
use onboarding_story::locale::EnvLocaleProvider;
use onboarding_story::store::{LibSqlBackend, StoryCleanup, StoryStore};
use onboarding_story::story::{
    CoordinatorSettings, DownloadTrigger, OnboardingStoryCoordinator, StoryDeps,
};
use onboarding_story::transport::{
    AccountSync, HttpAccountSync, HttpStoryTransport, NoopAccountSync,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let command = std::env::args().nth(1).unwrap_or_else(|| "download".to_string());
    let config = StoryConfig::from_env().context("invalid configuration")?;

    let db = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );

    match command.as_str() {
        "download" => download(&config, db).await,
        "status" => status(db).await,
        "cleanup" => {
            db.find_and_delete_if_exists().await?;
            eprintln!("Cleanup complete");
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!("Usage: onboarding-story [download|status|cleanup]");
            std::process::exit(2);
        }
    }
}

async fn download(config: &StoryConfig, db: Arc<LibSqlBackend>) -> anyhow::Result<()> {
    let sync: Arc<dyn AccountSync> = match &config.account_url {
        Some(url) => Arc::new(HttpAccountSync::new(
            url,
            config.account_token.clone(),
            config.http_timeout,
            db.clone(),
        )),
        None => Arc::new(NoopAccountSync),
    };

    let deps = StoryDeps {
        store: db.clone(),
        sync,
        attachments: Arc::new(LocalAttachmentProcessor::new(&config.attachments_dir)),
        conversations: db.clone(),
        writer: db.clone(),
        cleanup: db.clone(),
        locale: Arc::new(EnvLocaleProvider),
    };
    let coordinator = OnboardingStoryCoordinator::new(deps, CoordinatorSettings::from(config));

    if let Some(cdn_url) = &config.cdn_url {
        coordinator
            .attach_transport(Arc::new(HttpStoryTransport::new(cdn_url, config.http_timeout)))
            .await;
    }

    match coordinator.download_onboarding_story().await? {
        DownloadTrigger::CleanedUp => eprintln!("Onboarding story already viewed; cleaned up"),
        DownloadTrigger::CleanupScheduled(handle) => {
            handle.await.context("onboarding story cleanup panicked")??;
            eprintln!("Onboarding story already viewed; cleaned up after running download");
        }
        DownloadTrigger::AlreadyPending => eprintln!("Onboarding story download already pending"),
        DownloadTrigger::Scheduled(handle) => {
            let outcome = handle.await.context("onboarding story task panicked")??;
            eprintln!("Onboarding story: {outcome:?}");
        }
    }
    Ok(())
}

async fn status(db: Arc<LibSqlBackend>) -> anyhow::Result<()> {
    let viewed = db.has_viewed().await?;
    let record = db.load_record().await?;
    let messages = db.count_story_messages().await?;

    println!("hasViewedOnboardingStory: {viewed}");
    match record {
        Some(record) => println!("record: {}", serde_json::to_string_pretty(&record)?),
        None => println!("record: none"),
    }
    println!("story messages: {messages}");
    Ok(())
}
