//! OnboardingStoryCoordinator — makes sure the onboarding story is downloaded
//! and shown once per account, and removed once the user has viewed it.
//!
//! Flow:
//! 1. `download_onboarding_story()` — cheap entry point, safe to call at any
//!    time and any number of times. Cleans up if the story was already viewed,
//!    otherwise schedules an account sync followed by the continuation.
//! 2. `continue_downloading_onboarding_story()` — re-validates state, fetches
//!    the manifest and images, ingests attachments, persists the messages and
//!    commits the story record.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::attachments::{AttachmentInput, AttachmentProcessor, ProcessedAttachment};
use crate::config::StoryConfig;
use crate::error::{Result, StoryError, SyncError};
use crate::locale::LocaleProvider;
use crate::store::traits::{
    ConversationProvider, MessageWriter, StoryCleanup, StoryStore, SystemConversation,
};
use crate::story::manifest::LocaleFallback;
use crate::story::message::build_story_messages;
use crate::story::state::{StoryPhase, StoryRecord};
use crate::transport::{AccountSync, StoryTransport};

/// Default broadcast channel capacity.
const DEFAULT_EVENT_CAPACITY: usize = 16;

/// Collaborators the coordinator drives.
#[derive(Clone)]
pub struct StoryDeps {
    pub store: Arc<dyn StoryStore>,
    pub sync: Arc<dyn AccountSync>,
    pub attachments: Arc<dyn AttachmentProcessor>,
    pub conversations: Arc<dyn ConversationProvider>,
    pub writer: Arc<dyn MessageWriter>,
    pub cleanup: Arc<dyn StoryCleanup>,
    pub locale: Arc<dyn LocaleProvider>,
}

/// Tunables for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub locale_fallback: LocaleFallback,
    pub sync_timeout: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            locale_fallback: LocaleFallback::Strict,
            sync_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&StoryConfig> for CoordinatorSettings {
    fn from(config: &StoryConfig) -> Self {
        Self {
            locale_fallback: config.locale_fallback,
            sync_timeout: config.sync_timeout,
        }
    }
}

/// Change notifications for live views of the story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoryEvent {
    MessagesAdded {
        conversation_id: Uuid,
        message_ids: Vec<Uuid>,
    },
    StoryCleanedUp,
}

/// How a continuation run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoryOutcome {
    /// The user viewed the story (possibly on another device); local copy removed.
    ViewedElsewhere,
    /// A previous run already committed the story.
    AlreadyDownloaded { message_ids: Vec<Uuid> },
    /// The story was removed earlier on this device.
    AlreadyDeleted,
    /// This run downloaded and committed the story.
    Downloaded { message_ids: Vec<Uuid> },
}

/// What the entry point did.
#[derive(Debug)]
pub enum DownloadTrigger {
    /// Story already viewed; cleanup ran inline.
    CleanedUp,
    /// Story already viewed; cleanup queued behind a running continuation.
    CleanupScheduled(JoinHandle<Result<()>>),
    /// A sync + continuation is already in flight for this coordinator.
    AlreadyPending,
    /// Sync + continuation scheduled on the runtime.
    Scheduled(JoinHandle<Result<StoryOutcome>>),
}

/// Clears the in-flight flag when the scheduled task ends, however it ends.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Coordinates the onboarding story workflow.
pub struct OnboardingStoryCoordinator {
    deps: StoryDeps,
    settings: CoordinatorSettings,
    transport: RwLock<Option<Arc<dyn StoryTransport>>>,
    /// Held for the whole continuation: at most one run at a time.
    run_lock: Mutex<()>,
    sync_in_flight: Arc<AtomicBool>,
    events: broadcast::Sender<StoryEvent>,
}

impl OnboardingStoryCoordinator {
    /// Create a coordinator without a transport; see `attach_transport`.
    pub fn new(deps: StoryDeps, settings: CoordinatorSettings) -> Arc<Self> {
        let (events, _rx) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Arc::new(Self {
            deps,
            settings,
            transport: RwLock::new(None),
            run_lock: Mutex::new(()),
            sync_in_flight: Arc::new(AtomicBool::new(false)),
            events,
        })
    }

    /// Install (or replace) the story transport.
    pub async fn attach_transport(&self, transport: Arc<dyn StoryTransport>) {
        *self.transport.write().await = Some(transport);
    }

    /// Subscribe to story change events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoryEvent> {
        self.events.subscribe()
    }

    /// Entry point. Never waits on the network.
    pub async fn download_onboarding_story(self: &Arc<Self>) -> Result<DownloadTrigger> {
        if self.deps.store.has_viewed().await? {
            let Ok(_run) = self.run_lock.try_lock() else {
                info!("Onboarding story already viewed, cleanup queued behind running download");
                let this = Arc::clone(self);
                return Ok(DownloadTrigger::CleanupScheduled(tokio::spawn(async move {
                    this.cleanup().await
                })));
            };
            info!("Onboarding story already viewed, running cleanup");
            self.cleanup_locked().await?;
            return Ok(DownloadTrigger::CleanedUp);
        }

        if self.sync_in_flight.swap(true, Ordering::AcqRel) {
            debug!("Onboarding story sync already in flight");
            return Ok(DownloadTrigger::AlreadyPending);
        }
        let in_flight = InFlightGuard(Arc::clone(&self.sync_in_flight));

        self.mark_sync_pending().await?;

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let _in_flight = in_flight;
            let result = this.sync_then_continue().await;
            match &result {
                Ok(outcome) => debug!(?outcome, "Onboarding story run finished"),
                Err(e) => warn!(error = %e, "Onboarding story download failed, will retry next launch"),
            }
            result
        });
        Ok(DownloadTrigger::Scheduled(handle))
    }

    /// Continuation, run after the account sync completes.
    pub async fn continue_downloading_onboarding_story(&self) -> Result<StoryOutcome> {
        let _run = self.run_lock.lock().await;

        let transport = self
            .transport
            .read()
            .await
            .clone()
            .ok_or(StoryError::TransportNotInitialized)?;

        if self.deps.store.has_viewed().await? {
            info!("Onboarding story viewed elsewhere, running cleanup");
            self.cleanup_locked().await?;
            return Ok(StoryOutcome::ViewedElsewhere);
        }

        let record = self.deps.store.load_record().await?.unwrap_or_default();
        if let Some(ids) = record.committed_message_ids() {
            info!(count = ids.len(), "Onboarding story already downloaded");
            return Ok(StoryOutcome::AlreadyDownloaded {
                message_ids: ids.to_vec(),
            });
        }
        if record.phase == StoryPhase::Deleted {
            debug!("Onboarding story already deleted");
            return Ok(StoryOutcome::AlreadyDeleted);
        }
        if let Some(orphans) = record.orphaned_message_ids() {
            let orphans = orphans.to_vec();
            let removed = self.deps.writer.delete_messages(&orphans).await?;
            self.discard_files(record.orphaned_attachment_paths()).await;
            warn!(
                provisional = orphans.len(),
                removed, "Removed messages left by an interrupted download"
            );
        }

        let locale = self.deps.locale.active_locale();
        let manifest = transport.get_manifest().await?;
        let filenames = manifest
            .resolve_filenames(&locale, self.settings.locale_fallback)?
            .to_vec();
        info!(
            version = %manifest.version,
            locale = %locale,
            images = filenames.len(),
            "Downloading onboarding story"
        );

        let images = transport
            .download_images(&manifest.version, &filenames)
            .await?;
        if images.len() != filenames.len() {
            return Err(StoryError::ImageCountMismatch {
                expected: filenames.len(),
                actual: images.len(),
            }
            .into());
        }

        let mut attachments = Vec::with_capacity(images.len());
        let mut failure = None;
        let processed = join_all(
            images
                .into_iter()
                .map(|data| self.deps.attachments.process(AttachmentInput::jpeg(data))),
        )
        .await;
        for result in processed {
            match result {
                Ok(attachment) => attachments.push(attachment),
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        let paths: Vec<PathBuf> = attachments.iter().map(|a| a.path.clone()).collect();
        if let Some(e) = failure {
            self.discard_files(&paths).await;
            return Err(e.into());
        }

        let result = self
            .persist_and_commit(record, attachments, paths.clone(), manifest.version)
            .await;
        if result.is_err() {
            self.discard_files(&paths).await;
        }
        result
    }

    /// Write the provisional record and the batch, then commit. Runs under `run_lock`.
    async fn persist_and_commit(
        &self,
        mut record: StoryRecord,
        attachments: Vec<ProcessedAttachment>,
        paths: Vec<PathBuf>,
        version: String,
    ) -> Result<StoryOutcome> {
        let conversation = self
            .deps
            .conversations
            .get_or_create_system_conversation()
            .await?;
        let messages =
            build_story_messages(&conversation, attachments, Utc::now().timestamp_millis());
        let message_ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();

        // Provisional ids and files first, so a failed batch can be cleaned up next run.
        record.transition(
            StoryPhase::Downloading,
            message_ids.clone(),
            Some(version.clone()),
        )?;
        record.attachment_paths = paths.clone();
        self.deps.store.save_record(&record).await?;

        self.deps.writer.save_messages(&messages).await?;

        // The record and the view flag may have changed while the batch was written.
        let mut current = self.deps.store.load_record().await?.unwrap_or_default();
        match current.phase {
            StoryPhase::Downloaded => {
                self.discard_batch(&message_ids, &paths).await?;
                warn!("Onboarding story committed concurrently, discarded duplicate batch");
                return Ok(StoryOutcome::AlreadyDownloaded {
                    message_ids: current.message_ids,
                });
            }
            StoryPhase::Deleted => {
                self.discard_batch(&message_ids, &paths).await?;
                info!("Onboarding story deleted during download, discarded batch");
                return Ok(StoryOutcome::AlreadyDeleted);
            }
            StoryPhase::Downloading if current.message_ids == message_ids => {}
            other => {
                self.discard_batch(&message_ids, &paths).await?;
                return Err(StoryError::InvalidTransition {
                    from: other.to_string(),
                    to: StoryPhase::Downloaded.to_string(),
                }
                .into());
            }
        }
        if self.deps.store.has_viewed().await? {
            self.discard_batch(&message_ids, &paths).await?;
            info!("Onboarding story viewed during download, discarded batch");
            self.cleanup_locked().await?;
            return Ok(StoryOutcome::ViewedElsewhere);
        }

        current.transition(StoryPhase::Downloaded, message_ids.clone(), Some(version))?;
        self.deps.store.save_record(&current).await?;
        info!(count = message_ids.len(), "Onboarding story downloaded");

        self.notify_added(&conversation, &message_ids);
        Ok(StoryOutcome::Downloaded { message_ids })
    }

    fn notify_added(&self, conversation: &SystemConversation, message_ids: &[Uuid]) {
        // Ok if nobody is listening.
        let _ = self.events.send(StoryEvent::MessagesAdded {
            conversation_id: conversation.id,
            message_ids: message_ids.to_vec(),
        });
    }

    /// Remove this run's messages and their files.
    async fn discard_batch(&self, message_ids: &[Uuid], paths: &[PathBuf]) -> Result<()> {
        self.deps.writer.delete_messages(message_ids).await?;
        self.discard_files(paths).await;
        Ok(())
    }

    async fn discard_files(&self, paths: &[PathBuf]) {
        for path in paths {
            if let Err(e) = self.deps.attachments.discard(path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove story attachment");
            }
        }
    }

    async fn sync_then_continue(&self) -> Result<StoryOutcome> {
        let timeout = self.settings.sync_timeout;
        match tokio::time::timeout(timeout, self.deps.sync.run_sync()).await {
            Ok(synced) => synced?,
            Err(_) => return Err(SyncError::Timeout(timeout).into()),
        }
        self.continue_downloading_onboarding_story().await
    }

    async fn mark_sync_pending(&self) -> Result<()> {
        // A running continuation owns the record.
        let Ok(_run) = self.run_lock.try_lock() else {
            debug!("Onboarding story continuation running, record left as is");
            return Ok(());
        };
        let mut record = self.deps.store.load_record().await?.unwrap_or_default();
        if record.phase == StoryPhase::NotStarted {
            record.transition(StoryPhase::SyncPending, Vec::new(), None)?;
            self.deps.store.save_record(&record).await?;
        }
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        let _run = self.run_lock.lock().await;
        self.cleanup_locked().await
    }

    /// Cleanup for callers already holding `run_lock`.
    async fn cleanup_locked(&self) -> Result<()> {
        self.deps.cleanup.find_and_delete_if_exists().await?;
        let _ = self.events.send(StoryEvent::StoryCleanedUp);
        Ok(())
    }
}
