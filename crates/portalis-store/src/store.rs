//! The bridge's persistent state, owned by the process and shared as
//! `Arc<BridgeStore>`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use portalis_shared::constants::{
    MESSAGES_FILE, NEXT_BATCH_FILE, PORTALS_FILE, PUPPETS_FILE, USERS_FILE,
};
use portalis_shared::{MatrixEventId, MatrixUserId, WhatsAppId, WhatsAppMessageId};

use crate::collection::Collection;
use crate::cursor::{self, SyncToken};
use crate::error::Result;
use crate::index::Entity;
use crate::models::{Message, MessageKey, Portal, PortalKey, Puppet, User};
use crate::reconcile::ReconcileStats;

/// Where each collection lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub users: PathBuf,
    pub portals: PathBuf,
    pub puppets: PathBuf,
    pub messages: PathBuf,
    pub next_batch: PathBuf,
}

impl StorePaths {
    /// Default file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            users: dir.join(USERS_FILE),
            portals: dir.join(PORTALS_FILE),
            puppets: dir.join(PUPPETS_FILE),
            messages: dir.join(MESSAGES_FILE),
            next_batch: dir.join(NEXT_BATCH_FILE),
        }
    }
}

/// Summary of a startup load.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub users: ReconcileStats,
    pub portals: ReconcileStats,
    pub puppets: ReconcileStats,
    pub messages: ReconcileStats,
    pub full_resync: bool,
}

pub struct BridgeStore {
    users: Collection<User>,
    portals: Collection<Portal>,
    puppets: Collection<Puppet>,
    messages: Collection<Message>,
    next_batch_path: PathBuf,
    next_batch: watch::Sender<SyncToken>,
}

impl BridgeStore {
    pub fn new(paths: StorePaths) -> Self {
        let (next_batch, _) = watch::channel(SyncToken::default());
        Self {
            users: Collection::new(paths.users),
            portals: Collection::new(paths.portals),
            puppets: Collection::new(paths.puppets),
            messages: Collection::new(paths.messages),
            next_batch_path: paths.next_batch,
            next_batch,
        }
    }

    pub fn shared(paths: StorePaths) -> Arc<Self> {
        Arc::new(Self::new(paths))
    }

    pub fn users(&self) -> &Collection<User> {
        &self.users
    }

    pub fn portals(&self) -> &Collection<Portal> {
        &self.portals
    }

    pub fn puppets(&self) -> &Collection<Puppet> {
        &self.puppets
    }

    pub fn messages(&self) -> &Collection<Message> {
        &self.messages
    }

    // -- Startup ------------------------------------------------------------

    /// Load every collection and the sync token. Any error means the bridge
    /// must not start.
    pub async fn load_all(&self) -> Result<LoadSummary> {
        let summary = LoadSummary {
            users: self.load_users().await?,
            portals: self.load_portals().await?,
            puppets: self.load_puppets().await?,
            messages: self.load_messages().await?,
            full_resync: self.load_next_batch().await?.needs_full_resync(),
        };
        info!(
            users = self.users.len().await,
            portals = self.portals.len().await,
            puppets = self.puppets.len().await,
            messages = self.messages.len().await,
            full_resync = summary.full_resync,
            "Bridge state loaded"
        );
        Ok(summary)
    }

    pub async fn load_users(&self) -> Result<ReconcileStats> {
        self.users.load().await
    }

    pub async fn load_portals(&self) -> Result<ReconcileStats> {
        self.portals.load().await
    }

    pub async fn load_puppets(&self) -> Result<ReconcileStats> {
        self.puppets.load().await
    }

    pub async fn load_messages(&self) -> Result<ReconcileStats> {
        self.messages.load().await
    }

    // -- Explicit saves -----------------------------------------------------

    pub async fn save_users(&self) -> Result<usize> {
        self.users.save().await
    }

    pub async fn save_portals(&self) -> Result<usize> {
        self.portals.save().await
    }

    pub async fn save_puppets(&self) -> Result<usize> {
        self.puppets.save().await
    }

    pub async fn save_messages(&self) -> Result<usize> {
        self.messages.save().await
    }

    // -- Sync token ---------------------------------------------------------

    pub fn next_batch(&self) -> SyncToken {
        self.next_batch.borrow().clone()
    }

    pub fn set_next_batch(&self, token: impl Into<SyncToken>) {
        self.next_batch.send_replace(token.into());
    }

    /// Read the token from disk and make it current.
    pub async fn load_next_batch(&self) -> Result<SyncToken> {
        let path = self.next_batch_path.clone();
        let token = tokio::task::spawn_blocking(move || cursor::load(&path)).await??;
        self.next_batch.send_replace(token.clone());
        Ok(token)
    }

    /// Write the current token to disk, returning the value written.
    pub async fn save_next_batch(&self) -> Result<SyncToken> {
        let token = self.next_batch();
        let path = self.next_batch_path.clone();
        let written = token.clone();
        tokio::task::spawn_blocking(move || cursor::save(&path, &written)).await??;
        debug!(token = %token, "Sync token saved");
        Ok(token)
    }

    // -- Bridge lookups -----------------------------------------------------

    /// The user for `mxid`, created on first contact.
    pub async fn user_or_create(&self, mxid: &MatrixUserId) -> Arc<Entity<User>> {
        self.users
            .get_or_create(mxid, || User::new(mxid.clone()))
            .await
    }

    pub async fn user_by_jid(&self, jid: &WhatsAppId) -> Option<Arc<Entity<User>>> {
        self.users.get_by_secondary(jid).await
    }

    /// The portal for `key`, created on first contact with the chat.
    pub async fn portal_or_create(&self, key: &PortalKey) -> Arc<Entity<Portal>> {
        self.portals
            .get_or_create(key, || Portal::new(key.clone()))
            .await
    }

    pub async fn puppet_or_create(&self, jid: &WhatsAppId) -> Arc<Entity<Puppet>> {
        self.puppets
            .get_or_create(jid, || Puppet::new(jid.clone()))
            .await
    }

    pub async fn puppet_by_custom_mxid(&self, mxid: &MatrixUserId) -> Option<Arc<Entity<Puppet>>> {
        self.puppets.get_by_secondary(mxid).await
    }

    // -- Messages -----------------------------------------------------------

    pub async fn save_message(&self, message: Message) -> Arc<Entity<Message>> {
        self.messages.upsert(message).await
    }

    pub async fn delete_message(&self, chat: &PortalKey, jid: &WhatsAppMessageId) -> bool {
        let key = MessageKey {
            chat: chat.clone(),
            jid: jid.clone(),
        };
        self.messages.remove(&key).await.is_some()
    }

    pub async fn message_by_mxid(&self, mxid: &MatrixEventId) -> Option<Message> {
        let entity = self.messages.get_by_secondary(mxid).await?;
        let message = entity.snapshot().await;
        Some(message)
    }

    pub async fn message_by_jid(
        &self,
        chat: &PortalKey,
        jid: &WhatsAppMessageId,
    ) -> Option<Message> {
        let key = MessageKey {
            chat: chat.clone(),
            jid: jid.clone(),
        };
        let entity = self.messages.get(&key).await?;
        let message = entity.snapshot().await;
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use portalis_shared::MatrixRoomId;
    use tempfile::TempDir;

    fn jid(s: &str) -> WhatsAppId {
        WhatsAppId::parse(s).unwrap()
    }

    fn message(chat: &PortalKey, id: &str, event: &str) -> Message {
        Message {
            chat: chat.clone(),
            jid: WhatsAppMessageId::parse(id).unwrap(),
            mxid: MatrixEventId::parse(event).unwrap(),
            sender: jid("bob@s.whatsapp.net"),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_paths_in_dir() {
        let paths = StorePaths::in_dir(Path::new("/var/lib/portalis"));
        assert_eq!(paths.users, PathBuf::from("/var/lib/portalis/users.snap"));
        assert_eq!(paths.next_batch, PathBuf::from("/var/lib/portalis/next_batch"));
    }

    #[tokio::test]
    async fn test_load_all_from_empty_dir() {
        let dir = TempDir::new().unwrap();
        let store = BridgeStore::new(StorePaths::in_dir(dir.path()));
        let summary = store.load_all().await.unwrap();
        assert!(summary.full_resync);
        assert_eq!(summary.users, ReconcileStats::default());
        assert!(store.next_batch().is_empty());
    }

    #[tokio::test]
    async fn test_load_all_fails_on_corrupt_collection() {
        let dir = TempDir::new().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        std::fs::write(&paths.portals, b"garbage").unwrap();

        let store = BridgeStore::new(paths);
        let err = store.load_all().await.unwrap_err();
        assert!(err.is_corrupt());
    }

    #[tokio::test]
    async fn test_next_batch_round_trip() {
        let dir = TempDir::new().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        let store = BridgeStore::new(paths.clone());
        store.set_next_batch("t1");
        assert_eq!(store.save_next_batch().await.unwrap().as_str(), "t1");

        let restarted = BridgeStore::new(paths);
        assert_eq!(restarted.load_next_batch().await.unwrap().as_str(), "t1");
        assert_eq!(restarted.next_batch().as_str(), "t1");
    }

    #[tokio::test]
    async fn test_portal_or_create_is_stable() {
        let dir = TempDir::new().unwrap();
        let store = BridgeStore::new(StorePaths::in_dir(dir.path()));
        let key = PortalKey::new(jid("123@g.us"), jid("alice@s.whatsapp.net"));
        let a = store.portal_or_create(&key).await;
        let b = store
            .portal_or_create(&PortalKey::group(jid("123@g.us")))
            .await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(store.portals().is_dirty());
    }

    #[tokio::test]
    async fn test_message_lookups() {
        let dir = TempDir::new().unwrap();
        let store = BridgeStore::new(StorePaths::in_dir(dir.path()));
        let chat = PortalKey::group(jid("123@g.us"));
        let msg = message(&chat, "3EB0ABCD", "$event:hs");
        store.save_message(msg.clone()).await;

        let by_mxid = store
            .message_by_mxid(&MatrixEventId::parse("$event:hs").unwrap())
            .await
            .unwrap();
        assert_eq!(by_mxid, msg);
        let by_jid = store.message_by_jid(&chat, &msg.jid).await.unwrap();
        assert_eq!(by_jid, msg);

        // Same WhatsApp ID in another chat is a different message.
        let other = PortalKey::group(jid("456@g.us"));
        assert!(store.message_by_jid(&other, &msg.jid).await.is_none());

        assert!(store.delete_message(&chat, &msg.jid).await);
        assert!(store.message_by_mxid(&msg.mxid).await.is_none());
        assert!(!store.delete_message(&chat, &msg.jid).await);
    }

    #[tokio::test]
    async fn test_lookups_by_secondary_keys() {
        let dir = TempDir::new().unwrap();
        let store = BridgeStore::new(StorePaths::in_dir(dir.path()));
        let alice = MatrixUserId::parse("@alice:hs").unwrap();
        store.user_or_create(&alice).await;
        store
            .users()
            .update(&alice, |u| {
                u.jid = Some(jid("alice@s.whatsapp.net"));
                u.management_room = Some(MatrixRoomId::parse("!mgmt:hs").unwrap());
            })
            .await
            .unwrap();

        let user = store.user_by_jid(&jid("alice@s.whatsapp.net")).await.unwrap();
        assert_eq!(user.read().await.mxid, alice);

        let puppet_jid = jid("bob@s.whatsapp.net");
        store.puppet_or_create(&puppet_jid).await;
        assert!(store.puppet_by_custom_mxid(&alice).await.is_none());
        store
            .puppets()
            .update(&puppet_jid, |p| p.custom_mxid = Some(alice.clone()))
            .await
            .unwrap();
        assert!(store.puppet_by_custom_mxid(&alice).await.is_some());
    }
}
