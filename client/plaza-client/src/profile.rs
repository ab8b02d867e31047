//! Current user's profile and the profile directory
//!
//! The profile is fetched once per signed-in account and cached in durable
//! storage so it is available before the network answers on the next start.

use crate::api::ProfileApi;
use crate::media::{MediaUploader, UploadFile};
use crate::models::{PageRequest, Profile, ProfileUpdate};
use crate::session::SessionStore;
use crate::storage::{KeyValueStore, StorageKey};
use error_types::{ClientError, ClientResult};
use parking_lot::RwLock;
use resilience::Debouncer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Tunables taken from the client configuration
#[derive(Debug, Clone)]
pub struct DirectoryOptions {
    pub suggestions_page_size: u32,
    pub min_search_len: usize,
    pub search_debounce: Duration,
}

impl Default for DirectoryOptions {
    fn default() -> Self {
        Self {
            suggestions_page_size: 10,
            min_search_len: 3,
            search_debounce: Duration::from_millis(300),
        }
    }
}

pub struct ProfileStore {
    api: Arc<dyn ProfileApi>,
    uploader: Arc<MediaUploader>,
    session: Arc<SessionStore>,
    storage: Arc<dyn KeyValueStore>,
    profile: RwLock<Option<Profile>>,
    /// Account whose profile has been fetched from the backend
    fetched_for: RwLock<Option<Uuid>>,
    search: Debouncer,
    options: DirectoryOptions,
}

impl ProfileStore {
    /// Build the store, restoring any cached profile
    pub fn restore(
        api: Arc<dyn ProfileApi>,
        uploader: Arc<MediaUploader>,
        session: Arc<SessionStore>,
        storage: Arc<dyn KeyValueStore>,
        options: DirectoryOptions,
    ) -> ClientResult<Self> {
        let profile: Option<Profile> = if session.is_authenticated() {
            storage.load(StorageKey::Profile)?
        } else {
            None
        };

        Ok(Self {
            api,
            uploader,
            session,
            storage,
            profile: RwLock::new(profile),
            fetched_for: RwLock::new(None),
            search: Debouncer::new(options.search_debounce),
            options,
        })
    }

    pub fn current(&self) -> Option<Profile> {
        self.profile.read().clone()
    }

    /// Fetch the profile unless it was already fetched for this account
    pub async fn ensure_loaded(&self) -> ClientResult<Option<Profile>> {
        let Some(account_id) = self.session.account_id() else {
            return Ok(None);
        };
        if *self.fetched_for.read() == Some(account_id) {
            return Ok(self.current());
        }
        self.refresh().await.map(Some)
    }

    pub async fn refresh(&self) -> ClientResult<Profile> {
        let account = self.session.require("load a profile")?;
        let profile = self.api.current_profile().await?;

        self.store(profile.clone())?;
        *self.fetched_for.write() = Some(account.id);
        debug!(profile_id = %profile.id, "Profile refreshed");
        Ok(profile)
    }

    pub async fn update(&self, update: ProfileUpdate) -> ClientResult<Profile> {
        self.session.require("update a profile")?;

        let profile = match self.api.update_profile(&update).await? {
            Some(profile) => profile,
            None => {
                let mut cached = self
                    .current()
                    .ok_or_else(|| ClientError::validation("Profile has not been loaded"))?;
                update.apply_to(&mut cached);
                cached
            }
        };

        self.store(profile.clone())?;
        info!(profile_id = %profile.id, "Profile updated");
        Ok(profile)
    }

    /// Presign, upload, then point the profile picture at the new key
    pub async fn upload_avatar(&self, file: UploadFile) -> ClientResult<Profile> {
        self.session.require("change the avatar")?;
        if !file.is_image() {
            return Err(ClientError::validation(format!(
                "Avatar must be an image, got {}",
                file.content_type
            )));
        }
        let profile_id = match self.current() {
            Some(profile) => profile.id,
            None => self.refresh().await?.id,
        };

        let target = self.api.avatar_presign(&file.presign_request(None)).await?;
        self.uploader.put(&file, &target).await?;

        let mut update = ProfileUpdate::for_profile(profile_id);
        update.profile_pic = Some(target.key);
        self.update(update).await
    }

    /// First page of profiles to suggest, excluding the current user
    pub async fn suggestions(&self) -> ClientResult<Vec<Profile>> {
        let page = PageRequest::newest_first(0, self.options.suggestions_page_size);
        let own_id = self.current().map(|p| p.id);

        let profiles = self.api.list_profiles(&page).await?;
        Ok(profiles
            .into_iter()
            .filter(|p| Some(p.id) != own_id)
            .collect())
    }

    pub async fn profile_detail(&self, profile_id: Uuid) -> ClientResult<Profile> {
        self.api.profile_detail(profile_id).await
    }

    pub async fn follow(&self, profile_id: Uuid) -> ClientResult<()> {
        self.session.require("follow profiles")?;
        self.api.follow(profile_id).await?;
        info!(%profile_id, "Followed profile");
        Ok(())
    }

    /// Debounced search by name
    ///
    /// Returns `Ok(None)` when a newer search superseded this one. Queries
    /// shorter than the configured minimum resolve to an empty list without
    /// a request.
    pub async fn search(&self, query: &str) -> ClientResult<Option<Vec<Profile>>> {
        let query = query.trim().to_string();
        if query.chars().count() < self.options.min_search_len {
            self.search.cancel();
            return Ok(Some(Vec::new()));
        }

        let api = self.api.clone();
        self.search
            .call(|| async move { api.search_profiles(&query).await })
            .await
            .transpose()
    }

    /// Forget the in-memory profile (storage is cleared by the session)
    pub fn clear(&self) {
        *self.profile.write() = None;
        *self.fetched_for.write() = None;
        self.search.cancel();
    }

    fn store(&self, profile: Profile) -> ClientResult<()> {
        self.storage.save(StorageKey::Profile, &profile)?;
        *self.profile.write() = Some(profile);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockAuthApi, MockMediaApi, MockProfileApi};
    use crate::config::ImageConfig;
    use crate::media::ImageTranscoder;
    use crate::models::{Account, PresignResponse};
    use crate::storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn profile(id: Uuid) -> Profile {
        serde_json::from_value(serde_json::json!({ "id": id, "fullName": "Ada Lovelace" })).unwrap()
    }

    fn signed_in_storage(account_id: Uuid) -> Arc<dyn KeyValueStore> {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let account = Account {
            id: account_id,
            email: "ada@plaza.dev".into(),
            role: None,
        };
        storage.save(StorageKey::Account, &account).unwrap();
        storage
    }

    fn build(api: MockProfileApi, media: MockMediaApi, storage: Arc<dyn KeyValueStore>) -> ProfileStore {
        let session = Arc::new(SessionStore::restore(Arc::new(MockAuthApi::new()), storage.clone()).unwrap());
        let uploader = Arc::new(MediaUploader::new(
            Arc::new(media),
            Arc::new(ImageTranscoder::new(ImageConfig::default())),
        ));
        ProfileStore::restore(Arc::new(api), uploader, session, storage, DirectoryOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn test_profile_fetched_once_per_account() {
        let account_id = Uuid::new_v4();
        let mut api = MockProfileApi::new();
        api.expect_current_profile()
            .times(1)
            .returning(move || Ok(profile(account_id)));

        let storage = signed_in_storage(account_id);
        let store = build(api, MockMediaApi::new(), storage.clone());

        store.ensure_loaded().await.unwrap();
        let again = store.ensure_loaded().await.unwrap().unwrap();

        assert_eq!(again.id, account_id);
        let cached: Option<Profile> = storage.load(StorageKey::Profile).unwrap();
        assert_eq!(cached.map(|p| p.id), Some(account_id));
    }

    #[tokio::test]
    async fn test_cached_profile_restored_at_startup() {
        let account_id = Uuid::new_v4();
        let storage = signed_in_storage(account_id);
        storage.save(StorageKey::Profile, &profile(account_id)).unwrap();

        let store = build(MockProfileApi::new(), MockMediaApi::new(), storage);
        assert_eq!(store.current().map(|p| p.id), Some(account_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_search_issues_no_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut api = MockProfileApi::new();
        api.expect_search_profiles()
            .withf(|name| name == "ada l")
            .returning(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(vec![])
            });

        let store = Arc::new(build(api, MockMediaApi::new(), signed_in_storage(Uuid::new_v4())));

        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.search("ada").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = store.search("ada l").await.unwrap();

        assert!(first.await.unwrap().unwrap().is_none());
        assert_eq!(second, Some(vec![]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_short_query_skips_backend() {
        let mut api = MockProfileApi::new();
        api.expect_search_profiles().never();

        let store = build(api, MockMediaApi::new(), signed_in_storage(Uuid::new_v4()));
        assert_eq!(store.search(" ad ").await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn test_avatar_upload_points_profile_at_new_key() {
        let account_id = Uuid::new_v4();
        let storage = signed_in_storage(account_id);
        storage.save(StorageKey::Profile, &profile(account_id)).unwrap();

        let mut api = MockProfileApi::new();
        api.expect_avatar_presign()
            .withf(|req| req.post_id.is_none() && req.content_type == "image/gif")
            .times(1)
            .returning(|_| {
                Ok(PresignResponse {
                    url: "https://bucket.local/avatars/me.gif?sig=1".into(),
                    key: "avatars/me.gif".into(),
                    expires_in: None,
                })
            });
        api.expect_update_profile()
            .withf(move |u| u.id == account_id && u.profile_pic.as_deref() == Some("avatars/me.gif"))
            .times(1)
            .returning(|_| Ok(None));

        let mut media = MockMediaApi::new();
        media
            .expect_upload_object()
            .withf(|url, content_type, _| url.contains("avatars/me.gif") && content_type == "image/gif")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let store = build(api, media, storage);
        let updated = store
            .upload_avatar(UploadFile::new("me.gif", "image/gif", b"GIF89a".to_vec()))
            .await
            .unwrap();

        assert_eq!(updated.profile_pic.as_deref(), Some("avatars/me.gif"));
        assert_eq!(updated.full_name.as_deref(), Some("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_avatar_must_be_an_image() {
        let account_id = Uuid::new_v4();
        let storage = signed_in_storage(account_id);
        storage.save(StorageKey::Profile, &profile(account_id)).unwrap();

        let mut api = MockProfileApi::new();
        api.expect_avatar_presign().never();

        let store = build(api, MockMediaApi::new(), storage);
        let result = store
            .upload_avatar(UploadFile::new("me.pdf", "application/pdf", b"%PDF".to_vec()))
            .await;

        assert!(matches!(result, Err(ClientError::Validation(_))));
    }

    #[tokio::test]
    async fn test_follow_requires_session() {
        let mut api = MockProfileApi::new();
        api.expect_follow().never();

        let store = build(api, MockMediaApi::new(), Arc::new(MemoryStore::new()));
        let result = store.follow(Uuid::new_v4()).await;

        assert!(matches!(result, Err(ClientError::Validation(_))));
    }
}
