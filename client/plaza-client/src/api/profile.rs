use super::{HttpBackend, ProfileApi};
use crate::models::{PageRequest, PresignRequest, PresignResponse, Profile, ProfileUpdate};
use async_trait::async_trait;
use error_types::ClientResult;
use uuid::Uuid;

#[async_trait]
impl ProfileApi for HttpBackend {
    async fn current_profile(&self) -> ClientResult<Profile> {
        let req = self.client.get(self.url("/profile/me"));
        self.json("get current profile", req).await
    }

    async fn list_profiles(&self, page: &PageRequest) -> ClientResult<Vec<Profile>> {
        let req = self.client.get(self.url("/profile/get-profiles")).query(page);
        Ok(self.json_opt("list profiles", req).await?.unwrap_or_default())
    }

    async fn profile_detail(&self, profile_id: Uuid) -> ClientResult<Profile> {
        let req = self.client.get(self.url(&format!("/profile/{profile_id}")));
        self.json("get profile", req).await
    }

    async fn search_profiles(&self, name: &str) -> ClientResult<Vec<Profile>> {
        let req = self
            .client
            .get(self.url("/profile/search"))
            .query(&[("name", name)]);
        Ok(self.json_opt("search profiles", req).await?.unwrap_or_default())
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> ClientResult<Option<Profile>> {
        let req = self.client.put(self.url("/profile/update")).json(update);
        self.json_opt("update profile", req).await
    }

    async fn follow(&self, profile_id: Uuid) -> ClientResult<()> {
        let req = self
            .client
            .post(self.url(&format!("/profile/{profile_id}/follow")));
        self.empty("follow profile", req).await
    }

    async fn avatar_presign(&self, request: &PresignRequest) -> ClientResult<PresignResponse> {
        let req = self
            .client
            .post(self.url("/profile/avatar/s3/upload"))
            .json(request);
        self.json("presign avatar upload", req).await
    }
}
