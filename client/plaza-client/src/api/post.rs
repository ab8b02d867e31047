use super::{HttpBackend, MediaApi, PostApi};
use crate::feed::FeedSource;
use crate::media::MediaOwner;
use crate::models::{
    Comment, CreatePostRequest, Media, PageRequest, Post, PresignRequest, PresignResponse,
};
use async_trait::async_trait;
use bytes::Bytes;
use error_types::ClientResult;
use tracing::debug;
use uuid::Uuid;

#[async_trait]
impl PostApi for HttpBackend {
    async fn create_post(&self, request: &CreatePostRequest) -> ClientResult<Post> {
        let req = self.client.post(self.url("/post/create")).json(request);
        self.json("create post", req).await
    }

    async fn posts_page(&self, source: &FeedSource, page: &PageRequest) -> ClientResult<Vec<Post>> {
        let req = self.client.get(self.url(&source.path())).query(page);
        Ok(self.json_opt("get feed page", req).await?.unwrap_or_default())
    }

    async fn like(&self, post_id: Uuid) -> ClientResult<()> {
        let req = self.client.post(self.url(&format!("/post/{post_id}/like")));
        self.empty("like post", req).await
    }

    async fn unlike(&self, post_id: Uuid) -> ClientResult<()> {
        let req = self.client.post(self.url(&format!("/post/{post_id}/dislike")));
        self.empty("unlike post", req).await
    }

    async fn comment(&self, post_id: Uuid, content: &str) -> ClientResult<Option<Comment>> {
        let req = self
            .client
            .post(self.url(&format!("/post/{post_id}/comment")))
            .query(&[("content", content)]);

        // The backend may answer with an empty body or with something other
        // than the stored comment; only a decodable comment counts as an echo.
        let response = self.send("comment on post", req).await?;
        let body = response.bytes().await.unwrap_or_default();
        let echo = serde_json::from_slice::<Comment>(&body).ok();
        if echo.is_none() && !body.is_empty() {
            debug!(%post_id, "Comment response carried no comment echo");
        }
        Ok(echo)
    }
}

#[async_trait]
impl MediaApi for HttpBackend {
    async fn presign_batch(&self, requests: &[PresignRequest]) -> ClientResult<Vec<PresignResponse>> {
        let req = self
            .client
            .post(self.url("/post/media/s3/upload"))
            .json(requests);
        self.json("presign media upload", req).await
    }

    async fn upload_object(&self, url: &str, content_type: &str, data: Bytes) -> ClientResult<()> {
        self.put_object(url, content_type, data).await
    }

    async fn confirm_upload(&self, key: &str) -> ClientResult<()> {
        let req = self
            .client
            .post(self.url("/post/media/s3/confirm"))
            .query(&[("key", key)]);
        self.empty("confirm media upload", req).await
    }

    async fn media_page(&self, owner: &MediaOwner, page: &PageRequest) -> ClientResult<Vec<Media>> {
        let req = self.client.get(self.url(&owner.path())).query(page);
        Ok(self.json_opt("get media page", req).await?.unwrap_or_default())
    }
}
