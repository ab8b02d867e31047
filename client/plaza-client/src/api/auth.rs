use super::{AuthApi, HttpBackend};
use crate::models::{Account, LoginRequest, RegisterRequest};
use async_trait::async_trait;
use error_types::ClientResult;

#[async_trait]
impl AuthApi for HttpBackend {
    async fn login(&self, request: &LoginRequest) -> ClientResult<Account> {
        let req = self.client.post(self.url("/auth/login")).json(request);
        self.json("login", req).await
    }

    async fn register(&self, request: &RegisterRequest) -> ClientResult<Account> {
        let req = self.client.post(self.url("/auth/register")).json(request);
        self.json("register", req).await
    }

    async fn logout(&self) -> ClientResult<()> {
        let req = self.client.post(self.url("/auth/logout"));
        self.empty("logout", req).await
    }
}
