use crate::api::MediaApi;
use crate::feed::pager::{LoadOutcome, LoadPhase, PageItem, PageTicket, Pager};
use crate::models::{Media, PageRequest};
use error_types::ClientResult;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Whose uploads a gallery shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaOwner {
    Mine,
    User(Uuid),
}

impl MediaOwner {
    pub fn path(&self) -> String {
        match self {
            MediaOwner::Mine => "/post/media/user/me".to_string(),
            MediaOwner::User(id) => format!("/post/media/user/{id}"),
        }
    }
}

impl PageItem for Media {
    type Key = String;

    fn page_key(&self) -> String {
        self.key.clone()
    }
}

/// Paginated grid of a profile's uploaded media
pub struct MediaGallery {
    owner: MediaOwner,
    api: Arc<dyn MediaApi>,
    pager: Mutex<Pager<Media>>,
}

impl MediaGallery {
    pub fn new(owner: MediaOwner, api: Arc<dyn MediaApi>, page_size: u32) -> Self {
        Self {
            owner,
            api,
            pager: Mutex::new(Pager::new(page_size)),
        }
    }

    pub fn owner(&self) -> MediaOwner {
        self.owner
    }

    pub async fn load_initial_page(&self) -> ClientResult<LoadOutcome> {
        let ticket = self.pager.lock().begin_initial();
        self.run(ticket).await
    }

    pub async fn load_next_page(&self) -> ClientResult<LoadOutcome> {
        let ticket = self.pager.lock().begin_next();
        self.run(ticket).await
    }

    pub fn items(&self) -> Vec<Media> {
        self.pager.lock().items().to_vec()
    }

    pub fn has_more(&self) -> bool {
        self.pager.lock().has_more()
    }

    pub fn phase(&self) -> LoadPhase {
        self.pager.lock().phase()
    }

    async fn run(&self, ticket: Option<PageTicket>) -> ClientResult<LoadOutcome> {
        let Some(ticket) = ticket else {
            debug!(owner = ?self.owner, "Media page load skipped");
            return Ok(LoadOutcome::Skipped);
        };

        let page = PageRequest::newest_first(ticket.page_no, ticket.size);
        match self.api.media_page(&self.owner, &page).await {
            Ok(items) => Ok(self.pager.lock().finish(ticket, items)),
            Err(e) => {
                self.pager.lock().abort(ticket);
                error!(owner = ?self.owner, page = ticket.page_no, error = %e, "Failed to load media page");
                Err(e)
            }
        }
    }
}
