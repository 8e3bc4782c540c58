use time::OffsetDateTime;
use tracing::{info, warn};

use super::api;
use super::dto::{ProfileFields, UserProfile};
use crate::error::{ClientError, ClientResult};
use crate::http::HttpClient;

/// Profile container. The server copy is authoritative; edits happen on a
/// draft taken with [`ProfileState::draft`] and are submitted whole.
pub struct ProfileState {
    http: HttpClient,
    profile: Option<UserProfile>,
    is_loading: bool,
    is_saving: bool,
    error: Option<String>,
    last_updated: Option<OffsetDateTime>,
}

enum WriteKind {
    Create,
    Replace,
    Patch,
}

impl ProfileState {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            profile: None,
            is_loading: false,
            is_saving: false,
            error: None,
            last_updated: None,
        }
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_saving(&self) -> bool {
        self.is_saving
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn last_updated(&self) -> Option<OffsetDateTime> {
        self.last_updated
    }

    /// Local copy of the editable fields.
    pub fn draft(&self) -> ProfileFields {
        self.profile
            .as_ref()
            .map(|p| p.fields.clone())
            .unwrap_or_default()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn clear(&mut self) {
        self.profile = None;
        self.error = None;
        self.last_updated = None;
    }

    pub async fn load(&mut self) -> ClientResult<&UserProfile> {
        self.is_loading = true;
        self.error = None;
        let result = api::get_my_profile(&self.http).await;
        self.is_loading = false;
        self.settle(result, "Failed to get profile")
    }

    pub async fn create(&mut self, fields: &ProfileFields) -> ClientResult<&UserProfile> {
        self.write(WriteKind::Create, fields).await
    }

    /// Replaces the whole profile with `draft`.
    pub async fn save(&mut self, draft: &ProfileFields) -> ClientResult<&UserProfile> {
        self.write(WriteKind::Replace, draft).await
    }

    pub async fn patch(&mut self, fields: &ProfileFields) -> ClientResult<&UserProfile> {
        self.write(WriteKind::Patch, fields).await
    }

    async fn write(&mut self, kind: WriteKind, fields: &ProfileFields) -> ClientResult<&UserProfile> {
        let fallback = match kind {
            WriteKind::Create => "Failed to create profile",
            WriteKind::Replace | WriteKind::Patch => "Failed to update profile",
        };
        self.error = None;
        if let Err(msg) = fields.validate() {
            return self.settle(Err(ClientError::Invalid(msg)), fallback);
        }

        self.is_saving = true;
        let result = match kind {
            WriteKind::Create => api::create_profile(&self.http, fields).await,
            WriteKind::Replace => api::update_profile(&self.http, fields).await,
            WriteKind::Patch => api::partial_update_profile(&self.http, fields).await,
        };
        self.is_saving = false;
        self.settle(result, fallback)
    }

    fn settle(
        &mut self,
        result: ClientResult<UserProfile>,
        fallback: &str,
    ) -> ClientResult<&UserProfile> {
        match result {
            Ok(profile) => {
                info!(profile_id = profile.id, "profile updated in state");
                self.last_updated = Some(OffsetDateTime::now_utc());
                Ok(&*self.profile.insert(profile))
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "profile request failed");
                self.error = Some(if message.is_empty() {
                    fallback.to_string()
                } else {
                    message
                });
                Err(e)
            }
        }
    }
}
