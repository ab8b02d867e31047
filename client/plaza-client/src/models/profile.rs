use super::{null_as_default, timestamp, PostAuthor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    pub id: Uuid,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub nick_name: Option<String>,
    #[serde(default)]
    pub profile_pic: Option<String>,
}

/// Profile projection of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub nick_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub profile_pic: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub followings: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub friends: Vec<Friend>,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Projection embedded in posts and comments written by this profile
    pub fn as_author(&self) -> PostAuthor {
        PostAuthor {
            full_name: self.full_name.clone(),
            nick_name: self.nick_name.clone(),
            profile_pic: self.profile_pic.clone(),
        }
    }

    pub fn is_friend(&self, profile_id: Uuid) -> bool {
        self.friends.iter().any(|f| f.id == profile_id)
    }
}

/// Partial update sent to `PUT /profile/update`; unset fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
}

impl ProfileUpdate {
    pub fn for_profile(id: Uuid) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Apply the set fields to a cached profile
    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(v) = &self.full_name {
            profile.full_name = Some(v.clone());
        }
        if let Some(v) = &self.nick_name {
            profile.nick_name = Some(v.clone());
        }
        if let Some(v) = &self.bio {
            profile.bio = Some(v.clone());
        }
        if let Some(v) = &self.phone_number {
            profile.phone_number = Some(v.clone());
        }
        if let Some(v) = &self.address {
            profile.address = Some(v.clone());
        }
        if let Some(v) = &self.profile_pic {
            profile.profile_pic = Some(v.clone());
        }
    }
}
