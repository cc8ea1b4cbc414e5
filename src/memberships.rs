use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiError, ItemList, with_query};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_moderator: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_monitor: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

impl ApiClient {
    pub async fn list_memberships(
        &mut self,
        room_id: Option<&str>,
        person_id: Option<&str>,
        person_email: Option<&str>,
    ) -> Result<Vec<Membership>, ApiError> {
        let path = with_query(
            "/memberships",
            &[
                ("roomId", room_id),
                ("personId", person_id),
                ("personEmail", person_email),
            ],
        );
        let request = self.get_request(&path)?;
        let list: ItemList<Membership> = self.execute(request).await?;
        Ok(list.items)
    }

    /// `room_id` may be `-` for the default room.
    pub async fn create_membership(
        &mut self,
        room_id: &str,
        person_id: Option<&str>,
        person_email: Option<&str>,
    ) -> Result<Membership, ApiError> {
        let membership = Membership {
            room_id: Some(self.config().resolve_room(Some(room_id))?),
            person_id: non_empty(person_id),
            person_email: non_empty(person_email),
            ..Membership::default()
        };
        let request = self.post_request("/memberships", &membership)?;
        self.execute(request).await
    }

    pub async fn get_membership(&mut self, id: &str) -> Result<Membership, ApiError> {
        let request = self.get_request(&format!("/memberships/{id}"))?;
        self.execute(request).await
    }

    /// Always sends `isModerator`, so `false` revokes moderator rights.
    pub async fn update_membership(&mut self, id: &str, is_moderator: bool) -> Result<Membership, ApiError> {
        let membership = Membership {
            is_moderator: Some(is_moderator),
            ..Membership::default()
        };
        let request = self.put_request(&format!("/memberships/{id}"), &membership)?;
        self.execute(request).await
    }

    pub async fn delete_membership(&mut self, id: &str) -> Result<(), ApiError> {
        let request = self.delete_request(&format!("/memberships/{id}"))?;
        self.execute_empty(request).await
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
