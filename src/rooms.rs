use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiError, ItemList};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub room_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_locked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

impl ApiClient {
    pub async fn list_rooms(&mut self) -> Result<Vec<Room>, ApiError> {
        let request = self.get_request("/rooms")?;
        let list: ItemList<Room> = self.execute(request).await?;
        Ok(list.items)
    }

    pub async fn create_room(&mut self, title: &str) -> Result<Room, ApiError> {
        let room = Room {
            title: Some(title.to_string()),
            ..Room::default()
        };
        let request = self.post_request("/rooms", &room)?;
        self.execute(request).await
    }

    pub async fn get_room(&mut self, id: &str) -> Result<Room, ApiError> {
        let request = self.get_request(&format!("/rooms/{id}"))?;
        self.execute(request).await
    }

    pub async fn update_room(&mut self, id: &str, title: &str) -> Result<Room, ApiError> {
        let room = Room {
            title: Some(title.to_string()),
            ..Room::default()
        };
        let request = self.put_request(&format!("/rooms/{id}"), &room)?;
        self.execute(request).await
    }

    pub async fn delete_room(&mut self, id: &str) -> Result<(), ApiError> {
        let request = self.delete_request(&format!("/rooms/{id}"))?;
        self.execute_empty(request).await
    }
}
