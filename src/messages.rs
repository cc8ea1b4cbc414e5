use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiError, ItemList, with_query};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_person_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_person_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

impl ApiClient {
    /// `room_id` may be `-` for the default room.
    pub async fn list_messages(&mut self, room_id: &str) -> Result<Vec<Message>, ApiError> {
        let room_id = self.config().resolve_room(Some(room_id))?;
        let request = self.get_request(&with_query("/messages", &[("roomId", Some(room_id.as_str()))]))?;
        let list: ItemList<Message> = self.execute(request).await?;
        Ok(list.items)
    }

    /// `room_id` may be `-` for the default room.
    pub async fn create_message(&mut self, room_id: &str, text: &str) -> Result<Message, ApiError> {
        let message = Message {
            room_id: Some(self.config().resolve_room(Some(room_id))?),
            text: Some(text.to_string()),
            ..Message::default()
        };
        let request = self.post_request("/messages", &message)?;
        self.execute(request).await
    }

    /// Posts `file` to the room, with `text` as an optional caption.
    pub async fn upload_message(
        &mut self,
        room_id: &str,
        text: Option<&str>,
        file: &Path,
    ) -> Result<Message, ApiError> {
        let mut fields = vec![("roomId".to_string(), self.config().resolve_room(Some(room_id))?)];
        if let Some(text) = text.filter(|text| !text.is_empty()) {
            fields.push(("text".to_string(), text.to_string()));
        }
        let request = self.upload_request("/messages", fields, file)?;
        self.execute(request).await
    }

    pub async fn get_message(&mut self, id: &str) -> Result<Message, ApiError> {
        let request = self.get_request(&format!("/messages/{id}"))?;
        self.execute(request).await
    }

    pub async fn delete_message(&mut self, id: &str) -> Result<(), ApiError> {
        let request = self.delete_request(&format!("/messages/{id}"))?;
        self.execute_empty(request).await
    }
}
