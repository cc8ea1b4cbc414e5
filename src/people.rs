use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiError, ItemList, with_query};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

impl Person {
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.first().map(String::as_str)
    }
}

impl ApiClient {
    /// `id` may be `me` for the authenticated user.
    pub async fn get_person(&mut self, id: &str) -> Result<Person, ApiError> {
        let request = self.get_request(&format!("/people/{id}"))?;
        self.execute(request).await
    }

    /// The service requires an email or a display name; its error is passed
    /// through unchanged when both are missing.
    pub async fn list_people(
        &mut self,
        email: Option<&str>,
        display_name: Option<&str>,
    ) -> Result<Vec<Person>, ApiError> {
        let path = with_query("/people", &[("email", email), ("displayName", display_name)]);
        let request = self.get_request(&path)?;
        let list: ItemList<Person> = self.execute(request).await?;
        Ok(list.items)
    }
}
