use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelObject>,
}

impl Default for ModelList {
    fn default() -> Self {
        Self {
            object: "list".to_string(),
            data: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelObject {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

impl ModelList {
    pub fn from_names<I, S>(names: I, owned_by: &str, created: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let data = names
            .into_iter()
            .map(|name| ModelObject {
                id: name.into(),
                object: "model".to_string(),
                created,
                owned_by: owned_by.to_string(),
            })
            .collect();
        Self {
            object: "list".to_string(),
            data,
        }
    }
}
