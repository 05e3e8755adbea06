//! Collections group request definitions and own the collection variable scope.

use crate::models::request::RequestDefinition;
use crate::variables::Variable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Collection {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub requests: Vec<RequestDefinition>,
    /// Initial values for the collection scope.
    #[serde(default)]
    pub variables: HashMap<String, Variable>,
}

impl Collection {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn request(&self, id: &str) -> Option<&RequestDefinition> {
        self.requests.iter().find(|r| r.id == id)
    }

    pub fn request_mut(&mut self, id: &str) -> Option<&mut RequestDefinition> {
        self.requests.iter_mut().find(|r| r.id == id)
    }
}
