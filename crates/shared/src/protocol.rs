use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ItemId, TodoItem};

pub const COMPLETE_TASK_ACTION: &str = "COMPLETE_TASK";
pub const SET_DUE_DATE_ACTION: &str = "SET_DUE_TO_DATE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTodosQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_per_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

/// One page of the ordered list. `count` is the number of matching items
/// before paging is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoPage {
    pub data: Vec<TodoItem>,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTodoRequest {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum UpdateTodoRequest {
    #[serde(rename = "COMPLETE_TASK")]
    CompleteTask { completed: bool },
    #[serde(rename = "SET_DUE_TO_DATE", rename_all = "camelCase")]
    SetDueDate {
        #[serde(default)]
        due_date: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    pub source_id: ItemId,
    pub destination_id: ItemId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderResponse {
    pub moved: bool,
    pub item: TodoItem,
}
