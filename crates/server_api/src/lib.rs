use sequencer::{SequenceError, Sequencer};
use shared::{
    domain::{ItemId, TodoItem},
    error::{ApiError, ErrorCode},
    protocol::{
        CreateTodoRequest, ListTodosQuery, ReorderRequest, ReorderResponse, TodoPage,
        UpdateTodoRequest, COMPLETE_TASK_ACTION, SET_DUE_DATE_ACTION,
    },
};
use storage::{ItemPage, Storage};
use tracing::{info, warn};

pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;
pub const MAX_TEXT_CHARS: usize = 1000;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub sequencer: Sequencer<Storage>,
    pub max_page_size: u32,
}

impl ApiContext {
    pub fn new(storage: Storage) -> Self {
        Self {
            sequencer: Sequencer::new(storage.clone()),
            storage,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }
}

pub async fn list_todos(ctx: &ApiContext, query: &ListTodosQuery) -> Result<TodoPage, ApiError> {
    let page = page_window(query, ctx.max_page_size);
    let (data, count) = ctx.storage.list_items(page).await.map_err(internal)?;
    Ok(TodoPage { data, count })
}

pub async fn create_todo(ctx: &ApiContext, req: CreateTodoRequest) -> Result<TodoItem, ApiError> {
    let text = validate_text(&req.text)?;
    let seq = ctx
        .sequencer
        .assign_initial_seq()
        .await
        .map_err(sequence_error)?;
    let item = TodoItem::new(text, seq);
    ctx.storage.insert_item(&item).await.map_err(internal)?;
    info!(id = %item.id, seq = item.seq, "todo created");
    Ok(item)
}

pub async fn update_todo(
    ctx: &ApiContext,
    id: &ItemId,
    req: UpdateTodoRequest,
) -> Result<TodoItem, ApiError> {
    let updated = match req {
        UpdateTodoRequest::CompleteTask { completed } => {
            ctx.storage.set_completed(id, completed).await
        }
        UpdateTodoRequest::SetDueDate { due_date } => ctx.storage.set_due_date(id, due_date).await,
    }
    .map_err(internal)?;
    if !updated {
        return Err(not_found(id));
    }

    ctx.storage
        .find_item(id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(id))
}

pub async fn reorder_todos(
    ctx: &ApiContext,
    req: ReorderRequest,
) -> Result<ReorderResponse, ApiError> {
    let outcome = ctx
        .sequencer
        .reorder(&req.source_id, &req.destination_id)
        .await
        .map_err(sequence_error)?;
    if outcome.moved {
        info!(
            source = %req.source_id,
            destination = %req.destination_id,
            seq = outcome.item.seq,
            "todo reordered"
        );
    }
    Ok(ReorderResponse {
        moved: outcome.moved,
        item: outcome.item,
    })
}

pub async fn delete_todo(ctx: &ApiContext, id: &ItemId) -> Result<(), ApiError> {
    if !ctx.storage.delete_item(id).await.map_err(internal)? {
        return Err(not_found(id));
    }
    info!(%id, "todo deleted");
    Ok(())
}

/// Decodes an update body, naming the offending field when the action is known.
pub fn parse_update_request(body: serde_json::Value) -> Result<UpdateTodoRequest, ApiError> {
    let action = body
        .get("action")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned);
    serde_json::from_value(body).map_err(|_| match action.as_deref() {
        Some(COMPLETE_TASK_ACTION) => ApiError::validation("invalid 'completed' expected boolean"),
        Some(SET_DUE_DATE_ACTION) => {
            ApiError::validation("invalid 'dueDate' expected RFC 3339 timestamp or null")
        }
        _ => ApiError::validation("action is not defined"),
    })
}

/// Translates 1-based `pageNumber`/`nPerPage` into a storage window. A missing
/// or zero `nPerPage` lists everything.
fn page_window(query: &ListTodosQuery, max_page_size: u32) -> ItemPage {
    let limit = query
        .n_per_page
        .filter(|n| *n > 0)
        .map(|n| n.min(max_page_size));
    let offset = match (query.page_number, limit) {
        (Some(page), Some(per_page)) if page > 1 => (page - 1).saturating_mul(per_page),
        _ => 0,
    };
    ItemPage {
        offset,
        limit,
        completed: query.completed,
    }
}

fn validate_text(text: &str) -> Result<&str, ApiError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("invalid 'text' expected non-empty string"));
    }
    if trimmed.chars().count() > MAX_TEXT_CHARS {
        return Err(ApiError::validation(format!(
            "invalid 'text' longer than {MAX_TEXT_CHARS} characters"
        )));
    }
    Ok(trimmed)
}

fn not_found(id: &ItemId) -> ApiError {
    ApiError::not_found(format!("todo {id} not found"))
}

fn sequence_error(err: SequenceError) -> ApiError {
    match &err {
        SequenceError::NotFound(id) => not_found(id),
        SequenceError::InvalidArgument(message) => ApiError::validation(message.clone()),
        SequenceError::PrecisionExhausted { .. } => {
            warn!(error = %err, "seq precision exhausted; renumber the list");
            ApiError::new(ErrorCode::Conflict, err.to_string())
        }
        SequenceError::Store(_) => ApiError::new(ErrorCode::Internal, err.to_string()),
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
