//! Command handlers. Each one prints JSON lines on stdout.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use staffdesk_client::{state_event, DetailController, LoadConfig, LoadState};
use staffdesk_shared::{
    AggregatedRecord, Advance, AdvanceStatus, Document, EditSet, EmployeeId, EmployeeRecord,
    Subcollection, Transaction, TransactionKind, TransportError,
};
use staffdesk_store::{RecordSource, SqliteSource};

use crate::error::CliError;

pub struct Context {
    pub source: Arc<SqliteSource>,
    pub detail: DetailController,
    pub collection: String,
}

impl Context {
    pub fn new(source: SqliteSource, config: LoadConfig) -> Self {
        let source = Arc::new(source);
        Self {
            collection: config.collection.clone(),
            detail: DetailController::new(source.clone(), config),
            source,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn emit(state: &LoadState) -> Result<(), CliError> {
    print_json(&state_event(state))
}

// ---------------------------------------------------------------------------
// import / list
// ---------------------------------------------------------------------------

/// One validated import entry, ready to write.
struct ImportEntry {
    id: Option<String>,
    fields: Map<String, Value>,
    advances: Vec<Map<String, Value>>,
    transactions: Vec<Map<String, Value>>,
}

/// Import employee documents. Each entry may carry an `id` and inline
/// `advances` / `transactions` arrays, which are stored as sub-collections.
///
/// Every entry is validated before anything is written, so bad input leaves
/// the store untouched. A store failure part-way through is not rolled back:
/// entries already reported as imported stay.
pub async fn import(ctx: &Context, raw: &str) -> Result<Vec<String>, CliError> {
    let entries = match serde_json::from_str::<Value>(raw)? {
        Value::Array(entries) => entries,
        single @ Value::Object(_) => vec![single],
        _ => return Err(CliError::BadInput("expected an object or an array".into())),
    };
    let entries = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| parse_entry(index, entry))
        .collect::<Result<Vec<_>, _>>()?;

    let mut imported = Vec::with_capacity(entries.len());
    for entry in entries {
        let new_id = ctx
            .source
            .create_record(&ctx.collection, entry.id, entry.fields)
            .await?;
        for (sub, items) in [
            (Subcollection::Advances, entry.advances),
            (Subcollection::Transactions, entry.transactions),
        ] {
            for item in items {
                ctx.source
                    .add_sub_record(&ctx.collection, &new_id, sub.as_str(), item)
                    .await?;
            }
        }

        info!(id = %new_id, "imported employee");
        print_json(&serde_json::json!({ "imported": new_id }))?;
        imported.push(new_id);
    }
    Ok(imported)
}

fn parse_entry(index: usize, entry: Value) -> Result<ImportEntry, CliError> {
    let Value::Object(mut fields) = entry else {
        return Err(CliError::BadInput(format!("entry {index} is not an object")));
    };
    let id = match fields.remove("id") {
        None => None,
        Some(Value::String(id)) if !id.is_empty() && !id.contains('/') => Some(id),
        Some(other) => {
            return Err(CliError::BadInput(format!("entry {index}: bad id {other}")));
        }
    };
    let advances = take_items::<Advance>(&mut fields, Subcollection::Advances, index)?;
    let transactions = take_items::<Transaction>(&mut fields, Subcollection::Transactions, index)?;

    Document::new(id.clone().unwrap_or_default(), fields.clone())
        .decode::<EmployeeRecord>()
        .map_err(|e| CliError::BadInput(format!("entry {index}: {e}")))?;

    Ok(ImportEntry {
        id,
        fields,
        advances,
        transactions,
    })
}

/// Remove `sub` from an import entry, checking every item decodes.
fn take_items<T: serde::de::DeserializeOwned>(
    fields: &mut Map<String, Value>,
    sub: Subcollection,
    index: usize,
) -> Result<Vec<Map<String, Value>>, CliError> {
    let items = match fields.remove(sub.as_str()) {
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(CliError::BadInput(format!(
                "entry {index}: {sub} must be an array"
            )))
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(mut item) => {
                item.remove("id");
                Document::new("", item.clone())
                    .decode::<T>()
                    .map_err(|e| CliError::BadInput(format!("entry {index}: {sub}: {e}")))?;
                Ok(item)
            }
            _ => Err(CliError::BadInput(format!(
                "entry {index}: {sub} items must be objects"
            ))),
        })
        .collect()
}

#[derive(Serialize)]
struct ListRow {
    id: String,
    name: String,
    department: String,
    position: String,
}

pub async fn list(ctx: &Context) -> Result<usize, CliError> {
    let documents = ctx.source.list_records(&ctx.collection).await?;
    for doc in &documents {
        let record: EmployeeRecord = doc
            .decode()
            .map_err(|e| TransportError::Malformed(format!("{}: {e}", doc.id)))?;
        print_json(&ListRow {
            id: doc.id.clone(),
            name: record.name,
            department: record.department,
            position: record.position,
        })?;
    }
    Ok(documents.len())
}

// ---------------------------------------------------------------------------
// detail view
// ---------------------------------------------------------------------------

/// Open a record, printing every state it passes through. Degraded or failed
/// loads are retried up to `retries` times.
pub async fn show(ctx: &Context, id: &str, retries: u32) -> Result<LoadState, CliError> {
    let handle = ctx.detail.open_detail(EmployeeId::new(id), None);
    emit(&ctx.detail.state())?;
    let mut state = settle(handle.settled().await, id)?;
    emit(&state)?;

    let mut attempts = 0;
    while matches!(state, LoadState::Degraded { .. } | LoadState::Failed { .. })
        && attempts < retries
    {
        let handle = ctx.detail.retry_detail()?;
        emit(&ctx.detail.state())?;
        state = settle(handle.settled().await, id)?;
        emit(&state)?;
        attempts += 1;
    }
    Ok(state)
}

fn settle(state: Option<LoadState>, id: &str) -> Result<LoadState, CliError> {
    state.ok_or_else(|| CliError::NotLoaded(id.to_string()))
}

/// Load a record far enough to write against it.
async fn open_for_write(ctx: &Context, id: &str) -> Result<(), CliError> {
    let state = settle(
        ctx.detail.open_detail(EmployeeId::new(id), None).settled().await,
        id,
    )?;
    match state {
        LoadState::Ready { .. } | LoadState::Degraded { .. } => Ok(()),
        LoadState::Failed { error, .. } => match error.cause {
            staffdesk_shared::CallError::Transport(TransportError::NotFound(_)) => {
                Err(CliError::NotFound(id.to_string()))
            }
            _ => Err(CliError::NotLoaded(format!("{id}: {error}"))),
        },
        _ => Err(CliError::NotLoaded(id.to_string())),
    }
}

pub async fn save(ctx: &Context, id: &str, edits: &str) -> Result<AggregatedRecord, CliError> {
    let edits: EditSet = serde_json::from_str(edits)
        .map_err(|e| CliError::BadInput(format!("edits: {e}")))?;
    if edits.is_empty() {
        return Err(CliError::BadInput("no fields to save".into()));
    }

    open_for_write(ctx, id).await?;
    let record = ctx.detail.save_edits(edits).await?;
    print_json(&record)?;
    Ok(record)
}

pub async fn add_advance(
    ctx: &Context,
    id: &str,
    amount: f64,
    date: NaiveDate,
    reason: String,
) -> Result<AggregatedRecord, CliError> {
    if !(amount.is_finite() && amount > 0.0) {
        return Err(CliError::BadInput(format!("amount must be positive: {amount}")));
    }
    open_for_write(ctx, id).await?;
    let record = ctx
        .detail
        .append_advance(Advance {
            id: String::new(),
            amount,
            date,
            reason,
            status: AdvanceStatus::Pending,
        })
        .await?;
    print_json(&record)?;
    Ok(record)
}

pub async fn set_advance_status(
    ctx: &Context,
    id: &str,
    advance_id: &str,
    status: AdvanceStatus,
) -> Result<AggregatedRecord, CliError> {
    open_for_write(ctx, id).await?;
    let record = ctx.detail.set_advance_status(advance_id, status).await?;
    print_json(&record)?;
    Ok(record)
}

pub async fn add_transaction(
    ctx: &Context,
    id: &str,
    amount: f64,
    date: NaiveDate,
    kind: TransactionKind,
    description: String,
) -> Result<AggregatedRecord, CliError> {
    if !amount.is_finite() {
        return Err(CliError::BadInput(format!("invalid amount: {amount}")));
    }
    open_for_write(ctx, id).await?;
    let record = ctx
        .detail
        .append_transaction(Transaction {
            id: String::new(),
            amount,
            date,
            kind,
            description,
        })
        .await?;
    print_json(&record)?;
    Ok(record)
}

/// Parse a lowercase enum name the way it is stored.
pub fn parse_lowercase<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, String> {
    serde_json::from_value(Value::String(raw.trim().to_lowercase())).map_err(|e| e.to_string())
}
