//! Embedded file-based backend (LanceDB).
//!
//! Tables fix their columnar shape at creation, so `create_collection`
//! declares every registry field by writing the schema sentinel row. One
//! connection handle is shared process-wide: it is opened lazily, cached per
//! data path, and torn down by an idle-timeout reaper (Closed → Open →
//! Closed), reopening on the next access.
//!
//! Search here is best-effort: any failure degrades to an empty result set.
//! Create, upsert, and delete stay fail-loud like the other backends.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use arrow_array::{
    Array, ArrayRef, BooleanArray, FixedSizeListArray, Float32Array, Float64Array, Int64Array,
    RecordBatch, RecordBatchIterator, RecordBatchReader, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::index::vector::IvfPqIndexBuilder;
use lancedb::index::Index;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};
use log::{debug, error, info, warn};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::VectorBackend;
use crate::error::{Result, StoreError};
use crate::schema::{get_schema, CollectionSchema, SCHEMA_SENTINEL_ID};
use crate::types::{FilterCondition, MatchClause, PointId, SearchFilter, SearchResult, VectorPoint};

/// Idle period after which the shared connection is released.
const IDLE_TIMEOUT: Duration = Duration::from_secs(120);
const REAPER_INTERVAL: Duration = Duration::from_secs(30);

struct OpenConnection {
    path: String,
    connection: Connection,
    last_used: Instant,
}

#[derive(Default)]
struct ConnectionSlot {
    open: Option<OpenConnection>,
    reaper_running: bool,
}

static CONNECTION: OnceLock<Mutex<ConnectionSlot>> = OnceLock::new();

fn connection_slot() -> &'static Mutex<ConnectionSlot> {
    CONNECTION.get_or_init(|| Mutex::new(ConnectionSlot::default()))
}

/// Borrow the shared handle for `path`, opening it if closed. The underlying
/// client tolerates concurrent use of one handle, so callers share it
/// without further locking.
async fn acquire(path: &str) -> Result<Connection> {
    let mut slot = connection_slot().lock().await;

    if let Some(open) = slot.open.as_mut() {
        if open.path == path {
            open.last_used = Instant::now();
            return Ok(open.connection.clone());
        }
    }
    if slot.open.take().is_some() {
        debug!("Vector store path changed, discarding cached connection");
    }

    info!("Opening LanceDB connection at {}", path);
    let connection = lancedb::connect(path).execute().await?;
    slot.open = Some(OpenConnection {
        path: path.to_string(),
        connection: connection.clone(),
        last_used: Instant::now(),
    });
    if !slot.reaper_running {
        slot.reaper_running = true;
        tokio::spawn(reap_idle_connection());
    }
    Ok(connection)
}

/// Releases the shared handle once it has sat idle for [`IDLE_TIMEOUT`];
/// the next access reopens it lazily.
async fn reap_idle_connection() {
    loop {
        tokio::time::sleep(REAPER_INTERVAL).await;
        let mut slot = connection_slot().lock().await;
        let idle_for = slot.open.as_ref().map(|open| open.last_used.elapsed());
        match idle_for {
            Some(elapsed) if elapsed >= IDLE_TIMEOUT => {
                if let Some(open) = slot.open.take() {
                    debug!("Closing idle LanceDB connection to {}", open.path);
                }
                slot.reaper_running = false;
                return;
            }
            Some(_) => {}
            None => {
                slot.reaper_running = false;
                return;
            }
        }
    }
}

pub struct LanceVectorStore {
    db_path: String,
}

impl LanceVectorStore {
    pub fn new(db_path: &str) -> Self {
        Self {
            db_path: db_path.to_string(),
        }
    }

    async fn search_inner(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchResult>> {
        let connection = acquire(&self.db_path).await?;
        let table = connection.open_table(name).execute().await?;

        // The table's columnar shape is fixed at creation; repair the query
        // width against it instead of rejecting the query.
        let stored_schema = table
            .schema()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to read table schema: {}", e)))?;
        let query_vec = match vector_column_width(&stored_schema) {
            Some(width) if width != vector.len() => {
                warn!(
                    "Query vector length {} does not match table width {} for '{}', truncating/padding",
                    vector.len(),
                    width,
                    name
                );
                fit_vector(vector, width)
            }
            _ => vector.to_vec(),
        };

        let predicate = filter_to_predicate(filter);
        debug!(
            "LanceDB searching table '{}' with limit {} and predicate: {}",
            name, limit, predicate
        );

        let stream = table
            .vector_search(query_vec)?
            .only_if(predicate)
            .limit(limit)
            .execute()
            .await?;
        let batches: Vec<RecordBatch> = stream.try_collect().await.map_err(|e| {
            StoreError::Backend(format!("Failed to collect search results: {}", e))
        })?;

        let mut results = Vec::new();
        for batch in &batches {
            results.extend(parse_search_batch(batch)?);
        }
        debug!("LanceDB search returned {} results for '{}'", results.len(), name);
        Ok(results)
    }
}

#[async_trait]
impl VectorBackend for LanceVectorStore {
    async fn health_check(&self) -> bool {
        match acquire(&self.db_path).await {
            Ok(connection) => match connection.table_names().execute().await {
                Ok(_) => true,
                Err(e) => {
                    warn!("LanceDB health check failed: {}", e);
                    false
                }
            },
            Err(e) => {
                warn!("LanceDB connection failed: {}", e);
                false
            }
        }
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let connection = acquire(&self.db_path).await?;
        let names = connection.table_names().execute().await?;
        Ok(names.iter().any(|n| n == name))
    }

    async fn create_collection(&self, name: &str, vector_size: usize, metric: &str) -> Result<()> {
        let distance_type = parse_distance(metric)?;
        if self.collection_exists(name).await? {
            debug!("LanceDB table '{}' already exists", name);
            return Ok(());
        }

        let connection = acquire(&self.db_path).await?;
        let (collection_schema, arrow_schema) = table_schema(name, vector_size as i32);

        // Declare the columnar shape via a sample row carrying every schema
        // field. The sentinel never shows up in search results.
        let sentinel = VectorPoint::new(
            PointId::from(SCHEMA_SENTINEL_ID),
            vec![0.0; vector_size],
            Map::new(),
        );
        let batch = build_record_batch(&collection_schema, arrow_schema.clone(), &[sentinel])?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], arrow_schema);

        let table = connection
            .create_table(name, Box::new(batches) as Box<dyn RecordBatchReader + Send>)
            .execute()
            .await
            .map_err(|e| {
                error!("Failed to create LanceDB table '{}': {}", name, e);
                StoreError::from(e)
            })?;
        info!("Created LanceDB table '{}' ({} dims, {})", name, vector_size, metric);

        // Partitioned/quantized ANN index; the table stays usable with
        // exact (slower) scans when this fails.
        let index = Index::IvfPq(IvfPqIndexBuilder::default().distance_type(distance_type));
        match table.create_index(&["vector"], index).execute().await {
            Ok(()) => info!("Built IVF-PQ index for '{}'", name),
            Err(e) => warn!(
                "Failed to build ANN index for '{}', search falls back to exact scan: {}",
                name, e
            ),
        }

        Ok(())
    }

    async fn upsert_points(&self, name: &str, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let connection = acquire(&self.db_path).await?;
        let table = connection.open_table(name).execute().await.map_err(|e| {
            error!("Failed to open LanceDB table '{}': {}", name, e);
            StoreError::from(e)
        })?;

        let stored_schema = table
            .schema()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to read table schema: {}", e)))?;
        let width = vector_column_width(&stored_schema).ok_or_else(|| {
            StoreError::Backend(format!("Table '{}' has no vector column", name))
        })?;

        let (collection_schema, arrow_schema) = table_schema(name, width as i32);
        let count = points.len();
        let batch = build_record_batch(&collection_schema, arrow_schema.clone(), &points)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], arrow_schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge.execute(Box::new(batches)).await.map_err(|e| {
            error!("LanceDB upsert into '{}' failed: {}", name, e);
            StoreError::from(e)
        })?;

        debug!("Upserted {} points into LanceDB table '{}'", count, name);
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchResult>> {
        match self.search_inner(name, vector, limit, filter).await {
            Ok(results) => Ok(results),
            Err(e) => {
                warn!(
                    "LanceDB search in '{}' failed, returning empty results: {}",
                    name, e
                );
                Ok(Vec::new())
            }
        }
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        if !self.collection_exists(name).await? {
            debug!("LanceDB table '{}' absent, nothing to delete", name);
            return Ok(false);
        }
        let connection = acquire(&self.db_path).await?;
        connection.drop_table(name, &[]).await.map_err(|e| {
            error!("Failed to drop LanceDB table '{}': {}", name, e);
            StoreError::from(e)
        })?;
        info!("Dropped LanceDB table '{}'", name);
        Ok(true)
    }
}

fn parse_distance(metric: &str) -> Result<DistanceType> {
    match metric {
        "cosine" => Ok(DistanceType::Cosine),
        "l2" => Ok(DistanceType::L2),
        "dot" => Ok(DistanceType::Dot),
        other => Err(StoreError::UnsupportedMetric {
            metric: other.to_string(),
            backend: "lancedb",
        }),
    }
}

fn arrow_field_type(default: &Value) -> DataType {
    match default {
        Value::Bool(_) => DataType::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => DataType::Int64,
        Value::Number(_) => DataType::Float64,
        _ => DataType::Utf8,
    }
}

/// Arrow schema for a collection: `id`, the registry fields in declaration
/// order, then the vector column.
fn table_schema(collection: &str, vector_size: i32) -> (CollectionSchema, Arc<Schema>) {
    let collection_schema = get_schema(collection);
    let mut fields = vec![Field::new("id", DataType::Utf8, false)];
    for (name, default) in &collection_schema.fields {
        fields.push(Field::new(*name, arrow_field_type(default), true));
    }
    fields.push(Field::new(
        "vector",
        DataType::FixedSizeList(
            Arc::new(Field::new("item", DataType::Float32, true)),
            vector_size,
        ),
        false,
    ));
    (collection_schema, Arc::new(Schema::new(fields)))
}

fn json_value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn build_record_batch(
    collection_schema: &CollectionSchema,
    arrow_schema: Arc<Schema>,
    points: &[VectorPoint],
) -> Result<RecordBatch> {
    let vector_size = match arrow_schema
        .field_with_name("vector")
        .map_err(|e| StoreError::Backend(format!("Missing vector field: {}", e)))?
        .data_type()
    {
        DataType::FixedSizeList(_, size) => *size,
        other => {
            return Err(StoreError::Backend(format!(
                "Unexpected vector column type: {:?}",
                other
            )))
        }
    };

    let ids: Vec<String> = points.iter().map(|p| p.id.to_string()).collect();
    let merged: Vec<Map<String, Value>> = points
        .iter()
        .map(|p| collection_schema.merge_defaults(&p.payload))
        .collect();

    let mut columns: Vec<ArrayRef> = vec![Arc::new(StringArray::from(ids))];
    for (name, default) in &collection_schema.fields {
        let column: ArrayRef = match arrow_field_type(default) {
            DataType::Int64 => Arc::new(Int64Array::from(
                merged
                    .iter()
                    .map(|m| m.get(*name).and_then(Value::as_i64))
                    .collect::<Vec<_>>(),
            )),
            DataType::Float64 => Arc::new(Float64Array::from(
                merged
                    .iter()
                    .map(|m| m.get(*name).and_then(Value::as_f64))
                    .collect::<Vec<_>>(),
            )),
            DataType::Boolean => Arc::new(BooleanArray::from(
                merged
                    .iter()
                    .map(|m| m.get(*name).and_then(Value::as_bool))
                    .collect::<Vec<_>>(),
            )),
            _ => Arc::new(StringArray::from(
                merged
                    .iter()
                    .map(|m| m.get(*name).map(json_value_to_text))
                    .collect::<Vec<Option<String>>>(),
            )),
        };
        columns.push(column);
    }

    let all_values: Vec<f32> = points.iter().flat_map(|p| p.vector.iter().copied()).collect();
    let vector_array = FixedSizeListArray::try_new(
        Arc::new(Field::new("item", DataType::Float32, true)),
        vector_size,
        Arc::new(Float32Array::from(all_values)),
        None,
    )
    .map_err(|e| StoreError::Backend(format!("Failed to build vector array: {}", e)))?;
    columns.push(Arc::new(vector_array));

    RecordBatch::try_new(arrow_schema, columns)
        .map_err(|e| StoreError::Backend(format!("Failed to build record batch: {}", e)))
}

fn vector_column_width(schema: &Schema) -> Option<usize> {
    match schema.field_with_name("vector").ok()?.data_type() {
        DataType::FixedSizeList(_, size) => Some(*size as usize),
        _ => None,
    }
}

/// Truncate or zero-pad `vector` to `width`.
fn fit_vector(vector: &[f32], width: usize) -> Vec<f32> {
    let mut fitted = vector.to_vec();
    fitted.resize(width, 0.0);
    fitted
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

fn condition_to_predicate(condition: &FilterCondition) -> String {
    match &condition.clause {
        MatchClause::Any(values) => format!(
            "{} IN ({})",
            condition.key,
            values.iter().map(sql_literal).collect::<Vec<_>>().join(", ")
        ),
        MatchClause::Text(value) => format!("{} = {}", condition.key, sql_literal(value)),
    }
}

/// Combine the sentinel exclusion with the caller's conditions into one
/// predicate string.
fn filter_to_predicate(filter: Option<&SearchFilter>) -> String {
    let mut clauses = vec![format!("id != '{}'", SCHEMA_SENTINEL_ID)];
    if let Some(filter) = filter {
        for condition in &filter.must {
            clauses.push(condition_to_predicate(condition));
        }
    }
    clauses.join(" AND ")
}

/// Rebuild payloads from a result batch: every column except `id`, the
/// vector, and the reported distance. Score is `1 - distance`.
fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
    let schema = batch.schema();
    let distance_col = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let mut results = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let mut payload = Map::new();
        for (index, field) in schema.fields().iter().enumerate() {
            let name = field.name().as_str();
            if name == "id" || name == "vector" || name == "_distance" {
                continue;
            }
            let column = batch.column(index);
            if column.is_null(row) {
                continue;
            }
            let value = match field.data_type() {
                DataType::Utf8 => column
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .map(|a| Value::String(a.value(row).to_string())),
                DataType::Int64 => column
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .map(|a| Value::Number(a.value(row).into())),
                DataType::Float64 => column.as_any().downcast_ref::<Float64Array>().and_then(|a| {
                    serde_json::Number::from_f64(a.value(row)).map(Value::Number)
                }),
                DataType::Boolean => column
                    .as_any()
                    .downcast_ref::<BooleanArray>()
                    .map(|a| Value::Bool(a.value(row))),
                _ => None,
            };
            if let Some(value) = value {
                payload.insert(name.to_string(), value);
            }
        }

        let distance = distance_col.map(|c| c.value(row)).unwrap_or(0.0);
        results.push(SearchResult {
            score: 1.0 - distance,
            payload,
        });
    }
    Ok(results)
}
