//! Read model store interfaces and backends.
//!
//! A [`ReadModelStore`] hands out [`UnitOfWork`]s, each wrapping one database
//! transaction. Handlers only ever see a `&mut dyn UnitOfWork`; everything they
//! write becomes visible atomically on [`UnitOfWork::commit`].

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresStore;
pub use self::sqlite::SqliteStore;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::config::{Config, DatabaseBackend};
use crate::error::QueryError;
use crate::migrations;
use crate::model::{
    ApplicationRecord, BpmnActivityRecord, BpmnSequenceFlowRecord, IntegrationContextRecord,
    ProcessCandidateStarterGroupRecord, ProcessCandidateStarterUserRecord,
    ProcessDefinitionRecord, ProcessInstanceRecord, ProcessModelRecord, ProcessVariableRecord,
    TaskCandidateGroupRecord, TaskCandidateUserRecord, TaskRecord, TaskVariableRecord,
};

/// Source of transaction-scoped units of work.
#[async_trait]
pub trait ReadModelStore: Send + Sync {
    /// Open a new unit of work (one database transaction).
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, QueryError>;

    /// Verify the store is reachable.
    async fn health_check(&self) -> Result<(), QueryError>;
}

/// Repository operations over one open transaction.
///
/// Every `save_*` is an upsert keyed by the record's primary key. Nothing is
/// persisted until [`UnitOfWork::commit`]; dropping a unit of work without
/// committing rolls it back.
#[allow(missing_docs)]
#[async_trait]
pub trait UnitOfWork: Send {
    // Process instances
    async fn find_process_instance(
        &mut self,
        id: &str,
    ) -> Result<Option<ProcessInstanceRecord>, QueryError>;

    async fn save_process_instance(
        &mut self,
        record: &ProcessInstanceRecord,
    ) -> Result<(), QueryError>;

    async fn delete_process_instance(&mut self, id: &str) -> Result<(), QueryError>;

    async fn list_tasks_by_process_instance(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<TaskRecord>, QueryError>;

    // Tasks
    async fn find_task(&mut self, id: &str) -> Result<Option<TaskRecord>, QueryError>;

    async fn find_tasks(&mut self, ids: &[String]) -> Result<Vec<TaskRecord>, QueryError>;

    async fn save_task(&mut self, record: &TaskRecord) -> Result<(), QueryError>;

    async fn delete_task(&mut self, id: &str) -> Result<(), QueryError>;

    // Process variables
    async fn find_process_variable(
        &mut self,
        process_instance_id: &str,
        name: &str,
    ) -> Result<Option<ProcessVariableRecord>, QueryError>;

    async fn find_process_variables(
        &mut self,
        process_instance_id: &str,
        names: &[String],
    ) -> Result<Vec<ProcessVariableRecord>, QueryError>;

    async fn list_process_variables(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<ProcessVariableRecord>, QueryError>;

    async fn save_process_variable(
        &mut self,
        record: &ProcessVariableRecord,
    ) -> Result<(), QueryError>;

    async fn delete_process_variable(&mut self, id: &str) -> Result<(), QueryError>;

    // Task variables
    async fn find_task_variable(
        &mut self,
        task_id: &str,
        name: &str,
    ) -> Result<Option<TaskVariableRecord>, QueryError>;

    async fn list_task_variables(
        &mut self,
        task_id: &str,
    ) -> Result<Vec<TaskVariableRecord>, QueryError>;

    async fn save_task_variable(&mut self, record: &TaskVariableRecord) -> Result<(), QueryError>;

    async fn delete_task_variable(&mut self, id: &str) -> Result<(), QueryError>;

    // Task to process variable snapshot links
    async fn link_task_process_variable(
        &mut self,
        task_id: &str,
        process_variable_id: &str,
    ) -> Result<(), QueryError>;

    async fn unlink_task_process_variable(
        &mut self,
        task_id: &str,
        process_variable_id: &str,
    ) -> Result<(), QueryError>;

    async fn list_task_process_variables(
        &mut self,
        task_id: &str,
    ) -> Result<Vec<ProcessVariableRecord>, QueryError>;

    async fn delete_task_process_variable_links(&mut self, task_id: &str)
    -> Result<(), QueryError>;

    async fn delete_process_variable_links(
        &mut self,
        process_variable_id: &str,
    ) -> Result<(), QueryError>;

    // Task candidates
    async fn task_candidate_user_exists(
        &mut self,
        record: &TaskCandidateUserRecord,
    ) -> Result<bool, QueryError>;

    async fn save_task_candidate_user(
        &mut self,
        record: &TaskCandidateUserRecord,
    ) -> Result<(), QueryError>;

    async fn delete_task_candidate_user(
        &mut self,
        record: &TaskCandidateUserRecord,
    ) -> Result<(), QueryError>;

    async fn list_task_candidate_users(
        &mut self,
        task_id: &str,
    ) -> Result<Vec<TaskCandidateUserRecord>, QueryError>;

    async fn task_candidate_group_exists(
        &mut self,
        record: &TaskCandidateGroupRecord,
    ) -> Result<bool, QueryError>;

    async fn save_task_candidate_group(
        &mut self,
        record: &TaskCandidateGroupRecord,
    ) -> Result<(), QueryError>;

    async fn delete_task_candidate_group(
        &mut self,
        record: &TaskCandidateGroupRecord,
    ) -> Result<(), QueryError>;

    async fn list_task_candidate_groups(
        &mut self,
        task_id: &str,
    ) -> Result<Vec<TaskCandidateGroupRecord>, QueryError>;

    async fn delete_task_candidates(&mut self, task_id: &str) -> Result<(), QueryError>;

    // Process candidate starters
    async fn process_candidate_starter_user_exists(
        &mut self,
        record: &ProcessCandidateStarterUserRecord,
    ) -> Result<bool, QueryError>;

    async fn save_process_candidate_starter_user(
        &mut self,
        record: &ProcessCandidateStarterUserRecord,
    ) -> Result<(), QueryError>;

    async fn delete_process_candidate_starter_user(
        &mut self,
        record: &ProcessCandidateStarterUserRecord,
    ) -> Result<(), QueryError>;

    async fn process_candidate_starter_group_exists(
        &mut self,
        record: &ProcessCandidateStarterGroupRecord,
    ) -> Result<bool, QueryError>;

    async fn save_process_candidate_starter_group(
        &mut self,
        record: &ProcessCandidateStarterGroupRecord,
    ) -> Result<(), QueryError>;

    async fn delete_process_candidate_starter_group(
        &mut self,
        record: &ProcessCandidateStarterGroupRecord,
    ) -> Result<(), QueryError>;

    // BPMN activities
    async fn find_activity(&mut self, id: &str) -> Result<Option<BpmnActivityRecord>, QueryError>;

    async fn find_activities(
        &mut self,
        ids: &[String],
    ) -> Result<Vec<BpmnActivityRecord>, QueryError>;

    async fn save_activity(&mut self, record: &BpmnActivityRecord) -> Result<(), QueryError>;

    async fn list_activities(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<BpmnActivityRecord>, QueryError>;

    async fn delete_activities_by_process_instance(
        &mut self,
        process_instance_id: &str,
    ) -> Result<(), QueryError>;

    // Sequence flows
    async fn sequence_flow_exists(&mut self, event_id: &str) -> Result<bool, QueryError>;

    async fn save_sequence_flow(&mut self, record: &BpmnSequenceFlowRecord)
    -> Result<(), QueryError>;

    async fn list_sequence_flows(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<BpmnSequenceFlowRecord>, QueryError>;

    async fn delete_sequence_flows_by_process_instance(
        &mut self,
        process_instance_id: &str,
    ) -> Result<(), QueryError>;

    // Integration contexts
    async fn find_integration_context(
        &mut self,
        id: &str,
    ) -> Result<Option<IntegrationContextRecord>, QueryError>;

    async fn save_integration_context(
        &mut self,
        record: &IntegrationContextRecord,
    ) -> Result<(), QueryError>;

    async fn list_integration_contexts(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<IntegrationContextRecord>, QueryError>;

    async fn delete_integration_contexts_by_process_instance(
        &mut self,
        process_instance_id: &str,
    ) -> Result<(), QueryError>;

    // Deployments
    async fn find_process_definition(
        &mut self,
        id: &str,
    ) -> Result<Option<ProcessDefinitionRecord>, QueryError>;

    async fn save_process_definition(
        &mut self,
        record: &ProcessDefinitionRecord,
    ) -> Result<(), QueryError>;

    async fn find_process_model(
        &mut self,
        process_definition_id: &str,
    ) -> Result<Option<ProcessModelRecord>, QueryError>;

    async fn save_process_model(&mut self, record: &ProcessModelRecord) -> Result<(), QueryError>;

    async fn find_application(&mut self, id: &str)
    -> Result<Option<ApplicationRecord>, QueryError>;

    async fn save_application(&mut self, record: &ApplicationRecord) -> Result<(), QueryError>;

    // Transaction control
    async fn commit(self: Box<Self>) -> Result<(), QueryError>;

    async fn rollback(self: Box<Self>) -> Result<(), QueryError>;
}

/// Connect the backend selected by `config`, run its migrations, and return
/// it as a shared store.
pub async fn connect(config: &Config) -> Result<Arc<dyn ReadModelStore>, QueryError> {
    match config.backend {
        DatabaseBackend::Sqlite => {
            let options = sqlite_options(&config.database_url)?;
            let pool = SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options)
                .await
                .map_err(|e| QueryError::Database {
                    operation: "connect".to_string(),
                    details: e.to_string(),
                })?;
            migrations::run_sqlite(&pool).await?;
            Ok(Arc::new(SqliteStore::new(pool)))
        }
        DatabaseBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&config.database_url)
                .await
                .map_err(|e| QueryError::Database {
                    operation: "connect".to_string(),
                    details: e.to_string(),
                })?;
            migrations::run_postgres(&pool).await?;
            Ok(Arc::new(PostgresStore::new(pool)))
        }
    }
}

/// Connect options for a SQLite URL. File databases and their parent
/// directories are created on first use.
fn sqlite_options(url: &str) -> Result<SqliteConnectOptions, QueryError> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| QueryError::Database {
            operation: "connect".to_string(),
            details: e.to_string(),
        })?
        .create_if_missing(true);

    if let Some(parent) = options.get_filename().parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| QueryError::Database {
            operation: "create_dir".to_string(),
            details: format!("Failed to create directory {:?}: {}", parent, e),
        })?;
    }

    Ok(options)
}
