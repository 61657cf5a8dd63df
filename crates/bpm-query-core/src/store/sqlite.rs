//! SQLite-backed read model store.

use std::path::Path;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};

use crate::error::QueryError;
use crate::migrations;
use crate::model::{
    ApplicationRecord, BpmnActivityRecord, BpmnSequenceFlowRecord, IntegrationContextRecord,
    ProcessCandidateStarterGroupRecord, ProcessCandidateStarterUserRecord,
    ProcessDefinitionRecord, ProcessInstanceRecord, ProcessModelRecord, ProcessVariableRecord,
    ServiceMetadata, TaskCandidateGroupRecord, TaskCandidateUserRecord, TaskRecord,
    TaskVariableRecord,
};

use super::{ReadModelStore, UnitOfWork};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_service<'q>(query: SqliteQuery<'q>, service: &'q ServiceMetadata) -> SqliteQuery<'q> {
    query
        .bind(&service.service_name)
        .bind(&service.service_full_name)
        .bind(&service.service_version)
        .bind(&service.app_name)
        .bind(&service.app_version)
}

/// SQLite-backed read model store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a store from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a store backed by a database file.
    ///
    /// Creates parent directories and the database file if needed, then runs
    /// all migrations.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = SqliteStore::from_path(".data/query.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, QueryError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| QueryError::Database {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| QueryError::Database {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {:?}: {}", path, e),
            })?;

        migrations::run_sqlite(&pool).await?;

        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ReadModelStore for SqliteStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, QueryError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteUnitOfWork { tx }))
    }

    async fn health_check(&self) -> Result<(), QueryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// A unit of work over one SQLite transaction.
pub struct SqliteUnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn find_process_instance(
        &mut self,
        id: &str,
    ) -> Result<Option<ProcessInstanceRecord>, QueryError> {
        let record = sqlx::query_as::<_, ProcessInstanceRecord>(
            "SELECT * FROM process_instances WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn save_process_instance(
        &mut self,
        record: &ProcessInstanceRecord,
    ) -> Result<(), QueryError> {
        let query = sqlx::query(
            r#"
            INSERT INTO process_instances (
                id, name, status, business_key, process_definition_id,
                process_definition_key, process_definition_version, process_definition_name,
                initiator, parent_id, start_date, completed_date, suspended_date, last_modified,
                service_name, service_full_name, service_version, app_name, app_version
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                business_key = excluded.business_key,
                process_definition_id = excluded.process_definition_id,
                process_definition_key = excluded.process_definition_key,
                process_definition_version = excluded.process_definition_version,
                process_definition_name = excluded.process_definition_name,
                initiator = excluded.initiator,
                parent_id = excluded.parent_id,
                start_date = excluded.start_date,
                completed_date = excluded.completed_date,
                suspended_date = excluded.suspended_date,
                last_modified = excluded.last_modified,
                service_name = excluded.service_name,
                service_full_name = excluded.service_full_name,
                service_version = excluded.service_version,
                app_name = excluded.app_name,
                app_version = excluded.app_version
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(record.status.as_str())
        .bind(&record.business_key)
        .bind(&record.process_definition_id)
        .bind(&record.process_definition_key)
        .bind(record.process_definition_version)
        .bind(&record.process_definition_name)
        .bind(&record.initiator)
        .bind(&record.parent_id)
        .bind(record.start_date)
        .bind(record.completed_date)
        .bind(record.suspended_date)
        .bind(record.last_modified);

        bind_service(query, &record.service)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn delete_process_instance(&mut self, id: &str) -> Result<(), QueryError> {
        sqlx::query("DELETE FROM process_instances WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn list_tasks_by_process_instance(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<TaskRecord>, QueryError> {
        let records = sqlx::query_as::<_, TaskRecord>(
            "SELECT * FROM tasks WHERE process_instance_id = ? ORDER BY created_date, id",
        )
        .bind(process_instance_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(records)
    }

    async fn find_task(&mut self, id: &str) -> Result<Option<TaskRecord>, QueryError> {
        let record = sqlx::query_as::<_, TaskRecord>("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(record)
    }

    async fn find_tasks(&mut self, ids: &[String]) -> Result<Vec<TaskRecord>, QueryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM tasks WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let records = builder
            .build_query_as::<TaskRecord>()
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(records)
    }

    async fn save_task(&mut self, record: &TaskRecord) -> Result<(), QueryError> {
        let query = sqlx::query(
            r#"
            INSERT INTO tasks (
                id, name, description, assignee, owner, priority, status,
                created_date, due_date, claimed_date, completed_date, completed_by,
                duration, last_modified, process_instance_id, process_definition_id,
                process_definition_version, business_key, task_definition_key,
                parent_task_id, form_key,
                service_name, service_full_name, service_version, app_name, app_version
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                assignee = excluded.assignee,
                owner = excluded.owner,
                priority = excluded.priority,
                status = excluded.status,
                created_date = excluded.created_date,
                due_date = excluded.due_date,
                claimed_date = excluded.claimed_date,
                completed_date = excluded.completed_date,
                completed_by = excluded.completed_by,
                duration = excluded.duration,
                last_modified = excluded.last_modified,
                process_instance_id = excluded.process_instance_id,
                process_definition_id = excluded.process_definition_id,
                process_definition_version = excluded.process_definition_version,
                business_key = excluded.business_key,
                task_definition_key = excluded.task_definition_key,
                parent_task_id = excluded.parent_task_id,
                form_key = excluded.form_key,
                service_name = excluded.service_name,
                service_full_name = excluded.service_full_name,
                service_version = excluded.service_version,
                app_name = excluded.app_name,
                app_version = excluded.app_version
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.description)
        .bind(&record.assignee)
        .bind(&record.owner)
        .bind(record.priority)
        .bind(record.status.as_str())
        .bind(record.created_date)
        .bind(record.due_date)
        .bind(record.claimed_date)
        .bind(record.completed_date)
        .bind(&record.completed_by)
        .bind(record.duration)
        .bind(record.last_modified)
        .bind(&record.process_instance_id)
        .bind(&record.process_definition_id)
        .bind(record.process_definition_version)
        .bind(&record.business_key)
        .bind(&record.task_definition_key)
        .bind(&record.parent_task_id)
        .bind(&record.form_key);

        bind_service(query, &record.service)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn delete_task(&mut self, id: &str) -> Result<(), QueryError> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn find_process_variable(
        &mut self,
        process_instance_id: &str,
        name: &str,
    ) -> Result<Option<ProcessVariableRecord>, QueryError> {
        let record = sqlx::query_as::<_, ProcessVariableRecord>(
            "SELECT * FROM process_variables WHERE process_instance_id = ? AND name = ?",
        )
        .bind(process_instance_id)
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn find_process_variables(
        &mut self,
        process_instance_id: &str,
        names: &[String],
    ) -> Result<Vec<ProcessVariableRecord>, QueryError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT * FROM process_variables WHERE process_instance_id = ",
        );
        builder.push_bind(process_instance_id);
        builder.push(" AND name IN (");
        let mut separated = builder.separated(", ");
        for name in names {
            separated.push_bind(name.as_str());
        }
        separated.push_unseparated(")");

        let records = builder
            .build_query_as::<ProcessVariableRecord>()
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(records)
    }

    async fn list_process_variables(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<ProcessVariableRecord>, QueryError> {
        let records = sqlx::query_as::<_, ProcessVariableRecord>(
            "SELECT * FROM process_variables WHERE process_instance_id = ? ORDER BY name",
        )
        .bind(process_instance_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(records)
    }

    async fn save_process_variable(
        &mut self,
        record: &ProcessVariableRecord,
    ) -> Result<(), QueryError> {
        let query = sqlx::query(
            r#"
            INSERT INTO process_variables (
                id, process_instance_id, name, var_type, value, create_time, last_updated_time,
                service_name, service_full_name, service_version, app_name, app_version
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                var_type = excluded.var_type,
                value = excluded.value,
                last_updated_time = excluded.last_updated_time,
                service_name = excluded.service_name,
                service_full_name = excluded.service_full_name,
                service_version = excluded.service_version,
                app_name = excluded.app_name,
                app_version = excluded.app_version
            "#,
        )
        .bind(&record.id)
        .bind(&record.process_instance_id)
        .bind(&record.name)
        .bind(&record.var_type)
        .bind(&record.value)
        .bind(record.create_time)
        .bind(record.last_updated_time);

        bind_service(query, &record.service)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn delete_process_variable(&mut self, id: &str) -> Result<(), QueryError> {
        sqlx::query("DELETE FROM process_variables WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn find_task_variable(
        &mut self,
        task_id: &str,
        name: &str,
    ) -> Result<Option<TaskVariableRecord>, QueryError> {
        let record = sqlx::query_as::<_, TaskVariableRecord>(
            "SELECT * FROM task_variables WHERE task_id = ? AND name = ?",
        )
        .bind(task_id)
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn list_task_variables(
        &mut self,
        task_id: &str,
    ) -> Result<Vec<TaskVariableRecord>, QueryError> {
        let records = sqlx::query_as::<_, TaskVariableRecord>(
            "SELECT * FROM task_variables WHERE task_id = ? ORDER BY name",
        )
        .bind(task_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(records)
    }

    async fn save_task_variable(&mut self, record: &TaskVariableRecord) -> Result<(), QueryError> {
        let query = sqlx::query(
            r#"
            INSERT INTO task_variables (
                id, task_id, process_instance_id, name, var_type, value,
                create_time, last_updated_time,
                service_name, service_full_name, service_version, app_name, app_version
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                var_type = excluded.var_type,
                value = excluded.value,
                last_updated_time = excluded.last_updated_time,
                service_name = excluded.service_name,
                service_full_name = excluded.service_full_name,
                service_version = excluded.service_version,
                app_name = excluded.app_name,
                app_version = excluded.app_version
            "#,
        )
        .bind(&record.id)
        .bind(&record.task_id)
        .bind(&record.process_instance_id)
        .bind(&record.name)
        .bind(&record.var_type)
        .bind(&record.value)
        .bind(record.create_time)
        .bind(record.last_updated_time);

        bind_service(query, &record.service)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn delete_task_variable(&mut self, id: &str) -> Result<(), QueryError> {
        sqlx::query("DELETE FROM task_variables WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn link_task_process_variable(
        &mut self,
        task_id: &str,
        process_variable_id: &str,
    ) -> Result<(), QueryError> {
        sqlx::query(
            r#"
            INSERT INTO task_process_variables (task_id, process_variable_id)
            VALUES (?, ?)
            ON CONFLICT(task_id, process_variable_id) DO NOTHING
            "#,
        )
        .bind(task_id)
        .bind(process_variable_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn unlink_task_process_variable(
        &mut self,
        task_id: &str,
        process_variable_id: &str,
    ) -> Result<(), QueryError> {
        sqlx::query(
            "DELETE FROM task_process_variables WHERE task_id = ? AND process_variable_id = ?",
        )
        .bind(task_id)
        .bind(process_variable_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn list_task_process_variables(
        &mut self,
        task_id: &str,
    ) -> Result<Vec<ProcessVariableRecord>, QueryError> {
        let records = sqlx::query_as::<_, ProcessVariableRecord>(
            r#"
            SELECT pv.*
            FROM process_variables pv
            JOIN task_process_variables l ON l.process_variable_id = pv.id
            WHERE l.task_id = ?
            ORDER BY pv.name
            "#,
        )
        .bind(task_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(records)
    }

    async fn delete_task_process_variable_links(
        &mut self,
        task_id: &str,
    ) -> Result<(), QueryError> {
        sqlx::query("DELETE FROM task_process_variables WHERE task_id = ?")
            .bind(task_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn delete_process_variable_links(
        &mut self,
        process_variable_id: &str,
    ) -> Result<(), QueryError> {
        sqlx::query("DELETE FROM task_process_variables WHERE process_variable_id = ?")
            .bind(process_variable_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn task_candidate_user_exists(
        &mut self,
        record: &TaskCandidateUserRecord,
    ) -> Result<bool, QueryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM task_candidate_users WHERE task_id = ? AND user_id = ?)",
        )
        .bind(&record.task_id)
        .bind(&record.user_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn save_task_candidate_user(
        &mut self,
        record: &TaskCandidateUserRecord,
    ) -> Result<(), QueryError> {
        sqlx::query(
            r#"
            INSERT INTO task_candidate_users (task_id, user_id)
            VALUES (?, ?)
            ON CONFLICT(task_id, user_id) DO NOTHING
            "#,
        )
        .bind(&record.task_id)
        .bind(&record.user_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_task_candidate_user(
        &mut self,
        record: &TaskCandidateUserRecord,
    ) -> Result<(), QueryError> {
        sqlx::query("DELETE FROM task_candidate_users WHERE task_id = ? AND user_id = ?")
            .bind(&record.task_id)
            .bind(&record.user_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn list_task_candidate_users(
        &mut self,
        task_id: &str,
    ) -> Result<Vec<TaskCandidateUserRecord>, QueryError> {
        let records = sqlx::query_as::<_, TaskCandidateUserRecord>(
            "SELECT task_id, user_id FROM task_candidate_users WHERE task_id = ? ORDER BY user_id",
        )
        .bind(task_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(records)
    }

    async fn task_candidate_group_exists(
        &mut self,
        record: &TaskCandidateGroupRecord,
    ) -> Result<bool, QueryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM task_candidate_groups WHERE task_id = ? AND group_id = ?)",
        )
        .bind(&record.task_id)
        .bind(&record.group_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn save_task_candidate_group(
        &mut self,
        record: &TaskCandidateGroupRecord,
    ) -> Result<(), QueryError> {
        sqlx::query(
            r#"
            INSERT INTO task_candidate_groups (task_id, group_id)
            VALUES (?, ?)
            ON CONFLICT(task_id, group_id) DO NOTHING
            "#,
        )
        .bind(&record.task_id)
        .bind(&record.group_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_task_candidate_group(
        &mut self,
        record: &TaskCandidateGroupRecord,
    ) -> Result<(), QueryError> {
        sqlx::query("DELETE FROM task_candidate_groups WHERE task_id = ? AND group_id = ?")
            .bind(&record.task_id)
            .bind(&record.group_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn list_task_candidate_groups(
        &mut self,
        task_id: &str,
    ) -> Result<Vec<TaskCandidateGroupRecord>, QueryError> {
        let records = sqlx::query_as::<_, TaskCandidateGroupRecord>(
            "SELECT task_id, group_id FROM task_candidate_groups WHERE task_id = ? ORDER BY group_id",
        )
        .bind(task_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(records)
    }

    async fn delete_task_candidates(&mut self, task_id: &str) -> Result<(), QueryError> {
        sqlx::query("DELETE FROM task_candidate_users WHERE task_id = ?")
            .bind(task_id)
            .execute(&mut *self.tx)
            .await?;

        sqlx::query("DELETE FROM task_candidate_groups WHERE task_id = ?")
            .bind(task_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn process_candidate_starter_user_exists(
        &mut self,
        record: &ProcessCandidateStarterUserRecord,
    ) -> Result<bool, QueryError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM process_candidate_starter_users
                WHERE process_definition_id = ? AND user_id = ?
            )
            "#,
        )
        .bind(&record.process_definition_id)
        .bind(&record.user_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn save_process_candidate_starter_user(
        &mut self,
        record: &ProcessCandidateStarterUserRecord,
    ) -> Result<(), QueryError> {
        sqlx::query(
            r#"
            INSERT INTO process_candidate_starter_users (process_definition_id, user_id)
            VALUES (?, ?)
            ON CONFLICT(process_definition_id, user_id) DO NOTHING
            "#,
        )
        .bind(&record.process_definition_id)
        .bind(&record.user_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_process_candidate_starter_user(
        &mut self,
        record: &ProcessCandidateStarterUserRecord,
    ) -> Result<(), QueryError> {
        sqlx::query(
            "DELETE FROM process_candidate_starter_users WHERE process_definition_id = ? AND user_id = ?",
        )
        .bind(&record.process_definition_id)
        .bind(&record.user_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn process_candidate_starter_group_exists(
        &mut self,
        record: &ProcessCandidateStarterGroupRecord,
    ) -> Result<bool, QueryError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM process_candidate_starter_groups
                WHERE process_definition_id = ? AND group_id = ?
            )
            "#,
        )
        .bind(&record.process_definition_id)
        .bind(&record.group_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn save_process_candidate_starter_group(
        &mut self,
        record: &ProcessCandidateStarterGroupRecord,
    ) -> Result<(), QueryError> {
        sqlx::query(
            r#"
            INSERT INTO process_candidate_starter_groups (process_definition_id, group_id)
            VALUES (?, ?)
            ON CONFLICT(process_definition_id, group_id) DO NOTHING
            "#,
        )
        .bind(&record.process_definition_id)
        .bind(&record.group_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_process_candidate_starter_group(
        &mut self,
        record: &ProcessCandidateStarterGroupRecord,
    ) -> Result<(), QueryError> {
        sqlx::query(
            "DELETE FROM process_candidate_starter_groups WHERE process_definition_id = ? AND group_id = ?",
        )
        .bind(&record.process_definition_id)
        .bind(&record.group_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_activity(&mut self, id: &str) -> Result<Option<BpmnActivityRecord>, QueryError> {
        let record =
            sqlx::query_as::<_, BpmnActivityRecord>("SELECT * FROM bpmn_activities WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(record)
    }

    async fn find_activities(
        &mut self,
        ids: &[String],
    ) -> Result<Vec<BpmnActivityRecord>, QueryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT * FROM bpmn_activities WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let records = builder
            .build_query_as::<BpmnActivityRecord>()
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(records)
    }

    async fn save_activity(&mut self, record: &BpmnActivityRecord) -> Result<(), QueryError> {
        let query = sqlx::query(
            r#"
            INSERT INTO bpmn_activities (
                id, element_id, activity_name, activity_type, process_instance_id,
                process_definition_id, process_definition_key, process_definition_version,
                business_key, execution_id, status, started_date, completed_date, cancelled_date,
                service_name, service_full_name, service_version, app_name, app_version
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                activity_name = excluded.activity_name,
                activity_type = excluded.activity_type,
                process_definition_id = excluded.process_definition_id,
                process_definition_key = excluded.process_definition_key,
                process_definition_version = excluded.process_definition_version,
                business_key = excluded.business_key,
                execution_id = excluded.execution_id,
                status = excluded.status,
                started_date = excluded.started_date,
                completed_date = excluded.completed_date,
                cancelled_date = excluded.cancelled_date,
                service_name = excluded.service_name,
                service_full_name = excluded.service_full_name,
                service_version = excluded.service_version,
                app_name = excluded.app_name,
                app_version = excluded.app_version
            "#,
        )
        .bind(&record.id)
        .bind(&record.element_id)
        .bind(&record.activity_name)
        .bind(&record.activity_type)
        .bind(&record.process_instance_id)
        .bind(&record.process_definition_id)
        .bind(&record.process_definition_key)
        .bind(record.process_definition_version)
        .bind(&record.business_key)
        .bind(&record.execution_id)
        .bind(record.status.as_str())
        .bind(record.started_date)
        .bind(record.completed_date)
        .bind(record.cancelled_date);

        bind_service(query, &record.service)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn list_activities(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<BpmnActivityRecord>, QueryError> {
        let records = sqlx::query_as::<_, BpmnActivityRecord>(
            "SELECT * FROM bpmn_activities WHERE process_instance_id = ? ORDER BY started_date, id",
        )
        .bind(process_instance_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(records)
    }

    async fn delete_activities_by_process_instance(
        &mut self,
        process_instance_id: &str,
    ) -> Result<(), QueryError> {
        sqlx::query("DELETE FROM bpmn_activities WHERE process_instance_id = ?")
            .bind(process_instance_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn sequence_flow_exists(&mut self, event_id: &str) -> Result<bool, QueryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM bpmn_sequence_flows WHERE event_id = ?)")
                .bind(event_id)
                .fetch_one(&mut *self.tx)
                .await?;

        Ok(exists)
    }

    async fn save_sequence_flow(
        &mut self,
        record: &BpmnSequenceFlowRecord,
    ) -> Result<(), QueryError> {
        let query = sqlx::query(
            r#"
            INSERT INTO bpmn_sequence_flows (
                id, event_id, element_id, process_instance_id, process_definition_id,
                process_definition_key, process_definition_version, business_key,
                source_activity_element_id, source_activity_name, source_activity_type,
                target_activity_element_id, target_activity_name, target_activity_type, date,
                service_name, service_full_name, service_version, app_name, app_version
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.event_id)
        .bind(&record.element_id)
        .bind(&record.process_instance_id)
        .bind(&record.process_definition_id)
        .bind(&record.process_definition_key)
        .bind(record.process_definition_version)
        .bind(&record.business_key)
        .bind(&record.source_activity_element_id)
        .bind(&record.source_activity_name)
        .bind(&record.source_activity_type)
        .bind(&record.target_activity_element_id)
        .bind(&record.target_activity_name)
        .bind(&record.target_activity_type)
        .bind(record.date);

        bind_service(query, &record.service)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn list_sequence_flows(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<BpmnSequenceFlowRecord>, QueryError> {
        let records = sqlx::query_as::<_, BpmnSequenceFlowRecord>(
            "SELECT * FROM bpmn_sequence_flows WHERE process_instance_id = ? ORDER BY date, id",
        )
        .bind(process_instance_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(records)
    }

    async fn delete_sequence_flows_by_process_instance(
        &mut self,
        process_instance_id: &str,
    ) -> Result<(), QueryError> {
        sqlx::query("DELETE FROM bpmn_sequence_flows WHERE process_instance_id = ?")
            .bind(process_instance_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn find_integration_context(
        &mut self,
        id: &str,
    ) -> Result<Option<IntegrationContextRecord>, QueryError> {
        let record = sqlx::query_as::<_, IntegrationContextRecord>(
            "SELECT * FROM integration_contexts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn save_integration_context(
        &mut self,
        record: &IntegrationContextRecord,
    ) -> Result<(), QueryError> {
        let query = sqlx::query(
            r#"
            INSERT INTO integration_contexts (
                id, process_instance_id, root_process_instance_id, parent_process_instance_id,
                execution_id, process_definition_id, process_definition_key,
                process_definition_version, business_key, client_id, client_name, client_type,
                connector_type, activity_id, status, request_date, result_date, error_date,
                error_code, error_message, error_class_name, stack_trace_elements,
                in_bound_variables, out_bound_variables,
                service_name, service_full_name, service_version, app_name, app_version
            )
            VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            )
            ON CONFLICT(id) DO UPDATE SET
                root_process_instance_id = excluded.root_process_instance_id,
                parent_process_instance_id = excluded.parent_process_instance_id,
                execution_id = excluded.execution_id,
                process_definition_id = excluded.process_definition_id,
                process_definition_key = excluded.process_definition_key,
                process_definition_version = excluded.process_definition_version,
                business_key = excluded.business_key,
                client_name = excluded.client_name,
                client_type = excluded.client_type,
                connector_type = excluded.connector_type,
                activity_id = excluded.activity_id,
                status = excluded.status,
                request_date = excluded.request_date,
                result_date = excluded.result_date,
                error_date = excluded.error_date,
                error_code = excluded.error_code,
                error_message = excluded.error_message,
                error_class_name = excluded.error_class_name,
                stack_trace_elements = excluded.stack_trace_elements,
                in_bound_variables = excluded.in_bound_variables,
                out_bound_variables = excluded.out_bound_variables,
                service_name = excluded.service_name,
                service_full_name = excluded.service_full_name,
                service_version = excluded.service_version,
                app_name = excluded.app_name,
                app_version = excluded.app_version
            "#,
        )
        .bind(&record.id)
        .bind(&record.process_instance_id)
        .bind(&record.root_process_instance_id)
        .bind(&record.parent_process_instance_id)
        .bind(&record.execution_id)
        .bind(&record.process_definition_id)
        .bind(&record.process_definition_key)
        .bind(record.process_definition_version)
        .bind(&record.business_key)
        .bind(&record.client_id)
        .bind(&record.client_name)
        .bind(&record.client_type)
        .bind(&record.connector_type)
        .bind(&record.activity_id)
        .bind(record.status.as_str())
        .bind(record.request_date)
        .bind(record.result_date)
        .bind(record.error_date)
        .bind(&record.error_code)
        .bind(&record.error_message)
        .bind(&record.error_class_name)
        .bind(&record.stack_trace_elements)
        .bind(&record.in_bound_variables)
        .bind(&record.out_bound_variables);

        bind_service(query, &record.service)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn list_integration_contexts(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<IntegrationContextRecord>, QueryError> {
        let records = sqlx::query_as::<_, IntegrationContextRecord>(
            "SELECT * FROM integration_contexts WHERE process_instance_id = ? ORDER BY request_date, id",
        )
        .bind(process_instance_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(records)
    }

    async fn delete_integration_contexts_by_process_instance(
        &mut self,
        process_instance_id: &str,
    ) -> Result<(), QueryError> {
        sqlx::query("DELETE FROM integration_contexts WHERE process_instance_id = ?")
            .bind(process_instance_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn find_process_definition(
        &mut self,
        id: &str,
    ) -> Result<Option<ProcessDefinitionRecord>, QueryError> {
        let record = sqlx::query_as::<_, ProcessDefinitionRecord>(
            "SELECT * FROM process_definitions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn save_process_definition(
        &mut self,
        record: &ProcessDefinitionRecord,
    ) -> Result<(), QueryError> {
        let query = sqlx::query(
            r#"
            INSERT INTO process_definitions (
                id, process_definition_key, name, description, version, form_key, category,
                service_name, service_full_name, service_version, app_name, app_version
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                process_definition_key = excluded.process_definition_key,
                name = excluded.name,
                description = excluded.description,
                version = excluded.version,
                form_key = excluded.form_key,
                category = excluded.category,
                service_name = excluded.service_name,
                service_full_name = excluded.service_full_name,
                service_version = excluded.service_version,
                app_name = excluded.app_name,
                app_version = excluded.app_version
            "#,
        )
        .bind(&record.id)
        .bind(&record.process_definition_key)
        .bind(&record.name)
        .bind(&record.description)
        .bind(record.version)
        .bind(&record.form_key)
        .bind(&record.category);

        bind_service(query, &record.service)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn find_process_model(
        &mut self,
        process_definition_id: &str,
    ) -> Result<Option<ProcessModelRecord>, QueryError> {
        let record = sqlx::query_as::<_, ProcessModelRecord>(
            "SELECT process_definition_id, process_model_content FROM process_models WHERE process_definition_id = ?",
        )
        .bind(process_definition_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn save_process_model(&mut self, record: &ProcessModelRecord) -> Result<(), QueryError> {
        sqlx::query(
            r#"
            INSERT INTO process_models (process_definition_id, process_model_content)
            VALUES (?, ?)
            ON CONFLICT(process_definition_id) DO UPDATE SET
                process_model_content = excluded.process_model_content
            "#,
        )
        .bind(&record.process_definition_id)
        .bind(&record.process_model_content)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_application(&mut self, id: &str) -> Result<Option<ApplicationRecord>, QueryError> {
        let record = sqlx::query_as::<_, ApplicationRecord>(
            "SELECT id, name, version FROM applications WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn save_application(&mut self, record: &ApplicationRecord) -> Result<(), QueryError> {
        sqlx::query(
            r#"
            INSERT INTO applications (id, name, version)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                version = excluded.version
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.version)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), QueryError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), QueryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProcessInstanceStatus, TaskStatus};
    use chrono::{TimeZone, Utc};

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create SQLite pool");

        migrations::SQLITE
            .run(&pool)
            .await
            .expect("Failed to run SQLite migrations");

        pool
    }

    fn process_instance(id: &str) -> ProcessInstanceRecord {
        ProcessInstanceRecord {
            id: id.to_string(),
            name: Some("invoice".to_string()),
            status: ProcessInstanceStatus::Created,
            business_key: Some("bk-1".to_string()),
            process_definition_id: Some("invoice:1".to_string()),
            process_definition_key: Some("invoice".to_string()),
            process_definition_version: Some(1),
            process_definition_name: None,
            initiator: Some("jane".to_string()),
            parent_id: None,
            start_date: None,
            completed_date: None,
            suspended_date: None,
            last_modified: Some(Utc.timestamp_millis_opt(1_000).unwrap()),
            service: ServiceMetadata {
                app_name: Some("billing".to_string()),
                ..Default::default()
            },
        }
    }

    fn task(id: &str, process_instance_id: Option<&str>) -> TaskRecord {
        TaskRecord {
            id: id.to_string(),
            name: Some("review".to_string()),
            description: None,
            assignee: None,
            owner: None,
            priority: Some(50),
            status: TaskStatus::Created,
            created_date: Some(Utc.timestamp_millis_opt(2_000).unwrap()),
            due_date: None,
            claimed_date: None,
            completed_date: None,
            completed_by: None,
            duration: None,
            last_modified: None,
            process_instance_id: process_instance_id.map(str::to_string),
            process_definition_id: None,
            process_definition_version: None,
            business_key: None,
            task_definition_key: None,
            parent_task_id: None,
            form_key: None,
            service: ServiceMetadata::default(),
        }
    }

    #[tokio::test]
    async fn test_process_instance_upsert_and_find() {
        let store = SqliteStore::new(test_pool().await);

        let mut uow = store.begin().await.unwrap();
        let mut record = process_instance("pi-1");
        uow.save_process_instance(&record).await.unwrap();

        record.status = ProcessInstanceStatus::Running;
        record.start_date = Some(Utc.timestamp_millis_opt(5_000).unwrap());
        uow.save_process_instance(&record).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let found = uow.find_process_instance("pi-1").await.unwrap().unwrap();
        assert_eq!(found, record);
        assert!(uow.find_process_instance("pi-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = SqliteStore::new(test_pool().await);

        let mut uow = store.begin().await.unwrap();
        uow.save_process_instance(&process_instance("pi-1"))
            .await
            .unwrap();
        uow.rollback().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert!(uow.find_process_instance("pi-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_tasks_by_ids() {
        let store = SqliteStore::new(test_pool().await);
        let mut uow = store.begin().await.unwrap();

        uow.save_task(&task("t1", Some("pi-1"))).await.unwrap();
        uow.save_task(&task("t2", Some("pi-1"))).await.unwrap();
        uow.save_task(&task("t3", None)).await.unwrap();

        let found = uow
            .find_tasks(&["t1".to_string(), "t3".to_string(), "missing".to_string()])
            .await
            .unwrap();
        let mut ids: Vec<_> = found.iter().map(|t| t.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["t1", "t3"]);

        let by_instance = uow.list_tasks_by_process_instance("pi-1").await.unwrap();
        assert_eq!(by_instance.len(), 2);

        assert!(uow.find_tasks(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_task_process_variable_links() {
        let store = SqliteStore::new(test_pool().await);
        let mut uow = store.begin().await.unwrap();

        uow.save_process_instance(&process_instance("pi-1"))
            .await
            .unwrap();
        uow.save_task(&task("t1", Some("pi-1"))).await.unwrap();

        let variable = ProcessVariableRecord {
            id: "v1".to_string(),
            process_instance_id: "pi-1".to_string(),
            name: "amount".to_string(),
            var_type: Some("integer".to_string()),
            value: Some("10".to_string()),
            create_time: None,
            last_updated_time: None,
            service: ServiceMetadata::default(),
        };
        uow.save_process_variable(&variable).await.unwrap();

        uow.link_task_process_variable("t1", "v1").await.unwrap();
        uow.link_task_process_variable("t1", "v1").await.unwrap();

        let linked = uow.list_task_process_variables("t1").await.unwrap();
        assert_eq!(linked, vec![variable]);

        uow.delete_process_variable_links("v1").await.unwrap();
        assert!(uow.list_task_process_variables("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_process_variable_requires_instance() {
        let store = SqliteStore::new(test_pool().await);
        let mut uow = store.begin().await.unwrap();

        let variable = ProcessVariableRecord {
            id: "v1".to_string(),
            process_instance_id: "missing".to_string(),
            name: "amount".to_string(),
            var_type: None,
            value: None,
            create_time: None,
            last_updated_time: None,
            service: ServiceMetadata::default(),
        };

        let err = uow.save_process_variable(&variable).await.unwrap_err();
        assert_eq!(err.error_code(), "DATABASE_ERROR");
    }

    #[tokio::test]
    async fn test_candidates() {
        let store = SqliteStore::new(test_pool().await);
        let mut uow = store.begin().await.unwrap();
        uow.save_task(&task("t1", None)).await.unwrap();

        let user = TaskCandidateUserRecord {
            task_id: "t1".to_string(),
            user_id: "bob".to_string(),
        };
        assert!(!uow.task_candidate_user_exists(&user).await.unwrap());
        uow.save_task_candidate_user(&user).await.unwrap();
        assert!(uow.task_candidate_user_exists(&user).await.unwrap());

        let group = TaskCandidateGroupRecord {
            task_id: "t1".to_string(),
            group_id: "finance".to_string(),
        };
        uow.save_task_candidate_group(&group).await.unwrap();
        assert_eq!(uow.list_task_candidate_groups("t1").await.unwrap(), vec![group]);

        uow.delete_task_candidates("t1").await.unwrap();
        assert!(uow.list_task_candidate_users("t1").await.unwrap().is_empty());
        assert!(uow.list_task_candidate_groups("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deployment_merge() {
        let store = SqliteStore::new(test_pool().await);
        let mut uow = store.begin().await.unwrap();

        let mut model = ProcessModelRecord {
            process_definition_id: "invoice:1".to_string(),
            process_model_content: "<v1/>".to_string(),
        };
        uow.save_process_model(&model).await.unwrap();
        model.process_model_content = "<v2/>".to_string();
        uow.save_process_model(&model).await.unwrap();

        let found = uow.find_process_model("invoice:1").await.unwrap().unwrap();
        assert_eq!(found.process_model_content, "<v2/>");
    }

    #[tokio::test]
    async fn test_from_path_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("query.db");

        let store = SqliteStore::from_path(&path).await.unwrap();
        store.health_check().await.unwrap();

        assert!(path.exists());
    }
}
