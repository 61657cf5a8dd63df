// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed read model store.
//!
//! Batch lookups bind the id list as a single array parameter (`= ANY($1)`).

use async_trait::async_trait;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::QueryError;
use crate::model::{
    ApplicationRecord, BpmnActivityRecord, BpmnSequenceFlowRecord, IntegrationContextRecord,
    ProcessCandidateStarterGroupRecord, ProcessCandidateStarterUserRecord,
    ProcessDefinitionRecord, ProcessInstanceRecord, ProcessModelRecord, ProcessVariableRecord,
    ServiceMetadata, TaskCandidateGroupRecord, TaskCandidateUserRecord, TaskRecord,
    TaskVariableRecord,
};

use super::{ReadModelStore, UnitOfWork};

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

fn bind_service<'q>(query: PgQuery<'q>, service: &'q ServiceMetadata) -> PgQuery<'q> {
    query
        .bind(&service.service_name)
        .bind(&service.service_full_name)
        .bind(&service.service_version)
        .bind(&service.app_name)
        .bind(&service.app_version)
}

/// PostgreSQL-backed read model store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a store from an existing, migrated pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ReadModelStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, QueryError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }

    async fn health_check(&self) -> Result<(), QueryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// A unit of work over one PostgreSQL transaction.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    // ========================================================================
    // Process instances
    // ========================================================================

    async fn find_process_instance(
        &mut self,
        id: &str,
    ) -> Result<Option<ProcessInstanceRecord>, QueryError> {
        let record = sqlx::query_as::<_, ProcessInstanceRecord>(
            "SELECT * FROM process_instances WHERE id = $1",
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
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                status = EXCLUDED.status,
                business_key = EXCLUDED.business_key,
                process_definition_id = EXCLUDED.process_definition_id,
                process_definition_key = EXCLUDED.process_definition_key,
                process_definition_version = EXCLUDED.process_definition_version,
                process_definition_name = EXCLUDED.process_definition_name,
                initiator = EXCLUDED.initiator,
                parent_id = EXCLUDED.parent_id,
                start_date = EXCLUDED.start_date,
                completed_date = EXCLUDED.completed_date,
                suspended_date = EXCLUDED.suspended_date,
                last_modified = EXCLUDED.last_modified,
                service_name = EXCLUDED.service_name,
                service_full_name = EXCLUDED.service_full_name,
                service_version = EXCLUDED.service_version,
                app_name = EXCLUDED.app_name,
                app_version = EXCLUDED.app_version
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
        sqlx::query("DELETE FROM process_instances WHERE id = $1")
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
            "SELECT * FROM tasks WHERE process_instance_id = $1 ORDER BY created_date, id",
        )
        .bind(process_instance_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(records)
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    async fn find_task(&mut self, id: &str) -> Result<Option<TaskRecord>, QueryError> {
        let record = sqlx::query_as::<_, TaskRecord>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(record)
    }

    async fn find_tasks(&mut self, ids: &[String]) -> Result<Vec<TaskRecord>, QueryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let records = sqlx::query_as::<_, TaskRecord>("SELECT * FROM tasks WHERE id = ANY($1)")
            .bind(ids)
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
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26
            )
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                assignee = EXCLUDED.assignee,
                owner = EXCLUDED.owner,
                priority = EXCLUDED.priority,
                status = EXCLUDED.status,
                created_date = EXCLUDED.created_date,
                due_date = EXCLUDED.due_date,
                claimed_date = EXCLUDED.claimed_date,
                completed_date = EXCLUDED.completed_date,
                completed_by = EXCLUDED.completed_by,
                duration = EXCLUDED.duration,
                last_modified = EXCLUDED.last_modified,
                process_instance_id = EXCLUDED.process_instance_id,
                process_definition_id = EXCLUDED.process_definition_id,
                process_definition_version = EXCLUDED.process_definition_version,
                business_key = EXCLUDED.business_key,
                task_definition_key = EXCLUDED.task_definition_key,
                parent_task_id = EXCLUDED.parent_task_id,
                form_key = EXCLUDED.form_key,
                service_name = EXCLUDED.service_name,
                service_full_name = EXCLUDED.service_full_name,
                service_version = EXCLUDED.service_version,
                app_name = EXCLUDED.app_name,
                app_version = EXCLUDED.app_version
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
        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    // ========================================================================
    // Process variables
    // ========================================================================

    async fn find_process_variable(
        &mut self,
        process_instance_id: &str,
        name: &str,
    ) -> Result<Option<ProcessVariableRecord>, QueryError> {
        let record = sqlx::query_as::<_, ProcessVariableRecord>(
            "SELECT * FROM process_variables WHERE process_instance_id = $1 AND name = $2",
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

        let records = sqlx::query_as::<_, ProcessVariableRecord>(
            "SELECT * FROM process_variables WHERE process_instance_id = $1 AND name = ANY($2)",
        )
        .bind(process_instance_id)
        .bind(names)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(records)
    }

    async fn list_process_variables(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<ProcessVariableRecord>, QueryError> {
        let records = sqlx::query_as::<_, ProcessVariableRecord>(
            "SELECT * FROM process_variables WHERE process_instance_id = $1 ORDER BY name",
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
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                var_type = EXCLUDED.var_type,
                value = EXCLUDED.value,
                last_updated_time = EXCLUDED.last_updated_time,
                service_name = EXCLUDED.service_name,
                service_full_name = EXCLUDED.service_full_name,
                service_version = EXCLUDED.service_version,
                app_name = EXCLUDED.app_name,
                app_version = EXCLUDED.app_version
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
        sqlx::query("DELETE FROM process_variables WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    // ========================================================================
    // Task variables
    // ========================================================================

    async fn find_task_variable(
        &mut self,
        task_id: &str,
        name: &str,
    ) -> Result<Option<TaskVariableRecord>, QueryError> {
        let record = sqlx::query_as::<_, TaskVariableRecord>(
            "SELECT * FROM task_variables WHERE task_id = $1 AND name = $2",
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
            "SELECT * FROM task_variables WHERE task_id = $1 ORDER BY name",
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
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                var_type = EXCLUDED.var_type,
                value = EXCLUDED.value,
                last_updated_time = EXCLUDED.last_updated_time,
                service_name = EXCLUDED.service_name,
                service_full_name = EXCLUDED.service_full_name,
                service_version = EXCLUDED.service_version,
                app_name = EXCLUDED.app_name,
                app_version = EXCLUDED.app_version
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
        sqlx::query("DELETE FROM task_variables WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    // ========================================================================
    // Task to process variable links
    // ========================================================================

    async fn link_task_process_variable(
        &mut self,
        task_id: &str,
        process_variable_id: &str,
    ) -> Result<(), QueryError> {
        sqlx::query(
            r#"
            INSERT INTO task_process_variables (task_id, process_variable_id)
            VALUES ($1, $2)
            ON CONFLICT (task_id, process_variable_id) DO NOTHING
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
            "DELETE FROM task_process_variables WHERE task_id = $1 AND process_variable_id = $2",
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
            WHERE l.task_id = $1
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
        sqlx::query("DELETE FROM task_process_variables WHERE task_id = $1")
            .bind(task_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn delete_process_variable_links(
        &mut self,
        process_variable_id: &str,
    ) -> Result<(), QueryError> {
        sqlx::query("DELETE FROM task_process_variables WHERE process_variable_id = $1")
            .bind(process_variable_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    // ========================================================================
    // Task candidates
    // ========================================================================

    async fn task_candidate_user_exists(
        &mut self,
        record: &TaskCandidateUserRecord,
    ) -> Result<bool, QueryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM task_candidate_users WHERE task_id = $1 AND user_id = $2)",
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
            VALUES ($1, $2)
            ON CONFLICT (task_id, user_id) DO NOTHING
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
        sqlx::query("DELETE FROM task_candidate_users WHERE task_id = $1 AND user_id = $2")
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
            "SELECT task_id, user_id FROM task_candidate_users WHERE task_id = $1 ORDER BY user_id",
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
            "SELECT EXISTS(SELECT 1 FROM task_candidate_groups WHERE task_id = $1 AND group_id = $2)",
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
            VALUES ($1, $2)
            ON CONFLICT (task_id, group_id) DO NOTHING
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
        sqlx::query("DELETE FROM task_candidate_groups WHERE task_id = $1 AND group_id = $2")
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
            "SELECT task_id, group_id FROM task_candidate_groups WHERE task_id = $1 ORDER BY group_id",
        )
        .bind(task_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(records)
    }

    async fn delete_task_candidates(&mut self, task_id: &str) -> Result<(), QueryError> {
        sqlx::query("DELETE FROM task_candidate_users WHERE task_id = $1")
            .bind(task_id)
            .execute(&mut *self.tx)
            .await?;

        sqlx::query("DELETE FROM task_candidate_groups WHERE task_id = $1")
            .bind(task_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    // ========================================================================
    // Process candidate starters
    // ========================================================================

    async fn process_candidate_starter_user_exists(
        &mut self,
        record: &ProcessCandidateStarterUserRecord,
    ) -> Result<bool, QueryError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM process_candidate_starter_users
                WHERE process_definition_id = $1 AND user_id = $2
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
            VALUES ($1, $2)
            ON CONFLICT (process_definition_id, user_id) DO NOTHING
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
            "DELETE FROM process_candidate_starter_users WHERE process_definition_id = $1 AND user_id = $2",
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
                WHERE process_definition_id = $1 AND group_id = $2
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
            VALUES ($1, $2)
            ON CONFLICT (process_definition_id, group_id) DO NOTHING
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
            "DELETE FROM process_candidate_starter_groups WHERE process_definition_id = $1 AND group_id = $2",
        )
        .bind(&record.process_definition_id)
        .bind(&record.group_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    // ========================================================================
    // BPMN activities
    // ========================================================================

    async fn find_activity(&mut self, id: &str) -> Result<Option<BpmnActivityRecord>, QueryError> {
        let record =
            sqlx::query_as::<_, BpmnActivityRecord>("SELECT * FROM bpmn_activities WHERE id = $1")
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

        let records = sqlx::query_as::<_, BpmnActivityRecord>(
            "SELECT * FROM bpmn_activities WHERE id = ANY($1)",
        )
        .bind(ids)
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
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            ON CONFLICT (id) DO UPDATE SET
                activity_name = EXCLUDED.activity_name,
                activity_type = EXCLUDED.activity_type,
                process_definition_id = EXCLUDED.process_definition_id,
                process_definition_key = EXCLUDED.process_definition_key,
                process_definition_version = EXCLUDED.process_definition_version,
                business_key = EXCLUDED.business_key,
                execution_id = EXCLUDED.execution_id,
                status = EXCLUDED.status,
                started_date = EXCLUDED.started_date,
                completed_date = EXCLUDED.completed_date,
                cancelled_date = EXCLUDED.cancelled_date,
                service_name = EXCLUDED.service_name,
                service_full_name = EXCLUDED.service_full_name,
                service_version = EXCLUDED.service_version,
                app_name = EXCLUDED.app_name,
                app_version = EXCLUDED.app_version
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
            "SELECT * FROM bpmn_activities WHERE process_instance_id = $1 ORDER BY started_date, id",
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
        sqlx::query("DELETE FROM bpmn_activities WHERE process_instance_id = $1")
            .bind(process_instance_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    // ========================================================================
    // Sequence flows
    // ========================================================================

    async fn sequence_flow_exists(&mut self, event_id: &str) -> Result<bool, QueryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM bpmn_sequence_flows WHERE event_id = $1)",
        )
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
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20
            )
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
            "SELECT * FROM bpmn_sequence_flows WHERE process_instance_id = $1 ORDER BY date, id",
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
        sqlx::query("DELETE FROM bpmn_sequence_flows WHERE process_instance_id = $1")
            .bind(process_instance_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    // ========================================================================
    // Integration contexts
    // ========================================================================

    async fn find_integration_context(
        &mut self,
        id: &str,
    ) -> Result<Option<IntegrationContextRecord>, QueryError> {
        let record = sqlx::query_as::<_, IntegrationContextRecord>(
            "SELECT * FROM integration_contexts WHERE id = $1",
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
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
                $21, $22, $23, $24, $25, $26, $27, $28, $29
            )
            ON CONFLICT (id) DO UPDATE SET
                root_process_instance_id = EXCLUDED.root_process_instance_id,
                parent_process_instance_id = EXCLUDED.parent_process_instance_id,
                execution_id = EXCLUDED.execution_id,
                process_definition_id = EXCLUDED.process_definition_id,
                process_definition_key = EXCLUDED.process_definition_key,
                process_definition_version = EXCLUDED.process_definition_version,
                business_key = EXCLUDED.business_key,
                client_name = EXCLUDED.client_name,
                client_type = EXCLUDED.client_type,
                connector_type = EXCLUDED.connector_type,
                activity_id = EXCLUDED.activity_id,
                status = EXCLUDED.status,
                request_date = EXCLUDED.request_date,
                result_date = EXCLUDED.result_date,
                error_date = EXCLUDED.error_date,
                error_code = EXCLUDED.error_code,
                error_message = EXCLUDED.error_message,
                error_class_name = EXCLUDED.error_class_name,
                stack_trace_elements = EXCLUDED.stack_trace_elements,
                in_bound_variables = EXCLUDED.in_bound_variables,
                out_bound_variables = EXCLUDED.out_bound_variables,
                service_name = EXCLUDED.service_name,
                service_full_name = EXCLUDED.service_full_name,
                service_version = EXCLUDED.service_version,
                app_name = EXCLUDED.app_name,
                app_version = EXCLUDED.app_version
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
            "SELECT * FROM integration_contexts WHERE process_instance_id = $1 ORDER BY request_date, id",
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
        sqlx::query("DELETE FROM integration_contexts WHERE process_instance_id = $1")
            .bind(process_instance_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    // ========================================================================
    // Deployments
    // ========================================================================

    async fn find_process_definition(
        &mut self,
        id: &str,
    ) -> Result<Option<ProcessDefinitionRecord>, QueryError> {
        let record = sqlx::query_as::<_, ProcessDefinitionRecord>(
            "SELECT * FROM process_definitions WHERE id = $1",
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
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                process_definition_key = EXCLUDED.process_definition_key,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                version = EXCLUDED.version,
                form_key = EXCLUDED.form_key,
                category = EXCLUDED.category,
                service_name = EXCLUDED.service_name,
                service_full_name = EXCLUDED.service_full_name,
                service_version = EXCLUDED.service_version,
                app_name = EXCLUDED.app_name,
                app_version = EXCLUDED.app_version
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
            "SELECT process_definition_id, process_model_content FROM process_models WHERE process_definition_id = $1",
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
            VALUES ($1, $2)
            ON CONFLICT (process_definition_id) DO UPDATE SET
                process_model_content = EXCLUDED.process_model_content
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
            "SELECT id, name, version FROM applications WHERE id = $1",
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
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                version = EXCLUDED.version
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.version)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    // ========================================================================
    // Transaction control
    // ========================================================================

    async fn commit(self: Box<Self>) -> Result<(), QueryError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), QueryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
