// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Entity lookup helpers and batch prefetching.
//!
//! Handlers in one batch usually touch the same process instance, its tasks,
//! its variables and its activities. [`FetchPlan`] collects those keys up front
//! and [`CachingUnitOfWork::prefetch`] loads each collection with one query.
//! Later lookups are answered from an identity map. Every write goes to the
//! backend first and then refreshes the map, so a batch run with or without
//! the cache persists the same state.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use bpm_query_events::payload::{BpmnActivityPayload, IntegrationContextPayload};
use bpm_query_events::{CloudRuntimeEvent, EventFamily};
use tracing::debug;

use crate::error::QueryError;
use crate::model::{
    ApplicationRecord, BpmnActivityRecord, BpmnSequenceFlowRecord, IntegrationContextRecord,
    ProcessCandidateStarterGroupRecord, ProcessCandidateStarterUserRecord,
    ProcessDefinitionRecord, ProcessInstanceRecord, ProcessModelRecord, ProcessVariableRecord,
    TaskCandidateGroupRecord, TaskCandidateUserRecord, TaskRecord, TaskVariableRecord,
};
use crate::store::UnitOfWork;

// ============================================================================
// Fetch plan
// ============================================================================

/// Keys a batch of events is going to look up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPlan {
    /// Process instance of the first event that names one.
    pub process_instance_id: Option<String>,
    /// Process variable names referenced by variable events on that instance.
    pub variable_names: BTreeSet<String>,
    /// Task ids referenced by task, candidate and task variable events.
    pub task_ids: BTreeSet<String>,
    /// Activity keys referenced by activity and integration events.
    pub activity_ids: BTreeSet<String>,
}

impl FetchPlan {
    /// Build the plan for a batch. Events whose payload does not decode are
    /// left to fail in their handler.
    pub fn from_events(events: &[CloudRuntimeEvent]) -> Self {
        let mut plan = FetchPlan {
            process_instance_id: events
                .iter()
                .find_map(CloudRuntimeEvent::resolve_process_instance_id),
            ..Default::default()
        };

        for event in events {
            let Some(event_type) = event.event_type() else {
                continue;
            };

            match event_type.family() {
                EventFamily::Task => {
                    if let Some(id) = entity_str(event, "id") {
                        plan.task_ids.insert(id);
                    }
                }
                EventFamily::Candidate => {
                    if let Some(id) = entity_str(event, "taskId") {
                        plan.task_ids.insert(id);
                    }
                }
                EventFamily::Variable => {
                    let task_variable = event
                        .entity
                        .get("taskVariable")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);

                    match (task_variable, entity_str(event, "taskId")) {
                        (true, Some(task_id)) => {
                            plan.task_ids.insert(task_id);
                        }
                        _ => {
                            let same_instance = entity_str(event, "processInstanceId")
                                .is_some_and(|pi| {
                                    plan.process_instance_id.as_deref() == Some(pi.as_str())
                                });
                            if same_instance && let Some(name) = entity_str(event, "name") {
                                plan.variable_names.insert(name);
                            }
                        }
                    }
                }
                EventFamily::Activity => {
                    if let Ok(payload) = event.entity_as::<BpmnActivityPayload>() {
                        plan.activity_ids.insert(payload.activity_id());
                    }
                }
                EventFamily::Integration => {
                    if let Ok(payload) = event.entity_as::<IntegrationContextPayload>() {
                        plan.activity_ids.insert(payload.activity_id());
                    }
                }
                EventFamily::Deployment | EventFamily::Process | EventFamily::SequenceFlow => {}
            }
        }

        plan
    }

    /// True when the plan has nothing to load.
    pub fn is_empty(&self) -> bool {
        self.process_instance_id.is_none() && self.task_ids.is_empty() && self.activity_ids.is_empty()
    }
}

fn entity_str(event: &CloudRuntimeEvent, field: &str) -> Option<String> {
    event
        .entity
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

// ============================================================================
// Caching unit of work
// ============================================================================

/// Cache counters for one unit of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the identity map.
    pub hits: u64,
    /// Lookups that went to the backend.
    pub misses: u64,
}

/// A [`UnitOfWork`] decorator with a write-through identity map for process
/// instances, tasks, process variables and activities.
///
/// Absent keys are cached too, so a prefetch that found nothing saves the
/// lookup later. List queries and everything else are delegated unchanged.
pub struct CachingUnitOfWork {
    inner: Box<dyn UnitOfWork>,
    process_instances: HashMap<String, Option<ProcessInstanceRecord>>,
    tasks: HashMap<String, Option<TaskRecord>>,
    process_variables: HashMap<(String, String), Option<ProcessVariableRecord>>,
    activities: HashMap<String, Option<BpmnActivityRecord>>,
    stats: CacheStats,
}

impl CachingUnitOfWork {
    /// Wrap a backend unit of work.
    pub fn new(inner: Box<dyn UnitOfWork>) -> Self {
        Self {
            inner,
            process_instances: HashMap::new(),
            tasks: HashMap::new(),
            process_variables: HashMap::new(),
            activities: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Counters since creation. Prefetch loads are not counted.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Load everything `plan` names, one query per collection.
    pub async fn prefetch(&mut self, plan: &FetchPlan) -> Result<(), QueryError> {
        if let Some(pi) = &plan.process_instance_id {
            if !self.process_instances.contains_key(pi) {
                let instance = self.inner.find_process_instance(pi).await?;
                self.process_instances.insert(pi.clone(), instance);
            }

            if !plan.variable_names.is_empty() {
                let names: Vec<String> = plan.variable_names.iter().cloned().collect();
                let found = self.inner.find_process_variables(pi, &names).await?;
                for name in names {
                    self.process_variables
                        .insert((pi.clone(), name), None);
                }
                for variable in found {
                    self.process_variables.insert(
                        (variable.process_instance_id.clone(), variable.name.clone()),
                        Some(variable),
                    );
                }
            }
        }

        if !plan.task_ids.is_empty() {
            let ids: Vec<String> = plan.task_ids.iter().cloned().collect();
            let found = self.inner.find_tasks(&ids).await?;
            for id in ids {
                self.tasks.insert(id, None);
            }
            for task in found {
                self.tasks.insert(task.id.clone(), Some(task));
            }
        }

        if !plan.activity_ids.is_empty() {
            let ids: Vec<String> = plan.activity_ids.iter().cloned().collect();
            let found = self.inner.find_activities(&ids).await?;
            for id in ids {
                self.activities.insert(id, None);
            }
            for activity in found {
                self.activities.insert(activity.id.clone(), Some(activity));
            }
        }

        debug!(
            process_instances = self.process_instances.len(),
            tasks = self.tasks.len(),
            process_variables = self.process_variables.len(),
            activities = self.activities.len(),
            "Prefetched batch entities"
        );

        Ok(())
    }

    fn hit(&mut self) {
        self.stats.hits += 1;
    }

    fn miss(&mut self) {
        self.stats.misses += 1;
    }
}

#[async_trait]
impl UnitOfWork for CachingUnitOfWork {
    async fn find_process_instance(
        &mut self,
        id: &str,
    ) -> Result<Option<ProcessInstanceRecord>, QueryError> {
        if let Some(cached) = self.process_instances.get(id) {
            let cached = cached.clone();
            self.hit();
            return Ok(cached);
        }

        self.miss();
        let record = self.inner.find_process_instance(id).await?;
        self.process_instances.insert(id.to_string(), record.clone());
        Ok(record)
    }

    async fn save_process_instance(
        &mut self,
        record: &ProcessInstanceRecord,
    ) -> Result<(), QueryError> {
        self.inner.save_process_instance(record).await?;
        self.process_instances
            .insert(record.id.clone(), Some(record.clone()));
        Ok(())
    }

    async fn delete_process_instance(&mut self, id: &str) -> Result<(), QueryError> {
        self.inner.delete_process_instance(id).await?;
        self.process_instances.insert(id.to_string(), None);
        Ok(())
    }

    async fn list_tasks_by_process_instance(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<TaskRecord>, QueryError> {
        self.inner
            .list_tasks_by_process_instance(process_instance_id)
            .await
    }

    async fn find_task(&mut self, id: &str) -> Result<Option<TaskRecord>, QueryError> {
        if let Some(cached) = self.tasks.get(id) {
            let cached = cached.clone();
            self.hit();
            return Ok(cached);
        }

        self.miss();
        let record = self.inner.find_task(id).await?;
        self.tasks.insert(id.to_string(), record.clone());
        Ok(record)
    }

    async fn find_tasks(&mut self, ids: &[String]) -> Result<Vec<TaskRecord>, QueryError> {
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !self.tasks.contains_key(*id))
            .cloned()
            .collect();

        if !missing.is_empty() {
            self.miss();
            let found = self.inner.find_tasks(&missing).await?;
            for id in &missing {
                self.tasks.insert(id.clone(), None);
            }
            for task in found {
                self.tasks.insert(task.id.clone(), Some(task));
            }
        } else {
            self.hit();
        }

        Ok(ids
            .iter()
            .filter_map(|id| self.tasks.get(id).cloned().flatten())
            .collect())
    }

    async fn save_task(&mut self, record: &TaskRecord) -> Result<(), QueryError> {
        self.inner.save_task(record).await?;
        self.tasks.insert(record.id.clone(), Some(record.clone()));
        Ok(())
    }

    async fn delete_task(&mut self, id: &str) -> Result<(), QueryError> {
        self.inner.delete_task(id).await?;
        self.tasks.insert(id.to_string(), None);
        Ok(())
    }

    async fn find_process_variable(
        &mut self,
        process_instance_id: &str,
        name: &str,
    ) -> Result<Option<ProcessVariableRecord>, QueryError> {
        let key = (process_instance_id.to_string(), name.to_string());
        if let Some(cached) = self.process_variables.get(&key) {
            let cached = cached.clone();
            self.hit();
            return Ok(cached);
        }

        self.miss();
        let record = self
            .inner
            .find_process_variable(process_instance_id, name)
            .await?;
        self.process_variables.insert(key, record.clone());
        Ok(record)
    }

    async fn find_process_variables(
        &mut self,
        process_instance_id: &str,
        names: &[String],
    ) -> Result<Vec<ProcessVariableRecord>, QueryError> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| {
                !self
                    .process_variables
                    .contains_key(&(process_instance_id.to_string(), (*name).clone()))
            })
            .cloned()
            .collect();

        if !missing.is_empty() {
            self.miss();
            let found = self
                .inner
                .find_process_variables(process_instance_id, &missing)
                .await?;
            for name in &missing {
                self.process_variables
                    .insert((process_instance_id.to_string(), name.clone()), None);
            }
            for variable in found {
                self.process_variables.insert(
                    (variable.process_instance_id.clone(), variable.name.clone()),
                    Some(variable),
                );
            }
        } else {
            self.hit();
        }

        Ok(names
            .iter()
            .filter_map(|name| {
                self.process_variables
                    .get(&(process_instance_id.to_string(), name.clone()))
                    .cloned()
                    .flatten()
            })
            .collect())
    }

    async fn list_process_variables(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<ProcessVariableRecord>, QueryError> {
        self.inner.list_process_variables(process_instance_id).await
    }

    async fn save_process_variable(
        &mut self,
        record: &ProcessVariableRecord,
    ) -> Result<(), QueryError> {
        self.inner.save_process_variable(record).await?;
        self.process_variables.insert(
            (record.process_instance_id.clone(), record.name.clone()),
            Some(record.clone()),
        );
        Ok(())
    }

    async fn delete_process_variable(&mut self, id: &str) -> Result<(), QueryError> {
        self.inner.delete_process_variable(id).await?;
        for cached in self.process_variables.values_mut() {
            if cached.as_ref().is_some_and(|v| v.id == id) {
                *cached = None;
            }
        }
        Ok(())
    }

    async fn find_task_variable(
        &mut self,
        task_id: &str,
        name: &str,
    ) -> Result<Option<TaskVariableRecord>, QueryError> {
        self.inner.find_task_variable(task_id, name).await
    }

    async fn list_task_variables(
        &mut self,
        task_id: &str,
    ) -> Result<Vec<TaskVariableRecord>, QueryError> {
        self.inner.list_task_variables(task_id).await
    }

    async fn save_task_variable(&mut self, record: &TaskVariableRecord) -> Result<(), QueryError> {
        self.inner.save_task_variable(record).await
    }

    async fn delete_task_variable(&mut self, id: &str) -> Result<(), QueryError> {
        self.inner.delete_task_variable(id).await
    }

    async fn link_task_process_variable(
        &mut self,
        task_id: &str,
        process_variable_id: &str,
    ) -> Result<(), QueryError> {
        self.inner
            .link_task_process_variable(task_id, process_variable_id)
            .await
    }

    async fn unlink_task_process_variable(
        &mut self,
        task_id: &str,
        process_variable_id: &str,
    ) -> Result<(), QueryError> {
        self.inner
            .unlink_task_process_variable(task_id, process_variable_id)
            .await
    }

    async fn list_task_process_variables(
        &mut self,
        task_id: &str,
    ) -> Result<Vec<ProcessVariableRecord>, QueryError> {
        self.inner.list_task_process_variables(task_id).await
    }

    async fn delete_task_process_variable_links(
        &mut self,
        task_id: &str,
    ) -> Result<(), QueryError> {
        self.inner.delete_task_process_variable_links(task_id).await
    }

    async fn delete_process_variable_links(
        &mut self,
        process_variable_id: &str,
    ) -> Result<(), QueryError> {
        self.inner
            .delete_process_variable_links(process_variable_id)
            .await
    }

    async fn task_candidate_user_exists(
        &mut self,
        record: &TaskCandidateUserRecord,
    ) -> Result<bool, QueryError> {
        self.inner.task_candidate_user_exists(record).await
    }

    async fn save_task_candidate_user(
        &mut self,
        record: &TaskCandidateUserRecord,
    ) -> Result<(), QueryError> {
        self.inner.save_task_candidate_user(record).await
    }

    async fn delete_task_candidate_user(
        &mut self,
        record: &TaskCandidateUserRecord,
    ) -> Result<(), QueryError> {
        self.inner.delete_task_candidate_user(record).await
    }

    async fn list_task_candidate_users(
        &mut self,
        task_id: &str,
    ) -> Result<Vec<TaskCandidateUserRecord>, QueryError> {
        self.inner.list_task_candidate_users(task_id).await
    }

    async fn task_candidate_group_exists(
        &mut self,
        record: &TaskCandidateGroupRecord,
    ) -> Result<bool, QueryError> {
        self.inner.task_candidate_group_exists(record).await
    }

    async fn save_task_candidate_group(
        &mut self,
        record: &TaskCandidateGroupRecord,
    ) -> Result<(), QueryError> {
        self.inner.save_task_candidate_group(record).await
    }

    async fn delete_task_candidate_group(
        &mut self,
        record: &TaskCandidateGroupRecord,
    ) -> Result<(), QueryError> {
        self.inner.delete_task_candidate_group(record).await
    }

    async fn list_task_candidate_groups(
        &mut self,
        task_id: &str,
    ) -> Result<Vec<TaskCandidateGroupRecord>, QueryError> {
        self.inner.list_task_candidate_groups(task_id).await
    }

    async fn delete_task_candidates(&mut self, task_id: &str) -> Result<(), QueryError> {
        self.inner.delete_task_candidates(task_id).await
    }

    async fn process_candidate_starter_user_exists(
        &mut self,
        record: &ProcessCandidateStarterUserRecord,
    ) -> Result<bool, QueryError> {
        self.inner.process_candidate_starter_user_exists(record).await
    }

    async fn save_process_candidate_starter_user(
        &mut self,
        record: &ProcessCandidateStarterUserRecord,
    ) -> Result<(), QueryError> {
        self.inner.save_process_candidate_starter_user(record).await
    }

    async fn delete_process_candidate_starter_user(
        &mut self,
        record: &ProcessCandidateStarterUserRecord,
    ) -> Result<(), QueryError> {
        self.inner.delete_process_candidate_starter_user(record).await
    }

    async fn process_candidate_starter_group_exists(
        &mut self,
        record: &ProcessCandidateStarterGroupRecord,
    ) -> Result<bool, QueryError> {
        self.inner
            .process_candidate_starter_group_exists(record)
            .await
    }

    async fn save_process_candidate_starter_group(
        &mut self,
        record: &ProcessCandidateStarterGroupRecord,
    ) -> Result<(), QueryError> {
        self.inner.save_process_candidate_starter_group(record).await
    }

    async fn delete_process_candidate_starter_group(
        &mut self,
        record: &ProcessCandidateStarterGroupRecord,
    ) -> Result<(), QueryError> {
        self.inner
            .delete_process_candidate_starter_group(record)
            .await
    }

    async fn find_activity(&mut self, id: &str) -> Result<Option<BpmnActivityRecord>, QueryError> {
        if let Some(cached) = self.activities.get(id) {
            let cached = cached.clone();
            self.hit();
            return Ok(cached);
        }

        self.miss();
        let record = self.inner.find_activity(id).await?;
        self.activities.insert(id.to_string(), record.clone());
        Ok(record)
    }

    async fn find_activities(
        &mut self,
        ids: &[String],
    ) -> Result<Vec<BpmnActivityRecord>, QueryError> {
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !self.activities.contains_key(*id))
            .cloned()
            .collect();

        if !missing.is_empty() {
            self.miss();
            let found = self.inner.find_activities(&missing).await?;
            for id in &missing {
                self.activities.insert(id.clone(), None);
            }
            for activity in found {
                self.activities.insert(activity.id.clone(), Some(activity));
            }
        } else {
            self.hit();
        }

        Ok(ids
            .iter()
            .filter_map(|id| self.activities.get(id).cloned().flatten())
            .collect())
    }

    async fn save_activity(&mut self, record: &BpmnActivityRecord) -> Result<(), QueryError> {
        self.inner.save_activity(record).await?;
        self.activities
            .insert(record.id.clone(), Some(record.clone()));
        Ok(())
    }

    async fn list_activities(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<BpmnActivityRecord>, QueryError> {
        self.inner.list_activities(process_instance_id).await
    }

    async fn delete_activities_by_process_instance(
        &mut self,
        process_instance_id: &str,
    ) -> Result<(), QueryError> {
        self.inner
            .delete_activities_by_process_instance(process_instance_id)
            .await?;
        for cached in self.activities.values_mut() {
            if cached
                .as_ref()
                .is_some_and(|a| a.process_instance_id == process_instance_id)
            {
                *cached = None;
            }
        }
        Ok(())
    }

    async fn sequence_flow_exists(&mut self, event_id: &str) -> Result<bool, QueryError> {
        self.inner.sequence_flow_exists(event_id).await
    }

    async fn save_sequence_flow(
        &mut self,
        record: &BpmnSequenceFlowRecord,
    ) -> Result<(), QueryError> {
        self.inner.save_sequence_flow(record).await
    }

    async fn list_sequence_flows(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<BpmnSequenceFlowRecord>, QueryError> {
        self.inner.list_sequence_flows(process_instance_id).await
    }

    async fn delete_sequence_flows_by_process_instance(
        &mut self,
        process_instance_id: &str,
    ) -> Result<(), QueryError> {
        self.inner
            .delete_sequence_flows_by_process_instance(process_instance_id)
            .await
    }

    async fn find_integration_context(
        &mut self,
        id: &str,
    ) -> Result<Option<IntegrationContextRecord>, QueryError> {
        self.inner.find_integration_context(id).await
    }

    async fn save_integration_context(
        &mut self,
        record: &IntegrationContextRecord,
    ) -> Result<(), QueryError> {
        self.inner.save_integration_context(record).await
    }

    async fn list_integration_contexts(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<IntegrationContextRecord>, QueryError> {
        self.inner.list_integration_contexts(process_instance_id).await
    }

    async fn delete_integration_contexts_by_process_instance(
        &mut self,
        process_instance_id: &str,
    ) -> Result<(), QueryError> {
        self.inner
            .delete_integration_contexts_by_process_instance(process_instance_id)
            .await
    }

    async fn find_process_definition(
        &mut self,
        id: &str,
    ) -> Result<Option<ProcessDefinitionRecord>, QueryError> {
        self.inner.find_process_definition(id).await
    }

    async fn save_process_definition(
        &mut self,
        record: &ProcessDefinitionRecord,
    ) -> Result<(), QueryError> {
        self.inner.save_process_definition(record).await
    }

    async fn find_process_model(
        &mut self,
        process_definition_id: &str,
    ) -> Result<Option<ProcessModelRecord>, QueryError> {
        self.inner.find_process_model(process_definition_id).await
    }

    async fn save_process_model(&mut self, record: &ProcessModelRecord) -> Result<(), QueryError> {
        self.inner.save_process_model(record).await
    }

    async fn find_application(&mut self, id: &str) -> Result<Option<ApplicationRecord>, QueryError> {
        self.inner.find_application(id).await
    }

    async fn save_application(&mut self, record: &ApplicationRecord) -> Result<(), QueryError> {
        self.inner.save_application(record).await
    }

    async fn commit(self: Box<Self>) -> Result<(), QueryError> {
        let this = *self;
        this.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), QueryError> {
        let this = *self;
        this.inner.rollback().await
    }
}

// ============================================================================
// Entity finder
// ============================================================================

/// A process instance with its variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInstanceWithVariables {
    /// The instance.
    pub instance: ProcessInstanceRecord,
    /// Its process variables, ordered by name.
    pub variables: Vec<ProcessVariableRecord>,
}

/// A task with its own variables and its process variable snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskWithVariables {
    /// The task.
    pub task: TaskRecord,
    /// Task-scoped variables, ordered by name.
    pub variables: Vec<TaskVariableRecord>,
    /// Process variables linked to the task, ordered by name.
    pub process_variables: Vec<ProcessVariableRecord>,
}

/// A task with its candidate users and groups.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskWithCandidates {
    /// The task.
    pub task: TaskRecord,
    /// Candidate user ids.
    pub users: Vec<String>,
    /// Candidate group ids.
    pub groups: Vec<String>,
}

/// Lookups shared by the handlers, available on every [`UnitOfWork`].
#[async_trait]
pub trait EntityFinder {
    /// The process instance `id`, or [`QueryError::NotFound`].
    async fn require_process_instance(
        &mut self,
        id: &str,
    ) -> Result<ProcessInstanceRecord, QueryError>;

    /// The task `id`, or [`QueryError::NotFound`].
    async fn require_task(&mut self, id: &str) -> Result<TaskRecord, QueryError>;

    /// The process instance `id` with its variables, if it exists.
    async fn process_instance_with_variables(
        &mut self,
        id: &str,
    ) -> Result<Option<ProcessInstanceWithVariables>, QueryError>;

    /// The task `id` with its variables, if it exists.
    async fn task_with_variables(
        &mut self,
        id: &str,
    ) -> Result<Option<TaskWithVariables>, QueryError>;

    /// The task `id` with its candidates, if it exists.
    async fn task_with_candidates(
        &mut self,
        id: &str,
    ) -> Result<Option<TaskWithCandidates>, QueryError>;
}

#[async_trait]
impl<T: UnitOfWork + ?Sized> EntityFinder for T {
    async fn require_process_instance(
        &mut self,
        id: &str,
    ) -> Result<ProcessInstanceRecord, QueryError> {
        self.find_process_instance(id)
            .await?
            .ok_or_else(|| QueryError::not_found("process instance", id))
    }

    async fn require_task(&mut self, id: &str) -> Result<TaskRecord, QueryError> {
        self.find_task(id)
            .await?
            .ok_or_else(|| QueryError::not_found("task", id))
    }

    async fn process_instance_with_variables(
        &mut self,
        id: &str,
    ) -> Result<Option<ProcessInstanceWithVariables>, QueryError> {
        let Some(instance) = self.find_process_instance(id).await? else {
            return Ok(None);
        };
        let variables = self.list_process_variables(id).await?;

        Ok(Some(ProcessInstanceWithVariables {
            instance,
            variables,
        }))
    }

    async fn task_with_variables(
        &mut self,
        id: &str,
    ) -> Result<Option<TaskWithVariables>, QueryError> {
        let Some(task) = self.find_task(id).await? else {
            return Ok(None);
        };
        let variables = self.list_task_variables(id).await?;
        let process_variables = self.list_task_process_variables(id).await?;

        Ok(Some(TaskWithVariables {
            task,
            variables,
            process_variables,
        }))
    }

    async fn task_with_candidates(
        &mut self,
        id: &str,
    ) -> Result<Option<TaskWithCandidates>, QueryError> {
        let Some(task) = self.find_task(id).await? else {
            return Ok(None);
        };
        let users = self
            .list_task_candidate_users(id)
            .await?
            .into_iter()
            .map(|c| c.user_id)
            .collect();
        let groups = self
            .list_task_candidate_groups(id)
            .await?
            .into_iter()
            .map(|c| c.group_id)
            .collect();

        Ok(Some(TaskWithCandidates {
            task,
            users,
            groups,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProcessInstanceStatus, ServiceMetadata, TaskStatus};
    use crate::store::{ReadModelStore, SqliteStore};
    use bpm_query_events::EventType;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create SQLite pool");
        crate::migrations::run_sqlite(&pool)
            .await
            .expect("Failed to run SQLite migrations");
        SqliteStore::new(pool)
    }

    fn instance(id: &str) -> ProcessInstanceRecord {
        ProcessInstanceRecord {
            id: id.to_string(),
            name: None,
            status: ProcessInstanceStatus::Running,
            business_key: None,
            process_definition_id: None,
            process_definition_key: None,
            process_definition_version: None,
            process_definition_name: None,
            initiator: None,
            parent_id: None,
            start_date: None,
            completed_date: None,
            suspended_date: None,
            last_modified: None,
            service: ServiceMetadata::default(),
        }
    }

    fn task(id: &str) -> TaskRecord {
        TaskRecord {
            id: id.to_string(),
            name: None,
            description: None,
            assignee: None,
            owner: None,
            priority: None,
            status: TaskStatus::Created,
            created_date: None,
            due_date: None,
            claimed_date: None,
            completed_date: None,
            completed_by: None,
            duration: None,
            last_modified: None,
            process_instance_id: Some("pi-1".to_string()),
            process_definition_id: None,
            process_definition_version: None,
            business_key: None,
            task_definition_key: None,
            parent_task_id: None,
            form_key: None,
            service: ServiceMetadata::default(),
        }
    }

    #[test]
    fn test_fetch_plan_collects_keys() {
        let events = vec![
            CloudRuntimeEvent::new(EventType::ProcessStarted, json!({"id": "pi-1"}))
                .with_process_instance_id("pi-1"),
            CloudRuntimeEvent::new(
                EventType::VariableCreated,
                json!({"name": "amount", "processInstanceId": "pi-1"}),
            ),
            CloudRuntimeEvent::new(
                EventType::VariableCreated,
                json!({"name": "note", "processInstanceId": "pi-1", "taskId": "t2", "taskVariable": true}),
            ),
            CloudRuntimeEvent::new(EventType::TaskAssigned, json!({"id": "t1"})),
            CloudRuntimeEvent::new(
                EventType::TaskCandidateUserAdded,
                json!({"taskId": "t3", "userId": "bob"}),
            ),
            CloudRuntimeEvent::new(
                EventType::ActivityStarted,
                json!({"elementId": "review", "processInstanceId": "pi-1", "executionId": "ex-1"}),
            ),
            CloudRuntimeEvent::new(
                EventType::IntegrationRequested,
                json!({"processInstanceId": "pi-1", "clientId": "charge", "executionId": "ex-2"}),
            ),
        ];

        let plan = FetchPlan::from_events(&events);

        assert_eq!(plan.process_instance_id.as_deref(), Some("pi-1"));
        assert_eq!(
            plan.variable_names.iter().collect::<Vec<_>>(),
            vec!["amount"]
        );
        assert_eq!(
            plan.task_ids.iter().collect::<Vec<_>>(),
            vec!["t1", "t2", "t3"]
        );
        assert_eq!(
            plan.activity_ids.iter().collect::<Vec<_>>(),
            vec!["pi-1:charge:ex-2", "pi-1:review:ex-1"]
        );
    }

    #[test]
    fn test_fetch_plan_skips_unknown_and_empty() {
        let events = vec![CloudRuntimeEvent {
            event_type: "SIGNAL_RECEIVED".to_string(),
            ..Default::default()
        }];

        let plan = FetchPlan::from_events(&events);
        assert!(plan.is_empty());
        assert!(FetchPlan::from_events(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_prefetch_serves_lookups_from_cache() {
        let store = test_store().await;

        let mut uow = store.begin().await.unwrap();
        uow.save_process_instance(&instance("pi-1")).await.unwrap();
        uow.save_task(&task("t1")).await.unwrap();
        uow.commit().await.unwrap();

        let mut caching = CachingUnitOfWork::new(store.begin().await.unwrap());
        let plan = FetchPlan {
            process_instance_id: Some("pi-1".to_string()),
            task_ids: ["t1".to_string(), "t9".to_string()].into_iter().collect(),
            ..Default::default()
        };
        caching.prefetch(&plan).await.unwrap();

        assert!(caching.find_process_instance("pi-1").await.unwrap().is_some());
        assert!(caching.find_task("t1").await.unwrap().is_some());
        assert!(caching.find_task("t9").await.unwrap().is_none());
        assert_eq!(caching.stats(), CacheStats { hits: 3, misses: 0 });

        assert!(caching.find_task("t2").await.unwrap().is_none());
        assert_eq!(caching.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_writes_refresh_cache() {
        let store = test_store().await;
        let mut caching = CachingUnitOfWork::new(store.begin().await.unwrap());

        assert!(caching.find_task("t1").await.unwrap().is_none());

        let mut record = task("t1");
        caching.save_task(&record).await.unwrap();
        record.assignee = Some("jane".to_string());
        caching.save_task(&record).await.unwrap();

        let cached = caching.find_task("t1").await.unwrap().unwrap();
        assert_eq!(cached.assignee.as_deref(), Some("jane"));

        caching.delete_task("t1").await.unwrap();
        assert!(caching.find_task("t1").await.unwrap().is_none());

        Box::new(caching).commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert!(uow.find_task("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_require_reports_not_found() {
        let store = test_store().await;
        let mut uow = store.begin().await.unwrap();

        let err = uow.require_task("missing").await.unwrap_err();
        assert_eq!(err.to_string(), "task 'missing' not found");

        let err = uow.require_process_instance("pi-x").await.unwrap_err();
        assert!(matches!(err, QueryError::NotFound { entity: "process instance", .. }));
    }

    #[tokio::test]
    async fn test_task_with_candidates() {
        let store = test_store().await;
        let mut uow = store.begin().await.unwrap();

        uow.save_task(&task("t1")).await.unwrap();
        for user in ["bob", "alice"] {
            uow.save_task_candidate_user(&TaskCandidateUserRecord {
                task_id: "t1".to_string(),
                user_id: user.to_string(),
            })
            .await
            .unwrap();
        }

        let found = uow.task_with_candidates("t1").await.unwrap().unwrap();
        assert_eq!(found.users, vec!["alice", "bob"]);
        assert!(found.groups.is_empty());

        assert!(uow.task_with_candidates("t2").await.unwrap().is_none());
    }
}
