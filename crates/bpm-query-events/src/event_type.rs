// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event type identifiers.
//!
//! The wire carries the event type as a plain string (`"PROCESS_STARTED"`).
//! [`EventType`] is the closed set of names this read model knows how to
//! project; anything else stays a string and is skipped by the dispatcher.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EventError;

/// Coarse grouping of event types by the aggregate they touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFamily {
    /// Process definition and application deployment.
    Deployment,
    /// Process instance lifecycle.
    Process,
    /// Task lifecycle.
    Task,
    /// Task candidates and process candidate starters.
    Candidate,
    /// Process and task variables.
    Variable,
    /// BPMN activity executions.
    Activity,
    /// BPMN sequence flow transitions.
    SequenceFlow,
    /// Service task integration calls.
    Integration,
}

macro_rules! event_types {
    ($($variant:ident => $name:literal, $family:ident;)+) => {
        /// A runtime event type handled by the read model.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum EventType {
            $(
                #[doc = concat!("`", $name, "`")]
                #[serde(rename = $name)]
                $variant,
            )+
        }

        impl EventType {
            /// Every known event type, in declaration order.
            pub const ALL: &'static [EventType] = &[$(EventType::$variant),+];

            /// Wire name of this event type.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(EventType::$variant => $name,)+
                }
            }

            /// Aggregate family this event type belongs to.
            pub fn family(&self) -> EventFamily {
                match self {
                    $(EventType::$variant => EventFamily::$family,)+
                }
            }
        }
    };
}

event_types! {
    ProcessDeployed => "PROCESS_DEPLOYED", Deployment;
    ApplicationDeployed => "APPLICATION_DEPLOYED", Deployment;
    ProcessCreated => "PROCESS_CREATED", Process;
    ProcessStarted => "PROCESS_STARTED", Process;
    ProcessUpdated => "PROCESS_UPDATED", Process;
    ProcessSuspended => "PROCESS_SUSPENDED", Process;
    ProcessResumed => "PROCESS_RESUMED", Process;
    ProcessCompleted => "PROCESS_COMPLETED", Process;
    ProcessCancelled => "PROCESS_CANCELLED", Process;
    ProcessDeleted => "PROCESS_DELETED", Process;
    TaskCreated => "TASK_CREATED", Task;
    TaskAssigned => "TASK_ASSIGNED", Task;
    TaskActivated => "TASK_ACTIVATED", Task;
    TaskSuspended => "TASK_SUSPENDED", Task;
    TaskUpdated => "TASK_UPDATED", Task;
    TaskCompleted => "TASK_COMPLETED", Task;
    TaskCancelled => "TASK_CANCELLED", Task;
    TaskCandidateUserAdded => "TASK_CANDIDATE_USER_ADDED", Candidate;
    TaskCandidateUserRemoved => "TASK_CANDIDATE_USER_REMOVED", Candidate;
    TaskCandidateGroupAdded => "TASK_CANDIDATE_GROUP_ADDED", Candidate;
    TaskCandidateGroupRemoved => "TASK_CANDIDATE_GROUP_REMOVED", Candidate;
    ProcessCandidateStarterUserAdded => "PROCESS_CANDIDATE_STARTER_USER_ADDED", Candidate;
    ProcessCandidateStarterUserRemoved => "PROCESS_CANDIDATE_STARTER_USER_REMOVED", Candidate;
    ProcessCandidateStarterGroupAdded => "PROCESS_CANDIDATE_STARTER_GROUP_ADDED", Candidate;
    ProcessCandidateStarterGroupRemoved => "PROCESS_CANDIDATE_STARTER_GROUP_REMOVED", Candidate;
    VariableCreated => "VARIABLE_CREATED", Variable;
    VariableUpdated => "VARIABLE_UPDATED", Variable;
    VariableDeleted => "VARIABLE_DELETED", Variable;
    ActivityStarted => "ACTIVITY_STARTED", Activity;
    ActivityCompleted => "ACTIVITY_COMPLETED", Activity;
    ActivityCancelled => "ACTIVITY_CANCELLED", Activity;
    SequenceFlowTaken => "SEQUENCE_FLOW_TAKEN", SequenceFlow;
    IntegrationRequested => "INTEGRATION_REQUESTED", Integration;
    IntegrationResultReceived => "INTEGRATION_RESULT_RECEIVED", Integration;
    IntegrationErrorReceived => "INTEGRATION_ERROR_RECEIVED", Integration;
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| EventError::UnknownEventType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_wire_names_are_unique() {
        let names: HashSet<&str> = EventType::ALL.iter().map(EventType::as_str).collect();
        assert_eq!(names.len(), EventType::ALL.len());
    }

    #[test]
    fn test_from_str_known_names() {
        for event_type in EventType::ALL {
            let parsed: EventType = event_type.as_str().parse().unwrap();
            assert_eq!(parsed, *event_type);
        }
    }

    #[test]
    fn test_from_str_unknown_name() {
        let err = "PROCESS_EXPLODED".parse::<EventType>().unwrap_err();
        assert_eq!(err, EventError::UnknownEventType("PROCESS_EXPLODED".into()));
    }

    #[test]
    fn test_serde_uses_wire_name() {
        let json = serde_json::to_string(&EventType::SequenceFlowTaken).unwrap();
        assert_eq!(json, "\"SEQUENCE_FLOW_TAKEN\"");

        let parsed: EventType = serde_json::from_str("\"TASK_CANDIDATE_GROUP_ADDED\"").unwrap();
        assert_eq!(parsed, EventType::TaskCandidateGroupAdded);
    }

    #[test]
    fn test_families() {
        assert_eq!(EventType::VariableDeleted.family(), EventFamily::Variable);
        assert_eq!(EventType::TaskCompleted.family(), EventFamily::Task);
        assert_eq!(EventType::ActivityStarted.family(), EventFamily::Activity);
        assert_eq!(
            EventType::IntegrationErrorReceived.family(),
            EventFamily::Integration
        );
        assert_eq!(EventType::ProcessDeployed.family(), EventFamily::Deployment);
    }
}
