// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire-format tests for the runtime event envelope.

use bpm_query_events::payload::{
    IntegrationContextPayload, ProcessDefinitionPayload, ProcessInstancePayload,
    TaskCandidateUserPayload, VariablePayload,
};
use bpm_query_events::{CloudRuntimeEvent, EventError, EventFamily, EventType};
use serde_json::json;

#[test]
fn test_batch_of_mixed_events_decodes() {
    let raw = json!([
        {
            "id": "e1",
            "eventType": "PROCESS_CREATED",
            "timestamp": 1000,
            "serviceName": "rb",
            "appName": "billing",
            "appVersion": "1",
            "entity": { "id": "pi-1", "processDefinitionKey": "invoice", "status": "CREATED" }
        },
        {
            "id": "e2",
            "eventType": "VARIABLE_CREATED",
            "timestamp": 1001,
            "processInstanceId": "pi-1",
            "entity": { "name": "amount", "type": "integer", "value": 10, "processInstanceId": "pi-1" }
        },
        {
            "id": "e3",
            "eventType": "TIMER_FIRED",
            "timestamp": 1002,
            "entity": {}
        }
    ]);

    let events: Vec<CloudRuntimeEvent> = serde_json::from_value(raw).unwrap();
    assert_eq!(events.len(), 3);

    let types: Vec<Option<EventType>> = events.iter().map(CloudRuntimeEvent::event_type).collect();
    assert_eq!(
        types,
        vec![
            Some(EventType::ProcessCreated),
            Some(EventType::VariableCreated),
            None
        ]
    );

    let process: ProcessInstancePayload = events[0].entity_as().unwrap();
    assert_eq!(process.id, "pi-1");
    assert_eq!(process.process_definition_key.as_deref(), Some("invoice"));

    let variable: VariablePayload = events[1].entity_as().unwrap();
    assert_eq!(variable.value, json!(10));
    assert!(!variable.is_task_variable());
}

#[test]
fn test_integration_error_payload() {
    let event: CloudRuntimeEvent = serde_json::from_value(json!({
        "eventType": "INTEGRATION_ERROR_RECEIVED",
        "entity": {
            "processInstanceId": "pi-1",
            "clientId": "charge",
            "executionId": "ex-7",
            "errorCode": "E42",
            "errorMessage": "card declined",
            "errorClassName": "PaymentException",
            "stackTraceElements": [{ "className": "Pay", "lineNumber": 12 }]
        }
    }))
    .unwrap();

    assert_eq!(
        event.event_type().map(|t| t.family()),
        Some(EventFamily::Integration)
    );

    let context: IntegrationContextPayload = event.entity_as().unwrap();
    assert_eq!(context.context_id(), "pi-1:charge:ex-7");
    assert_eq!(context.error_code.as_deref(), Some("E42"));
    assert_eq!(context.stack_trace_elements.len(), 1);
}

#[test]
fn test_deployment_payload_with_model_content() {
    let event = CloudRuntimeEvent::new(
        EventType::ProcessDeployed,
        json!({
            "id": "invoice:3:abc",
            "key": "invoice",
            "version": 3,
            "processModelContent": "<definitions/>"
        }),
    )
    .with_app("billing", "3");

    let definition: ProcessDefinitionPayload = event.entity_as().unwrap();
    assert_eq!(definition.version, Some(3));
    assert_eq!(
        definition.process_model_content.as_deref(),
        Some("<definitions/>")
    );
    assert_eq!(event.app_version.as_deref(), Some("3"));
}

#[test]
fn test_candidate_payload_requires_identity() {
    let event = CloudRuntimeEvent::new(
        EventType::TaskCandidateUserAdded,
        json!({ "taskId": "t1" }),
    );

    let err = event.entity_as::<TaskCandidateUserPayload>().unwrap_err();
    match err {
        EventError::MalformedPayload {
            event_type,
            details,
        } => {
            assert_eq!(event_type, "TASK_CANDIDATE_USER_ADDED");
            assert!(details.contains("userId"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_envelope_serializes_camel_case() {
    let event = CloudRuntimeEvent::new(EventType::TaskCreated, json!({ "id": "t1" }))
        .with_id("e1")
        .with_service("rb", "rb-full", "7.1")
        .with_process_instance_id("pi-1");

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["eventType"], "TASK_CREATED");
    assert_eq!(value["serviceFullName"], "rb-full");
    assert_eq!(value["processInstanceId"], "pi-1");
    assert_eq!(value["entity"]["id"], "t1");
}
