//! Integration tests for checkpointing and crash recovery: sequence
//! monotonicity, resumption from the latest snapshot without re-running
//! succeeded steps, and the status surface over a cold checkpoint store.

mod common;

use common::{quick_config, wait_terminal, RecordingAction, StubProvisioner};
use director_core::models::execution::{ExecutionCheckpoint, WorkflowExecution};
use director_core::models::workflow::{WorkflowDefinition, WorkflowStep};
use director_core::orchestration::{
    CheckpointStore, Director, FileCheckpointStore, OrchestrationError,
};
use director_core::state_machine::{StepState, WorkflowState};
use serde_json::json;
use std::sync::Arc;

fn two_step_definition() -> WorkflowDefinition {
    WorkflowDefinition::new(
        "pipeline",
        "gather then submit",
        vec![
            WorkflowStep::new("gather", "work"),
            WorkflowStep::new("submit", "work").with_dependencies(vec!["gather"]),
        ],
    )
    .unwrap()
}

#[tokio::test]
async fn checkpoints_are_written_with_increasing_sequences() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCheckpointStore::new(dir.path()));
    let provisioner = StubProvisioner::new();
    let director = Director::new(quick_config(), provisioner)
        .with_checkpoint_store(store.clone());
    let recorder = RecordingAction::new();
    director.registry().register("work", recorder.clone()).await;

    let workflow_id = director.create_workflow(two_step_definition()).unwrap();
    let execution_id = director.execute(workflow_id).await.unwrap();
    let view = wait_terminal(&director, execution_id).await;
    assert_eq!(view.status, WorkflowState::Completed);

    let latest = store.load_latest(execution_id).await.unwrap().unwrap();
    assert_eq!(latest.execution.status, WorkflowState::Completed);
    // start + 2 × (admit + finish) + completion, at minimum
    assert!(latest.sequence >= 6, "sequence was {}", latest.sequence);
    assert_eq!(latest.execution.checkpoint_seq, latest.sequence);
}

#[tokio::test]
async fn recovery_resumes_without_re_running_succeeded_steps() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCheckpointStore::new(dir.path()));

    // snapshot of an execution that crashed mid-flight: "gather" already
    // succeeded, "submit" was running its first attempt
    let definition = two_step_definition();
    let mut crashed = WorkflowExecution::for_definition(&definition);
    crashed.status = WorkflowState::Running;
    crashed.checkpoint_seq = 5;
    {
        let gather = crashed.step_mut("gather").unwrap();
        gather.status = StepState::Succeeded;
        gather.attempts = 1;
        gather.output = Some(json!({"jobs_found": 12}));
    }
    {
        let submit = crashed.step_mut("submit").unwrap();
        submit.status = StepState::Running;
        submit.attempts = 1;
    }
    let execution_id = crashed.id;
    store
        .save(&ExecutionCheckpoint::capture(&definition, &crashed))
        .await
        .unwrap();

    // a fresh process: new director, same store, same registered actions
    let provisioner = StubProvisioner::new();
    let director = Director::new(quick_config(), provisioner)
        .with_checkpoint_store(store.clone());
    let recorder = RecordingAction::new();
    director.registry().register("work", recorder.clone()).await;

    let recovered_id = director.recover(execution_id).await.unwrap();
    assert_eq!(recovered_id, execution_id);
    let view = wait_terminal(&director, execution_id).await;

    // same terminal outcome as an uninterrupted run
    assert_eq!(view.status, WorkflowState::Completed);
    // the succeeded step was not re-executed
    assert_eq!(recorder.invocation_count_for("gather"), 0);
    assert_eq!(view.steps["gather"].attempts, 1);
    // the in-flight step was retried with its attempt count preserved
    assert_eq!(recorder.invocation_count_for("submit"), 1);
    assert_eq!(view.steps["submit"].attempts, 2);

    // recovery continued the checkpoint sequence rather than restarting it
    let latest = store.load_latest(execution_id).await.unwrap().unwrap();
    assert!(latest.sequence > 5);
}

#[tokio::test]
async fn terminal_checkpoints_are_not_recoverable() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCheckpointStore::new(dir.path()));

    let definition = two_step_definition();
    let mut finished = WorkflowExecution::for_definition(&definition);
    finished.status = WorkflowState::Completed;
    finished.checkpoint_seq = 9;
    let execution_id = finished.id;
    store
        .save(&ExecutionCheckpoint::capture(&definition, &finished))
        .await
        .unwrap();

    let provisioner = StubProvisioner::new();
    let director =
        Director::new(quick_config(), provisioner).with_checkpoint_store(store);

    let err = director.recover(execution_id).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::InvalidExecutionState { .. }
    ));
}

#[tokio::test]
async fn recover_without_a_checkpoint_is_an_error() {
    let provisioner = StubProvisioner::new();
    let director = Director::new(quick_config(), provisioner);

    let missing = director_core::models::execution::ExecutionId::new();
    let err = director.recover(missing).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::CheckpointNotFound(_)));
}

#[tokio::test]
async fn recover_all_revives_only_non_terminal_executions() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCheckpointStore::new(dir.path()));

    let definition = two_step_definition();
    let mut live = WorkflowExecution::for_definition(&definition);
    live.status = WorkflowState::Running;
    live.checkpoint_seq = 2;
    live.step_mut("gather").unwrap().status = StepState::Running;
    live.step_mut("gather").unwrap().attempts = 1;
    let live_id = live.id;
    store
        .save(&ExecutionCheckpoint::capture(&definition, &live))
        .await
        .unwrap();

    let other_definition = two_step_definition();
    let mut done = WorkflowExecution::for_definition(&other_definition);
    done.status = WorkflowState::Completed;
    done.checkpoint_seq = 8;
    store
        .save(&ExecutionCheckpoint::capture(&other_definition, &done))
        .await
        .unwrap();

    let provisioner = StubProvisioner::new();
    let director = Director::new(quick_config(), provisioner)
        .with_checkpoint_store(store);
    let recorder = RecordingAction::new();
    director.registry().register("work", recorder.clone()).await;

    let recovered = director.recover_all().await.unwrap();
    assert_eq!(recovered, vec![live_id]);

    let view = wait_terminal(&director, live_id).await;
    assert_eq!(view.status, WorkflowState::Completed);
}

#[tokio::test]
async fn status_is_served_from_the_checkpoint_store_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCheckpointStore::new(dir.path()));

    let definition = two_step_definition();
    let mut paused = WorkflowExecution::for_definition(&definition);
    paused.status = WorkflowState::Paused;
    paused.checkpoint_seq = 3;
    paused.step_mut("gather").unwrap().status = StepState::Succeeded;
    let execution_id = paused.id;
    store
        .save(&ExecutionCheckpoint::capture(&definition, &paused))
        .await
        .unwrap();

    let provisioner = StubProvisioner::new();
    let director =
        Director::new(quick_config(), provisioner).with_checkpoint_store(store);

    let view = director.status(execution_id).await.unwrap();
    assert_eq!(view.status, WorkflowState::Paused);
    assert_eq!(view.workflow_name, "pipeline");
    assert_eq!(view.steps["gather"].status, StepState::Succeeded);
    assert_eq!(view.progress, 0.5);
}
