//! Approval, status transitions and progress tracking.

mod common;

use std::time::Duration;

use common::{slow_engine, Harness};
use creditcore::{
    ApprovalDecision, CreditConfig, CreditError, CreditStore, Credits, Milestone,
    MilestoneThreshold, Operation, Priority, Task, TaskDraft, TaskStatus, TaskUpdate,
    TemplateKind, Timestamp,
};
use creditcore_testing::fixtures::{admin_id, client_id, seed_client, task_template};
use creditcore_testing::ChaosConfig;

async fn purchased_task(h: &Harness) -> Task {
    let client = client_id("lifecycle-client");
    seed_client(&h.engine, &client, 500).await.unwrap();
    let template = h
        .memory
        .put_template(task_template(TemplateKind::Task, 50))
        .await
        .unwrap();
    h.engine
        .purchase_template(&client, template.id)
        .await
        .unwrap()
}

async fn manual_task(h: &Harness, target: u64, milestone_at: f64) -> Task {
    let client = client_id("manual-client");
    seed_client(&h.engine, &client, 500).await.unwrap();
    let now = h.now();
    let draft = TaskDraft::assignment(client, "Outreach", Credits::whole(20), now, now.plus_days(30))
        .with_manual_target(target)
        .with_milestone(Milestone::new(
            "Almost there",
            MilestoneThreshold::try_new(milestone_at).unwrap(),
            "#a855f7",
        ));
    h.engine.assign_task(&admin_id("ops"), draft).await.unwrap()
}

#[tokio::test]
async fn approval_schedules_and_activates_a_purchased_task() {
    // Given: a purchased task awaiting approval
    let h = Harness::boot(CreditConfig::default()).await;
    let task = purchased_task(&h).await;
    let now = h.now();

    // When: an admin approves it for a ten day window
    let approved = h
        .engine
        .approve_task(
            &admin_id("ops"),
            task.id,
            ApprovalDecision {
                title: "Landing page, final".to_string(),
                start_date: now,
                end_date: now.plus_days(10),
                priority: Priority::High,
            },
        )
        .await
        .unwrap();

    // Then: it is active, retitled and starts from zero
    assert_eq!(approved.status, TaskStatus::Active);
    assert_eq!(approved.title, "Landing page, final");
    assert_eq!(approved.priority, Priority::High);
    assert!(approved.progress.abs() < f64::EPSILON);
    assert_eq!(approved.credits_used, task.credits_used);
}

#[tokio::test]
async fn auto_progress_follows_the_clock() {
    // Given: an approved task running for ten days
    let h = Harness::boot(CreditConfig::default()).await;
    let task = purchased_task(&h).await;
    let now = h.now();
    h.engine
        .approve_task(
            &admin_id("ops"),
            task.id,
            ApprovalDecision {
                title: task.title.clone(),
                start_date: now,
                end_date: now.plus_days(10),
                priority: Priority::Medium,
            },
        )
        .await
        .unwrap();

    // When: five days pass
    h.clock.advance_days(5);
    let halfway = h.engine.refresh_progress(task.id).await.unwrap();

    // Then: progress is half way, and capped at 100 once the window closes
    assert!((halfway.progress - 50.0).abs() < f64::EPSILON);
    h.clock.advance_days(7);
    assert_eq!(h.engine.refresh_active_progress().await.unwrap(), 1);
    let done = h.engine.task(task.id).await.unwrap();
    assert!((done.progress - 100.0).abs() < f64::EPSILON);
    assert_eq!(h.engine.refresh_active_progress().await.unwrap(), 0);
}

#[tokio::test]
async fn approval_is_only_for_pending_approval_tasks() {
    // Given: a task that was already approved
    let h = Harness::boot(CreditConfig::default()).await;
    let task = purchased_task(&h).await;
    let now = h.now();
    let decision = ApprovalDecision {
        title: task.title.clone(),
        start_date: now,
        end_date: now.plus_days(3),
        priority: Priority::Low,
    };
    h.engine
        .approve_task(&admin_id("ops"), task.id, decision.clone())
        .await
        .unwrap();

    // When: approving it again
    let result = h.engine.approve_task(&admin_id("ops"), task.id, decision).await;

    // Then: ACTIVE to ACTIVE is not a transition
    assert!(matches!(
        result,
        Err(CreditError::InvalidTransition {
            from: TaskStatus::Active,
            to: TaskStatus::Active
        })
    ));
}

#[tokio::test]
async fn approval_rejects_inverted_dates() {
    // Given: a purchased task
    let h = Harness::boot(CreditConfig::default()).await;
    let task = purchased_task(&h).await;
    let now = h.now();

    // When: approving with an end before the start
    let result = h
        .engine
        .approve_task(
            &admin_id("ops"),
            task.id,
            ApprovalDecision {
                title: task.title.clone(),
                start_date: now.plus_days(5),
                end_date: now,
                priority: Priority::Medium,
            },
        )
        .await;

    // Then: the task is unchanged
    assert!(matches!(result, Err(CreditError::ValidationFailed(_))));
    assert_eq!(
        h.engine.task(task.id).await.unwrap().status,
        TaskStatus::PendingApproval
    );
}

#[tokio::test]
async fn pending_approval_tasks_cannot_be_completed_or_cancelled() {
    // Given: a purchased task awaiting approval
    let h = Harness::boot(CreditConfig::default()).await;
    let task = purchased_task(&h).await;

    // When/Then: both terminal transitions are refused
    assert!(matches!(
        h.engine.complete_task(&admin_id("ops"), task.id).await,
        Err(CreditError::InvalidTransition {
            from: TaskStatus::PendingApproval,
            to: TaskStatus::Completed
        })
    ));
    assert!(matches!(
        h.engine
            .cancel_task(&admin_id("ops"), task.id, "changed my mind")
            .await,
        Err(CreditError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn terminal_tasks_stay_terminal() {
    // Given: a completed task
    let h = Harness::boot(CreditConfig::default()).await;
    let task = manual_task(&h, 10, 50.0).await;
    let completed = h
        .engine
        .complete_task(&admin_id("ops"), task.id)
        .await
        .unwrap();
    assert_eq!(completed.completed_at, Some(h.now()));

    // When/Then: it can be neither cancelled, edited nor progressed
    assert!(matches!(
        h.engine.cancel_task(&admin_id("ops"), task.id, "late").await,
        Err(CreditError::InvalidTransition {
            from: TaskStatus::Completed,
            to: TaskStatus::Cancelled
        })
    ));
    assert!(matches!(
        h.engine
            .update_task(
                &admin_id("ops"),
                task.id,
                TaskUpdate {
                    title: Some("Renamed".to_string()),
                    ..TaskUpdate::default()
                }
            )
            .await,
        Err(CreditError::NotEligible(_))
    ));
    assert!(matches!(
        h.engine.record_progress(task.id, 5).await,
        Err(CreditError::NotEligible(_))
    ));
}

#[tokio::test]
async fn cancellation_keeps_the_record_and_the_charge() {
    // Given: an active task
    let h = Harness::boot(CreditConfig::default()).await;
    let task = manual_task(&h, 10, 50.0).await;

    // When: cancelling it
    let cancelled = h
        .engine
        .cancel_task(&admin_id("ops"), task.id, "client request")
        .await
        .unwrap();

    // Then: the task remains, marked cancelled, and no refund is issued
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("client request"));
    assert_eq!(cancelled.cancelled_at, Some(h.now()));
    assert_eq!(
        h.engine
            .wallet_of(&client_id("manual-client"))
            .await
            .unwrap()
            .balance,
        Credits::whole(480)
    );
    assert!(h.engine.validator().run().await.unwrap().is_consistent());
}

#[tokio::test]
async fn progress_update_cannot_revive_a_cancelled_task() {
    // Given: an active MANUAL task on a store whose task reads answer late
    let engine = slow_engine(
        ChaosConfig::deterministic().with_latency(Operation::ReadTasks, Duration::from_millis(20)),
    )
    .await;
    let client = client_id("contended");
    seed_client(&engine, &client, 100).await.unwrap();
    let ops = admin_id("ops");
    let now = Timestamp::now();
    let task = engine
        .assign_task(
            &ops,
            TaskDraft::assignment(client, "Outreach", Credits::whole(20), now, now.plus_days(30))
                .with_manual_target(100),
        )
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Active);

    // When: progress is recorded while a cancellation is in flight
    let (cancelled, progressed) = tokio::join!(
        engine.cancel_task(&ops, task.id, "client left"),
        async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            engine.record_progress(task.id, 50).await
        }
    );

    // Then: the cancellation stands and the progress update is refused
    assert!(cancelled.is_ok());
    assert!(matches!(progressed, Err(CreditError::NotEligible(_))));
    let stored = engine.task(task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Cancelled);
    assert_eq!(stored.progress_achieved, 0);
}

#[tokio::test]
async fn manual_progress_is_not_capped() {
    // Given: a MANUAL task with a target of 5000
    let h = Harness::boot(CreditConfig::default()).await;
    let task = manual_task(&h, 5_000, 80.0).await;

    // When: 6000 are achieved
    let updated = h.engine.record_progress(task.id, 6_000).await.unwrap();

    // Then: progress reads 120 percent
    assert!((updated.progress - 120.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn milestones_follow_progress_both_ways() {
    // Given: a MANUAL task with a milestone at 80 percent
    let h = Harness::boot(CreditConfig::default()).await;
    let task = manual_task(&h, 100, 80.0).await;

    // When: progress crosses 80
    let reached = h.engine.record_progress(task.id, 85).await.unwrap();

    // Then: the milestone is reached and colors the task
    assert!(reached.milestones[0].reached);
    assert_eq!(reached.milestones[0].reached_at, Some(h.now()));
    assert_eq!(reached.progress_color, "#a855f7");

    // When: progress falls back to 50
    let regressed = h.engine.record_progress(task.id, 50).await.unwrap();

    // Then: the milestone is cleared and the band color returns
    assert!(!regressed.milestones[0].reached);
    assert_eq!(regressed.milestones[0].reached_at, None);
    assert_eq!(regressed.progress_color, "#eab308");
}

#[tokio::test]
async fn auto_tasks_do_not_accept_manual_progress() {
    // Given: an AUTO task
    let h = Harness::boot(CreditConfig::default()).await;
    let client = client_id("auto-client");
    seed_client(&h.engine, &client, 100).await.unwrap();
    let now = h.now();
    let task = h
        .engine
        .assign_task(
            &admin_id("ops"),
            TaskDraft::assignment(client, "Timed", Credits::whole(10), now, now.plus_days(2)),
        )
        .await
        .unwrap();

    // When/Then: recording a quantity is refused
    assert!(matches!(
        h.engine.record_progress(task.id, 3).await,
        Err(CreditError::ValidationFailed(_))
    ));
}

#[tokio::test]
async fn charged_prices_cannot_be_edited() {
    // Given: an active, charged task
    let h = Harness::boot(CreditConfig::default()).await;
    let task = manual_task(&h, 10, 50.0).await;

    // When: an admin tries to change its price
    let result = h
        .engine
        .update_task(
            &admin_id("ops"),
            task.id,
            TaskUpdate {
                credit_cost: Some(Credits::whole(1)),
                ..TaskUpdate::default()
            },
        )
        .await;

    // Then: the edit is refused and the task keeps its charge
    assert!(matches!(result, Err(CreditError::ValidationFailed(_))));
    assert_eq!(
        h.engine.task(task.id).await.unwrap().credits_used,
        Credits::whole(20)
    );
}

#[tokio::test]
async fn plan_edits_change_future_prices_only() {
    // Given: a published plan
    let h = Harness::boot(CreditConfig::default()).await;
    let plan = h
        .engine
        .publish_plan(&admin_id("ops"), TaskDraft::plan("Bundle", Credits::whole(40)))
        .await
        .unwrap();

    // When: the plan price changes
    let edited = h
        .engine
        .update_task(
            &admin_id("ops"),
            plan.id,
            TaskUpdate {
                credit_cost: Some(Credits::whole(55)),
                ..TaskUpdate::default()
            },
        )
        .await
        .unwrap();

    // Then: it stays a listed plan with the new price
    assert_eq!(edited.status, TaskStatus::Listed);
    assert_eq!(edited.effective_charge(), Credits::whole(55));
    assert!(matches!(
        h.engine.record_progress(plan.id, 1).await,
        Err(CreditError::ValidationFailed(_) | CreditError::NotEligible(_))
    ));
}
