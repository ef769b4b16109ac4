//! Assignment and purchase flows against the in-memory store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::Harness;
use creditcore::{
    AccountRole, ClientAccount, CreditConfig, CreditEngine, CreditError, CreditStore, Credits,
    FixedClock, LedgerEntry, LedgerEntryKind, LedgerReference, NotificationKind, NotificationSink,
    RelatedEntity, TaskDraft, TaskOrigin, TaskStatus, TemplateKind, Timestamp, Violation,
};
use creditcore_memory::InMemoryCreditStore;
use creditcore_testing::fixtures::{
    admin_id, client_id, seed_client, task_template, FailingNotificationSink,
    StalledNotificationSink,
};
use rust_decimal_macros::dec;

#[tokio::test]
async fn assignment_charges_the_offer_price() {
    // Given: a client holding 500 credits
    let h = Harness::boot(CreditConfig::default()).await;
    let client = client_id("offer-client");
    seed_client(&h.engine, &client, 500).await.unwrap();
    let now = h.now();

    // When: assigning a task costing 200 with an offer price of 150
    let draft = TaskDraft::assignment(
        client.clone(),
        "Audit",
        Credits::whole(200),
        now,
        now.plus_days(10),
    )
    .with_offer_price(Credits::whole(150));
    let task = h.engine.assign_task(&admin_id("ops"), draft).await.unwrap();

    // Then: 150 is charged and recorded against the task
    assert_eq!(task.status, TaskStatus::Active);
    assert_eq!(task.credits_used, Credits::whole(150));
    let wallet = h.engine.wallet_of(&client).await.unwrap();
    assert_eq!(wallet.balance, Credits::whole(350));

    let history = h.engine.ledger().history(wallet.id).await.unwrap();
    let charge = history.last().unwrap();
    assert_eq!(charge.kind, LedgerEntryKind::TaskAssigned);
    assert_eq!(charge.amount, dec!(-150));
    assert_eq!(charge.reference_id, Some(LedgerReference::Task(task.id)));
    assert!(h.engine.validator().run().await.unwrap().is_consistent());
}

#[tokio::test]
async fn assignment_without_offer_charges_the_base_cost() {
    // Given: a client holding 500 credits
    let h = Harness::boot(CreditConfig::default()).await;
    let client = client_id("base-client");
    seed_client(&h.engine, &client, 500).await.unwrap();
    let now = h.now();

    // When: assigning a task costing 200 without an offer
    let draft = TaskDraft::assignment(
        client.clone(),
        "Audit",
        Credits::whole(200),
        now,
        now.plus_days(10),
    );
    let task = h.engine.assign_task(&admin_id("ops"), draft).await.unwrap();

    // Then: the base cost is charged
    assert_eq!(task.credits_used, Credits::whole(200));
    assert_eq!(
        h.engine.wallet_of(&client).await.unwrap().balance,
        Credits::whole(300)
    );
}

#[tokio::test]
async fn future_assignment_starts_pending() {
    // Given: a funded client
    let h = Harness::boot(CreditConfig::default()).await;
    let client = client_id("future-client");
    seed_client(&h.engine, &client, 100).await.unwrap();
    let now = h.now();

    // When: assigning a task that starts tomorrow
    let draft = TaskDraft::assignment(
        client,
        "Later",
        Credits::whole(10),
        now.plus_days(1),
        now.plus_days(5),
    );
    let task = h.engine.assign_task(&admin_id("ops"), draft).await.unwrap();

    // Then: it waits in PENDING with no progress
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.progress.abs() < f64::EPSILON);
}

#[tokio::test]
async fn insufficient_balance_leaves_no_trace() {
    // Given: a client holding 100 credits
    let h = Harness::boot(CreditConfig::default()).await;
    let client = client_id("thin-client");
    let wallet = seed_client(&h.engine, &client, 100).await.unwrap();
    let now = h.now();

    // When: assigning a task whose effective charge is 150
    let draft = TaskDraft::assignment(
        client.clone(),
        "Too expensive",
        Credits::whole(200),
        now,
        now.plus_days(3),
    )
    .with_offer_price(Credits::whole(150));
    let result = h.engine.assign_task(&admin_id("ops"), draft).await;

    // Then: the charge is refused and nothing is written
    match result {
        Err(CreditError::InsufficientBalance {
            balance, required, ..
        }) => {
            assert_eq!(balance, Credits::whole(100));
            assert_eq!(required, Credits::whole(150));
        }
        other => panic!("expected InsufficientBalance, got {other:?}"),
    }
    assert_eq!(
        h.engine.wallet_of(&client).await.unwrap().balance,
        Credits::whole(100)
    );
    assert!(h.memory.list_tasks().await.unwrap().is_empty());
    assert_eq!(h.engine.ledger().history(wallet.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn client_without_a_wallet_is_refused_without_provisioning() {
    // Given: a registered client whose wallet was never provisioned
    let h = Harness::boot(CreditConfig::default()).await;
    let client = client_id("walletless");
    h.memory
        .put_client(ClientAccount::client(client.clone(), "Walletless"))
        .await
        .unwrap();
    let template = h
        .memory
        .put_template(task_template(TemplateKind::Task, 25))
        .await
        .unwrap();

    // When: buying a template
    let result = h.engine.purchase_template(&client, template.id).await;

    // Then: it is refused against a zero balance and no wallet is created
    match result {
        Err(CreditError::InsufficientBalance {
            wallet,
            balance,
            required,
        }) => {
            assert_eq!(wallet, None);
            assert!(balance.is_zero());
            assert_eq!(required, Credits::whole(25));
        }
        other => panic!("expected InsufficientBalance, got {other:?}"),
    }
    assert!(h.memory.list_wallets().await.unwrap().is_empty());
    assert!(h.memory.list_tasks().await.unwrap().is_empty());
}

#[tokio::test]
async fn listing_with_a_client_is_rejected_before_any_write() {
    // Given: a registered client
    let h = Harness::boot(CreditConfig::default()).await;
    let client = client_id("mixed-client");
    seed_client(&h.engine, &client, 100).await.unwrap();

    // When: creating a plan that names the client
    let mut draft = TaskDraft::plan("Mixed", Credits::whole(10));
    draft.client_id = Some(client.clone());
    let result = h.engine.create_task(&admin_id("ops"), draft).await;

    // Then: validation fails and no task exists
    assert!(matches!(result, Err(CreditError::ValidationFailed(_))));
    assert!(h.memory.list_tasks().await.unwrap().is_empty());
}

#[tokio::test]
async fn plan_with_dates_is_rejected() {
    // Given: a plan draft carrying a start date
    let h = Harness::boot(CreditConfig::default()).await;
    let mut draft = TaskDraft::plan("Dated plan", Credits::whole(10));
    draft.start_date = Some(h.now());

    // When: publishing it
    let result = h.engine.publish_plan(&admin_id("ops"), draft).await;

    // Then: it is refused
    assert!(matches!(result, Err(CreditError::ValidationFailed(_))));
}

#[tokio::test]
async fn plan_purchase_clones_the_plan_and_leaves_it_listed() {
    // Given: a published plan and a funded client
    let h = Harness::boot(CreditConfig::default()).await;
    let plan = h
        .engine
        .create_task(
            &admin_id("ops"),
            TaskDraft::plan("SEO package", Credits::whole(80))
                .with_offer_price(Credits::whole(60)),
        )
        .await
        .unwrap();
    let client = client_id("plan-buyer");
    seed_client(&h.engine, &client, 100).await.unwrap();

    // When: the client buys the plan
    let bought = h.engine.purchase_plan(&client, plan.id).await.unwrap();

    // Then: a new client-bound task awaits approval and the plan is unchanged
    assert_ne!(bought.id, plan.id);
    assert_eq!(bought.status, TaskStatus::PendingApproval);
    assert_eq!(bought.client_id, Some(client.clone()));
    assert_eq!(bought.origin, TaskOrigin::PlanPurchase { plan_id: plan.id });
    assert_eq!(bought.credits_used, Credits::whole(60));
    assert_eq!(h.engine.task(plan.id).await.unwrap(), plan);
    assert_eq!(
        h.engine.wallet_of(&client).await.unwrap().balance,
        Credits::whole(40)
    );
    assert!(h.engine.validator().run().await.unwrap().is_consistent());
}

#[tokio::test]
async fn buying_a_client_task_as_a_plan_is_not_eligible() {
    // Given: a task already assigned to a client
    let h = Harness::boot(CreditConfig::default()).await;
    let client = client_id("owner");
    seed_client(&h.engine, &client, 100).await.unwrap();
    let now = h.now();
    let task = h
        .engine
        .assign_task(
            &admin_id("ops"),
            TaskDraft::assignment(client.clone(), "Owned", Credits::whole(5), now, now.plus_days(1)),
        )
        .await
        .unwrap();

    // When: purchasing it as if it were a plan
    let result = h.engine.purchase_plan(&client, task.id).await;

    // Then: it is refused without charging
    assert!(matches!(result, Err(CreditError::NotEligible(_))));
    assert_eq!(
        h.engine.wallet_of(&client).await.unwrap().balance,
        Credits::whole(95)
    );
}

#[tokio::test]
async fn template_purchase_waits_for_approval() {
    // Given: an active task template and a funded client
    let h = Harness::boot(CreditConfig::default()).await;
    let template = h
        .memory
        .put_template(task_template(TemplateKind::Task, 70))
        .await
        .unwrap();
    let client = client_id("template-buyer");
    let wallet = seed_client(&h.engine, &client, 100).await.unwrap();

    // When: buying the template
    let task = h
        .engine
        .purchase_template(&client, template.id)
        .await
        .unwrap();

    // Then: the task has no dates yet and the purchase is on the ledger
    assert_eq!(task.status, TaskStatus::PendingApproval);
    assert_eq!(task.start_date, None);
    assert_eq!(task.end_date, None);
    let history = h.engine.ledger().history(wallet.id).await.unwrap();
    assert_eq!(history.last().unwrap().kind, LedgerEntryKind::TaskPurchase);
    assert_eq!(history.last().unwrap().amount, dec!(-70));
}

#[tokio::test]
async fn subscription_purchase_is_active_immediately() {
    // Given: a 30 day subscription template
    let h = Harness::boot(CreditConfig::default()).await;
    let template = h
        .memory
        .put_template(task_template(TemplateKind::Subscription, 30))
        .await
        .unwrap();
    let client = client_id("subscriber");
    let wallet = seed_client(&h.engine, &client, 100).await.unwrap();
    let now = h.now();

    // When: buying the subscription
    let task = h
        .engine
        .purchase_subscription(&client, template.id)
        .await
        .unwrap();

    // Then: it runs from now for 30 days
    assert_eq!(task.status, TaskStatus::Active);
    assert_eq!(task.start_date, Some(now));
    assert_eq!(task.end_date, Some(now.plus_days(30)));
    let history = h.engine.ledger().history(wallet.id).await.unwrap();
    assert_eq!(
        history.last().unwrap().kind,
        LedgerEntryKind::SubscriptionPurchase
    );
}

#[tokio::test]
async fn overlong_subscription_is_refused_without_charging() {
    // Given: a stored subscription template lasting a billion days
    let h = Harness::boot(CreditConfig::default()).await;
    let mut endless = task_template(TemplateKind::Subscription, 10);
    endless.duration_days = 1_000_000_000;
    let endless = h.memory.put_template(endless).await.unwrap();
    let client = client_id("forever");
    seed_client(&h.engine, &client, 100).await.unwrap();

    // When: buying it
    let result = h.engine.purchase_subscription(&client, endless.id).await;

    // Then: the purchase is refused, nothing is charged and the template is flagged
    assert!(matches!(result, Err(CreditError::ValidationFailed(_))));
    assert_eq!(
        h.engine.wallet_of(&client).await.unwrap().balance,
        Credits::whole(100)
    );
    assert!(h.memory.list_tasks().await.unwrap().is_empty());
    let report = h.engine.validator().run().await.unwrap();
    assert!(matches!(
        report.violations(),
        [Violation::InvalidTemplate { template, .. }] if *template == endless.id
    ));
}

#[tokio::test]
async fn inactive_or_mismatched_templates_are_not_eligible() {
    // Given: an inactive task template and an active subscription template
    let h = Harness::boot(CreditConfig::default()).await;
    let mut retired = task_template(TemplateKind::Task, 10);
    retired.active = false;
    let retired = h.memory.put_template(retired).await.unwrap();
    let subscription = h
        .memory
        .put_template(task_template(TemplateKind::Subscription, 10))
        .await
        .unwrap();
    let client = client_id("picky");
    seed_client(&h.engine, &client, 100).await.unwrap();

    // When/Then: neither can be bought as a task template
    assert!(matches!(
        h.engine.purchase_template(&client, retired.id).await,
        Err(CreditError::NotEligible(_))
    ));
    assert!(matches!(
        h.engine.purchase_template(&client, subscription.id).await,
        Err(CreditError::NotEligible(_))
    ));
    assert_eq!(
        h.engine.wallet_of(&client).await.unwrap().balance,
        Credits::whole(100)
    );
}

#[tokio::test]
async fn only_active_clients_can_be_charged() {
    // Given: an unknown client and an admin account
    let h = Harness::boot(CreditConfig::default()).await;
    let template = h
        .memory
        .put_template(task_template(TemplateKind::Task, 10))
        .await
        .unwrap();
    let admin_account = client_id("staff");
    h.memory
        .put_client(ClientAccount {
            role: AccountRole::Admin,
            ..ClientAccount::client(admin_account.clone(), "Staff")
        })
        .await
        .unwrap();

    // When/Then: purchases are refused for both
    assert!(matches!(
        h.engine
            .purchase_template(&client_id("ghost"), template.id)
            .await,
        Err(CreditError::ClientNotFound(_))
    ));
    assert!(matches!(
        h.engine.purchase_template(&admin_account, template.id).await,
        Err(CreditError::NotAClient(_))
    ));
}

#[tokio::test]
async fn purchase_emits_a_notification() {
    // Given: a funded client and a template
    let h = Harness::boot(CreditConfig::default()).await;
    let template = h
        .memory
        .put_template(task_template(TemplateKind::Task, 10))
        .await
        .unwrap();
    let client = client_id("notified");
    seed_client(&h.engine, &client, 100).await.unwrap();

    // When: buying the template
    let task = h
        .engine
        .purchase_template(&client, template.id)
        .await
        .unwrap();

    // Then: the client hears about it
    let received = h.sink.wait_for(2, Duration::from_secs(2)).await;
    let purchase = received
        .iter()
        .find(|n| n.kind == NotificationKind::TaskPurchased)
        .expect("purchase notification");
    assert_eq!(purchase.recipient_id, client);
    assert_eq!(
        purchase.related_entity,
        Some(RelatedEntity::Task(task.id))
    );
}

#[tokio::test]
async fn failing_or_stalled_sinks_do_not_fail_purchases() {
    let sinks: [Arc<dyn NotificationSink>; 2] = [
        Arc::new(FailingNotificationSink),
        Arc::new(StalledNotificationSink),
    ];
    for sink in sinks {
        // Given: an engine whose notifications never get through
        let memory = InMemoryCreditStore::new();
        let engine = CreditEngine::builder(memory.clone())
            .with_clock(Arc::new(FixedClock::new(Timestamp::now())))
            .with_notifier(sink)
            .boot()
            .await
            .unwrap();
        let template = memory
            .put_template(task_template(TemplateKind::Task, 25))
            .await
            .unwrap();
        let client = client_id("unreachable");
        seed_client(&engine, &client, 100).await.unwrap();

        // When: buying a template
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            engine.purchase_template(&client, template.id),
        )
        .await
        .expect("purchase must not wait for the sink");

        // Then: the purchase succeeds regardless
        assert!(result.is_ok());
        assert_eq!(
            engine.wallet_of(&client).await.unwrap().balance,
            Credits::whole(75)
        );
    }
}

#[tokio::test]
async fn charge_entries_cannot_be_amended_or_removed() {
    // Given: a purchase recorded in the ledger
    let h = Harness::boot(CreditConfig::default()).await;
    let client = client_id("auditee");
    let wallet = seed_client(&h.engine, &client, 100).await.unwrap();
    let template = h
        .memory
        .put_template(task_template(TemplateKind::Task, 40))
        .await
        .unwrap();
    h.engine
        .purchase_template(&client, template.id)
        .await
        .unwrap();
    let before = h.engine.ledger().history(wallet.id).await.unwrap();
    let charge = before.last().unwrap().clone();

    // When: rewriting the charge, then deleting it
    let amended = h
        .engine
        .ledger()
        .amend(LedgerEntry {
            amount: dec!(-1),
            ..charge.clone()
        })
        .await;
    let removed = h.engine.ledger().remove(charge.id).await;

    // Then: both are refused and the history is untouched
    assert!(matches!(amended, Err(CreditError::ImmutabilityViolation(id)) if id == charge.id));
    assert!(matches!(removed, Err(CreditError::ImmutabilityViolation(id)) if id == charge.id));
    assert_eq!(h.engine.ledger().history(wallet.id).await.unwrap(), before);
    assert_eq!(h.engine.ledger().balance_of(wallet.id).await.unwrap(), dec!(60));
}
