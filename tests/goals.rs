use chrono::{Duration, Utc};
use mongodb::bson::oid::ObjectId;

use fundkeeper::error::CoreError;
use fundkeeper::models::GoalStatus;
use fundkeeper::state::{
    add_fund, add_fund_at, available_funds, create_goal, create_transaction, delete_goal,
    get_goal, goal_stats, list_goals, update_goal,
};
use fundkeeper::validation::{GoalInput, NewGoal};

#[path = "common/mod.rs"]
mod common;

use common::{approx, expense, income};

fn new_goal(name: &str, target: f64) -> NewGoal {
    GoalInput {
        name: name.to_string(),
        target_amount: target,
        currency: None,
        current_amount: None,
        deadline: None,
    }
    .validate(Utc::now())
    .unwrap()
}

#[tokio::test]
async fn funding_clamps_and_completes_once() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = &ctx.state;
    let user = ctx.user;

    create_transaction(state, &user, income("Salary", 1000.0, "USD"))
        .await
        .unwrap();
    let goal = create_goal(state, &user, new_goal("Bike", 500.0)).await.unwrap();
    let goal_id = goal.id.unwrap();
    assert_eq!(goal.status, GoalStatus::InProgress);
    assert_eq!(goal.current_amount, 0.0);

    let funded = add_fund(state, &user, &goal_id, 300.0, None).await.unwrap();
    assert!(approx(funded.current_amount, 300.0));
    assert_eq!(funded.status, GoalStatus::InProgress);
    assert_eq!(ctx.notifier.count("Goal Completed!"), 0);

    let funded = add_fund(state, &user, &goal_id, 300.0, Some("USD")).await.unwrap();
    assert!(approx(funded.current_amount, 500.0));
    assert_eq!(funded.status, GoalStatus::Completed);
    assert_eq!(ctx.notifier.count("Goal Completed!"), 1);

    let funded = add_fund(state, &user, &goal_id, 100.0, None).await.unwrap();
    assert!(approx(funded.current_amount, 500.0));
    assert_eq!(funded.status, GoalStatus::Completed);
    assert_eq!(ctx.notifier.count("Goal Completed!"), 1);

    let stored = get_goal(state, &user, &goal_id).await.unwrap();
    assert!(approx(stored.current_amount, 500.0));
    assert_eq!(stored.status, GoalStatus::Completed);

    common::teardown(ctx).await;
}

#[tokio::test]
async fn funding_is_limited_by_lifetime_income() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = &ctx.state;
    let user = ctx.user;
    let goal_id = create_goal(state, &user, new_goal("Laptop", 2000.0))
        .await
        .unwrap()
        .id
        .unwrap();

    let err = add_fund(state, &user, &goal_id, 9.0, Some("EUR")).await.unwrap_err();
    match err {
        CoreError::InsufficientFunds {
            available,
            requested,
        } => {
            assert_eq!(available, 0.0);
            assert!(approx(requested, 10.0));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    create_transaction(state, &user, income("Salary", 100.0, "USD"))
        .await
        .unwrap();
    // Expenses are not deducted from available funds.
    create_transaction(state, &user, expense("Food", 80.0, "USD"))
        .await
        .unwrap();
    assert!(approx(available_funds(state, &user).await.unwrap(), 100.0));

    let err = add_fund(state, &user, &goal_id, 150.0, None).await.unwrap_err();
    match err {
        CoreError::InsufficientFunds {
            available,
            requested,
        } => {
            assert!(approx(available, 100.0));
            assert!(approx(requested, 150.0));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // 90 EUR is exactly 100 USD.
    let funded = add_fund(state, &user, &goal_id, 90.0, Some("EUR")).await.unwrap();
    assert!(approx(funded.current_amount, 100.0));

    let err = add_fund(state, &user, &goal_id, 0.0, None).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let err = add_fund(state, &ObjectId::new(), &goal_id, 1.0, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));

    common::teardown(ctx).await;
}

#[tokio::test]
async fn deadline_notice_fires_on_every_late_funding() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = &ctx.state;
    let user = ctx.user;
    let now = Utc::now();

    create_transaction(state, &user, income("Salary", 1000.0, "USD"))
        .await
        .unwrap();
    let mut input = new_goal("Holiday", 900.0);
    input.deadline = Some(now + Duration::days(1));
    let goal_id = create_goal(state, &user, input).await.unwrap().id.unwrap();

    let late = now + Duration::days(2);
    add_fund_at(state, &user, &goal_id, 10.0, None, now).await.unwrap();
    assert_eq!(ctx.notifier.count("Goal Not Fulfilled Before Deadline"), 0);

    add_fund_at(state, &user, &goal_id, 10.0, None, late).await.unwrap();
    add_fund_at(state, &user, &goal_id, 10.0, None, late).await.unwrap();
    assert_eq!(ctx.notifier.count("Goal Not Fulfilled Before Deadline"), 2);

    // Completing late sends the completion notice only.
    let done = add_fund_at(state, &user, &goal_id, 900.0, None, late).await.unwrap();
    assert_eq!(done.status, GoalStatus::Completed);
    assert_eq!(ctx.notifier.count("Goal Not Fulfilled Before Deadline"), 2);
    assert_eq!(ctx.notifier.count("Goal Completed!"), 1);

    common::teardown(ctx).await;
}

#[tokio::test]
async fn goal_crud_and_stats() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = &ctx.state;
    let user = ctx.user;

    let mut eur = new_goal("Car", 900.0);
    eur.currency = Some("EUR".into());
    let car = create_goal(state, &user, eur).await.unwrap();
    assert!(approx(car.target_amount, 1000.0));
    let car_id = car.id.unwrap();

    let mut seeded = new_goal("Fund", 200.0);
    seeded.current_amount = Some(250.0);
    let fund = create_goal(state, &user, seeded).await.unwrap();
    assert_eq!(fund.status, GoalStatus::Completed);
    assert!(approx(fund.current_amount, 200.0));

    let mut lowered = new_goal("Car", 100.0);
    lowered.current_amount = Some(150.0);
    let car = update_goal(state, &user, &car_id, lowered).await.unwrap();
    assert_eq!(car.status, GoalStatus::Completed);
    assert!(approx(car.current_amount, 100.0));

    let raised = update_goal(state, &user, &car_id, new_goal("Car", 400.0))
        .await
        .unwrap();
    assert_eq!(raised.status, GoalStatus::InProgress);
    assert!(approx(raised.current_amount, 100.0));

    create_goal(state, &user, new_goal("House", 50_000.0)).await.unwrap();
    assert_eq!(list_goals(state, &user).await.unwrap().len(), 3);

    let stats = goal_stats(state, &user).await.unwrap();
    assert_eq!(stats.total_goals, 3);
    assert_eq!(stats.completed_goals, 1);
    assert!(approx(stats.total_target_amount, 50_600.0));
    assert!(approx(stats.total_current_amount, 300.0));
    assert!(approx(stats.completion_rate, 100.0 / 3.0));

    delete_goal(state, &user, &car_id).await.unwrap();
    assert!(matches!(
        get_goal(state, &user, &car_id).await.unwrap_err(),
        CoreError::NotFound(_)
    ));
    assert!(matches!(
        delete_goal(state, &user, &car_id).await.unwrap_err(),
        CoreError::NotFound(_)
    ));

    common::teardown(ctx).await;
}
