use crate::error::AppError;
use crate::models::{DbSubscription, NewSubscription, PlanCount, Subscription, format_date};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

const SUBSCRIPTION_COLUMNS: &str = "id, member_id, plan_name, start_date, end_date, price, status";

#[instrument(skip(pool))]
pub async fn create_subscription(
    pool: &Pool<Sqlite>,
    subscription: &NewSubscription,
) -> Result<i64, AppError> {
    info!("Creating subscription");
    let res = sqlx::query(
        "INSERT INTO subscriptions (member_id, plan_name, start_date, end_date, price, status)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(subscription.member_id)
    .bind(&subscription.plan_name)
    .bind(format_date(subscription.start_date))
    .bind(format_date(subscription.end_date))
    .bind(subscription.price)
    .bind(subscription.status.as_str())
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn get_all_subscriptions(pool: &Pool<Sqlite>) -> Result<Vec<Subscription>, AppError> {
    info!("Getting all subscriptions");
    let rows = sqlx::query_as::<_, DbSubscription>(&format!(
        "SELECT {} FROM subscriptions ORDER BY id DESC",
        SUBSCRIPTION_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Subscription::try_from).collect()
}

#[instrument(skip(pool))]
pub async fn get_subscription(pool: &Pool<Sqlite>, id: i64) -> Result<Subscription, AppError> {
    info!("Fetching subscription by ID");
    let row = sqlx::query_as::<_, DbSubscription>(&format!(
        "SELECT {} FROM subscriptions WHERE id = ?",
        SUBSCRIPTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(subscription) => Subscription::try_from(subscription),
        _ => Err(AppError::NotFound(format!(
            "Subscription with id {} not found",
            id
        ))),
    }
}

#[instrument(skip(pool))]
pub async fn get_subscriptions_for_member(
    pool: &Pool<Sqlite>,
    member_id: i64,
) -> Result<Vec<Subscription>, AppError> {
    info!("Getting subscriptions for member");
    let rows = sqlx::query_as::<_, DbSubscription>(&format!(
        "SELECT {} FROM subscriptions WHERE member_id = ? ORDER BY end_date DESC",
        SUBSCRIPTION_COLUMNS
    ))
    .bind(member_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Subscription::try_from).collect()
}

#[instrument(skip(pool))]
pub async fn delete_subscription(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting subscription");
    let res = sqlx::query("DELETE FROM subscriptions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Subscription with id {} not found",
            id
        )));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn count_active_subscriptions(pool: &Pool<Sqlite>) -> Result<i64, AppError> {
    info!("Counting active subscriptions");
    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM subscriptions WHERE status = 'Active'")
            .fetch_one(pool)
            .await?;

    Ok(count)
}

#[instrument(skip(pool))]
pub async fn get_plan_distribution(pool: &Pool<Sqlite>) -> Result<Vec<PlanCount>, AppError> {
    info!("Getting active plan distribution");
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT plan_name, COUNT(*) FROM subscriptions
         WHERE status = 'Active'
         GROUP BY plan_name
         ORDER BY plan_name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(plan_name, count)| PlanCount { plan_name, count })
        .collect())
}
