use crate::error::AppError;
use crate::models::{Coach, DbCoach, NewCoach};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

#[instrument(skip(pool))]
pub async fn create_coach(pool: &Pool<Sqlite>, coach: &NewCoach) -> Result<i64, AppError> {
    info!("Creating coach");
    let res = sqlx::query("INSERT INTO coaches (name, specialization, phone) VALUES (?, ?, ?)")
        .bind(&coach.name)
        .bind(&coach.specialization)
        .bind(&coach.phone)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn get_all_coaches(pool: &Pool<Sqlite>) -> Result<Vec<Coach>, AppError> {
    info!("Getting all coaches");
    let rows = sqlx::query_as::<_, DbCoach>(
        "SELECT id, name, specialization, phone FROM coaches ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Coach::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_coach(pool: &Pool<Sqlite>, id: i64) -> Result<Coach, AppError> {
    info!("Fetching coach by ID");
    let row = sqlx::query_as::<_, DbCoach>(
        "SELECT id, name, specialization, phone FROM coaches WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(coach) => Ok(Coach::from(coach)),
        _ => Err(AppError::NotFound(format!("Coach with id {} not found", id))),
    }
}

/// Edits the coach in place; their timetable keeps pointing at the same id.
#[instrument(skip(pool))]
pub async fn update_coach(pool: &Pool<Sqlite>, id: i64, coach: &NewCoach) -> Result<(), AppError> {
    info!("Updating coach");
    let res = sqlx::query("UPDATE coaches SET name = ?, specialization = ?, phone = ? WHERE id = ?")
        .bind(&coach.name)
        .bind(&coach.specialization)
        .bind(&coach.phone)
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Coach with id {} not found", id)));
    }

    Ok(())
}

/// Deletes the coach and their timetable in one transaction. The schema
/// also cascades, but this does not depend on foreign keys being enabled.
#[instrument(skip(pool))]
pub async fn delete_coach(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting coach");
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM schedules WHERE coach_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let res = sqlx::query("DELETE FROM coaches WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if res.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(AppError::NotFound(format!("Coach with id {} not found", id)));
    }

    tx.commit().await?;
    Ok(())
}
