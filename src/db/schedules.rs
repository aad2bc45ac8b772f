use crate::error::AppError;
use crate::models::{DbScheduleEntry, NewScheduleEntry, ScheduleEntry};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

#[instrument(skip(pool))]
pub async fn create_schedule_entry(
    pool: &Pool<Sqlite>,
    entry: &NewScheduleEntry,
) -> Result<i64, AppError> {
    info!("Creating schedule entry");
    let res = sqlx::query(
        "INSERT INTO schedules (coach_id, day, start_time, end_time, title)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(entry.coach_id)
    .bind(entry.day.as_str())
    .bind(&entry.start_time)
    .bind(&entry.end_time)
    .bind(&entry.title)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn get_schedules_by_coach(
    pool: &Pool<Sqlite>,
    coach_id: i64,
) -> Result<Vec<ScheduleEntry>, AppError> {
    info!("Getting schedules for coach");
    let rows = sqlx::query_as::<_, DbScheduleEntry>(
        "SELECT s.id, s.coach_id, c.name AS coach_name, s.day, s.start_time, s.end_time, s.title
         FROM schedules s
         LEFT JOIN coaches c ON s.coach_id = c.id
         WHERE s.coach_id = ?",
    )
    .bind(coach_id)
    .fetch_all(pool)
    .await?;

    into_weekly_order(rows)
}

#[instrument(skip(pool))]
pub async fn get_schedule_entry(pool: &Pool<Sqlite>, id: i64) -> Result<ScheduleEntry, AppError> {
    info!("Fetching schedule entry by ID");
    let row = sqlx::query_as::<_, DbScheduleEntry>(
        "SELECT s.id, s.coach_id, c.name AS coach_name, s.day, s.start_time, s.end_time, s.title
         FROM schedules s
         LEFT JOIN coaches c ON s.coach_id = c.id
         WHERE s.id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(entry) => ScheduleEntry::try_from(entry),
        _ => Err(AppError::NotFound(format!(
            "Schedule entry with id {} not found",
            id
        ))),
    }
}

/// The whole timetable, Monday first, each day by start time.
#[instrument(skip(pool))]
pub async fn get_all_schedules(pool: &Pool<Sqlite>) -> Result<Vec<ScheduleEntry>, AppError> {
    info!("Getting all schedules");
    let rows = sqlx::query_as::<_, DbScheduleEntry>(
        "SELECT s.id, s.coach_id, c.name AS coach_name, s.day, s.start_time, s.end_time, s.title
         FROM schedules s
         LEFT JOIN coaches c ON s.coach_id = c.id",
    )
    .fetch_all(pool)
    .await?;

    into_weekly_order(rows)
}

fn into_weekly_order(rows: Vec<DbScheduleEntry>) -> Result<Vec<ScheduleEntry>, AppError> {
    let mut entries = rows
        .into_iter()
        .map(ScheduleEntry::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| (e.weekly_order(), e.id));
    Ok(entries)
}

#[instrument(skip(pool))]
pub async fn delete_schedule_entry(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting schedule entry");
    let res = sqlx::query("DELETE FROM schedules WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Schedule entry with id {} not found",
            id
        )));
    }

    Ok(())
}
