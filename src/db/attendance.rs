use crate::error::AppError;
use crate::models::{
    ActivityEntry, AttendanceRecord, DbActivityEntry, DbAttendanceRecord, format_date,
    format_timestamp,
};
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

/// Appends a visit. Repeated check-ins on the same day are all kept.
#[instrument(skip(pool))]
pub async fn insert_check_in(
    pool: &Pool<Sqlite>,
    member_id: i64,
    check_in_time: NaiveDateTime,
    date: NaiveDate,
) -> Result<i64, AppError> {
    info!("Recording check-in");
    let res = sqlx::query("INSERT INTO attendance (member_id, check_in_time, date) VALUES (?, ?, ?)")
        .bind(member_id)
        .bind(format_timestamp(check_in_time))
        .bind(format_date(date))
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn get_attendance(pool: &Pool<Sqlite>, id: i64) -> Result<AttendanceRecord, AppError> {
    info!("Fetching attendance record");
    let row = sqlx::query_as::<_, DbAttendanceRecord>(
        "SELECT id, member_id, check_in_time, check_out_time, date FROM attendance WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(record) => AttendanceRecord::try_from(record),
        _ => Err(AppError::NotFound(format!(
            "Attendance record with id {} not found",
            id
        ))),
    }
}

/// Latest check-ins by insertion order, joined to member names.
#[instrument(skip(pool))]
pub async fn get_recent_attendance(
    pool: &Pool<Sqlite>,
    limit: u32,
) -> Result<Vec<ActivityEntry>, AppError> {
    info!("Getting recent attendance");
    let rows = sqlx::query_as::<_, DbActivityEntry>(
        "SELECT a.id, a.member_id, m.first_name, m.last_name, a.check_in_time
         FROM attendance a
         JOIN members m ON a.member_id = m.id
         ORDER BY a.id DESC
         LIMIT ?",
    )
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ActivityEntry::try_from).collect()
}

#[instrument(skip(pool))]
pub async fn count_check_ins_on(pool: &Pool<Sqlite>, date: NaiveDate) -> Result<i64, AppError> {
    info!("Counting check-ins for date");
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM attendance WHERE date = ?")
        .bind(format_date(date))
        .fetch_one(pool)
        .await?;

    Ok(count)
}
