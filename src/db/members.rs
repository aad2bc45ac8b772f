use crate::error::AppError;
use crate::models::{
    DbExpiringMember, DbMember, Member, MemberUpdate, NewMember, format_date, parse_date,
};
use chrono::NaiveDate;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

const MEMBER_COLUMNS: &str =
    "id, first_name, last_name, phone, email, gender, photo_path, registration_date, face_id";

#[instrument(skip(pool))]
pub async fn create_member(pool: &Pool<Sqlite>, member: &NewMember) -> Result<i64, AppError> {
    info!("Creating member");
    let res = sqlx::query(
        "INSERT INTO members
         (first_name, last_name, phone, email, gender, photo_path, registration_date, face_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&member.first_name)
    .bind(&member.last_name)
    .bind(&member.phone)
    .bind(&member.email)
    .bind(&member.gender)
    .bind(&member.photo_path)
    .bind(format_date(member.registration_date))
    .bind(&member.face_id)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn get_all_members(pool: &Pool<Sqlite>) -> Result<Vec<Member>, AppError> {
    info!("Getting all members");
    let rows = sqlx::query_as::<_, DbMember>(&format!(
        "SELECT {} FROM members ORDER BY id",
        MEMBER_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Member::try_from).collect()
}

#[instrument(skip(pool))]
pub async fn get_member(pool: &Pool<Sqlite>, id: i64) -> Result<Member, AppError> {
    info!("Fetching member by ID");
    let row = sqlx::query_as::<_, DbMember>(&format!(
        "SELECT {} FROM members WHERE id = ?",
        MEMBER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(member) => Member::try_from(member),
        _ => Err(AppError::NotFound(format!("Member with id {} not found", id))),
    }
}

#[instrument(skip(pool))]
pub async fn update_member(
    pool: &Pool<Sqlite>,
    id: i64,
    update: &MemberUpdate,
) -> Result<(), AppError> {
    info!("Updating member");
    let res = sqlx::query(
        "UPDATE members
         SET first_name = ?, last_name = ?, phone = ?, email = ?, gender = ?, face_id = ?
         WHERE id = ?",
    )
    .bind(&update.first_name)
    .bind(&update.last_name)
    .bind(&update.phone)
    .bind(&update.email)
    .bind(&update.gender)
    .bind(&update.face_id)
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Member with id {} not found", id)));
    }

    Ok(())
}

#[instrument(skip(pool, token))]
pub async fn set_member_face_id(pool: &Pool<Sqlite>, id: i64, token: &str) -> Result<(), AppError> {
    info!("Storing face token for member");
    let res = sqlx::query("UPDATE members SET face_id = ? WHERE id = ?")
        .bind(token)
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Member with id {} not found", id)));
    }

    Ok(())
}

/// Removes the member together with their subscriptions, payments and
/// attendance in one transaction.
#[instrument(skip(pool))]
pub async fn delete_member(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting member");
    let mut tx = pool.begin().await?;

    for table in ["attendance", "payments", "subscriptions"] {
        sqlx::query(&format!("DELETE FROM {} WHERE member_id = ?", table))
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    let res = sqlx::query("DELETE FROM members WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if res.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(AppError::NotFound(format!("Member with id {} not found", id)));
    }

    tx.commit().await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn count_members(pool: &Pool<Sqlite>) -> Result<i64, AppError> {
    info!("Counting members");
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM members")
        .fetch_one(pool)
        .await?;

    Ok(count)
}

#[instrument(skip(pool))]
pub async fn get_member_registration_dates(pool: &Pool<Sqlite>) -> Result<Vec<NaiveDate>, AppError> {
    info!("Getting member registration dates");
    let rows = sqlx::query_scalar::<_, String>("SELECT registration_date FROM members")
        .fetch_all(pool)
        .await?;

    rows.iter().map(|d| parse_date(d)).collect()
}

/// Case-insensitive match on `"first last"`. The first member in id order
/// wins when two members share a name.
#[instrument(skip(pool))]
pub async fn find_member_by_full_name(
    pool: &Pool<Sqlite>,
    full_name: &str,
) -> Result<Option<Member>, AppError> {
    info!("Looking up member by full name");
    let wanted = full_name.trim().to_lowercase();

    Ok(get_all_members(pool)
        .await?
        .into_iter()
        .find(|m| m.full_name().to_lowercase() == wanted))
}

#[instrument(skip(pool, token))]
pub async fn find_member_by_face_id(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<Option<Member>, AppError> {
    info!("Looking up member by face token");
    let row = sqlx::query_as::<_, DbMember>(&format!(
        "SELECT {} FROM members WHERE face_id = ? ORDER BY id LIMIT 1",
        MEMBER_COLUMNS
    ))
    .bind(token)
    .fetch_optional(pool)
    .await?;

    row.map(Member::try_from).transpose()
}

/// Members holding an `Active` subscription that ends within
/// `[from, until]`, soonest first. One row per matching subscription.
#[instrument(skip(pool))]
pub async fn get_expiring_members(
    pool: &Pool<Sqlite>,
    from: NaiveDate,
    until: NaiveDate,
) -> Result<Vec<(Member, NaiveDate)>, AppError> {
    info!("Getting members with expiring subscriptions");
    let rows = sqlx::query_as::<_, DbExpiringMember>(
        "SELECT m.id, m.first_name, m.last_name, m.phone, m.email, m.gender, m.photo_path,
                m.registration_date, m.face_id, s.end_date
         FROM members m
         JOIN subscriptions s ON m.id = s.member_id
         WHERE s.status = 'Active' AND s.end_date BETWEEN ? AND ?
         ORDER BY s.end_date ASC, s.id ASC",
    )
    .bind(format_date(from))
    .bind(format_date(until))
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let end_date = parse_date(row.end_date.as_deref().unwrap_or_default())?;
            Ok((Member::try_from(row.member)?, end_date))
        })
        .collect()
}
