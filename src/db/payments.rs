use crate::error::AppError;
use crate::models::{
    DbPayment, DbPaymentListing, NewPayment, Payment, PaymentListing, format_date, parse_date,
};
use chrono::NaiveDate;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

#[instrument(skip(pool))]
pub async fn create_payment(pool: &Pool<Sqlite>, payment: &NewPayment) -> Result<i64, AppError> {
    info!("Recording payment");
    let res = sqlx::query(
        "INSERT INTO payments (member_id, amount, payment_date, method) VALUES (?, ?, ?, ?)",
    )
    .bind(payment.member_id)
    .bind(payment.amount)
    .bind(format_date(payment.payment_date))
    .bind(payment.method.as_str())
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

/// Newest first.
#[instrument(skip(pool))]
pub async fn get_all_payments(pool: &Pool<Sqlite>) -> Result<Vec<Payment>, AppError> {
    info!("Getting all payments");
    let rows = sqlx::query_as::<_, DbPayment>(
        "SELECT id, member_id, amount, payment_date, method FROM payments ORDER BY id DESC",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Payment::try_from).collect()
}

#[instrument(skip(pool))]
pub async fn get_payment_listing(pool: &Pool<Sqlite>) -> Result<Vec<PaymentListing>, AppError> {
    info!("Getting payment listing");
    let rows = sqlx::query_as::<_, DbPaymentListing>(
        "SELECT p.id, m.first_name, m.last_name, p.amount, p.payment_date, p.method
         FROM payments p
         JOIN members m ON p.member_id = m.id
         ORDER BY p.payment_date DESC, p.id DESC",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(PaymentListing::try_from).collect()
}

/// One payment with its member's name.
#[instrument(skip(pool))]
pub async fn get_payment_listing_entry(
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<PaymentListing, AppError> {
    info!("Fetching payment by ID");
    let row = sqlx::query_as::<_, DbPaymentListing>(
        "SELECT p.id, m.first_name, m.last_name, p.amount, p.payment_date, p.method
         FROM payments p
         JOIN members m ON p.member_id = m.id
         WHERE p.id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(payment) => PaymentListing::try_from(payment),
        _ => Err(AppError::NotFound(format!("Payment with id {} not found", id))),
    }
}

#[instrument(skip(pool))]
pub async fn delete_payment(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting payment");
    let res = sqlx::query("DELETE FROM payments WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Payment with id {} not found", id)));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_total_revenue(pool: &Pool<Sqlite>) -> Result<f64, AppError> {
    info!("Summing revenue");
    let total = sqlx::query_scalar::<_, f64>("SELECT COALESCE(SUM(amount), 0.0) FROM payments")
        .fetch_one(pool)
        .await?;

    Ok(total)
}

#[instrument(skip(pool))]
pub async fn get_payment_amounts_by_date(
    pool: &Pool<Sqlite>,
) -> Result<Vec<(NaiveDate, f64)>, AppError> {
    info!("Getting payment amounts by date");
    let rows = sqlx::query_as::<_, (String, f64)>("SELECT payment_date, amount FROM payments")
        .fetch_all(pool)
        .await?;

    rows.into_iter()
        .map(|(date, amount)| Ok((parse_date(&date)?, amount)))
        .collect()
}
