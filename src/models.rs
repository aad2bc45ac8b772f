use std::fmt;
use std::str::FromStr;

use chrono::{Months, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDate, AppError> {
    Ok(NaiveDate::parse_from_str(value, DATE_FORMAT)?)
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, AppError> {
    Ok(value.parse::<NaiveDateTime>()?)
}

fn required<T>(value: Option<T>, table: &str, column: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::Internal(format!("{}.{} is NULL", table, column)))
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Member {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub gender: Option<String>,
    pub photo_path: Option<String>,
    pub registration_date: NaiveDate,
    pub face_id: Option<String>,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMember {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub gender: Option<String>,
    pub photo_path: Option<String>,
    pub registration_date: NaiveDate,
    pub face_id: Option<String>,
}

/// Editable member fields. The registration date is fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberUpdate {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub gender: Option<String>,
    pub face_id: Option<String>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbMember {
    pub id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub photo_path: Option<String>,
    pub registration_date: Option<String>,
    pub face_id: Option<String>,
}

impl TryFrom<DbMember> for Member {
    type Error = AppError;

    fn try_from(db: DbMember) -> Result<Self, Self::Error> {
        let registration_date = required(db.registration_date, "members", "registration_date")?;
        Ok(Self {
            id: db.id.unwrap_or_default(),
            first_name: db.first_name.unwrap_or_default(),
            last_name: db.last_name.unwrap_or_default(),
            phone: db.phone.unwrap_or_default(),
            email: db.email.unwrap_or_default(),
            gender: db.gender,
            photo_path: db.photo_path,
            registration_date: parse_date(&registration_date)?,
            face_id: db.face_id,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Coach {
    pub id: i64,
    pub name: String,
    pub specialization: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCoach {
    pub name: String,
    pub specialization: Option<String>,
    pub phone: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCoach {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub specialization: Option<String>,
    pub phone: Option<String>,
}

impl From<DbCoach> for Coach {
    fn from(coach: DbCoach) -> Self {
        Self {
            id: coach.id.unwrap_or_default(),
            name: coach.name.unwrap_or_default(),
            specialization: coach.specialization,
            phone: coach.phone,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
            DayOfWeek::Sunday => "Sunday",
        }
    }
}

impl FromStr for DayOfWeek {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DayOfWeek::ALL
            .into_iter()
            .find(|day| day.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::Validation(format!("Unknown day of week: {}", s)))
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub id: i64,
    pub coach_id: i64,
    pub coach_name: Option<String>,
    pub day: DayOfWeek,
    pub start_time: String,
    pub end_time: Option<String>,
    pub title: String,
}

impl ScheduleEntry {
    /// Sort key for the weekly view: weekday, then clock time.
    pub fn weekly_order(&self) -> (DayOfWeek, Option<NaiveTime>) {
        (
            self.day,
            NaiveTime::parse_from_str(&self.start_time, "%H:%M").ok(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewScheduleEntry {
    pub coach_id: i64,
    pub day: DayOfWeek,
    pub start_time: String,
    pub end_time: Option<String>,
    pub title: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbScheduleEntry {
    pub id: Option<i64>,
    pub coach_id: Option<i64>,
    pub coach_name: Option<String>,
    pub day: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub title: Option<String>,
}

impl TryFrom<DbScheduleEntry> for ScheduleEntry {
    type Error = AppError;

    fn try_from(db: DbScheduleEntry) -> Result<Self, Self::Error> {
        let day = required(db.day, "schedules", "day")?
            .parse::<DayOfWeek>()
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(Self {
            id: db.id.unwrap_or_default(),
            coach_id: db.coach_id.unwrap_or_default(),
            coach_name: db.coach_name,
            day,
            start_time: db.start_time.unwrap_or_default(),
            end_time: db.end_time.filter(|t| !t.is_empty()),
            title: db.title.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubscriptionStatus {
    Active,
    Other(String),
}

impl SubscriptionStatus {
    pub const ACTIVE: &'static str = "Active";

    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionStatus::Active => Self::ACTIVE,
            SubscriptionStatus::Other(s) => s,
        }
    }
}

impl From<String> for SubscriptionStatus {
    fn from(value: String) -> Self {
        if value == Self::ACTIVE {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Other(value)
        }
    }
}

impl From<SubscriptionStatus> for String {
    fn from(value: SubscriptionStatus) -> Self {
        value.as_str().to_string()
    }
}

/// The three packaged plans offered at the front desk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanTier {
    Basic,
    Standard,
    Premium,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanQuote {
    pub plan_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price: f64,
}

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [PlanTier::Basic, PlanTier::Standard, PlanTier::Premium];
    pub const CUSTOM_PLAN_NAME: &'static str = "Custom Plan";

    pub fn plan_name(&self) -> &'static str {
        match self {
            PlanTier::Basic => "1 Month - Basic",
            PlanTier::Standard => "3 Months - Standard",
            PlanTier::Premium => "1 Year - Premium",
        }
    }

    pub fn price(&self) -> f64 {
        match self {
            PlanTier::Basic => 300.0,
            PlanTier::Standard => 800.0,
            PlanTier::Premium => 2500.0,
        }
    }

    pub fn months(&self) -> u32 {
        match self {
            PlanTier::Basic => 1,
            PlanTier::Standard => 3,
            PlanTier::Premium => 12,
        }
    }

    /// End date and price for a plan starting on `start`. Month ends clamp,
    /// so Jan 31 + 1 month is the last day of February.
    pub fn quote(&self, start: NaiveDate) -> Result<PlanQuote, AppError> {
        let end_date = start
            .checked_add_months(Months::new(self.months()))
            .ok_or_else(|| AppError::Validation(format!("Start date {} is out of range", start)))?;

        Ok(PlanQuote {
            plan_name: self.plan_name().to_string(),
            start_date: start,
            end_date,
            price: self.price(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Subscription {
    pub id: i64,
    pub member_id: i64,
    pub plan_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price: f64,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    pub member_id: i64,
    pub plan_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price: f64,
    pub status: SubscriptionStatus,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbSubscription {
    pub id: Option<i64>,
    pub member_id: Option<i64>,
    pub plan_name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub price: Option<f64>,
    pub status: Option<String>,
}

impl TryFrom<DbSubscription> for Subscription {
    type Error = AppError;

    fn try_from(db: DbSubscription) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id.unwrap_or_default(),
            member_id: db.member_id.unwrap_or_default(),
            plan_name: db.plan_name.unwrap_or_default(),
            start_date: parse_date(&required(db.start_date, "subscriptions", "start_date")?)?,
            end_date: parse_date(&required(db.end_date, "subscriptions", "end_date")?)?,
            price: db.price.unwrap_or_default(),
            status: SubscriptionStatus::from(db.status.unwrap_or_default()),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Cash,
    #[serde(rename = "TPE")]
    Tpe,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Tpe => "TPE",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Cash" => Ok(PaymentMethod::Cash),
            "TPE" => Ok(PaymentMethod::Tpe),
            other => Err(AppError::Validation(format!(
                "Unknown payment method: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Payment {
    pub id: i64,
    pub member_id: i64,
    pub amount: f64,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub member_id: i64,
    pub amount: f64,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
}

/// A payment row joined with its member's display name.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentListing {
    pub id: i64,
    pub member_name: String,
    pub amount: f64,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbPayment {
    pub id: Option<i64>,
    pub member_id: Option<i64>,
    pub amount: Option<f64>,
    pub payment_date: Option<String>,
    pub method: Option<String>,
}

impl TryFrom<DbPayment> for Payment {
    type Error = AppError;

    fn try_from(db: DbPayment) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id.unwrap_or_default(),
            member_id: db.member_id.unwrap_or_default(),
            amount: db.amount.unwrap_or_default(),
            payment_date: parse_date(&required(db.payment_date, "payments", "payment_date")?)?,
            method: required(db.method, "payments", "method")?
                .parse()
                .map_err(|e: AppError| AppError::Internal(e.to_string()))?,
        })
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbPaymentListing {
    pub id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub amount: Option<f64>,
    pub payment_date: Option<String>,
    pub method: Option<String>,
}

impl TryFrom<DbPaymentListing> for PaymentListing {
    type Error = AppError;

    fn try_from(db: DbPaymentListing) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id.unwrap_or_default(),
            member_name: format!(
                "{} {}",
                db.first_name.unwrap_or_default(),
                db.last_name.unwrap_or_default()
            ),
            amount: db.amount.unwrap_or_default(),
            payment_date: parse_date(&required(db.payment_date, "payments", "payment_date")?)?,
            method: required(db.method, "payments", "method")?
                .parse()
                .map_err(|e: AppError| AppError::Internal(e.to_string()))?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub id: i64,
    pub member_id: i64,
    pub check_in_time: NaiveDateTime,
    pub check_out_time: Option<NaiveDateTime>,
    pub date: NaiveDate,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAttendanceRecord {
    pub id: Option<i64>,
    pub member_id: Option<i64>,
    pub check_in_time: Option<String>,
    pub check_out_time: Option<String>,
    pub date: Option<String>,
}

impl TryFrom<DbAttendanceRecord> for AttendanceRecord {
    type Error = AppError;

    fn try_from(db: DbAttendanceRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id.unwrap_or_default(),
            member_id: db.member_id.unwrap_or_default(),
            check_in_time: parse_timestamp(&required(
                db.check_in_time,
                "attendance",
                "check_in_time",
            )?)?,
            check_out_time: db
                .check_out_time
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            date: parse_date(&required(db.date, "attendance", "date")?)?,
        })
    }
}

/// One line of the "recent activity" feed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ActivityEntry {
    pub attendance_id: i64,
    pub member_id: i64,
    pub member_name: String,
    pub check_in_time: NaiveDateTime,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbActivityEntry {
    pub id: Option<i64>,
    pub member_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub check_in_time: Option<String>,
}

impl TryFrom<DbActivityEntry> for ActivityEntry {
    type Error = AppError;

    fn try_from(db: DbActivityEntry) -> Result<Self, Self::Error> {
        Ok(Self {
            attendance_id: db.id.unwrap_or_default(),
            member_id: db.member_id.unwrap_or_default(),
            member_name: format!(
                "{} {}",
                db.first_name.unwrap_or_default(),
                db.last_name.unwrap_or_default()
            ),
            check_in_time: parse_timestamp(&required(
                db.check_in_time,
                "attendance",
                "check_in_time",
            )?)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExpiringMember {
    pub member: Member,
    pub end_date: NaiveDate,
    pub days_left: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbExpiringMember {
    #[sqlx(flatten)]
    pub member: DbMember,
    pub end_date: Option<String>,
}

/// A calendar-month slot of a dashboard histogram.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MonthBucket<T> {
    pub year: i32,
    pub month: u32,
    pub label: String,
    pub value: T,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlanCount {
    pub plan_name: String,
    pub count: i64,
}
