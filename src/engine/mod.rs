//! Check-ins, the recent-activity feed and expiry warnings, all measured
//! against the injected clock.

pub mod buckets;

use std::sync::Arc;

use chrono::Days;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::clock::Clock;
use crate::db;
use crate::error::AppError;
use crate::models::{
    ActivityEntry, AttendanceRecord, ExpiringMember, MonthBucket, PlanCount, ScheduleEntry,
};

pub const DEFAULT_RECENT_LIMIT: u32 = 20;
pub const DEFAULT_EXPIRY_WINDOW_DAYS: u32 = 7;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DashboardSummary {
    pub today: chrono::NaiveDate,
    pub total_members: i64,
    pub active_subscriptions: i64,
    pub total_revenue: f64,
    pub today_check_ins: i64,
    pub expiring: Vec<ExpiringMember>,
    pub registrations: Vec<MonthBucket<i64>>,
    pub revenue: Vec<MonthBucket<f64>>,
    pub plan_distribution: Vec<PlanCount>,
    pub schedule: Vec<ScheduleEntry>,
}

#[derive(Clone)]
pub struct AttendanceEngine {
    pool: Pool<Sqlite>,
    clock: Arc<dyn Clock>,
}

impl AttendanceEngine {
    pub fn new(pool: Pool<Sqlite>, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Records a visit stamped with the clock's `now()` and `today()`.
    /// Members may check in any number of times a day.
    #[instrument(skip(self))]
    pub async fn check_in(&self, member_id: i64) -> Result<AttendanceRecord, AppError> {
        db::get_member(&self.pool, member_id).await?;

        let now = self.clock.now();
        let today = self.clock.today();
        let id = db::insert_check_in(&self.pool, member_id, now, today).await?;
        info!(attendance_id = id, "Member checked in");

        db::get_attendance(&self.pool, id).await
    }

    #[instrument(skip(self))]
    pub async fn recent_activity(&self, limit: u32) -> Result<Vec<ActivityEntry>, AppError> {
        db::get_recent_attendance(&self.pool, limit).await
    }

    #[instrument(skip(self))]
    pub async fn today_check_in_count(&self) -> Result<i64, AppError> {
        db::count_check_ins_on(&self.pool, self.clock.today()).await
    }

    /// Active subscriptions ending between today and `within_days` from
    /// now, inclusive, soonest first. Read-only: status is never changed.
    #[instrument(skip(self))]
    pub async fn expiring_subscriptions(
        &self,
        within_days: u32,
    ) -> Result<Vec<ExpiringMember>, AppError> {
        let today = self.clock.today();
        let until = today
            .checked_add_days(Days::new(u64::from(within_days)))
            .ok_or_else(|| AppError::Validation(format!("{} days is out of range", within_days)))?;

        let rows = db::get_expiring_members(&self.pool, today, until).await?;
        info!(count = rows.len(), "Found expiring subscriptions");

        Ok(rows
            .into_iter()
            .map(|(member, end_date)| ExpiringMember {
                member,
                end_date,
                days_left: (end_date - today).num_days(),
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn registrations_last_6_months(&self) -> Result<Vec<MonthBucket<i64>>, AppError> {
        let dates = db::get_member_registration_dates(&self.pool).await?;
        Ok(buckets::last_six_months(
            self.clock.today(),
            dates.into_iter().map(|d| (d, 1)),
        ))
    }

    #[instrument(skip(self))]
    pub async fn revenue_last_6_months(&self) -> Result<Vec<MonthBucket<f64>>, AppError> {
        let payments = db::get_payment_amounts_by_date(&self.pool).await?;
        Ok(buckets::last_six_months(self.clock.today(), payments))
    }

    #[instrument(skip(self))]
    pub async fn dashboard_summary(&self, within_days: u32) -> Result<DashboardSummary, AppError> {
        info!("Building dashboard summary");
        Ok(DashboardSummary {
            today: self.clock.today(),
            total_members: db::count_members(&self.pool).await?,
            active_subscriptions: db::count_active_subscriptions(&self.pool).await?,
            total_revenue: db::get_total_revenue(&self.pool).await?,
            today_check_ins: self.today_check_in_count().await?,
            expiring: self.expiring_subscriptions(within_days).await?,
            registrations: self.registrations_last_6_months().await?,
            revenue: self.revenue_last_6_months().await?,
            plan_distribution: db::get_plan_distribution(&self.pool).await?,
            schedule: db::get_all_schedules(&self.pool).await?,
        })
    }
}
