use std::sync::Arc;

use chrono::NaiveDate;
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use tracing::info;
use validator::Validate;

use crate::auth::User;
use crate::clock::{Clock, MockableClock};
use crate::db;
use crate::engine::{AttendanceEngine, DashboardSummary};
use crate::env::Settings;
use crate::error::AppError;
use crate::face::{Camera, FaceRecognizer, FaceScanner, ScanReport, enroll_member_face};
use crate::models::{
    ActivityEntry, AttendanceRecord, Coach, DayOfWeek, ExpiringMember, Member, MemberUpdate,
    NewCoach, NewMember, NewPayment, NewScheduleEntry, NewSubscription, PaymentListing,
    PaymentMethod, PlanQuote, PlanTier, ScheduleEntry, Subscription, SubscriptionStatus,
};
use crate::validation::{
    AppErrorExt, JsonValidateExt, ValidationResponse, blank_as_none, field_error, validate_day,
    validate_email, validate_not_blank, validate_phone, validate_time,
};

type ApiResult<T> = Result<Json<T>, Custom<Json<ValidationResponse>>>;
type ApiStatus = Result<Status, Custom<Json<ValidationResponse>>>;

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(custom(function = "validate_not_blank"))]
    username: String,
    #[validate(custom(function = "validate_not_blank"))]
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<User>,
    pub error: Option<String>,
}

/// Checks credentials only. No session is issued.
#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<LoginResponse> {
    let validated = login.validate_custom()?;

    match db::authenticate_user(db, &validated.username, &validated.password)
        .await
        .validate_custom()?
    {
        Some(user) => Ok(Json(LoginResponse {
            success: true,
            user: Some(user),
            error: None,
        })),
        None => Ok(Json(LoginResponse {
            success: false,
            user: None,
            error: Some("Invalid username or password".to_string()),
        })),
    }
}

#[derive(Deserialize, Validate)]
pub struct MemberRequest {
    #[validate(custom(function = "validate_not_blank"))]
    first_name: String,
    #[validate(custom(function = "validate_not_blank"))]
    last_name: String,
    #[validate(custom(function = "validate_phone"))]
    phone: String,
    #[validate(custom(function = "validate_email"))]
    email: String,
    gender: Option<String>,
    photo_path: Option<String>,
    /// Defaults to today. Ignored on update.
    registration_date: Option<NaiveDate>,
    face_id: Option<String>,
}

#[get("/members")]
pub async fn api_get_members(db: &State<Pool<Sqlite>>) -> ApiResult<Vec<Member>> {
    Ok(Json(db::get_all_members(db).await.validate_custom()?))
}

#[get("/members/<id>")]
pub async fn api_get_member(id: i64, db: &State<Pool<Sqlite>>) -> ApiResult<Member> {
    Ok(Json(db::get_member(db, id).await.validate_custom()?))
}

#[post("/members", data = "<request>")]
pub async fn api_create_member(
    request: Json<MemberRequest>,
    engine: &State<AttendanceEngine>,
) -> ApiResult<Member> {
    let validated = request.validate_custom()?;

    let member = NewMember {
        first_name: validated.first_name.trim().to_string(),
        last_name: validated.last_name.trim().to_string(),
        phone: validated.phone,
        email: validated.email,
        gender: blank_to_none(validated.gender),
        photo_path: blank_to_none(validated.photo_path),
        registration_date: validated
            .registration_date
            .unwrap_or_else(|| engine.clock().today()),
        face_id: blank_to_none(validated.face_id),
    };

    let id = db::create_member(engine.pool(), &member)
        .await
        .validate_custom()?;
    info!(member_id = id, "Member registered");

    Ok(Json(db::get_member(engine.pool(), id).await.validate_custom()?))
}

#[put("/members/<id>", data = "<request>")]
pub async fn api_update_member(
    id: i64,
    request: Json<MemberRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Member> {
    let validated = request.validate_custom()?;
    let existing = db::get_member(db, id).await.validate_custom()?;

    let update = MemberUpdate {
        first_name: validated.first_name.trim().to_string(),
        last_name: validated.last_name.trim().to_string(),
        phone: validated.phone,
        email: validated.email,
        gender: blank_to_none(validated.gender),
        face_id: blank_to_none(validated.face_id).or(existing.face_id),
    };

    db::update_member(db, id, &update).await.validate_custom()?;

    Ok(Json(db::get_member(db, id).await.validate_custom()?))
}

#[delete("/members/<id>")]
pub async fn api_delete_member(id: i64, db: &State<Pool<Sqlite>>) -> ApiStatus {
    db::delete_member(db, id).await.validate_custom()?;
    Ok(Status::NoContent)
}

#[get("/members/<id>/subscriptions")]
pub async fn api_get_member_subscriptions(
    id: i64,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Subscription>> {
    db::get_member(db, id).await.validate_custom()?;
    Ok(Json(
        db::get_subscriptions_for_member(db, id)
            .await
            .validate_custom()?,
    ))
}

#[derive(Serialize, Deserialize)]
pub struct FaceEnrollmentResponse {
    pub member_id: i64,
    pub face_id: String,
}

#[post("/members/<id>/face")]
pub async fn api_enroll_face(
    id: i64,
    db: &State<Pool<Sqlite>>,
    recognizer: &State<Arc<dyn FaceRecognizer>>,
    camera: &State<Camera>,
) -> ApiResult<FaceEnrollmentResponse> {
    let face_id = enroll_member_face(db, recognizer.inner().as_ref(), camera, id)
        .await
        .validate_custom()?;

    Ok(Json(FaceEnrollmentResponse {
        member_id: id,
        face_id,
    }))
}

#[derive(Deserialize, Validate)]
pub struct CoachRequest {
    #[validate(custom(function = "validate_not_blank"))]
    name: String,
    specialization: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(custom(function = "validate_phone"))]
    phone: Option<String>,
}

impl CoachRequest {
    fn into_new_coach(self) -> NewCoach {
        NewCoach {
            name: self.name.trim().to_string(),
            specialization: blank_to_none(self.specialization),
            phone: self.phone,
        }
    }
}

#[get("/coaches")]
pub async fn api_get_coaches(db: &State<Pool<Sqlite>>) -> ApiResult<Vec<Coach>> {
    Ok(Json(db::get_all_coaches(db).await.validate_custom()?))
}

#[post("/coaches", data = "<request>")]
pub async fn api_create_coach(
    request: Json<CoachRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Coach> {
    let coach = request.validate_custom()?.into_new_coach();

    let id = db::create_coach(db, &coach).await.validate_custom()?;
    Ok(Json(db::get_coach(db, id).await.validate_custom()?))
}

#[put("/coaches/<id>", data = "<request>")]
pub async fn api_update_coach(
    id: i64,
    request: Json<CoachRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Coach> {
    let coach = request.validate_custom()?.into_new_coach();

    db::update_coach(db, id, &coach).await.validate_custom()?;
    Ok(Json(db::get_coach(db, id).await.validate_custom()?))
}

#[delete("/coaches/<id>")]
pub async fn api_delete_coach(id: i64, db: &State<Pool<Sqlite>>) -> ApiStatus {
    db::delete_coach(db, id).await.validate_custom()?;
    Ok(Status::NoContent)
}

#[get("/coaches/<id>/schedules")]
pub async fn api_get_coach_schedules(
    id: i64,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<ScheduleEntry>> {
    db::get_coach(db, id).await.validate_custom()?;
    Ok(Json(
        db::get_schedules_by_coach(db, id).await.validate_custom()?,
    ))
}

#[derive(Deserialize, Validate)]
pub struct ScheduleRequest {
    coach_id: i64,
    #[validate(custom(function = "validate_day"))]
    day: String,
    #[validate(custom(function = "validate_time"))]
    start_time: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(custom(function = "validate_time"))]
    end_time: Option<String>,
    #[validate(custom(function = "validate_not_blank"))]
    title: String,
}

#[get("/schedules")]
pub async fn api_get_schedules(db: &State<Pool<Sqlite>>) -> ApiResult<Vec<ScheduleEntry>> {
    Ok(Json(db::get_all_schedules(db).await.validate_custom()?))
}

#[post("/schedules", data = "<request>")]
pub async fn api_create_schedule(
    request: Json<ScheduleRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<ScheduleEntry> {
    let validated = request.validate_custom()?;
    db::get_coach(db, validated.coach_id)
        .await
        .validate_custom()?;

    let entry = NewScheduleEntry {
        coach_id: validated.coach_id,
        day: validated.day.parse::<DayOfWeek>().validate_custom()?,
        start_time: validated.start_time,
        end_time: validated.end_time,
        title: validated.title.trim().to_string(),
    };

    let id = db::create_schedule_entry(db, &entry)
        .await
        .validate_custom()?;

    Ok(Json(db::get_schedule_entry(db, id).await.validate_custom()?))
}

#[delete("/schedules/<id>")]
pub async fn api_delete_schedule(id: i64, db: &State<Pool<Sqlite>>) -> ApiStatus {
    db::delete_schedule_entry(db, id).await.validate_custom()?;
    Ok(Status::NoContent)
}

#[derive(Serialize, Deserialize)]
pub struct PlanOffer {
    pub tier: PlanTier,
    pub months: u32,
    #[serde(flatten)]
    pub quote: PlanQuote,
}

/// The packaged plans, quoted from today.
#[get("/plans")]
pub async fn api_get_plans(engine: &State<AttendanceEngine>) -> ApiResult<Vec<PlanOffer>> {
    let today = engine.clock().today();

    let offers = PlanTier::ALL
        .into_iter()
        .map(|tier| {
            Ok::<_, AppError>(PlanOffer {
                tier,
                months: tier.months(),
                quote: tier.quote(today)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .validate_custom()?;

    Ok(Json(offers))
}

#[derive(Deserialize, Validate)]
pub struct SubscriptionRequest {
    member_id: i64,
    /// `None` means a custom plan.
    plan: Option<PlanTier>,
    plan_name: Option<String>,
    /// Defaults to today.
    start_date: Option<NaiveDate>,
    /// Required for custom plans, computed for packaged ones.
    end_date: Option<NaiveDate>,
    /// Required for custom plans; overrides the packaged price when given.
    #[validate(range(min = 0.0, message = "Price cannot be negative."))]
    price: Option<f64>,
}

#[get("/subscriptions")]
pub async fn api_get_subscriptions(db: &State<Pool<Sqlite>>) -> ApiResult<Vec<Subscription>> {
    Ok(Json(db::get_all_subscriptions(db).await.validate_custom()?))
}

#[post("/subscriptions", data = "<request>")]
pub async fn api_create_subscription(
    request: Json<SubscriptionRequest>,
    engine: &State<AttendanceEngine>,
) -> ApiResult<Subscription> {
    let validated = request.validate_custom()?;
    let pool = engine.pool();
    db::get_member(pool, validated.member_id)
        .await
        .validate_custom()?;

    let start_date = validated
        .start_date
        .unwrap_or_else(|| engine.clock().today());

    let (plan_name, end_date, price) = match validated.plan {
        Some(tier) => {
            let quote = tier.quote(start_date).validate_custom()?;
            (
                quote.plan_name,
                quote.end_date,
                validated.price.unwrap_or(quote.price),
            )
        }
        None => {
            let end_date = validated.end_date.ok_or_else(|| {
                field_error(
                    Status::UnprocessableEntity,
                    "end_date",
                    "End date is required for a custom plan.",
                )
            })?;
            let price = validated.price.ok_or_else(|| {
                field_error(
                    Status::UnprocessableEntity,
                    "price",
                    "Price is required for a custom plan.",
                )
            })?;
            let plan_name = blank_to_none(validated.plan_name)
                .map(|n| n.trim().to_string())
                .unwrap_or_else(|| PlanTier::CUSTOM_PLAN_NAME.to_string());
            (plan_name, end_date, price)
        }
    };

    if end_date < start_date {
        return Err(field_error(
            Status::UnprocessableEntity,
            "end_date",
            "End date cannot be before the start date.",
        ));
    }

    let subscription = NewSubscription {
        member_id: validated.member_id,
        plan_name,
        start_date,
        end_date,
        price,
        status: SubscriptionStatus::Active,
    };

    let id = db::create_subscription(pool, &subscription)
        .await
        .validate_custom()?;

    Ok(Json(db::get_subscription(pool, id).await.validate_custom()?))
}

#[delete("/subscriptions/<id>")]
pub async fn api_delete_subscription(id: i64, db: &State<Pool<Sqlite>>) -> ApiStatus {
    db::delete_subscription(db, id).await.validate_custom()?;
    Ok(Status::NoContent)
}

#[get("/subscriptions/expiring?<within_days>")]
pub async fn api_get_expiring(
    within_days: Option<u32>,
    engine: &State<AttendanceEngine>,
    settings: &State<Settings>,
) -> ApiResult<Vec<ExpiringMember>> {
    let within_days = within_days.unwrap_or(settings.expiry_warning_days);
    Ok(Json(
        engine
            .expiring_subscriptions(within_days)
            .await
            .validate_custom()?,
    ))
}

#[derive(Deserialize, Validate)]
pub struct PaymentRequest {
    member_id: i64,
    #[validate(range(min = 0.0, message = "Amount cannot be negative."))]
    amount: f64,
    /// Defaults to today.
    payment_date: Option<NaiveDate>,
    method: PaymentMethod,
}

#[get("/payments")]
pub async fn api_get_payments(db: &State<Pool<Sqlite>>) -> ApiResult<Vec<PaymentListing>> {
    Ok(Json(db::get_payment_listing(db).await.validate_custom()?))
}

#[post("/payments", data = "<request>")]
pub async fn api_create_payment(
    request: Json<PaymentRequest>,
    engine: &State<AttendanceEngine>,
) -> ApiResult<PaymentListing> {
    let validated = request.validate_custom()?;
    let pool = engine.pool();
    db::get_member(pool, validated.member_id)
        .await
        .validate_custom()?;

    let payment = NewPayment {
        member_id: validated.member_id,
        amount: validated.amount,
        payment_date: validated
            .payment_date
            .unwrap_or_else(|| engine.clock().today()),
        method: validated.method,
    };

    let id = db::create_payment(pool, &payment).await.validate_custom()?;

    Ok(Json(
        db::get_payment_listing_entry(pool, id)
            .await
            .validate_custom()?,
    ))
}

#[delete("/payments/<id>")]
pub async fn api_delete_payment(id: i64, db: &State<Pool<Sqlite>>) -> ApiStatus {
    db::delete_payment(db, id).await.validate_custom()?;
    Ok(Status::NoContent)
}

#[derive(Deserialize)]
pub struct CheckInRequest {
    member_id: i64,
}

#[post("/attendance/check-in", data = "<request>")]
pub async fn api_check_in(
    request: Json<CheckInRequest>,
    engine: &State<AttendanceEngine>,
) -> ApiResult<AttendanceRecord> {
    Ok(Json(
        engine
            .check_in(request.member_id)
            .await
            .validate_custom()?,
    ))
}

#[get("/attendance/recent?<limit>")]
pub async fn api_recent_activity(
    limit: Option<u32>,
    engine: &State<AttendanceEngine>,
    settings: &State<Settings>,
) -> ApiResult<Vec<ActivityEntry>> {
    let limit = limit.unwrap_or(settings.recent_activity_limit);
    Ok(Json(engine.recent_activity(limit).await.validate_custom()?))
}

#[derive(Serialize, Deserialize)]
pub struct TodayAttendance {
    pub date: NaiveDate,
    pub check_ins: i64,
}

#[get("/attendance/today")]
pub async fn api_today_attendance(engine: &State<AttendanceEngine>) -> ApiResult<TodayAttendance> {
    Ok(Json(TodayAttendance {
        date: engine.clock().today(),
        check_ins: engine.today_check_in_count().await.validate_custom()?,
    }))
}

#[get("/dashboard")]
pub async fn api_dashboard(
    engine: &State<AttendanceEngine>,
    settings: &State<Settings>,
) -> ApiResult<DashboardSummary> {
    Ok(Json(
        engine
            .dashboard_summary(settings.expiry_warning_days)
            .await
            .validate_custom()?,
    ))
}

#[derive(Serialize, Deserialize)]
pub struct ClockState {
    pub today: NaiveDate,
    pub mock_date: Option<NaiveDate>,
}

impl ClockState {
    fn of(clock: &MockableClock) -> Self {
        Self {
            today: clock.today(),
            mock_date: clock.mock(),
        }
    }
}

#[derive(Deserialize)]
pub struct MockDateRequest {
    date: NaiveDate,
}

#[get("/debug/clock")]
pub fn api_get_clock(clock: &State<Arc<MockableClock>>) -> Json<ClockState> {
    Json(ClockState::of(clock))
}

#[put("/debug/clock", data = "<request>")]
pub fn api_set_clock(
    request: Json<MockDateRequest>,
    clock: &State<Arc<MockableClock>>,
) -> Json<ClockState> {
    clock.set_mock(Some(request.date));
    Json(ClockState::of(clock))
}

#[delete("/debug/clock")]
pub fn api_reset_clock(clock: &State<Arc<MockableClock>>) -> Json<ClockState> {
    clock.set_mock(None);
    Json(ClockState::of(clock))
}

#[derive(Serialize, Deserialize)]
pub struct ScanStatus {
    pub running: bool,
    pub configured: bool,
    /// Whether this request changed the running state.
    pub changed: bool,
    pub last: Option<ScanReport>,
}

fn scan_status(
    scanner: &FaceScanner,
    recognizer: &dyn FaceRecognizer,
    changed: bool,
) -> Json<ScanStatus> {
    Json(ScanStatus {
        running: scanner.is_running(),
        configured: recognizer.is_configured(),
        changed,
        last: scanner.last_report(),
    })
}

#[post("/scan/start")]
pub async fn api_scan_start(
    scanner: &State<FaceScanner>,
    recognizer: &State<Arc<dyn FaceRecognizer>>,
) -> ApiResult<ScanStatus> {
    let started = scanner.start().await.validate_custom()?;
    Ok(scan_status(scanner, recognizer.inner().as_ref(), started))
}

#[post("/scan/stop")]
pub async fn api_scan_stop(
    scanner: &State<FaceScanner>,
    recognizer: &State<Arc<dyn FaceRecognizer>>,
) -> Json<ScanStatus> {
    let stopped = scanner.stop().await;
    scan_status(scanner, recognizer.inner().as_ref(), stopped)
}

#[get("/scan/status")]
pub fn api_scan_status(
    scanner: &State<FaceScanner>,
    recognizer: &State<Arc<dyn FaceRecognizer>>,
) -> Json<ScanStatus> {
    scan_status(scanner, recognizer.inner().as_ref(), false)
}
