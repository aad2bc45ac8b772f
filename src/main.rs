#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod clock;
mod database;
mod db;
mod engine;
mod env;
mod error;
mod face;
mod models;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use std::sync::Arc;

use api::{
    api_check_in, api_create_coach, api_create_member, api_create_payment, api_create_schedule,
    api_create_subscription, api_dashboard, api_delete_coach, api_delete_member,
    api_delete_payment, api_delete_schedule, api_delete_subscription, api_enroll_face,
    api_get_clock, api_get_coach_schedules, api_get_coaches, api_get_expiring, api_get_member,
    api_get_member_subscriptions, api_get_members, api_get_payments, api_get_plans,
    api_get_schedules, api_get_subscriptions, api_login, api_recent_activity, api_reset_clock,
    api_scan_start, api_scan_status, api_scan_stop, api_set_clock, api_today_attendance,
    api_update_coach, api_update_member, health,
};
use clock::MockableClock;
use engine::AttendanceEngine;
use env::{Settings, load_environment};
use error::AppError;
use face::{Camera, FaceRecognizer, FaceScanner, LuxandClient, SpoolDirFrameSource};
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use telemetry::{TelemetryFairing, init_tracing};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

/// Everything the HTTP layer shares between requests.
pub struct Services {
    pub pool: SqlitePool,
    pub clock: Arc<MockableClock>,
    pub recognizer: Arc<dyn FaceRecognizer>,
    pub camera: Camera,
    pub settings: Settings,
}

impl Services {
    pub fn from_settings(pool: SqlitePool, settings: Settings) -> Self {
        let recognizer = LuxandClient::new(
            &settings.face_api_url,
            settings.face_api_key.clone(),
            settings.face_match_threshold,
        );
        let camera = Camera::new(SpoolDirFrameSource::new(settings.camera_frame_dir.clone()));

        Self {
            pool,
            clock: Arc::new(MockableClock::new()),
            recognizer: Arc::new(recognizer),
            camera,
            settings,
        }
    }
}

async fn setup() -> Result<Services, Error> {
    let settings = Settings::from_env()?;

    info!(database_url = %settings.database_url, "Opening database");
    let pool = database::connect(&settings.database_url).await?;

    info!("Initializing database schema...");
    database::initialize_database(&pool).await?;
    info!("Database ready");

    Ok(Services::from_settings(pool, settings))
}

#[launch]
async fn rocket() -> _ {
    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }
    init_tracing();

    match setup().await {
        Ok(services) => init_rocket(services).await,
        Err(e) => {
            error!("Startup failed: {}", e);
            telemetry::shutdown_telemetry();
            std::process::exit(1);
        }
    }
}

pub async fn init_rocket(services: Services) -> Rocket<Build> {
    info!("Starting gym tracker");

    let Services {
        pool,
        clock,
        recognizer,
        camera,
        settings,
    } = services;

    let engine = AttendanceEngine::new(pool.clone(), clock.clone());
    let scanner = FaceScanner::new(
        engine.clone(),
        recognizer.clone(),
        camera.clone(),
        settings.scan_warmup,
        settings.scan_interval,
    );

    rocket::build()
        .manage(pool)
        .manage(clock)
        .manage(engine)
        .manage(recognizer)
        .manage(camera)
        .manage(scanner)
        .manage(settings)
        .mount(
            "/api",
            routes![
                api_login,
                api_get_members,
                api_get_member,
                api_create_member,
                api_update_member,
                api_delete_member,
                api_get_member_subscriptions,
                api_enroll_face,
                api_get_coaches,
                api_create_coach,
                api_update_coach,
                api_delete_coach,
                api_get_coach_schedules,
                api_get_schedules,
                api_create_schedule,
                api_delete_schedule,
                api_get_plans,
                api_get_subscriptions,
                api_create_subscription,
                api_delete_subscription,
                api_get_expiring,
                api_get_payments,
                api_create_payment,
                api_delete_payment,
                api_check_in,
                api_recent_activity,
                api_today_attendance,
                api_dashboard,
                api_get_clock,
                api_set_clock,
                api_reset_clock,
                api_scan_start,
                api_scan_stop,
                api_scan_status,
            ],
        )
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
}
