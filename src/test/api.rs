#[cfg(test)]
mod tests {
    use crate::api::{ClockState, LoginResponse, ScanStatus, TodayAttendance};
    use crate::engine::DashboardSummary;
    use crate::models::{Coach, Member, PaymentListing, ScheduleEntry, Subscription};
    use crate::test::utils::test_utils::{
        FakeRecognizer, TestDbBuilder, create_standard_test_db, date, setup_test_client,
        setup_test_client_with, test_today,
    };
    use crate::validation::ValidationResponse;
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::{Client, LocalResponse};
    use serde::de::DeserializeOwned;
    use serde_json::{Value, json};

    async fn read_json<T: DeserializeOwned>(response: LocalResponse<'_>) -> T {
        let body = response.into_string().await.unwrap();
        serde_json::from_str(&body).unwrap()
    }

    async fn post_json<'c>(client: &'c Client, uri: &'c str, body: Value) -> LocalResponse<'c> {
        client
            .post(uri)
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await
    }

    #[rocket::async_test]
    async fn test_health() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        let response = client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "OK");
    }

    #[rocket::async_test]
    async fn test_login_api() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        let response = post_json(
            &client,
            "/api/login",
            json!({"username": "admin", "password": "admin123"}),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);
        let login: LoginResponse = read_json(response).await;
        assert!(login.success);
        assert_eq!(login.user.unwrap().username, "admin");

        let response = post_json(
            &client,
            "/api/login",
            json!({"username": "admin", "password": "nope"}),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);
        let login: LoginResponse = read_json(response).await;
        assert!(!login.success);
        assert!(login.error.is_some());
    }

    #[rocket::async_test]
    async fn test_create_member_validation() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        let response = post_json(
            &client,
            "/api/members",
            json!({
                "first_name": "Nadia",
                "last_name": "",
                "phone": "12345",
                "email": "nadia@example.com"
            }),
        )
        .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);
        let errors: ValidationResponse = read_json(response).await;
        assert_eq!(errors.status, "error");
        assert_eq!(
            errors.errors.get("phone"),
            Some(&vec!["Phone number must be exactly 10 digits.".to_string()])
        );
        assert!(errors.errors.contains_key("last_name"));
        assert!(!errors.errors.contains_key("email"));
    }

    #[rocket::async_test]
    async fn test_create_and_update_member() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        let response = post_json(
            &client,
            "/api/members",
            json!({
                "first_name": " Nadia ",
                "last_name": "Bennani",
                "phone": "0611223344",
                "email": "nadia@example.com",
                "gender": "Female"
            }),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);
        let created: Member = read_json(response).await;
        assert_eq!(created.first_name, "Nadia");
        assert_eq!(created.registration_date, test_today());

        let response = client
            .put(format!("/api/members/{}", created.id))
            .header(ContentType::JSON)
            .body(
                json!({
                    "first_name": "Nadia",
                    "last_name": "Bennani",
                    "phone": "0699887766",
                    "email": "nadia@example.com",
                    "registration_date": "2020-01-01"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let updated: Member = read_json(response).await;
        assert_eq!(updated.phone, "0699887766");
        assert_eq!(updated.registration_date, test_today());

        let members: Vec<Member> = read_json(client.get("/api/members").dispatch().await).await;
        assert_eq!(members.len(), 3);
    }

    #[rocket::async_test]
    async fn test_missing_member_is_404() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        assert_eq!(
            client.get("/api/members/999").dispatch().await.status(),
            Status::NotFound
        );
        assert_eq!(
            client.delete("/api/members/999").dispatch().await.status(),
            Status::NotFound
        );
        let response = post_json(&client, "/api/attendance/check-in", json!({"member_id": 999})).await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_check_in_and_today_count() {
        let test_db = create_standard_test_db().await;
        let sara = test_db.member_id("Sara Alami");
        let (client, _) = setup_test_client(test_db).await;

        for _ in 0..2 {
            let response =
                post_json(&client, "/api/attendance/check-in", json!({"member_id": sara})).await;
            assert_eq!(response.status(), Status::Ok);
        }

        let today: TodayAttendance =
            read_json(client.get("/api/attendance/today").dispatch().await).await;
        assert_eq!(today.date, test_today());
        assert_eq!(today.check_ins, 2);

        let feed: Vec<Value> =
            read_json(client.get("/api/attendance/recent?limit=1").dispatch().await).await;
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0]["member_name"], "Sara Alami");
    }

    #[rocket::async_test]
    async fn test_debug_clock_drives_expiry() {
        let (client, clock) = setup_test_client(create_standard_test_db().await).await;

        // Sara's plan ends 2024-04-01, seventeen days after the test date.
        let expiring: Vec<Value> =
            read_json(client.get("/api/subscriptions/expiring").dispatch().await).await;
        assert!(expiring.is_empty());

        let response = client
            .put("/api/debug/clock")
            .header(ContentType::JSON)
            .body(json!({"date": "2024-03-29"}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let state: ClockState = read_json(response).await;
        assert_eq!(state.today, date(2024, 3, 29));
        assert_eq!(clock.mock(), Some(date(2024, 3, 29)));

        let expiring: Vec<Value> =
            read_json(client.get("/api/subscriptions/expiring").dispatch().await).await;
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0]["days_left"], 3);
        assert_eq!(expiring[0]["member"]["first_name"], "Sara");

        let state: ClockState = read_json(client.delete("/api/debug/clock").dispatch().await).await;
        assert_eq!(state.mock_date, None);
    }

    #[rocket::async_test]
    async fn test_subscription_plans() {
        let test_db = create_standard_test_db().await;
        let youssef = test_db.member_id("Youssef Idrissi");
        let (client, _) = setup_test_client(test_db).await;

        let response = post_json(
            &client,
            "/api/subscriptions",
            json!({"member_id": youssef, "plan": "Standard", "start_date": "2024-01-31"}),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);
        let standard: Subscription = read_json(response).await;
        assert_eq!(standard.plan_name, "3 Months - Standard");
        assert_eq!(standard.end_date, date(2024, 4, 30));
        assert_eq!(standard.price, 800.0);

        let response = post_json(
            &client,
            "/api/subscriptions",
            json!({"member_id": youssef, "plan_name": "", "end_date": "2024-06-01", "price": 450.0}),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);
        let custom: Subscription = read_json(response).await;
        assert_eq!(custom.plan_name, "Custom Plan");
        assert_eq!(custom.start_date, test_today());

        let response = post_json(
            &client,
            "/api/subscriptions",
            json!({"member_id": youssef, "end_date": "2024-03-01", "price": 100.0}),
        )
        .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);
        let errors: ValidationResponse = read_json(response).await;
        assert!(errors.errors.contains_key("end_date"));

        let response = post_json(
            &client,
            "/api/subscriptions",
            json!({"member_id": youssef, "end_date": "2024-06-01", "price": -1.0}),
        )
        .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);

        let plans: Vec<Value> = read_json(client.get("/api/plans").dispatch().await).await;
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[2]["plan_name"], "1 Year - Premium");
        assert_eq!(plans[2]["end_date"], "2025-03-15");
    }

    #[rocket::async_test]
    async fn test_payments_default_to_today() {
        let test_db = create_standard_test_db().await;
        let youssef = test_db.member_id("Youssef Idrissi");
        let (client, _) = setup_test_client(test_db).await;

        let response = post_json(
            &client,
            "/api/payments",
            json!({"member_id": youssef, "amount": 800.0, "method": "TPE"}),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);
        let created: PaymentListing = read_json(response).await;
        assert_eq!(created.payment_date, test_today());
        assert_eq!(created.member_name, "Youssef Idrissi");

        let listing: Vec<PaymentListing> =
            read_json(client.get("/api/payments").dispatch().await).await;
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].id, created.id);

        let response = post_json(
            &client,
            "/api/payments",
            json!({"member_id": youssef, "amount": 10.0, "method": "Cheque"}),
        )
        .await;
        assert!(response.status().code >= 400);
    }

    #[rocket::async_test]
    async fn test_schedule_validation_and_listing() {
        let test_db = create_standard_test_db().await;
        let karim = test_db.coach_id("Karim Tazi");
        let (client, _) = setup_test_client(test_db).await;

        let response = post_json(
            &client,
            "/api/schedules",
            json!({"coach_id": karim, "day": "Funday", "start_time": "25:00", "title": "Boxing"}),
        )
        .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);
        let errors: ValidationResponse = read_json(response).await;
        assert!(errors.errors.contains_key("day"));
        assert!(errors.errors.contains_key("start_time"));

        let response = post_json(
            &client,
            "/api/schedules",
            json!({"coach_id": karim, "day": "monday", "start_time": "18:00", "end_time": "19:30", "title": "Boxing"}),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);
        let entry: ScheduleEntry = read_json(response).await;
        assert_eq!(entry.coach_name.as_deref(), Some("Karim Tazi"));

        let by_coach: Vec<ScheduleEntry> = read_json(
            client
                .get(format!("/api/coaches/{}/schedules", karim))
                .dispatch()
                .await,
        )
        .await;
        assert_eq!(by_coach.len(), 1);

        let response = client
            .delete(format!("/api/coaches/{}", karim))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NoContent);
        let all: Vec<ScheduleEntry> = read_json(client.get("/api/schedules").dispatch().await).await;
        assert!(all.is_empty());
    }

    #[rocket::async_test]
    async fn test_blank_optional_fields_are_accepted() {
        let test_db = create_standard_test_db().await;
        let karim = test_db.coach_id("Karim Tazi");
        let (client, _) = setup_test_client(test_db).await;

        let response = post_json(
            &client,
            "/api/schedules",
            json!({"coach_id": karim, "day": "Monday", "start_time": "09:00", "end_time": "", "title": "Yoga"}),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);
        let entry: ScheduleEntry = read_json(response).await;
        assert_eq!(entry.end_time, None);
        assert_eq!(entry.title, "Yoga");

        let response = post_json(
            &client,
            "/api/coaches",
            json!({"name": "Leila Amrani", "specialization": "Yoga", "phone": ""}),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);
        let coach: Coach = read_json(response).await;
        assert_eq!(coach.phone, None);

        // A present but malformed value is still rejected.
        let response = post_json(
            &client,
            "/api/coaches",
            json!({"name": "Leila Amrani", "phone": "12"}),
        )
        .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);
        let errors: ValidationResponse = read_json(response).await;
        assert!(errors.errors.contains_key("phone"));
    }

    #[rocket::async_test]
    async fn test_edit_coach_keeps_timetable() {
        let test_db = create_standard_test_db().await;
        let karim = test_db.coach_id("Karim Tazi");
        let (client, _) = setup_test_client(test_db).await;

        let response = post_json(
            &client,
            "/api/schedules",
            json!({"coach_id": karim, "day": "Wednesday", "start_time": "18:00", "title": "Boxing"}),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .put(format!("/api/coaches/{}", karim))
            .header(ContentType::JSON)
            .body(json!({"name": "Karim T.", "specialization": "Kickboxing", "phone": "0655443322"}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let coach: Coach = read_json(response).await;
        assert_eq!(coach.id, karim);
        assert_eq!(coach.name, "Karim T.");
        assert_eq!(coach.phone.as_deref(), Some("0655443322"));

        let timetable: Vec<ScheduleEntry> = read_json(
            client
                .get(format!("/api/coaches/{}/schedules", karim))
                .dispatch()
                .await,
        )
        .await;
        assert_eq!(timetable.len(), 1);
        assert_eq!(timetable[0].coach_name.as_deref(), Some("Karim T."));

        let response = client
            .put("/api/coaches/999")
            .header(ContentType::JSON)
            .body(json!({"name": "Nobody"}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_dashboard() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        let response = client.get("/api/dashboard").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let summary: DashboardSummary = read_json(response).await;
        assert_eq!(summary.total_members, 2);
        assert_eq!(summary.total_revenue, 300.0);
        assert_eq!(summary.registrations.last().unwrap().value, 2);
    }

    #[rocket::async_test]
    async fn test_scan_endpoints() {
        let test_db = TestDbBuilder::new()
            .member("Sara", "Alami")
            .build()
            .await
            .unwrap();
        let (client, _) =
            setup_test_client_with(test_db, FakeRecognizer::matching("Sara Alami", None)).await;

        let status: ScanStatus = read_json(client.get("/api/scan/status").dispatch().await).await;
        assert!(!status.running);
        assert!(status.configured);

        let status: ScanStatus = read_json(client.post("/api/scan/start").dispatch().await).await;
        assert!(status.running);
        assert!(status.changed);

        // The enrollment camera is held by the scanner.
        let response = client.post("/api/members/1/face").dispatch().await;
        assert_eq!(response.status(), Status::Conflict);

        let status: ScanStatus = read_json(client.post("/api/scan/stop").dispatch().await).await;
        assert!(!status.running);
        assert!(status.changed);

        // Stopping hands the camera back straight away.
        let response = client.post("/api/members/1/face").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let status: ScanStatus = read_json(client.post("/api/scan/start").dispatch().await).await;
        assert!(status.running);
        assert!(status.changed);

        let status: ScanStatus = read_json(client.post("/api/scan/stop").dispatch().await).await;
        assert!(!status.running);
    }

    #[rocket::async_test]
    async fn test_face_enrollment_not_configured() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        let response = client.post("/api/members/1/face").dispatch().await;
        assert_eq!(response.status(), Status::ServiceUnavailable);
        let errors: ValidationResponse = read_json(response).await;
        assert_eq!(
            errors.errors.get("recognition"),
            Some(&vec!["API Config Missing".to_string()])
        );
    }
}
