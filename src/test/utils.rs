#[cfg(test)]
pub mod test_db {
    use crate::database::initialize_database;
    use crate::db::{create_coach, create_member, create_payment, create_subscription};
    use crate::error::AppError;
    use crate::models::{
        NewCoach, NewMember, NewPayment, NewSubscription, PaymentMethod, SubscriptionStatus,
    };
    use chrono::NaiveDate;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();

    /// The date every test clock is frozen at unless a test says otherwise.
    pub fn test_today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// In-memory SQLite lives per connection, so the pool is pinned to one.
    pub async fn memory_pool() -> Pool<Sqlite> {
        INIT.call_once(|| {
            let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
                .is_test(true)
                .try_init();
        });

        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database")
    }

    pub struct TestMember {
        pub first_name: String,
        pub last_name: String,
        pub registration_date: NaiveDate,
        pub face_id: Option<String>,
    }

    pub struct TestSubscription {
        pub member: String,
        pub plan_name: String,
        pub start_date: NaiveDate,
        pub end_date: NaiveDate,
        pub price: f64,
        pub status: SubscriptionStatus,
    }

    pub struct TestPayment {
        pub member: String,
        pub amount: f64,
        pub payment_date: NaiveDate,
        pub method: PaymentMethod,
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        members: Vec<TestMember>,
        coaches: Vec<(String, Option<String>)>,
        subscriptions: Vec<TestSubscription>,
        payments: Vec<TestPayment>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn member(self, first_name: &str, last_name: &str) -> Self {
            self.member_registered(first_name, last_name, test_today())
        }

        pub fn member_registered(
            mut self,
            first_name: &str,
            last_name: &str,
            registration_date: NaiveDate,
        ) -> Self {
            self.members.push(TestMember {
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                registration_date,
                face_id: None,
            });
            self
        }

        pub fn member_with_face(mut self, first_name: &str, last_name: &str, face_id: &str) -> Self {
            self.members.push(TestMember {
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                registration_date: test_today(),
                face_id: Some(face_id.to_string()),
            });
            self
        }

        pub fn coach(mut self, name: &str, specialization: Option<&str>) -> Self {
            self.coaches
                .push((name.to_string(), specialization.map(String::from)));
            self
        }

        /// `member` is the member's full name as given to [`Self::member`].
        pub fn subscription(
            mut self,
            member: &str,
            plan_name: &str,
            start_date: NaiveDate,
            end_date: NaiveDate,
            price: f64,
        ) -> Self {
            self.subscriptions.push(TestSubscription {
                member: member.to_string(),
                plan_name: plan_name.to_string(),
                start_date,
                end_date,
                price,
                status: SubscriptionStatus::Active,
            });
            self
        }

        pub fn subscription_with_status(
            mut self,
            member: &str,
            plan_name: &str,
            end_date: NaiveDate,
            status: &str,
        ) -> Self {
            self.subscriptions.push(TestSubscription {
                member: member.to_string(),
                plan_name: plan_name.to_string(),
                start_date: test_today(),
                end_date,
                price: 100.0,
                status: SubscriptionStatus::from(status.to_string()),
            });
            self
        }

        pub fn payment(
            mut self,
            member: &str,
            amount: f64,
            payment_date: NaiveDate,
            method: PaymentMethod,
        ) -> Self {
            self.payments.push(TestPayment {
                member: member.to_string(),
                amount,
                payment_date,
                method,
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            let pool = memory_pool().await;
            initialize_database(&pool).await?;

            let mut member_ids: HashMap<String, i64> = HashMap::new();
            let mut coach_ids: HashMap<String, i64> = HashMap::new();

            for (n, member) in self.members.iter().enumerate() {
                let id = create_member(
                    &pool,
                    &NewMember {
                        first_name: member.first_name.clone(),
                        last_name: member.last_name.clone(),
                        phone: format!("06{:08}", n),
                        email: format!(
                            "{}.{}@example.com",
                            member.first_name.to_lowercase(),
                            member.last_name.to_lowercase()
                        ),
                        gender: None,
                        photo_path: None,
                        registration_date: member.registration_date,
                        face_id: member.face_id.clone(),
                    },
                )
                .await?;

                member_ids.insert(format!("{} {}", member.first_name, member.last_name), id);
            }

            for (name, specialization) in &self.coaches {
                let id = create_coach(
                    &pool,
                    &NewCoach {
                        name: name.clone(),
                        specialization: specialization.clone(),
                        phone: None,
                    },
                )
                .await?;

                coach_ids.insert(name.clone(), id);
            }

            for sub in self.subscriptions {
                let member_id = member_ids
                    .get(&sub.member)
                    .copied()
                    .ok_or_else(|| AppError::NotFound(sub.member.clone()))?;

                create_subscription(
                    &pool,
                    &NewSubscription {
                        member_id,
                        plan_name: sub.plan_name,
                        start_date: sub.start_date,
                        end_date: sub.end_date,
                        price: sub.price,
                        status: sub.status,
                    },
                )
                .await?;
            }

            for payment in self.payments {
                let member_id = member_ids
                    .get(&payment.member)
                    .copied()
                    .ok_or_else(|| AppError::NotFound(payment.member.clone()))?;

                create_payment(
                    &pool,
                    &NewPayment {
                        member_id,
                        amount: payment.amount,
                        payment_date: payment.payment_date,
                        method: payment.method,
                    },
                )
                .await?;
            }

            Ok(TestDb {
                pool,
                member_ids,
                coach_ids,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub member_ids: HashMap<String, i64>,
        pub coach_ids: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn member_id(&self, full_name: &str) -> i64 {
            self.member_ids[full_name]
        }

        pub fn coach_id(&self, name: &str) -> i64 {
            self.coach_ids[name]
        }
    }

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .member("Sara", "Alami")
            .member("Youssef", "Idrissi")
            .coach("Karim Tazi", Some("Boxing"))
            .subscription(
                "Sara Alami",
                "1 Month - Basic",
                date(2024, 3, 1),
                date(2024, 4, 1),
                300.0,
            )
            .payment("Sara Alami", 300.0, date(2024, 3, 1), PaymentMethod::Cash)
            .build()
            .await
            .expect("Failed to build test database")
    }
}

#[cfg(test)]
pub mod test_utils {
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use rocket::local::asynchronous::Client;

    use crate::clock::MockableClock;
    use crate::env::Settings;
    use crate::face::{Camera, FaceError, FaceMatch, FaceRecognizer, FrameSource};
    use crate::{Services, init_rocket};

    pub use super::test_db::*;

    /// Scripted stand-in for the vendor API.
    #[derive(Default)]
    pub struct FakeRecognizer {
        pub configured: bool,
        pub found: Option<FaceMatch>,
        pub failure: Option<String>,
        pub enrolled: Mutex<Vec<String>>,
    }

    impl FakeRecognizer {
        pub fn unconfigured() -> Self {
            Self::default()
        }

        pub fn no_match() -> Self {
            Self {
                configured: true,
                ..Self::default()
            }
        }

        pub fn matching(label: &str, token: Option<&str>) -> Self {
            Self {
                configured: true,
                found: Some(FaceMatch {
                    label: label.to_string(),
                    token: token.map(String::from),
                    probability: 0.97,
                }),
                ..Self::default()
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                configured: true,
                failure: Some(message.to_string()),
                ..Self::default()
            }
        }

        pub fn enrolled_labels(&self) -> Vec<String> {
            self.enrolled.lock().unwrap().clone()
        }
    }

    #[rocket::async_trait]
    impl FaceRecognizer for FakeRecognizer {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn enroll_face(&self, label: &str, _image: &[u8]) -> Result<String, FaceError> {
            if !self.configured {
                return Err(FaceError::NotConfigured);
            }
            self.enrolled.lock().unwrap().push(label.to_string());
            Ok(format!("token-{}", self.enrolled_labels().len()))
        }

        async fn recognize_face(&self, _image: &[u8]) -> Result<Option<FaceMatch>, FaceError> {
            if !self.configured {
                return Err(FaceError::NotConfigured);
            }
            if let Some(body) = &self.failure {
                return Err(FaceError::Rejected {
                    status: 500,
                    body: body.clone(),
                });
            }
            Ok(self.found.clone())
        }
    }

    /// Always hands out the same frame, or nothing.
    pub struct FixedFrameSource(pub Option<Vec<u8>>);

    impl FrameSource for FixedFrameSource {
        fn open(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn close(&mut self) {}

        fn grab(&mut self) -> io::Result<Option<Vec<u8>>> {
            Ok(self.0.clone())
        }
    }

    pub fn test_camera() -> Camera {
        Camera::new(FixedFrameSource(Some(b"jpeg-bytes".to_vec())))
    }

    pub fn test_settings() -> Settings {
        Settings {
            scan_warmup: Duration::ZERO,
            scan_interval: Duration::from_millis(20),
            ..Settings::default()
        }
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, Arc<MockableClock>) {
        setup_test_client_with(test_db, FakeRecognizer::unconfigured()).await
    }

    pub async fn setup_test_client_with(
        test_db: TestDb,
        recognizer: FakeRecognizer,
    ) -> (Client, Arc<MockableClock>) {
        let clock = Arc::new(MockableClock::with_mock(test_today()));

        let services = Services {
            pool: test_db.pool,
            clock: clock.clone(),
            recognizer: Arc::new(recognizer),
            camera: test_camera(),
            settings: test_settings(),
        };

        let client = Client::tracked(init_rocket(services).await)
            .await
            .expect("Failed to build rocket client");

        (client, clock)
    }
}
