//! In-memory API double shared by unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::{
    api::{ApiError, Credentials, ProfileUpdate, Registration, TourApi},
    custom::CustomPackageRequest,
    models::{
        Booking, BookingReceipt, BookingRequest, CancellationRequest, RecordId, TourDetail,
        TourListing,
    },
    session::{Role, User},
    store::{MemoryStore, PersistedStore},
};

pub(crate) fn user(id: i64, role: Role) -> User {
    serde_json::from_value(json!({
        "id": id,
        "username": format!("user{id}"),
        "email": format!("user{id}@example.com"),
        "role": role.as_str(),
        "first_name": "Test",
        "last_name": format!("User{id}"),
    }))
    .expect("fixture user")
}

pub(crate) fn tour_detail(id: i64, prices: &[f64]) -> TourDetail {
    let pricings: Vec<Value> = prices
        .iter()
        .map(|price| json!({"adult_price": price}))
        .collect();
    serde_json::from_value(json!({
        "id": id,
        "title": format!("Tour {id}"),
        "duration_days": 5,
        "pricings": pricings,
    }))
    .expect("fixture tour")
}

pub(crate) fn listing(id: i64, title: &str, days: u32, destination: &str) -> TourListing {
    serde_json::from_value(json!({
        "id": id,
        "title": title,
        "duration_days": days,
        "destination_details": {"name": destination},
        "description": format!("{title} in {destination}"),
        "pricings": [{"adult_price": 100 * id}],
    }))
    .expect("fixture listing")
}

/// Scriptable [`TourApi`]. Each operation answers with its configured result.
pub(crate) struct FakeApi {
    pub auth: Mutex<Result<Value, ApiError>>,
    pub profile: Mutex<Result<User, ApiError>>,
    pub updated: Mutex<Result<User, ApiError>>,
    pub registered: Mutex<Result<Value, ApiError>>,
    pub tours: Mutex<Result<Vec<TourListing>, ApiError>>,
    pub detail: Mutex<Result<TourDetail, ApiError>>,
    pub receipt: Mutex<Result<BookingReceipt, ApiError>>,
    pub bookings: Mutex<Result<Vec<Booking>, ApiError>>,
    pub calls: Mutex<Vec<String>>,
    pub booking_requests: Mutex<Vec<BookingRequest>>,
    /// When set, profile fetches wait for a notification before answering.
    pub profile_gate: Mutex<Option<Arc<Notify>>>,
    /// When set, tour detail fetches wait for a notification before answering.
    pub detail_gate: Mutex<Option<Arc<Notify>>>,
    /// When set, booking submissions wait for a notification before answering.
    pub booking_gate: Mutex<Option<Arc<Notify>>>,
    /// Store inspected at the moment the profile is requested.
    pub watched_store: Mutex<Option<Arc<MemoryStore>>>,
    pub token_seen_by_profile: Mutex<Option<Option<String>>>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            auth: Mutex::new(Ok(json!({"data": {"access_token": "tok-1"}}))),
            profile: Mutex::new(Ok(user(1, Role::Customer))),
            updated: Mutex::new(Ok(user(1, Role::Customer))),
            registered: Mutex::new(Ok(json!({"id": 1}))),
            tours: Mutex::new(Ok(Vec::new())),
            detail: Mutex::new(Ok(tour_detail(1, &[100.0]))),
            receipt: Mutex::new(Ok(BookingReceipt {
                id: RecordId::from(500),
                status: None,
                total_price: None,
            })),
            bookings: Mutex::new(Ok(Vec::new())),
            calls: Mutex::new(Vec::new()),
            booking_requests: Mutex::new(Vec::new()),
            profile_gate: Mutex::new(None),
            detail_gate: Mutex::new(None),
            booking_gate: Mutex::new(None),
            watched_store: Mutex::new(None),
            token_seen_by_profile: Mutex::new(None),
        }
    }
}

impl FakeApi {
    pub fn with_profile(profile: Result<User, ApiError>) -> Self {
        let api = Self::default();
        *api.profile.lock() = profile;
        api
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().push(call.to_string());
    }
}

#[async_trait]
impl TourApi for FakeApi {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<Value, ApiError> {
        self.record("authenticate");
        self.auth.lock().clone()
    }

    async fn current_user(&self, token: &str) -> Result<User, ApiError> {
        self.record(&format!("current_user:{token}"));
        let watched = self.watched_store.lock().clone();
        if let Some(store) = watched {
            let seen = store.get(crate::session::TOKEN_KEY).ok().flatten();
            *self.token_seen_by_profile.lock() = Some(seen);
        }
        let gate = self.profile_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.profile.lock().clone()
    }

    async fn register(&self, _registration: &Registration) -> Result<Value, ApiError> {
        self.record("register");
        self.registered.lock().clone()
    }

    async fn update_profile(&self, token: &str, _update: &ProfileUpdate) -> Result<User, ApiError> {
        self.record(&format!("update_profile:{token}"));
        self.updated.lock().clone()
    }

    async fn list_tours(&self) -> Result<Vec<TourListing>, ApiError> {
        self.record("list_tours");
        self.tours.lock().clone()
    }

    async fn tour_detail(&self, tour_id: &RecordId) -> Result<TourDetail, ApiError> {
        self.record(&format!("tour_detail:{tour_id}"));
        let gate = self.detail_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.detail.lock().clone()
    }

    async fn create_booking(
        &self,
        token: &str,
        request: &BookingRequest,
    ) -> Result<BookingReceipt, ApiError> {
        self.record(&format!("create_booking:{token}"));
        self.booking_requests.lock().push(request.clone());
        let gate = self.booking_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.receipt.lock().clone()
    }

    async fn list_bookings(&self, token: &str) -> Result<Vec<Booking>, ApiError> {
        self.record(&format!("list_bookings:{token}"));
        self.bookings.lock().clone()
    }

    async fn cancel_booking(
        &self,
        token: &str,
        request: &CancellationRequest,
    ) -> Result<Value, ApiError> {
        self.record(&format!("cancel_booking:{token}:{}", request.booking));
        Ok(json!({"booking": request.booking.as_str()}))
    }

    async fn request_custom_package(
        &self,
        token: Option<&str>,
        request: &CustomPackageRequest,
    ) -> Result<Value, ApiError> {
        self.record(&format!("request_custom_package:{}", token.unwrap_or("-")));
        Ok(json!({"id": 1, "destination": request.destination}))
    }
}
