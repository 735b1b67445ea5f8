//! Shared domain models mirrored from the tour API.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Identifier of a server-side record. The API hands out integer primary keys,
/// but identifiers are kept as text so route parameters and UUIDs fit too.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap a raw identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.parse::<i64>() {
            Ok(number) => serializer.serialize_i64(number),
            Err(_) => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(text) if !text.trim().is_empty() => Ok(Self(text)),
            Value::Number(number) => Ok(Self(number.to_string())),
            other => Err(de::Error::custom(format!("invalid record id: {other}"))),
        }
    }
}

/// Deserialize a price that may arrive as a JSON number or a decimal string.
pub(crate) fn de_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(price_from_value).unwrap_or(0.0))
}

fn de_opt_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(price_from_value))
}

fn price_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Tour as it appears in the catalogue listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourListing {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub destination_details: Option<Destination>,
    #[serde(default)]
    pub duration_days: Option<u32>,
    #[serde(default)]
    pub max_people: Option<u32>,
    #[serde(default)]
    pub pricings: Vec<Pricing>,
}

impl TourListing {
    /// Canonical per-person price: the first pricing entry, or zero.
    pub fn price(&self) -> f64 {
        first_adult_price(&self.pricings)
    }

    /// Destination name, or a generic label when the API omitted it.
    pub fn destination(&self) -> &str {
        self.destination_details
            .as_ref()
            .map(|destination| destination.name.as_str())
            .unwrap_or("General")
    }

    /// Human-readable duration.
    pub fn duration_label(&self) -> String {
        duration_label(self.duration_days)
    }
}

/// Destination reference embedded in tour payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    #[serde(default)]
    pub id: Option<RecordId>,
    pub name: String,
}

/// One pricing row attached to a tour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default, deserialize_with = "de_opt_price")]
    pub adult_price: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_price")]
    pub child_price: Option<f64>,
}

/// Tolerate `null` where a list is expected.
fn de_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Full tour detail as returned by the detail endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourDetail {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration_days: Option<u32>,
    #[serde(default)]
    pub max_people: Option<u32>,
    #[serde(default)]
    pub destination_details: Option<Destination>,
    #[serde(default, deserialize_with = "de_list")]
    pub pricings: Vec<Pricing>,
    #[serde(default, deserialize_with = "de_list")]
    pub seasons: Vec<Season>,
    #[serde(default, deserialize_with = "de_list")]
    pub itineraries: Vec<ItineraryDay>,
    #[serde(default)]
    pub inclusion_exclusion: Option<InclusionExclusion>,
    #[serde(default, deserialize_with = "de_list")]
    pub reviews: Vec<Review>,
}

impl TourDetail {
    /// Reduce the detail payload to what a booking needs.
    pub fn summary(&self) -> TourSummary {
        TourSummary {
            title: self.title.clone(),
            duration_label: duration_label(self.duration_days),
            price_per_person: first_adult_price(&self.pricings),
        }
    }

    pub fn destination(&self) -> &str {
        self.destination_details
            .as_ref()
            .map(|destination| destination.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or("Unknown")
    }

    /// Name of the first season the tour runs in.
    pub fn season(&self) -> &str {
        self.seasons
            .first()
            .map(|season| season.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or("Any")
    }

    /// Itinerary ordered by day.
    pub fn itinerary(&self) -> Vec<&ItineraryDay> {
        let mut days: Vec<&ItineraryDay> = self.itineraries.iter().collect();
        days.sort_by_key(|day| day.day_number);
        days
    }

    pub fn inclusions(&self) -> Vec<&str> {
        self.inclusion_exclusion
            .as_ref()
            .map(|items| split_lines(items.inclusion.as_deref()))
            .unwrap_or_default()
    }

    pub fn exclusions(&self) -> Vec<&str> {
        self.inclusion_exclusion
            .as_ref()
            .map(|items| split_lines(items.exclusion.as_deref()))
            .unwrap_or_default()
    }
}

fn split_lines(text: Option<&str>) -> Vec<&str> {
    text.unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub name: String,
}

/// One day of a tour's itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryDay {
    #[serde(default)]
    pub day_number: u32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ItineraryDay {
    /// Title of the day, or `Day {n}` when the tour leaves it blank.
    pub fn heading(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => format!("Day {}", self.day_number),
        }
    }
}

/// Newline-separated lists of what the price covers and what it does not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InclusionExclusion {
    #[serde(default)]
    pub inclusion: Option<String>,
    #[serde(default)]
    pub exclusion: Option<String>,
}

/// Traveller review attached to a tour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub id: Option<RecordId>,
    /// Embedded user object or a bare user id.
    #[serde(default)]
    pub user: Value,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Review {
    pub fn author(&self) -> &str {
        self.user
            .get("username")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("Traveler")
    }
}

/// Pricing and labels used while booking a tour.
#[derive(Debug, Clone, PartialEq)]
pub struct TourSummary {
    pub title: String,
    pub duration_label: String,
    pub price_per_person: f64,
}

fn first_adult_price(pricings: &[Pricing]) -> f64 {
    pricings
        .first()
        .and_then(|pricing| pricing.adult_price)
        .unwrap_or(0.0)
}

fn duration_label(days: Option<u32>) -> String {
    match days {
        Some(days) => format!("{days} Days"),
        None => "N/A".to_string(),
    }
}

/// Lifecycle state of a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    #[serde(untagged)]
    Other(String),
}

impl BookingStatus {
    /// Display label for the status.
    pub fn label(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::Confirmed => "Confirmed",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Other(raw) => raw,
        }
    }

    /// Whether a cancellation request still makes sense.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

/// Booking owned by the signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: RecordId,
    /// Either a bare tour id or an embedded tour object, depending on the serializer.
    #[serde(default)]
    pub tour: Value,
    #[serde(default)]
    pub tour_details: Option<TourListing>,
    #[serde(default = "default_travelers")]
    pub travelers_count: u32,
    #[serde(default, deserialize_with = "de_price")]
    pub total_price: f64,
    pub status: BookingStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_travelers() -> u32 {
    1
}

impl Booking {
    /// Best-effort tour title for display.
    pub fn tour_title(&self) -> String {
        if let Some(details) = &self.tour_details {
            return details.title.clone();
        }
        match &self.tour {
            Value::Object(map) => map
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("Tour")
                .to_string(),
            Value::String(text) => text.clone(),
            Value::Number(number) => format!("Tour #{number}"),
            _ => "Tour".to_string(),
        }
    }
}

/// Payload of the booking-creation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingRequest {
    pub tour: RecordId,
    pub travelers_count: u32,
    pub total_price: f64,
}

/// Server acknowledgement of a created booking.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BookingReceipt {
    pub id: RecordId,
    #[serde(default)]
    pub status: Option<BookingStatus>,
    #[serde(default, deserialize_with = "de_opt_price")]
    pub total_price: Option<f64>,
}

/// Refund state submitted with a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefundStatus {
    Pending,
}

/// Cancellation request for an existing booking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancellationRequest {
    pub booking: RecordId,
    pub reason_for_cancellation: String,
    pub cancellation_date: NaiveDate,
    pub refund_status: RefundStatus,
}

impl CancellationRequest {
    /// Cancellation submitted by the customer from the client.
    pub fn for_booking(booking: RecordId, today: NaiveDate) -> Self {
        Self {
            booking,
            reason_for_cancellation: "User requested cancellation via website".to_string(),
            cancellation_date: today,
            refund_status: RefundStatus::Pending,
        }
    }
}
