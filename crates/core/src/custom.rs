#![allow(missing_docs)]

//! Requests for tailor-made tours.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::session::EMAIL_PATTERN;

/// Longest trip that can be requested, in days.
pub const MAX_TRIP_DAYS: u32 = 30;
/// Largest group that can be requested.
pub const MAX_GROUP_SIZE: u32 = 50;

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{10}$").expect("invalid phone regex"));

/// One selectable option: the value sent to the API and its display label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub value: &'static str,
    pub label: &'static str,
}

const fn choice(value: &'static str, label: &'static str) -> Choice {
    Choice { value, label }
}

pub const DESTINATIONS: &[Choice] = &[
    choice("sikkim", "Sikkim"),
    choice("vietnam", "Vietnam"),
    choice("goa", "Goa"),
    choice("rajasthan", "Rajasthan"),
    choice("kerala", "Kerala"),
    choice("himachal", "Himachal Pradesh"),
    choice("other", "Other"),
];

pub const TOUR_TYPES: &[Choice] = &[
    choice("adventure", "Adventure"),
    choice("family", "Family"),
    choice("honeymoon", "Honeymoon"),
    choice("business", "Business"),
    choice("pilgrimage", "Pilgrimage"),
    choice("beach", "Beach"),
    choice("heritage", "Heritage"),
];

pub const ACCOMMODATIONS: &[Choice] = &[
    choice("3-star", "3 Star Hotel"),
    choice("4-star", "4 Star Hotel"),
    choice("5-star", "5 Star Hotel"),
    choice("resort", "Resort"),
    choice("homestay", "Homestay"),
    choice("budget", "Budget Hotel"),
];

pub const TRANSPORTATION: &[Choice] = &[
    choice("flight", "Flight"),
    choice("train", "Train"),
    choice("bus", "Bus"),
    choice("car", "Private Car"),
    choice("mixed", "Mixed (Flight + Car)"),
];

pub const BUDGETS: &[Choice] = &[
    choice("under-25000", "Under ₹25,000"),
    choice("25000-50000", "₹25,000 - ₹50,000"),
    choice("50000-100000", "₹50,000 - ₹1,00,000"),
    choice("100000-200000", "₹1,00,000 - ₹2,00,000"),
    choice("above-200000", "Above ₹2,00,000"),
];

/// Reason a draft cannot be sent. `Display` is the message shown to users.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CustomRequestError {
    #[error("Please enter your {0}.")]
    Missing(&'static str),
    #[error("Please enter a valid email")]
    InvalidEmail,
    #[error("Please enter a valid 10-digit phone number")]
    InvalidPhone,
    #[error("Unknown {field} \"{value}\". Choose one of: {options}.")]
    UnknownChoice {
        field: &'static str,
        value: String,
        options: String,
    },
    #[error("Please enter the start date as YYYY-MM-DD.")]
    InvalidDate,
    #[error("The {field} must be a whole number between 1 and {max}.")]
    OutOfRange { field: &'static str, max: u32 },
}

/// Form contents as typed, before validation.
#[derive(Debug, Clone, Default)]
pub struct CustomPackageDraft {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub destination: String,
    pub tour_type: String,
    pub accommodation: String,
    pub transportation: String,
    pub start_date: String,
    pub duration: String,
    pub number_of_people: String,
    pub budget: String,
    pub special_requests: String,
}

impl CustomPackageDraft {
    /// Check every field and build the request. Options may be given by
    /// value or by label, in any case.
    pub fn validate(&self) -> Result<CustomPackageRequest, CustomRequestError> {
        let first_name = required(&self.first_name, "first name")?;
        let last_name = required(&self.last_name, "last name")?;
        let email = required(&self.email, "email")?;
        if !EMAIL_PATTERN.is_match(&email) {
            return Err(CustomRequestError::InvalidEmail);
        }
        let phone = required(&self.phone, "phone number")?;
        if !PHONE_PATTERN.is_match(&phone) {
            return Err(CustomRequestError::InvalidPhone);
        }
        let destination = select(&self.destination, "destination", DESTINATIONS)?;
        let tour_type = select(&self.tour_type, "tour type", TOUR_TYPES)?;
        let accommodation = select(&self.accommodation, "accommodation", ACCOMMODATIONS)?;
        let transportation = select(&self.transportation, "transportation", TRANSPORTATION)?;
        let start_date = required(&self.start_date, "start date")?;
        let start_date = NaiveDate::parse_from_str(&start_date, "%Y-%m-%d")
            .map_err(|_| CustomRequestError::InvalidDate)?;
        let duration = bounded(&self.duration, "duration", MAX_TRIP_DAYS)?;
        let number_of_people = bounded(&self.number_of_people, "number of people", MAX_GROUP_SIZE)?;
        let budget = select(&self.budget, "budget", BUDGETS)?;
        let special_requests = Some(self.special_requests.trim().to_string())
            .filter(|notes| !notes.is_empty());

        Ok(CustomPackageRequest {
            first_name,
            last_name,
            email,
            phone,
            destination: destination.to_string(),
            tour_type: tour_type.to_string(),
            accommodation: accommodation.to_string(),
            transportation: transportation.to_string(),
            start_date,
            duration,
            number_of_people,
            budget: budget.to_string(),
            special_requests,
        })
    }
}

fn required(value: &str, field: &'static str) -> Result<String, CustomRequestError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CustomRequestError::Missing(field));
    }
    Ok(value.to_string())
}

fn select(
    value: &str,
    field: &'static str,
    options: &[Choice],
) -> Result<&'static str, CustomRequestError> {
    let value = required(value, field)?;
    options
        .iter()
        .find(|option| {
            option.value.eq_ignore_ascii_case(&value) || option.label.eq_ignore_ascii_case(&value)
        })
        .map(|option| option.value)
        .ok_or_else(|| CustomRequestError::UnknownChoice {
            field,
            value,
            options: labels(options),
        })
}

fn bounded(value: &str, field: &'static str, max: u32) -> Result<u32, CustomRequestError> {
    let value = required(value, field)?;
    match value.parse::<u32>() {
        Ok(number) if (1..=max).contains(&number) => Ok(number),
        _ => Err(CustomRequestError::OutOfRange { field, max }),
    }
}

/// Display labels of `options`, comma separated.
pub fn labels(options: &[Choice]) -> String {
    options
        .iter()
        .map(|option| option.label)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Body of the custom package request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPackageRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub destination: String,
    pub tour_type: String,
    pub accommodation: String,
    pub transportation: String,
    pub start_date: NaiveDate,
    pub duration: u32,
    pub number_of_people: u32,
    pub budget: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_requests: Option<String>,
}
