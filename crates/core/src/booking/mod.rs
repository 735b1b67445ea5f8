#![allow(missing_docs)]

//! Booking flow for a single tour.

mod wizard;

pub use wizard::{
    BookingWizard, FlowGuard, Passenger, PassengerField, WizardError, WizardStep, MAX_AGE,
    MAX_PASSENGERS,
};
