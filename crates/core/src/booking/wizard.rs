use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{debug, info, warn};

use crate::{
    api::{ApiError, TourApi},
    models::{BookingReceipt, BookingRequest, RecordId, TourDetail, TourSummary},
};

/// Largest party a single booking accepts.
pub const MAX_PASSENGERS: usize = 20;
/// Oldest age accepted for a passenger.
pub const MAX_AGE: u32 = 120;

/// Steps of the booking flow, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    SelectCount,
    PassengerDetails,
    ReviewConfirm,
    Submitted,
}

impl WizardStep {
    pub const VISIBLE: [WizardStep; 3] = [
        WizardStep::SelectCount,
        WizardStep::PassengerDetails,
        WizardStep::ReviewConfirm,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Self::SelectCount => "Tour Details",
            Self::PassengerDetails => "Passenger Info",
            Self::ReviewConfirm => "Confirm & Pay",
            Self::Submitted => "Booked",
        }
    }
}

/// Details collected for one traveller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Passenger {
    pub name: String,
    pub age: Option<u32>,
}

impl Passenger {
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && self.age.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassengerField {
    Name,
    Age,
}

/// Liveness flag shared between a wizard's owner and its in-flight requests.
///
/// Once abandoned, results that arrive later are discarded instead of being
/// applied to the wizard.
#[derive(Debug, Clone, Default)]
pub struct FlowGuard(Arc<AtomicBool>);

impl FlowGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abandon(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_abandoned(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WizardError {
    #[error("{message}")]
    Api { message: String, source: ApiError },
    #[error("not available on the {} step", .step.title())]
    WrongStep { step: WizardStep },
    #[error("A booking request is already in progress.")]
    Busy,
    #[error("There is no passenger #{}.", .index + 1)]
    NoSuchPassenger { index: usize },
    #[error("Age must be a whole number between 1 and {}.", MAX_AGE)]
    InvalidAge(String),
    #[error("The booking was closed before the request completed.")]
    Abandoned,
}

impl WizardError {
    fn api(source: ApiError, fallback: &str) -> Self {
        Self::Api {
            message: source.user_message(fallback),
            source,
        }
    }
}

/// Three-step booking flow for one tour.
///
/// The total is derived from the per-person price and the passenger list on
/// every read, so it can never reflect a stale count.
#[derive(Debug, Clone)]
pub struct BookingWizard {
    tour_id: RecordId,
    tour: TourSummary,
    step: WizardStep,
    passengers: Vec<Passenger>,
    submitting: bool,
    last_error: Option<String>,
    receipt: Option<BookingReceipt>,
}

impl BookingWizard {
    /// Fetch the tour and start the flow at the first step.
    pub async fn open(
        api: &dyn TourApi,
        tour_id: RecordId,
        guard: &FlowGuard,
    ) -> Result<Self, WizardError> {
        if guard.is_abandoned() {
            return Err(WizardError::Abandoned);
        }
        debug!(%tour_id, "loading tour for booking");
        let detail = api.tour_detail(&tour_id).await;
        if guard.is_abandoned() {
            debug!(%tour_id, "booking closed while tour was loading");
            return Err(WizardError::Abandoned);
        }
        let detail = detail.map_err(|err| {
            warn!(%tour_id, %err, "failed to load tour");
            WizardError::api(err, "Failed to fetch tour details")
        })?;
        Ok(Self::from_detail(tour_id, &detail))
    }

    pub fn from_detail(tour_id: RecordId, detail: &TourDetail) -> Self {
        Self {
            tour_id,
            tour: detail.summary(),
            step: WizardStep::SelectCount,
            passengers: vec![Passenger::default()],
            submitting: false,
            last_error: None,
            receipt: None,
        }
    }

    pub fn tour_id(&self) -> &RecordId {
        &self.tour_id
    }

    pub fn tour(&self) -> &TourSummary {
        &self.tour
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn passengers(&self) -> &[Passenger] {
        &self.passengers
    }

    pub fn passenger_count(&self) -> usize {
        self.passengers.len()
    }

    pub fn total_price(&self) -> f64 {
        self.tour.price_per_person * self.passengers.len() as f64
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Message from the last failed submission, cleared on the next attempt.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn receipt(&self) -> Option<&BookingReceipt> {
        self.receipt.as_ref()
    }

    /// Indices of passengers missing a name or an age.
    pub fn incomplete_passengers(&self) -> Vec<usize> {
        self.passengers
            .iter()
            .enumerate()
            .filter(|(_, passenger)| !passenger.is_complete())
            .map(|(index, _)| index)
            .collect()
    }

    fn ensure_editable(&self) -> Result<(), WizardError> {
        if self.submitting {
            return Err(WizardError::Busy);
        }
        if self.step == WizardStep::Submitted {
            return Err(WizardError::WrongStep { step: self.step });
        }
        Ok(())
    }

    /// Resize the party. Entries below the new size keep their details; new
    /// slots start empty. Returns the count actually applied.
    pub fn set_passenger_count(&mut self, count: usize) -> Result<usize, WizardError> {
        self.ensure_editable()?;
        let count = count.clamp(1, MAX_PASSENGERS);
        self.passengers.resize_with(count, Passenger::default);
        Ok(count)
    }

    /// Edit one field of one passenger. An empty age clears it.
    pub fn set_passenger_field(
        &mut self,
        index: usize,
        field: PassengerField,
        value: &str,
    ) -> Result<(), WizardError> {
        self.ensure_editable()?;
        let age = match field {
            PassengerField::Age => parse_age(value)?,
            PassengerField::Name => None,
        };
        let passenger = self
            .passengers
            .get_mut(index)
            .ok_or(WizardError::NoSuchPassenger { index })?;
        match field {
            PassengerField::Name => passenger.name = value.to_string(),
            PassengerField::Age => passenger.age = age,
        }
        Ok(())
    }

    /// Move to the next step. Passenger details are not required to leave
    /// the details step.
    pub fn advance(&mut self) -> Result<WizardStep, WizardError> {
        self.ensure_editable()?;
        self.step = match self.step {
            WizardStep::SelectCount if !self.passengers.is_empty() => WizardStep::PassengerDetails,
            WizardStep::PassengerDetails => WizardStep::ReviewConfirm,
            step => return Err(WizardError::WrongStep { step }),
        };
        Ok(self.step)
    }

    /// Return to the previous step without discarding anything.
    pub fn back(&mut self) -> Result<WizardStep, WizardError> {
        self.ensure_editable()?;
        self.step = match self.step {
            WizardStep::PassengerDetails => WizardStep::SelectCount,
            WizardStep::ReviewConfirm => WizardStep::PassengerDetails,
            step => return Err(WizardError::WrongStep { step }),
        };
        Ok(self.step)
    }

    /// Request body for the current state. Passenger names and ages stay on
    /// the client.
    pub fn booking_request(&self) -> BookingRequest {
        BookingRequest {
            tour: self.tour_id.clone(),
            travelers_count: self.passengers.len() as u32,
            total_price: self.total_price(),
        }
    }

    /// Mark a submission as pending and return its request body.
    pub fn begin_submission(&mut self) -> Result<BookingRequest, WizardError> {
        if self.submitting {
            return Err(WizardError::Busy);
        }
        if self.step != WizardStep::ReviewConfirm {
            return Err(WizardError::WrongStep { step: self.step });
        }
        self.submitting = true;
        self.last_error = None;
        Ok(self.booking_request())
    }

    /// Apply the outcome of a submission started with [`Self::begin_submission`].
    pub fn finish_submission(
        &mut self,
        result: Result<BookingReceipt, ApiError>,
    ) -> Result<BookingReceipt, WizardError> {
        self.submitting = false;
        match result {
            Ok(receipt) => {
                info!(tour_id = %self.tour_id, booking_id = %receipt.id, "booking created");
                self.step = WizardStep::Submitted;
                self.receipt = Some(receipt.clone());
                Ok(receipt)
            }
            Err(err) => {
                warn!(tour_id = %self.tour_id, %err, "booking failed");
                let err = WizardError::api(err, "Failed to create booking");
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Submit the booking and wait for the server.
    pub async fn submit(
        &mut self,
        api: &dyn TourApi,
        token: &str,
        guard: &FlowGuard,
    ) -> Result<BookingReceipt, WizardError> {
        if guard.is_abandoned() {
            return Err(WizardError::Abandoned);
        }
        let request = self.begin_submission()?;
        info!(
            tour_id = %request.tour,
            travelers = request.travelers_count,
            total = request.total_price,
            "submitting booking"
        );
        let result = api.create_booking(token, &request).await;
        if guard.is_abandoned() {
            debug!("booking closed while submission was in flight");
            return Err(WizardError::Abandoned);
        }
        self.finish_submission(result)
    }
}

fn parse_age(value: &str) -> Result<Option<u32>, WizardError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<u32>() {
        Ok(age) if (1..=MAX_AGE).contains(&age) => Ok(Some(age)),
        _ => Err(WizardError::InvalidAge(value.to_string())),
    }
}
