use std::{future::Future, io, sync::Arc, thread, time::Duration};

use anyhow::{Context, Result};
use chrono::Local;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use serde_json::Value;
use tokio::{spawn, sync::mpsc};
use tourbook_core::{
    api::{ApiError, Credentials, ProfileUpdate, Registration, TourApi},
    booking::{BookingWizard, FlowGuard, PassengerField, WizardError, WizardStep, MAX_PASSENGERS},
    catalog::{DurationBucket, TourCatalog},
    custom::{self, Choice, CustomPackageDraft},
    models::{Booking, BookingReceipt, CancellationRequest, RecordId, TourDetail, TourListing},
    session::{Access, AccessDenied, LoginOutcome, Role, SessionError, SessionManager, User},
};
use tracing::{debug, error, info, warn};

use crate::forms::{Form, FormAction, TextField};

const TICK_RATE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
struct Theme {
    primary_fg: Color,
    accent: Color,
    muted: Color,
    selection_bg: Color,
    success: Color,
    warning: Color,
    danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            success: Color::Green,
            warning: Color::Yellow,
            danger: Color::Red,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Browse,
    Filter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Menu,
    Browse,
    Detail,
    Wizard,
    Bookings,
    Profile,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuItem {
    Browse,
    Bookings,
    CustomRequest,
    Profile,
    Admin,
    SignIn,
    Register,
    SignOut,
    Quit,
}

impl MenuItem {
    fn label(&self) -> &'static str {
        match self {
            Self::Browse => "Browse Tours",
            Self::Bookings => "My Bookings",
            Self::CustomRequest => "Custom Tour Request",
            Self::Profile => "Profile",
            Self::Admin => "Admin Area",
            Self::SignIn => "Sign In",
            Self::Register => "Register",
            Self::SignOut => "Sign Out",
            Self::Quit => "Quit",
        }
    }
}

/// Where to go once a login prompted by a protected action succeeds.
#[derive(Debug, Clone)]
enum AfterLogin {
    Book { tour_id: RecordId, title: String },
    Bookings,
    Profile,
    Admin,
}

struct LoginModal {
    form: Form,
    admin: bool,
    then: Option<AfterLogin>,
}

enum Modal {
    Login(LoginModal),
    Register(Form),
    EditProfile(Form),
    CustomRequest(Form),
    ConfirmCancel { booking_id: RecordId, title: String },
}

const LOGIN_EMAIL: usize = 0;
const LOGIN_PASSWORD: usize = 1;

const REG_EMAIL: usize = 0;
const REG_PASSWORD: usize = 1;
const REG_USERNAME: usize = 2;
const REG_FIRST: usize = 3;
const REG_LAST: usize = 4;
const REG_PHONE: usize = 5;

const PROFILE_FIRST: usize = 0;
const PROFILE_LAST: usize = 1;
const PROFILE_EMAIL: usize = 2;
const PROFILE_PHONE: usize = 3;

const CUSTOM_FIRST: usize = 0;
const CUSTOM_LAST: usize = 1;
const CUSTOM_EMAIL: usize = 2;
const CUSTOM_PHONE: usize = 3;
const CUSTOM_DESTINATION: usize = 4;
const CUSTOM_TOUR_TYPE: usize = 5;
const CUSTOM_ACCOMMODATION: usize = 6;
const CUSTOM_TRANSPORT: usize = 7;
const CUSTOM_START: usize = 8;
const CUSTOM_DAYS: usize = 9;
const CUSTOM_PEOPLE: usize = 10;
const CUSTOM_BUDGET: usize = 11;
const CUSTOM_NOTES: usize = 12;

/// Tour page opened from the catalogue before booking.
struct DetailView {
    ticket: u64,
    tour_id: RecordId,
    title: String,
    detail: Option<TourDetail>,
    error: Option<String>,
    scroll: u16,
}

/// Booking flow opened from the catalogue. `ticket` tags the requests it issues.
struct WizardView {
    ticket: u64,
    guard: FlowGuard,
    tour_title: String,
    wizard: Option<BookingWizard>,
    load_error: Option<String>,
    row: usize,
    field: PassengerField,
}

#[derive(Default)]
struct BookingsView {
    ticket: u64,
    bookings: Vec<Booking>,
    loading: bool,
    cursor: usize,
    cancelling: Option<RecordId>,
}

enum AppEvent {
    Input(Event),
    Tick,
    ToursLoaded(Result<usize, ApiError>),
    LoggedIn {
        admin: bool,
        then: Option<AfterLogin>,
        result: Result<LoginOutcome, SessionError>,
    },
    Registered {
        email: String,
        result: Result<Value, SessionError>,
    },
    SessionChecked(Result<bool, SessionError>),
    ProfileSaved(Result<User, SessionError>),
    DetailLoaded {
        ticket: u64,
        result: Result<TourDetail, ApiError>,
    },
    WizardOpened {
        ticket: u64,
        result: Result<BookingWizard, WizardError>,
    },
    BookingSubmitted {
        ticket: u64,
        result: Result<BookingReceipt, ApiError>,
    },
    BookingsLoaded {
        ticket: u64,
        result: Result<Vec<Booking>, ApiError>,
    },
    BookingCancelled {
        booking_id: RecordId,
        result: Result<Value, ApiError>,
    },
    CustomRequested(Result<Value, ApiError>),
}

/// High-level application state for the terminal client.
pub struct TourBookApp {
    api: Arc<dyn TourApi>,
    session: Arc<SessionManager>,
    catalog: TourCatalog,
    base_url: String,
    state: UiState,
    theme: Theme,
    screen: Screen,
    modal: Option<Modal>,
    detail: Option<DetailView>,
    wizard: Option<WizardView>,
    bookings: BookingsView,
    loading_tours: bool,
    next_ticket: u64,
    event_tx: Option<mpsc::Sender<AppEvent>>,
}

impl TourBookApp {
    pub fn new(api: Arc<dyn TourApi>, session: Arc<SessionManager>, base_url: String) -> Self {
        Self {
            api,
            session,
            catalog: TourCatalog::new(),
            base_url,
            state: UiState::default(),
            theme: Theme::default(),
            screen: Screen::Menu,
            modal: None,
            detail: None,
            wizard: None,
            bookings: BookingsView::default(),
            loading_tours: false,
            next_ticket: 0,
            event_tx: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx.clone());
        self.event_tx = Some(event_tx);

        self.state.set_status(match self.session.current_user() {
            Some(user) => format!("Welcome back, {}", user.display_name()),
            None => format!("Connected to {}", self.base_url),
        });
        self.check_session();
        self.refresh_tours();

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.state.should_quit {
                break;
            }

            let maybe_event = event_rx.recv().await;
            if !self.process_app_event(maybe_event) {
                break;
            }

            if self.state.should_quit {
                break;
            }
        }

        if let Some(view) = self.wizard.take() {
            view.guard.abandon();
        }
        restore_terminal(&mut terminal)?;
        self.event_tx = None;
        Ok(())
    }

    fn dispatch<F>(&mut self, task: F) -> bool
    where
        F: Future<Output = AppEvent> + Send + 'static,
    {
        let Some(sender) = self.event_tx.clone() else {
            self.state
                .set_status("Internal error: event channel unavailable");
            error!("event_channel_missing");
            return false;
        };
        spawn(async move {
            let event = task.await;
            let _ = sender.send(event).await;
        });
        true
    }

    fn ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn refresh_tours(&mut self) {
        if self.loading_tours {
            return;
        }
        let api = self.api.clone();
        let catalog = self.catalog.clone();
        self.loading_tours = self.dispatch(async move {
            AppEvent::ToursLoaded(catalog.refresh(api.as_ref()).await)
        });
        if self.loading_tours {
            self.state.set_status("Loading tours…");
        }
    }

    /// Revalidate a restored token in the background.
    fn check_session(&mut self) {
        if self.session.token().is_none() {
            return;
        }
        let session = self.session.clone();
        self.dispatch(async move { AppEvent::SessionChecked(session.refresh_current_user().await) });
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(event)) => {
                if let Event::Key(key) = &event {
                    if key.kind == KeyEventKind::Release {
                        return true;
                    }
                }
                if let Err(err) = self.handle_input(event) {
                    self.state.set_status(format!("Error: {err}"));
                }
            }
            Some(AppEvent::Tick) => self.handle_tick(),
            Some(AppEvent::ToursLoaded(result)) => self.on_tours_loaded(result),
            Some(AppEvent::LoggedIn {
                admin,
                then,
                result,
            }) => self.on_logged_in(admin, then, result),
            Some(AppEvent::Registered { email, result }) => self.on_registered(email, result),
            Some(AppEvent::SessionChecked(result)) => self.on_session_checked(result),
            Some(AppEvent::ProfileSaved(result)) => self.on_profile_saved(result),
            Some(AppEvent::DetailLoaded { ticket, result }) => self.on_detail_loaded(ticket, result),
            Some(AppEvent::WizardOpened { ticket, result }) => self.on_wizard_opened(ticket, result),
            Some(AppEvent::BookingSubmitted { ticket, result }) => {
                self.on_booking_submitted(ticket, result)
            }
            Some(AppEvent::BookingsLoaded { ticket, result }) => {
                self.on_bookings_loaded(ticket, result)
            }
            Some(AppEvent::BookingCancelled { booking_id, result }) => {
                self.on_booking_cancelled(booking_id, result)
            }
            Some(AppEvent::CustomRequested(result)) => self.on_custom_requested(result),
            None => return false,
        }
        true
    }

    fn handle_tick(&mut self) {
        if self.screen == Screen::Browse && self.state.mode == Mode::Filter {
            self.state
                .set_status(format!("Filter: {}", self.state.filter));
        }
    }

    fn on_tours_loaded(&mut self, result: Result<usize, ApiError>) {
        self.loading_tours = false;
        match result {
            Ok(count) => {
                self.state.apply_filter(&self.catalog);
                self.state.set_status(format!("Loaded {count} tours"));
            }
            Err(err) => {
                error!(%err, "tour listing failed");
                self.state
                    .set_status(err.user_message("Failed to fetch tours"));
            }
        }
    }

    fn on_logged_in(
        &mut self,
        admin: bool,
        then: Option<AfterLogin>,
        result: Result<LoginOutcome, SessionError>,
    ) {
        let modal_open = matches!(self.modal, Some(Modal::Login(_)));
        match result {
            Ok(outcome) => {
                if modal_open {
                    self.modal = None;
                }
                match outcome.user {
                    Some(user) => {
                        info!(user_id = %user.id, admin, "signed in");
                        self.state
                            .set_status(format!("Welcome, {}", user.display_name()));
                        if let Some(then) = then.filter(|_| modal_open) {
                            self.resume(then);
                        }
                    }
                    None => {
                        self.state.set_status(
                            "Signed in, but your profile could not be loaded. Press r on the Profile screen to retry.",
                        );
                    }
                }
            }
            Err(SessionError::Superseded) => {
                debug!("login superseded");
            }
            Err(err) => {
                warn!(%err, admin, "sign in failed");
                match self.modal.as_mut() {
                    Some(Modal::Login(login)) => {
                        login.form.pending = false;
                        login.form.message = Some(err.to_string());
                    }
                    _ => self.state.set_status(err.to_string()),
                }
            }
        }
    }

    fn on_registered(&mut self, email: String, result: Result<Value, SessionError>) {
        let Some(Modal::Register(form)) = self.modal.as_mut() else {
            if result.is_ok() {
                self.state.set_status("Registration successful. Please sign in.");
            }
            return;
        };
        match result {
            Ok(_) => {
                info!(%email, "account registered");
                self.modal = Some(Modal::Login(LoginModal {
                    form: login_form(&email)
                        .with_message("Registration successful. Please sign in."),
                    admin: false,
                    then: None,
                }));
            }
            Err(err) => {
                form.pending = false;
                form.message = Some(err.to_string());
            }
        }
    }

    fn on_session_checked(&mut self, result: Result<bool, SessionError>) {
        match result {
            Ok(true) => {
                if let Some(user) = self.session.current_user() {
                    debug!(user_id = %user.id, "session confirmed");
                }
            }
            Ok(false) => {
                self.leave_protected_screen();
                self.state
                    .set_status("Your session has expired. Please sign in again.");
            }
            Err(SessionError::Superseded) => {}
            Err(err) => {
                warn!(%err, "session check failed");
                self.state
                    .set_status(format!("Could not verify your session: {err}"));
            }
        }
    }

    fn on_profile_saved(&mut self, result: Result<User, SessionError>) {
        match result {
            Ok(user) => {
                if matches!(self.modal, Some(Modal::EditProfile(_))) {
                    self.modal = None;
                }
                info!(user_id = %user.id, "profile updated");
                self.state.set_status("Profile updated");
            }
            Err(SessionError::Superseded) => {}
            Err(err) => match self.modal.as_mut() {
                Some(Modal::EditProfile(form)) => {
                    form.pending = false;
                    form.message = Some(err.to_string());
                }
                _ => self.state.set_status(err.to_string()),
            },
        }
    }

    fn on_detail_loaded(&mut self, ticket: u64, result: Result<TourDetail, ApiError>) {
        let Some(view) = self.detail.as_mut().filter(|view| view.ticket == ticket) else {
            debug!(ticket, "dropping tour detail for a closed page");
            return;
        };
        match result {
            Ok(detail) => {
                view.title = detail.title.clone();
                view.detail = Some(detail);
                view.error = None;
                self.state.set_status("Press Enter to book this tour");
            }
            Err(err) => {
                warn!(tour_id = %view.tour_id, %err, "tour detail failed");
                let message = err.user_message("Failed to fetch tour details");
                view.error = Some(message.clone());
                self.state.set_status(message);
            }
        }
    }

    fn live_wizard(&mut self, ticket: u64) -> Option<&mut WizardView> {
        self.wizard
            .as_mut()
            .filter(|view| view.ticket == ticket && !view.guard.is_abandoned())
    }

    fn on_wizard_opened(&mut self, ticket: u64, result: Result<BookingWizard, WizardError>) {
        let Some(view) = self.live_wizard(ticket) else {
            debug!(ticket, "dropping tour load for a closed booking");
            return;
        };
        match result {
            Ok(wizard) => {
                view.tour_title = wizard.tour().title.clone();
                view.wizard = Some(wizard);
                self.state
                    .set_status("Choose the number of passengers");
            }
            Err(WizardError::Abandoned) => {}
            Err(err) => {
                view.load_error = Some(err.to_string());
                self.state.set_status(err.to_string());
            }
        }
    }

    fn on_booking_submitted(&mut self, ticket: u64, result: Result<BookingReceipt, ApiError>) {
        let expired = matches!(&result, Err(err) if err.is_unauthorized());
        let Some(wizard) = self
            .live_wizard(ticket)
            .and_then(|view| view.wizard.as_mut())
        else {
            debug!(ticket, "dropping booking result for a closed booking");
            return;
        };
        match wizard.finish_submission(result) {
            Ok(receipt) => {
                self.state.set_status(format!(
                    "Booking #{} confirmed! Payment is completed outside this client.",
                    receipt.id
                ));
            }
            Err(err) => self.state.set_status(err.to_string()),
        }
        if expired {
            self.check_session();
        }
    }

    fn on_bookings_loaded(&mut self, ticket: u64, result: Result<Vec<Booking>, ApiError>) {
        if ticket != self.bookings.ticket {
            debug!(ticket, "dropping stale bookings listing");
            return;
        }
        self.bookings.loading = false;
        match result {
            Ok(bookings) => {
                self.state
                    .set_status(format!("{} bookings", bookings.len()));
                self.bookings.bookings = bookings;
                self.bookings.cursor = self
                    .bookings
                    .cursor
                    .min(self.bookings.bookings.len().saturating_sub(1));
            }
            Err(err) => {
                error!(%err, "bookings listing failed");
                self.state
                    .set_status(err.user_message("Failed to fetch bookings"));
                if err.is_unauthorized() {
                    self.check_session();
                }
            }
        }
    }

    fn on_booking_cancelled(&mut self, booking_id: RecordId, result: Result<Value, ApiError>) {
        if self.bookings.cancelling.as_ref() == Some(&booking_id) {
            self.bookings.cancelling = None;
        }
        match result {
            Ok(_) => {
                info!(%booking_id, "cancellation requested");
                self.state.set_status(format!(
                    "Cancellation requested for booking #{booking_id}"
                ));
                if self.screen == Screen::Bookings {
                    self.load_bookings();
                }
            }
            Err(err) => {
                error!(%booking_id, %err, "cancellation failed");
                self.state
                    .set_status(err.user_message("Failed to cancel booking"));
            }
        }
    }

    fn on_custom_requested(&mut self, result: Result<Value, ApiError>) {
        match result {
            Ok(created) => {
                info!(request_id = %created.get("id").unwrap_or(&serde_json::Value::Null), "custom tour requested");
                if matches!(self.modal, Some(Modal::CustomRequest(_))) {
                    self.modal = None;
                }
                self.state.set_status(
                    "Your custom tour request has been submitted! We will contact you soon.",
                );
            }
            Err(err) => {
                error!(%err, "custom tour request failed");
                let message = err.user_message("Failed to submit request. Please try again.");
                match self.modal.as_mut() {
                    Some(Modal::CustomRequest(form)) => {
                        form.pending = false;
                        form.message = Some(message);
                    }
                    _ => self.state.set_status(message),
                }
            }
        }
    }

    fn leave_protected_screen(&mut self) {
        if matches!(
            self.screen,
            Screen::Bookings | Screen::Profile | Screen::Admin | Screen::Wizard
        ) {
            self.close_wizard();
            self.screen = Screen::Menu;
        }
        self.bookings = BookingsView::default();
    }

    fn handle_input(&mut self, event: Event) -> Result<()> {
        let Event::Key(key) = event else {
            return Ok(());
        };
        if key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('c') {
            self.state.should_quit = true;
            return Ok(());
        }
        if self.modal.is_some() {
            self.handle_modal_key(key);
            return Ok(());
        }
        match self.screen {
            Screen::Menu => self.handle_menu_key(key),
            Screen::Browse => match self.state.mode {
                Mode::Filter => self.handle_filter_key(key),
                Mode::Browse => self.handle_browse_key(key),
            },
            Screen::Detail => self.handle_detail_key(key),
            Screen::Wizard => self.handle_wizard_key(key),
            Screen::Bookings => self.handle_bookings_key(key),
            Screen::Profile => self.handle_profile_key(key),
            Screen::Admin => self.handle_admin_key(key),
        }
        Ok(())
    }

    fn menu_items(&self) -> Vec<MenuItem> {
        let mut items = vec![
            MenuItem::Browse,
            MenuItem::Bookings,
            MenuItem::CustomRequest,
            MenuItem::Profile,
            MenuItem::Admin,
        ];
        if self.session.token().is_some() {
            items.push(MenuItem::SignOut);
        } else {
            items.push(MenuItem::SignIn);
            items.push(MenuItem::Register);
        }
        items.push(MenuItem::Quit);
        items
    }

    fn handle_menu_key(&mut self, key: KeyEvent) {
        let items = self.menu_items();
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.state.should_quit = true;
            }
            KeyCode::Char('j') | KeyCode::Down => self.state.move_menu_cursor(1, items.len()),
            KeyCode::Char('k') | KeyCode::Up => self.state.move_menu_cursor(-1, items.len()),
            KeyCode::Enter => {
                let Some(item) = items.get(self.state.menu_cursor).copied() else {
                    return;
                };
                match item {
                    MenuItem::Browse => {
                        self.screen = Screen::Browse;
                        self.state.mode = Mode::Browse;
                        if !self.catalog.is_loaded() {
                            self.refresh_tours();
                        } else {
                            self.state.set_status("Select a tour to book");
                        }
                    }
                    MenuItem::Bookings => self.open_bookings(),
                    MenuItem::CustomRequest => self.open_custom_request(),
                    MenuItem::Profile => self.open_profile(),
                    MenuItem::Admin => self.open_admin(),
                    MenuItem::SignIn => self.open_login(false, None, None),
                    MenuItem::Register => self.open_register(),
                    MenuItem::SignOut => {
                        self.session.logout();
                        self.leave_protected_screen();
                        self.state.menu_cursor = 0;
                        self.state.set_status("Signed out");
                    }
                    MenuItem::Quit => self.state.should_quit = true,
                }
            }
            _ => {}
        }
    }

    fn handle_filter_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.state.mode = Mode::Browse;
                self.state.set_status("Filter cancelled");
            }
            KeyCode::Enter => {
                self.state.mode = Mode::Browse;
                self.state
                    .set_status(format!("Filter applied: {}", self.state.filter));
            }
            KeyCode::Backspace => {
                self.state.filter.pop();
                self.state.apply_filter(&self.catalog);
            }
            KeyCode::Char(c) => {
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
                    self.state.filter.push(c);
                    self.state.apply_filter(&self.catalog);
                }
            }
            _ => {}
        }
    }

    fn handle_browse_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') if key.modifiers.is_empty() => self.state.should_quit = true,
            KeyCode::Esc => {
                self.screen = Screen::Menu;
                self.state.set_status("Returned to main menu");
            }
            KeyCode::Char('j') | KeyCode::Down => self.state.move_cursor(1),
            KeyCode::Char('k') | KeyCode::Up => self.state.move_cursor(-1),
            KeyCode::Char('g') if key.modifiers.is_empty() => self.state.move_to(0),
            KeyCode::Char('G') if key.modifiers.is_empty() => self.state.move_to_end(),
            KeyCode::Home => self.state.move_to(0),
            KeyCode::End => self.state.move_to_end(),
            KeyCode::PageDown => self.state.page_down(),
            KeyCode::PageUp => self.state.page_up(),
            KeyCode::Char('/') => {
                self.state.mode = Mode::Filter;
                self.state.set_status("Enter filter text");
            }
            KeyCode::Char('d') if key.modifiers.is_empty() => {
                self.state.bucket = self.state.bucket.cycle();
                self.state.apply_filter(&self.catalog);
                self.state.set_status(format!(
                    "Duration: {} ({} tours)",
                    self.state.bucket,
                    self.state.filtered.len()
                ));
            }
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.refresh_tours();
            }
            KeyCode::Enter | KeyCode::Char('b') if key.modifiers.is_empty() => {
                let Some(tour) = self.state.current_tour().cloned() else {
                    self.state.set_status("No tour selected");
                    return;
                };
                if key.code == KeyCode::Enter {
                    self.open_detail(tour.id, tour.title);
                } else {
                    self.start_booking(tour.id, tour.title);
                }
            }
            _ => {}
        }
    }

    fn open_detail(&mut self, tour_id: RecordId, title: String) {
        let ticket = self.ticket();
        let api = self.api.clone();
        let task_tour = tour_id.clone();
        let dispatched = self.dispatch(async move {
            let result = api.tour_detail(&task_tour).await;
            AppEvent::DetailLoaded { ticket, result }
        });
        if !dispatched {
            return;
        }
        debug!(%tour_id, ticket, "opening tour page");
        self.state.set_status(format!("Loading {title}…"));
        self.detail = Some(DetailView {
            ticket,
            tour_id,
            title,
            detail: None,
            error: None,
            scroll: 0,
        });
        self.screen = Screen::Detail;
    }

    fn handle_detail_key(&mut self, key: KeyEvent) {
        let Some(view) = self.detail.as_mut() else {
            self.screen = Screen::Browse;
            return;
        };
        match key.code {
            KeyCode::Esc => {
                self.detail = None;
                self.screen = Screen::Browse;
                self.state.set_status("Select a tour to book");
            }
            KeyCode::Char('j') | KeyCode::Down => view.scroll = view.scroll.saturating_add(1),
            KeyCode::Char('k') | KeyCode::Up => view.scroll = view.scroll.saturating_sub(1),
            KeyCode::PageDown => view.scroll = view.scroll.saturating_add(10),
            KeyCode::PageUp => view.scroll = view.scroll.saturating_sub(10),
            KeyCode::Char('r') if view.detail.is_none() => {
                let (tour_id, title) = (view.tour_id.clone(), view.title.clone());
                self.open_detail(tour_id, title);
            }
            KeyCode::Enter | KeyCode::Char('b') => {
                let (tour_id, title) = (view.tour_id.clone(), view.title.clone());
                match view.detail.as_ref() {
                    Some(detail) if self.session.require_login("book a tour").is_ok() => {
                        let wizard = BookingWizard::from_detail(tour_id, detail);
                        self.show_wizard(wizard);
                    }
                    _ => self.start_booking(tour_id, title),
                }
            }
            _ => {}
        }
    }

    fn prompt_login(&mut self, denied: AccessDenied, then: AfterLogin, admin: bool) {
        match denied {
            AccessDenied::LoginRequired { .. } => {
                self.open_login(admin, Some(then), Some(denied.to_string()));
            }
            AccessDenied::Forbidden { role, .. } => {
                warn!(%role, "access denied");
                self.screen = Screen::Menu;
                self.state.set_status(denied.to_string());
            }
        }
    }

    fn resume(&mut self, then: AfterLogin) {
        match then {
            AfterLogin::Book { tour_id, title } => self.start_booking(tour_id, title),
            AfterLogin::Bookings => self.open_bookings(),
            AfterLogin::Profile => self.open_profile(),
            AfterLogin::Admin => self.open_admin(),
        }
    }

    fn open_login(&mut self, admin: bool, then: Option<AfterLogin>, message: Option<String>) {
        let mut form = login_form("");
        form.message = message;
        self.modal = Some(Modal::Login(LoginModal { form, admin, then }));
    }

    fn open_register(&mut self) {
        let form = Form::new(
            "Create Account",
            vec![
                TextField::new("Email"),
                TextField::new("Password").masked(),
                TextField::new("Username"),
                TextField::new("First name"),
                TextField::new("Last name"),
                TextField::new("Phone"),
            ],
        );
        self.modal = Some(Modal::Register(form));
    }

    fn open_custom_request(&mut self) {
        let user = self.session.current_user();
        let prefill = |value: Option<&str>| value.unwrap_or_default().to_string();
        let first = prefill(user.as_ref().map(|user| user.first_name.as_str()));
        let last = prefill(user.as_ref().map(|user| user.last_name.as_str()));
        let email = prefill(user.as_ref().map(|user| user.email.as_str()));
        let phone = prefill(user.as_ref().and_then(|user| user.phone.as_deref()));
        let form = Form::new(
            "Custom Tour Request",
            vec![
                TextField::new("First name").with_value(&first),
                TextField::new("Last name").with_value(&last),
                TextField::new("Email").with_value(&email),
                TextField::new("Phone").with_value(&phone),
                TextField::new("Destination"),
                TextField::new("Tour type"),
                TextField::new("Accommodation"),
                TextField::new("Transport"),
                TextField::new("Start date"),
                TextField::new("Days"),
                TextField::new("People"),
                TextField::new("Budget"),
                TextField::new("Requests"),
            ],
        )
        .with_message("Tell us about your dream trip.");
        self.modal = Some(Modal::CustomRequest(form));
    }

    fn open_bookings(&mut self) {
        match self.session.require_login("view your bookings") {
            Ok(_) => {
                self.screen = Screen::Bookings;
                self.load_bookings();
            }
            Err(denied) => self.prompt_login(denied, AfterLogin::Bookings, false),
        }
    }

    fn open_profile(&mut self) {
        match self.session.require_login("view your profile") {
            Ok(user) => {
                self.screen = Screen::Profile;
                self.state
                    .set_status(format!("Signed in as {}", user.email));
            }
            Err(denied) => self.prompt_login(denied, AfterLogin::Profile, false),
        }
    }

    fn open_admin(&mut self) {
        match self.session.authorize(Access::Admin) {
            Ok(user) => {
                info!(user_id = %user.id, "entered admin area");
                self.screen = Screen::Admin;
                self.state.set_status("Admin area");
            }
            Err(denied) => self.prompt_login(denied, AfterLogin::Admin, true),
        }
    }

    fn start_booking(&mut self, tour_id: RecordId, title: String) {
        if let Err(denied) = self.session.require_login("book a tour") {
            self.prompt_login(denied, AfterLogin::Book { tour_id, title }, false);
            return;
        }
        self.close_wizard();

        let ticket = self.ticket();
        let guard = FlowGuard::new();
        let api = self.api.clone();
        let task_guard = guard.clone();
        let task_tour = tour_id.clone();
        let dispatched = self.dispatch(async move {
            let result = BookingWizard::open(api.as_ref(), task_tour, &task_guard).await;
            AppEvent::WizardOpened { ticket, result }
        });
        if !dispatched {
            return;
        }
        info!(%tour_id, ticket, "opening booking");
        self.wizard = Some(WizardView {
            ticket,
            guard,
            tour_title: title.clone(),
            wizard: None,
            load_error: None,
            row: 0,
            field: PassengerField::Name,
        });
        self.screen = Screen::Wizard;
        self.state.set_status(format!("Loading {title}…"));
    }

    /// Enter the booking flow with a tour that is already loaded.
    fn show_wizard(&mut self, wizard: BookingWizard) {
        self.close_wizard();
        let ticket = self.ticket();
        info!(tour_id = %wizard.tour_id(), ticket, "opening booking");
        self.wizard = Some(WizardView {
            ticket,
            guard: FlowGuard::new(),
            tour_title: wizard.tour().title.clone(),
            wizard: Some(wizard),
            load_error: None,
            row: 0,
            field: PassengerField::Name,
        });
        self.screen = Screen::Wizard;
        self.state.set_status("Choose the number of passengers");
    }

    fn close_wizard(&mut self) {
        if let Some(view) = self.wizard.take() {
            debug!(ticket = view.ticket, "closing booking");
            view.guard.abandon();
        }
    }

    fn leave_wizard(&mut self, status: &str) {
        self.close_wizard();
        self.screen = Screen::Browse;
        self.state.set_status(status);
    }

    fn handle_wizard_key(&mut self, key: KeyEvent) {
        let Some(view) = self.wizard.as_mut() else {
            self.screen = Screen::Browse;
            return;
        };
        let Some(wizard) = view.wizard.as_mut() else {
            if key.code == KeyCode::Esc {
                self.leave_wizard("Booking closed");
            }
            return;
        };

        let outcome: Result<(), WizardError> = match wizard.step() {
            WizardStep::SelectCount => match key.code {
                KeyCode::Esc => {
                    self.leave_wizard("Booking closed");
                    return;
                }
                KeyCode::Left | KeyCode::Char('-') => {
                    let count = wizard.passenger_count().saturating_sub(1);
                    wizard.set_passenger_count(count).map(|_| ())
                }
                KeyCode::Right | KeyCode::Char('+') => {
                    let count = wizard.passenger_count() + 1;
                    wizard.set_passenger_count(count).map(|_| ())
                }
                KeyCode::Enter => wizard.advance().map(|_| {
                    view.row = 0;
                    view.field = PassengerField::Name;
                }),
                _ => Ok(()),
            },
            WizardStep::PassengerDetails => match key.code {
                KeyCode::Esc => wizard.back().map(|_| ()),
                KeyCode::Up => {
                    view.row = view.row.saturating_sub(1);
                    Ok(())
                }
                KeyCode::Down => {
                    view.row = (view.row + 1).min(wizard.passenger_count().saturating_sub(1));
                    Ok(())
                }
                KeyCode::Tab | KeyCode::BackTab => {
                    view.field = match view.field {
                        PassengerField::Name => PassengerField::Age,
                        PassengerField::Age => PassengerField::Name,
                    };
                    Ok(())
                }
                KeyCode::Backspace => {
                    let mut text = passenger_text(wizard, view.row, view.field);
                    text.pop();
                    wizard.set_passenger_field(view.row, view.field, &text)
                }
                KeyCode::Char(ch)
                    if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT =>
                {
                    if view.field == PassengerField::Age && !ch.is_ascii_digit() {
                        Ok(())
                    } else {
                        let mut text = passenger_text(wizard, view.row, view.field);
                        text.push(ch);
                        wizard.set_passenger_field(view.row, view.field, &text)
                    }
                }
                KeyCode::Enter => {
                    let missing = wizard.incomplete_passengers().len();
                    wizard.advance().map(|_| {
                        if missing > 0 {
                            self.state.set_status(format!(
                                "{missing} passenger(s) have missing details"
                            ));
                        }
                    })
                }
                _ => Ok(()),
            },
            WizardStep::ReviewConfirm => match key.code {
                KeyCode::Esc => wizard.back().map(|_| ()),
                KeyCode::Enter => {
                    self.submit_booking();
                    return;
                }
                _ => Ok(()),
            },
            WizardStep::Submitted => match key.code {
                KeyCode::Enter => {
                    self.close_wizard();
                    self.open_bookings();
                    return;
                }
                KeyCode::Esc => {
                    self.leave_wizard("Select a tour to book");
                    return;
                }
                _ => Ok(()),
            },
        };

        if let Err(err) = outcome {
            self.state.set_status(err.to_string());
        }
    }

    fn submit_booking(&mut self) {
        let Some(token) = self.session.token() else {
            if let Err(denied) = self.session.require_login("book a tour") {
                self.state.set_status(denied.to_string());
            }
            return;
        };
        let Some(view) = self.wizard.as_mut() else {
            return;
        };
        let ticket = view.ticket;
        let Some(wizard) = view.wizard.as_mut() else {
            return;
        };
        let request = match wizard.begin_submission() {
            Ok(request) => request,
            Err(err) => {
                self.state.set_status(err.to_string());
                return;
            }
        };
        info!(
            tour_id = %request.tour,
            travelers = request.travelers_count,
            total = request.total_price,
            ticket,
            "submitting booking"
        );
        let api = self.api.clone();
        self.state.set_status("Submitting booking…");
        self.dispatch(async move {
            let result = api.create_booking(&token, &request).await;
            AppEvent::BookingSubmitted { ticket, result }
        });
    }

    fn load_bookings(&mut self) {
        let Some(token) = self.session.token() else {
            return;
        };
        let ticket = self.ticket();
        self.bookings.ticket = ticket;
        self.bookings.loading = true;
        let api = self.api.clone();
        self.state.set_status("Loading bookings…");
        self.dispatch(async move {
            let result = api.list_bookings(&token).await;
            AppEvent::BookingsLoaded { ticket, result }
        });
    }

    fn handle_bookings_key(&mut self, key: KeyEvent) {
        let total = self.bookings.bookings.len();
        match key.code {
            KeyCode::Esc => {
                self.screen = Screen::Menu;
                self.state.set_status("Returned to main menu");
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.bookings.cursor = step_index(self.bookings.cursor, 1, total);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.bookings.cursor = step_index(self.bookings.cursor, -1, total);
            }
            KeyCode::Char('r') => self.load_bookings(),
            KeyCode::Char('c') => {
                let Some(booking) = self.bookings.bookings.get(self.bookings.cursor) else {
                    self.state.set_status("No booking selected");
                    return;
                };
                if self.bookings.cancelling.is_some() {
                    self.state
                        .set_status("A cancellation is already in progress");
                } else if !booking.status.is_cancellable() {
                    self.state.set_status(format!(
                        "{} bookings cannot be cancelled",
                        booking.status.label()
                    ));
                } else {
                    self.modal = Some(Modal::ConfirmCancel {
                        booking_id: booking.id.clone(),
                        title: booking.tour_title(),
                    });
                }
            }
            _ => {}
        }
    }

    fn cancel_booking(&mut self, booking_id: RecordId) {
        let Some(token) = self.session.token() else {
            self.state.set_status("Please sign in again");
            return;
        };
        let request = CancellationRequest::for_booking(booking_id.clone(), Local::now().date_naive());
        let api = self.api.clone();
        self.bookings.cancelling = Some(booking_id.clone());
        self.state
            .set_status(format!("Cancelling booking #{booking_id}…"));
        self.dispatch(async move {
            let result = api.cancel_booking(&token, &request).await;
            AppEvent::BookingCancelled { booking_id, result }
        });
    }

    fn handle_profile_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.screen = Screen::Menu;
                self.state.set_status("Returned to main menu");
            }
            KeyCode::Char('e') => {
                let Some(user) = self.session.current_user() else {
                    self.state
                        .set_status("Profile not loaded yet. Press r to retry.");
                    return;
                };
                let form = Form::new(
                    "Edit Profile",
                    vec![
                        TextField::new("First name").with_value(&user.first_name),
                        TextField::new("Last name").with_value(&user.last_name),
                        TextField::new("Email").with_value(&user.email),
                        TextField::new("Phone").with_value(user.phone.as_deref().unwrap_or("")),
                    ],
                );
                self.modal = Some(Modal::EditProfile(form));
            }
            KeyCode::Char('r') => {
                self.state.set_status("Refreshing profile…");
                self.check_session();
            }
            _ => {}
        }
    }

    fn handle_admin_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.screen = Screen::Menu;
                self.state.set_status("Returned to main menu");
            }
            KeyCode::Char('r') => self.refresh_tours(),
            _ => {}
        }
    }

    fn handle_modal_key(&mut self, key: KeyEvent) {
        let Some(modal) = self.modal.as_mut() else {
            return;
        };
        match modal {
            Modal::Login(login) => {
                if key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('a') {
                    login.admin = !login.admin;
                    return;
                }
                match login.form.handle_key(key) {
                    FormAction::Cancel => {
                        self.modal = None;
                        self.state.set_status("Sign in cancelled");
                    }
                    FormAction::Submit => self.submit_login(),
                    FormAction::Editing => {}
                }
            }
            Modal::Register(form) => match form.handle_key(key) {
                FormAction::Cancel => {
                    self.modal = None;
                    self.state.set_status("Registration cancelled");
                }
                FormAction::Submit => self.submit_registration(),
                FormAction::Editing => {}
            },
            Modal::EditProfile(form) => match form.handle_key(key) {
                FormAction::Cancel => self.modal = None,
                FormAction::Submit => self.submit_profile(),
                FormAction::Editing => {}
            },
            Modal::CustomRequest(form) => match form.handle_key(key) {
                FormAction::Cancel => {
                    self.modal = None;
                    self.state.set_status("Custom tour request discarded");
                }
                FormAction::Submit => self.submit_custom_request(),
                FormAction::Editing => {}
            },
            Modal::ConfirmCancel { booking_id, .. } => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    let booking_id = booking_id.clone();
                    self.modal = None;
                    self.cancel_booking(booking_id);
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.modal = None;
                    self.state.set_status("Cancellation aborted");
                }
                _ => {}
            },
        }
    }

    fn submit_login(&mut self) {
        let Some(Modal::Login(login)) = self.modal.as_mut() else {
            return;
        };
        let credentials = Credentials::new(
            login.form.value(LOGIN_EMAIL),
            login.form.raw(LOGIN_PASSWORD),
        );
        if credentials.email.is_empty() || credentials.password.is_empty() {
            login.form.message = Some("Please enter your email and password.".into());
            return;
        }
        login.form.pending = true;
        login.form.message = Some("Signing in…".into());
        let admin = login.admin;
        let then = login.then.clone();
        let session = self.session.clone();
        self.dispatch(async move {
            let result = if admin {
                session.admin_login(&credentials).await
            } else {
                session.login(&credentials).await
            };
            AppEvent::LoggedIn {
                admin,
                then,
                result,
            }
        });
    }

    fn submit_registration(&mut self) {
        let Some(Modal::Register(form)) = self.modal.as_mut() else {
            return;
        };
        let registration = Registration {
            email: form.value(REG_EMAIL),
            password: form.raw(REG_PASSWORD),
            username: form.value(REG_USERNAME),
            first_name: form.value(REG_FIRST),
            last_name: form.value(REG_LAST),
            phone: form.optional(REG_PHONE),
            ..Registration::default()
        };
        form.pending = true;
        form.message = Some("Creating account…".into());
        let email = registration.email.clone();
        let session = self.session.clone();
        self.dispatch(async move {
            let result = session.register(&registration).await;
            AppEvent::Registered { email, result }
        });
    }

    fn submit_profile(&mut self) {
        let Some(Modal::EditProfile(form)) = self.modal.as_mut() else {
            return;
        };
        let Some(current) = self.session.current_user() else {
            form.message = Some("Profile not loaded yet. Close this form and press r to retry.".into());
            return;
        };
        let update = ProfileUpdate::from_edits(
            &current,
            &form.raw(PROFILE_FIRST),
            &form.raw(PROFILE_LAST),
            &form.raw(PROFILE_EMAIL),
            &form.raw(PROFILE_PHONE),
        );
        if update.is_empty() {
            self.modal = None;
            self.state.set_status("Nothing to update");
            return;
        }
        form.pending = true;
        form.message = Some("Saving…".into());
        let session = self.session.clone();
        self.dispatch(async move { AppEvent::ProfileSaved(session.update_profile(&update).await) });
    }

    fn submit_custom_request(&mut self) {
        let Some(Modal::CustomRequest(form)) = self.modal.as_mut() else {
            return;
        };
        let draft = CustomPackageDraft {
            first_name: form.raw(CUSTOM_FIRST),
            last_name: form.raw(CUSTOM_LAST),
            email: form.raw(CUSTOM_EMAIL),
            phone: form.raw(CUSTOM_PHONE),
            destination: form.raw(CUSTOM_DESTINATION),
            tour_type: form.raw(CUSTOM_TOUR_TYPE),
            accommodation: form.raw(CUSTOM_ACCOMMODATION),
            transportation: form.raw(CUSTOM_TRANSPORT),
            start_date: form.raw(CUSTOM_START),
            duration: form.raw(CUSTOM_DAYS),
            number_of_people: form.raw(CUSTOM_PEOPLE),
            budget: form.raw(CUSTOM_BUDGET),
            special_requests: form.raw(CUSTOM_NOTES),
        };
        let request = match draft.validate() {
            Ok(request) => request,
            Err(err) => {
                form.message = Some(err.to_string());
                return;
            }
        };
        form.pending = true;
        form.message = Some("Submitting…".into());
        info!(destination = %request.destination, people = request.number_of_people, "requesting custom tour");
        let api = self.api.clone();
        let token = self.session.token();
        self.dispatch(async move {
            AppEvent::CustomRequested(api.request_custom_package(token.as_deref(), &request).await)
        });
    }

    fn draw(&mut self, frame: &mut Frame) {
        let size = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(5),
                Constraint::Length(3),
            ])
            .split(size);

        self.render_header(frame, chunks[0]);
        match self.screen {
            Screen::Menu => self.draw_menu(frame, chunks[1]),
            Screen::Browse => self.draw_browse(frame, chunks[1]),
            Screen::Detail => self.draw_detail(frame, chunks[1]),
            Screen::Wizard => self.draw_wizard(frame, chunks[1]),
            Screen::Bookings => self.draw_bookings(frame, chunks[1]),
            Screen::Profile => self.draw_profile(frame, chunks[1]),
            Screen::Admin => self.draw_admin(frame, chunks[1]),
        }
        self.render_status(frame, chunks[2]);

        match &self.modal {
            Some(Modal::Login(login)) => {
                let hint = if login.admin {
                    "Admin sign in · Ctrl+A customer"
                } else {
                    "Ctrl+A admin sign in"
                };
                self.render_form(frame, &login.form, hint);
            }
            Some(Modal::Register(form)) | Some(Modal::EditProfile(form)) => {
                self.render_form(frame, form, "")
            }
            Some(Modal::CustomRequest(form)) => {
                let hint = custom_field_hint(form.focus);
                self.render_form(frame, form, &hint)
            }
            Some(Modal::ConfirmCancel { booking_id, title }) => {
                self.render_confirm(frame, booking_id, title)
            }
            None => {}
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let session = self.session.snapshot();
        let who = match session.user() {
            Some(user) => Span::styled(
                format!("{} ({})", user.display_name(), user.role),
                Style::default().fg(self.theme.success),
            ),
            None if session.is_degraded() => Span::styled(
                "Signed in (profile unavailable)",
                Style::default().fg(self.theme.warning),
            ),
            None => Span::styled("Not signed in", Style::default().fg(self.theme.muted)),
        };
        let line = Line::from(vec![
            Span::styled(
                " TourBook ",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled("· ", Style::default().fg(self.theme.muted)),
            who,
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_menu(&mut self, frame: &mut Frame, area: Rect) {
        let items = self.menu_items();
        if self.state.menu_cursor >= items.len() {
            self.state.menu_cursor = items.len().saturating_sub(1);
        }
        let menu_height = (items.len() as u16)
            .saturating_mul(2)
            .saturating_add(2)
            .min(area.height);
        let menu_width = 28.min(area.width.max(1));
        let menu_area = centered_rect(menu_width, menu_height, area);

        let menu_lines: Vec<Line> = items
            .iter()
            .enumerate()
            .flat_map(|(idx, item)| {
                let line = if idx == self.state.menu_cursor {
                    Line::from(Span::styled(
                        format!("▶ {}", item.label()),
                        Style::default()
                            .fg(self.theme.accent)
                            .add_modifier(Modifier::BOLD),
                    ))
                } else {
                    Line::from(Span::styled(
                        format!("  {}", item.label()),
                        Style::default().fg(self.theme.primary_fg),
                    ))
                };
                [line, Line::from("")]
            })
            .collect();

        let menu = Paragraph::new(menu_lines)
            .block(Block::default().borders(Borders::ALL).title("Menu"))
            .alignment(Alignment::Center);
        frame.render_widget(menu, menu_area);
    }

    fn draw_browse(&mut self, frame: &mut Frame, area: Rect) {
        let body_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(area);

        self.render_tour_list(frame, body_chunks[0]);
        self.render_tour_info(frame, body_chunks[1]);
    }

    fn render_tour_list(&mut self, frame: &mut Frame, area: Rect) {
        self.state.list_height = area.height.saturating_sub(2) as usize;
        self.state.clamp_cursor();
        self.state.ensure_cursor_visible();

        let mut list_state = ListState::default();
        let height = area.height.saturating_sub(2) as usize;
        let tours = self.state.visible_tours(height);
        if !tours.is_empty() {
            let selected = self
                .state
                .cursor
                .saturating_sub(self.state.offset)
                .min(tours.len().saturating_sub(1));
            list_state.select(Some(selected));
        }
        let items: Vec<ListItem> = tours
            .iter()
            .enumerate()
            .map(|(idx, tour)| {
                let is_selected = self.state.cursor == self.state.offset + idx;
                let marker = if is_selected {
                    Span::styled(
                        "▶ ",
                        Style::default()
                            .fg(self.theme.accent)
                            .add_modifier(Modifier::BOLD),
                    )
                } else {
                    Span::raw("  ")
                };
                let title = Span::styled(
                    tour.title.clone(),
                    Style::default()
                        .fg(self.theme.primary_fg)
                        .add_modifier(Modifier::BOLD),
                );
                let duration = Span::styled(
                    format!(" · {}", tour.duration_label()),
                    Style::default().fg(self.theme.muted),
                );
                ListItem::new(Line::from(vec![marker, title, duration]))
            })
            .collect();

        let title = if self.loading_tours {
            "Tours (loading…)".to_string()
        } else {
            format!("Tours · {}", self.state.bucket)
        };
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(Style::default().bg(self.theme.selection_bg));
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_tour_info(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Tour");
        let Some(tour) = self.state.current_tour() else {
            let text = if self.catalog.is_loaded() {
                "No tours match the current filter"
            } else {
                "No tours loaded. Press Ctrl+R to retry."
            };
            frame.render_widget(Paragraph::new(text).block(block), area);
            return;
        };

        let label = Style::default().fg(self.theme.muted);
        let mut lines = vec![
            Line::from(Span::styled(
                tour.title.clone(),
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(vec![
                Span::styled("Destination: ", label),
                Span::raw(tour.destination().to_string()),
            ]),
            Line::from(vec![
                Span::styled("Duration:    ", label),
                Span::raw(tour.duration_label()),
            ]),
            Line::from(vec![
                Span::styled("From:        ", label),
                Span::raw(format_currency(tour.price())),
                Span::styled(" per person", label),
            ]),
        ];
        if let Some(max) = tour.max_people {
            lines.push(Line::from(vec![
                Span::styled("Group size:  ", label),
                Span::raw(format!("up to {max}")),
            ]));
        }
        if let Some(description) = tour.description.as_deref().filter(|d| !d.is_empty()) {
            lines.push(Line::from(""));
            lines.push(Line::from(description.to_string()));
        }
        lines.push(Line::from(""));
        lines.push(help_line(&[
            ("Enter", "details"),
            ("b", "book"),
            ("/", "filter"),
            ("d", "duration"),
            ("Ctrl+R", "reload"),
            ("Esc", "menu"),
        ]));

        let paragraph = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn draw_detail(&self, frame: &mut Frame, area: Rect) {
        let Some(view) = self.detail.as_ref() else {
            return;
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(view.title.clone());
        let Some(detail) = view.detail.as_ref() else {
            let lines = match &view.error {
                Some(message) => vec![
                    Line::from(Span::styled(
                        message.clone(),
                        Style::default().fg(self.theme.danger),
                    )),
                    Line::from(""),
                    help_line(&[("r", "retry"), ("b", "book anyway"), ("Esc", "back")]),
                ],
                None => vec![Line::from("Loading tour details…")],
            };
            frame.render_widget(Paragraph::new(lines).block(block), area);
            return;
        };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(1)])
            .split(area);
        let paragraph = Paragraph::new(self.detail_lines(detail))
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((view.scroll, 0));
        frame.render_widget(paragraph, chunks[0]);
        frame.render_widget(
            Paragraph::new(help_line(&[
                ("Enter", "book"),
                ("j/k", "scroll"),
                ("Esc", "back"),
            ])),
            chunks[1],
        );
    }

    fn detail_lines(&self, detail: &TourDetail) -> Vec<Line<'static>> {
        let label = Style::default().fg(self.theme.muted);
        let heading = Style::default()
            .fg(self.theme.accent)
            .add_modifier(Modifier::BOLD);
        let summary = detail.summary();
        let mut lines = vec![
            Line::from(vec![
                Span::styled("Destination: ", label),
                Span::raw(detail.destination().to_string()),
            ]),
            Line::from(vec![
                Span::styled("Duration:    ", label),
                Span::raw(summary.duration_label),
            ]),
            Line::from(vec![
                Span::styled("Price:       ", label),
                Span::raw(format_currency(summary.price_per_person)),
                Span::styled(" per person", label),
            ]),
            Line::from(vec![
                Span::styled("Group size:  ", label),
                Span::raw(
                    detail
                        .max_people
                        .map(|max| format!("up to {max}"))
                        .unwrap_or_else(|| "N/A".to_string()),
                ),
            ]),
            Line::from(vec![
                Span::styled("Season:      ", label),
                Span::raw(detail.season().to_string()),
            ]),
        ];
        if let Some(description) = detail.description.as_deref().filter(|d| !d.trim().is_empty()) {
            lines.push(Line::from(""));
            lines.push(Line::from(description.to_string()));
        }

        let itinerary = detail.itinerary();
        if !itinerary.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled("Itinerary", heading)));
            for day in itinerary {
                lines.push(Line::from(vec![
                    Span::styled(format!("Day {}: ", day.day_number), label),
                    Span::styled(day.heading(), Style::default().add_modifier(Modifier::BOLD)),
                ]));
                if let Some(text) = day.description.as_deref().filter(|d| !d.trim().is_empty()) {
                    lines.push(Line::from(format!("  {}", text.trim())));
                }
            }
        }

        let included = detail.inclusions();
        let excluded = detail.exclusions();
        if !included.is_empty() || !excluded.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled("What's included", heading)));
            for item in included {
                lines.push(Line::from(vec![
                    Span::styled("  ✓ ", Style::default().fg(self.theme.success)),
                    Span::raw(item.to_string()),
                ]));
            }
            for item in excluded {
                lines.push(Line::from(vec![
                    Span::styled("  ✗ ", Style::default().fg(self.theme.danger)),
                    Span::raw(item.to_string()),
                ]));
            }
        }

        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Reviews ({})", detail.reviews.len()),
            heading,
        )));
        if detail.reviews.is_empty() {
            lines.push(Line::from(Span::styled("  No reviews yet.", label)));
        }
        for review in &detail.reviews {
            let rating = review
                .rating
                .map(|rating| format!(" ★{rating:.1}"))
                .unwrap_or_default();
            lines.push(Line::from(vec![
                Span::styled(
                    format!("  {}{rating}", review.author()),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::raw(format!(
                    ": {}",
                    review.comment.as_deref().unwrap_or("").trim()
                )),
            ]));
        }
        lines
    }

    fn draw_wizard(&self, frame: &mut Frame, area: Rect) {
        let Some(view) = self.wizard.as_ref() else {
            return;
        };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(5)])
            .split(area);

        let current = view.wizard.as_ref().map(BookingWizard::step);
        let mut steps = Vec::new();
        for (idx, step) in WizardStep::VISIBLE.iter().enumerate() {
            if idx > 0 {
                steps.push(Span::styled("  ›  ", Style::default().fg(self.theme.muted)));
            }
            let style = if Some(*step) == current {
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(self.theme.muted)
            };
            steps.push(Span::styled(format!("{} {}", idx + 1, step.title()), style));
        }
        let header = Paragraph::new(Line::from(steps))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Book · {}", view.tour_title)),
            )
            .alignment(Alignment::Center);
        frame.render_widget(header, chunks[0]);

        let block = Block::default().borders(Borders::ALL);
        let lines = match view.wizard.as_ref() {
            None => match &view.load_error {
                Some(message) => vec![
                    Line::from(Span::styled(
                        message.clone(),
                        Style::default().fg(self.theme.danger),
                    )),
                    Line::from(""),
                    help_line(&[("Esc", "close")]),
                ],
                None => vec![Line::from("Loading tour details…")],
            },
            Some(wizard) => match wizard.step() {
                WizardStep::SelectCount => self.select_count_lines(wizard),
                WizardStep::PassengerDetails => self.passenger_lines(view, wizard),
                WizardStep::ReviewConfirm => self.review_lines(wizard),
                WizardStep::Submitted => self.submitted_lines(wizard),
            },
        };
        let paragraph = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, chunks[1]);
    }

    fn select_count_lines(&self, wizard: &BookingWizard) -> Vec<Line<'static>> {
        let label = Style::default().fg(self.theme.muted);
        let tour = wizard.tour();
        vec![
            Line::from(vec![
                Span::styled("Duration:          ", label),
                Span::raw(tour.duration_label.clone()),
            ]),
            Line::from(vec![
                Span::styled("Price per person:  ", label),
                Span::raw(format_currency(tour.price_per_person)),
            ]),
            Line::from(""),
            Line::from(vec![
                Span::styled("Passengers:        ", label),
                Span::styled(
                    format!("◀ {} ▶", wizard.passenger_count()),
                    Style::default()
                        .fg(self.theme.accent)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(format!("  (1-{MAX_PASSENGERS})"), label),
            ]),
            Line::from(vec![
                Span::styled("Total:             ", label),
                Span::styled(
                    format_currency(wizard.total_price()),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
            ]),
            Line::from(""),
            help_line(&[("←/→", "passengers"), ("Enter", "next"), ("Esc", "close")]),
        ]
    }

    fn passenger_lines(&self, view: &WizardView, wizard: &BookingWizard) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        for (idx, passenger) in wizard.passengers().iter().enumerate() {
            let focused = |field: PassengerField| {
                if idx == view.row && view.field == field {
                    Style::default()
                        .fg(self.theme.accent)
                        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
                } else {
                    Style::default().fg(self.theme.primary_fg)
                }
            };
            let marker = if idx == view.row { "▶ " } else { "  " };
            let name = if passenger.name.is_empty() {
                "________".to_string()
            } else {
                passenger.name.clone()
            };
            let age = passenger
                .age
                .map(|age| age.to_string())
                .unwrap_or_else(|| "__".to_string());
            lines.push(Line::from(vec![
                Span::raw(format!("{marker}#{:<3}", idx + 1)),
                Span::styled("Name: ", Style::default().fg(self.theme.muted)),
                Span::styled(name, focused(PassengerField::Name)),
                Span::styled("   Age: ", Style::default().fg(self.theme.muted)),
                Span::styled(age, focused(PassengerField::Age)),
            ]));
        }
        let missing = wizard.incomplete_passengers().len();
        if missing > 0 {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                format!("{missing} passenger(s) missing a name or age"),
                Style::default().fg(self.theme.warning),
            )));
        }
        lines.push(Line::from(""));
        lines.push(help_line(&[
            ("↑/↓", "passenger"),
            ("Tab", "field"),
            ("Enter", "review"),
            ("Esc", "back"),
        ]));
        lines
    }

    fn review_lines(&self, wizard: &BookingWizard) -> Vec<Line<'static>> {
        let label = Style::default().fg(self.theme.muted);
        let tour = wizard.tour();
        let mut lines = vec![
            Line::from(vec![
                Span::styled("Tour:              ", label),
                Span::raw(tour.title.clone()),
            ]),
            Line::from(vec![
                Span::styled("Duration:          ", label),
                Span::raw(tour.duration_label.clone()),
            ]),
            Line::from(""),
        ];
        for (idx, passenger) in wizard.passengers().iter().enumerate() {
            let name = if passenger.name.trim().is_empty() {
                "(name not provided)".to_string()
            } else {
                passenger.name.clone()
            };
            let age = passenger
                .age
                .map(|age| format!(", {age}"))
                .unwrap_or_default();
            lines.push(Line::from(format!("  {}. {name}{age}", idx + 1)));
        }
        lines.extend([
            Line::from(""),
            Line::from(vec![
                Span::styled("Base price:        ", label),
                Span::raw(format_currency(tour.price_per_person)),
            ]),
            Line::from(vec![
                Span::styled("Passengers:        ", label),
                Span::raw(format!("× {}", wizard.passenger_count())),
            ]),
            Line::from(vec![
                Span::styled("Total:             ", label),
                Span::styled(
                    format_currency(wizard.total_price()),
                    Style::default()
                        .fg(self.theme.accent)
                        .add_modifier(Modifier::BOLD),
                ),
            ]),
            Line::from(""),
        ]);
        if wizard.is_submitting() {
            lines.push(Line::from(Span::styled(
                "Submitting booking…",
                Style::default().fg(self.theme.warning),
            )));
        } else if let Some(message) = wizard.last_error() {
            lines.push(Line::from(Span::styled(
                message.to_string(),
                Style::default().fg(self.theme.danger),
            )));
        }
        lines.push(help_line(&[("Enter", "confirm booking"), ("Esc", "back")]));
        lines
    }

    fn submitted_lines(&self, wizard: &BookingWizard) -> Vec<Line<'static>> {
        let Some(receipt) = wizard.receipt() else {
            return Vec::new();
        };
        let status = receipt
            .status
            .as_ref()
            .map(|status| status.label().to_string())
            .unwrap_or_else(|| "Pending".to_string());
        let total = receipt.total_price.unwrap_or_else(|| wizard.total_price());
        vec![
            Line::from(Span::styled(
                format!("Booking #{} confirmed!", receipt.id),
                Style::default()
                    .fg(self.theme.success)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(format!("Status: {status}")),
            Line::from(format!("Total:  {}", format_currency(total))),
            Line::from(""),
            Line::from("Payment is completed outside this client."),
            Line::from(""),
            help_line(&[("Enter", "my bookings"), ("Esc", "browse tours")]),
        ]
    }

    fn draw_bookings(&self, frame: &mut Frame, area: Rect) {
        let title = if self.bookings.loading {
            "My Bookings (loading…)".to_string()
        } else {
            format!("My Bookings ({})", self.bookings.bookings.len())
        };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(1)])
            .split(area);

        let items: Vec<ListItem> = self
            .bookings
            .bookings
            .iter()
            .map(|booking| {
                let status_color = match booking.status.label() {
                    "Confirmed" | "Completed" => self.theme.success,
                    "Pending" => self.theme.warning,
                    "Cancelled" => self.theme.danger,
                    _ => self.theme.muted,
                };
                let created = booking
                    .created_at
                    .map(|at| at.with_timezone(&Local).format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "—".to_string());
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("#{:<6}", booking.id),
                        Style::default().fg(self.theme.muted),
                    ),
                    Span::styled(
                        booking.tour_title(),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(format!(
                        "  {} traveller(s)  {}  {}  ",
                        booking.travelers_count,
                        format_currency(booking.total_price),
                        created
                    )),
                    Span::styled(
                        booking.status.label().to_string(),
                        Style::default().fg(status_color),
                    ),
                ]))
            })
            .collect();

        let mut list_state = ListState::default();
        if !items.is_empty() {
            list_state.select(Some(self.bookings.cursor.min(items.len() - 1)));
        }
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(Style::default().bg(self.theme.selection_bg))
            .highlight_symbol("▶ ");
        frame.render_stateful_widget(list, chunks[0], &mut list_state);
        frame.render_widget(
            Paragraph::new(help_line(&[
                ("c", "cancel booking"),
                ("r", "reload"),
                ("Esc", "menu"),
            ])),
            chunks[1],
        );
    }

    fn draw_profile(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Profile");
        let label = Style::default().fg(self.theme.muted);
        let lines = match self.session.current_user() {
            Some(user) => vec![
                Line::from(Span::styled(
                    user.display_name(),
                    Style::default()
                        .fg(self.theme.accent)
                        .add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(vec![Span::styled("Username: ", label), Span::raw(user.username)]),
                Line::from(vec![Span::styled("Email:    ", label), Span::raw(user.email)]),
                Line::from(vec![
                    Span::styled("Phone:    ", label),
                    Span::raw(user.phone.unwrap_or_else(|| "—".to_string())),
                ]),
                Line::from(vec![
                    Span::styled("Role:     ", label),
                    Span::raw(role_label(user.role)),
                ]),
                Line::from(""),
                help_line(&[("e", "edit"), ("r", "refresh"), ("Esc", "menu")]),
            ],
            None => vec![
                Line::from("Profile unavailable."),
                Line::from(""),
                help_line(&[("r", "retry"), ("Esc", "menu")]),
            ],
        };
        frame.render_widget(
            Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
            area,
        );
    }

    fn draw_admin(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Admin Area");
        let label = Style::default().fg(self.theme.muted);
        let name = self
            .session
            .current_user()
            .map(|user| user.display_name())
            .unwrap_or_default();
        let fetched = self
            .catalog
            .fetched_at()
            .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        let lines = vec![
            Line::from(vec![Span::styled("Administrator: ", label), Span::raw(name)]),
            Line::from(vec![
                Span::styled("API:           ", label),
                Span::raw(self.base_url.clone()),
            ]),
            Line::from(vec![
                Span::styled("Tours listed:  ", label),
                Span::raw(self.catalog.tours().len().to_string()),
                Span::styled(format!("  (fetched {fetched})"), label),
            ]),
            Line::from(""),
            help_line(&[("r", "reload tours"), ("Esc", "menu")]),
        ];
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn render_form(&self, frame: &mut Frame, form: &Form, hint: &str) {
        let frame_area = frame.size();
        let message_lines = u16::from(form.message.is_some()) * 2;
        let hint_lines = u16::from(!hint.is_empty()) * 3;
        let height = (form.fields.len() as u16 + message_lines + hint_lines + 5)
            .min(frame_area.height.saturating_sub(2));
        let width = 60_u16.min(frame_area.width.saturating_sub(4)).max(24);
        let area = centered_rect(width, height, frame_area);

        frame.render_widget(Clear, area);

        let label_width = form
            .fields
            .iter()
            .map(|field| field.label.len())
            .max()
            .unwrap_or(0)
            + 2;
        let mut lines = Vec::new();
        if let Some(message) = &form.message {
            let color = if form.pending {
                self.theme.muted
            } else {
                self.theme.warning
            };
            lines.push(Line::from(Span::styled(
                message.clone(),
                Style::default().fg(color),
            )));
            lines.push(Line::from(""));
        }
        for (idx, field) in form.fields.iter().enumerate() {
            let style = if idx == form.focus {
                Style::default().fg(self.theme.accent)
            } else {
                Style::default().fg(self.theme.muted)
            };
            lines.push(Line::from(vec![
                Span::styled(format!("{:<label_width$}", field.label), style),
                Span::raw(field.display()),
            ]));
        }
        lines.push(Line::from(""));
        lines.push(help_line(&[
            ("Enter", "submit"),
            ("Tab", "next field"),
            ("Esc", "cancel"),
        ]));
        if !hint.is_empty() {
            lines.push(Line::from(Span::styled(
                hint.to_string(),
                Style::default().fg(self.theme.muted),
            )));
        }

        let paragraph = Paragraph::new(lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(form.title.clone()),
            )
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);

        if let Some(field) = form.fields.get(form.focus) {
            let row = area.y + 1 + message_lines + form.focus as u16;
            let column = (area.x + 1 + label_width as u16 + field.cursor() as u16)
                .min(area.x + area.width.saturating_sub(2));
            frame.set_cursor(column, row);
        }
    }

    fn render_confirm(&self, frame: &mut Frame, booking_id: &RecordId, title: &str) {
        let area = centered_rect(56, 7, frame.size());
        frame.render_widget(Clear, area);
        let lines = vec![
            Line::from(format!("Cancel booking #{booking_id}?")),
            Line::from(Span::styled(
                title.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            help_line(&[("y", "request cancellation"), ("n", "keep booking")]),
        ];
        let paragraph = Paragraph::new(lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Cancel Booking"),
            )
            .alignment(Alignment::Center);
        frame.render_widget(paragraph, area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Status");
        let primary = if self.screen == Screen::Browse && self.state.mode == Mode::Filter {
            format!("Filter: {}", self.state.filter)
        } else {
            self.state.status.clone()
        };
        let paragraph = Paragraph::new(Line::from(primary))
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }
}

fn login_form(email: &str) -> Form {
    Form::new(
        "Sign In",
        vec![
            TextField::new("Email").with_value(email),
            TextField::new("Password").masked(),
        ],
    )
}

fn custom_choices(field: usize) -> Option<&'static [Choice]> {
    match field {
        CUSTOM_DESTINATION => Some(custom::DESTINATIONS),
        CUSTOM_TOUR_TYPE => Some(custom::TOUR_TYPES),
        CUSTOM_ACCOMMODATION => Some(custom::ACCOMMODATIONS),
        CUSTOM_TRANSPORT => Some(custom::TRANSPORTATION),
        CUSTOM_BUDGET => Some(custom::BUDGETS),
        _ => None,
    }
}

/// Help text for the focused field of the custom request form.
fn custom_field_hint(field: usize) -> String {
    if let Some(options) = custom_choices(field) {
        return format!("Options: {}", custom::labels(options));
    }
    match field {
        CUSTOM_START => "Format YYYY-MM-DD".to_string(),
        CUSTOM_DAYS => format!("1-{} days", custom::MAX_TRIP_DAYS),
        CUSTOM_PEOPLE => format!("1-{} people", custom::MAX_GROUP_SIZE),
        CUSTOM_NOTES => "Optional".to_string(),
        _ => String::new(),
    }
}

/// Current text of one passenger field, as the editor shows it.
fn passenger_text(wizard: &BookingWizard, row: usize, field: PassengerField) -> String {
    let Some(passenger) = wizard.passengers().get(row) else {
        return String::new();
    };
    match field {
        PassengerField::Name => passenger.name.clone(),
        PassengerField::Age => passenger.age.map(|age| age.to_string()).unwrap_or_default(),
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

struct UiState {
    filtered: Vec<TourListing>,
    cursor: usize,
    offset: usize,
    list_height: usize,
    filter: String,
    bucket: DurationBucket,
    status: String,
    mode: Mode,
    should_quit: bool,
    menu_cursor: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            filtered: Vec::new(),
            cursor: 0,
            offset: 0,
            list_height: 1,
            filter: String::new(),
            bucket: DurationBucket::default(),
            status: "Ready".to_string(),
            mode: Mode::Browse,
            should_quit: false,
            menu_cursor: 0,
        }
    }
}

impl UiState {
    fn apply_filter(&mut self, catalog: &TourCatalog) {
        self.filtered = catalog.matching(&self.filter, self.bucket);
        self.cursor = 0;
        self.offset = 0;
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.filtered.is_empty() {
            return;
        }
        self.cursor = step_index(self.cursor, delta, self.filtered.len());
        self.ensure_cursor_visible();
    }

    fn move_to(&mut self, index: usize) {
        if self.filtered.is_empty() {
            return;
        }
        self.cursor = index.min(self.filtered.len() - 1);
        self.ensure_cursor_visible();
    }

    fn move_to_end(&mut self) {
        if self.filtered.is_empty() {
            return;
        }
        self.cursor = self.filtered.len() - 1;
        self.ensure_cursor_visible();
    }

    fn page_down(&mut self) {
        if self.filtered.is_empty() || self.list_height == 0 {
            return;
        }
        let delta = self.list_height.min(self.filtered.len());
        self.move_cursor(delta as isize);
    }

    fn page_up(&mut self) {
        if self.filtered.is_empty() || self.list_height == 0 {
            return;
        }
        let delta = self.list_height.min(self.filtered.len());
        self.move_cursor(-(delta as isize));
    }

    fn visible_tours(&self, height: usize) -> &[TourListing] {
        if self.filtered.is_empty() {
            return &[];
        }
        let end = (self.offset + height).min(self.filtered.len());
        &self.filtered[self.offset..end]
    }

    fn current_tour(&self) -> Option<&TourListing> {
        self.filtered.get(self.cursor)
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    fn clamp_cursor(&mut self) {
        if self.filtered.is_empty() {
            self.cursor = 0;
            self.offset = 0;
        } else if self.cursor >= self.filtered.len() {
            self.cursor = self.filtered.len() - 1;
        }
    }

    fn ensure_cursor_visible(&mut self) {
        if self.filtered.is_empty() || self.list_height == 0 {
            self.offset = 0;
            return;
        }
        let height = self.list_height;
        let max_offset = self.filtered.len().saturating_sub(height);

        if self.cursor < self.offset {
            self.offset = self.cursor;
        } else if self.cursor >= self.offset + height {
            self.offset = self.cursor + 1 - height;
        }

        if self.offset > max_offset {
            self.offset = max_offset;
        }
    }

    fn move_menu_cursor(&mut self, delta: isize, options: usize) {
        self.menu_cursor = step_index(self.menu_cursor, delta, options);
    }
}

/// Move `current` by `delta` within `0..len`, clamping at both ends.
fn step_index(current: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (current as isize + delta).clamp(0, len as isize - 1) as usize
}

fn role_label(role: Role) -> String {
    match role {
        Role::Admin => "Administrator".to_string(),
        Role::Customer => "Customer".to_string(),
    }
}

fn help_line(keys: &[(&str, &str)]) -> Line<'static> {
    let mut spans = Vec::new();
    for (idx, (key, action)) in keys.iter().enumerate() {
        if idx > 0 {
            spans.push(Span::raw("  "));
        }
        spans.push(Span::styled(
            key.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::raw(format!(" {action}")));
    }
    Line::from(spans)
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn format_currency(value: f64) -> String {
    format!("₹{value:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: u64, title: &str, days: u32) -> TourListing {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": title,
            "duration_days": days,
            "pricings": [{ "adult_price": 1000 }]
        }))
        .expect("listing fixture")
    }

    fn state_with(count: u64, height: usize) -> UiState {
        let catalog = TourCatalog::new();
        catalog.replace((1..=count).map(|id| listing(id, "Tour", 3)).collect());
        let mut state = UiState {
            list_height: height,
            ..UiState::default()
        };
        state.apply_filter(&catalog);
        state
    }

    #[test]
    fn cursor_scrolls_the_visible_window() {
        let mut state = state_with(10, 4);
        state.move_cursor(5);
        assert_eq!(state.cursor, 5);
        assert_eq!(state.offset, 2);

        state.move_to_end();
        assert_eq!(state.cursor, 9);
        assert_eq!(state.visible_tours(4).len(), 4);

        state.page_up();
        assert_eq!(state.cursor, 5);
        state.move_cursor(-20);
        assert_eq!((state.cursor, state.offset), (0, 0));
    }

    #[test]
    fn filter_resets_the_cursor() {
        let catalog = TourCatalog::new();
        catalog.replace(vec![listing(1, "Goa Beaches", 4), listing(2, "Ladakh", 12)]);
        let mut state = UiState::default();
        state.apply_filter(&catalog);
        state.move_to_end();

        state.filter = "lad".into();
        state.apply_filter(&catalog);
        assert_eq!(state.cursor, 0);
        assert_eq!(state.current_tour().map(|tour| tour.title.as_str()), Some("Ladakh"));

        state.bucket = DurationBucket::UnderFive;
        state.apply_filter(&catalog);
        assert!(state.current_tour().is_none());
    }

    #[test]
    fn helpers_clamp_and_format() {
        assert_eq!(step_index(0, -1, 3), 0);
        assert_eq!(step_index(2, 5, 3), 2);
        assert_eq!(step_index(4, 1, 0), 0);
        assert_eq!(format_currency(2400.0), "₹2400.00");

        let area = Rect::new(0, 0, 100, 40);
        assert_eq!(centered_rect(20, 10, area), Rect::new(40, 15, 20, 10));
        assert_eq!(centered_rect(200, 80, area), area);
    }

    fn app() -> TourBookApp {
        let api: Arc<dyn TourApi> = Arc::new(
            tourbook_core::HttpApi::new(tourbook_core::config::ApiConfig::default())
                .expect("client should build"),
        );
        let session = Arc::new(SessionManager::new(
            api.clone(),
            Arc::new(tourbook_core::MemoryStore::new()),
        ));
        TourBookApp::new(api, session, "http://localhost".into())
    }

    fn detail(id: i64, title: &str) -> TourDetail {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": title,
            "duration_days": 5,
            "pricings": [{ "adult_price": 1200 }]
        }))
        .expect("detail fixture")
    }

    fn loading_view(ticket: u64) -> WizardView {
        WizardView {
            ticket,
            guard: FlowGuard::new(),
            tour_title: "Loading".into(),
            wizard: None,
            load_error: None,
            row: 0,
            field: PassengerField::Name,
        }
    }

    fn opened(ticket: u64, id: i64, title: &str) -> AppEvent {
        AppEvent::WizardOpened {
            ticket,
            result: Ok(BookingWizard::from_detail(RecordId::from(id), &detail(id, title))),
        }
    }

    #[test]
    fn wizard_ignores_results_for_an_earlier_ticket() {
        let mut app = app();
        app.wizard = Some(loading_view(2));

        assert!(app.process_app_event(Some(opened(1, 7, "Old Tour"))));
        assert!(app.wizard.as_ref().is_some_and(|view| view.wizard.is_none()));

        app.process_app_event(Some(opened(2, 8, "Spiti Valley")));
        let view = app.wizard.as_ref().expect("wizard stays open");
        assert_eq!(view.tour_title, "Spiti Valley");
        assert_eq!(
            view.wizard.as_ref().map(|wizard| wizard.tour_id().clone()),
            Some(RecordId::from(8))
        );

        let receipt: BookingReceipt =
            serde_json::from_value(serde_json::json!({ "id": 44 })).expect("receipt fixture");
        app.process_app_event(Some(AppEvent::BookingSubmitted {
            ticket: 1,
            result: Ok(receipt),
        }));
        let wizard = app.wizard.as_ref().and_then(|view| view.wizard.as_ref());
        assert!(wizard.is_some_and(|wizard| wizard.receipt().is_none()));
        assert_eq!(wizard.map(BookingWizard::step), Some(WizardStep::SelectCount));
    }

    #[test]
    fn closed_wizard_drops_its_tour_load() {
        let mut app = app();
        let view = loading_view(3);
        view.guard.abandon();
        app.wizard = Some(view);

        app.process_app_event(Some(opened(3, 9, "Coorg")));
        assert!(app.wizard.as_ref().is_some_and(|view| view.wizard.is_none()));
        assert_ne!(app.state.status, "Choose the number of passengers");

        app.close_wizard();
        app.process_app_event(Some(opened(3, 9, "Coorg")));
        assert!(app.wizard.is_none());
    }

    #[test]
    fn tour_page_keeps_only_the_latest_load() {
        let mut app = app();
        app.screen = Screen::Detail;
        app.detail = Some(DetailView {
            ticket: 5,
            tour_id: RecordId::from(11),
            title: "Kerala".into(),
            detail: None,
            error: None,
            scroll: 0,
        });

        app.process_app_event(Some(AppEvent::DetailLoaded {
            ticket: 4,
            result: Ok(detail(10, "Goa")),
        }));
        assert!(app.detail.as_ref().is_some_and(|view| view.detail.is_none()));

        app.process_app_event(Some(AppEvent::DetailLoaded {
            ticket: 5,
            result: Err(ApiError::Rejected {
                status: 404,
                message: None,
            }),
        }));
        assert_eq!(
            app.detail.as_ref().and_then(|view| view.error.as_deref()),
            Some("Failed to fetch tour details")
        );

        app.process_app_event(Some(AppEvent::DetailLoaded {
            ticket: 5,
            result: Ok(detail(11, "Kerala Backwaters")),
        }));
        let view = app.detail.as_ref().expect("page stays open");
        assert_eq!(view.title, "Kerala Backwaters");
        assert!(view.error.is_none());
    }

    #[test]
    fn custom_request_hints_name_the_options() {
        assert!(custom_field_hint(CUSTOM_ACCOMMODATION).contains("Homestay"));
        assert_eq!(custom_field_hint(CUSTOM_DAYS), "1-30 days");
        assert_eq!(custom_field_hint(CUSTOM_FIRST), "");
    }
}
