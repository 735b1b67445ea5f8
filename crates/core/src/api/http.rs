use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use tracing::debug;

use super::{
    error_message, unwrap_envelope, ApiError, Credentials, ProfileUpdate, Registration, TourApi,
};
use crate::{
    config::ApiConfig,
    custom::CustomPackageRequest,
    models::{
        Booking, BookingReceipt, BookingRequest, CancellationRequest, RecordId, TourDetail,
        TourListing,
    },
    session::User,
};

/// Collection responses arrive either bare or paginated.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Plain(Vec<T>),
    Paged { results: Vec<T> },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Plain(items) | Self::Paged { results: items } => items,
        }
    }
}

/// HTTP client for the tour API.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    config: ApiConfig,
}

impl HttpApi {
    /// Build a client honouring the configured timeout.
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        Ok(Self { client, config })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        self.config.url(path)
    }

    fn tour_url(&self, tour_id: &RecordId) -> String {
        let base = self.config.endpoints.tours.trim_end_matches('/');
        self.url(&format!("{base}/{tour_id}/"))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let value = self.send_value(request).await?;
        serde_json::from_value(value).map_err(|err| ApiError::Malformed(err.to_string()))
    }

    async fn send_value(&self, request: RequestBuilder) -> Result<Value, ApiError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await.map_err(transport_error)?;
        debug!(%url, status = status.as_u16(), bytes = body.len(), "api response");

        let parsed = if body.trim().is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str::<Value>(&body)
        };

        if !status.is_success() {
            let message = parsed.ok().as_ref().and_then(error_message);
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        parsed
            .map(unwrap_envelope)
            .map_err(|err| ApiError::Malformed(format!("response body is not JSON: {err}")))
    }
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Transport("request timed out".to_string())
    } else {
        ApiError::Transport(err.to_string())
    }
}

#[async_trait]
impl TourApi for HttpApi {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Value, ApiError> {
        let request = self
            .client
            .post(self.url(&self.config.endpoints.login))
            .json(credentials);
        self.send_value(request).await
    }

    async fn current_user(&self, token: &str) -> Result<User, ApiError> {
        let request = self
            .client
            .get(self.url(&self.config.endpoints.current_user))
            .bearer_auth(token);
        self.send(request).await
    }

    async fn register(&self, registration: &Registration) -> Result<Value, ApiError> {
        let request = self
            .client
            .post(self.url(&self.config.endpoints.register))
            .json(registration);
        self.send_value(request).await
    }

    async fn update_profile(&self, token: &str, update: &ProfileUpdate) -> Result<User, ApiError> {
        let request = self
            .client
            .patch(self.url(&self.config.endpoints.profile))
            .bearer_auth(token)
            .json(update);
        self.send(request).await
    }

    async fn list_tours(&self) -> Result<Vec<TourListing>, ApiError> {
        let request = self.client.get(self.url(&self.config.endpoints.tours));
        let listing: Listing<TourListing> = self.send(request).await?;
        Ok(listing.into_vec())
    }

    async fn tour_detail(&self, tour_id: &RecordId) -> Result<TourDetail, ApiError> {
        let request = self.client.get(self.tour_url(tour_id));
        self.send(request).await
    }

    async fn create_booking(
        &self,
        token: &str,
        request: &BookingRequest,
    ) -> Result<BookingReceipt, ApiError> {
        let request = self
            .client
            .post(self.url(&self.config.endpoints.bookings))
            .bearer_auth(token)
            .json(request);
        self.send(request).await
    }

    async fn list_bookings(&self, token: &str) -> Result<Vec<Booking>, ApiError> {
        let request = self
            .client
            .get(self.url(&self.config.endpoints.bookings))
            .bearer_auth(token);
        let listing: Listing<Booking> = self.send(request).await?;
        Ok(listing.into_vec())
    }

    async fn cancel_booking(
        &self,
        token: &str,
        request: &CancellationRequest,
    ) -> Result<Value, ApiError> {
        let request = self
            .client
            .post(self.url(&self.config.endpoints.cancellations))
            .bearer_auth(token)
            .json(request);
        self.send_value(request).await
    }

    async fn request_custom_package(
        &self,
        token: Option<&str>,
        request: &CustomPackageRequest,
    ) -> Result<Value, ApiError> {
        let mut builder = self
            .client
            .post(self.url(&self.config.endpoints.custom_packages))
            .json(request);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        self.send_value(builder).await
    }
}
