//! Vehicle marketplace server: search, listing wizard and buyer/seller messaging
//! on top of a hosted backend.

use axum::{extract::FromRef, Router};
use reqwest::Client;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub mod auth_middleware;
pub mod backend;
pub mod config;
pub mod error;
pub mod integrations;
pub mod listings;
pub mod messaging;
pub mod models;
pub mod profile;
pub mod routes;
pub mod search;
pub mod wizard;

use backend::{
    AuthService, DataService, Entities, MemoryAuthService, MemoryDataService, RestAuthService, RestDataService,
};
use config::{BackendMode, Settings};
use integrations::{CachedGeocoder, FunctionGeocoder, Geocoder, Integrations, RestIntegrations};
use listings::ListingService;
use messaging::MessagingService;
use profile::ProfileService;
use search::{MarketplaceStateStore, SearchService};
use wizard::{DraftStore, WizardService};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub auth: Arc<dyn AuthService>,
    pub entities: Entities,
    pub integrations: Arc<dyn Integrations>,
    pub geocoder: Arc<dyn Geocoder>,
    pub search: SearchService,
    pub marketplace_state: Arc<MarketplaceStateStore>,
    pub wizard: WizardService,
    pub drafts: Arc<DraftStore>,
    pub messaging: Arc<MessagingService>,
    pub listings: ListingService,
    pub profile: ProfileService,
}

impl AppState {
    /// Wires the configured backend (REST or in-memory) and the hosted integrations.
    pub fn build(settings: Settings, http: Arc<Client>) -> Self {
        let (data, auth): (Arc<dyn DataService>, Arc<dyn AuthService>) = match settings.backend.mode {
            BackendMode::Rest => (
                Arc::new(RestDataService::new(Arc::clone(&http), &settings.backend)),
                Arc::new(RestAuthService::new(
                    Arc::clone(&http),
                    &settings.backend,
                    &settings.auth.login_url,
                )),
            ),
            BackendMode::Memory => {
                tracing::warn!("Using the in-memory backend; records are lost on restart");
                (
                    Arc::new(MemoryDataService::new()),
                    Arc::new(MemoryAuthService::new(settings.auth.login_url.clone())),
                )
            }
        };
        let integrations: Arc<dyn Integrations> = Arc::new(RestIntegrations::new(http, &settings.backend));
        let geocoder: Arc<dyn Geocoder> = Arc::new(CachedGeocoder::new(
            Arc::new(FunctionGeocoder::new(Arc::clone(&integrations))),
            settings.marketplace.geocode_cache_size,
            settings.marketplace.geocode_cache_ttl_secs,
        ));
        Self::with_services(settings, data, auth, integrations, geocoder)
    }

    /// Builds the services over the given collaborators.
    pub fn with_services(
        settings: Settings,
        data: Arc<dyn DataService>,
        auth: Arc<dyn AuthService>,
        integrations: Arc<dyn Integrations>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        let entities = Entities::new(data);
        let search = SearchService::new(
            entities.vehicles.clone(),
            Arc::clone(&integrations),
            Arc::clone(&geocoder),
        );
        let wizard = WizardService::new(
            Arc::clone(&integrations),
            Arc::clone(&geocoder),
            entities.vehicles.clone(),
        );
        let messaging = MessagingService::new(&entities, &settings.messaging);
        let listings = ListingService::new(
            entities.clone(),
            Arc::clone(&integrations),
            settings.marketplace.similar_limit,
        );
        let profile = ProfileService::new(Arc::clone(&auth), Arc::clone(&integrations));
        let marketplace_state = Arc::new(MarketplaceStateStore::new(
            settings.marketplace.session_cache_size,
            settings.marketplace.session_cache_ttl_secs,
        ));
        let drafts = Arc::new(DraftStore::new(
            settings.wizard.draft_cache_size,
            settings.wizard.draft_cache_ttl_secs,
        ));

        Self {
            settings: Arc::new(settings),
            auth,
            entities,
            integrations,
            geocoder,
            search,
            marketplace_state,
            wizard,
            drafts,
            messaging: Arc::new(messaging),
            listings,
            profile,
        }
    }
}

/// The full router: pages, JSON API, static files and request tracing.
pub fn build_app(state: AppState) -> Router {
    routes::create_router(state)
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
}
