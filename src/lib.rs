//! Paginated caption gallery over a remote caption/image store, with a
//! sign-in gated route for creating captions.
//!
//! The HTTP surface lives in [`routes`] and [`handlers`]. [`gallery`] and
//! [`session`] hold the state a front end keeps per view.

pub mod auth_client;
pub mod aws_clients;
pub mod captions;
pub mod config;
pub mod domain;
pub mod errors;
pub mod gallery;
pub mod handlers;
pub mod identity;
pub mod memory;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod session;
pub mod startup;

use domain::{GalleryRepository, IdentityProvider};
use gallery::GalleryAssembler;
use std::sync::Arc;

/// AppState holds shared resources for the web server.
pub struct AppState {
    pub gallery: GalleryAssembler,
    pub repo: Arc<dyn GalleryRepository>,
    pub identity: Arc<dyn IdentityProvider>,
    pub oauth_provider: String,
    pub public_origin: String,
}
