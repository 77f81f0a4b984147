// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Activity Hub: student achievement tracking for an academic institution
//!
//! Students submit activity records with attachments, faculty review them,
//! and administrators see aggregate analytics and manage derived-admin
//! privileges. This crate provides the backend API.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use std::sync::Arc;

use config::Config;
use db::DocumentStore;
use services::{
    AccessService, ActivityService, GoogleIdentityVerifier, LiveSnapshots, NoticeService,
    PortfolioService,
};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Arc<dyn DocumentStore>,
    pub identity_verifier: Arc<GoogleIdentityVerifier>,
    pub access: AccessService,
    pub activities: ActivityService,
    pub notices: NoticeService,
    pub portfolio: PortfolioService,
    pub live: LiveSnapshots,
}

impl AppState {
    /// Wire every service to one store.
    pub fn new(
        config: Config,
        db: Arc<dyn DocumentStore>,
        identity_verifier: Arc<GoogleIdentityVerifier>,
    ) -> Self {
        Self {
            access: AccessService::new(db.clone(), &config.admin_secret),
            activities: ActivityService::new(db.clone(), config.upload_limit()),
            notices: NoticeService::new(db.clone()),
            portfolio: PortfolioService::new(db.clone()),
            live: LiveSnapshots::new(db.clone()),
            config,
            db,
            identity_verifier,
        }
    }
}
