// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod access;
pub mod google_oidc;
pub mod live;
pub mod notices;
pub mod portfolio;
pub mod review;

pub use access::AccessService;
pub use google_oidc::{GoogleIdentityVerifier, OidcError};
pub use live::LiveSnapshots;
pub use notices::NoticeService;
pub use portfolio::PortfolioService;
pub use review::{ActivityService, ActivitySubmission, Attachment};
