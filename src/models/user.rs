// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! User model, roles, and the role-to-capability table.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Account role. Exactly one per user.
///
/// Unknown role strings fail deserialization rather than falling back to a
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Role {
    Student,
    Faculty,
    Admin,
    DerivedAdmin,
}

/// Which dashboard the client renders for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Dashboard {
    Student,
    Faculty,
    Admin,
}

/// Actions gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    SubmitActivity,
    ExportPortfolio,
    FileComplaint,
    ReviewActivity,
    RequestElevation,
    ViewAnalytics,
    ViewUsers,
    ManageComplaints,
    BroadcastAlerts,
    DecideElevation,
    ManageDerivedAdmins,
}

/// Role → (dashboard, capabilities).
///
/// Derived admins get the admin dashboard but not elevation management.
static ROLE_TABLE: [(Role, Dashboard, &[Capability]); 4] = [
    (
        Role::Student,
        Dashboard::Student,
        &[
            Capability::SubmitActivity,
            Capability::ExportPortfolio,
            Capability::FileComplaint,
        ],
    ),
    (
        Role::Faculty,
        Dashboard::Faculty,
        &[Capability::ReviewActivity, Capability::RequestElevation],
    ),
    (
        Role::Admin,
        Dashboard::Admin,
        &[
            Capability::ViewAnalytics,
            Capability::ViewUsers,
            Capability::ManageComplaints,
            Capability::BroadcastAlerts,
            Capability::DecideElevation,
            Capability::ManageDerivedAdmins,
        ],
    ),
    (
        Role::DerivedAdmin,
        Dashboard::Admin,
        &[
            Capability::ReviewActivity,
            Capability::ViewAnalytics,
            Capability::ViewUsers,
            Capability::ManageComplaints,
            Capability::BroadcastAlerts,
        ],
    ),
];

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Faculty => "faculty",
            Role::Admin => "admin",
            Role::DerivedAdmin => "derived-admin",
        }
    }

    fn entry(self) -> &'static (Role, Dashboard, &'static [Capability]) {
        // ROLE_TABLE covers every variant; the fallback is unreachable.
        ROLE_TABLE
            .iter()
            .find(|(role, _, _)| *role == self)
            .unwrap_or(&ROLE_TABLE[0])
    }

    pub fn dashboard(self) -> Dashboard {
        self.entry().1
    }

    pub fn can(self, capability: Capability) -> bool {
        self.entry().2.contains(&capability)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "faculty" => Ok(Role::Faculty),
            "admin" => Ok(Role::Admin),
            "derived-admin" => Ok(Role::DerivedAdmin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Accreditation body an admin reports under (informational only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Accreditation {
    Nba,
    Naac,
}

/// User profile stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct User {
    /// Identity provider subject (also used as document ID)
    pub uid: String,
    pub name: String,
    pub email: String,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub role: Role,
    /// Student roll number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faculty_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accreditation: Option<Accreditation>,
}

impl User {
    /// Stored secondary identifier checked at sign-in for this user's role.
    pub fn identifier_for(&self, role: Role) -> Option<&str> {
        match role {
            Role::Student => self.roll_no.as_deref(),
            Role::Faculty => self.faculty_id.as_deref(),
            Role::Admin | Role::DerivedAdmin => None,
        }
        .filter(|id| !id.is_empty())
    }

    /// Refresh denormalized profile fields from the identity provider.
    ///
    /// Blank provider values keep what is stored.
    pub fn merge_profile(&mut self, identity: &VerifiedIdentity) {
        if let Some(name) = non_blank(&identity.display_name) {
            self.name = name.to_string();
        }
        if let Some(email) = non_blank(&identity.email) {
            self.email = email.to_string();
        }
        if let Some(photo) = identity.photo_url.as_deref().and_then(non_blank) {
            self.photo_url = Some(photo.to_string());
        }
    }

    /// Build a fresh record from an identity.
    pub fn from_identity(identity: &VerifiedIdentity, role: Role, fallback_name: &str) -> Self {
        Self {
            uid: identity.subject.clone(),
            name: non_blank(&identity.display_name)
                .unwrap_or(fallback_name)
                .to_string(),
            email: identity.email.clone(),
            photo_url: identity.photo_url.clone().filter(|p| !p.trim().is_empty()),
            role,
            roll_no: None,
            faculty_id: None,
            branch: None,
            department: None,
            accreditation: None,
        }
    }
}

fn non_blank(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Identity returned by the authentication gateway after a verified login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Opaque, stable provider subject id
    pub subject: String,
    pub display_name: String,
    pub email: String,
    pub photo_url: Option<String>,
}

/// Role-specific attributes supplied at account creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileExtras {
    #[serde(default)]
    pub roll_no: Option<String>,
    #[serde(default)]
    pub faculty_id: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub accreditation: Option<Accreditation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str, email: &str, photo: Option<&str>) -> VerifiedIdentity {
        VerifiedIdentity {
            subject: "uid-1".to_string(),
            display_name: name.to_string(),
            email: email.to_string(),
            photo_url: photo.map(String::from),
        }
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(
            serde_json::to_string(&Role::DerivedAdmin).unwrap(),
            "\"derived-admin\""
        );
        let role: Role = serde_json::from_str("\"faculty\"").unwrap();
        assert_eq!(role, Role::Faculty);
        assert!(serde_json::from_str::<Role>("\"superuser\"").is_err());
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_dashboard_table() {
        assert_eq!(Role::Student.dashboard(), Dashboard::Student);
        assert_eq!(Role::Faculty.dashboard(), Dashboard::Faculty);
        assert_eq!(Role::Admin.dashboard(), Dashboard::Admin);
        assert_eq!(Role::DerivedAdmin.dashboard(), Dashboard::Admin);
    }

    #[test]
    fn test_derived_admin_cannot_manage_elevation() {
        assert!(Role::DerivedAdmin.can(Capability::ViewAnalytics));
        assert!(!Role::DerivedAdmin.can(Capability::DecideElevation));
        assert!(!Role::DerivedAdmin.can(Capability::ManageDerivedAdmins));
        assert!(Role::Admin.can(Capability::DecideElevation));
        assert!(!Role::Student.can(Capability::ReviewActivity));
    }

    #[test]
    fn test_user_serializes_camel_case() {
        let mut user = User::from_identity(&identity("Ada", "ada@uni.edu", None), Role::Student, "x");
        user.roll_no = Some("21CS001".to_string());

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["rollNo"], "21CS001");
        assert_eq!(json["role"], "student");
        assert!(json.get("photoURL").is_none());
    }

    #[test]
    fn test_merge_profile_keeps_stored_values_for_blanks() {
        let mut user = User::from_identity(
            &identity("Ada", "ada@uni.edu", Some("https://img/a.png")),
            Role::Faculty,
            "x",
        );
        user.merge_profile(&identity("", "new@uni.edu", Some(" ")));

        assert_eq!(user.name, "Ada");
        assert_eq!(user.email, "new@uni.edu");
        assert_eq!(user.photo_url.as_deref(), Some("https://img/a.png"));
    }

    #[test]
    fn test_identifier_for_ignores_empty() {
        let mut user = User::from_identity(&identity("Ada", "a@b", None), Role::Student, "x");
        user.roll_no = Some(String::new());
        assert_eq!(user.identifier_for(Role::Student), None);
        user.roll_no = Some("R1".to_string());
        assert_eq!(user.identifier_for(Role::Student), Some("R1"));
    }
}
