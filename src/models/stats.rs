//! Dashboard aggregates computed from the current activity and user snapshots.
//!
//! Everything here is recomputed in full from a snapshot; nothing is stored.

use serde::Serialize;

use crate::models::{Activity, ActivityStatus, Role, User};

/// Categories shown in the dashboard histogram.
pub const TOP_CATEGORIES: usize = 8;

/// Activities shown in the "recent" list.
pub const RECENT_ACTIVITIES: usize = 10;

/// Label for activities without a department snapshot.
pub const UNKNOWN_DEPARTMENT: &str = "Unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u32,
    pub approved: u32,
    pub rejected: u32,
    pub total: u32,
}

impl StatusCounts {
    pub fn from_activities<'a>(activities: impl IntoIterator<Item = &'a Activity>) -> Self {
        let mut counts = Self::default();
        for activity in activities {
            match activity.status {
                ActivityStatus::Pending => counts.pending += 1,
                ActivityStatus::Approved => counts.approved += 1,
                ActivityStatus::Rejected => counts.rejected += 1,
            }
            counts.total += 1;
        }
        counts
    }

    /// approved / (approved + rejected) as a percentage, one decimal.
    ///
    /// Zero when nothing has been decided yet.
    pub fn approval_rate(&self) -> f64 {
        let decided = self.approved + self.rejected;
        if decided == 0 {
            return 0.0;
        }
        round1(f64::from(self.approved) / f64::from(decided) * 100.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCounts {
    pub students: u32,
    pub faculty: u32,
    pub admins: u32,
    pub derived_admins: u32,
}

impl RoleCounts {
    pub fn from_users(users: &[User]) -> Self {
        let mut counts = Self::default();
        for user in users {
            match user.role {
                Role::Student => counts.students += 1,
                Role::Faculty => counts.faculty += 1,
                Role::Admin => counts.admins += 1,
                Role::DerivedAdmin => counts.derived_admins += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBucket {
    pub label: String,
    pub count: u32,
    pub percentage: f64,
}

/// Count labels, then sort by count descending keeping first-seen order for ties.
fn histogram<'a>(labels: impl IntoIterator<Item = &'a str>) -> Vec<HistogramBucket> {
    let mut buckets: Vec<(&str, u32)> = Vec::new();
    let mut total = 0u32;

    for label in labels {
        total += 1;
        match buckets.iter_mut().find(|(seen, _)| *seen == label) {
            Some((_, count)) => *count += 1,
            None => buckets.push((label, 1)),
        }
    }

    // sort_by is stable, so ties stay in first-seen order
    buckets.sort_by(|a, b| b.1.cmp(&a.1));

    buckets
        .into_iter()
        .map(|(label, count)| HistogramBucket {
            label: label.to_string(),
            count,
            percentage: percentage(count, total),
        })
        .collect()
}

/// Category histogram, truncated to the top `limit` entries.
pub fn category_histogram(activities: &[Activity], limit: usize) -> Vec<HistogramBucket> {
    let mut buckets = histogram(activities.iter().map(|a| a.category.as_str()));
    buckets.truncate(limit);
    buckets
}

/// Department histogram over the submission-time department snapshot.
pub fn department_histogram(activities: &[Activity]) -> Vec<HistogramBucket> {
    histogram(activities.iter().map(|a| {
        a.student_department
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(UNKNOWN_DEPARTMENT)
    }))
}

/// The `limit` newest activities by creation time.
pub fn recent_activities(activities: &[Activity], limit: usize) -> Vec<Activity> {
    let mut sorted: Vec<&Activity> = activities.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted.into_iter().take(limit).cloned().collect()
}

fn percentage(count: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round1(f64::from(count) / f64::from(total) * 100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Admin dashboard payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub activities: StatusCounts,
    pub users: RoleCounts,
    pub approval_rate: f64,
    pub categories: Vec<HistogramBucket>,
    pub departments: Vec<HistogramBucket>,
    pub recent: Vec<Activity>,
}

impl DashboardStats {
    pub fn compute(activities: &[Activity], users: &[User]) -> Self {
        let counts = StatusCounts::from_activities(activities);
        Self {
            activities: counts,
            users: RoleCounts::from_users(users),
            approval_rate: counts.approval_rate(),
            categories: category_histogram(activities, TOP_CATEGORIES),
            departments: department_histogram(activities),
            recent: recent_activities(activities, RECENT_ACTIVITIES),
        }
    }
}
