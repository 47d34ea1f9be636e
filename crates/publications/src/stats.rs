//! Aggregates over a set of publications.

use serde::Serialize;

use crate::publication::{Publication, VerificationStatus};

/// Number of years shown on publication charts, ending at the current year.
pub const CHART_YEARS: i32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublicationStats {
    pub total: usize,
    pub verified: usize,
    pub scopus_indexed: usize,
    pub ugc_care: usize,
}

pub fn publication_stats(publications: &[Publication]) -> PublicationStats {
    PublicationStats {
        total: publications.len(),
        verified: publications.iter().filter(|p| p.is_verified()).count(),
        scopus_indexed: publications.iter().filter(|p| p.is_scopus_indexed).count(),
        ugc_care: publications.iter().filter(|p| p.is_ugc_care).count(),
    }
}

/// Per-year series for the last [`CHART_YEARS`] years, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicationChart {
    pub years: Vec<i32>,
    pub per_year: Vec<usize>,
    pub verified: Vec<usize>,
    pub pending: Vec<usize>,
}

impl PublicationChart {
    pub fn labels(&self) -> Vec<String> {
        self.years.iter().map(i32::to_string).collect()
    }
}

pub fn publication_chart(publications: &[Publication], current_year: i32) -> PublicationChart {
    let years: Vec<i32> = (current_year - CHART_YEARS + 1..=current_year).collect();

    let count = |year: i32, status: Option<VerificationStatus>| {
        publications
            .iter()
            .filter(|p| p.publication_year == Some(year))
            .filter(|p| status.is_none_or(|s| p.verification_status == s))
            .count()
    };

    PublicationChart {
        per_year: years.iter().map(|y| count(*y, None)).collect(),
        verified: years
            .iter()
            .map(|y| count(*y, Some(VerificationStatus::Verified)))
            .collect(),
        pending: years
            .iter()
            .map(|y| count(*y, Some(VerificationStatus::Pending)))
            .collect(),
        years,
    }
}

/// Publications split by verification status, order preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationSplit {
    pub pending: Vec<Publication>,
    pub verified: Vec<Publication>,
}

pub fn split_by_status(publications: Vec<Publication>) -> VerificationSplit {
    let (verified, pending) = publications.into_iter().partition(Publication::is_verified);
    VerificationSplit { pending, verified }
}
