use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const COMPANY_PLACEHOLDER: &str = "Company Not Listed";
pub const LOCATION_PLACEHOLDER: &str = "Location Not Listed";

/// A stored job listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub title: String,
    pub company: String,
    pub location: String,
    pub scraped_at: DateTime<Utc>,
    pub applied: bool,
}

/// One listing as pulled off the search results page, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedJob {
    pub title: String,
    pub company: String,
    pub location: String,
}

impl ScrapedJob {
    pub fn new(title: &str, company: &str, location: &str) -> Self {
        Self {
            title: title.to_string(),
            company: company.to_string(),
            location: location.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperienceBand {
    ZeroToOne,
    TwoToThree,
    FourToFive,
    SixToTen,
    TenPlus,
}

impl ExperienceBand {
    pub fn label(&self) -> &'static str {
        match self {
            ExperienceBand::ZeroToOne => "0-1",
            ExperienceBand::TwoToThree => "2-3",
            ExperienceBand::FourToFive => "4-5",
            ExperienceBand::SixToTen => "6-10",
            ExperienceBand::TenPlus => "10+",
        }
    }

    /// Qualitative wording used in letters ("solid experience").
    pub fn phrase(&self) -> &'static str {
        match self {
            ExperienceBand::ZeroToOne => "foundational",
            ExperienceBand::TwoToThree => "solid",
            ExperienceBand::FourToFive => "extensive",
            ExperienceBand::SixToTen => "deep",
            ExperienceBand::TenPlus => "seasoned",
        }
    }
}

impl FromStr for ExperienceBand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "0-1" => Ok(ExperienceBand::ZeroToOne),
            "2-3" => Ok(ExperienceBand::TwoToThree),
            "4-5" => Ok(ExperienceBand::FourToFive),
            "6-10" => Ok(ExperienceBand::SixToTen),
            "10+" => Ok(ExperienceBand::TenPlus),
            other => Err(anyhow!(
                "Unknown experience band '{}'. Available: 0-1, 2-3, 4-5, 6-10, 10+",
                other
            )),
        }
    }
}

impl fmt::Display for ExperienceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Optional details the applicant types in before generating a letter.
#[derive(Debug, Clone, Default)]
pub struct ApplicantProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub experience: Option<ExperienceBand>,
    pub skills: Vec<String>,
}

impl ApplicantProfile {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.experience.is_none()
            && self.skills.is_empty()
    }
}

/// Split a free-form "Python, Rust , SQL" skills field into clean entries.
pub fn parse_skills(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeMode {
    Deterministic,
    AiAssisted,
}

#[derive(Debug, Clone)]
pub struct CoverLetterRequest {
    pub job_title: String,
    pub company: String,
    pub location: Option<String>,
    pub applicant: Option<ApplicantProfile>,
    pub mode: ComposeMode,
}

impl CoverLetterRequest {
    pub fn new(job_title: &str, company: &str, mode: ComposeMode) -> Self {
        Self {
            job_title: job_title.to_string(),
            company: company.to_string(),
            location: None,
            applicant: None,
            mode,
        }
    }

    pub fn for_job(job: &JobRecord, applicant: Option<ApplicantProfile>, mode: ComposeMode) -> Self {
        Self {
            location: Some(job.location.clone()),
            applicant,
            ..Self::new(&job.title, &job.company, mode)
        }
    }

    /// Location worth mentioning in prose; extraction placeholders are left out.
    pub fn known_location(&self) -> Option<&str> {
        self.location
            .as_deref()
            .map(str::trim)
            .filter(|loc| !loc.is_empty() && *loc != LOCATION_PLACEHOLDER)
    }
}
