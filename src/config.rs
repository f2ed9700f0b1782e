// src/config.rs

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::attendance::{EmployeeRecord, LeaveType, OrganizationRecord};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Socket address the server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// JSON file with the organization, employee, and leave-type records to
    /// load at startup.
    #[serde(default = "default_seed_data_path")]
    pub seed_data_path: String,

    /// Optional webhook endpoint for penalty notices. Notifications are
    /// disabled when unset.
    pub penalty_webhook_url: Option<String>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_seed_data_path() -> String {
    "data/seed.example.json".to_string()
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        // Parse environment variables into Config struct
        envy::from_env::<Config>()
    }
}

/// Records standing in for the external organization/employee store, loaded
/// once at startup.
#[derive(Debug, Deserialize)]
pub struct SeedData {
    pub organizations: Vec<OrganizationRecord>,
    pub employees: Vec<EmployeeRecord>,
    #[serde(default)]
    pub leave_types: Vec<LeaveType>,
}

pub fn load_seed_data(path: &Path) -> anyhow::Result<SeedData> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed data file: {}", path.display()))?;
    let seed: SeedData = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse seed data file: {}", path.display()))?;
    Ok(seed)
}

// --- Test Module ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::PenaltyOption;
    use chrono::NaiveTime;
    use rust_decimal_macros::dec;

    #[test]
    fn seed_data_parses_policy_fields() {
        let raw = r#"{
            "organizations": [{
                "id": "ORG1",
                "name": "Acme Staffing",
                "timezone": "Asia/Kolkata",
                "login_time": "09:30",
                "late_login_threshold": 2,
                "penalty_option": "salary",
                "penalty_salary_amount": "150.50"
            }],
            "employees": [{
                "id": "E1",
                "name": "Asha Rao",
                "organization_id": "ORG1"
            }]
        }"#;

        let seed: SeedData = serde_json::from_str(raw).expect("seed JSON should parse");
        assert_eq!(seed.organizations.len(), 1);
        assert_eq!(seed.employees.len(), 1);
        assert!(seed.leave_types.is_empty());

        let org = &seed.organizations[0];
        assert_eq!(org.timezone, chrono_tz::Asia::Kolkata);
        assert_eq!(
            org.login_time,
            NaiveTime::from_hms_opt(9, 30, 0).expect("valid time")
        );
        assert_eq!(org.penalty_option, PenaltyOption::Salary);
        assert_eq!(org.penalty_salary_amount, dec!(150.50));
        assert!(org.penalty_leave_type.is_empty());
    }

    #[test]
    fn malformed_login_time_is_rejected_at_load() {
        let raw = r#"{
            "organizations": [{
                "id": "ORG1",
                "name": "Acme Staffing",
                "timezone": "UTC",
                "login_time": "late morning",
                "late_login_threshold": 2,
                "penalty_option": "leave",
                "penalty_leave_type": "half day"
            }],
            "employees": []
        }"#;

        let result: Result<SeedData, _> = serde_json::from_str(raw);
        assert!(result.is_err(), "a non-HH:MM cutoff must fail the load");
    }
}
