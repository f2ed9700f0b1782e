// src/attendance.rs
//
// Late-login detection and penalty accrual. A login is evaluated synchronously
// against the owning organization's policy the moment it is recorded: the
// engine counts the distinct calendar days with at least one late login in the
// current month and, once that count exceeds the configured threshold, applies
// the configured penalty (a system-generated leave request or a salary
// deduction accrual).
//
// The login event is stored before the penalty step runs and is never rolled
// back; a failing penalty path still leaves the login recorded. The
// read-then-write sequence is not transactionally isolated, so two concurrent
// late logins for the same employee can both observe the same late-day count
// and double-apply a penalty. Callers must also guarantee at-most-once
// invocation per login event; the engine does not dedupe.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

// --- Error Types ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttendanceError {
    #[error("penalty leave type not defined; contact admin")]
    PenaltyLeaveTypeNotDefined { organization_id: String },

    #[error("Employee not found: {employee_id}")]
    EmployeeNotFound { employee_id: String },

    #[error("Organization not found: {organization_id}")]
    OrganizationNotFound { organization_id: String },
}

// --- Constants ---

/// Ledger label all salary penalties collapse into. At most one entry with
/// this name exists per employee.
pub const PENALTY_DEDUCTION_NAME: &str = "Penalties";

/// Leave type the leave-penalty path books against. Its absence is a
/// configuration error, not a silent skip.
pub const PENALTY_LEAVE_TYPE_NAME: &str = "Earned Leave";

/// Sentinel reason marking a leave request as system-generated, so it is
/// distinguishable from employee-submitted leave.
pub const PENALTY_LEAVE_REASON: &str = "System generated: late login penalty";

/// Unit string to applied-days mapping. Unrecognized units book zero days;
/// that is deliberate, not an error.
pub fn applied_days_for_unit(unit: &str) -> Decimal {
    match unit {
        "half day" => dec!(0.5),
        "Full Day" => dec!(1),
        "quarter day" => dec!(0.25),
        _ => dec!(0),
    }
}

// --- Core Data Structures ---

type EmployeeId = String;
type OrganizationId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginAction {
    Login,
    Logout,
}

/// One recorded login/logout action. Timestamps are the organization's wall
/// clock; immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginEvent {
    pub employee_id: EmployeeId,
    pub timestamp: NaiveDateTime,
    pub action: LoginAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PenaltyOption {
    Leave,
    Salary,
}

/// Organization record with the attendance policy snapshot consulted on every
/// evaluation. `login_time` is the official start-of-day cutoff in the
/// organization's own wall clock; `late_login_threshold` is exclusive
/// (strictly more late days than this triggers the penalty).
#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationRecord {
    pub id: OrganizationId,
    pub name: String,
    pub timezone: Tz,
    #[serde(deserialize_with = "deserialize_login_time")]
    pub login_time: NaiveTime,
    pub late_login_threshold: u32,
    pub penalty_option: PenaltyOption,
    #[serde(default)]
    pub penalty_leave_type: String,
    #[serde(default)]
    pub penalty_salary_amount: Decimal,
}

// Policy files carry the cutoff as "HH:MM".
fn deserialize_login_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    NaiveTime::parse_from_str(&raw, "%H:%M").map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionEntry {
    pub name: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmployeeRecord {
    pub id: EmployeeId,
    pub name: String,
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub deductions: Vec<DeductionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaveType {
    pub id: String,
    pub organization_id: OrganizationId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

/// Leave request created as a penalty side effect. Approval lifecycle is owned
/// by the external leave workflow; it starts out Pending here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PenaltyLeaveRequest {
    pub employee_id: EmployeeId,
    pub leave_type_id: String,
    pub applied_days: Decimal,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub leave_reason: String,
    pub status: LeaveStatus,
}

/// What the evaluation decided for one login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PenaltyOutcome {
    OnTime,
    LateWithinThreshold {
        late_days_this_month: usize,
    },
    LeavePenaltyApplied {
        late_days_this_month: usize,
        applied_days: Decimal,
    },
    SalaryPenaltyApplied {
        late_days_this_month: usize,
        amount: Decimal,
        total_penalties: Decimal,
    },
}

impl PenaltyOutcome {
    pub fn is_penalty(&self) -> bool {
        matches!(
            self,
            PenaltyOutcome::LeavePenaltyApplied { .. } | PenaltyOutcome::SalaryPenaltyApplied { .. }
        )
    }
}

/// Result of recording one login: the wall-clock timestamp that was stored and
/// the penalty decision taken against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginReceipt {
    pub employee_id: EmployeeId,
    pub organization_id: OrganizationId,
    pub recorded_at: NaiveDateTime,
    pub outcome: PenaltyOutcome,
}

// --- Attendance System Implementation ---

#[derive(Clone, Default)]
pub struct AttendanceSystem {
    organizations: Arc<Mutex<HashMap<OrganizationId, OrganizationRecord>>>,
    employees: Arc<Mutex<HashMap<EmployeeId, EmployeeRecord>>>,
    login_events: Arc<Mutex<HashMap<EmployeeId, Vec<LoginEvent>>>>,
    leave_types: Arc<Mutex<Vec<LeaveType>>>,
    leave_requests: Arc<Mutex<Vec<PenaltyLeaveRequest>>>,
}

impl AttendanceSystem {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Configuration Methods ---

    pub fn register_organization(&self, organization: OrganizationRecord) {
        info!(
            "Registering organization: Id={}, Name={}, Cutoff={}, Threshold={}",
            organization.id, organization.name, organization.login_time, organization.late_login_threshold
        );
        self.organizations
            .lock()
            .unwrap()
            .insert(organization.id.clone(), organization);
    }

    pub fn register_employee(&self, employee: EmployeeRecord) {
        info!(
            "Registering employee: Id={}, Name={}, Org={}",
            employee.id, employee.name, employee.organization_id
        );
        self.employees
            .lock()
            .unwrap()
            .insert(employee.id.clone(), employee);
    }

    pub fn register_leave_type(&self, leave_type: LeaveType) {
        info!(
            "Registering leave type: Id={}, Org={}, Name={}",
            leave_type.id, leave_type.organization_id, leave_type.name
        );
        self.leave_types.lock().unwrap().push(leave_type);
    }

    // --- Record Access ---

    pub fn get_employee(&self, employee_id: &str) -> Result<EmployeeRecord, AttendanceError> {
        self.employees
            .lock()
            .unwrap()
            .get(employee_id)
            .cloned()
            .ok_or_else(|| AttendanceError::EmployeeNotFound {
                employee_id: employee_id.to_string(),
            })
    }

    pub fn get_organization(
        &self,
        organization_id: &str,
    ) -> Result<OrganizationRecord, AttendanceError> {
        self.organizations
            .lock()
            .unwrap()
            .get(organization_id)
            .cloned()
            .ok_or_else(|| AttendanceError::OrganizationNotFound {
                organization_id: organization_id.to_string(),
            })
    }

    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let organizations = self.organizations.lock().unwrap().len();
        let employees = self.employees.lock().unwrap().len();
        let events = self.login_events.lock().unwrap().values().map(Vec::len).sum();
        let leave_requests = self.leave_requests.lock().unwrap().len();
        (organizations, employees, events, leave_requests)
    }

    pub fn login_events_for(&self, employee_id: &str) -> Vec<LoginEvent> {
        self.login_events
            .lock()
            .unwrap()
            .get(employee_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn leave_requests_for(&self, employee_id: &str) -> Vec<PenaltyLeaveRequest> {
        self.leave_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.employee_id == employee_id)
            .cloned()
            .collect()
    }

    // --- Core Logic Methods ---

    /// Record a login at the given server instant and evaluate the late-login
    /// policy against it. The event is stored first; a penalty-path error
    /// (missing penalty leave type) is reported to the caller but leaves the
    /// recorded event in place.
    pub fn record_login(
        &self,
        employee_id: &str,
        recorded_at: DateTime<Utc>,
    ) -> Result<LoginReceipt, AttendanceError> {
        let employee = self.get_employee(employee_id)?;
        let organization = self.get_organization(&employee.organization_id)?;
        let local_ts = recorded_at.with_timezone(&organization.timezone).naive_local();

        info!(
            "Recording login: Emp={}, Org={}, LocalTime={}",
            employee.id, organization.id, local_ts
        );
        self.push_event(LoginEvent {
            employee_id: employee.id.clone(),
            timestamp: local_ts,
            action: LoginAction::Login,
        });

        let outcome = self.evaluate_penalty(&organization, &employee.id, local_ts)?;
        Ok(LoginReceipt {
            employee_id: employee.id,
            organization_id: organization.id,
            recorded_at: local_ts,
            outcome,
        })
    }

    /// Record a logout action. Logouts are kept in the same event store but
    /// never participate in lateness evaluation.
    pub fn record_logout(
        &self,
        employee_id: &str,
        recorded_at: DateTime<Utc>,
    ) -> Result<NaiveDateTime, AttendanceError> {
        let employee = self.get_employee(employee_id)?;
        let organization = self.get_organization(&employee.organization_id)?;
        let local_ts = recorded_at.with_timezone(&organization.timezone).naive_local();

        info!(
            "Recording logout: Emp={}, Org={}, LocalTime={}",
            employee.id, organization.id, local_ts
        );
        self.push_event(LoginEvent {
            employee_id: employee.id,
            timestamp: local_ts,
            action: LoginAction::Logout,
        });
        Ok(local_ts)
    }

    fn push_event(&self, event: LoginEvent) {
        self.login_events
            .lock()
            .unwrap()
            .entry(event.employee_id.clone())
            .or_default()
            .push(event);
    }

    /// Decide and apply the penalty for one just-recorded login.
    ///
    /// Every evaluation that finds the distinct-late-day count already past
    /// the threshold applies the penalty again; there is no
    /// "already penalized this month" guard. The penalty accrues once per
    /// qualifying late login, not once per month.
    fn evaluate_penalty(
        &self,
        organization: &OrganizationRecord,
        employee_id: &str,
        login_ts: NaiveDateTime,
    ) -> Result<PenaltyOutcome, AttendanceError> {
        let cutoff = login_ts.date().and_time(organization.login_time);
        if login_ts <= cutoff {
            debug!(
                "Login on time: Emp={}, Time={}, Cutoff={}",
                employee_id, login_ts, cutoff
            );
            return Ok(PenaltyOutcome::OnTime);
        }

        let late_days = self.distinct_late_days_in_month(
            employee_id,
            login_ts.date(),
            organization.login_time,
        );
        debug!(
            "Late login: Emp={}, Date={}, DistinctLateDaysThisMonth={}",
            employee_id,
            login_ts.date(),
            late_days.len()
        );

        if late_days.len() <= organization.late_login_threshold as usize {
            return Ok(PenaltyOutcome::LateWithinThreshold {
                late_days_this_month: late_days.len(),
            });
        }

        warn!(
            "Late-day threshold exceeded: Emp={}, LateDays={}, Threshold={}",
            employee_id,
            late_days.len(),
            organization.late_login_threshold
        );
        match organization.penalty_option {
            PenaltyOption::Leave => {
                self.apply_leave_penalty(organization, employee_id, login_ts.date(), late_days.len())
            }
            PenaltyOption::Salary => {
                self.apply_salary_penalty(organization, employee_id, late_days.len())
            }
        }
    }

    /// Distinct calendar days in the month of `day` with at least one late
    /// login. Two late logins on one day count once.
    fn distinct_late_days_in_month(
        &self,
        employee_id: &str,
        day: NaiveDate,
        login_time: NaiveTime,
    ) -> BTreeSet<NaiveDate> {
        let (month_start, month_end) = month_bounds(day);
        let events_guard = self.login_events.lock().unwrap();
        events_guard
            .get(employee_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|event| event.action == LoginAction::Login)
                    .filter(|event| {
                        let event_day = event.timestamp.date();
                        event_day >= month_start && event_day <= month_end
                    })
                    .filter(|event| event.timestamp > event.timestamp.date().and_time(login_time))
                    .map(|event| event.timestamp.date())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn apply_leave_penalty(
        &self,
        organization: &OrganizationRecord,
        employee_id: &str,
        day: NaiveDate,
        late_day_count: usize,
    ) -> Result<PenaltyOutcome, AttendanceError> {
        let leave_type_id = self
            .leave_types
            .lock()
            .unwrap()
            .iter()
            .find(|lt| lt.organization_id == organization.id && lt.name == PENALTY_LEAVE_TYPE_NAME)
            .map(|lt| lt.id.clone())
            .ok_or_else(|| AttendanceError::PenaltyLeaveTypeNotDefined {
                organization_id: organization.id.clone(),
            })?;

        let applied_days = applied_days_for_unit(&organization.penalty_leave_type);
        let request = PenaltyLeaveRequest {
            employee_id: employee_id.to_string(),
            leave_type_id,
            applied_days,
            from_date: day,
            to_date: day,
            leave_reason: PENALTY_LEAVE_REASON.to_string(),
            status: LeaveStatus::Pending,
        };
        info!(
            "Applying leave penalty: Emp={}, Date={}, AppliedDays={}",
            employee_id, day, applied_days
        );
        self.leave_requests.lock().unwrap().push(request);

        Ok(PenaltyOutcome::LeavePenaltyApplied {
            late_days_this_month: late_day_count,
            applied_days,
        })
    }

    fn apply_salary_penalty(
        &self,
        organization: &OrganizationRecord,
        employee_id: &str,
        late_day_count: usize,
    ) -> Result<PenaltyOutcome, AttendanceError> {
        let amount = organization.penalty_salary_amount;
        let mut employees_guard = self.employees.lock().unwrap();
        let employee =
            employees_guard
                .get_mut(employee_id)
                .ok_or_else(|| AttendanceError::EmployeeNotFound {
                    employee_id: employee_id.to_string(),
                })?;

        // All accruals collapse into the single "Penalties" entry.
        let total = match employee
            .deductions
            .iter_mut()
            .find(|entry| entry.name == PENALTY_DEDUCTION_NAME)
        {
            Some(entry) => {
                entry.amount += amount;
                entry.amount
            }
            None => {
                employee.deductions.push(DeductionEntry {
                    name: PENALTY_DEDUCTION_NAME.to_string(),
                    amount,
                });
                amount
            }
        };
        info!(
            "Applying salary penalty: Emp={}, Amount={}, TotalPenalties={}",
            employee_id, amount, total
        );

        Ok(PenaltyOutcome::SalaryPenaltyApplied {
            late_days_this_month: late_day_count,
            amount,
            total_penalties: total,
        })
    }
}

/// First and last day of the month containing `day`, both inclusive.
fn month_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = NaiveDate::from_ymd_opt(day.year(), day.month(), 1).unwrap_or(day);
    let next_month_start = if day.month() == 12 {
        NaiveDate::from_ymd_opt(day.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(day.year(), day.month() + 1, 1)
    };
    let end = next_month_start
        .and_then(|d| d.pred_opt())
        .unwrap_or(day);
    (start, end)
}
