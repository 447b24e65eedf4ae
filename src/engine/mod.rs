//! Assignment engine
//!
//! CRUD and workflow for schedule assignments, with the ordered validation
//! pipeline:
//!
//! 1. Schedule exists and is editable (draft/pending)
//! 2. Employee exists and is active
//! 3. Shift exists
//! 4. No duplicate (schedule, employee, shift) tuple
//! 5. No overlapping shift already assigned within the schedule's week
//! 6. Shift requirements ⊆ employee qualifications
//! 7. Employee availability covers the shift window
//!
//! Single creates stop at the first failure; bulk creates collect per-row
//! errors and commit the successful subset (partial success is a normal
//! response shape, not a failure).
//!
//! Writes within one schedule serialize on an application-level keyed lock
//! held across the transaction; cache invalidation happens before events
//! publish so subscribers never read stale fanout.

pub mod locks;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{Action, Actor};
use crate::broadcast::{topics, Broadcaster, EventKind};
use crate::cache::{CacheFamily, CacheService};
use crate::config::EngineConfig;
use crate::error::{ConflictKind, Error, Result};
use crate::models::{
    AssignmentStatus, Employee, Notification, NotificationPriority, Schedule,
    ScheduleAssignment, Shift,
};
use crate::solver::Plan;
use crate::store::{AssignmentFilter, Page, PageRequest, RowOutcome, Store};

pub use locks::ScheduleLocks;

// ============================================================================
// Request / response shapes
// ============================================================================

/// One assignment to create
#[derive(Debug, Clone, Deserialize)]
pub struct NewAssignment {
    pub employee_id: Uuid,
    pub shift_id: Uuid,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Per-row error kinds for the validation pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowErrorKind {
    ScheduleNotEditable,
    EmployeeInactive,
    ShiftNotFound,
    DuplicateAssignment,
    OverlapConflict,
    QualificationMissing,
    AvailabilityViolation,
    AuthorizationDenied,
}

impl RowErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScheduleNotEditable => "schedule_not_editable",
            Self::EmployeeInactive => "employee_inactive",
            Self::ShiftNotFound => "shift_not_found",
            Self::DuplicateAssignment => "duplicate_assignment",
            Self::OverlapConflict => "overlap_conflict",
            Self::QualificationMissing => "qualification_missing",
            Self::AvailabilityViolation => "availability_violation",
            Self::AuthorizationDenied => "authorization_denied",
        }
    }

    /// Lift a row error into the unified error type (single-create path)
    pub fn into_error(self, message: String) -> Error {
        match self {
            Self::ScheduleNotEditable => {
                Error::conflict(ConflictKind::ScheduleNotEditable, message)
            }
            Self::EmployeeInactive => Error::validation("employee_id", message),
            Self::ShiftNotFound => Error::validation("shift_id", message),
            Self::DuplicateAssignment => Error::conflict(ConflictKind::Duplicate, message),
            Self::OverlapConflict => Error::conflict(ConflictKind::Overlap, message),
            Self::QualificationMissing => Error::conflict(ConflictKind::Qualification, message),
            Self::AvailabilityViolation => Error::conflict(ConflictKind::Availability, message),
            Self::AuthorizationDenied => Error::forbidden(message),
        }
    }
}

/// One failed row in a bulk response
#[derive(Debug, Clone, Serialize)]
pub struct BulkItemError {
    pub index: usize,
    pub employee_id: Uuid,
    pub shift_id: Uuid,
    pub error_kind: String,
    pub message: String,
}

/// Bulk creation response: partial success is first-class
#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub created: Vec<ScheduleAssignment>,
    pub errors: Vec<BulkItemError>,
    pub total_processed: usize,
    pub total_created: usize,
    pub total_errors: usize,
}

/// A conflicting pair found by `check_conflicts`
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentConflict {
    pub assignment_id: Uuid,
    pub other_assignment_id: Uuid,
    pub shift_id: Uuid,
    pub other_shift_id: Uuid,
    pub date: chrono::NaiveDate,
}

// ============================================================================
// Engine
// ============================================================================

/// The assignment engine
pub struct AssignmentEngine {
    store: Store,
    cache: Option<Arc<CacheService>>,
    broadcaster: Arc<Broadcaster>,
    config: EngineConfig,
    locks: ScheduleLocks,
}

impl AssignmentEngine {
    pub fn new(
        store: Store,
        cache: Option<Arc<CacheService>>,
        broadcaster: Arc<Broadcaster>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            cache,
            broadcaster,
            config,
            locks: ScheduleLocks::new(),
        }
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Create one assignment, stopping at the first pipeline failure
    pub async fn create_single(
        &self,
        actor: &Actor,
        schedule_id: Uuid,
        request: NewAssignment,
    ) -> Result<ScheduleAssignment> {
        actor.allows(Action::AssignmentCreate)?;
        let _guard = self.locks.acquire(schedule_id).await;

        let schedule = self.editable_schedule(schedule_id).await?;
        let context = self.load_context(&schedule, &[request.clone()]).await?;

        if let Some((kind, message)) = self.validate_row(&schedule, &context, &request, &[]) {
            return Err(kind.into_error(message));
        }

        let assignment = self.build_assignment(actor, &schedule, &request, false);
        self.store.assignments.create(&assignment).await?;

        self.after_write(&schedule).await;
        self.publish_assignment(EventKind::AssignmentCreated, &assignment);
        self.notify_assignee(&assignment, &context).await;

        Ok(assignment)
    }

    /// Create many assignments; the valid subset commits
    pub async fn create_bulk(
        &self,
        actor: &Actor,
        schedule_id: Uuid,
        requests: Vec<NewAssignment>,
    ) -> Result<BulkResponse> {
        actor.allows(Action::AssignmentCreate)?;
        let _guard = self.locks.acquire(schedule_id).await;

        let schedule = self.editable_schedule(schedule_id).await?;
        let context = self.load_context(&schedule, &requests).await?;

        let mut errors: Vec<BulkItemError> = Vec::new();
        let mut accepted: Vec<(usize, ScheduleAssignment)> = Vec::new();
        let mut accepted_rows: Vec<NewAssignment> = Vec::new();

        for (index, request) in requests.iter().enumerate() {
            match self.validate_row(&schedule, &context, request, &accepted_rows) {
                Some((kind, message)) => errors.push(BulkItemError {
                    index,
                    employee_id: request.employee_id,
                    shift_id: request.shift_id,
                    error_kind: kind.as_str().to_string(),
                    message,
                }),
                None => {
                    let assignment = self.build_assignment(actor, &schedule, request, false);
                    accepted.push((index, assignment));
                    accepted_rows.push(request.clone());
                }
            }
        }

        // Per-item savepoints catch what validation could not (races, fk)
        let rows: Vec<ScheduleAssignment> =
            accepted.iter().map(|(_, a)| a.clone()).collect();
        let outcomes = self.store.assignments.create_bulk(&rows).await?;

        let mut created = Vec::new();
        for ((index, _), outcome) in accepted.into_iter().zip(outcomes) {
            let request = &requests[index];
            match outcome {
                RowOutcome::Created(assignment) => created.push(assignment),
                RowOutcome::Duplicate => errors.push(BulkItemError {
                    index,
                    employee_id: request.employee_id,
                    shift_id: request.shift_id,
                    error_kind: RowErrorKind::DuplicateAssignment.as_str().to_string(),
                    message: "assignment already exists".to_string(),
                }),
                RowOutcome::Failed(message) => errors.push(BulkItemError {
                    index,
                    employee_id: request.employee_id,
                    shift_id: request.shift_id,
                    error_kind: "internal".to_string(),
                    message,
                }),
            }
        }
        errors.sort_by_key(|e| e.index);

        if !created.is_empty() {
            self.after_write(&schedule).await;
            for assignment in &created {
                self.publish_assignment(EventKind::AssignmentCreated, assignment);
            }
        }

        Ok(BulkResponse {
            total_processed: requests.len(),
            total_created: created.len(),
            total_errors: errors.len(),
            created,
            errors,
        })
    }

    /// Apply a solver plan to a schedule
    ///
    /// The plan's assignments run through the same bulk pipeline, marked
    /// auto-assigned. An optional `expected_version` guards against
    /// concurrent edits since the snapshot was taken.
    pub async fn apply_solver_plan(
        &self,
        actor: &Actor,
        schedule_id: Uuid,
        plan: &Plan,
        expected_version: Option<i32>,
    ) -> Result<BulkResponse> {
        actor.allows(Action::AssignmentCreate)?;
        let _guard = self.locks.acquire(schedule_id).await;

        let schedule = self.editable_schedule(schedule_id).await?;
        if let Some(expected) = expected_version {
            if schedule.version != expected {
                return Err(Error::conflict(
                    ConflictKind::Duplicate,
                    format!(
                        "schedule version changed: expected {expected}, found {}",
                        schedule.version
                    ),
                ));
            }
        }

        let requests: Vec<NewAssignment> = plan
            .assignments
            .iter()
            .map(|p| NewAssignment {
                employee_id: p.employee_id,
                shift_id: p.shift_id,
                priority: None,
                notes: None,
            })
            .collect();

        let context = self.load_context(&schedule, &requests).await?;

        let mut errors = Vec::new();
        let mut accepted: Vec<(usize, ScheduleAssignment)> = Vec::new();
        let mut accepted_rows: Vec<NewAssignment> = Vec::new();
        for (index, request) in requests.iter().enumerate() {
            match self.validate_row(&schedule, &context, request, &accepted_rows) {
                Some((kind, message)) => errors.push(BulkItemError {
                    index,
                    employee_id: request.employee_id,
                    shift_id: request.shift_id,
                    error_kind: kind.as_str().to_string(),
                    message,
                }),
                None => {
                    let assignment = self.build_assignment(actor, &schedule, request, true);
                    accepted.push((index, assignment));
                    accepted_rows.push(request.clone());
                }
            }
        }

        let rows: Vec<ScheduleAssignment> = accepted.iter().map(|(_, a)| a.clone()).collect();
        let outcomes = self.store.assignments.create_bulk(&rows).await?;

        let mut created = Vec::new();
        for ((index, _), outcome) in accepted.into_iter().zip(outcomes) {
            let request = &requests[index];
            match outcome {
                RowOutcome::Created(assignment) => created.push(assignment),
                RowOutcome::Duplicate => errors.push(BulkItemError {
                    index,
                    employee_id: request.employee_id,
                    shift_id: request.shift_id,
                    error_kind: RowErrorKind::DuplicateAssignment.as_str().to_string(),
                    message: "assignment already exists".to_string(),
                }),
                RowOutcome::Failed(message) => errors.push(BulkItemError {
                    index,
                    employee_id: request.employee_id,
                    shift_id: request.shift_id,
                    error_kind: "internal".to_string(),
                    message,
                }),
            }
        }
        errors.sort_by_key(|e| e.index);

        if !created.is_empty() {
            self.after_write(&schedule).await;
            for assignment in &created {
                self.publish_assignment(EventKind::AssignmentCreated, assignment);
            }
        }

        Ok(BulkResponse {
            total_processed: requests.len(),
            total_created: created.len(),
            total_errors: errors.len(),
            created,
            errors,
        })
    }

    // ========================================================================
    // Read
    // ========================================================================

    pub async fn get(&self, id: Uuid) -> Result<ScheduleAssignment> {
        self.store
            .assignments
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("assignment", id))
    }

    pub async fn list(
        &self,
        filter: &AssignmentFilter,
        page: &PageRequest,
    ) -> Result<Page<ScheduleAssignment>> {
        self.store.assignments.list(filter, page).await
    }

    /// Overlapping shifts for the same employee, joined through assignments
    pub async fn check_conflicts(&self, assignment_id: Uuid) -> Result<Vec<AssignmentConflict>> {
        let assignment = self.get(assignment_id).await?;
        let shift = self
            .store
            .shifts
            .get(assignment.shift_id)
            .await?
            .ok_or_else(|| Error::not_found("shift", assignment.shift_id))?;

        let week_start = shift.date - chrono::Duration::days(7);
        let week_end = shift.date + chrono::Duration::days(7);
        let others = self
            .store
            .assignments
            .list_for_employee_in_range(assignment.employee_id, week_start, week_end)
            .await?;

        let shift_ids: Vec<Uuid> = others
            .iter()
            .filter(|a| a.id != assignment.id)
            .map(|a| a.shift_id)
            .collect();
        let shifts: HashMap<Uuid, Shift> = self
            .store
            .shifts
            .get_many(&shift_ids)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let mut conflicts = Vec::new();
        for other in others.iter().filter(|a| a.id != assignment.id) {
            if let Some(other_shift) = shifts.get(&other.shift_id) {
                if shift.overlaps(other_shift) {
                    conflicts.push(AssignmentConflict {
                        assignment_id: assignment.id,
                        other_assignment_id: other.id,
                        shift_id: shift.id,
                        other_shift_id: other_shift.id,
                        date: shift.date,
                    });
                }
            }
        }
        Ok(conflicts)
    }

    // ========================================================================
    // Update / delete
    // ========================================================================

    /// Update priority, notes, or force a status transition
    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        priority: Option<u8>,
        notes: Option<String>,
        status: Option<AssignmentStatus>,
    ) -> Result<ScheduleAssignment> {
        actor.allows(Action::AssignmentWrite)?;
        let mut assignment = self.get(id).await?;

        if let Some(next) = status {
            if !assignment.status.can_transition_to(next) {
                return Err(Error::validation(
                    "status",
                    format!("cannot transition {} -> {}", assignment.status, next),
                ));
            }
            assignment.status = next;
        }
        if let Some(priority) = priority {
            if !(1..=10).contains(&priority) {
                return Err(Error::validation("priority", "outside [1, 10]"));
            }
            assignment.priority = priority;
        }
        if notes.is_some() {
            assignment.notes = notes;
        }
        assignment.updated_at = Utc::now();

        self.store.assignments.update(&assignment).await?;
        self.invalidate_schedule(assignment.schedule_id).await;
        self.publish_assignment(EventKind::AssignmentUpdated, &assignment);
        Ok(assignment)
    }

    pub async fn delete(&self, actor: &Actor, id: Uuid) -> Result<()> {
        actor.allows(Action::AssignmentWrite)?;
        let assignment = self.get(id).await?;
        let _guard = self.locks.acquire(assignment.schedule_id).await;

        self.store.assignments.delete(id).await?;
        self.invalidate_schedule(assignment.schedule_id).await;
        self.publish_assignment(EventKind::AssignmentDeleted, &assignment);
        Ok(())
    }

    // ========================================================================
    // Confirm / decline workflow
    // ========================================================================

    /// Employee confirms an assignment within the response window
    pub async fn confirm(
        &self,
        actor: &Actor,
        id: Uuid,
        notes: Option<String>,
    ) -> Result<ScheduleAssignment> {
        let mut assignment = self.get(id).await?;
        actor.allows(Action::AssignmentRespond {
            assignee: assignment.employee_id,
        })?;
        self.check_response_window(&assignment)?;

        assignment.status = AssignmentStatus::Confirmed;
        if notes.is_some() {
            assignment.notes = notes;
        }
        assignment.updated_at = Utc::now();

        self.store.assignments.update(&assignment).await?;
        self.invalidate_schedule(assignment.schedule_id).await;
        self.publish_assignment(EventKind::AssignmentConfirmed, &assignment);
        Ok(assignment)
    }

    /// Employee declines an assignment; a reason is required
    pub async fn decline(
        &self,
        actor: &Actor,
        id: Uuid,
        reason: String,
    ) -> Result<ScheduleAssignment> {
        if reason.trim().is_empty() {
            return Err(Error::validation("reason", "required to decline"));
        }
        let mut assignment = self.get(id).await?;
        actor.allows(Action::AssignmentRespond {
            assignee: assignment.employee_id,
        })?;
        self.check_response_window(&assignment)?;

        assignment.status = AssignmentStatus::Declined;
        assignment.decline_reason = Some(reason);
        assignment.updated_at = Utc::now();

        self.store.assignments.update(&assignment).await?;
        self.invalidate_schedule(assignment.schedule_id).await;
        self.publish_assignment(EventKind::AssignmentDeclined, &assignment);
        Ok(assignment)
    }

    /// Auto-confirm assignments whose response window has elapsed
    ///
    /// Invoked from a background task; a no-op when the flag is off.
    pub async fn auto_confirm_sweep(&self) -> Result<usize> {
        if !self.config.auto_confirm_after_window {
            return Ok(0);
        }
        let cutoff = Utc::now() - chrono::Duration::hours(self.config.confirm_window_hours);
        let expired = self.store.assignments.list_expired_pending(cutoff).await?;

        let mut confirmed = 0;
        for mut assignment in expired {
            assignment.status = AssignmentStatus::Confirmed;
            assignment.updated_at = Utc::now();
            self.store.assignments.update(&assignment).await?;
            self.invalidate_schedule(assignment.schedule_id).await;
            self.publish_assignment(EventKind::AssignmentConfirmed, &assignment);
            confirmed += 1;
        }
        if confirmed > 0 {
            tracing::info!(count = confirmed, "Auto-confirmed assignments past window");
        }
        Ok(confirmed)
    }

    fn check_response_window(&self, assignment: &ScheduleAssignment) -> Result<()> {
        if !assignment.status.is_awaiting_response() {
            return Err(Error::validation(
                "status",
                format!("assignment is already {}", assignment.status),
            ));
        }
        if !assignment.within_response_window(Utc::now(), self.config.confirm_window_hours) {
            return Err(Error::validation(
                "assigned_at",
                format!(
                    "the {}-hour response window has closed",
                    self.config.confirm_window_hours
                ),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Pipeline internals
    // ========================================================================

    async fn editable_schedule(&self, schedule_id: Uuid) -> Result<Schedule> {
        let schedule = self
            .store
            .schedules
            .get(schedule_id)
            .await?
            .ok_or_else(|| Error::not_found("schedule", schedule_id))?;
        if !schedule.status.is_editable() {
            return Err(RowErrorKind::ScheduleNotEditable.into_error(format!(
                "schedule {} is {}",
                schedule.id, schedule.status
            )));
        }
        Ok(schedule)
    }

    /// Everything row validation needs, bulk-fetched once per request
    async fn load_context(
        &self,
        schedule: &Schedule,
        requests: &[NewAssignment],
    ) -> Result<ValidationContext> {
        let mut employee_ids: Vec<Uuid> = requests.iter().map(|r| r.employee_id).collect();
        employee_ids.sort();
        employee_ids.dedup();
        let mut shift_ids: Vec<Uuid> = requests.iter().map(|r| r.shift_id).collect();
        shift_ids.sort();
        shift_ids.dedup();

        let employees: HashMap<Uuid, Employee> = self
            .store
            .employees
            .get_many(&employee_ids)
            .await?
            .into_iter()
            .map(|e| (e.id, e))
            .collect();
        let mut shifts: HashMap<Uuid, Shift> = self
            .store
            .shifts
            .get_many(&shift_ids)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        // Existing rows in the schedule, plus the shifts they point at
        let existing = self
            .store
            .assignments
            .list_for_schedule(schedule.id)
            .await?;
        let existing_shift_ids: Vec<Uuid> = existing
            .iter()
            .map(|a| a.shift_id)
            .filter(|id| !shifts.contains_key(id))
            .collect();
        for shift in self.store.shifts.get_many(&existing_shift_ids).await? {
            shifts.insert(shift.id, shift);
        }

        Ok(ValidationContext {
            employees,
            shifts,
            existing,
        })
    }

    /// Run pipeline steps 2-7 for one row
    ///
    /// `accepted` carries the rows already validated in this batch so
    /// intra-batch duplicates and overlaps are caught.
    fn validate_row(
        &self,
        _schedule: &Schedule,
        context: &ValidationContext,
        request: &NewAssignment,
        accepted: &[NewAssignment],
    ) -> Option<(RowErrorKind, String)> {
        // 2. Employee exists and is active
        let employee = match context.employees.get(&request.employee_id) {
            Some(e) if e.is_active => e,
            Some(e) => {
                return Some((
                    RowErrorKind::EmployeeInactive,
                    format!("employee {} is inactive", e.full_name()),
                ))
            }
            None => {
                return Some((
                    RowErrorKind::EmployeeInactive,
                    format!("employee {} not found", request.employee_id),
                ))
            }
        };

        // 3. Shift exists
        let Some(shift) = context.shifts.get(&request.shift_id) else {
            return Some((
                RowErrorKind::ShiftNotFound,
                format!("shift {} not found", request.shift_id),
            ));
        };

        // 4. No duplicate tuple, in the store or earlier in this batch
        let duplicate_stored = context
            .existing
            .iter()
            .any(|a| a.employee_id == request.employee_id && a.shift_id == request.shift_id);
        let duplicate_batch = accepted
            .iter()
            .any(|r| r.employee_id == request.employee_id && r.shift_id == request.shift_id);
        if duplicate_stored || duplicate_batch {
            return Some((
                RowErrorKind::DuplicateAssignment,
                "assignment already exists for this schedule/employee/shift".to_string(),
            ));
        }

        // 5. No overlapping shift for this employee in the schedule
        let overlap = context
            .existing
            .iter()
            .filter(|a| {
                a.employee_id == request.employee_id
                    && !matches!(
                        a.status,
                        AssignmentStatus::Declined | AssignmentStatus::Cancelled
                    )
            })
            .filter_map(|a| context.shifts.get(&a.shift_id))
            .chain(
                accepted
                    .iter()
                    .filter(|r| r.employee_id == request.employee_id)
                    .filter_map(|r| context.shifts.get(&r.shift_id)),
            )
            .find(|other| shift.overlaps(other));
        if let Some(other) = overlap {
            return Some((
                RowErrorKind::OverlapConflict,
                format!(
                    "overlaps existing shift {} on {} ({})",
                    other.id, other.date, other.window
                ),
            ));
        }

        // 6. Qualifications cover requirements
        if !employee.is_qualified_for(&shift.requirements) {
            let missing: Vec<String> = shift
                .requirements
                .difference(&employee.qualifications)
                .cloned()
                .collect();
            return Some((
                RowErrorKind::QualificationMissing,
                format!(
                    "{} lacks required qualifications: {}",
                    employee.full_name(),
                    missing.join(", ")
                ),
            ));
        }

        // 7. Availability covers the whole window
        if !employee
            .availability
            .covers(shift.weekday(), &shift.window)
        {
            return Some((
                RowErrorKind::AvailabilityViolation,
                format!(
                    "{} is not available {} {}",
                    employee.full_name(),
                    shift.date,
                    shift.window
                ),
            ));
        }

        None
    }

    fn build_assignment(
        &self,
        actor: &Actor,
        schedule: &Schedule,
        request: &NewAssignment,
        auto_assigned: bool,
    ) -> ScheduleAssignment {
        let mut assignment = ScheduleAssignment::new(
            schedule.id,
            request.employee_id,
            request.shift_id,
            actor.id,
        );
        if let Some(priority) = request.priority {
            assignment.priority = priority.clamp(1, 10);
        }
        assignment.notes = request.notes.clone();
        assignment.auto_assigned = auto_assigned;
        assignment
    }

    // ========================================================================
    // Post-commit effects
    // ========================================================================

    /// Cache invalidation runs before events publish
    async fn after_write(&self, schedule: &Schedule) {
        self.invalidate_schedule(schedule.id).await;
    }

    async fn invalidate_schedule(&self, schedule_id: Uuid) {
        if let Some(cache) = &self.cache {
            cache
                .invalidate(CacheFamily::ScheduleAssignments, &schedule_id.to_string())
                .await;
        }
    }

    fn publish_assignment(&self, kind: EventKind, assignment: &ScheduleAssignment) {
        let payload = serde_json::json!({
            "assignment_id": assignment.id,
            "schedule_id": assignment.schedule_id,
            "employee_id": assignment.employee_id,
            "shift_id": assignment.shift_id,
            "status": assignment.status.as_str(),
            "committed_at": assignment.updated_at,
        });
        self.broadcaster
            .publish(&topics::schedule(assignment.schedule_id), kind, payload.clone());
        self.broadcaster
            .publish(&topics::user(assignment.employee_id), kind, payload);
    }

    async fn notify_assignee(&self, assignment: &ScheduleAssignment, context: &ValidationContext) {
        let Some(shift) = context.shifts.get(&assignment.shift_id) else {
            return;
        };
        let notification = Notification::new(
            assignment.employee_id,
            "assignment",
            "New shift assignment",
            format!("You have been assigned to {} on {}", shift.window, shift.date),
        )
        .with_priority(NotificationPriority::High);

        if let Err(e) = self.store.notifications.create(&notification).await {
            tracing::warn!(error = %e, "Failed to store assignment notification");
            return;
        }
        self.broadcaster.publish(
            &topics::user(assignment.employee_id),
            EventKind::NotificationCreated,
            serde_json::json!({
                "notification_id": notification.id,
                "title": notification.title,
                "priority": notification.priority.as_str(),
            }),
        );
    }
}

struct ValidationContext {
    employees: HashMap<Uuid, Employee>,
    shifts: HashMap<Uuid, Shift>,
    existing: Vec<ScheduleAssignment>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BroadcastConfig;
    use crate::models::{Availability, Role, ScheduleStatus, ShiftType, TimeWindow};
    use chrono::{NaiveDate, NaiveTime};
    use std::collections::HashSet;

    fn t(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    fn window(start: u32, end: u32) -> TimeWindow {
        TimeWindow::new(t(start), t(end)).unwrap()
    }

    // 2024-03-04 is a Monday
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    struct Fixture {
        engine: AssignmentEngine,
        store: Store,
        manager: Actor,
        schedule: Schedule,
    }

    async fn fixture() -> Fixture {
        let store = Store::in_memory();
        let broadcaster = Arc::new(Broadcaster::new(&BroadcastConfig {
            replay_buffer: 100,
            heartbeat_secs: 30,
            client_queue: 64,
        }));
        let engine = AssignmentEngine::new(
            store.clone(),
            None,
            broadcaster,
            EngineConfig {
                confirm_window_hours: 48,
                auto_confirm_after_window: true,
            },
        );

        let manager = Actor::new(Uuid::new_v4(), Role::Manager);
        let schedule = Schedule {
            id: Uuid::new_v4(),
            week_start: monday(),
            week_end: monday() + chrono::Duration::days(6),
            title: "Week".to_string(),
            status: ScheduleStatus::Draft,
            created_by: manager.id,
            approved_by: None,
            version: 1,
            parent_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.schedules.create(&schedule).await.unwrap();

        Fixture {
            engine,
            store,
            manager,
            schedule,
        }
    }

    async fn add_employee(store: &Store, name: &str, quals: &[&str]) -> Employee {
        let now = Utc::now();
        let employee = Employee {
            id: Uuid::new_v4(),
            email: format!("{name}@example.com"),
            password_hash: String::new(),
            role: Role::Employee,
            is_active: true,
            email_verified: true,
            account_locked: false,
            failed_login_attempts: 0,
            password_must_change: false,
            department_id: None,
            first_name: name.to_string(),
            last_name: "Test".to_string(),
            phone: None,
            hire_date: None,
            hourly_rate: 15.0,
            max_hours_per_week: 40.0,
            qualifications: quals.iter().map(|s| s.to_string()).collect(),
            availability: Availability::all_week(window(9, 17)),
            password_history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        store.employees.create(&employee).await.unwrap();
        employee
    }

    async fn add_shift(store: &Store, date: NaiveDate, start: u32, end: u32, reqs: &[&str]) -> Shift {
        let now = Utc::now();
        let shift = Shift {
            id: Uuid::new_v4(),
            date,
            window: window(start, end),
            shift_type: ShiftType::Morning,
            department_id: None,
            required_staff: 1,
            priority: 5,
            requirements: reqs.iter().map(|s| s.to_string()).collect(),
            overnight: false,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        store.shifts.create(&shift).await.unwrap();
        shift
    }

    fn request(employee: &Employee, shift: &Shift) -> NewAssignment {
        NewAssignment {
            employee_id: employee.id,
            shift_id: shift.id,
            priority: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_create_single_happy_path() {
        let f = fixture().await;
        let e = add_employee(&f.store, "a", &["general"]).await;
        let s = add_shift(&f.store, monday(), 9, 13, &["general"]).await;

        let assignment = f
            .engine
            .create_single(&f.manager, f.schedule.id, request(&e, &s))
            .await
            .unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Assigned);
        assert!(!assignment.auto_assigned);
    }

    #[tokio::test]
    async fn test_qualification_gate() {
        let f = fixture().await;
        let e = add_employee(&f.store, "cashier", &["cashier"]).await;
        let s = add_shift(&f.store, monday(), 9, 13, &["cook"]).await;

        let err = f
            .engine
            .create_single(&f.manager, f.schedule.id, request(&e, &s))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict {
                kind: ConflictKind::Qualification,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_bulk_overlap_partial_success() {
        // S3: two overlapping shifts for the same employee in one batch
        let f = fixture().await;
        let e = add_employee(&f.store, "a", &[]).await;
        let s1 = add_shift(&f.store, monday(), 9, 13, &[]).await;
        let s2 = add_shift(&f.store, monday(), 12, 16, &[]).await;

        let response = f
            .engine
            .create_bulk(
                &f.manager,
                f.schedule.id,
                vec![request(&e, &s1), request(&e, &s2)],
            )
            .await
            .unwrap();

        assert_eq!(response.total_processed, 2);
        assert_eq!(response.total_created, 1);
        assert_eq!(response.total_errors, 1);
        assert_eq!(response.errors[0].error_kind, "overlap_conflict");
        assert_eq!(response.errors[0].index, 1);
    }

    #[tokio::test]
    async fn test_bulk_duplicate_idempotence() {
        // Same tuple twice in one batch: one created, one duplicate error.
        // Resubmitting yields zero created and the same error kinds.
        let f = fixture().await;
        let e = add_employee(&f.store, "a", &[]).await;
        let s = add_shift(&f.store, monday(), 9, 13, &[]).await;
        let batch = vec![request(&e, &s), request(&e, &s)];

        let first = f
            .engine
            .create_bulk(&f.manager, f.schedule.id, batch.clone())
            .await
            .unwrap();
        assert_eq!(first.total_created, 1);
        assert_eq!(first.total_errors, 1);
        assert_eq!(first.errors[0].error_kind, "duplicate_assignment");

        let second = f
            .engine
            .create_bulk(&f.manager, f.schedule.id, batch)
            .await
            .unwrap();
        assert_eq!(second.total_created, 0);
        assert_eq!(second.total_errors, 2);
        assert!(second
            .errors
            .iter()
            .all(|e| e.error_kind == "duplicate_assignment"));
    }

    #[tokio::test]
    async fn test_frozen_schedule_rejected() {
        let f = fixture().await;
        let e = add_employee(&f.store, "a", &[]).await;
        let s = add_shift(&f.store, monday(), 9, 13, &[]).await;

        f.store
            .schedules
            .transition(f.schedule.id, ScheduleStatus::Pending, None, None)
            .await
            .unwrap();
        f.store
            .schedules
            .transition(
                f.schedule.id,
                ScheduleStatus::Approved,
                Some(f.manager.id),
                None,
            )
            .await
            .unwrap();

        let err = f
            .engine
            .create_single(&f.manager, f.schedule.id, request(&e, &s))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict {
                kind: ConflictKind::ScheduleNotEditable,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_employee_cannot_create() {
        let f = fixture().await;
        let e = add_employee(&f.store, "a", &[]).await;
        let s = add_shift(&f.store, monday(), 9, 13, &[]).await;

        let employee_actor = Actor::new(e.id, Role::Employee);
        let err = f
            .engine
            .create_single(&employee_actor, f.schedule.id, request(&e, &s))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[tokio::test]
    async fn test_confirm_by_assignee_only() {
        let f = fixture().await;
        let e = add_employee(&f.store, "a", &[]).await;
        let other = add_employee(&f.store, "b", &[]).await;
        let s = add_shift(&f.store, monday(), 9, 13, &[]).await;

        let assignment = f
            .engine
            .create_single(&f.manager, f.schedule.id, request(&e, &s))
            .await
            .unwrap();

        // Another employee may not confirm it
        let stranger = Actor::new(other.id, Role::Employee);
        let err = f.engine.confirm(&stranger, assignment.id, None).await.unwrap_err();
        assert_eq!(err.kind(), "forbidden");

        // The assignee may
        let assignee = Actor::new(e.id, Role::Employee);
        let confirmed = f.engine.confirm(&assignee, assignment.id, None).await.unwrap();
        assert_eq!(confirmed.status, AssignmentStatus::Confirmed);

        // Confirming again fails: no longer awaiting response
        let err = f.engine.confirm(&assignee, assignment.id, None).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn test_decline_requires_reason() {
        let f = fixture().await;
        let e = add_employee(&f.store, "a", &[]).await;
        let s = add_shift(&f.store, monday(), 9, 13, &[]).await;

        let assignment = f
            .engine
            .create_single(&f.manager, f.schedule.id, request(&e, &s))
            .await
            .unwrap();
        let assignee = Actor::new(e.id, Role::Employee);

        let err = f
            .engine
            .decline(&assignee, assignment.id, "  ".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let declined = f
            .engine
            .decline(&assignee, assignment.id, "family conflict".to_string())
            .await
            .unwrap();
        assert_eq!(declined.status, AssignmentStatus::Declined);
        assert_eq!(declined.decline_reason.as_deref(), Some("family conflict"));
    }

    #[tokio::test]
    async fn test_response_window_closes() {
        let f = fixture().await;
        let e = add_employee(&f.store, "a", &[]).await;
        let s = add_shift(&f.store, monday(), 9, 13, &[]).await;

        let mut assignment = f
            .engine
            .create_single(&f.manager, f.schedule.id, request(&e, &s))
            .await
            .unwrap();

        // Age the assignment past the 48h window
        assignment.assigned_at = Utc::now() - chrono::Duration::hours(49);
        f.store.assignments.update(&assignment).await.unwrap();

        let assignee = Actor::new(e.id, Role::Employee);
        let err = f.engine.confirm(&assignee, assignment.id, None).await.unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = f
            .engine
            .decline(&assignee, assignment.id, "too late".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn test_auto_confirm_sweep() {
        let f = fixture().await;
        let e = add_employee(&f.store, "a", &[]).await;
        let s = add_shift(&f.store, monday(), 9, 13, &[]).await;

        let mut assignment = f
            .engine
            .create_single(&f.manager, f.schedule.id, request(&e, &s))
            .await
            .unwrap();
        assignment.assigned_at = Utc::now() - chrono::Duration::hours(49);
        f.store.assignments.update(&assignment).await.unwrap();

        let confirmed = f.engine.auto_confirm_sweep().await.unwrap();
        assert_eq!(confirmed, 1);

        let stored = f.store.assignments.get(assignment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AssignmentStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_check_conflicts_finds_overlap() {
        let f = fixture().await;
        let e = add_employee(&f.store, "a", &[]).await;
        let s1 = add_shift(&f.store, monday(), 9, 13, &[]).await;
        // Different schedule, same employee, overlapping window
        let other_schedule = Schedule {
            id: Uuid::new_v4(),
            status: ScheduleStatus::Draft,
            ..f.schedule.clone()
        };
        f.store.schedules.create(&other_schedule).await.unwrap();
        let s2 = add_shift(&f.store, monday(), 12, 16, &[]).await;

        let a1 = f
            .engine
            .create_single(&f.manager, f.schedule.id, request(&e, &s1))
            .await
            .unwrap();
        let _a2 = f
            .engine
            .create_single(&f.manager, other_schedule.id, request(&e, &s2))
            .await
            .unwrap();

        let conflicts = f.engine.check_conflicts(a1.id).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].other_shift_id, s2.id);
    }

    #[tokio::test]
    async fn test_apply_solver_plan_marks_auto() {
        let f = fixture().await;
        let e = add_employee(&f.store, "a", &["general"]).await;
        let s = add_shift(&f.store, monday(), 9, 13, &["general"]).await;

        let plan = crate::solver::Plan {
            status: crate::solver::PlanStatus::Optimal,
            objective: 0.0,
            gap: None,
            assignments: vec![crate::solver::PlannedAssignment {
                employee_id: e.id,
                shift_id: s.id,
                rationale_tags: vec![],
            }],
            unassigned_shifts: vec![],
            metrics: crate::solver::PlanMetrics {
                total_cost: 60.0,
                fairness_stddev: 0.0,
                preferences_honored: 0,
                preferences_total: 0,
            },
            seed: 0,
        };

        let response = f
            .engine
            .apply_solver_plan(&f.manager, f.schedule.id, &plan, Some(1))
            .await
            .unwrap();
        assert_eq!(response.total_created, 1);
        assert!(response.created[0].auto_assigned);

        // Stale version is rejected
        let err = f
            .engine
            .apply_solver_plan(&f.manager, f.schedule.id, &plan, Some(99))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn test_row_error_kind_strings() {
        let kinds: HashSet<&str> = [
            RowErrorKind::ScheduleNotEditable,
            RowErrorKind::EmployeeInactive,
            RowErrorKind::ShiftNotFound,
            RowErrorKind::DuplicateAssignment,
            RowErrorKind::OverlapConflict,
            RowErrorKind::QualificationMissing,
            RowErrorKind::AvailabilityViolation,
            RowErrorKind::AuthorizationDenied,
        ]
        .iter()
        .map(|k| k.as_str())
        .collect();
        assert_eq!(kinds.len(), 8);
        assert!(kinds.contains("overlap_conflict"));
    }
}
