//! In-memory store backend
//!
//! Implements every repository trait over locked maps, mirroring the
//! PostgreSQL semantics closely enough for the engine and handler tests:
//! unique email, unique assignment tuple, history appended atomically with
//! the change it audits.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{ConflictKind, Error, Result};
use crate::models::{
    Department, Employee, HistoryEntry, HistoryKind, Notification, Role, Rule, RuleType,
    Schedule, ScheduleAssignment, ScheduleStatus, Shift,
};

use super::assignments::{AssignmentFilter, AssignmentStore, RowOutcome};
use super::departments::DepartmentStore;
use super::employees::{EmployeeFilter, EmployeeStore};
use super::history::HistoryStore;
use super::notifications::NotificationStore;
use super::page::{encode_cursor, Page, PageRequest};
use super::rules::RuleStore;
use super::schedules::ScheduleStore;
use super::shifts::{ShiftFilter, ShiftStore};

/// Shared in-memory state backing all repository traits
#[derive(Default)]
pub struct MemoryBackend {
    employees: RwLock<HashMap<Uuid, Employee>>,
    departments: RwLock<HashMap<Uuid, Department>>,
    shifts: RwLock<HashMap<Uuid, Shift>>,
    schedules: RwLock<HashMap<Uuid, Schedule>>,
    assignments: RwLock<HashMap<Uuid, ScheduleAssignment>>,
    rules: RwLock<HashMap<Uuid, Rule>>,
    notifications: RwLock<HashMap<Uuid, Notification>>,
    history: RwLock<Vec<HistoryEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn history_entries(&self) -> Vec<HistoryEntry> {
        self.history.read().clone()
    }
}

// ============================================================================
// EmployeeStore
// ============================================================================

#[async_trait]
impl EmployeeStore for MemoryBackend {
    async fn create(&self, employee: &Employee) -> Result<()> {
        let mut map = self.employees.write();
        if map
            .values()
            .any(|e| e.email.eq_ignore_ascii_case(&employee.email))
        {
            return Err(Error::conflict(ConflictKind::Duplicate, "email already exists"));
        }
        map.insert(employee.id, employee.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Employee>> {
        Ok(self.employees.read().get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Employee>> {
        Ok(self
            .employees
            .read()
            .values()
            .find(|e| e.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Employee>> {
        let map = self.employees.read();
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }

    async fn list(&self, filter: &EmployeeFilter, page: &PageRequest) -> Result<Page<Employee>> {
        let map = self.employees.read();
        let mut items: Vec<Employee> = map
            .values()
            .filter(|e| {
                if let Some(search) = &filter.search {
                    let needle = search.to_lowercase();
                    let haystack = format!(
                        "{} {} {}",
                        e.first_name.to_lowercase(),
                        e.last_name.to_lowercase(),
                        e.email.to_lowercase()
                    );
                    if !haystack.contains(&needle) {
                        return false;
                    }
                }
                if let Some(role) = filter.role {
                    if e.role != role {
                        return false;
                    }
                }
                if let Some(dept) = filter.department_id {
                    if e.department_id != Some(dept) {
                        return false;
                    }
                }
                if let Some(active) = filter.is_active {
                    if e.is_active != active {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name)));

        let total = items.len() as i64;
        let items = items
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        Ok(Page::of(items).with_total(total))
    }

    async fn list_active(&self) -> Result<Vec<Employee>> {
        let mut items: Vec<Employee> = self
            .employees
            .read()
            .values()
            .filter(|e| e.is_active)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.last_name.cmp(&b.last_name));
        Ok(items)
    }

    async fn update(&self, employee: &Employee) -> Result<()> {
        let mut map = self.employees.write();
        if map
            .values()
            .any(|e| e.id != employee.id && e.email.eq_ignore_ascii_case(&employee.email))
        {
            return Err(Error::conflict(ConflictKind::Duplicate, "email already exists"));
        }
        match map.get_mut(&employee.id) {
            Some(existing) => {
                *existing = employee.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(Error::not_found("employee", employee.id)),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.employees.write().remove(&id).is_some())
    }

    async fn change_role(
        &self,
        id: Uuid,
        new_role: Role,
        changed_by: Uuid,
        reason: Option<String>,
    ) -> Result<HistoryEntry> {
        let mut map = self.employees.write();
        let employee = map
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("employee", id))?;

        let mut entry = HistoryEntry::new(
            id,
            HistoryKind::Role,
            employee.role.as_str(),
            new_role.as_str(),
            changed_by,
        );
        entry.reason = reason;

        employee.role = new_role;
        employee.updated_at = Utc::now();
        self.history.write().push(entry.clone());
        Ok(entry)
    }

    async fn change_status(
        &self,
        id: Uuid,
        is_active: bool,
        changed_by: Uuid,
        reason: Option<String>,
    ) -> Result<HistoryEntry> {
        let mut map = self.employees.write();
        let employee = map
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("employee", id))?;

        let label = |a: bool| if a { "active" } else { "inactive" };
        let mut entry = HistoryEntry::new(
            id,
            HistoryKind::Status,
            label(employee.is_active),
            label(is_active),
            changed_by,
        );
        entry.reason = reason;

        employee.is_active = is_active;
        employee.updated_at = Utc::now();
        self.history.write().push(entry.clone());
        Ok(entry)
    }

    async fn change_department(
        &self,
        id: Uuid,
        department_id: Option<Uuid>,
        changed_by: Uuid,
        reason: Option<String>,
    ) -> Result<HistoryEntry> {
        let mut map = self.employees.write();
        let employee = map
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("employee", id))?;

        let label = |d: Option<Uuid>| d.map(|v| v.to_string()).unwrap_or_else(|| "none".into());
        let mut entry = HistoryEntry::new(
            id,
            HistoryKind::Department,
            label(employee.department_id),
            label(department_id),
            changed_by,
        );
        entry.reason = reason;

        employee.department_id = department_id;
        employee.updated_at = Utc::now();
        self.history.write().push(entry.clone());
        Ok(entry)
    }

    async fn record_login_failure(&self, id: Uuid, lockout_threshold: u32) -> Result<bool> {
        let mut map = self.employees.write();
        let employee = map
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("employee", id))?;
        employee.failed_login_attempts += 1;
        if employee.failed_login_attempts >= lockout_threshold as i32 {
            employee.account_locked = true;
        }
        Ok(employee.account_locked)
    }

    async fn clear_login_failures(&self, id: Uuid) -> Result<()> {
        let mut map = self.employees.write();
        let employee = map
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("employee", id))?;
        employee.failed_login_attempts = 0;
        employee.account_locked = false;
        Ok(())
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        password_history: &[String],
        must_change: bool,
    ) -> Result<()> {
        let mut map = self.employees.write();
        let employee = map
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("employee", id))?;
        employee.password_hash = password_hash.to_string();
        employee.password_history = password_history.to_vec();
        employee.password_must_change = must_change;
        employee.updated_at = Utc::now();
        Ok(())
    }
}

// ============================================================================
// DepartmentStore
// ============================================================================

#[async_trait]
impl DepartmentStore for MemoryBackend {
    async fn create(&self, department: &Department) -> Result<()> {
        let mut map = self.departments.write();
        if map.values().any(|d| d.name == department.name) {
            return Err(Error::conflict(
                ConflictKind::Duplicate,
                "department name already exists",
            ));
        }
        map.insert(department.id, department.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Department>> {
        Ok(self.departments.read().get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Department>> {
        let mut items: Vec<Department> = self.departments.read().values().cloned().collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn update(&self, department: &Department) -> Result<()> {
        let mut map = self.departments.write();
        match map.get_mut(&department.id) {
            Some(existing) => {
                *existing = department.clone();
                Ok(())
            }
            None => Err(Error::not_found("department", department.id)),
        }
    }

    async fn delete(&self, id: Uuid, force: bool) -> Result<bool> {
        let parent = match self.departments.read().get(&id) {
            Some(d) => d.parent_id,
            None => return Ok(false),
        };

        if force {
            for e in self.employees.write().values_mut() {
                if e.department_id == Some(id) {
                    e.department_id = None;
                }
            }
            for d in self.departments.write().values_mut() {
                if d.parent_id == Some(id) {
                    d.parent_id = parent;
                }
            }
        }
        Ok(self.departments.write().remove(&id).is_some())
    }

    async fn member_count(&self, id: Uuid) -> Result<i64> {
        Ok(self
            .employees
            .read()
            .values()
            .filter(|e| e.department_id == Some(id) && e.is_active)
            .count() as i64)
    }

    async fn child_count(&self, id: Uuid) -> Result<i64> {
        Ok(self
            .departments
            .read()
            .values()
            .filter(|d| d.parent_id == Some(id))
            .count() as i64)
    }
}

// ============================================================================
// ShiftStore
// ============================================================================

#[async_trait]
impl ShiftStore for MemoryBackend {
    async fn create(&self, shift: &Shift) -> Result<()> {
        self.shifts.write().insert(shift.id, shift.clone());
        Ok(())
    }

    async fn create_bulk(&self, shifts: &[Shift]) -> Result<()> {
        let mut map = self.shifts.write();
        for shift in shifts {
            map.insert(shift.id, shift.clone());
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Shift>> {
        Ok(self.shifts.read().get(&id).cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Shift>> {
        let map = self.shifts.read();
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }

    async fn list(&self, filter: &ShiftFilter, page: &PageRequest) -> Result<Page<Shift>> {
        let map = self.shifts.read();
        let mut items: Vec<Shift> = map
            .values()
            .filter(|s| {
                filter.date_from.map(|d| s.date >= d).unwrap_or(true)
                    && filter.date_to.map(|d| s.date <= d).unwrap_or(true)
                    && filter
                        .department_id
                        .map(|d| s.department_id == Some(d))
                        .unwrap_or(true)
                    && filter.shift_type.map(|t| s.shift_type == t).unwrap_or(true)
            })
            .cloned()
            .collect();
        items.sort_by_key(|s| (s.date, s.window.start));

        let total = items.len() as i64;
        let items = items
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        Ok(Page::of(items).with_total(total))
    }

    async fn list_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        department_id: Option<Uuid>,
    ) -> Result<Vec<Shift>> {
        let mut items: Vec<Shift> = self
            .shifts
            .read()
            .values()
            .filter(|s| {
                s.date >= from
                    && s.date <= to
                    && department_id
                        .map(|d| s.department_id == Some(d))
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        items.sort_by_key(|s| (s.date, s.window.start));
        Ok(items)
    }

    async fn update(&self, shift: &Shift) -> Result<()> {
        let mut map = self.shifts.write();
        match map.get_mut(&shift.id) {
            Some(existing) => {
                *existing = shift.clone();
                Ok(())
            }
            None => Err(Error::not_found("shift", shift.id)),
        }
    }

    async fn delete(&self, id: Uuid, force: bool) -> Result<bool> {
        if force {
            self.assignments.write().retain(|_, a| a.shift_id != id);
        }
        Ok(self.shifts.write().remove(&id).is_some())
    }

    async fn assignment_count(&self, id: Uuid) -> Result<i64> {
        Ok(self
            .assignments
            .read()
            .values()
            .filter(|a| a.shift_id == id)
            .count() as i64)
    }
}

// ============================================================================
// ScheduleStore
// ============================================================================

#[async_trait]
impl ScheduleStore for MemoryBackend {
    async fn create(&self, schedule: &Schedule) -> Result<()> {
        self.schedules.write().insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Schedule>> {
        Ok(self.schedules.read().get(&id).cloned())
    }

    async fn list(
        &self,
        week_start: Option<NaiveDate>,
        page: &PageRequest,
    ) -> Result<Page<Schedule>> {
        let map = self.schedules.read();
        let mut items: Vec<Schedule> = map
            .values()
            .filter(|s| week_start.map(|w| s.week_start == w).unwrap_or(true))
            .cloned()
            .collect();
        items.sort_by_key(|s| (std::cmp::Reverse(s.week_start), std::cmp::Reverse(s.version)));

        let items = items
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        Ok(Page::of(items))
    }

    async fn update(&self, schedule: &Schedule) -> Result<()> {
        let mut map = self.schedules.write();
        match map.get_mut(&schedule.id) {
            Some(existing) => {
                if !existing.status.is_editable() {
                    return Err(Error::conflict(
                        ConflictKind::ScheduleNotEditable,
                        "schedule is not in an editable status",
                    ));
                }
                existing.week_start = schedule.week_start;
                existing.week_end = schedule.week_end;
                existing.title = schedule.title.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(Error::not_found("schedule", schedule.id)),
        }
    }

    async fn transition(
        &self,
        id: Uuid,
        next: ScheduleStatus,
        approved_by: Option<Uuid>,
        expected_version: Option<i32>,
    ) -> Result<Schedule> {
        let mut map = self.schedules.write();
        let schedule = map
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("schedule", id))?;

        if let Some(expected) = expected_version {
            if schedule.version != expected {
                return Err(Error::conflict(
                    ConflictKind::Duplicate,
                    format!(
                        "version mismatch: expected {expected}, found {}",
                        schedule.version
                    ),
                ));
            }
        }
        if !schedule.status.can_transition_to(next) {
            return Err(Error::conflict(
                ConflictKind::ScheduleNotEditable,
                format!("cannot transition {} -> {}", schedule.status, next),
            ));
        }
        if next == ScheduleStatus::Approved && approved_by.is_none() {
            return Err(Error::validation("approved_by", "required for approval"));
        }

        schedule.status = next;
        if approved_by.is_some() {
            schedule.approved_by = approved_by;
        }
        schedule.version += 1;
        schedule.updated_at = Utc::now();
        Ok(schedule.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        // Ownership: assignments go with the schedule
        self.assignments.write().retain(|_, a| a.schedule_id != id);
        Ok(self.schedules.write().remove(&id).is_some())
    }
}

// ============================================================================
// AssignmentStore
// ============================================================================

fn is_duplicate(map: &HashMap<Uuid, ScheduleAssignment>, a: &ScheduleAssignment) -> bool {
    map.values().any(|existing| {
        existing.schedule_id == a.schedule_id
            && existing.employee_id == a.employee_id
            && existing.shift_id == a.shift_id
    })
}

#[async_trait]
impl AssignmentStore for MemoryBackend {
    async fn create(&self, assignment: &ScheduleAssignment) -> Result<()> {
        let mut map = self.assignments.write();
        if is_duplicate(&map, assignment) {
            return Err(Error::conflict(
                ConflictKind::Duplicate,
                "assignment already exists for this schedule/employee/shift",
            ));
        }
        map.insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn create_bulk(&self, rows: &[ScheduleAssignment]) -> Result<Vec<RowOutcome>> {
        let mut map = self.assignments.write();
        let mut outcomes = Vec::with_capacity(rows.len());
        for row in rows {
            if is_duplicate(&map, row) {
                outcomes.push(RowOutcome::Duplicate);
            } else {
                map.insert(row.id, row.clone());
                outcomes.push(RowOutcome::Created(row.clone()));
            }
        }
        Ok(outcomes)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ScheduleAssignment>> {
        Ok(self.assignments.read().get(&id).cloned())
    }

    async fn list(
        &self,
        filter: &AssignmentFilter,
        page: &PageRequest,
    ) -> Result<Page<ScheduleAssignment>> {
        let shifts = self.shifts.read();
        let map = self.assignments.read();
        let mut items: Vec<ScheduleAssignment> = map
            .values()
            .filter(|a| {
                let shift_date = shifts.get(&a.shift_id).map(|s| s.date);
                filter.schedule_id.map(|v| a.schedule_id == v).unwrap_or(true)
                    && filter.employee_id.map(|v| a.employee_id == v).unwrap_or(true)
                    && filter.shift_id.map(|v| a.shift_id == v).unwrap_or(true)
                    && filter.status.map(|v| a.status == v).unwrap_or(true)
                    && filter
                        .date_from
                        .map(|d| shift_date.map(|sd| sd >= d).unwrap_or(false))
                        .unwrap_or(true)
                    && filter
                        .date_to
                        .map(|d| shift_date.map(|sd| sd <= d).unwrap_or(false))
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        // Cursors carry microsecond precision; compare at the same grain
        items.sort_by_key(|a| (a.assigned_at.timestamp_micros(), a.id));

        if let Some(cursor) = &page.cursor {
            let (ts, id) = super::page::decode_cursor(cursor)?;
            items.retain(|a| (a.assigned_at.timestamp_micros(), a.id) > (ts.timestamp_micros(), id));
        }

        let limit = page.limit() as usize;
        let next_cursor = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|a| encode_cursor(a.assigned_at, a.id))
        } else {
            None
        };

        Ok(Page::of(items).with_cursor(next_cursor))
    }

    async fn list_for_schedule(&self, schedule_id: Uuid) -> Result<Vec<ScheduleAssignment>> {
        let mut items: Vec<ScheduleAssignment> = self
            .assignments
            .read()
            .values()
            .filter(|a| a.schedule_id == schedule_id)
            .cloned()
            .collect();
        items.sort_by_key(|a| (a.assigned_at, a.id));
        Ok(items)
    }

    async fn list_for_employee_in_range(
        &self,
        employee_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduleAssignment>> {
        let shifts = self.shifts.read();
        let mut items: Vec<ScheduleAssignment> = self
            .assignments
            .read()
            .values()
            .filter(|a| {
                a.employee_id == employee_id
                    && !matches!(
                        a.status,
                        crate::models::AssignmentStatus::Declined
                            | crate::models::AssignmentStatus::Cancelled
                    )
                    && shifts
                        .get(&a.shift_id)
                        .map(|s| s.date >= from && s.date <= to)
                        .unwrap_or(false)
            })
            .cloned()
            .collect();
        items.sort_by_key(|a| shifts.get(&a.shift_id).map(|s| s.date));
        Ok(items)
    }

    async fn update(&self, assignment: &ScheduleAssignment) -> Result<()> {
        let mut map = self.assignments.write();
        match map.get_mut(&assignment.id) {
            Some(existing) => {
                *existing = assignment.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(Error::not_found("assignment", assignment.id)),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.assignments.write().remove(&id).is_some())
    }

    async fn has_future_assignments(&self, employee_id: Uuid, date: NaiveDate) -> Result<bool> {
        let shifts = self.shifts.read();
        Ok(self.assignments.read().values().any(|a| {
            a.employee_id == employee_id
                && !a.status.is_terminal()
                && shifts
                    .get(&a.shift_id)
                    .map(|s| s.date >= date)
                    .unwrap_or(false)
        }))
    }

    async fn list_expired_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ScheduleAssignment>> {
        Ok(self
            .assignments
            .read()
            .values()
            .filter(|a| a.status.is_awaiting_response() && a.assigned_at < cutoff)
            .cloned()
            .collect())
    }
}

// ============================================================================
// RuleStore
// ============================================================================

#[async_trait]
impl RuleStore for MemoryBackend {
    async fn create(&self, rule: &Rule) -> Result<()> {
        self.rules.write().insert(rule.id, rule.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Rule>> {
        Ok(self.rules.read().get(&id).cloned())
    }

    async fn list(&self, rule_type: Option<RuleType>, active_only: bool) -> Result<Vec<Rule>> {
        let mut items: Vec<Rule> = self
            .rules
            .read()
            .values()
            .filter(|r| {
                rule_type.map(|t| r.rule_type == t).unwrap_or(true) && (!active_only || r.active)
            })
            .cloned()
            .collect();
        items.sort_by_key(|r| (std::cmp::Reverse(r.priority), r.created_at));
        Ok(items)
    }

    async fn list_active(&self) -> Result<Vec<Rule>> {
        RuleStore::list(self, None, true).await
    }

    async fn update(&self, rule: &Rule) -> Result<()> {
        let mut map = self.rules.write();
        match map.get_mut(&rule.id) {
            Some(existing) => {
                *existing = rule.clone();
                Ok(())
            }
            None => Err(Error::not_found("rule", rule.id)),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.rules.write().remove(&id).is_some())
    }
}

// ============================================================================
// NotificationStore
// ============================================================================

#[async_trait]
impl NotificationStore for MemoryBackend {
    async fn create(&self, notification: &Notification) -> Result<()> {
        self.notifications
            .write()
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self.notifications.read().get(&id).cloned())
    }

    async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
        page: &PageRequest,
    ) -> Result<Page<Notification>> {
        let now = Utc::now();
        let mut items: Vec<Notification> = self
            .notifications
            .read()
            .values()
            .filter(|n| {
                n.recipient_id == recipient_id
                    && (!unread_only || !n.is_read)
                    && !n.is_expired(now)
            })
            .cloned()
            .collect();
        items.sort_by_key(|n| std::cmp::Reverse(n.created_at));

        let items = items
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        Ok(Page::of(items))
    }

    async fn mark_read(&self, id: Uuid, recipient_id: Uuid) -> Result<bool> {
        let mut map = self.notifications.write();
        match map.get_mut(&id) {
            Some(n) if n.recipient_id == recipient_id => {
                n.is_read = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut map = self.notifications.write();
        let before = map.len();
        map.retain(|_, n| !n.is_expired(now));
        Ok((before - map.len()) as u64)
    }
}

// ============================================================================
// HistoryStore
// ============================================================================

#[async_trait]
impl HistoryStore for MemoryBackend {
    async fn list_for_user(
        &self,
        user_id: Uuid,
        kind: HistoryKind,
        page: &PageRequest,
    ) -> Result<Page<HistoryEntry>> {
        let mut items: Vec<HistoryEntry> = self
            .history
            .read()
            .iter()
            .filter(|e| e.user_id == user_id && e.kind == kind)
            .cloned()
            .collect();
        items.sort_by_key(|e| (e.changed_at.timestamp_micros(), e.id));

        if let Some(cursor) = &page.cursor {
            let (ts, id) = super::page::decode_cursor(cursor)?;
            items.retain(|e| (e.changed_at.timestamp_micros(), e.id) > (ts.timestamp_micros(), id));
        }

        let limit = page.limit() as usize;
        let next_cursor = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|e| encode_cursor(e.changed_at, e.id))
        } else {
            None
        };

        Ok(Page::of(items).with_cursor(next_cursor))
    }
}
