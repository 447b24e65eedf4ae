//! Role-based permission matrix
//!
//! Every handler consults [`Actor::allows`] before touching the store. The
//! matrix is deliberately closed-world: unknown combinations are denied.

use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Role;

/// The authenticated principal performing a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

/// Actions gated by the permission matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Create a new employee account
    EmployeeCreate,
    /// Read employee records
    EmployeeRead,
    /// Update an employee's profile; target identifies whose
    EmployeeUpdate { target: Uuid, target_role: Role },
    /// Hard-delete an employee
    EmployeeDelete,
    /// Reset another user's password
    PasswordReset { target_role: Role },
    /// Change a user's role
    RoleChange { target: Uuid },
    /// Change a user's active status
    StatusChange { target: Uuid },
    /// Create/update/delete departments
    DepartmentWrite,
    /// Create/update/delete shifts
    ShiftWrite,
    /// Create/update/delete schedules
    ScheduleWrite,
    /// Approve or publish a schedule
    SchedulePublish,
    /// Create assignments
    AssignmentCreate,
    /// Update or delete assignments
    AssignmentWrite,
    /// Confirm or decline an assignment; target is the assigned employee
    AssignmentRespond { assignee: Uuid },
    /// Create/update/delete scheduling rules
    RuleWrite,
    /// Run the schedule generator/optimizer
    SolverRun,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    /// Whether the matrix permits the action
    pub fn can(&self, action: Action) -> bool {
        use Action::*;
        use Role::*;

        match action {
            EmployeeCreate => matches!(self.role, Admin | Manager),
            EmployeeRead => true,
            EmployeeUpdate {
                target,
                target_role,
            } => match self.role {
                Admin => true,
                // Managers may edit non-admin accounts
                Manager => target_role != Admin,
                // Everyone may edit their own profile subset
                _ => target == self.id,
            },
            EmployeeDelete => self.role == Admin,
            PasswordReset { target_role } => match self.role {
                Admin => true,
                Manager => target_role != Admin,
                _ => false,
            },
            // Admins cannot change their own role or status (self-lockout
            // prevention); a second admin must do it.
            RoleChange { target } => self.role == Admin && target != self.id,
            StatusChange { target } => self.role == Admin && target != self.id,
            DepartmentWrite => matches!(self.role, Admin | Manager),
            ShiftWrite => matches!(self.role, Admin | Manager),
            ScheduleWrite => matches!(self.role, Admin | Manager | Scheduler),
            SchedulePublish => matches!(self.role, Admin | Manager),
            AssignmentCreate => matches!(self.role, Admin | Manager | Scheduler),
            AssignmentWrite => matches!(self.role, Admin | Manager | Scheduler),
            AssignmentRespond { assignee } => match self.role {
                Admin | Manager | Scheduler => true,
                _ => assignee == self.id,
            },
            RuleWrite => matches!(self.role, Admin | Manager | Scheduler),
            SolverRun => matches!(self.role, Admin | Manager | Scheduler),
        }
    }

    /// Check the matrix, converting denial into a `forbidden` error
    pub fn allows(&self, action: Action) -> Result<()> {
        if self.can(action) {
            Ok(())
        } else {
            Err(Error::forbidden(format!(
                "role {} may not perform this action",
                self.role
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role) -> Actor {
        Actor::new(Uuid::new_v4(), role)
    }

    #[test]
    fn test_employee_crud_matrix() {
        assert!(actor(Role::Admin).can(Action::EmployeeCreate));
        assert!(actor(Role::Manager).can(Action::EmployeeCreate));
        assert!(!actor(Role::Scheduler).can(Action::EmployeeCreate));
        assert!(!actor(Role::Employee).can(Action::EmployeeCreate));

        assert!(actor(Role::Employee).can(Action::EmployeeRead));
    }

    #[test]
    fn test_self_edit_allowed_for_employee() {
        let me = actor(Role::Employee);
        assert!(me.can(Action::EmployeeUpdate {
            target: me.id,
            target_role: Role::Employee
        }));
        assert!(!me.can(Action::EmployeeUpdate {
            target: Uuid::new_v4(),
            target_role: Role::Employee
        }));
    }

    #[test]
    fn test_manager_cannot_touch_admins() {
        let manager = actor(Role::Manager);
        assert!(!manager.can(Action::EmployeeUpdate {
            target: Uuid::new_v4(),
            target_role: Role::Admin
        }));
        assert!(!manager.can(Action::PasswordReset {
            target_role: Role::Admin
        }));
        assert!(manager.can(Action::PasswordReset {
            target_role: Role::Employee
        }));
    }

    #[test]
    fn test_self_lockout_prevention() {
        let admin = actor(Role::Admin);
        assert!(!admin.can(Action::RoleChange { target: admin.id }));
        assert!(!admin.can(Action::StatusChange { target: admin.id }));

        // A second admin can perform either action
        let other = actor(Role::Admin);
        assert!(other.can(Action::RoleChange { target: admin.id }));
        assert!(other.can(Action::StatusChange { target: admin.id }));
    }

    #[test]
    fn test_delete_is_admin_only() {
        assert!(actor(Role::Admin).can(Action::EmployeeDelete));
        assert!(!actor(Role::Manager).can(Action::EmployeeDelete));
    }

    #[test]
    fn test_assignment_response_ownership() {
        let employee = actor(Role::Employee);
        assert!(employee.can(Action::AssignmentRespond {
            assignee: employee.id
        }));
        assert!(!employee.can(Action::AssignmentRespond {
            assignee: Uuid::new_v4()
        }));

        // Managers can respond on anyone's behalf
        assert!(actor(Role::Manager).can(Action::AssignmentRespond {
            assignee: Uuid::new_v4()
        }));
    }

    #[test]
    fn test_solver_access() {
        assert!(actor(Role::Admin).can(Action::SolverRun));
        assert!(actor(Role::Manager).can(Action::SolverRun));
        assert!(actor(Role::Scheduler).can(Action::SolverRun));
        assert!(!actor(Role::Employee).can(Action::SolverRun));
    }

    #[test]
    fn test_allows_converts_to_forbidden() {
        let err = actor(Role::Employee)
            .allows(Action::SolverRun)
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }
}
