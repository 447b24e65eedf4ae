//! Relational schema
//!
//! One DDL batch, idempotent via IF NOT EXISTS. History tables are
//! append-only; nothing in the live graph references them.

/// Full schema creation batch
pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS departments (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    parent_id UUID REFERENCES departments(id),
    description TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS employees (
    id UUID PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    email_verified BOOLEAN NOT NULL DEFAULT FALSE,
    account_locked BOOLEAN NOT NULL DEFAULT FALSE,
    failed_login_attempts INTEGER NOT NULL DEFAULT 0,
    password_must_change BOOLEAN NOT NULL DEFAULT FALSE,
    department_id UUID REFERENCES departments(id),
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    phone TEXT,
    hire_date DATE,
    hourly_rate DOUBLE PRECISION NOT NULL DEFAULT 0,
    max_hours_per_week DOUBLE PRECISION NOT NULL DEFAULT 40,
    qualifications TEXT[] NOT NULL DEFAULT '{}',
    availability JSONB NOT NULL DEFAULT '{}',
    password_history TEXT[] NOT NULL DEFAULT '{}',
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_employees_email ON employees(email);
CREATE INDEX IF NOT EXISTS idx_employees_department ON employees(department_id);

CREATE TABLE IF NOT EXISTS shifts (
    id UUID PRIMARY KEY,
    date DATE NOT NULL,
    start_time TIME NOT NULL,
    end_time TIME NOT NULL,
    shift_type TEXT NOT NULL,
    department_id UUID REFERENCES departments(id),
    required_staff INTEGER NOT NULL DEFAULT 1,
    priority SMALLINT NOT NULL DEFAULT 5,
    requirements TEXT[] NOT NULL DEFAULT '{}',
    overnight BOOLEAN NOT NULL DEFAULT FALSE,
    notes TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_shifts_date_department ON shifts(date, department_id);

CREATE TABLE IF NOT EXISTS schedules (
    id UUID PRIMARY KEY,
    week_start DATE NOT NULL,
    week_end DATE NOT NULL,
    title TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'draft',
    created_by UUID NOT NULL REFERENCES employees(id),
    approved_by UUID REFERENCES employees(id),
    version INTEGER NOT NULL DEFAULT 1,
    parent_id UUID REFERENCES schedules(id),
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_schedules_week ON schedules(week_start, week_end);

CREATE TABLE IF NOT EXISTS schedule_assignments (
    id UUID PRIMARY KEY,
    schedule_id UUID NOT NULL REFERENCES schedules(id) ON DELETE CASCADE,
    employee_id UUID NOT NULL REFERENCES employees(id) ON DELETE RESTRICT,
    shift_id UUID NOT NULL REFERENCES shifts(id) ON DELETE RESTRICT,
    status TEXT NOT NULL DEFAULT 'assigned',
    priority SMALLINT NOT NULL DEFAULT 5,
    notes TEXT,
    decline_reason TEXT,
    assigned_by UUID NOT NULL REFERENCES employees(id),
    assigned_at TIMESTAMPTZ NOT NULL,
    conflicts_resolved BOOLEAN NOT NULL DEFAULT FALSE,
    auto_assigned BOOLEAN NOT NULL DEFAULT FALSE,
    updated_at TIMESTAMPTZ NOT NULL,
    UNIQUE (schedule_id, employee_id, shift_id)
);

CREATE INDEX IF NOT EXISTS idx_assignments_composite
    ON schedule_assignments(employee_id, schedule_id, shift_id);
CREATE INDEX IF NOT EXISTS idx_assignments_schedule ON schedule_assignments(schedule_id);

CREATE TABLE IF NOT EXISTS rules (
    id UUID PRIMARY KEY,
    rule_type TEXT NOT NULL,
    employee_id UUID REFERENCES employees(id) ON DELETE CASCADE,
    priority SMALLINT NOT NULL DEFAULT 5,
    active BOOLEAN NOT NULL DEFAULT TRUE,
    source_text TEXT NOT NULL,
    payload JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS notifications (
    id UUID PRIMARY KEY,
    recipient_id UUID NOT NULL REFERENCES employees(id) ON DELETE CASCADE,
    category TEXT NOT NULL,
    priority TEXT NOT NULL DEFAULT 'medium',
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    is_read BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL,
    expires_at TIMESTAMPTZ,
    actions JSONB NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_notifications_recipient
    ON notifications(recipient_id, is_read);

CREATE TABLE IF NOT EXISTS user_history (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES employees(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    old_value TEXT NOT NULL,
    new_value TEXT NOT NULL,
    changed_by UUID NOT NULL REFERENCES employees(id),
    changed_at TIMESTAMPTZ NOT NULL,
    reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_history_user ON user_history(user_id, kind, changed_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ddl_covers_all_entities() {
        for table in [
            "employees",
            "departments",
            "shifts",
            "schedules",
            "schedule_assignments",
            "rules",
            "notifications",
            "user_history",
        ] {
            assert!(
                DDL.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn test_mandatory_indexes_present() {
        assert!(DDL.contains("idx_assignments_composite"));
        assert!(DDL.contains("idx_shifts_date_department"));
        assert!(DDL.contains("idx_schedules_week"));
        assert!(DDL.contains("idx_employees_email"));
    }

    #[test]
    fn test_ownership_policies() {
        // Schedule owns its assignments; employee/shift references never cascade
        assert!(DDL.contains("REFERENCES schedules(id) ON DELETE CASCADE"));
        assert!(DDL.contains("REFERENCES employees(id) ON DELETE RESTRICT"));
        assert!(DDL.contains("REFERENCES shifts(id) ON DELETE RESTRICT"));
    }
}
