use std::collections::HashMap;

use serde::Serialize;

use crate::calls::CallStats;
use crate::domain::employee::{Department, DepartmentId, User, UserId};
use crate::org::HierarchyResolver;

pub const UNKNOWN_DEPARTMENT: &str = "Не указан";

/// One line of the employee directory page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmployeeRow {
    pub id: UserId,
    pub name: String,
    pub department: String,
    pub managers: Vec<String>,
    pub calls_count: u32,
}

/// Directory rows for every active user, in input order.
pub fn build_directory(
    users: &[User],
    departments: &[Department],
    call_stats: &CallStats,
) -> Vec<EmployeeRow> {
    let resolver = HierarchyResolver::new(users, departments);
    let department_names: HashMap<DepartmentId, &str> =
        departments.iter().map(|department| (department.id, department.name.as_str())).collect();

    users
        .iter()
        .filter(|user| user.active)
        .map(|user| {
            let department = match user.departments.first() {
                Some(id) => department_names.get(id).copied().unwrap_or(UNKNOWN_DEPARTMENT),
                None => "",
            };

            EmployeeRow {
                id: user.id,
                name: user.full_name(),
                department: department.to_string(),
                managers: resolver
                    .manager_chain_for(user)
                    .into_iter()
                    .map(User::short_name)
                    .collect(),
                calls_count: call_stats.count_for(user.id),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{build_directory, UNKNOWN_DEPARTMENT};
    use crate::calls::{aggregate_calls, CallStats, CallStatsPolicy};
    use crate::domain::call::{CallDirection, CallRecord};
    use crate::domain::employee::{Department, DepartmentId, User, UserId};

    fn user(id: i64, first: &str, last: &str, departments: &[i64]) -> User {
        User {
            id: UserId(id),
            first_name: first.to_string(),
            last_name: last.to_string(),
            middle_name: String::new(),
            departments: departments.iter().copied().map(DepartmentId).collect(),
            active: true,
        }
    }

    #[test]
    fn rows_carry_department_managers_and_calls() {
        let users = vec![
            user(1, "Ivan", "Sidorov", &[2]),
            user(2, "Olga", "Kuznetsova", &[1]),
            user(3, "Petr", "Orlov", &[]),
            user(4, "Nina", "Lebedeva", &[77]),
        ];
        let departments = vec![
            Department { id: DepartmentId(1), name: "Head office".to_string(), head: None },
            Department { id: DepartmentId(2), name: "Sales".to_string(), head: Some(UserId(2)) },
        ];
        let calls = vec![CallRecord {
            user_id: Some(UserId(1)),
            duration_secs: 95,
            direction: CallDirection::Outbound,
        }];
        let stats = aggregate_calls(
            &calls,
            users.iter().map(|user| user.id),
            &CallStatsPolicy::default(),
        );

        let rows = build_directory(&users, &departments, &stats);

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].name, "Sidorov Ivan");
        assert_eq!(rows[0].department, "Sales");
        assert_eq!(rows[0].managers, vec!["Kuznetsova Olga".to_string()]);
        assert_eq!(rows[0].calls_count, 1);
        assert!(rows[1].managers.is_empty());
        assert_eq!(rows[2].department, "");
        assert_eq!(rows[3].department, UNKNOWN_DEPARTMENT);
    }

    #[test]
    fn inactive_users_are_left_out() {
        let mut retired = user(5, "Old", "Timer", &[1]);
        retired.active = false;
        let users = vec![user(1, "A", "B", &[1]), retired];

        let rows = build_directory(&users, &[], &CallStats::default());

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].calls_count, 0);
    }
}
