//! Organisational hierarchy resolution.
//!
//! Reporting lines are not stored on the user record; they are derived by
//! following department heads: a user's manager is the head of their primary
//! department, that manager's manager is the head of *their* primary
//! department, and so on until the walk runs out of heads or revisits a
//! department.

pub mod directory;

use std::collections::{HashMap, HashSet};

use crate::domain::employee::{Department, DepartmentId, User, UserId};

pub use directory::{build_directory, EmployeeRow, UNKNOWN_DEPARTMENT};

/// Department → head user id, for departments that carry both an id and a head.
pub fn department_heads(departments: &[Department]) -> HashMap<DepartmentId, UserId> {
    departments
        .iter()
        .filter(|department| department.id.is_assigned())
        .filter_map(|department| {
            department.head.filter(|head| head.0 > 0).map(|head| (department.id, head))
        })
        .collect()
}

/// Index of users by id. Duplicate ids resolve to the last occurrence.
pub fn users_by_id(users: &[User]) -> HashMap<UserId, &User> {
    users.iter().map(|user| (user.id, user)).collect()
}

/// Managers above `user`, immediate manager first.
///
/// Stops on: no primary department, a department without a head, a head that
/// is not in `users_by_id`, a head equal to `user` (not appended), or a
/// department already visited during this walk.
pub fn manager_chain_for<'a>(
    user: &User,
    users_by_id: &HashMap<UserId, &'a User>,
    department_heads: &HashMap<DepartmentId, UserId>,
) -> Vec<&'a User> {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut current = user.primary_department();

    while let Some(department) = current {
        if !visited.insert(department) {
            break;
        }

        let Some(head_id) = department_heads.get(&department) else {
            break;
        };
        let Some(head) = users_by_id.get(head_id).copied() else {
            break;
        };
        if head.id == user.id {
            break;
        }

        chain.push(head);
        current = head.primary_department();
    }

    chain
}

/// Resolver over one request's worth of users and departments. Indexes are
/// built once; inactive users are left out of them.
#[derive(Debug)]
pub struct HierarchyResolver<'a> {
    users_by_id: HashMap<UserId, &'a User>,
    department_heads: HashMap<DepartmentId, UserId>,
}

impl<'a> HierarchyResolver<'a> {
    pub fn new(users: &'a [User], departments: &[Department]) -> Self {
        let users_by_id =
            users.iter().filter(|user| user.active).map(|user| (user.id, user)).collect();
        Self { users_by_id, department_heads: department_heads(departments) }
    }

    pub fn manager_chain_for(&self, user: &User) -> Vec<&'a User> {
        manager_chain_for(user, &self.users_by_id, &self.department_heads)
    }

    pub fn head_of(&self, department: DepartmentId) -> Option<&'a User> {
        self.department_heads.get(&department).and_then(|head| self.users_by_id.get(head).copied())
    }

    pub fn user(&self, id: UserId) -> Option<&'a User> {
        self.users_by_id.get(&id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::{department_heads, manager_chain_for, users_by_id, HierarchyResolver};
    use crate::domain::employee::{Department, DepartmentId, User, UserId};

    fn user(id: i64, departments: &[i64]) -> User {
        User {
            id: UserId(id),
            first_name: format!("First{id}"),
            last_name: format!("Last{id}"),
            middle_name: String::new(),
            departments: departments.iter().copied().map(DepartmentId).collect(),
            active: true,
        }
    }

    fn department(id: i64, head: Option<i64>) -> Department {
        Department { id: DepartmentId(id), name: format!("Dept{id}"), head: head.map(UserId) }
    }

    fn ids(chain: &[&User]) -> Vec<i64> {
        chain.iter().map(|user| user.id.0).collect()
    }

    #[test]
    fn department_heads_skips_headless_and_unassigned_departments() {
        let heads = department_heads(&[
            department(1, Some(10)),
            department(2, None),
            department(0, Some(11)),
            department(3, Some(0)),
        ]);

        assert_eq!(heads.len(), 1);
        assert_eq!(heads.get(&DepartmentId(1)), Some(&UserId(10)));
    }

    #[test]
    fn users_by_id_keeps_last_duplicate() {
        let mut second = user(5, &[2]);
        second.first_name = "Second".to_string();
        let users = vec![user(5, &[1]), second];

        let index = users_by_id(&users);

        assert_eq!(index.len(), 1);
        assert_eq!(index[&UserId(5)].first_name, "Second");
    }

    #[test]
    fn flat_department_scenario() {
        // users {1: A, 2: A, 3: B}, departments {A: head 2, B: no head}
        let users = vec![user(1, &[1]), user(2, &[1]), user(3, &[2])];
        let departments = vec![department(1, Some(2)), department(2, None)];
        let resolver = HierarchyResolver::new(&users, &departments);

        assert_eq!(ids(&resolver.manager_chain_for(&users[0])), vec![2]);
        assert!(resolver.manager_chain_for(&users[1]).is_empty());
        assert!(resolver.manager_chain_for(&users[2]).is_empty());
    }

    #[test]
    fn chain_climbs_through_parent_heads() {
        let users = vec![user(1, &[3]), user(2, &[2]), user(3, &[1]), user(4, &[1])];
        let departments =
            vec![department(1, Some(4)), department(2, Some(3)), department(3, Some(2))];
        let resolver = HierarchyResolver::new(&users, &departments);

        assert_eq!(ids(&resolver.manager_chain_for(&users[0])), vec![2, 3, 4]);
        assert_eq!(ids(&resolver.manager_chain_for(&users[1])), vec![3, 4]);
        assert!(resolver.manager_chain_for(&users[3]).is_empty());
    }

    #[test]
    fn cycle_stops_at_self_reference() {
        // A: head 2 (who sits in B), B: head 1 (who sits in A)
        let users = vec![user(1, &[1]), user(2, &[2])];
        let departments = vec![department(1, Some(2)), department(2, Some(1))];
        let resolver = HierarchyResolver::new(&users, &departments);

        assert_eq!(ids(&resolver.manager_chain_for(&users[0])), vec![2]);
        assert_eq!(ids(&resolver.manager_chain_for(&users[1])), vec![1]);
    }

    #[test]
    fn cycle_stops_at_revisited_department() {
        let users = vec![user(1, &[1]), user(2, &[2]), user(3, &[1])];
        let departments = vec![department(1, Some(2)), department(2, Some(1))];
        let resolver = HierarchyResolver::new(&users, &departments);

        let chain = resolver.manager_chain_for(&users[2]);

        assert_eq!(ids(&chain), vec![2, 1]);
        assert!(chain.len() <= departments.len());
    }

    #[test]
    fn head_of_own_department_is_listed_once_per_department() {
        // 2 heads department 2 and also department 1, where she sits.
        let users = vec![user(1, &[2]), user(2, &[1])];
        let departments = vec![department(1, Some(2)), department(2, Some(2))];
        let resolver = HierarchyResolver::new(&users, &departments);

        assert_eq!(ids(&resolver.manager_chain_for(&users[0])), vec![2, 2]);
        assert!(resolver.manager_chain_for(&users[1]).is_empty());
    }

    #[test]
    fn unknown_head_ends_the_walk() {
        let users = vec![user(1, &[1]), user(2, &[2])];
        let departments = vec![department(1, Some(2)), department(2, Some(99))];
        let heads = department_heads(&departments);
        let index = users_by_id(&users);

        assert_eq!(ids(&manager_chain_for(&users[0], &index, &heads)), vec![2]);
    }

    #[test]
    fn inactive_heads_are_not_resolved() {
        let mut head = user(2, &[2]);
        head.active = false;
        let users = vec![user(1, &[1]), head];
        let departments = vec![department(1, Some(2))];
        let resolver = HierarchyResolver::new(&users, &departments);

        assert!(resolver.manager_chain_for(&users[0]).is_empty());
        assert!(resolver.head_of(DepartmentId(1)).is_none());
    }

    #[test]
    fn user_without_departments_has_no_managers() {
        let users = vec![user(1, &[]), user(2, &[0, 1])];
        let departments = vec![department(1, Some(3))];
        let resolver = HierarchyResolver::new(&users, &departments);

        assert!(resolver.manager_chain_for(&users[0]).is_empty());
        assert!(resolver.manager_chain_for(&users[1]).is_empty());
    }

    #[test]
    fn only_primary_department_is_followed() {
        let users = vec![user(1, &[1, 2]), user(2, &[]), user(3, &[])];
        let departments = vec![department(1, Some(2)), department(2, Some(3))];
        let resolver = HierarchyResolver::new(&users, &departments);

        assert_eq!(ids(&resolver.manager_chain_for(&users[0])), vec![2]);
    }
}
