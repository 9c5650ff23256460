use serde::{Deserialize, Serialize};

use crate::config::Config;

/// A pre-provisioned user that exists in the staging database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingTestUser {
    pub user_id: String,
    pub email: String,
}

impl StagingTestUser {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
        }
    }
}

/// Non-empty, ordered pool of test users.
#[derive(Debug, Clone)]
pub struct TestUserPool {
    users: Vec<StagingTestUser>,
}

impl TestUserPool {
    /// Returns `None` for an empty list, so a constructed pool always has
    /// at least one user.
    pub fn new(users: Vec<StagingTestUser>) -> Option<Self> {
        if users.is_empty() {
            None
        } else {
            Some(Self { users })
        }
    }

    /// The three users seeded in staging for E2E runs.
    pub fn staging_default() -> Self {
        Self {
            users: vec![
                StagingTestUser::new("staging-e2e-user-001", "e2e-test-001@staging.example.test"),
                StagingTestUser::new("staging-e2e-user-002", "e2e-test-002@staging.example.test"),
                StagingTestUser::new("staging-e2e-user-003", "e2e-test-003@staging.example.test"),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }
}

/// Pick the user for this process: `pool[process_id % len]`.
///
/// Stable for one process, so repeated runs inside it hit the same account.
/// Different processes may collide.
pub fn select_test_user(pool: &TestUserPool, process_id: u32) -> &StagingTestUser {
    let index = process_id as usize % pool.users.len();
    &pool.users[index]
}

/// Explicit `E2E_TEST_USER_ID`/`E2E_TEST_USER_EMAIL` override pool
/// selection when both are set.
pub fn resolve_test_user(config: &Config, pool: &TestUserPool, process_id: u32) -> StagingTestUser {
    match (config.var("E2E_TEST_USER_ID"), config.var("E2E_TEST_USER_EMAIL")) {
        (Some(user_id), Some(email)) => StagingTestUser::new(user_id, email),
        _ => select_test_user(pool, process_id).clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_has_three_users() {
        assert_eq!(TestUserPool::staging_default().len(), 3);
    }

    #[test]
    fn empty_pool_cannot_be_built() {
        assert!(TestUserPool::new(Vec::new()).is_none());
    }

    #[test]
    fn selection_is_process_id_mod_len() {
        let pool = TestUserPool::staging_default();
        assert_eq!(select_test_user(&pool, 0).user_id, "staging-e2e-user-001");
        assert_eq!(select_test_user(&pool, 4).user_id, "staging-e2e-user-002");
        assert_eq!(select_test_user(&pool, 3 * 1000 + 2).user_id, "staging-e2e-user-003");
    }

    #[test]
    fn selection_is_stable_for_same_inputs() {
        let pool = TestUserPool::staging_default();
        let pid = std::process::id();
        let first = select_test_user(&pool, pid).clone();
        for _ in 0..5 {
            assert_eq!(select_test_user(&pool, pid), &first);
        }
    }

    #[test]
    fn config_override_wins_over_pool() {
        let pool = TestUserPool::staging_default();
        let config = Config::from_vars([
            ("E2E_TEST_USER_ID", "custom-user"),
            ("E2E_TEST_USER_EMAIL", "custom@example.test"),
        ]);
        let user = resolve_test_user(&config, &pool, 7);
        assert_eq!(user.user_id, "custom-user");

        let partial = Config::from_vars([("E2E_TEST_USER_ID", "custom-user")]);
        assert_eq!(resolve_test_user(&partial, &pool, 7), *select_test_user(&pool, 7));
    }
}
