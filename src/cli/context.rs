use std::path::{Path, PathBuf};

use sentinel_policy_center::SentinelPolicy;

pub struct CliContext {
    policy: SentinelPolicy,
    policy_path: PathBuf,
}

impl CliContext {
    pub fn new(policy: SentinelPolicy, policy_path: PathBuf) -> Self {
        Self {
            policy,
            policy_path,
        }
    }

    pub fn policy(&self) -> &SentinelPolicy {
        &self.policy
    }

    pub fn policy_path(&self) -> &Path {
        &self.policy_path
    }
}
