//! Method policy enforcement for EVM requests.

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::warn;

use super::{InterceptorDecision, RequestContext, RequestInterceptor};
use crate::config::PolicySettings;
use crate::Result;

#[derive(Debug, Clone, Default)]
pub struct MethodPolicy {
    blocked: HashSet<String>,
}

impl MethodPolicy {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &PolicySettings) -> Self {
        let mut blocked = HashSet::new();
        for method in &settings.blocked_methods {
            if !is_valid_method_name(method) {
                warn!(method = %method, "Invalid method name in policy; skipping rule");
                continue;
            }
            blocked.insert(method.clone());
        }
        Self { blocked }
    }

    pub fn is_blocked(&self, method: &str) -> bool {
        self.blocked.contains(method)
    }
}

fn is_valid_method_name(method: &str) -> bool {
    !method.is_empty()
        && method
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone)]
pub struct PolicyInterceptor {
    policy: MethodPolicy,
}

impl PolicyInterceptor {
    pub fn new(policy: MethodPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl RequestInterceptor for PolicyInterceptor {
    async fn intercept_request(&self, context: &RequestContext) -> Result<InterceptorDecision> {
        match context.method.as_deref() {
            Some(method) if self.policy.is_blocked(method) => Ok(InterceptorDecision::Block(
                format!("method {method} is disabled by policy"),
            )),
            _ => Ok(InterceptorDecision::Allow),
        }
    }
}
