//! Per-request permission checking with an "unchecked request" warning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::authz::ability::AbilitySet;
use crate::authz::errors::AuthzError;
use crate::authz::query::QueryPredicate;
use crate::authz::registry::RuleRegistry;
use crate::authz::types::{Action, ResourceType, Subject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    NotChecked,
    Checked,
}

/// Outcome of a closure-style check: either a plain decision or a fallible one.
pub trait IntoDecision {
    fn into_decision(self) -> Result<bool, AuthzError>;
}

impl IntoDecision for bool {
    fn into_decision(self) -> Result<bool, AuthzError> {
        Ok(self)
    }
}

impl IntoDecision for Result<bool, AuthzError> {
    fn into_decision(self) -> Result<bool, AuthzError> {
        self
    }
}

struct GuardInner {
    registry: Arc<RuleRegistry>,
    subject: Option<Subject>,
    ability: OnceLock<AbilitySet>,
    checked: Arc<AtomicBool>,
}

/// Handle route code uses to authorize. Cheap to clone; all clones share
/// the request's check flag and lazily built ability set.
#[derive(Clone)]
pub struct AuditGuard {
    inner: Arc<GuardInner>,
}

/// Completion side of an [`AuditGuard`], owned by whoever drives the request.
#[derive(Debug)]
pub struct RequestAudit {
    checked: Arc<AtomicBool>,
    route: String,
    method: String,
    warn_unchecked: bool,
}

impl AuditGuard {
    pub fn begin(
        registry: Arc<RuleRegistry>,
        subject: Option<Subject>,
        route: impl Into<String>,
        method: impl Into<String>,
    ) -> (AuditGuard, RequestAudit) {
        let checked = Arc::new(AtomicBool::new(false));
        let guard = AuditGuard {
            inner: Arc::new(GuardInner {
                registry,
                subject,
                ability: OnceLock::new(),
                checked: Arc::clone(&checked),
            }),
        };
        let audit = RequestAudit {
            checked,
            route: route.into(),
            method: method.into(),
            warn_unchecked: true,
        };
        (guard, audit)
    }

    fn mark_checked(&self) {
        self.inner.checked.store(true, Ordering::Release);
    }

    pub fn is_checked(&self) -> bool {
        self.inner.checked.load(Ordering::Acquire)
    }

    pub fn subject(&self) -> Option<&Subject> {
        self.inner.subject.as_ref()
    }

    /// The subject's ability set, built on first use. Does not count as a check.
    pub fn ability(&self) -> &AbilitySet {
        self.inner.ability.get_or_init(|| {
            AbilitySet::for_subject(&self.inner.registry, self.inner.subject.clone())
        })
    }

    pub fn must_be_logged_in(&self) -> Result<&Subject, AuthzError> {
        self.mark_checked();
        self.subject().ok_or(AuthzError::AuthRequired)
    }

    pub fn check_if(&self, allowed: bool) -> Result<(), AuthzError> {
        self.mark_checked();
        if allowed {
            Ok(())
        } else {
            Err(AuthzError::PermissionDenied)
        }
    }

    /// Like [`check_if`](Self::check_if) with a predicate over the ability
    /// set. Errors from the predicate propagate unchanged.
    pub fn check_with<F, R>(&self, predicate: F) -> Result<(), AuthzError>
    where
        F: FnOnce(&AbilitySet) -> R,
        R: IntoDecision,
    {
        self.mark_checked();
        if predicate(self.ability()).into_decision()? {
            Ok(())
        } else {
            Err(AuthzError::PermissionDenied)
        }
    }

    pub fn allow_database_access_to(
        &self,
        action: Action,
        resource_type: ResourceType,
    ) -> Result<QueryPredicate, AuthzError> {
        self.mark_checked();
        if !self.inner.registry.has_rule(resource_type, action) {
            return Err(AuthzError::MissingRule {
                resource_type,
                action,
            });
        }
        Ok(self.ability().compile(action, resource_type))
    }

    /// For endpoints that are public on purpose.
    pub fn disable_check_warning(&self) {
        self.mark_checked();
    }
}

impl RequestAudit {
    pub fn warn_unchecked(mut self, enabled: bool) -> Self {
        self.warn_unchecked = enabled;
        self
    }

    pub fn status(&self) -> CheckStatus {
        if self.checked.load(Ordering::Acquire) {
            CheckStatus::Checked
        } else {
            CheckStatus::NotChecked
        }
    }

    /// Close the request. Warns once if no permission operation ran.
    pub fn finish(self) -> CheckStatus {
        let status = self.status();
        if status == CheckStatus::NotChecked && self.warn_unchecked {
            tracing::warn!(
                route = %self.route,
                method = %self.method,
                "request completed without a permission check"
            );
        }
        status
    }
}
