//! Audit stamping
//!
//! [`stamp_create`] and [`stamp_update`] are pure: the caller supplies the
//! principal and the timestamp. [`AuditStamper`] binds them to the injected
//! clock and principal resolver.

use std::fmt;
use std::sync::Arc;

use bridge_traits::identity::PrincipalResolver;
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};

use crate::lifecycle::SaveAction;
use crate::models::DomainRecord;

/// Sets `created_by`/`created_on`. Update fields are left alone.
pub fn stamp_create<R: DomainRecord>(record: &mut R, principal: &str, now: DateTime<Utc>) {
    let audit = record.audit_mut();
    audit.created_by = Some(principal.to_string());
    audit.created_on = Some(now);
}

/// Sets `updated_by`/`updated_on`. Create fields are left alone.
pub fn stamp_update<R: DomainRecord>(record: &mut R, principal: &str, now: DateTime<Utc>) {
    let audit = record.audit_mut();
    audit.updated_by = Some(principal.to_string());
    audit.updated_on = Some(now);
}

/// Stamps records with the current principal and time
#[derive(Clone)]
pub struct AuditStamper {
    clock: Arc<dyn Clock>,
    principal: Arc<dyn PrincipalResolver>,
}

impl AuditStamper {
    pub fn new(clock: Arc<dyn Clock>, principal: Arc<dyn PrincipalResolver>) -> Self {
        Self { clock, principal }
    }

    /// Stamps according to `action`; deletes are never stamped.
    pub fn stamp<R: DomainRecord>(&self, record: &mut R, action: SaveAction) {
        match action {
            SaveAction::Create => stamp_create(
                record,
                &self.principal.current_principal_id(),
                self.clock.now(),
            ),
            SaveAction::Update => stamp_update(
                record,
                &self.principal.current_principal_id(),
                self.clock.now(),
            ),
            SaveAction::Delete => {}
        }
    }

    pub fn principal_id(&self) -> String {
        self.principal.current_principal_id()
    }
}

impl fmt::Debug for AuditStamper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditStamper").finish_non_exhaustive()
    }
}
