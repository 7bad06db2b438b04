//! Non-owning cross-references between subsystems of one context.
//!
//! A [`Link<T>`] does not point at memory. It records which context and
//! which subsystem slot it was wired to; the owning context resolves it on
//! demand. An unassigned link, or a link wired in another context, fails to
//! resolve with a [`LinkError`] instead of aliasing stale state.

use std::fmt;
use std::marker::PhantomData;

use crate::error::LinkError;
use crate::id::{ContextId, SubsystemId};

/// Where a link points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LinkTarget {
    /// Context the link was established in.
    pub context: ContextId,
    /// Subsystem slot the link refers to.
    pub subsystem: SubsystemId,
}

/// Typed, non-owning reference to a subsystem of type `T`.
pub struct Link<T> {
    target: Option<LinkTarget>,
    _to: PhantomData<fn() -> T>,
}

impl<T> Link<T> {
    /// A link that has not been assigned yet.
    pub const fn unlinked() -> Self {
        Self {
            target: None,
            _to: PhantomData,
        }
    }

    /// Point the link at `subsystem` inside `context`.
    ///
    /// Reassigning the same target is a no-op, which keeps linking
    /// idempotent.
    pub fn assign(&mut self, context: ContextId, subsystem: SubsystemId) {
        self.target = Some(LinkTarget { context, subsystem });
    }

    /// Current target, if assigned.
    pub fn target(&self) -> Option<LinkTarget> {
        self.target
    }

    /// Whether the link has been assigned.
    pub fn is_linked(&self) -> bool {
        self.target.is_some()
    }

    /// Verify the link may be resolved as `expected` inside `context`.
    pub fn check(&self, context: ContextId, expected: SubsystemId) -> Result<(), LinkError> {
        let target = self.target.ok_or(LinkError::Unlinked { target: expected })?;
        if target.context != context {
            return Err(LinkError::ForeignContext {
                target: expected,
                expected: context,
                found: target.context,
            });
        }
        if target.subsystem != expected {
            return Err(LinkError::WrongTarget {
                expected,
                found: target.subsystem,
            });
        }
        Ok(())
    }
}

impl<T> Default for Link<T> {
    fn default() -> Self {
        Self::unlinked()
    }
}

impl<T> Clone for Link<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Link<T> {}

impl<T> PartialEq for Link<T> {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl<T> Eq for Link<T> {}

impl<T> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            Some(t) => write!(f, "Link({} in {})", t.subsystem, t.context),
            None => f.write_str("Link(unlinked)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    #[test]
    fn unlinked_fails_check() {
        let link: Link<Dummy> = Link::unlinked();
        let ctx = ContextId::next();
        assert_eq!(
            link.check(ctx, SubsystemId::Scaling),
            Err(LinkError::Unlinked {
                target: SubsystemId::Scaling
            })
        );
    }

    #[test]
    fn foreign_context_fails_check() {
        let mut link: Link<Dummy> = Link::unlinked();
        let a = ContextId::next();
        let b = ContextId::next();
        link.assign(a, SubsystemId::Scaling);
        assert!(link.check(a, SubsystemId::Scaling).is_ok());
        assert!(matches!(
            link.check(b, SubsystemId::Scaling),
            Err(LinkError::ForeignContext { .. })
        ));
    }

    #[test]
    fn wrong_target_fails_check() {
        let mut link: Link<Dummy> = Link::unlinked();
        let ctx = ContextId::next();
        link.assign(ctx, SubsystemId::GridPartition);
        assert_eq!(
            link.check(ctx, SubsystemId::Scaling),
            Err(LinkError::WrongTarget {
                expected: SubsystemId::Scaling,
                found: SubsystemId::GridPartition,
            })
        );
    }

    #[test]
    fn reassign_is_idempotent() {
        let mut link: Link<Dummy> = Link::unlinked();
        let ctx = ContextId::next();
        link.assign(ctx, SubsystemId::Scaling);
        let first = link;
        link.assign(ctx, SubsystemId::Scaling);
        assert_eq!(first, link);
    }
}
