use serde::Serialize;

///
/// Inherit
///
/// Inheritable compile-time value. A node's value is `Pending` until it is
/// either declared on the node or copied from its parent; children must
/// never observe a pending parent.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub enum Inherit<T> {
    #[default]
    Pending,
    Resolved(T),
}

impl<T: Copy> Inherit<T> {
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    #[must_use]
    pub const fn get(&self) -> Option<T> {
        match self {
            Self::Pending => None,
            Self::Resolved(v) => Some(*v),
        }
    }

    /// Keep a resolved value, otherwise adopt `parent`.
    #[must_use]
    pub const fn or_inherit(self, parent: Self) -> Self {
        match self {
            Self::Resolved(_) => self,
            Self::Pending => parent,
        }
    }

    #[must_use]
    pub fn resolved_or(self, default: T) -> T {
        self.get().unwrap_or(default)
    }
}

impl<T> From<Option<T>> for Inherit<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Pending, Self::Resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_value_wins_over_parent() {
        let own = Inherit::Resolved(5u32);
        assert_eq!(own.or_inherit(Inherit::Resolved(9)).get(), Some(5));
        assert_eq!(Inherit::Pending.or_inherit(Inherit::Resolved(9)).get(), Some(9));
        assert!(Inherit::<u32>::Pending.or_inherit(Inherit::Pending).is_pending());
    }
}
