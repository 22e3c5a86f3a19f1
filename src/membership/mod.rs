mod cache;
mod service;

pub use cache::*;
pub use service::*;

#[cfg(test)]
pub(crate) use service::tests;

/// What to answer when an OU cannot be determined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailPolicy {
    /// Allow: directory trouble must not hide users.
    #[default]
    Open,
    /// Deny: users with an unknown OU are hidden.
    Closed,
}

impl FailPolicy {
    /// Create a policy from the `fail_open` configuration flag.
    pub fn from_fail_open(fail_open: bool) -> Self {
        if fail_open { Self::Open } else { Self::Closed }
    }

    /// Answer given to an indeterminate comparison.
    pub fn allows(self) -> bool {
        self == Self::Open
    }
}
