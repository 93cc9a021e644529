use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Gibibytes of device memory. A unit-carrying newtype so a GiB value can
/// never be silently added to a byte count or a lease count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Gib(pub u64);

impl Gib {
    pub const ZERO: Gib = Gib(0);

    #[must_use]
    pub fn checked_sub(self, rhs: Gib) -> Option<Gib> {
        self.0.checked_sub(rhs.0).map(Gib)
    }
}

impl Add for Gib {
    type Output = Gib;
    fn add(self, rhs: Gib) -> Gib {
        Gib(self.0 + rhs.0)
    }
}

impl Sub for Gib {
    type Output = Gib;
    fn sub(self, rhs: Gib) -> Gib {
        Gib(self.0 - rhs.0)
    }
}

impl fmt::Display for Gib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} GiB", self.0)
    }
}
