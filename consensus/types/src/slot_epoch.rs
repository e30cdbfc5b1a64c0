//! The `Slot` and `Epoch` types are defined as new-types over `u64`.
//!
//! Keeping them distinct prevents mixing the two units in arithmetic, while the impls below
//! allow the ergonomic maths the rest of the workspace expects. Additions and subtractions
//! saturate rather than wrap; the chain never runs anywhere near `u64::max_value()` slots, so a
//! saturated value is always a bug made visible rather than a silent wrap.

use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Rem, Sub, SubAssign};

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(u64);

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(u64);

macro_rules! impl_common {
    ($type: ident) => {
        impl $type {
            pub const fn new(i: u64) -> $type {
                $type(i)
            }

            pub fn as_u64(self) -> u64 {
                self.0
            }

            pub fn as_usize(self) -> usize {
                self.0 as usize
            }

            pub fn max_value() -> $type {
                $type(u64::max_value())
            }

            pub fn saturating_sub<T: Into<u64>>(self, other: T) -> $type {
                $type(self.0.saturating_sub(other.into()))
            }
        }

        impl From<u64> for $type {
            fn from(i: u64) -> $type {
                $type(i)
            }
        }

        impl From<$type> for u64 {
            fn from(i: $type) -> u64 {
                i.0
            }
        }

        impl Add<$type> for $type {
            type Output = $type;

            fn add(self, other: $type) -> $type {
                $type(self.0.saturating_add(other.0))
            }
        }

        impl Add<u64> for $type {
            type Output = $type;

            fn add(self, other: u64) -> $type {
                $type(self.0.saturating_add(other))
            }
        }

        impl AddAssign<u64> for $type {
            fn add_assign(&mut self, other: u64) {
                self.0 = self.0.saturating_add(other);
            }
        }

        impl Sub<$type> for $type {
            type Output = $type;

            fn sub(self, other: $type) -> $type {
                $type(self.0.saturating_sub(other.0))
            }
        }

        impl Sub<u64> for $type {
            type Output = $type;

            fn sub(self, other: u64) -> $type {
                $type(self.0.saturating_sub(other))
            }
        }

        impl SubAssign<u64> for $type {
            fn sub_assign(&mut self, other: u64) {
                self.0 = self.0.saturating_sub(other);
            }
        }

        impl Mul<u64> for $type {
            type Output = $type;

            fn mul(self, rhs: u64) -> $type {
                $type(self.0.saturating_mul(rhs))
            }
        }

        impl Div<u64> for $type {
            type Output = $type;

            fn div(self, rhs: u64) -> $type {
                $type(self.0 / rhs)
            }
        }

        impl Rem<u64> for $type {
            type Output = $type;

            fn rem(self, rhs: u64) -> $type {
                $type(self.0 % rhs)
            }
        }

        impl PartialEq<u64> for $type {
            fn eq(&self, other: &u64) -> bool {
                self.0 == *other
            }
        }

        impl PartialOrd<u64> for $type {
            fn partial_cmp(&self, other: &u64) -> Option<std::cmp::Ordering> {
                self.0.partial_cmp(other)
            }
        }

        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $type {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}({})", stringify!($type), self.0)
            }
        }
    };
}

impl_common!(Slot);
impl_common!(Epoch);

impl Slot {
    /// Returns the epoch this slot belongs to, under the given epoch length.
    pub fn epoch(self, slots_per_epoch: u64) -> Epoch {
        Epoch::new(self.0 / slots_per_epoch)
    }
}

impl Epoch {
    /// Returns the first slot of this epoch, under the given epoch length.
    pub fn start_slot(self, slots_per_epoch: u64) -> Slot {
        Slot::new(self.0.saturating_mul(slots_per_epoch))
    }
}
