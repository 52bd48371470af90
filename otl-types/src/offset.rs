//! Offsets to tables

macro_rules! impl_offset {
    ($name:ident, $bits:literal, $rawty:ty) => {
        #[doc = concat!("A ", stringify!($bits), "-bit offset to a table.")]
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
        pub struct $name($rawty);

        impl $name {
            /// Create a new offset.
            pub const fn new(raw: $rawty) -> Self {
                Self(raw)
            }

            /// Return a null offset.
            pub const fn null() -> Self {
                Self(0)
            }

            /// Return the raw integer value of this offset.
            pub const fn to_u32(self) -> u32 {
                self.0 as u32
            }

            /// `true` if this offset is zero.
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        crate::raw::newtype_scalar!($name, [u8; $bits / 8]);
    };
}

impl_offset!(Offset16, 16, u16);
impl_offset!(Offset32, 32, u32);
