//! Basic math utility: small fixed-size vectors used across the baker.

use std::ops::{Add, AddAssign, BitXor, Div, DivAssign, Mul, MulAssign, Neg, Rem, Sub, SubAssign};

macro_rules! impl_vecn_base {
    ($struct_name: ident, $($x: ident),*) => {
        #[derive(Debug, Default, Copy, Clone, PartialEq)]
        pub struct $struct_name<T> {
            $( pub $x : T, )*
        }

        impl<T> $struct_name<T> {
            pub const fn new($($x: T,)*) -> Self {
                Self { $($x,)* }
            }
        }
    }
}

macro_rules! impl_vecn_binary_operator {
    ($op_name: ident, $op_fn_name: ident, $struct_name: ident, $($x: ident),*) => {
        impl<T: $op_name<Output = T>> $op_name<$struct_name<T>> for $struct_name<T> {
            type Output = $struct_name<T>;

            fn $op_fn_name(self, rhs: $struct_name<T>) -> Self::Output {
                Self::Output {
                    $( $x: $op_name::$op_fn_name(self.$x, rhs.$x), )*
                }
            }
        }

        impl<T: Clone + $op_name<Output = T>> $op_name<T> for $struct_name<T> {
            type Output = $struct_name<T>;

            fn $op_fn_name(self, rhs: T) -> Self::Output {
                Self::Output {
                    $( $x: $op_name::$op_fn_name(self.$x, rhs.clone()), )*
                }
            }
        }
    }
}

macro_rules! impl_vecn_assignment_operator {
    ($op_name: ident, $op_fn_name: ident, $struct_name: ident, $($x: ident),*) => {
        impl<T: $op_name> $op_name<$struct_name<T>> for $struct_name<T> {
            fn $op_fn_name(&mut self, rhs: $struct_name<T>) {
                $( $op_name::<T>::$op_fn_name(&mut self.$x, rhs.$x); )*
            }
        }

        impl<T: Clone + $op_name> $op_name<T> for $struct_name<T> {
            fn $op_fn_name(&mut self, rhs: T) {
                $( $op_name::<T>::$op_fn_name(&mut self.$x, rhs.clone()); )*
            }
        }
    }
}

macro_rules! operator_on_variadic {
    ($operator: tt, $first: expr) => {
        $first
    };

    ($operator: tt, $first: expr, $($rest: expr),*) => {
        $first $operator operator_on_variadic!($operator, $($rest),*)
    };
}

macro_rules! impl_vecn {
    ($struct_name: ident, $($x: ident),*) => {
        impl_vecn_base!($struct_name, $($x),*);

        impl<T: Add<T, Output = T> + Mul<T, Output = T>> BitXor for $struct_name<T> {
            type Output = T;

            /// Dot product
            fn bitxor(self, rhs: $struct_name<T>) -> Self::Output {
                operator_on_variadic!(+, $(self.$x * rhs.$x),*)
            }
        }

        impl<T: Add<T, Output = T> + Mul<T, Output = T> + Clone> $struct_name<T> {
            pub fn length2(&self) -> T {
                self.clone() ^ self.clone()
            }
        }

        impl $struct_name<f32> {
            pub fn length(&self) -> f32 {
                self.length2().sqrt()
            }

            pub fn normalized(&self) -> Self {
                let len = self.length();

                Self { $( $x: self.$x / len ),* }
            }

            pub fn normalize(&mut self) {
                let len = self.length();

                $( self.$x = self.$x / len; )*
            }
        }

        impl_vecn_binary_operator!(Add, add, $struct_name, $($x),*);
        impl_vecn_binary_operator!(Sub, sub, $struct_name, $($x),*);
        impl_vecn_binary_operator!(Mul, mul, $struct_name, $($x),*);
        impl_vecn_binary_operator!(Div, div, $struct_name, $($x),*);

        impl<T: Neg<Output = T>> Neg for $struct_name<T> {
            type Output = $struct_name<T>;

            fn neg(self) -> Self::Output {
                Self::Output {
                    $( $x: -self.$x, )*
                }
            }
        }

        impl_vecn_assignment_operator!(AddAssign, add_assign, $struct_name, $($x),*);
        impl_vecn_assignment_operator!(SubAssign, sub_assign, $struct_name, $($x),*);
        impl_vecn_assignment_operator!(MulAssign, mul_assign, $struct_name, $($x),*);
        impl_vecn_assignment_operator!(DivAssign, div_assign, $struct_name, $($x),*);
    }
}

impl_vecn!(Vec2, x, y);
impl_vecn!(Vec3, x, y, z);

impl_vecn_base!(Ext2, w, h);

impl<T: Clone + Mul<T, Output = T> + Sub<T, Output = T>> Vec3<T> {
    pub fn cross(self, rhs: Self) -> Vec3<T> {
        Vec3::<T> {
            x: self.y.clone() * rhs.z.clone() - self.z.clone() * rhs.y.clone(),
            y: self.z * rhs.x.clone() - self.x.clone() * rhs.z,
            z: self.x * rhs.y - self.y * rhs.x,
        }
    }
}

impl<T: Clone + Mul<T, Output = T> + Sub<T, Output = T>> Rem for Vec3<T> {
    type Output = Self;

    /// Cross product
    fn rem(self, rhs: Self) -> Self::Output {
        self.cross(rhs)
    }
}

pub type Vec2f = Vec2<f32>;
pub type Vec3f = Vec3<f32>;

pub type Vec2i32 = Vec2<i32>;
pub type Ext2i32 = Ext2<i32>;
pub type Ext2us = Ext2<usize>;

impl Vec3f {
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Normalize, rejecting near-zero input
    pub fn checked_normalized(&self) -> Option<Self> {
        let len2 = self.length2();

        if len2 > f32::EPSILON {
            Some(*self / len2.sqrt())
        } else {
            None
        }
    }
}

impl Vec2f {
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
}

#[macro_export]
macro_rules! vec3f {
    ($x: expr, $y: expr, $z: expr $(,)?) => {
        $crate::math::Vec3f::new($x, $y, $z)
    };
}

#[macro_export]
macro_rules! vec2f {
    ($x: expr, $y: expr $(,)?) => {
        $crate::math::Vec2f::new($x, $y)
    };
}
