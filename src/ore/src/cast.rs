// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository, or online at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cast utilities.

/// A trait for safe, simple, and infallible casts.
///
/// `CastFrom` is like [`std::convert::From`], but it is implemented for some
/// platform-specific casts that are missing from the standard library.
///
/// `CastFrom` should be preferred to the `as` operator, since the `as` operator
/// will silently truncate if the target type is smaller than the source type.
pub trait CastFrom<T> {
    /// Performs the cast.
    fn cast_from(from: T) -> Self;
}

macro_rules! cast_from {
    ($from:ty, $to:ty) => {
        impl CastFrom<$from> for $to {
            #[allow(clippy::as_conversions)]
            fn cast_from(from: $from) -> $to {
                from as $to
            }
        }
    };
}

#[cfg(any(target_pointer_width = "32", target_pointer_width = "64"))]
cast_from!(u32, usize);

#[cfg(target_pointer_width = "64")]
cast_from!(u64, usize);

cast_from!(usize, u64);

#[cfg(target_pointer_width = "64")]
cast_from!(usize, i128);

/// A trait for casts that may lose precision, but never wrap or panic.
///
/// Row counts and selectivities are estimates, so losing the low bits of a
/// large count when moving it into floating point is acceptable.
pub trait CastLossy<T> {
    /// Performs the cast.
    fn cast_lossy(from: T) -> Self;
}

macro_rules! cast_lossy {
    ($from:ty, $to:ty) => {
        impl CastLossy<$from> for $to {
            #[allow(clippy::as_conversions)]
            fn cast_lossy(from: $from) -> $to {
                from as $to
            }
        }
    };
}

cast_lossy!(usize, f64);
cast_lossy!(u64, f64);
cast_lossy!(i64, f64);
