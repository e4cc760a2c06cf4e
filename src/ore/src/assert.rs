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

//! Soft assertions.
//!
//! Soft assertions panic in debug builds and log an error in release builds.
//! They guard invariants whose violation indicates a bug but should not take
//! down the caller in production.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

static SOFT_ASSERTIONS: AtomicBool = AtomicBool::new(cfg!(debug_assertions));

/// Reports whether soft assertions are enabled.
pub fn soft_assertions_enabled() -> bool {
    SOFT_ASSERTIONS.load(Ordering::Relaxed)
}

/// Enables or disables soft assertions at runtime.
pub fn set_soft_assertions(enabled: bool) {
    SOFT_ASSERTIONS.store(enabled, Ordering::Relaxed);
}

/// Asserts that a condition is true if soft assertions are enabled, and logs
/// an error otherwise.
#[macro_export]
macro_rules! soft_assert_or_log {
    ($cond:expr, $($arg:tt)+) => {{
        if !$cond {
            if $crate::assert::soft_assertions_enabled() {
                panic!("assertion {} failed: {}", stringify!($cond), format_args!($($arg)+));
            } else {
                ::tracing::error!("assertion {} failed: {}", stringify!($cond), format_args!($($arg)+));
            }
        }
    }}
}

/// Panics if soft assertions are enabled, and logs an error otherwise.
#[macro_export]
macro_rules! soft_panic_or_log {
    ($($arg:tt)+) => {{
        if $crate::assert::soft_assertions_enabled() {
            panic!($($arg)+);
        } else {
            ::tracing::error!($($arg)+);
        }
    }}
}

#[cfg(test)]
mod tests {
    #[crate::test]
    fn test_soft_assert_passes() {
        soft_assert_or_log!(1 + 1 == 2, "arithmetic is broken");
    }

    #[crate::test]
    #[should_panic(expected = "assertion false failed: boom")]
    fn test_soft_assert_panics_when_enabled() {
        super::set_soft_assertions(true);
        soft_assert_or_log!(false, "boom");
    }
}
