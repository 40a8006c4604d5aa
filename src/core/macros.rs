// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Macros

/// Creates a [`KV`](`crate::core::KV`) at compile time.
///
/// # Example
///
/// ```
/// use lincoa::kv;
///
/// let kv = kv!(
///     "key1" => "value1";
///     "key2" => "value2";
///     "key3" => 1234;
/// );
/// # assert_eq!(kv.kv.len(), 3);
/// # assert_eq!(kv.get("key1").unwrap(), "value1");
/// # assert_eq!(kv.get("key2").unwrap(), "value2");
/// # assert_eq!(kv.get("key3").unwrap(), "1234");
/// ```
#[macro_export]
macro_rules! kv {
    ($($k:expr => $v:expr;)*) => {
        $crate::core::KV {
            kv: vec![$(($k, format!("{}", $v))),*],
        }
    };
}

/// Creates a [`SolverError`](`crate::core::SolverError`) with a provided message, wrapped into
/// the boxed [`Error`](`crate::core::Error`) type.
#[macro_export]
macro_rules! solver_error {
    ($error_type:ident, $msg:expr) => {
        $crate::core::SolverError::$error_type {
            text: $msg.to_string(),
        }
        .into()
    };
}

/// Creates a [`SolverError`](`crate::core::SolverError`) with a provided message wrapped in a
/// closure for use in `.ok_or_else(...)` methods on `Option`s.
#[macro_export]
macro_rules! solver_error_closure {
    ($error_type:ident, $msg:expr) => {
        || -> $crate::core::Error { $crate::solver_error!($error_type, $msg) }
    };
}

/// Convert a constant to a float of given precision.
///
/// Within a function generic over the float type `F`, `float!(0.5)` converts the literal to `F`.
#[macro_export]
macro_rules! float {
    ($t:ident, $val:expr) => {
        $t::from_f64($val).unwrap()
    };
    ($val:expr) => {
        F::from_f64($val).unwrap()
    };
}

/// Implements a simple send and a simple sync test for a given type.
#[cfg(test)]
macro_rules! send_sync_test {
    ($n:ident, $t:ty) => {
        paste::item! {
            #[test]
            #[allow(non_snake_case)]
            fn [<test_send_ $n>]() {
                fn assert_send<T: Send>() {}
                assert_send::<$t>();
            }
        }

        paste::item! {
            #[test]
            #[allow(non_snake_case)]
            fn [<test_sync_ $n>]() {
                fn assert_sync<T: Sync>() {}
                assert_sync::<$t>();
            }
        }
    };
}

/// Creates tests for asserting that a struct implements `Send`, `Sync` and `Clone`.
#[macro_export]
macro_rules! test_trait_impl {
    ($n:ident, $t:ty) => {
        paste::item! {
            #[test]
            #[allow(non_snake_case)]
            fn [<test_send_ $n>]() {
                fn assert_send<T: Send>() {}
                assert_send::<$t>();
            }
        }

        paste::item! {
            #[test]
            #[allow(non_snake_case)]
            fn [<test_sync_ $n>]() {
                fn assert_sync<T: Sync>() {}
                assert_sync::<$t>();
            }
        }

        paste::item! {
            #[test]
            #[allow(non_snake_case)]
            fn [<test_clone_ $n>]() {
                fn assert_clone<T: Clone>() {}
                assert_clone::<$t>();
            }
        }
    };
}

/// Asserts that expression `$n` leads to an error of type `$t` and text `$s`.
#[macro_export]
macro_rules! assert_error {
    ($n:expr, $t:ty, $s:expr) => {
        assert_eq!(
            $n.err().unwrap().downcast_ref::<$t>().unwrap().to_string(),
            $s
        );
    };
}
