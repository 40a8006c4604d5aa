// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Observers
//!
//! Observers inspect the state of a solver at initialization and after every iteration. This
//! includes the parameter vector, cost function values, iteration number, evaluation counts as
//! well as solver-specific metrics such as the current trust-region radius. Observers can be used
//! to implement loggers or to send the information to a storage.
//!
//! The observer [`SlogLogger`](`crate::core::observers::SlogLogger`) logs the progress of the
//! optimization to the terminal. It requires the `slog-logger` feature (enabled by default).
//!
//! For each observer it can be defined how often it will observe the progress of the solver via
//! [`ObserverMode`], which can be either `Always`, `Never`, `NewBest` (whenever a new best
//! solution is found) or `Every(i)` (every `i`th iteration).
//!
//! Custom observers are implemented via the [`Observe`] trait.

#[cfg(feature = "slog-logger")]
pub mod slog_logger;

#[cfg(feature = "slog-logger")]
pub use slog_logger::SlogLogger;

use crate::core::{Error, State, KV};
use std::default::Default;
use std::sync::{Arc, Mutex};

/// An interface which every observer is required to implement
///
/// # Example
///
/// ```
/// use lincoa::core::observers::Observe;
/// use lincoa::core::{Error, State, KV};
///
/// struct MyObserver {}
///
/// impl<I> Observe<I> for MyObserver
/// where
///     I: State,
/// {
///     fn observe_init(&mut self, name: &str, kv: &KV) -> Result<(), Error> {
///         // Executed after initialization of a solver
///         Ok(())
///     }
///
///     fn observe_iter(&mut self, state: &I, kv: &KV) -> Result<(), Error> {
///         // Executed after each iteration of a solver
///         Ok(())
///     }
/// }
/// ```
pub trait Observe<I> {
    /// Called once after initialization of the solver.
    ///
    /// Has access to the name of the solver via `name` and to a key-value store `kv` with entries
    /// specific for each solver.
    fn observe_init(&mut self, _name: &str, _kv: &KV) -> Result<(), Error> {
        Ok(())
    }

    /// Called at every iteration of the solver.
    ///
    /// Has access to the current `state` of the solver and to a key-value store `kv` with entries
    /// specific for each solver.
    fn observe_iter(&mut self, _state: &I, _kv: &KV) -> Result<(), Error> {
        Ok(())
    }
}

type ObserversVec<I> = Vec<(Arc<Mutex<dyn Observe<I>>>, ObserverMode)>;

/// Container for observers.
///
/// This type also implements [`Observe`] and therefore can be used like a single observer. Each
/// observer has an [`ObserverMode`] attached which indicates when the observer will be called.
#[derive(Clone, Default)]
pub struct Observers<I> {
    /// Vector of `Observe`rs with the corresponding `ObserverMode`
    observers: ObserversVec<I>,
}

impl<I> Observers<I> {
    /// Construct a new empty `Observers` instance.
    pub fn new() -> Self {
        Observers { observers: vec![] }
    }

    /// Add another observer with a corresponding [`ObserverMode`].
    pub fn push<OBS: Observe<I> + 'static>(
        &mut self,
        observer: OBS,
        mode: ObserverMode,
    ) -> &mut Self {
        self.observers.push((Arc::new(Mutex::new(observer)), mode));
        self
    }

    /// Returns true if there are no observers stored.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

/// Implementing [`Observe`] for [`Observers`] allows one to use it like a single observer. The
/// implementation loops over all stored observers, checks if the conditions for observing are met
/// and calls the actual observers if required.
impl<I: State> Observe<I> for Observers<I> {
    /// After initialization of the solver, this loops over all stored observers and calls them.
    fn observe_init(&mut self, name: &str, kv: &KV) -> Result<(), Error> {
        for l in self.observers.iter() {
            l.0.lock().unwrap().observe_init(name, kv)?
        }
        Ok(())
    }

    /// Called after each iteration.
    fn observe_iter(&mut self, state: &I, kv: &KV) -> Result<(), Error> {
        for l in self.observers.iter_mut() {
            let iter = state.get_iter();
            let observer = &mut l.0.lock().unwrap();
            match l.1 {
                ObserverMode::Always => observer.observe_iter(state, kv),
                ObserverMode::Every(i) if iter % i == 0 => observer.observe_iter(state, kv),
                ObserverMode::NewBest if state.is_best() => observer.observe_iter(state, kv),
                ObserverMode::Never | ObserverMode::Every(_) | ObserverMode::NewBest => Ok(()),
            }?
        }
        Ok(())
    }
}

/// Indicates when to call an observer.
///
/// `Always` calls the observer in every iteration, `Every(X)` calls the observer every X
/// iterations, `NewBest` calls the observer only when a new best parameter vector is found and
/// `Never` deactivates the observer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ObserverMode {
    /// Never call the observer
    Never,
    /// Call observer in every iteration
    Always,
    /// Call observer every N iterations
    Every(u64),
    /// Call observer when new best is found
    NewBest,
}

impl Default for ObserverMode {
    /// The default for `ObserverMode` is `Always`
    fn default() -> ObserverMode {
        ObserverMode::Always
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::IterState;

    send_sync_test!(observermode, ObserverMode);

    struct CountingObserver {
        data: Arc<Mutex<(usize, usize)>>,
    }

    impl<I> Observe<I> for CountingObserver {
        fn observe_init(&mut self, _name: &str, _kv: &KV) -> Result<(), Error> {
            self.data.lock().unwrap().0 += 1;
            Ok(())
        }

        fn observe_iter(&mut self, _state: &I, _kv: &KV) -> Result<(), Error> {
            self.data.lock().unwrap().1 += 1;
            Ok(())
        }
    }

    #[test]
    fn test_observer_modes() {
        type TState = IterState<Vec<f64>, f64>;

        let never = Arc::new(Mutex::new((0, 0)));
        let always = Arc::new(Mutex::new((0, 0)));
        let every_three = Arc::new(Mutex::new((0, 0)));

        let mut obs: Observers<TState> = Observers::new();
        obs.push(CountingObserver { data: never.clone() }, ObserverMode::Never)
            .push(
                CountingObserver {
                    data: always.clone(),
                },
                ObserverMode::Always,
            )
            .push(
                CountingObserver {
                    data: every_three.clone(),
                },
                ObserverMode::Every(3),
            );

        obs.observe_init("test_solver", &kv!()).unwrap();
        assert_eq!(never.lock().unwrap().0, 1);
        assert_eq!(always.lock().unwrap().0, 1);
        assert_eq!(every_three.lock().unwrap().0, 1);

        let mut state: TState = IterState::new();
        for _ in 0..6 {
            state.increment_iter();
            obs.observe_iter(&state, &kv!()).unwrap();
        }

        assert_eq!(never.lock().unwrap().1, 0);
        assert_eq!(always.lock().unwrap().1, 6);
        // iterations 3 and 6
        assert_eq!(every_three.lock().unwrap().1, 2);
    }
}
