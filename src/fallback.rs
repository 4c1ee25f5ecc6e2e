//! Ordered-attempt combinator
//!
//! Both the upload resolver and the background-removal ladder try a fixed list of
//! strategies one after another and stop at the first acceptable result. This
//! module holds that loop once; callers describe their strategies as plain values.

use std::future::Future;

/// A strategy that was tried and rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure<S, E> {
    pub strategy: S,
    pub error: E,
}

/// Result of running strategies in order
#[derive(Debug)]
pub enum Outcome<S, T, E> {
    /// A strategy produced an accepted value; earlier failures are kept
    Succeeded {
        strategy: S,
        value: T,
        failures: Vec<Failure<S, E>>,
    },
    /// Every strategy failed
    Exhausted { failures: Vec<Failure<S, E>> },
}

impl<S, T, E> Outcome<S, T, E> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Failures recorded before the outcome was reached
    #[must_use]
    pub fn failures(&self) -> &[Failure<S, E>] {
        match self {
            Self::Succeeded { failures, .. } | Self::Exhausted { failures } => failures,
        }
    }

    /// Last failure, if any
    #[must_use]
    pub fn last_failure(&self) -> Option<&Failure<S, E>> {
        self.failures().last()
    }

    /// The accepted value, or the degrade value built from the failures
    pub fn or_degrade<F>(self, degrade: F) -> T
    where
        F: FnOnce(Vec<Failure<S, E>>) -> T,
    {
        match self {
            Self::Succeeded { value, .. } => value,
            Self::Exhausted { failures } => degrade(failures),
        }
    }
}

/// Run `attempt` for each strategy strictly in sequence
///
/// A value returned by `attempt` is passed through `accept`, which may reject it
/// with an error. The first accepted value ends the run; strategies after it are
/// never attempted.
pub async fn attempt_in_order<S, T, E, I, F, Fut, A, AFut>(
    strategies: I,
    mut attempt: F,
    mut accept: A,
) -> Outcome<S, T, E>
where
    I: IntoIterator<Item = S>,
    S: Clone,
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    A: FnMut(S, T) -> AFut,
    AFut: Future<Output = Result<T, E>>,
{
    let mut failures = Vec::new();

    for strategy in strategies {
        let checked = match attempt(strategy.clone()).await {
            Ok(value) => accept(strategy.clone(), value).await,
            Err(e) => Err(e),
        };

        match checked {
            Ok(value) => {
                return Outcome::Succeeded {
                    strategy,
                    value,
                    failures,
                }
            },
            Err(error) => failures.push(Failure { strategy, error }),
        }
    }

    Outcome::Exhausted { failures }
}

/// Acceptance predicate that takes every value as-is
pub fn accept_any<S, T, E>(_strategy: S, value: T) -> std::future::Ready<Result<T, E>> {
    std::future::ready(Ok(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_stops_at_first_accepted() {
        let tried = Arc::new(Mutex::new(Vec::new()));
        let log = tried.clone();

        let outcome = attempt_in_order(
            ["a", "b", "c"],
            move |s| {
                log.lock().unwrap().push(s);
                async move {
                    if s == "a" {
                        Err(format!("{} failed", s))
                    } else {
                        Ok(s.len())
                    }
                }
            },
            accept_any,
        )
        .await;

        assert_eq!(*tried.lock().unwrap(), vec!["a", "b"]);
        match outcome {
            Outcome::Succeeded {
                strategy,
                value,
                failures,
            } => {
                assert_eq!(strategy, "b");
                assert_eq!(value, 1);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].strategy, "a");
            },
            Outcome::Exhausted { .. } => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn test_accept_can_reject() {
        let outcome = attempt_in_order(
            [1u32, 2, 3],
            |n| async move { Ok::<_, String>(n * 10) },
            |_, v| async move {
                if v < 30 {
                    Err(format!("{} too small", v))
                } else {
                    Ok(v)
                }
            },
        )
        .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.failures().len(), 2);
        assert_eq!(outcome.or_degrade(|_| 0), 30);
    }

    #[tokio::test]
    async fn test_exhausted_degrades() {
        let outcome = attempt_in_order(
            ["x", "y"],
            |s| async move { Err::<u8, _>(s.to_uppercase()) },
            accept_any,
        )
        .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.last_failure().unwrap().error, "Y");
        let degraded = outcome.or_degrade(|failures| failures.len() as u8 + 100);
        assert_eq!(degraded, 102);
    }

    #[tokio::test]
    async fn test_empty_strategy_list() {
        let outcome = attempt_in_order(
            Vec::<u8>::new(),
            |_| async { Ok::<u8, ()>(1) },
            accept_any,
        )
        .await;
        assert!(matches!(outcome, Outcome::Exhausted { ref failures } if failures.is_empty()));
    }
}
