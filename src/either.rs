//! The error-or-value carrier threaded through every effect.
//!
//! `Either<E, A>` is what an effect produces when it is evaluated: `Left(E)`
//! for a typed failure, `Right(A)` for a success. It is right-biased: `map`
//! and `and_then` operate on `Right` and short-circuit on `Left`.
//!
//! Unlike `Result`, `Either` is also used as a plain value inside the success
//! channel. [`Effect::either`](crate::Effect::either) reifies a failure into an
//! `Either` so that it can be inspected without aborting the chain.
//!
//! # Example
//!
//! ```rust
//! use millrace::Either;
//!
//! let parsed: Either<String, i32> = "42"
//!     .parse::<i32>()
//!     .map_err(|e| e.to_string())
//!     .into();
//!
//! let doubled = parsed.map(|n| n * 2);
//! assert_eq!(doubled, Either::right(84));
//! assert!(bool::from(&doubled));
//! ```

/// A value that is either `Left(L)` (an error) or `Right(R)` (a value).
///
/// Equality, ordering and hashing are structural.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Either<L, R> {
    /// The failure case
    Left(L),
    /// The success case
    Right(R),
}

impl<L, R> Either<L, R> {
    /// A failure.
    #[inline]
    pub fn left(value: L) -> Self {
        Either::Left(value)
    }

    /// A success.
    #[inline]
    pub fn right(value: R) -> Self {
        Either::Right(value)
    }

    /// Whether this holds a failure.
    #[inline]
    pub fn is_left(&self) -> bool {
        matches!(self, Either::Left(_))
    }

    /// Whether this holds a success.
    #[inline]
    pub fn is_right(&self) -> bool {
        matches!(self, Either::Right(_))
    }

    /// The failure, discarding a success.
    #[inline]
    pub fn into_left(self) -> Option<L> {
        self.fold(Some, |_| None)
    }

    /// The success, discarding a failure.
    #[inline]
    pub fn into_right(self) -> Option<R> {
        self.fold(|_| None, Some)
    }

    /// Borrow whichever side is present.
    #[inline]
    pub fn as_ref(&self) -> Either<&L, &R> {
        match self {
            Either::Left(l) => Either::Left(l),
            Either::Right(r) => Either::Right(r),
        }
    }

    /// Return the right value, or `default` when this is a `Left`.
    ///
    /// ```rust
    /// use millrace::Either;
    ///
    /// assert_eq!(Either::<&str, i32>::left("boom").right_or(0), 0);
    /// assert_eq!(Either::<&str, i32>::right(7).right_or(0), 7);
    /// ```
    #[inline]
    pub fn right_or(self, default: R) -> R {
        match self {
            Either::Left(_) => default,
            Either::Right(r) => r,
        }
    }

    /// Return the right value, or compute one from the left value.
    #[inline]
    pub fn right_or_else<F>(self, f: F) -> R
    where
        F: FnOnce(L) -> R,
    {
        match self {
            Either::Left(l) => f(l),
            Either::Right(r) => r,
        }
    }

    /// Transform the right value, passing left values through unchanged.
    ///
    /// ```rust
    /// use millrace::Either;
    ///
    /// let e: Either<&str, i32> = Either::right(21);
    /// assert_eq!(e.map(|x| x * 2), Either::right(42));
    /// ```
    #[inline]
    pub fn map<R2, F>(self, f: F) -> Either<L, R2>
    where
        F: FnOnce(R) -> R2,
    {
        match self {
            Either::Left(l) => Either::Left(l),
            Either::Right(r) => Either::Right(f(r)),
        }
    }

    /// Transform the left value, passing right values through unchanged.
    #[inline]
    pub fn map_left<L2, F>(self, f: F) -> Either<L2, R>
    where
        F: FnOnce(L) -> L2,
    {
        match self {
            Either::Left(l) => Either::Left(f(l)),
            Either::Right(r) => Either::Right(r),
        }
    }

    /// Monadic bind on the right value.
    ///
    /// `f` is only invoked for `Right`; a `Left` short-circuits.
    ///
    /// ```rust
    /// use millrace::Either;
    ///
    /// let half = |n: i32| {
    ///     if n % 2 == 0 {
    ///         Either::right(n / 2)
    ///     } else {
    ///         Either::left(format!("{} is odd", n))
    ///     }
    /// };
    ///
    /// assert_eq!(Either::right(8).and_then(half), Either::right(4));
    /// assert_eq!(Either::right(3).and_then(half), Either::left("3 is odd".to_string()));
    /// ```
    #[inline]
    pub fn and_then<R2, F>(self, f: F) -> Either<L, R2>
    where
        F: FnOnce(R) -> Either<L, R2>,
    {
        match self {
            Either::Left(l) => Either::Left(l),
            Either::Right(r) => f(r),
        }
    }

    /// Recover from a left value.
    ///
    /// `f` is only invoked for `Left`; a `Right` passes through.
    #[inline]
    pub fn or_else<L2, F>(self, f: F) -> Either<L2, R>
    where
        F: FnOnce(L) -> Either<L2, R>,
    {
        match self {
            Either::Left(l) => f(l),
            Either::Right(r) => Either::Right(r),
        }
    }

    /// Collapse both sides into one value.
    #[inline]
    pub fn fold<T, F, G>(self, left_fn: F, right_fn: G) -> T
    where
        F: FnOnce(L) -> T,
        G: FnOnce(R) -> T,
    {
        match self {
            Either::Left(l) => left_fn(l),
            Either::Right(r) => right_fn(r),
        }
    }

    /// Turn failures into successes and vice versa.
    #[inline]
    pub fn swap(self) -> Either<R, L> {
        match self {
            Either::Left(l) => Either::Right(l),
            Either::Right(r) => Either::Left(r),
        }
    }

    /// Convert to a `Result`, with `Right` as `Ok`.
    #[inline]
    pub fn into_result(self) -> Result<R, L> {
        match self {
            Either::Left(l) => Err(l),
            Either::Right(r) => Ok(r),
        }
    }

    /// Convert from a `Result`, with `Ok` as `Right`.
    #[inline]
    pub fn from_result(result: Result<R, L>) -> Self {
        match result {
            Ok(r) => Either::Right(r),
            Err(l) => Either::Left(l),
        }
    }
}

impl<L, R> Either<L, Either<L, R>> {
    /// Flatten a nested right value.
    #[inline]
    pub fn flatten(self) -> Either<L, R> {
        self.and_then(|inner| inner)
    }
}

impl<L, R> From<Result<R, L>> for Either<L, R> {
    fn from(result: Result<R, L>) -> Self {
        Either::from_result(result)
    }
}

impl<L, R> From<Either<L, R>> for Result<R, L> {
    fn from(either: Either<L, R>) -> Self {
        either.into_result()
    }
}

/// `Right` is truthy, `Left` is falsy.
impl<L, R> From<&Either<L, R>> for bool {
    fn from(either: &Either<L, R>) -> Self {
        either.is_right()
    }
}

/// Separate failures from successes, keeping the relative order of each.
pub fn partition<L, R, I>(outcomes: I) -> (Vec<L>, Vec<R>)
where
    I: IntoIterator<Item = Either<L, R>>,
{
    outcomes
        .into_iter()
        .fold((Vec::new(), Vec::new()), |(mut failures, mut successes), outcome| {
            match outcome {
                Either::Left(err) => failures.push(err),
                Either::Right(value) => successes.push(value),
            }
            (failures, successes)
        })
}
