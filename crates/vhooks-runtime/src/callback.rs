#![forbid(unsafe_code)]

//! Shared callbacks with pointer identity.
//!
//! Rust closures have no identity of their own, so hooks that re-subscribe
//! "when the transform changes" need one. A [`Callback`] is an `Rc`'d
//! closure; two callbacks are equal only when they share the same
//! allocation. Cloning preserves identity, constructing a new callback from
//! the very same closure code does not.
//!
//! Use [`Scope::use_callback`](crate::Scope::use_callback) to keep a
//! callback's identity stable across renders.

use std::fmt;
use std::rc::Rc;

/// A reference-counted `Fn(&A) -> R` compared by identity.
pub struct Callback<A: ?Sized, R> {
    f: Rc<dyn Fn(&A) -> R>,
}

impl<A: ?Sized + 'static, R: 'static> Callback<A, R> {
    pub fn new(f: impl Fn(&A) -> R + 'static) -> Self {
        Self { f: Rc::new(f) }
    }

    #[inline]
    pub fn call(&self, arg: &A) -> R {
        (self.f)(arg)
    }

    /// True when both handles point at the same closure.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.f, &other.f)
    }
}

impl<R: 'static> Callback<(), R> {
    /// Build a zero-argument callback.
    pub fn from_fn(f: impl Fn() -> R + 'static) -> Self {
        Self::new(move |_: &()| f())
    }

    /// Invoke a zero-argument callback.
    #[inline]
    pub fn invoke(&self) -> R {
        (self.f)(&())
    }
}

impl<A: ?Sized, R> Clone for Callback<A, R> {
    fn clone(&self) -> Self {
        Self {
            f: Rc::clone(&self.f),
        }
    }
}

impl<A: ?Sized, R> PartialEq for Callback<A, R> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.f, &other.f)
    }
}

impl<A: ?Sized, R> Eq for Callback<A, R> {}

impl<A: ?Sized, R> fmt::Debug for Callback<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback")
            .field(&Rc::as_ptr(&self.f).cast::<()>())
            .finish()
    }
}
