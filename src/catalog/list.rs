//! Type-level lists with inferred membership witnesses.
//!
//! `Contains<T, Here>` holds when `T` is the head of the list,
//! `Contains<T, There<I>>` when the tail contains `T` at index `I`. The two impls
//! never overlap because the indices differ, which lets the compiler infer `I`.

use std::marker::PhantomData;

/// Empty list.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nil;

/// List with head `H` and tail `T`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cons<H, T>(PhantomData<fn() -> (H, T)>);

/// Membership index: the element is the head.
#[derive(Debug, Clone, Copy, Default)]
pub struct Here;

/// Membership index: the element is in the tail at index `I`.
#[derive(Debug, Clone, Copy, Default)]
pub struct There<I>(PhantomData<fn() -> I>);

/// `Self` contains `T` at index `I`.
pub trait Contains<T, I> {}

impl<T, Tail> Contains<T, Here> for Cons<T, Tail> {}

impl<H, T, Tail, I> Contains<T, There<I>> for Cons<H, Tail> where Tail: Contains<T, I> {}

/// Concatenation of two lists.
pub trait Append<R> {
    type Output;
}

impl<R> Append<R> for Nil {
    type Output = R;
}

impl<H, T, R> Append<R> for Cons<H, T>
where
    T: Append<R>,
{
    type Output = Cons<H, <T as Append<R>>::Output>;
}
