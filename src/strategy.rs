//! # Strategies
//!
//! A [`Strategy`] interprets bytes drawn from a [`TestData`] as a typed value.
//! It is the only thing a value generator has to implement: shrinking works
//! on the bytes alone, so no strategy carries shrink logic of its own.
//!
//! Combinators are plain structs that own their children:
//!
//! - [`Map`] applies a function to the drawn value.
//! - [`Filter`] retries its source a bounded number of times, then rejects
//!   the whole execution.
//! - [`FlatMap`] draws a value and then draws from the strategy it selects,
//!   from the same `TestData`.
//! - [`OneOf`] draws a selector and dispatches to one branch.
//! - [`Frequency`] is a weighted `one_of`.
//! - [`Recursive`] grows a tree from a base strategy and an extension
//!   function, with a hard cap on the number of leaves drawn from the base.
//!
//! The primitives at the bottom of this module ([`integers`], [`vecs`], ...)
//! are the kernel-level building blocks the combinators are tested with.
//! Collections encode "another element follows" as a one-byte coin before
//! each element, and bracket coin plus element in a single span, so deleting
//! that span from a buffer deletes exactly one element.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use byteorder::{BigEndian, ByteOrder};
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;

use crate::data::TestData;
use crate::distributions::{bounded_int, weighted, Hint, Repeat, Sampler};
use crate::error::DrawError;

type Draw<T> = Result<T, DrawError>;

/// Consecutive rejections after which a filter gives up on the execution.
pub const MAX_FILTER_ATTEMPTS: usize = 200;

/// Probability that a recursive strategy extends rather than draws a leaf.
const P_EXTEND: f64 = 0.25;

const ELEMENT: &str = "element";
const COLLECTION_END: &str = "collection end";
const FILTER_ATTEMPT: &str = "filter attempt";
const SELECTOR: &str = "one_of selector";
const RECURSIVE: &str = "recursive";
const RECURSIVE_ATTEMPT: &str = "recursive attempt";

/// Leaf-budget overruns after which a recursive draw gives up.
const MAX_RECURSIVE_ATTEMPTS: usize = 3;

static BOUNDARY: Lazy<Hint> = Lazy::new(Hint::boundary);

pub trait Strategy {
    type Value;

    /// Interprets the next bytes of `data` as a value.
    fn draw(&self, data: &mut TestData) -> Draw<Self::Value>;

    /// Label for the span wrapping each draw from this strategy.
    fn label(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn map<F, U>(self, f: F) -> Map<Self, F>
    where
        Self: Sized,
        F: Fn(Self::Value) -> U,
    {
        Map { source: self, f }
    }

    fn filter<F>(self, predicate: F) -> Filter<Self, F>
    where
        Self: Sized,
        F: Fn(&Self::Value) -> bool,
    {
        Filter {
            source: self,
            predicate,
        }
    }

    fn flat_map<F, T>(self, f: F) -> FlatMap<Self, F>
    where
        Self: Sized,
        F: Fn(Self::Value) -> T,
        T: Strategy,
    {
        FlatMap { source: self, f }
    }

    fn boxed(self) -> BoxedStrategy<Self::Value>
    where
        Self: Sized + 'static,
    {
        BoxedStrategy(Rc::new(self))
    }
}

/// A type-erased, cheaply cloneable strategy.
pub struct BoxedStrategy<T>(Rc<dyn Strategy<Value = T>>);

impl<T> Clone for BoxedStrategy<T> {
    fn clone(&self) -> Self {
        BoxedStrategy(Rc::clone(&self.0))
    }
}

impl<T> fmt::Debug for BoxedStrategy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoxedStrategy").field(&self.0.label()).finish()
    }
}

impl<T> Strategy for BoxedStrategy<T> {
    type Value = T;

    fn draw(&self, data: &mut TestData) -> Draw<T> {
        self.0.draw(data)
    }

    fn label(&self) -> &'static str {
        self.0.label()
    }
}

pub struct Map<S, F> {
    source: S,
    f: F,
}

impl<S, F, U> Strategy for Map<S, F>
where
    S: Strategy,
    F: Fn(S::Value) -> U,
{
    type Value = U;

    fn draw(&self, data: &mut TestData) -> Draw<U> {
        let value = self.source.draw(data)?;
        Ok((self.f)(value))
    }
}

pub struct Filter<S, F> {
    source: S,
    predicate: F,
}

impl<S, F> Strategy for Filter<S, F>
where
    S: Strategy,
    F: Fn(&S::Value) -> bool,
{
    type Value = S::Value;

    fn draw(&self, data: &mut TestData) -> Draw<S::Value> {
        for _ in 0..MAX_FILTER_ATTEMPTS {
            data.start_span(FILTER_ATTEMPT);
            match self.source.draw(data) {
                Ok(value) if (self.predicate)(&value) => {
                    data.stop_span(false);
                    return Ok(value);
                }
                Ok(_) => data.stop_span(true),
                Err(e) => {
                    data.stop_span(true);
                    return Err(e);
                }
            }
        }
        Err(DrawError::Invalid(format!(
            "filter rejected {} consecutive draws",
            MAX_FILTER_ATTEMPTS
        )))
    }
}

pub struct FlatMap<S, F> {
    source: S,
    f: F,
}

impl<S, F, T> Strategy for FlatMap<S, F>
where
    S: Strategy,
    F: Fn(S::Value) -> T,
    T: Strategy,
{
    type Value = T::Value;

    fn draw(&self, data: &mut TestData) -> Draw<T::Value> {
        let value = data.draw(&self.source)?;
        let next = (self.f)(value);
        data.draw(&next)
    }
}

/// Chooses one of several strategies. Lower-indexed branches are simpler.
pub struct OneOf<T> {
    options: Vec<BoxedStrategy<T>>,
}

pub fn one_of<T>(options: Vec<BoxedStrategy<T>>) -> OneOf<T> {
    OneOf { options }
}

impl<T> Strategy for OneOf<T> {
    type Value = T;

    fn draw(&self, data: &mut TestData) -> Draw<T> {
        if self.options.is_empty() {
            return Err(DrawError::Invalid("one_of with no options".to_string()));
        }
        data.start_span(SELECTOR);
        let selected = bounded_int(data, self.options.len() as u64 - 1);
        data.stop_span(selected.is_err());
        data.draw(&self.options[selected? as usize])
    }
}

/// Chooses among strategies with the given relative weights.
pub struct Frequency<T> {
    sampler: Option<Sampler>,
    options: Vec<BoxedStrategy<T>>,
}

/// Like [`one_of`], but branch `i` is generated with probability
/// proportional to its weight. Shrinking still moves towards lower indices.
pub fn frequency<T>(weighted_options: Vec<(f32, BoxedStrategy<T>)>) -> Frequency<T> {
    let weights: Vec<f32> = weighted_options.iter().map(|(w, _)| *w).collect();
    Frequency {
        sampler: Sampler::new(&weights),
        options: weighted_options.into_iter().map(|(_, s)| s).collect(),
    }
}

impl<T> Strategy for Frequency<T> {
    type Value = T;

    fn draw(&self, data: &mut TestData) -> Draw<T> {
        let Some(sampler) = &self.sampler else {
            return Err(DrawError::Invalid(
                "frequency needs at least one positive weight".to_string(),
            ));
        };
        data.start_span(SELECTOR);
        let selected = sampler.sample(data);
        data.stop_span(selected.is_err());
        data.draw(&self.options[selected?])
    }
}

struct RecursiveCore<T> {
    base: BoxedStrategy<T>,
    extended: OnceCell<BoxedStrategy<T>>,
    max_leaves: usize,
    max_depth: usize,
    leaves: Cell<usize>,
    depth: Cell<usize>,
    limit_reached: Cell<bool>,
}

impl<T> RecursiveCore<T> {
    fn draw_node(&self, data: &mut TestData) -> Draw<T> {
        let room = self.depth.get() < self.max_depth && self.leaves.get() < self.max_leaves;
        if let Some(extended) = self.extended.get().filter(|_| room) {
            if weighted(data, P_EXTEND)? {
                self.depth.set(self.depth.get() + 1);
                let result = data.draw(extended);
                self.depth.set(self.depth.get() - 1);
                return result;
            }
        }
        self.draw_leaf(data)
    }

    fn draw_leaf(&self, data: &mut TestData) -> Draw<T> {
        if self.leaves.get() >= self.max_leaves {
            self.limit_reached.set(true);
            return Err(DrawError::Invalid(format!(
                "recursive value needs more than {} leaves",
                self.max_leaves
            )));
        }
        self.leaves.set(self.leaves.get() + 1);
        data.draw(&self.base)
    }

    fn reset(&self) {
        self.leaves.set(0);
        self.depth.set(0);
        self.limit_reached.set(false);
    }
}

/// A recursive strategy: leaves come from `base`, inner nodes from the
/// strategy `extend` builds around a handle to the whole.
///
/// At most `max_leaves` values are drawn from `base` per value. Nesting is
/// capped at `log2(max_leaves) + 1` levels of `extend`, and nothing extends
/// once the leaf budget is spent. A draw that still runs out of leaves is
/// thrown away and retried; after `MAX_RECURSIVE_ATTEMPTS` such attempts
/// the execution is invalid.
pub struct Recursive<T> {
    core: Rc<RecursiveCore<T>>,
}

/// The handle passed to `extend`.
struct RecursiveRef<T> {
    core: Weak<RecursiveCore<T>>,
}

impl<T> Strategy for RecursiveRef<T> {
    type Value = T;

    fn draw(&self, data: &mut TestData) -> Draw<T> {
        match self.core.upgrade() {
            Some(core) => core.draw_node(data),
            None => Err(DrawError::Invalid(
                "recursive strategy used after it was dropped".to_string(),
            )),
        }
    }

    fn label(&self) -> &'static str {
        RECURSIVE
    }
}

pub fn recursive<T, F>(base: BoxedStrategy<T>, max_leaves: usize, extend: F) -> Recursive<T>
where
    T: 'static,
    F: FnOnce(BoxedStrategy<T>) -> BoxedStrategy<T>,
{
    let max_depth = (usize::BITS - max_leaves.max(1).leading_zeros()) as usize;
    let core = Rc::new(RecursiveCore {
        base,
        extended: OnceCell::new(),
        max_leaves,
        max_depth,
        leaves: Cell::new(0),
        depth: Cell::new(0),
        limit_reached: Cell::new(false),
    });
    let handle = RecursiveRef {
        core: Rc::downgrade(&core),
    }
    .boxed();
    let _ = core.extended.set(extend(handle));
    Recursive { core }
}

impl<T> Recursive<T> {
    fn draw_attempts(&self, data: &mut TestData) -> Draw<T> {
        for _ in 0..MAX_RECURSIVE_ATTEMPTS {
            self.core.reset();
            data.start_span(RECURSIVE_ATTEMPT);
            match self.core.draw_node(data) {
                Ok(value) => {
                    data.stop_span(false);
                    return Ok(value);
                }
                Err(e) => {
                    data.stop_span(true);
                    if !self.core.limit_reached.get() {
                        return Err(e);
                    }
                }
            }
        }
        Err(DrawError::Invalid(format!(
            "no recursive value within {} leaves after {} attempts",
            self.core.max_leaves, MAX_RECURSIVE_ATTEMPTS
        )))
    }
}

impl<T> Strategy for Recursive<T> {
    type Value = T;

    fn draw(&self, data: &mut TestData) -> Draw<T> {
        // Nested draws of the same strategy keep their own counters.
        let saved = (
            self.core.leaves.get(),
            self.core.depth.get(),
            self.core.limit_reached.get(),
        );
        let result = self.draw_attempts(data);
        self.core.leaves.set(saved.0);
        self.core.depth.set(saved.1);
        self.core.limit_reached.set(saved.2);
        result
    }

    fn label(&self) -> &'static str {
        RECURSIVE
    }
}

#[derive(Debug, Clone)]
pub struct Just<T>(T);

pub fn just<T: Clone>(value: T) -> Just<T> {
    Just(value)
}

impl<T: Clone> Strategy for Just<T> {
    type Value = T;

    fn draw(&self, _data: &mut TestData) -> Draw<T> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Booleans;

pub fn booleans() -> Booleans {
    Booleans
}

impl Strategy for Booleans {
    type Value = bool;

    fn draw(&self, data: &mut TestData) -> Draw<bool> {
        weighted(data, 0.5)
    }
}

/// Fixed-width integers decodable from big-endian bytes.
pub trait IntegerValue: Sized {
    const BYTES: usize;

    /// Builds a value from the low `BYTES * 8` bits of `bits`. Signed types
    /// use zigzag order so that the all-zero encoding is 0 and small
    /// encodings are small magnitudes.
    fn from_bits(bits: u64) -> Self;
}

macro_rules! unsigned_value {
    ($($t:ty),*) => {$(
        impl IntegerValue for $t {
            const BYTES: usize = std::mem::size_of::<$t>();

            fn from_bits(bits: u64) -> Self {
                bits as $t
            }
        }
    )*};
}

macro_rules! signed_value {
    ($($t:ty),*) => {$(
        impl IntegerValue for $t {
            const BYTES: usize = std::mem::size_of::<$t>();

            fn from_bits(bits: u64) -> Self {
                ((bits >> 1) as i64 ^ -((bits & 1) as i64)) as $t
            }
        }
    )*};
}

unsigned_value!(u8, u16, u32, u64);
signed_value!(i8, i16, i32, i64);

pub struct Integers<T>(PhantomData<fn() -> T>);

pub fn integers<T: IntegerValue>() -> Integers<T> {
    Integers(PhantomData)
}

impl<T: IntegerValue> Strategy for Integers<T> {
    type Value = T;

    fn draw(&self, data: &mut TestData) -> Draw<T> {
        let bytes = data.draw_bytes(T::BYTES, Some(&*BOUNDARY))?;
        Ok(T::from_bits(BigEndian::read_uint(&bytes, T::BYTES)))
    }
}

/// Uniform integers in `0..=max`.
#[derive(Debug, Clone, Copy)]
pub struct Bounded {
    max: u64,
}

pub fn bounded(max: u64) -> Bounded {
    Bounded { max }
}

impl Strategy for Bounded {
    type Value = u64;

    fn draw(&self, data: &mut TestData) -> Draw<u64> {
        bounded_int(data, self.max)
    }
}

#[derive(Debug, Clone)]
pub struct SampledFrom<T> {
    values: Vec<T>,
}

/// Picks one of `values`; shrinks towards the first.
pub fn sampled_from<T: Clone>(values: Vec<T>) -> SampledFrom<T> {
    SampledFrom { values }
}

impl<T: Clone> Strategy for SampledFrom<T> {
    type Value = T;

    fn draw(&self, data: &mut TestData) -> Draw<T> {
        if self.values.is_empty() {
            return Err(DrawError::Invalid(
                "sampled_from with no values".to_string(),
            ));
        }
        let i = bounded_int(data, self.values.len() as u64 - 1)? as usize;
        Ok(self.values[i].clone())
    }
}

pub struct Vecs<S> {
    element: S,
    min_size: usize,
    max_size: usize,
}

/// Vectors of `element` with between `min_size` and `max_size` entries.
pub fn vecs<S: Strategy>(element: S, min_size: usize, max_size: usize) -> Vecs<S> {
    Vecs {
        element,
        min_size,
        max_size: max_size.max(min_size),
    }
}

impl<S: Strategy> Vecs<S> {
    fn expected_size(&self) -> f64 {
        let average = (self.min_size * 2).max(self.min_size + 5);
        average.min(self.max_size) as f64
    }
}

impl<S: Strategy> Strategy for Vecs<S> {
    type Value = Vec<S::Value>;

    fn draw(&self, data: &mut TestData) -> Draw<Vec<S::Value>> {
        let mut repeat = Repeat::new(
            self.min_size as u64,
            self.max_size as u64,
            self.expected_size(),
        );
        let mut values = Vec::new();
        loop {
            data.start_span(ELEMENT);
            let more = match repeat.should_continue(data) {
                Ok(more) => more,
                Err(e) => {
                    data.stop_span(true);
                    return Err(e);
                }
            };
            if !more {
                data.relabel_span(COLLECTION_END);
                data.stop_span(false);
                return Ok(values);
            }
            match data.draw(&self.element) {
                Ok(value) => {
                    values.push(value);
                    data.stop_span(false);
                }
                Err(e) => {
                    data.stop_span(true);
                    return Err(e);
                }
            }
        }
    }
}

pub struct UniqueVecs<S> {
    inner: Vecs<S>,
}

/// Vectors whose entries are pairwise distinct. A duplicate element is
/// thrown away and does not count towards the size; too many duplicates in
/// a row end the collection early, or invalidate it below `min_size`.
pub fn unique_vecs<S>(element: S, min_size: usize, max_size: usize) -> UniqueVecs<S>
where
    S: Strategy,
    S::Value: PartialEq,
{
    UniqueVecs {
        inner: vecs(element, min_size, max_size),
    }
}

impl<S> Strategy for UniqueVecs<S>
where
    S: Strategy,
    S::Value: PartialEq,
{
    type Value = Vec<S::Value>;

    fn draw(&self, data: &mut TestData) -> Draw<Vec<S::Value>> {
        let inner = &self.inner;
        let mut repeat = Repeat::new(
            inner.min_size as u64,
            inner.max_size as u64,
            inner.expected_size(),
        );
        let mut values: Vec<S::Value> = Vec::new();
        let mut rejections = 0;
        loop {
            data.start_span(ELEMENT);
            let more = match repeat.should_continue(data) {
                Ok(more) => more,
                Err(e) => {
                    data.stop_span(true);
                    return Err(e);
                }
            };
            if !more {
                data.relabel_span(COLLECTION_END);
                data.stop_span(false);
                return Ok(values);
            }
            match data.draw(&inner.element) {
                Ok(value) if values.contains(&value) => {
                    data.stop_span(true);
                    repeat.reject();
                    rejections += 1;
                    if rejections > (2 * values.len()).max(3) {
                        if values.len() < inner.min_size {
                            return Err(DrawError::Invalid(format!(
                                "only {} distinct elements, wanted {}",
                                values.len(),
                                inner.min_size
                            )));
                        }
                        return Ok(values);
                    }
                }
                Ok(value) => {
                    values.push(value);
                    data.stop_span(false);
                }
                Err(e) => {
                    data.stop_span(true);
                    return Err(e);
                }
            }
        }
    }
}

macro_rules! tuple_strategy {
    ($($name:ident),+) => {
        #[allow(non_snake_case)]
        impl<$($name: Strategy),+> Strategy for ($($name,)+) {
            type Value = ($($name::Value,)+);

            fn draw(&self, data: &mut TestData) -> Draw<Self::Value> {
                let ($($name,)+) = self;
                Ok(($(data.draw($name)?,)+))
            }
        }
    };
}

tuple_strategy!(A, B);
tuple_strategy!(A, B, C);
tuple_strategy!(A, B, C, D);
