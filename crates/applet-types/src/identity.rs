//! # Identity Model
//!
//! Strongly typed identifiers for applets and message intents.
//!
//! An identifier wraps any comparable value together with the comparer used
//! to test it. The kind (applet or intent) is part of the type, so an
//! `AppletId` can never be compared with a `MessageIntentId`, even when both
//! wrap the same underlying bits.

use crate::errors::IdentityError;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// Marker trait for identifier kinds.
pub trait IdKind: Send + Sync + 'static {
    /// Human readable kind name used in diagnostics.
    const NAME: &'static str;
}

/// Kind marker for applet identifiers.
pub enum AppletKind {}

/// Kind marker for message intent identifiers.
pub enum IntentKind {}

impl IdKind for AppletKind {
    const NAME: &'static str = "AppletId";
}

impl IdKind for IntentKind {
    const NAME: &'static str = "MessageIntentId";
}

/// Identifier of an applet.
pub type AppletId = EntityId<AppletKind>;

/// Identifier of a message intent.
pub type MessageIntentId = EntityId<IntentKind>;

/// Values that can sit inside an identifier.
pub trait IdValue: fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T> IdValue for T where T: fmt::Debug + fmt::Display + Send + Sync + 'static {}

/// Equality strategy for the value wrapped by an identifier.
///
/// `hash_value` must agree with `equals`: equal values hash identically.
pub trait Comparer<T: ?Sized>: Send + Sync + 'static {
    fn equals(&self, left: &T, right: &T) -> bool;
    fn hash_value(&self, value: &T, state: &mut dyn Hasher);
}

/// Compares values with their own `Eq` and `Hash` implementations.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultComparer;

impl<T: Eq + Hash + ?Sized> Comparer<T> for DefaultComparer {
    fn equals(&self, left: &T, right: &T) -> bool {
        left == right
    }

    fn hash_value(&self, value: &T, mut state: &mut dyn Hasher) {
        value.hash(&mut state);
    }
}

/// Compares strings ignoring case.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseInsensitiveComparer;

impl CaseInsensitiveComparer {
    fn fold(value: &str) -> impl Iterator<Item = char> + '_ {
        value.chars().flat_map(char::to_lowercase)
    }
}

impl Comparer<String> for CaseInsensitiveComparer {
    fn equals(&self, left: &String, right: &String) -> bool {
        Self::fold(left).eq(Self::fold(right))
    }

    fn hash_value(&self, value: &String, state: &mut dyn Hasher) {
        for c in Self::fold(value) {
            state.write_u32(c as u32);
        }
    }
}

impl Comparer<&'static str> for CaseInsensitiveComparer {
    fn equals(&self, left: &&'static str, right: &&'static str) -> bool {
        Self::fold(left).eq(Self::fold(right))
    }

    fn hash_value(&self, value: &&'static str, state: &mut dyn Hasher) {
        for c in Self::fold(value) {
            state.write_u32(c as u32);
        }
    }
}

/// Type-erased value plus comparer.
trait ErasedValue: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn value_any(&self) -> &dyn Any;
    fn eq_erased(&self, other: &dyn ErasedValue) -> bool;
    fn eq_raw(&self, raw: &dyn Any) -> bool;
    fn hash_erased(&self, state: &mut dyn Hasher);
    fn fmt_display(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

struct IdCell<T, C> {
    value: T,
    comparer: C,
}

impl<T: IdValue, C: Comparer<T>> ErasedValue for IdCell<T, C> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value_any(&self) -> &dyn Any {
        &self.value
    }

    // Same cell type means same value type and same comparer.
    fn eq_erased(&self, other: &dyn ErasedValue) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self.comparer.equals(&self.value, &other.value))
    }

    fn eq_raw(&self, raw: &dyn Any) -> bool {
        raw.downcast_ref::<T>()
            .is_some_and(|raw| self.comparer.equals(&self.value, raw))
    }

    fn hash_erased(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.comparer.hash_value(&self.value, state);
    }

    fn fmt_display(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }

    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.value, f)
    }
}

/// Identifier of kind `K` wrapping an arbitrary comparable value.
///
/// Cloning is cheap; the value is shared.
pub struct EntityId<K: IdKind> {
    value: Arc<dyn ErasedValue>,
    kind: PhantomData<fn() -> K>,
}

impl<K: IdKind> EntityId<K> {
    /// Create an identifier compared with the value's own equality.
    pub fn new<T>(value: T) -> Result<Self, IdentityError>
    where
        T: IdValue + Eq + Hash,
    {
        Self::with_comparer(value, DefaultComparer)
    }

    /// Create an identifier compared with an explicit comparer.
    ///
    /// Fails if `value` is itself an identifier.
    pub fn with_comparer<T, C>(value: T, comparer: C) -> Result<Self, IdentityError>
    where
        T: IdValue,
        C: Comparer<T>,
    {
        let any: &dyn Any = &value;
        if let Some(inner) = nested_kind(any) {
            return Err(IdentityError::NestedIdentifier {
                outer: K::NAME,
                inner,
            });
        }
        Ok(Self::wrap(value, comparer))
    }

    /// Create an identifier from a UUID. Never fails.
    pub fn from_uuid(value: Uuid) -> Self {
        Self::wrap(value, DefaultComparer)
    }

    fn wrap<T, C>(value: T, comparer: C) -> Self
    where
        T: IdValue,
        C: Comparer<T>,
    {
        Self {
            value: Arc::new(IdCell { value, comparer }),
            kind: PhantomData,
        }
    }

    /// Borrow the wrapped value if it is a `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.value_any().downcast_ref()
    }

    /// Compare against a raw value using this identifier's comparer.
    pub fn matches<T: 'static>(&self, raw: &T) -> bool {
        self.value.eq_raw(raw)
    }

    /// Kind name, e.g. `AppletId`.
    pub fn kind(&self) -> &'static str {
        K::NAME
    }
}

fn nested_kind(value: &dyn Any) -> Option<&'static str> {
    if value.is::<AppletId>() {
        Some(AppletKind::NAME)
    } else if value.is::<MessageIntentId>() {
        Some(IntentKind::NAME)
    } else {
        None
    }
}

impl<K: IdKind> Clone for EntityId<K> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            kind: PhantomData,
        }
    }
}

impl<K: IdKind> PartialEq for EntityId<K> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value) || self.value.eq_erased(other.value.as_ref())
    }
}

impl<K: IdKind> Eq for EntityId<K> {}

impl<K: IdKind> Hash for EntityId<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash_erased(state);
    }
}

impl<K: IdKind> fmt::Display for EntityId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt_display(f)
    }
}

impl<K: IdKind> fmt::Debug for EntityId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", K::NAME)?;
        self.value.fmt_debug(f)?;
        write!(f, ")")
    }
}

impl<K: IdKind> From<Uuid> for EntityId<K> {
    fn from(value: Uuid) -> Self {
        Self::from_uuid(value)
    }
}
